//! HTTP route handlers.

pub mod chat;
pub mod config;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use mediassist_core::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::state::AppState;
use crate::uploads::request_body_limit;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = request_body_limit(state.config.max_file_size);
    let cors = cors_layer(&state.config.frontend_url);

    Router::new()
        .nest("/api", api_routes())
        .route("/health", get(config::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(chat::routes())
        .merge(config::routes())
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION]),
        Err(e) => {
            warn!("Invalid FRONTEND_URL {:?} ({}), allowing any origin", frontend_url, e);
            CorsLayer::permissive()
        }
    }
}

pub(crate) fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Error::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{"error": ...}` with the status matching the failure.
pub(crate) fn error_response(err: &Error) -> Response {
    let status = status_for(err);
    let message = match err {
        Error::UnsupportedContentType(detail) => detail.clone(),
        other => other.to_string(),
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Rejected request: {}", err);
    }

    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
