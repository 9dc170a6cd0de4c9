//! Config, provider and health routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use mediassist_chat::{ConfigResponse, HealthResponse, ProviderInfo};
use mediassist_core::format_megabytes;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/config", get(get_config))
        .route("/provider", get(get_provider))
}

/// GET /api/config: upload limits and the active provider.
async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    let max = state.config.max_file_size;
    Json(ConfigResponse {
        max_file_size_bytes: max,
        max_file_size: max,
        max_file_size_mb: format_megabytes(max),
        provider: state.provider.kind().to_string(),
        model: state.provider.model_name().to_string(),
    })
}

/// GET /api/provider
async fn get_provider(State(state): State<Arc<AppState>>) -> Json<ProviderInfo> {
    Json(ProviderInfo {
        provider: state.provider.kind().to_string(),
        model: state.provider.model_name().to_string(),
    })
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        provider: state.provider.kind().to_string(),
        max_file_size_mb: format_megabytes(state.config.max_file_size),
    })
}
