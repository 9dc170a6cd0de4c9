//! POST /api/chat: accept a conversation plus attachments and stream the
//! provider's reply back as server-sent events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use mediassist_chat::attachments::decode_data_uri;
use mediassist_chat::{
    normalize, relay, AttachmentKind, ChatMessage, ChatRequest, ContentPart, ImageDetail,
};
use mediassist_core::{Error, Result};
use tokio_stream::StreamExt;
use tracing::{debug, info};

use super::error_response;
use crate::state::AppState;
use crate::uploads::UploadBatch;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

/// A parsed chat request.
struct ChatInput {
    messages: Vec<ChatMessage>,
    /// Attachments written to the temp directory.
    uploads: UploadBatch,
    /// Images given by remote URL. Forwarded as-is, never fetched.
    linked_images: Vec<ContentPart>,
}

async fn chat(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let ChatInput {
        messages,
        uploads,
        linked_images,
    } = match read_request(&state, request).await {
        Ok(input) => input,
        Err(e) => return error_response(&e),
    };

    let provider = state.provider.clone();
    info!(
        "Chat request via {}: {} messages, files {:?}, {} linked images",
        provider.kind(),
        messages.len(),
        uploads.names(),
        linked_images.len()
    );

    // An error here drops `uploads`, which removes the temp files.
    let mut normalized = match normalize(messages, &uploads.files()).await {
        Ok(normalized) => normalized,
        Err(e) => return error_response(&e),
    };
    normalized.trailing_images.extend(linked_images);

    let formatted = provider.format_messages(&normalized.messages, &normalized.trailing_images);
    let events = relay(provider, formatted);

    // The batch lives inside the stream: it is released after the last event,
    // or dropped with the stream if the client disconnects first.
    let body = async_stream::stream! {
        let mut uploads = uploads;
        let mut events = Box::pin(events);
        while let Some(event) = events.next().await {
            yield Ok::<_, Infallible>(Event::default().data(event.to_sse_data()));
        }
        uploads.release_all();
        debug!("Chat stream finished");
    };

    ([(header::CONNECTION, "keep-alive")], Sse::new(body)).into_response()
}

/// Parse either body variant into messages plus on-disk attachments.
async fn read_request(state: &AppState, request: Request) -> Result<ChatInput> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| Error::InvalidRequest(e.body_text()))?;
        read_multipart(state, multipart).await
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<ChatRequest>::from_request(request, &())
            .await
            .map_err(|e| Error::InvalidRequest(e.body_text()))?;
        read_json(state, body).await
    } else {
        Err(Error::UnsupportedContentType(format!(
            "Expected multipart/form-data or application/json, got {:?}",
            content_type
        )))
    }
}

async fn read_multipart(state: &AppState, mut multipart: Multipart) -> Result<ChatInput> {
    let mut messages = None;
    let mut uploads = UploadBatch::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| state.uploads.multipart_error("request body", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "messages" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| state.uploads.multipart_error("messages", e))?;
                let parsed: Vec<ChatMessage> = serde_json::from_str(&text).map_err(|e| {
                    Error::InvalidRequest(format!("messages must be a JSON array: {}", e))
                })?;
                messages = Some(parsed);
            }
            "files" => uploads.push(state.uploads.store_field(field).await?),
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let mut messages =
        messages.ok_or_else(|| Error::InvalidRequest("missing messages field".into()))?;

    // Multipart clients send the same attachments as `files` parts.
    for msg in &mut messages {
        msg.attachments.clear();
    }

    Ok(ChatInput {
        messages,
        uploads,
        linked_images: Vec::new(),
    })
}

async fn read_json(state: &AppState, body: ChatRequest) -> Result<ChatInput> {
    let ChatRequest {
        mut messages,
        mut files,
    } = body;

    for msg in &mut messages {
        files.append(&mut msg.attachments);
    }

    let mut uploads = UploadBatch::default();
    let mut linked_images = Vec::new();
    for attachment in &files {
        // PDFs and CSVs need their bytes; an image URL is enough for the provider.
        if !attachment.url.starts_with("data:")
            && AttachmentKind::classify(&attachment.content_type) == Some(AttachmentKind::Image)
        {
            debug!("Linking image {}", attachment.url);
            linked_images.push(ContentPart::image(attachment.url.clone(), ImageDetail::High));
            continue;
        }

        let (uri_type, bytes) = decode_data_uri(&attachment.url)?;
        let mime_type = if attachment.content_type.is_empty() {
            uri_type
        } else {
            attachment.content_type.clone()
        };
        let name = attachment.name.as_deref().unwrap_or("attachment");
        uploads.push(state.uploads.store_bytes(name, &mime_type, &bytes).await?);
    }

    Ok(ChatInput {
        messages,
        uploads,
        linked_images,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{app, body_json, body_string, entries, ScriptedProvider};
    use crate::uploads::UNSUPPORTED_FILE_TYPE;
    use mediassist_chat::ProviderKind;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const HI: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
    const BOUNDARY: &str = "mediassist-test-boundary";

    fn json_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// `messages` field followed by `(filename, content type, bytes)` file parts.
    fn multipart_request(messages: &str, files: &[(&str, &str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"messages\"\r\n\r\n{messages}\r\n"
            )
            .as_bytes(),
        );
        for (name, mime, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_json_chat_streams_content_then_done() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::streaming(HI);
        let app = app(provider.clone(), tmp.path(), 1024);

        let response = app
            .oneshot(json_request(json!({
                "messages": [{"role": "user", "content": "Hello"}]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert!(headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");

        let body = body_string(response).await;
        assert_eq!(body, "data: {\"content\":\"Hi\"}\n\ndata: [DONE]\n\n");

        let sent = provider.sent().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["role"], "system");
        assert_eq!(sent[1], json!({"role": "user", "content": "Hello"}));
    }

    #[tokio::test]
    async fn test_multipart_image_rides_on_last_message() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::streaming(HI);
        let app = app(provider.clone(), tmp.path(), 1024);

        let png: &[u8] = b"\x89PNG fake";
        let messages = r#"[{"role":"user","content":"What is this?"}]"#;
        let response = app
            .oneshot(multipart_request(messages, &[("image.png", "image/png", png)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.ends_with("data: [DONE]\n\n"));

        let sent = provider.sent().unwrap();
        let expected_url = format!("data:image/png;base64,{}", STANDARD.encode(png));
        assert_eq!(
            sent.last().unwrap()["content"],
            json!([
                {"type": "text", "text": "What is this?"},
                {"type": "image_url", "image_url": {"url": expected_url, "detail": "high"}}
            ])
        );
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_json_csv_attachment_becomes_message() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::streaming(HI);
        let app = app(provider.clone(), tmp.path(), 1024);

        let csv = format!("data:text/csv;base64,{}", STANDARD.encode("test,result\nglucose,95\n"));
        let response = app
            .oneshot(json_request(json!({
                "messages": [{
                    "role": "user",
                    "content": "Summarize my labs",
                    "experimental_attachments": [
                        {"contentType": "text/csv", "url": csv, "name": "labs.csv"}
                    ]
                }]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        body_string(response).await;

        let sent = provider.sent().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1]["content"], "Summarize my labs");
        assert_eq!(
            sent[2],
            json!({"role": "user", "content": "CSV Data (labs.csv):\ntest: glucose\nresult: 95"})
        );
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_unsupported_file_is_415_and_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::streaming(HI);
        let app = app(provider.clone(), tmp.path(), 1024);

        let messages = r#"[{"role":"user","content":"hi"}]"#;
        let response = app
            .oneshot(multipart_request(
                messages,
                &[
                    ("scan.png", "image/png", b"png".as_slice()),
                    ("page.html", "text/html", b"<p>".as_slice()),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(response).await, json!({"error": UNSUPPORTED_FILE_TYPE}));
        assert!(provider.sent().is_none());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_oversized_file_is_413_and_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::streaming(HI);
        let app = app(provider.clone(), tmp.path(), 8);

        let messages = r#"[{"role":"user","content":"hi"}]"#;
        let response = app
            .oneshot(multipart_request(
                messages,
                &[("big.png", "image/png", b"0123456789abcdef".as_slice())],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("big.png"));
        assert!(provider.sent().is_none());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_streamed_as_error() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedProvider::failing(), tmp.path(), 1024);

        let response = app
            .oneshot(json_request(json!({
                "messages": [{"role": "user", "content": "Hello"}]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            "data: {\"error\":\"Error from openai API: 500 status code: upstream down\"}\n\ndata: [DONE]\n\n"
        );
    }

    #[tokio::test]
    async fn test_bad_messages_field_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedProvider::streaming(HI), tmp.path(), 1024);

        let response = app
            .oneshot(multipart_request("not json", &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("messages"));
    }

    fn linked_image_request() -> Request<Body> {
        json_request(json!({
            "messages": [{
                "role": "user",
                "content": "Is this mole concerning?",
                "experimental_attachments": [
                    {"contentType": "image/jpeg", "url": "https://cdn.example.com/mole.jpg"}
                ]
            }]
        }))
    }

    #[tokio::test]
    async fn test_linked_image_reaches_openai_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::streaming(HI);
        let app = app(provider.clone(), tmp.path(), 1024);

        let response = app.oneshot(linked_image_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_string(response).await;

        let sent = provider.sent().unwrap();
        assert_eq!(
            sent.last().unwrap()["content"],
            json!([
                {"type": "text", "text": "Is this mole concerning?"},
                {
                    "type": "image_url",
                    "image_url": {"url": "https://cdn.example.com/mole.jpg", "detail": "high"}
                }
            ])
        );
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_linked_image_reaches_anthropic_url_source() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::streaming_as(ProviderKind::Anthropic, "");
        let app = app(provider.clone(), tmp.path(), 1024);

        let response = app.oneshot(linked_image_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_string(response).await;

        let sent = provider.sent().unwrap();
        assert_eq!(
            sent.last().unwrap()["content"],
            json!([
                {"type": "text", "text": "Is this mole concerning?"},
                {
                    "type": "image",
                    "source": {"type": "url", "url": "https://cdn.example.com/mole.jpg"}
                }
            ])
        );
    }

    #[tokio::test]
    async fn test_remote_document_url_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::streaming(HI);
        let app = app(provider.clone(), tmp.path(), 1024);

        let response = app
            .oneshot(json_request(json!({
                "messages": [{"role": "user", "content": "Hello"}],
                "files": [{"contentType": "application/pdf", "url": "https://example.com/report.pdf"}]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(provider.sent().is_none());
    }

    #[tokio::test]
    async fn test_body_over_limit_is_413_and_cleaned() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::streaming(HI);
        // Each file fits the per-file limit; together they exceed the body limit.
        let max_file_size = 64 * 1024;
        let app = app(provider.clone(), tmp.path(), max_file_size);

        let chunk = vec![b'a'; 60 * 1024];
        let files: Vec<(&str, &str, &[u8])> =
            (0..40).map(|_| ("scan.png", "image/png", chunk.as_slice())).collect();
        let messages = r#"[{"role":"user","content":"hi"}]"#;
        let response = app
            .oneshot(multipart_request(messages, &files))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(provider.sent().is_none());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_other_content_type_is_415() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedProvider::streaming(HI), tmp.path(), 1024);

        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_dropped_stream_still_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedProvider::streaming(HI), tmp.path(), 1024);

        let messages = r#"[{"role":"user","content":"hi"}]"#;
        let response = app
            .oneshot(multipart_request(messages, &[("a.png", "image/png", b"png".as_slice())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(entries(tmp.path()), 1);

        // Client goes away without reading the body.
        drop(response);
        assert_eq!(entries(tmp.path()), 0);
    }
}
