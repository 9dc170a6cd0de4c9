//! In-process app with a canned upstream, for route tests.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use mediassist_chat::providers::ByteStream;
use mediassist_chat::{
    build_provider, ChatMessage, ContentPart, ProviderAdapter, ProviderConfig, ProviderKind,
};
use mediassist_core::{Error, RelayConfig, Result};
use serde_json::Value;

use crate::state::AppState;

/// A real adapter's formatting and extraction, with the network call replaced
/// by a fixed body (or a fixed failure). Records what would have been sent.
pub struct ScriptedProvider {
    inner: Arc<dyn ProviderAdapter>,
    body: Option<&'static str>,
    sent: Mutex<Option<Vec<Value>>>,
}

impl ScriptedProvider {
    pub fn streaming(body: &'static str) -> Arc<Self> {
        Self::streaming_as(ProviderKind::OpenAI, body)
    }

    pub fn streaming_as(kind: ProviderKind, body: &'static str) -> Arc<Self> {
        Arc::new(Self::with_body(kind, Some(body)))
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::with_body(ProviderKind::OpenAI, None))
    }

    fn with_body(kind: ProviderKind, body: Option<&'static str>) -> Self {
        let config = ProviderConfig::new(kind, "test-key");
        Self {
            inner: build_provider(&config, Duration::from_secs(5)).unwrap(),
            body,
            sent: Mutex::new(None),
        }
    }

    pub fn sent(&self) -> Option<Vec<Value>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn system_prompt(&self) -> &'static str {
        self.inner.system_prompt()
    }

    fn format_messages(
        &self,
        messages: &[ChatMessage],
        trailing_images: &[ContentPart],
    ) -> Vec<Value> {
        self.inner.format_messages(messages, trailing_images)
    }

    async fn create_chat_completion(&self, messages: Vec<Value>) -> Result<ByteStream> {
        *self.sent.lock().unwrap() = Some(messages);
        match self.body {
            Some(body) => {
                let chunks: Vec<Result<Bytes>> = vec![Ok(Bytes::from_static(body.as_bytes()))];
                Ok(Box::pin(tokio_stream::iter(chunks)))
            }
            None => Err(Error::UpstreamRequest {
                status: Some(500),
                detail: "upstream down".into(),
            }),
        }
    }

    fn extract_content(&self, chunk: &Value) -> Option<String> {
        self.inner.extract_content(chunk)
    }

    fn extract_error(&self, chunk: &Value) -> Option<String> {
        self.inner.extract_error(chunk)
    }
}

pub fn app(provider: Arc<ScriptedProvider>, upload_dir: &Path, max_file_size: u64) -> Router {
    let config = RelayConfig {
        upload_dir: upload_dir.to_path_buf(),
        max_file_size,
        ..RelayConfig::default()
    };
    super::build_router(Arc::new(AppState::new(config, provider)))
}

pub async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}
