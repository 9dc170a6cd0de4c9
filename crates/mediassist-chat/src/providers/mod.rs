//! External LLM provider adapters.
//!
//! Each provider formats the normalized conversation into its own wire schema,
//! opens a streaming completion, and knows where the text delta lives in its
//! stream chunks. OpenAI, DeepSeek and Grok share the chat-completions format.
//! Anthropic uses the Messages API.

mod anthropic;
mod deepseek;
mod grok;
mod openai;
pub mod prompts;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use mediassist_core::{Error, Result};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::types::{ChatMessage, ContentPart, ProviderKind, Role};

pub use anthropic::AnthropicProvider;
pub use deepseek::DeepSeekProvider;
pub use grok::GrokProvider;
pub use openai::OpenAIProvider;

/// Raw upstream response body, chunked as it arrives from the network.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Provider-specific half of the relay.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model_name(&self) -> &str;

    fn system_prompt(&self) -> &'static str;

    /// Map the conversation into the provider's message schema. Only the last
    /// message, when it is from the user, carries `trailing_images`. A system
    /// message is prepended when the conversation has none.
    fn format_messages(&self, messages: &[ChatMessage], trailing_images: &[ContentPart])
        -> Vec<Value>;

    /// POST the formatted messages with `stream: true`. Fails with
    /// [`Error::UpstreamRequest`] on transport errors and non-success statuses.
    async fn create_chat_completion(&self, messages: Vec<Value>) -> Result<ByteStream>;

    /// Text delta carried by one decoded stream chunk, if any.
    fn extract_content(&self, chunk: &Value) -> Option<String>;

    /// Error reported inside the stream body, if this chunk is one.
    fn extract_error(&self, _chunk: &Value) -> Option<String> {
        None
    }
}

/// Build the adapter for the configured provider.
pub fn build_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn ProviderAdapter>> {
    let endpoint = ProviderEndpoint::new(config, timeout)?;

    let provider: Arc<dyn ProviderAdapter> = match config.kind {
        ProviderKind::OpenAI => Arc::new(OpenAIProvider::new(endpoint)),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(endpoint)),
        ProviderKind::DeepSeek => Arc::new(DeepSeekProvider::new(endpoint)),
        ProviderKind::Grok => Arc::new(GrokProvider::new(endpoint)),
    };

    Ok(provider)
}

/// Connection details shared by every adapter. Immutable once built.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ProviderEndpoint {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Streaming POST to an OpenAI-compatible `/chat/completions` endpoint.
    async fn stream_chat_completions(&self, messages: Vec<Value>) -> Result<ByteStream> {
        let url = self.url("/chat/completions");
        debug!("Streaming from {} with model {}", url, self.model);

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "stream": true,
            }));

        open_stream(request).await
    }
}

/// Send the request and hand back the body stream, or the failure with the body text.
async fn open_stream(request: RequestBuilder) -> Result<ByteStream> {
    let response = request.send().await.map_err(|e| Error::UpstreamRequest {
        status: None,
        detail: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::UpstreamRequest {
            status: Some(status.as_u16()),
            detail: body,
        });
    }

    let body = response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| Error::UpstreamRequest {
            status: None,
            detail: format!("Stream read error: {}", e),
        })
    });

    Ok(Box::pin(body))
}

/// Shared formatting rule. `last_user` renders the content of the final user
/// message when images are attached; every other message is plain text.
fn format_conversation(
    messages: &[ChatMessage],
    has_images: bool,
    system_prompt: &str,
    last_user: &dyn Fn(&str) -> Value,
) -> Vec<Value> {
    let last_index = messages.len().checked_sub(1);
    let mut formatted = Vec::with_capacity(messages.len() + 1);
    let mut has_system = false;

    for (i, msg) in messages.iter().enumerate() {
        if msg.role == Role::System {
            if has_system {
                warn!("Dropping extra system message");
                continue;
            }
            has_system = true;
        }

        let text = msg.content.as_text();
        if has_images && msg.role == Role::User && Some(i) == last_index {
            formatted.push(json!({"role": msg.role, "content": last_user(&text)}));
        } else {
            formatted.push(json!({"role": msg.role, "content": text}));
        }
    }

    if !has_system {
        formatted.insert(0, json!({"role": "system", "content": system_prompt}));
    }

    formatted
}

/// `choices[0].delta.content` of a chat-completions chunk. Empty deltas count as none.
fn openai_delta(chunk: &Value) -> Option<String> {
    chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `{"error": {...}}` frames some OpenAI-compatible servers send mid-stream.
fn openai_stream_error(chunk: &Value) -> Option<String> {
    let error = chunk.get("error")?;
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}
