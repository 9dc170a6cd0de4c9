//! Anthropic Messages API.

use async_trait::async_trait;
use mediassist_core::Result;
use serde_json::{json, Value};
use tracing::debug;

use super::{format_conversation, open_stream, prompts, ByteStream, ProviderAdapter, ProviderEndpoint};
use crate::types::{ChatMessage, ContentPart, ProviderKind};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    endpoint: ProviderEndpoint,
}

impl AnthropicProvider {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }
}

/// Split a `data:<mime>;base64,<payload>` URI into media type and payload.
fn split_data_uri(url: &str) -> (&str, &str) {
    let (prefix, data) = url.split_once(',').unwrap_or(("", url));
    let media_type = prefix
        .strip_prefix("data:")
        .and_then(|meta| meta.split(';').next())
        .filter(|mime| !mime.is_empty())
        .unwrap_or("image/jpeg");
    (media_type, data)
}

fn image_block(part: &ContentPart) -> Option<Value> {
    let ContentPart::ImageUrl { image_url } = part else {
        return None;
    };

    if image_url.url.starts_with("data:") {
        let (media_type, data) = split_data_uri(&image_url.url);
        Some(json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        }))
    } else {
        Some(json!({
            "type": "image",
            "source": {"type": "url", "url": image_url.url},
        }))
    }
}

fn image_message_content(text: &str, images: &[ContentPart]) -> Value {
    let mut blocks = vec![json!({"type": "text", "text": text})];
    blocks.extend(images.iter().filter_map(image_block));
    Value::Array(blocks)
}

/// Move the system message out of the list into the request's `system` field.
fn build_request_body(model: &str, messages: Vec<Value>) -> Value {
    let mut system = None;
    let mut conversation = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg["role"] == "system" {
            if system.is_none() {
                system = Some(msg["content"].clone());
            }
        } else {
            conversation.push(msg);
        }
    }

    let mut body = json!({
        "model": model,
        "messages": conversation,
        "max_tokens": ANTHROPIC_MAX_TOKENS,
        "stream": true,
    });
    if let Some(system) = system {
        body["system"] = system;
    }
    body
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model_name(&self) -> &str {
        self.endpoint.model()
    }

    fn system_prompt(&self) -> &'static str {
        prompts::MEDICAL_ASSISTANT
    }

    fn format_messages(
        &self,
        messages: &[ChatMessage],
        trailing_images: &[ContentPart],
    ) -> Vec<Value> {
        format_conversation(
            messages,
            !trailing_images.is_empty(),
            self.system_prompt(),
            &|text: &str| image_message_content(text, trailing_images),
        )
    }

    async fn create_chat_completion(&self, messages: Vec<Value>) -> Result<ByteStream> {
        let url = self.endpoint.url("/messages");
        debug!("Streaming from Anthropic with model {}", self.endpoint.model);

        let request = self
            .endpoint
            .client
            .post(&url)
            .header("x-api-key", &self.endpoint.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&build_request_body(&self.endpoint.model, messages));

        open_stream(request).await
    }

    fn extract_content(&self, chunk: &Value) -> Option<String> {
        chunk
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn extract_error(&self, chunk: &Value) -> Option<String> {
        if chunk["type"] != "error" {
            return None;
        }
        Some(
            chunk
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string(),
        )
    }
}
