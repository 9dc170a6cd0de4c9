//! OpenAI chat completions.

use async_trait::async_trait;
use mediassist_core::Result;
use serde_json::{json, Value};

use super::{
    format_conversation, openai_delta, openai_stream_error, prompts, ByteStream, ProviderAdapter,
    ProviderEndpoint,
};
use crate::types::{ChatMessage, ContentPart, ProviderKind};

pub struct OpenAIProvider {
    endpoint: ProviderEndpoint,
}

impl OpenAIProvider {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }
}

/// `[text, image_url, image_url, ...]` content for vision-capable chat-completions APIs.
pub(super) fn image_message_content(text: &str, images: &[ContentPart]) -> Value {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(json!(ContentPart::text(text)));
    parts.extend(images.iter().map(|image| json!(image)));
    Value::Array(parts)
}

#[async_trait]
impl ProviderAdapter for OpenAIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
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
        self.endpoint.stream_chat_completions(messages).await
    }

    fn extract_content(&self, chunk: &Value) -> Option<String> {
        openai_delta(chunk)
    }

    fn extract_error(&self, chunk: &Value) -> Option<String> {
        openai_stream_error(chunk)
    }
}
