//! xAI Grok, served through an OpenAI-compatible chat completions API.

use async_trait::async_trait;
use mediassist_core::Result;
use serde_json::Value;
use tracing::debug;

use super::openai::image_message_content;
use super::{
    format_conversation, openai_delta, openai_stream_error, prompts, ByteStream, ProviderAdapter,
    ProviderEndpoint,
};
use crate::types::{ChatMessage, ContentPart, ProviderKind};

pub struct GrokProvider {
    endpoint: ProviderEndpoint,
}

impl GrokProvider {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ProviderAdapter for GrokProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Grok
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
        debug!("Calling Grok with {} messages", messages.len());
        self.endpoint.stream_chat_completions(messages).await
    }

    fn extract_content(&self, chunk: &Value) -> Option<String> {
        openai_delta(chunk)
    }

    fn extract_error(&self, chunk: &Value) -> Option<String> {
        openai_stream_error(chunk)
    }
}
