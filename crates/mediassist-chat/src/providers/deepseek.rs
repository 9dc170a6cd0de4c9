//! DeepSeek chat completions. Text only: images are replaced by a note.

use async_trait::async_trait;
use mediassist_core::Result;
use serde_json::Value;

use super::{
    format_conversation, openai_delta, openai_stream_error, prompts, ByteStream, ProviderAdapter,
    ProviderEndpoint,
};
use crate::types::{ChatMessage, ContentPart, ProviderKind};

pub struct DeepSeekProvider {
    endpoint: ProviderEndpoint,
}

impl DeepSeekProvider {
    pub fn new(endpoint: ProviderEndpoint) -> Self {
        Self { endpoint }
    }
}

fn omitted_images_note(text: &str, count: usize) -> String {
    format!(
        "{}\n[Note: This message includes {} image(s) which may not be directly viewable by the model]",
        text, count
    )
}

#[async_trait]
impl ProviderAdapter for DeepSeekProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    fn model_name(&self) -> &str {
        self.endpoint.model()
    }

    fn system_prompt(&self) -> &'static str {
        prompts::MEDICAL_ASSISTANT_TEXT_ONLY
    }

    fn format_messages(
        &self,
        messages: &[ChatMessage],
        trailing_images: &[ContentPart],
    ) -> Vec<Value> {
        let count = trailing_images.len();
        format_conversation(
            messages,
            count > 0,
            self.system_prompt(),
            &|text: &str| Value::String(omitted_images_note(text, count)),
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
