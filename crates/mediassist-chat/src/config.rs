//! Provider selection from the environment.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::ProviderKind;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-latest";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-reasoner";
pub const DEFAULT_GROK_MODEL: &str = "grok-2-1212";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const GROK_BASE_URL: &str = "https://api.x.ai/v1";

/// Everything needed to build the active provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl ProviderConfig {
    /// Configuration for `kind` with its default model and endpoint.
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            model: default_model(kind).into(),
            base_url: default_base_url(kind).into(),
        }
    }

    /// Load from `AI_PROVIDER`, the provider's API key variable, `AI_MODEL` and `AI_BASE_URL`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let requested = var("AI_PROVIDER").unwrap_or_else(|| "openai".into());
        let kind = ProviderKind::parse(&requested).unwrap_or_else(|| {
            warn!("Unknown AI_PROVIDER {:?}, falling back to openai", requested);
            ProviderKind::OpenAI
        });

        let api_key = var(api_key_var(kind)).unwrap_or_default();
        let mut config = Self::new(kind, api_key);

        if let Some(model) = var("AI_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = model;
        }
        if let Some(url) = var("AI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        config
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Environment variable holding the API key for `kind`.
pub fn api_key_var(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAI => "OPENAI_API_KEY",
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        ProviderKind::DeepSeek => "DEEPSEEK_API_KEY",
        ProviderKind::Grok => "GROK_API_KEY",
    }
}

pub fn default_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAI => DEFAULT_OPENAI_MODEL,
        ProviderKind::Anthropic => DEFAULT_ANTHROPIC_MODEL,
        ProviderKind::DeepSeek => DEFAULT_DEEPSEEK_MODEL,
        ProviderKind::Grok => DEFAULT_GROK_MODEL,
    }
}

pub fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAI => OPENAI_BASE_URL,
        ProviderKind::Anthropic => ANTHROPIC_BASE_URL,
        ProviderKind::DeepSeek => DEEPSEEK_BASE_URL,
        ProviderKind::Grok => GROK_BASE_URL,
    }
}
