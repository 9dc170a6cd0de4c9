//! Chat relay core: attachment normalization, provider adapters, stream relay.
//!
//! A conversation plus its uploaded files is normalized into provider-agnostic
//! messages, formatted for the configured provider (OpenAI/Anthropic/DeepSeek/Grok),
//! and the provider's SSE response is re-framed for the client.

pub mod attachments;
pub mod config;
pub mod providers;
pub mod relay;
pub mod types;

pub use attachments::{normalize, AttachmentKind, NormalizedConversation, UploadedFile};
pub use config::ProviderConfig;
pub use providers::{build_provider, ProviderAdapter};
pub use relay::{relay, RelayEvent};
pub use types::*;
