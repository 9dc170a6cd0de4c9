//! Error types for MediAssist.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("File {name} exceeds the {limit} byte upload limit")]
    FileTooLarge { name: String, limit: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Attachment extraction failed: {0}")]
    AttachmentExtraction(String),

    /// Non-success status from the provider, or a failure to reach it at all.
    #[error("{}", upstream_message(*status, detail))]
    UpstreamRequest { status: Option<u16>, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn upstream_message(status: Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("{} status code: {}", code, detail),
        None => format!("Request failed: {}", detail),
    }
}

impl Error {
    /// Whether the failure was caused by the client's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedContentType(_) | Self::FileTooLarge { .. } | Self::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
