//! MediAssist core: error types, server configuration and upload size limits.

pub mod config;
pub mod error;
pub mod file_size;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use file_size::{format_megabytes, parse_file_size, DEFAULT_MAX_FILE_SIZE};
