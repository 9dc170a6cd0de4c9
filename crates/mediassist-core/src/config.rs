//! Server configuration and upload directory management.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::file_size::{parse_file_size, DEFAULT_MAX_FILE_SIZE};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// HTTP server port.
    pub port: u16,
    /// Per-file upload ceiling in bytes.
    pub max_file_size: u64,
    /// Origin allowed by CORS.
    pub frontend_url: String,
    /// Directory holding uploaded files for the lifetime of one request.
    pub upload_dir: PathBuf,
    /// Ceiling on a single upstream completion, streaming included.
    pub request_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            frontend_url: DEFAULT_FRONTEND_URL.into(),
            upload_dir: default_upload_dir(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("mediassist-uploads")
}

impl RelayConfig {
    /// Create configuration from environment and defaults. Creates the upload directory.
    pub fn from_env() -> std::io::Result<Self> {
        let config = Self::from_vars(|key| std::env::var(key).ok());
        std::fs::create_dir_all(&config.upload_dir)?;
        Ok(config)
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port = var("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let max_file_size = var("MAX_FILE_SIZE")
            .map(|s| parse_file_size(&s))
            .unwrap_or(defaults.max_file_size);

        let frontend_url = var("FRONTEND_URL").unwrap_or(defaults.frontend_url);

        let upload_dir = var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_dir);

        let request_timeout = var("REQUEST_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Self {
            port,
            max_file_size,
            frontend_url,
            upload_dir,
            request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_vars(vars(&[]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.frontend_url, DEFAULT_FRONTEND_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = RelayConfig::from_vars(vars(&[
            ("PORT", "3002"),
            ("MAX_FILE_SIZE", "25MB"),
            ("UPLOAD_DIR", "/tmp/uploads-test"),
            ("REQUEST_TIMEOUT_SECS", "30"),
        ]));
        assert_eq!(config.port, 3002);
        assert_eq!(config.max_file_size, 25 * 1024 * 1024);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/uploads-test"));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = RelayConfig::from_vars(vars(&[
            ("PORT", "not-a-port"),
            ("REQUEST_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.request_timeout, Duration::from_secs(300));
    }
}
