//! Shared application state.

use std::sync::Arc;

use mediassist_chat::ProviderAdapter;
use mediassist_core::RelayConfig;

use crate::uploads::UploadStore;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: RelayConfig,
    /// Built once at startup from the provider configuration.
    pub provider: Arc<dyn ProviderAdapter>,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(config: RelayConfig, provider: Arc<dyn ProviderAdapter>) -> Self {
        let uploads = UploadStore::new(&config.upload_dir, config.max_file_size);
        Self {
            config,
            provider,
            uploads,
        }
    }
}
