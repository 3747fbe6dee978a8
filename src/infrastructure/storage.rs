use crate::config::UploadConfig;
use crate::services::storage::{LocalStorageService, StorageError, StorageService};
use std::sync::Arc;
use tracing::info;

/// Creates the upload root once at startup and returns the storage handle.
pub async fn setup_storage(config: &UploadConfig) -> Result<Arc<LocalStorageService>, StorageError> {
    let storage = LocalStorageService::new(&config.upload_dir);
    storage.ensure_root().await?;
    info!("📂 Upload directory '{}' is ready", config.upload_dir);
    Ok(Arc::new(storage))
}
