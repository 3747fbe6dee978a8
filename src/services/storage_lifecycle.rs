use crate::services::storage::StorageService;
use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use utoipa::ToSchema;

/// Outcome of a best-effort batch deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct CleanupReport {
    pub requested: usize,
    pub deleted: usize,
    pub already_gone: usize,
    pub failed: usize,
}

impl CleanupReport {
    /// A file that was already gone counts as cleaned up.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UploadDirStatus {
    pub file_count: usize,
    pub total_bytes: u64,
}

/// Deletes transient uploads: per request, by age, or wholesale.
///
/// Nothing here returns an error. Failures are logged and counted so cleanup
/// can never replace the outcome of the request that triggered it.
pub struct StorageLifecycleService {
    storage: Arc<dyn StorageService>,
}

impl StorageLifecycleService {
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self { storage }
    }

    /// Deletes every path concurrently; one failure never stops its siblings.
    pub async fn cleanup_files(&self, paths: &[PathBuf]) -> CleanupReport {
        let results = join_all(paths.iter().map(|path| self.storage.delete_file(path))).await;

        let mut report = CleanupReport {
            requested: paths.len(),
            ..Default::default()
        };
        for (path, result) in paths.iter().zip(results) {
            match result {
                Ok(true) => report.deleted += 1,
                Ok(false) => report.already_gone += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        "Failed to delete upload {:?}: {}",
                        path.file_name().unwrap_or_default(),
                        e
                    );
                }
            }
        }

        if report.requested > 0 {
            tracing::debug!(
                "Cleanup: {} requested, {} deleted, {} already gone, {} failed",
                report.requested,
                report.deleted,
                report.already_gone,
                report.failed
            );
        }
        report
    }

    /// Deletes files whose modification time is strictly older than `max_age`.
    pub async fn sweep_expired(&self, max_age: Duration) -> usize {
        let files = match self.storage.list_files().await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Age sweep could not list upload directory: {}", e);
                return 0;
            }
        };

        let cutoff = Utc::now() - max_age;
        let expired: Vec<PathBuf> = files
            .into_iter()
            .filter(|f| f.last_modified.is_some_and(|modified| modified < cutoff))
            .map(|f| f.path)
            .collect();

        if expired.is_empty() {
            return 0;
        }

        let report = self.cleanup_files(&expired).await;
        tracing::info!(
            "🧹 Age sweep removed {} stale upload(s) older than {} minutes",
            report.deleted,
            max_age.num_minutes()
        );
        report.deleted
    }

    /// Deletes every non-dot file in the upload root.
    pub async fn wipe_all(&self) -> usize {
        let files = match self.storage.list_files().await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Wipe could not list upload directory: {}", e);
                return 0;
            }
        };

        let paths: Vec<PathBuf> = files.into_iter().map(|f| f.path).collect();
        let report = self.cleanup_files(&paths).await;
        if report.deleted > 0 {
            tracing::info!("🧽 Wiped {} file(s) from upload directory", report.deleted);
        }
        report.deleted
    }

    pub async fn status(&self) -> UploadDirStatus {
        match self.storage.list_files().await {
            Ok(files) => UploadDirStatus {
                file_count: files.len(),
                total_bytes: files.iter().map(|f| f.size).sum(),
            },
            Err(e) => {
                tracing::warn!("Could not read upload directory status: {}", e);
                UploadDirStatus::default()
            }
        }
    }
}

/// Deletion obligation for one batch of stored files.
///
/// Paths are registered with `track` as soon as each file exists on disk.
/// `run` performs the normal cleanup. If the guard is dropped without `run`
/// (the request future was cancelled), the files are removed on the blocking
/// pool, or inline when no runtime is available.
pub struct CleanupGuard {
    paths: Mutex<Vec<PathBuf>>,
}

impl CleanupGuard {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: Mutex::new(paths),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn track(&self, path: PathBuf) {
        let mut paths = self.lock();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    /// Gives up the obligation without deleting anything.
    pub fn release(self) -> Vec<PathBuf> {
        let paths = std::mem::take(&mut *self.lock());
        paths
    }

    pub async fn run(self, lifecycle: &StorageLifecycleService) -> CleanupReport {
        let paths = self.release();
        lifecycle.cleanup_files(&paths).await
    }
}

fn remove_abandoned(paths: Vec<PathBuf>) {
    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove abandoned upload: {}", e),
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let paths = std::mem::take(
            self.paths
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if paths.is_empty() {
            return;
        }
        tracing::warn!(
            "Request ended before cleanup ran, removing {} upload(s)",
            paths.len()
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_abandoned(paths));
            }
            Err(_) => remove_abandoned(paths),
        }
    }
}
