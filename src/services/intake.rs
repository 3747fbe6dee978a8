use crate::api::error::{AppError, FileRejection};
use crate::config::UploadConfig;
use crate::models::{StoredFile, UploadDescriptor, ValidationState};
use crate::services::analyzer::ImageAnalyzer;
use crate::services::storage::StorageService;
use crate::services::storage_lifecycle::{CleanupGuard, CleanupReport, StorageLifecycleService};
use crate::utils::naming::generate_storage_name;
use crate::utils::validation::{file_extension, validate_batch, validate_descriptor};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// A fully written batch together with its deletion obligation.
pub struct StoredBatch {
    pub files: Vec<StoredFile>,
    guard: CleanupGuard,
}

impl StoredBatch {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.guard.paths()
    }

    pub async fn cleanup(self, lifecycle: &StorageLifecycleService) -> CleanupReport {
        self.guard.run(lifecycle).await
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalysisOutcome {
    pub batch_id: Uuid,
    pub file_count: usize,
    #[schema(value_type = Object)]
    pub result: Value,
}

/// Validates, stores, hands off and always deletes one upload batch.
pub struct IntakeService {
    storage: Arc<dyn StorageService>,
    lifecycle: Arc<StorageLifecycleService>,
    analyzer: Arc<dyn ImageAnalyzer>,
    config: UploadConfig,
}

impl IntakeService {
    pub fn new(
        storage: Arc<dyn StorageService>,
        lifecycle: Arc<StorageLifecycleService>,
        analyzer: Arc<dyn ImageAnalyzer>,
        config: UploadConfig,
    ) -> Self {
        Self {
            storage,
            lifecycle,
            analyzer,
            config,
        }
    }

    /// Screens every descriptor and writes the accepted batch.
    ///
    /// Either every file of the batch is stored, or none is left on disk.
    pub async fn ingest(
        &self,
        descriptors: &[UploadDescriptor],
        custom_text: Option<&str>,
    ) -> Result<StoredBatch, AppError> {
        validate_batch(descriptors, custom_text, &self.config)?;

        let rejections: Vec<FileRejection> = descriptors
            .iter()
            .filter_map(|d| match validate_descriptor(d) {
                ValidationState::Rejected(code) => Some(FileRejection {
                    filename: d.original_name.clone(),
                    code,
                }),
                _ => None,
            })
            .collect();
        if !rejections.is_empty() {
            return Err(AppError::InvalidFiles(rejections));
        }

        let names = descriptors
            .iter()
            .map(|d| {
                let ext = file_extension(&d.original_name);
                generate_storage_name(&d.mime_type, ext.as_deref())
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Each path is owed a deletion from the moment its write returns
        let guard = CleanupGuard::new(Vec::new());
        let writes = descriptors.iter().zip(&names).map(|(d, name)| {
            let guard = &guard;
            async move {
                let result = self.storage.write_file(name, &d.data).await;
                if let Ok(path) = &result {
                    guard.track(path.clone());
                }
                result
            }
        });
        let results = join_all(writes).await;

        let mut files = Vec::with_capacity(descriptors.len());
        let mut first_error = None;
        for ((descriptor, name), result) in descriptors.iter().zip(names).zip(results) {
            match result {
                Ok(path) => files.push(StoredFile::new(descriptor, name, path)),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            tracing::error!("Batch write failed, rolling back {} stored file(s)", files.len());
            guard.run(&self.lifecycle).await;
            return Err(e.into());
        }

        tracing::info!("📥 Stored {} upload(s)", files.len());
        Ok(StoredBatch { files, guard })
    }

    /// Runs the full request lifecycle: ingest, downstream analysis, cleanup.
    ///
    /// Cleanup runs before this returns on success, analysis error and timeout.
    pub async fn process(
        &self,
        descriptors: Vec<UploadDescriptor>,
        custom_text: Option<String>,
    ) -> Result<AnalysisOutcome, AppError> {
        let batch_id = Uuid::new_v4();
        let span = tracing::info_span!("upload_batch", %batch_id, files = descriptors.len());

        async move {
            let batch = self.ingest(&descriptors, custom_text.as_deref()).await?;
            drop(descriptors);

            let outcome = tokio::time::timeout(
                self.config.processing_timeout(),
                self.analyzer.analyze(&batch.files, custom_text.as_deref()),
            )
            .await;

            let file_count = batch.files.len();
            let report = batch.cleanup(&self.lifecycle).await;
            if !report.is_success() {
                tracing::warn!(
                    "{} of {} upload(s) could not be deleted; left for the age sweep",
                    report.failed,
                    report.requested
                );
            }

            match outcome {
                Ok(Ok(result)) => {
                    tracing::info!("✅ Batch analysed and cleaned up");
                    Ok(AnalysisOutcome {
                        batch_id,
                        file_count,
                        result,
                    })
                }
                Ok(Err(e)) => Err(AppError::Processing(e)),
                Err(_) => {
                    tracing::warn!(
                        "Analysis exceeded {:?}",
                        self.config.processing_timeout()
                    );
                    Err(AppError::ProcessingTimeout)
                }
            }
        }
        .instrument(span)
        .await
    }
}
