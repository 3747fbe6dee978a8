use crate::models::ErrorKind;
use crate::services::storage_lifecycle::CleanupGuard;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

/// Marker kept in the upload root so the directory survives in deployment artifacts.
pub const MARKER_FILE: &str = ".gitkeep";

/// Storage failures. Display strings never contain host paths.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("upload directory unavailable")]
    Directory(#[source] io::Error),

    #[error("resolved path escapes the upload directory")]
    PathOutsideUploadDirectory,

    #[error("could not generate a safe storage name")]
    NameGeneration,

    #[error("failed to write upload")]
    Write(#[source] io::Error),

    #[error("failed to delete upload")]
    Delete(#[source] io::Error),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Directory(_) => ErrorKind::DirectoryError,
            StorageError::PathOutsideUploadDirectory => ErrorKind::PathOutsideUploadDirectory,
            StorageError::NameGeneration => ErrorKind::FilenameGenerationError,
            StorageError::Write(_) | StorageError::Delete(_) => ErrorKind::StorageWriteError,
        }
    }
}

pub struct FileMetadata {
    pub path: PathBuf,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the upload root if absent and returns its canonical path.
    async fn ensure_root(&self) -> Result<PathBuf, StorageError>;

    /// Writes `data` under `storage_name` and returns the resolved absolute path.
    async fn write_file(&self, storage_name: &str, data: &[u8]) -> Result<PathBuf, StorageError>;

    /// Removes a stored file. Returns `false` when it was already gone.
    async fn delete_file(&self, path: &Path) -> Result<bool, StorageError>;

    /// Lists regular, non-dot files directly under the upload root.
    async fn list_files(&self) -> Result<Vec<FileMetadata>, StorageError>;
}

/// Flat upload directory on the local filesystem.
pub struct LocalStorageService {
    root: PathBuf,
    canonical_root: OnceCell<PathBuf>,
}

impl LocalStorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            canonical_root: OnceCell::new(),
        }
    }

    fn current_root(&self) -> PathBuf {
        self.canonical_root
            .get()
            .cloned()
            .unwrap_or_else(|| self.root.clone())
    }
}

/// Check-then-create with tolerance for a concurrent creator.
pub async fn create_upload_dir(dir: &Path) -> Result<(), StorageError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(StorageError::Directory(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "upload root exists and is not a directory",
            )));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(StorageError::Directory(e)),
    }

    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);

    match builder.create(dir).await {
        Ok(()) => {
            tracing::info!("📁 Created upload directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(StorageError::Directory(e)),
    }
}

/// Resolves `storage_name` against the canonical `root` and enforces containment.
///
/// The parent is canonicalized (the file itself does not exist yet), so symlinked
/// or `..` parents resolve to their real location before the prefix check.
pub async fn resolve_within(root: &Path, storage_name: &str) -> Result<PathBuf, StorageError> {
    let candidate = root.join(storage_name);

    let file_name = match candidate.components().next_back() {
        Some(Component::Normal(name)) => name.to_owned(),
        _ => return Err(StorageError::PathOutsideUploadDirectory),
    };
    let parent = candidate
        .parent()
        .ok_or(StorageError::PathOutsideUploadDirectory)?;

    let canonical_parent = tokio::fs::canonicalize(parent).await.map_err(|e| {
        if parent == root {
            StorageError::Directory(e)
        } else {
            StorageError::PathOutsideUploadDirectory
        }
    })?;
    let resolved = canonical_parent.join(file_name);

    if !resolved.starts_with(root) || resolved.parent() != Some(root) {
        tracing::error!("Blocked storage path outside upload directory");
        return Err(StorageError::PathOutsideUploadDirectory);
    }
    Ok(resolved)
}

fn map_write_error(e: io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => StorageError::Directory(e),
        _ => StorageError::Write(e),
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn ensure_root(&self) -> Result<PathBuf, StorageError> {
        let root = self
            .canonical_root
            .get_or_try_init(|| async {
                create_upload_dir(&self.root).await?;
                tokio::fs::canonicalize(&self.root)
                    .await
                    .map_err(StorageError::Directory)
            })
            .await?;

        let marker = root.join(MARKER_FILE);
        if tokio::fs::metadata(&marker).await.is_err() {
            if let Err(e) = tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(&marker)
                .await
            {
                tracing::warn!("Could not create upload directory marker: {}", e);
            }
        }

        Ok(root.clone())
    }

    async fn write_file(&self, storage_name: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
        let root = self.ensure_root().await?;
        let resolved = resolve_within(&root, storage_name).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&resolved)
            .await
            .map_err(map_write_error)?;

        // Removes the half-written file if this future is dropped mid-write
        let partial = CleanupGuard::new(vec![resolved.clone()]);
        let written = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&resolved).await;
            partial.release();
            return Err(StorageError::Write(e));
        }
        partial.release();

        tracing::debug!("Stored {} ({} bytes)", storage_name, data.len());
        Ok(resolved)
    }

    async fn delete_file(&self, path: &Path) -> Result<bool, StorageError> {
        let root = self.current_root();
        if !path.starts_with(&root) {
            return Err(StorageError::PathOutsideUploadDirectory);
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Delete(e)),
        }
    }

    async fn list_files(&self) -> Result<Vec<FileMetadata>, StorageError> {
        let root = self.current_root();
        let mut entries = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Directory(e)),
        };

        let mut files = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Stopped listing upload directory early: {}", e);
                    break;
                }
            };

            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            // symlink_metadata: never follow links out of the root
            let meta = match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!("Skipping entry that vanished during listing: {}", e);
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }

            files.push(FileMetadata {
                path: entry.path(),
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                size: meta.len(),
            });
        }

        Ok(files)
    }
}
