use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

/// A single file part as received from the multipart parser.
///
/// Every field is client-controlled until `validate_descriptor` has accepted it.
#[derive(Debug, Clone)]
pub struct UploadDescriptor {
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub data: Bytes,
}

impl UploadDescriptor {
    pub fn new(original_name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            original_name: original_name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Pending,
    Accepted,
    Rejected(ErrorKind),
}

impl ValidationState {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationState::Accepted)
    }
}

/// A validated upload that has been written under the upload root.
///
/// The absolute path is never serialized; only the storage layer and
/// downstream consumers see it.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub original_name: String,
    pub storage_name: String,
    #[serde(skip)]
    absolute_path: PathBuf,
    pub mime_type: String,
    pub size: u64,
    #[serde(skip)]
    validation_state: ValidationState,
}

impl StoredFile {
    pub(crate) fn new(
        descriptor: &UploadDescriptor,
        storage_name: String,
        absolute_path: PathBuf,
    ) -> Self {
        Self {
            original_name: descriptor.original_name.clone(),
            storage_name,
            absolute_path,
            mime_type: descriptor.mime_type.clone(),
            size: descriptor.size,
            validation_state: ValidationState::Accepted,
        }
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    pub fn validation_state(&self) -> ValidationState {
        self.validation_state
    }
}

/// Stable classification of every rejection and failure the upload pipeline can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidMimeType,
    InvalidExtension,
    InvalidFilenamePath,
    DangerousFilename,
    FilenameTooLong,
    NullByteFilename,
    MaliciousFilename,
    FileTooLarge,
    TooManyFiles,
    TooManyFields,
    FieldTooLong,
    NoFiles,
    InvalidMultipart,
    FilenameGenerationError,
    PathOutsideUploadDirectory,
    DirectoryError,
    StorageWriteError,
    ProcessingError,
    ProcessingTimeout,
    UnknownError,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidMimeType => "INVALID_MIME_TYPE",
            ErrorKind::InvalidExtension => "INVALID_EXTENSION",
            ErrorKind::InvalidFilenamePath => "INVALID_FILENAME_PATH",
            ErrorKind::DangerousFilename => "DANGEROUS_FILENAME",
            ErrorKind::FilenameTooLong => "FILENAME_TOO_LONG",
            ErrorKind::NullByteFilename => "NULL_BYTE_FILENAME",
            ErrorKind::MaliciousFilename => "MALICIOUS_FILENAME",
            ErrorKind::FileTooLarge => "FILE_TOO_LARGE",
            ErrorKind::TooManyFiles => "TOO_MANY_FILES",
            ErrorKind::TooManyFields => "TOO_MANY_FIELDS",
            ErrorKind::FieldTooLong => "FIELD_TOO_LONG",
            ErrorKind::NoFiles => "NO_FILES",
            ErrorKind::InvalidMultipart => "INVALID_MULTIPART",
            ErrorKind::FilenameGenerationError => "FILENAME_GENERATION_ERROR",
            ErrorKind::PathOutsideUploadDirectory => "PATH_OUTSIDE_UPLOAD_DIRECTORY",
            ErrorKind::DirectoryError => "DIRECTORY_ERROR",
            ErrorKind::StorageWriteError => "STORAGE_WRITE_ERROR",
            ErrorKind::ProcessingError => "PROCESSING_ERROR",
            ErrorKind::ProcessingTimeout => "PROCESSING_TIMEOUT",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Client-fault kinds: the request itself was unacceptable.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidMimeType
                | ErrorKind::InvalidExtension
                | ErrorKind::InvalidFilenamePath
                | ErrorKind::DangerousFilename
                | ErrorKind::FilenameTooLong
                | ErrorKind::NullByteFilename
                | ErrorKind::MaliciousFilename
                | ErrorKind::FileTooLarge
                | ErrorKind::TooManyFiles
                | ErrorKind::TooManyFields
                | ErrorKind::FieldTooLong
                | ErrorKind::NoFiles
                | ErrorKind::InvalidMultipart
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::InvalidFilenamePath).unwrap();
        assert_eq!(json, "\"INVALID_FILENAME_PATH\"");
        let json = serde_json::to_string(&ErrorKind::PathOutsideUploadDirectory).unwrap();
        assert_eq!(json, format!("\"{}\"", ErrorKind::PathOutsideUploadDirectory.code()));
    }

    #[test]
    fn test_stored_file_never_serializes_path() {
        let descriptor = UploadDescriptor::new("a.png", "image/png", Bytes::from_static(b"x"));
        let stored = StoredFile::new(
            &descriptor,
            "image-1-abc.png".to_string(),
            PathBuf::from("/srv/uploads/image-1-abc.png"),
        );
        let json = serde_json::to_string(&stored).unwrap();
        assert!(!json.contains("/srv/uploads"));
        assert!(stored.validation_state().is_accepted());
    }
}
