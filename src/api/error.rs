use crate::models::ErrorKind;
use crate::services::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

/// One rejected file in a batch, identified by the client's own filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FileRejection {
    pub filename: String,
    pub code: ErrorKind,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Upload rejected: {0}")]
    Rejected(ErrorKind),

    #[error("Upload rejected: {} file(s) failed validation", .0.len())]
    InvalidFiles(Vec<FileRejection>),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Processing failed: {0}")]
    Processing(anyhow::Error),

    #[error("Processing timed out")]
    ProcessingTimeout,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Rejected(kind) => *kind,
            AppError::InvalidFiles(rejections) => rejections
                .first()
                .map(|r| r.code)
                .unwrap_or(ErrorKind::UnknownError),
            AppError::Storage(e) => e.kind(),
            // A consumer failure caused by a known error keeps that error's kind
            AppError::Processing(e) => match classify(e) {
                ErrorKind::UnknownError => ErrorKind::ProcessingError,
                kind => kind,
            },
            AppError::ProcessingTimeout => ErrorKind::ProcessingTimeout,
        }
    }
}

impl From<ErrorKind> for AppError {
    fn from(kind: ErrorKind) -> Self {
        AppError::Rejected(kind)
    }
}

/// Maps an arbitrary error chain onto the stable taxonomy; anything unrecognised is `UnknownError`.
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<StorageError>() {
            return e.kind();
        }
        if let Some(e) = cause.downcast_ref::<AppError>() {
            return e.kind();
        }
    }
    ErrorKind::UnknownError
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::ProcessingError => StatusCode::BAD_GATEWAY,
        ErrorKind::ProcessingTimeout => StatusCode::GATEWAY_TIMEOUT,
        k if k.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client-facing message. Never includes paths or internal error text.
pub fn public_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidMimeType => "Only JPEG, PNG, GIF and WebP images are allowed",
        ErrorKind::InvalidExtension => "File extension does not match an allowed image type",
        ErrorKind::InvalidFilenamePath => "Filename must not contain path separators or '..'",
        ErrorKind::DangerousFilename => "Filename contains a disallowed executable extension",
        ErrorKind::FilenameTooLong => "Filename exceeds 255 bytes",
        ErrorKind::NullByteFilename => "Filename contains a null byte",
        ErrorKind::MaliciousFilename => "Filename contains reserved names or illegal characters",
        ErrorKind::FileTooLarge => "File exceeds the maximum allowed size",
        ErrorKind::TooManyFiles => "Too many files in one request",
        ErrorKind::TooManyFields => "Too many form fields in one request",
        ErrorKind::FieldTooLong => "Text field exceeds the maximum allowed length",
        ErrorKind::NoFiles => "No image files were provided",
        ErrorKind::InvalidMultipart => "Malformed multipart request",
        ErrorKind::FilenameGenerationError
        | ErrorKind::PathOutsideUploadDirectory
        | ErrorKind::DirectoryError
        | ErrorKind::StorageWriteError => "Upload failed due to a server configuration issue",
        ErrorKind::ProcessingError => "Image processing failed",
        ErrorKind::ProcessingTimeout => "Image processing timed out",
        ErrorKind::UnknownError => "An unexpected error occurred",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        if status.is_server_error() {
            tracing::error!("{} ({}): {:?}", kind, status, self);
        } else {
            tracing::warn!("Upload rejected with {}", kind);
        }

        let body = match self {
            AppError::InvalidFiles(rejections) => json!({
                "error": public_message(kind),
                "code": kind,
                "files": rejections,
            }),
            _ => json!({
                "error": public_message(kind),
                "code": kind,
            }),
        };

        (status, Json(body)).into_response()
    }
}
