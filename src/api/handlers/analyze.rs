use crate::AppState;
use crate::api::error::AppError;
use crate::config::UploadConfig;
use crate::models::{ErrorKind, UploadDescriptor};
use crate::services::intake::AnalysisOutcome;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use bytes::BytesMut;

/// Multipart field carrying image parts
pub const FILE_FIELD: &str = "images";
/// Multipart field carrying the optional accompanying text
pub const TEXT_FIELD: &str = "custom_text";

pub struct UploadForm {
    pub files: Vec<UploadDescriptor>,
    pub custom_text: Option<String>,
}

/// The request body limit surfaces as a multipart error carrying 413.
fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Rejected(ErrorKind::FileTooLarge)
    } else {
        tracing::debug!("Multipart parse error: {}", e.body_text());
        AppError::Rejected(ErrorKind::InvalidMultipart)
    }
}

/// Buffers the form, enforcing count and size limits while the stream is read.
///
/// Nothing is written to disk here; the batch is only stored once it is complete.
pub async fn read_upload_form(
    multipart: &mut Multipart,
    config: &UploadConfig,
) -> Result<UploadForm, AppError> {
    let mut files = Vec::new();
    let mut custom_text = None;
    let mut field_count = 0usize;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        field_count += 1;
        if field_count > config.max_fields {
            return Err(ErrorKind::TooManyFields.into());
        }

        let name = field.name().unwrap_or_default().to_string();
        if name == FILE_FIELD {
            if files.len() >= config.max_files {
                return Err(ErrorKind::TooManyFiles.into());
            }

            let original_name = field.file_name().unwrap_or_default().to_string();
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();

            let mut data = BytesMut::new();
            while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                if data.len() + chunk.len() > config.max_file_size {
                    return Err(ErrorKind::FileTooLarge.into());
                }
                data.extend_from_slice(&chunk);
            }

            files.push(UploadDescriptor::new(original_name, mime_type, data.freeze()));
        } else if name == TEXT_FIELD {
            let text = field.text().await.map_err(multipart_error)?;
            if !text.trim().is_empty() {
                custom_text = Some(text);
            }
        } else {
            tracing::debug!("Ignoring unexpected form field {:?}", name);
            while field.chunk().await.map_err(multipart_error)?.is_some() {}
        }
    }

    Ok(UploadForm { files, custom_text })
}

#[utoipa::path(
    post,
    path = "/analyze",
    request_body(content = Multipart, description = "One or more `images` parts and an optional `custom_text` field"),
    responses(
        (status = 200, description = "Images analysed; nothing retained on disk", body = AnalysisOutcome),
        (status = 400, description = "Upload rejected"),
        (status = 413, description = "File too large"),
        (status = 500, description = "Storage failure")
    ),
    tag = "analyze"
)]
pub async fn analyze_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisOutcome>, AppError> {
    let form = match read_upload_form(&mut multipart, &state.config).await {
        Ok(form) => form,
        Err(e) => {
            // Drain the rest of the body so the client sees the error instead of a reset
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            return Err(e);
        }
    };

    let outcome = state.intake.process(form.files, form.custom_text).await?;
    Ok(Json(outcome))
}
