use crate::services::storage::StorageError;
use crate::utils::validation::{is_allowed_extension, mime_to_extension};
use rand::RngCore;
use rand::rngs::OsRng;

pub const STORAGE_NAME_PREFIX: &str = "image-";

/// Random bytes per storage name (128 bits)
const TOKEN_BYTES: usize = 16;

/// True when every byte of `name` is in `[A-Za-z0-9._-]`.
pub fn is_safe_storage_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// Generates an unguessable on-disk name: `image-<epoch ms>-<32 hex chars><ext>`.
///
/// The client extension is reused only if it is on the allow-list; otherwise the
/// extension is derived from the (already validated) MIME type.
pub fn generate_storage_name(
    mime_type: &str,
    original_extension: Option<&str>,
) -> Result<String, StorageError> {
    let ext = match original_extension {
        Some(ext) if is_allowed_extension(ext) => ext.to_ascii_lowercase(),
        _ => mime_to_extension(mime_type).to_string(),
    };

    let mut token = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut token);
    let timestamp = chrono::Utc::now().timestamp_millis();

    let name = format!("{}{}-{}{}", STORAGE_NAME_PREFIX, timestamp, hex::encode(token), ext);

    if !is_safe_storage_name(&name) {
        tracing::error!("Generated storage name failed character check");
        return Err(StorageError::NameGeneration);
    }
    Ok(name)
}
