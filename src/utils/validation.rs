use crate::config::UploadConfig;
use crate::models::{ErrorKind, UploadDescriptor, ValidationState};

/// Maximum filename length in bytes
pub const MAX_FILENAME_LENGTH: usize = 255;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Executable and script extensions rejected anywhere in a filename.
///
/// Matched as substrings, so `shell.php.jpg` is caught as well as `shell.php`.
pub const DANGEROUS_EXTENSIONS: &[&str] = &[
    ".exe", ".bat", ".cmd", ".com", ".pif", ".scr", ".vbs", ".js", ".jar", ".php", ".asp",
    ".jsp", ".sh", ".py", ".pl", ".rb", ".cgi", ".dll", ".msi", ".ps1", ".app", ".deb", ".rpm",
];

const SERVER_SCRIPT_SUFFIXES: &[&str] = &[".php", ".asp", ".jsp", ".cgi", ".pl"];

const RESERVED_DEVICE_NAMES: &[&str] = &["con", "prn", "aux", "nul"];

const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Normalizes a declared content type: parameters dropped, lowercased.
pub fn normalize_mime(content_type: &str) -> String {
    match content_type.trim().parse::<mime::Mime>() {
        Ok(m) => m.essence_str().to_ascii_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase(),
    }
}

pub fn is_allowed_mime(content_type: &str) -> bool {
    let normalized = normalize_mime(content_type);
    ALLOWED_MIME_TYPES.contains(&normalized.as_str())
}

pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Returns the lowercased extension (with leading dot) of the last path
/// component of a client filename.
///
/// A component whose only dot is the leading one (`.png`) has no extension.
pub fn file_extension(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let idx = base.rfind('.')?;
    if idx == 0 {
        return None;
    }
    Some(base[idx..].to_ascii_lowercase())
}

/// Maps an image MIME type to the extension used on disk, defaulting to `.jpg`.
pub fn mime_to_extension(content_type: &str) -> &'static str {
    let normalized = normalize_mime(content_type);
    if normalized == mime::IMAGE_PNG.essence_str() {
        ".png"
    } else if normalized == mime::IMAGE_GIF.essence_str() {
        ".gif"
    } else if normalized == "image/webp" {
        ".webp"
    } else {
        ".jpg"
    }
}

fn contains_path_pattern(filename: &str) -> bool {
    filename.contains("..") || filename.contains('/') || filename.contains('\\')
}

fn contains_dangerous_extension(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    DANGEROUS_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

/// Device names are reserved regardless of extension (`con.jpg` opens `CON`).
fn is_reserved_device_name(filename: &str) -> bool {
    let stem = filename
        .split('.')
        .next()
        .unwrap_or(filename)
        .to_ascii_lowercase();
    if RESERVED_DEVICE_NAMES.contains(&stem.as_str()) {
        return true;
    }
    let bytes = stem.as_bytes();
    bytes.len() == 4
        && (stem.starts_with("com") || stem.starts_with("lpt"))
        && (b'1'..=b'9').contains(&bytes[3])
}

fn is_malicious_filename(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    SERVER_SCRIPT_SUFFIXES.iter().any(|s| lower.ends_with(s))
        || is_reserved_device_name(filename)
        || filename.contains(ILLEGAL_FILENAME_CHARS)
}

/// Runs the ordered per-file checks. The first failing check decides the kind.
pub fn validate_descriptor(descriptor: &UploadDescriptor) -> ValidationState {
    let name = descriptor.original_name.as_str();

    if !is_allowed_mime(&descriptor.mime_type) {
        return ValidationState::Rejected(ErrorKind::InvalidMimeType);
    }

    if let Some(ext) = file_extension(name) {
        if !is_allowed_extension(&ext) {
            return ValidationState::Rejected(ErrorKind::InvalidExtension);
        }
    }

    if contains_path_pattern(name) {
        tracing::warn!("Path traversal attempt detected: {:?}", name);
        return ValidationState::Rejected(ErrorKind::InvalidFilenamePath);
    }

    if contains_dangerous_extension(name) {
        tracing::warn!("Dangerous filename detected: {:?}", name);
        return ValidationState::Rejected(ErrorKind::DangerousFilename);
    }

    if name.len() > MAX_FILENAME_LENGTH {
        return ValidationState::Rejected(ErrorKind::FilenameTooLong);
    }

    if name.contains('\0') {
        return ValidationState::Rejected(ErrorKind::NullByteFilename);
    }

    if is_malicious_filename(name) {
        tracing::warn!("Malicious filename pattern detected: {:?}", name);
        return ValidationState::Rejected(ErrorKind::MaliciousFilename);
    }

    ValidationState::Accepted
}

pub fn validate_file_size(size: u64, max_size: usize) -> Result<(), ErrorKind> {
    if size > max_size as u64 {
        return Err(ErrorKind::FileTooLarge);
    }
    Ok(())
}

/// Batch-level limits checked before any file in the batch is written.
pub fn validate_batch(
    descriptors: &[UploadDescriptor],
    custom_text: Option<&str>,
    config: &UploadConfig,
) -> Result<(), ErrorKind> {
    if descriptors.is_empty() {
        return Err(ErrorKind::NoFiles);
    }
    if descriptors.len() > config.max_files {
        return Err(ErrorKind::TooManyFiles);
    }
    if let Some(text) = custom_text {
        if text.chars().count() > config.max_text_length {
            return Err(ErrorKind::FieldTooLong);
        }
    }
    for descriptor in descriptors {
        validate_file_size(descriptor.size, config.max_file_size)?;
    }
    Ok(())
}

/// Same rules as client filenames, applied to the configured upload directory.
pub fn is_safe_relative_dir(dir: &str) -> bool {
    let path = std::path::Path::new(dir);
    !dir.is_empty()
        && !dir.contains("..")
        && !dir.contains('\0')
        && !path.is_absolute()
        && !dir.starts_with('/')
        && !dir.starts_with('\\')
}
