use crate::utils::validation::is_safe_relative_dir;
use std::env;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("UPLOAD_DIR must be a relative path without '..': {0:?}")]
    UnsafeUploadDir(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Which services a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// HTTP intake only
    Api,
    /// Age sweep only
    Worker,
    /// Both in one process
    All,
}

impl RunMode {
    pub fn serves_requests(self) -> bool {
        matches!(self, RunMode::Api | RunMode::All)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, RunMode::Worker | RunMode::All)
    }

    /// Whether this process wipes the upload directory at startup and shutdown.
    /// A sweep-only process must leave in-flight uploads of an API process alone.
    pub fn owns_upload_dir(self) -> bool {
        self.serves_requests()
    }
}

/// Upload limits and lifecycle settings
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum size of a single file in bytes (default: 10 MB)
    pub max_file_size: usize,

    /// Maximum number of files per request (default: 10)
    pub max_files: usize,

    /// Maximum number of multipart fields per request (default: 20)
    pub max_fields: usize,

    /// Maximum length of the accompanying text field in characters (default: 1000)
    pub max_text_length: usize,

    /// Upload directory, relative to the working directory (default: "uploads")
    pub upload_dir: String,

    /// Files older than this are removed by the age sweep (default: 30)
    pub cleanup_max_age_minutes: u64,

    /// How often the background worker sweeps (default: 10)
    pub cleanup_interval_minutes: u64,

    /// Time budget for downstream processing of one batch (default: 60)
    pub processing_timeout_secs: u64,

    /// Expose manual cleanup endpoints (default: false)
    pub enable_admin_endpoints: bool,

    /// Downstream analyzer: "metadata" or "noop" (default: "metadata")
    pub analyzer_type: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10 MB
            max_files: 10,
            max_fields: 20,
            max_text_length: 1000,
            upload_dir: "uploads".to_string(),
            cleanup_max_age_minutes: 30,
            cleanup_interval_minutes: 10,
            processing_timeout_secs: 60,
            enable_admin_endpoints: false,
            analyzer_type: "metadata".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: parse_env("MAX_FILE_SIZE", default.max_file_size),
            max_files: parse_env("MAX_FILES", default.max_files),
            max_fields: parse_env("MAX_FIELDS", default.max_fields),
            max_text_length: parse_env("MAX_TEXT_LENGTH", default.max_text_length),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or(default.upload_dir),
            cleanup_max_age_minutes: parse_env(
                "CLEANUP_MAX_AGE_MINUTES",
                default.cleanup_max_age_minutes,
            ),
            cleanup_interval_minutes: parse_env(
                "CLEANUP_INTERVAL_MINUTES",
                default.cleanup_interval_minutes,
            ),
            processing_timeout_secs: parse_env(
                "PROCESSING_TIMEOUT_SECS",
                default.processing_timeout_secs,
            ),
            enable_admin_endpoints: env::var("ENABLE_ADMIN_ENDPOINTS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.enable_admin_endpoints),
            analyzer_type: env::var("ANALYZER_TYPE").unwrap_or(default.analyzer_type),
        }
    }

    /// Create config for development (admin endpoints on, short sweep interval)
    pub fn development() -> Self {
        Self {
            cleanup_interval_minutes: 1,
            enable_admin_endpoints: true,
            ..Self::default()
        }
    }

    /// Rejects settings that would break the confinement or lifecycle guarantees.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_safe_relative_dir(&self.upload_dir) {
            return Err(ConfigError::UnsafeUploadDir(self.upload_dir.clone()));
        }
        let limits = [
            ("MAX_FILE_SIZE", self.max_file_size as u64),
            ("MAX_FILES", self.max_files as u64),
            ("MAX_FIELDS", self.max_fields as u64),
            ("CLEANUP_MAX_AGE_MINUTES", self.cleanup_max_age_minutes),
            ("CLEANUP_INTERVAL_MINUTES", self.cleanup_interval_minutes),
            ("PROCESSING_TIMEOUT_SECS", self.processing_timeout_secs),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        Ok(())
    }

    pub fn cleanup_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cleanup_max_age_minutes as i64)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_minutes * 60)
    }

    pub fn processing_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.processing_timeout_secs)
    }
}
