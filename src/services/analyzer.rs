use crate::models::StoredFile;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::io::Cursor;

/// Downstream consumer of a fully stored batch.
///
/// Implementations read the files through `StoredFile::absolute_path` and must
/// not keep them: the batch is deleted as soon as `analyze` returns.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, files: &[StoredFile], custom_text: Option<&str>) -> Result<Value>;
}

/// Accepts every batch without reading it.
pub struct NoOpAnalyzer;

#[async_trait]
impl ImageAnalyzer for NoOpAnalyzer {
    async fn analyze(&self, files: &[StoredFile], _custom_text: Option<&str>) -> Result<Value> {
        Ok(json!({
            "images": files.len(),
            "total_bytes": files.iter().map(|f| f.size).sum::<u64>(),
        }))
    }
}

#[derive(Debug, Serialize)]
pub struct ImageReport {
    pub name: String,
    pub declared_mime: String,
    pub detected_mime: Option<String>,
    pub width: u32,
    pub height: u32,
    pub size: u64,
}

/// Sniffs the real content type and decodes image dimensions of every file.
///
/// A file whose bytes are not a decodable image fails the whole batch.
pub struct MetadataAnalyzer;

impl MetadataAnalyzer {
    fn inspect(bytes: &[u8]) -> Result<(Option<String>, u32, u32)> {
        let detected = infer::get(bytes).map(|t| t.mime_type().to_string());
        let (width, height) = image::io::Reader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()?;
        Ok((detected, width, height))
    }
}

#[async_trait]
impl ImageAnalyzer for MetadataAnalyzer {
    async fn analyze(&self, files: &[StoredFile], custom_text: Option<&str>) -> Result<Value> {
        let mut reports = Vec::with_capacity(files.len());

        for file in files {
            let bytes = tokio::fs::read(file.absolute_path())
                .await
                .context("stored upload could not be read")?;

            let (detected_mime, width, height) = tokio::task::spawn_blocking(move || {
                MetadataAnalyzer::inspect(&bytes)
            })
            .await?
            .map_err(|e| anyhow!("'{}' is not a decodable image: {}", file.original_name, e))?;

            reports.push(ImageReport {
                name: file.original_name.clone(),
                declared_mime: file.mime_type.clone(),
                detected_mime,
                width,
                height,
                size: file.size,
            });
        }

        Ok(json!({
            "images": reports,
            "custom_text_length": custom_text.map(|t| t.chars().count()).unwrap_or(0),
        }))
    }
}
