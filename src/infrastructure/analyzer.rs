use crate::config::UploadConfig;
use crate::services::analyzer::{ImageAnalyzer, MetadataAnalyzer, NoOpAnalyzer};
use std::sync::Arc;
use tracing::{info, warn};

pub fn setup_analyzer(config: &UploadConfig) -> Arc<dyn ImageAnalyzer> {
    match config.analyzer_type.as_str() {
        "noop" => {
            info!("🔍 Analyzer: no-op");
            Arc::new(NoOpAnalyzer)
        }
        "metadata" => {
            info!("🔍 Analyzer: image metadata");
            Arc::new(MetadataAnalyzer)
        }
        other => {
            warn!("Unknown ANALYZER_TYPE '{}', falling back to image metadata", other);
            Arc::new(MetadataAnalyzer)
        }
    }
}
