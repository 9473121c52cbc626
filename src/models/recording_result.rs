use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::{OutputFormat, RecordConfig};

/// Result delivered when a recording session finalizes successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Metadata stored alongside a recording as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub format: OutputFormat,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: String,
}

impl RecordingMetadata {
    pub fn new(path: &Path, config: &RecordConfig, duration_secs: f64, checksum: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            sample_rate: config.sample_rate,
            channels: config.channels,
            bit_depth: config.bit_depth,
            format: config.format,
            duration_secs,
            file_path: path.to_string_lossy().into_owned(),
            checksum: checksum.to_string(),
        }
    }
}
