use serde::{Deserialize, Serialize};

use super::error::RecordError;

/// Output format of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Concatenated raw samples, no header.
    Raw,
    /// Raw samples behind a synthesized 44-byte RIFF/WAVE header.
    Wav,
    /// Continuous compressed stream from the configured `StreamEncoder`.
    Encoded,
}

/// Configuration for one recording session. Immutable once `start` succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Number of channels: 1 (mono) or 2 (stereo). Default: 1.
    pub channels: u16,

    /// Bits per sample. Valid values: 8, 16, 24, 32. Default: 16.
    pub bit_depth: u16,

    /// Output format (default: `Wav`).
    pub format: OutputFormat,
}

impl RecordConfig {
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.sample_rate == 0 {
            return Err(RecordError::Config("sample rate must be positive".into()));
        }
        if ![1, 2].contains(&self.channels) {
            return Err(RecordError::Config(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        if ![8, 16, 24, 32].contains(&self.bit_depth) {
            return Err(RecordError::Config(format!(
                "unsupported bit depth: {}",
                self.bit_depth
            )));
        }
        Ok(())
    }

    /// Raw audio bytes per second for this configuration.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.channels as u32 * self.bit_depth as u32 / 8
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            format: OutputFormat::Wav,
        }
    }
}
