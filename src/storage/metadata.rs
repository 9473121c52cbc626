use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::models::error::RecordError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};

/// Write recording metadata as a JSON sidecar file.
///
/// Creates `{recording_path}.metadata.json` alongside the recording.
pub fn write_sidecar(result: &RecordingResult) -> Result<(), RecordError> {
    let sidecar_path = sidecar_path(&result.file_path);
    let json = serde_json::to_string_pretty(&result.metadata)
        .map_err(|e| RecordError::Storage(format!("failed to serialize metadata: {}", e)))?;
    fs::write(&sidecar_path, json)
        .map_err(|e| RecordError::Storage(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_sidecar(recording_path: &Path) -> Result<RecordingMetadata, RecordError> {
    let sidecar_path = sidecar_path(recording_path);
    let json = fs::read_to_string(&sidecar_path)
        .map_err(|e| RecordError::Storage(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json)
        .map_err(|e| RecordError::Storage(format!("failed to parse metadata: {}", e)))
}

fn sidecar_path(recording_path: &Path) -> std::path::PathBuf {
    let file_name = recording_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    recording_path.with_file_name(format!("{}.metadata.json", file_name))
}

/// Compute the SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, RecordError> {
    let data = fs::read(path)
        .map_err(|e| RecordError::Storage(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::RecordConfig;
    use std::path::PathBuf;

    fn temp_file_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("metadata_test_{}_{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn sidecar_round_trip() {
        let recording = temp_file_path("recording.wav");
        fs::write(&recording, b"fake audio").unwrap();

        let checksum = sha256_file(&recording).unwrap();
        let config = RecordConfig::default();
        let metadata = RecordingMetadata::new(&recording, &config, 1.5, &checksum);
        let result = RecordingResult {
            file_path: recording.clone(),
            duration_secs: 1.5,
            metadata: metadata.clone(),
            checksum,
        };

        write_sidecar(&result).unwrap();
        let read_back = read_sidecar(&recording).unwrap();
        assert_eq!(read_back, metadata);

        fs::remove_file(&recording).ok();
        fs::remove_file(sidecar_path(&recording)).ok();
    }

    #[test]
    fn checksum_is_stable_hex() {
        let path = temp_file_path("digest");
        fs::write(&path, b"abc").unwrap();
        // Known SHA-256 of "abc".
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        fs::remove_file(&path).ok();
    }
}
