//! Segment temp files and finalization merge.
//!
//! Each Recording interval writes raw sample bytes into its own segment
//! file; on stop the segments are streamed into the output file in creation
//! order and deleted. Merge happens exactly once per session, never
//! mid-capture.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::error::RecordError;

/// Path for the next segment temp file in `dir`.
///
/// Named `record_tmp_<timestamp>_<seq>.pcm`. The per-session sequence number
/// keeps rapid pause/resume cycles from colliding inside one timestamp tick.
pub fn segment_path(dir: &Path, seq: u32) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H_%M_%S");
    dir.join(format!("record_tmp_{}_{:03}.pcm", stamp, seq))
}

/// Concatenate `segments` into `output_path` in order, then delete them.
///
/// All-or-nothing in effect: any I/O failure aborts with a merge error,
/// leaves whatever partial output exists, and deletes no segment files —
/// recovery of the raw data is then the caller's concern. Segments are only
/// removed once every byte has been streamed and flushed.
pub fn merge(output_path: &Path, segments: &[PathBuf]) -> Result<(), RecordError> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                RecordError::Storage(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let file = File::create(output_path).map_err(|e| {
        RecordError::Merge(format!("cannot create {}: {}", output_path.display(), e))
    })?;
    let mut writer = BufWriter::new(file);

    for segment in segments {
        let reader = File::open(segment).map_err(|e| {
            RecordError::Merge(format!("cannot open segment {}: {}", segment.display(), e))
        })?;
        io::copy(&mut BufReader::new(reader), &mut writer).map_err(|e| {
            RecordError::Merge(format!("copy from {} failed: {}", segment.display(), e))
        })?;
    }

    writer
        .flush()
        .map_err(|e| RecordError::Merge(format!("flush of {} failed: {}", output_path.display(), e)))?;

    for segment in segments {
        if let Err(e) = fs::remove_file(segment) {
            log::warn!("failed to delete segment {}: {}", segment.display(), e);
        }
    }
    Ok(())
}
