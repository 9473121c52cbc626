//! WAV file format utilities.
//!
//! Generates standard 44-byte RIFF WAV headers and prepends them to merged
//! raw-sample files after a session finalizes.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use crate::models::config::RecordConfig;
use crate::models::error::RecordError;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Generate a 44-byte WAV RIFF header.
///
/// Format: PCM (format code 1), little-endian.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (36 + data_size)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(
    sample_rate: u32,
    bit_depth: u16,
    channels: u16,
    data_size: u32,
) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes()); // PCM format size
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM format code
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Prepend a WAV header to a file of raw sample bytes.
///
/// The header's data-size field is the file's current length. The header and
/// existing content are streamed into a sibling temp file which is then
/// renamed over the original, so a failure part-way leaves the raw file
/// untouched. A missing or zero-length file means there is nothing to
/// finalize: no header is written and the call succeeds.
pub fn write_wav_header(path: &Path, config: &RecordConfig) -> Result<(), RecordError> {
    let data_size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(()),
    };
    if data_size == 0 {
        return Ok(());
    }

    let header = generate_wav_header(
        config.sample_rate,
        config.bit_depth,
        config.channels,
        data_size as u32,
    );

    let file_name = path
        .file_name()
        .ok_or_else(|| RecordError::Storage(format!("invalid output path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));

    let result = (|| -> io::Result<()> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(&header)?;
        io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        Ok(())
    })();

    if let Err(e) = result {
        fs::remove_file(&tmp_path).ok();
        return Err(RecordError::Storage(format!(
            "failed to write WAV header for {}: {}",
            path.display(),
            e
        )));
    }

    fs::rename(&tmp_path, path)
        .map_err(|e| RecordError::Storage(format!("failed to replace {}: {}", path.display(), e)))
}
