//! Frame level metering.
//!
//! Computes peak and RMS levels in dBFS from raw PCM frame bytes, for the
//! sound-level callback. Anything below the 16-bit noise floor is clamped to
//! [`SILENCE_FLOOR_DBFS`]; display arithmetic beyond dBFS is the listener's
//! concern.

/// Level reported for silent (or empty) frames.
pub const SILENCE_FLOOR_DBFS: f32 = -96.0;

/// Peak level of a raw PCM frame in dBFS (0.0 = full scale).
pub fn peak_dbfs(bytes: &[u8], bit_depth: u16) -> f32 {
    to_dbfs(peak_normalized(bytes, bit_depth))
}

/// RMS level of a raw PCM frame in dBFS.
pub fn rms_dbfs(bytes: &[u8], bit_depth: u16) -> f32 {
    let samples = normalized_samples(bytes, bit_depth);
    if samples.is_empty() {
        return SILENCE_FLOOR_DBFS;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    to_dbfs((sum_sq / samples.len() as f32).sqrt())
}

fn to_dbfs(level: f32) -> f32 {
    if level <= 0.0 {
        return SILENCE_FLOOR_DBFS;
    }
    (20.0 * level.log10()).max(SILENCE_FLOOR_DBFS)
}

fn peak_normalized(bytes: &[u8], bit_depth: u16) -> f32 {
    normalized_samples(bytes, bit_depth)
        .into_iter()
        .map(f32::abs)
        .fold(0.0, f32::max)
}

/// Decode raw little-endian PCM bytes into normalized [-1.0, 1.0] samples.
///
/// 8-bit PCM is unsigned with a 128 midpoint; wider depths are signed.
/// Trailing bytes that do not fill a whole sample are ignored.
fn normalized_samples(bytes: &[u8], bit_depth: u16) -> Vec<f32> {
    match bit_depth {
        8 => bytes
            .iter()
            .map(|&b| (b as f32 - 128.0) / 128.0)
            .collect(),
        16 => bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
            .collect(),
        24 => bytes
            .chunks_exact(3)
            .map(|c| {
                let raw = i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8;
                raw as f32 / 8_388_608.0
            })
            .collect(),
        32 => bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / 2_147_483_648.0)
            .collect(),
        _ => Vec::new(),
    }
}
