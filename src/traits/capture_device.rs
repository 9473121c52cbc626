use crate::models::config::RecordConfig;
use crate::models::error::RecordError;

/// Interface for platform-specific audio capture backends.
///
/// The recorder drives the device in a pull loop on a dedicated capture
/// thread: `open` → `start` → repeated `read` → `stop`. A device must
/// support being opened again after a prior `stop`, since every resumed
/// interval reopens it.
pub trait CaptureDevice: Send {
    /// Open the device for the given configuration.
    ///
    /// Returns the negotiated read-buffer size in bytes. Buffer-size
    /// negotiation is entirely the device's concern; the capture loop
    /// allocates exactly this much per read.
    fn open(&mut self, config: &RecordConfig) -> Result<usize, RecordError>;

    /// Begin delivering audio. Called once per capture interval, after `open`.
    fn start(&mut self) -> Result<(), RecordError>;

    /// Read one frame of raw sample bytes into `buf`, blocking at the
    /// device's own cadence. Returns the number of valid bytes, which may be
    /// less than `buf.len()`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, RecordError>;

    /// Stop capturing and release the device for a later reopen.
    fn stop(&mut self) -> Result<(), RecordError>;
}
