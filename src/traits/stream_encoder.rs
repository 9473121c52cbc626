use crate::models::config::RecordConfig;
use crate::models::error::RecordError;
use crate::models::frame::AudioFrame;

/// Streaming codec interface for the encoded output path.
///
/// One encoder instance lives for the whole session and produces a single
/// continuous stream — the pipeline never creates an encoder per segment.
/// All calls happen on the encode pipeline's consumer thread.
pub trait StreamEncoder: Send {
    /// Prepare the encoder for the session's audio parameters.
    fn initialize(&mut self, config: &RecordConfig) -> Result<(), RecordError>;

    /// Encode one frame of raw sample bytes, returning whatever compressed
    /// output is ready. May return an empty buffer while the codec is
    /// accumulating input.
    fn encode(&mut self, frame: &AudioFrame) -> Result<Vec<u8>, RecordError>;

    /// Flush any buffered input and return the final bytes of the stream.
    fn finalize(&mut self) -> Result<Vec<u8>, RecordError>;
}
