//! # audio-record-core
//!
//! Platform-agnostic audio recording core library.
//!
//! Pulls raw audio frames from a capture device at device cadence, routes
//! them either straight to a raw-sample segment file or through a streaming
//! encoder, and assembles one output file per session: raw samples, raw
//! samples behind a synthesized WAV header, or a continuous compressed
//! stream. Sessions can be paused and resumed without losing audio; paused
//! intervals are captured into ordered segment files and merged on stop.
//!
//! Platform capture backends implement the [`CaptureDevice`] trait and plug
//! into the generic [`Recorder`]; codecs implement [`StreamEncoder`].
//!
//! ## Architecture
//!
//! ```text
//! audio-record-core (this crate)
//! ├── traits/       ← CaptureDevice, StreamEncoder, RecordDelegate
//! ├── models/       ← RecordError, RecordState, RecordConfig, AudioFrame, RecordingResult
//! ├── processing/   ← WAV header generation, level metering
//! ├── session/      ← Recorder (orchestrator), EncodePipeline, Notifier
//! └── storage/      ← segment store / merge, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{OutputFormat, RecordConfig};
pub use models::error::RecordError;
pub use models::frame::AudioFrame;
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::RecordState;
pub use session::recorder::Recorder;
pub use traits::capture_device::CaptureDevice;
pub use traits::record_delegate::RecordDelegate;
pub use traits::stream_encoder::StreamEncoder;
