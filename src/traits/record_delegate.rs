use crate::models::error::RecordError;
use crate::models::frame::AudioFrame;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordState;

/// Event delegate for recording session notifications.
///
/// All methods are invoked from the single event delivery thread, never from
/// the capture or encode threads, so a delegate observes a strictly
/// serialized event sequence. Implementations should marshal to a UI thread
/// if needed. Every method has a no-op default, so a delegate implements
/// only the callbacks it cares about; registering no delegate at all is
/// equally fine — events are simply discarded.
pub trait RecordDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: RecordState) {
        let _ = state;
    }

    /// Called with every captured frame.
    fn on_data(&self, frame: &AudioFrame) {
        let _ = frame;
    }

    /// Called with the peak level of every captured frame, in dBFS.
    fn on_sound_level(&self, level_dbfs: f32) {
        let _ = level_dbfs;
    }

    /// Called when a capture, encode, or finalization failure occurs.
    fn on_error(&self, error: &RecordError) {
        let _ = error;
    }

    /// Called when the session finalizes and the output file is complete.
    fn on_finished(&self, result: &RecordingResult) {
        let _ = result;
    }
}
