//! Serialized event delivery.
//!
//! Capture, encode, and control threads all post notifications here; a
//! single delivery thread forwards them to the registered delegate, so
//! listeners observe one strictly ordered event sequence no matter which
//! thread an event originated on.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::error::RecordError;
use crate::models::frame::AudioFrame;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordState;
use crate::traits::record_delegate::RecordDelegate;

pub(crate) enum RecordEvent {
    StateChanged(RecordState),
    Data {
        frame: Arc<AudioFrame>,
        level_dbfs: f32,
    },
    Error(RecordError),
    Finished(RecordingResult),
}

type DelegateSlot = Arc<Mutex<Option<Arc<dyn RecordDelegate>>>>;

/// Fire-and-forget event posting handle. Cloned into every thread that
/// produces notifications; the delivery thread exits once every clone is
/// dropped.
#[derive(Clone)]
pub(crate) struct Notifier {
    tx: Sender<RecordEvent>,
    delegate: DelegateSlot,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<RecordEvent>();
        let delegate: DelegateSlot = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&delegate);

        thread::Builder::new()
            .name("record-events".into())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    let Some(delegate) = slot.lock().clone() else {
                        continue;
                    };
                    deliver(delegate.as_ref(), event);
                }
            })
            .expect("failed to spawn event delivery thread");

        Self { tx, delegate }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn RecordDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    pub fn state_changed(&self, state: RecordState) {
        let _ = self.tx.send(RecordEvent::StateChanged(state));
    }

    pub fn data(&self, frame: Arc<AudioFrame>, level_dbfs: f32) {
        let _ = self.tx.send(RecordEvent::Data { frame, level_dbfs });
    }

    pub fn error(&self, error: RecordError) {
        let _ = self.tx.send(RecordEvent::Error(error));
    }

    pub fn finished(&self, result: RecordingResult) {
        let _ = self.tx.send(RecordEvent::Finished(result));
    }
}

fn deliver(delegate: &dyn RecordDelegate, event: RecordEvent) {
    match event {
        RecordEvent::StateChanged(state) => delegate.on_state_changed(state),
        RecordEvent::Data { frame, level_dbfs } => {
            delegate.on_data(&frame);
            delegate.on_sound_level(level_dbfs);
        }
        RecordEvent::Error(error) => delegate.on_error(&error),
        RecordEvent::Finished(result) => delegate.on_finished(&result),
    }
}
