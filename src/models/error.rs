use thiserror::Error;

use super::state::RecordState;

/// Errors that can occur during a recording session.
///
/// All variants are `Clone` so failures can cross the notification channel
/// from the capture and encode threads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("{op} is not allowed from state {state:?}")]
    InvalidState {
        op: &'static str,
        state: RecordState,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("device failure: {0}")]
    Device(String),

    #[error("encoder failure: {0}")]
    Encoder(String),

    #[error("merge failed: {0}")]
    Merge(String),

    #[error("storage error: {0}")]
    Storage(String),
}
