//! Listener error type.

use thiserror::Error;

/// A per-listener failure during broadcast.
///
/// Non-fatal: the broadcaster logs it and continues with the remaining
/// listeners.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener rejected or failed to process the update
    #[error("Listener failure: {0}")]
    Failed(String),
}

impl ListenerError {
    pub fn failed(message: impl Into<String>) -> Self {
        ListenerError::Failed(message.into())
    }
}
