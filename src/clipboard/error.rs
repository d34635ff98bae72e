//! Clipboard Error Types
//!
//! Error taxonomy for the clipboard bridge together with the classification and
//! recovery policy used by the protocol handlers.

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Result type for clipboard operations
pub type Result<T> = std::result::Result<T, ClipboardError>;

/// Clipboard bridge error types
#[derive(Error, Debug)]
pub enum ClipboardError {
    /// Outbound channel is gone (transport-level, propagated up)
    #[error("Channel error: {0}")]
    Channel(String),

    /// A request/response round trip exceeded its bound
    #[error("Timed out after {0}ms waiting for peer response")]
    Timeout(u64),

    /// Another local process currently holds the clipboard
    #[error("OS clipboard is busy")]
    OsClipboardBusy,

    /// Peer explicitly answered with RESPONSE_FAIL
    #[error("Peer reported failure: {0}")]
    ProtocolFail(String),

    /// Message does not fit the current bridge state
    #[error("Inconsistent state: {0}")]
    StateInconsistent(String),

    /// The session was stopped while waiting
    #[error("Operation aborted, session is stopping")]
    Aborted,

    /// A request of the same kind is already outstanding
    #[error("A {0} request is already in flight")]
    RequestInFlight(&'static str),

    /// Malformed payload
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Format not present on the clipboard or in the format map
    #[error("Unknown format ID: {0}")]
    UnknownFormat(u32),

    /// Payload bigger than configured maximum
    #[error("Data size {0} exceeds maximum allowed {1}")]
    DataSizeExceeded(usize, usize),

    /// Wire encoding or decoding failure
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crossbeam_channel::RecvError> for ClipboardError {
    fn from(_: crossbeam_channel::RecvError) -> Self {
        ClipboardError::Channel("message loop reply dropped".to_string())
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for ClipboardError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        ClipboardError::Channel("message loop is not running".to_string())
    }
}

/// Error classification for recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Transport errors
    Communication,
    /// Round trip exceeded its bound
    Timeout,
    /// Local clipboard contention
    Contention,
    /// Peer refused
    Peer,
    /// State errors
    State,
    /// Session shutting down
    Shutdown,
    /// Data validation errors
    DataValidation,
    /// Unknown error type
    Unknown,
}

/// Classify error for recovery strategy selection
pub fn classify_error(error: &ClipboardError) -> ErrorType {
    match error {
        ClipboardError::Channel(_) => ErrorType::Communication,

        ClipboardError::Timeout(_) => ErrorType::Timeout,

        ClipboardError::OsClipboardBusy => ErrorType::Contention,

        ClipboardError::ProtocolFail(_) => ErrorType::Peer,

        ClipboardError::StateInconsistent(_) | ClipboardError::RequestInFlight(_) => {
            ErrorType::State
        }

        ClipboardError::Aborted => ErrorType::Shutdown,

        ClipboardError::InvalidData(_)
        | ClipboardError::UnknownFormat(_)
        | ClipboardError::DataSizeExceeded(_, _)
        | ClipboardError::Protocol(_) => ErrorType::DataValidation,

        ClipboardError::Io(_) => ErrorType::Unknown,
    }
}

/// Recovery action to take after error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Tell the user, then give up on this exchange
    NotifyUser,

    /// Empty the local clipboard and drop any virtual files
    EmptyClipboard,

    /// Answer the peer with RESPONSE_FAIL
    RespondFail,

    /// Log and discard
    Discard,

    /// Fail and propagate error
    Fail,
}

/// Determine recovery action for error
///
/// Nothing is retried: the next clipboard change starts a fresh exchange.
pub fn recovery_action(error: &ClipboardError) -> RecoveryAction {
    match classify_error(error) {
        ErrorType::Timeout => RecoveryAction::NotifyUser,
        ErrorType::Shutdown => RecoveryAction::EmptyClipboard,
        ErrorType::Contention | ErrorType::Peer | ErrorType::DataValidation => {
            RecoveryAction::RespondFail
        }
        ErrorType::State => RecoveryAction::Discard,
        ErrorType::Communication | ErrorType::Unknown => RecoveryAction::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            classify_error(&ClipboardError::Timeout(30_000)),
            ErrorType::Timeout
        );
        assert_eq!(
            classify_error(&ClipboardError::OsClipboardBusy),
            ErrorType::Contention
        );
        assert_eq!(
            classify_error(&ClipboardError::StateInconsistent("x".into())),
            ErrorType::State
        );
        assert_eq!(
            classify_error(&ClipboardError::RequestInFlight("format-data")),
            ErrorType::State
        );
        assert_eq!(classify_error(&ClipboardError::Aborted), ErrorType::Shutdown);
        assert_eq!(
            classify_error(&ClipboardError::UnknownFormat(7)),
            ErrorType::DataValidation
        );
    }

    #[test]
    fn test_recovery_actions() {
        assert_eq!(
            recovery_action(&ClipboardError::Timeout(1)),
            RecoveryAction::NotifyUser
        );
        assert_eq!(
            recovery_action(&ClipboardError::Aborted),
            RecoveryAction::EmptyClipboard
        );
        assert_eq!(
            recovery_action(&ClipboardError::OsClipboardBusy),
            RecoveryAction::RespondFail
        );
        assert_eq!(
            recovery_action(&ClipboardError::StateInconsistent("late".into())),
            RecoveryAction::Discard
        );
        assert_eq!(
            recovery_action(&ClipboardError::Channel("closed".into())),
            RecoveryAction::Fail
        );
    }

    #[test]
    fn test_error_display() {
        let err = ClipboardError::DataSizeExceeded(20, 10);
        assert_eq!(err.to_string(), "Data size 20 exceeds maximum allowed 10");
    }
}
