/// LiveBuffer Error Types
///
/// Reconciliation itself never fails. Errors come from two places only: the
/// transport (network failures, cancellations, server domain errors) and
/// misuse of the positional storage layer.

use crate::row::RowId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request was superseded by a newer refresh of the same view.
    #[error("Request cancelled by a newer refresh")]
    Cancelled,

    /// Domain error surfaced by the server, passed through unchanged.
    #[error("{code}: {message}")]
    Domain { code: String, message: String },

    #[error("Index {index} out of range [0, {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Row {0} not found in buffer")]
    RowNotFound(RowId),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("No drag in progress")]
    DragNotActive,

    #[error("Row {0} is already being dragged")]
    DragInProgress(RowId),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when the operation was aborted by a newer refresh and will be
    /// retried, as opposed to having genuinely failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Transport("timeout".to_string()).is_cancelled());
    }

    #[test]
    fn test_domain_error_message_passes_through() {
        let err = Error::Domain {
            code: "ERROR_VIEW_DOES_NOT_EXIST".to_string(),
            message: "The view does not exist.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "ERROR_VIEW_DOES_NOT_EXIST: The view does not exist."
        );
    }
}
