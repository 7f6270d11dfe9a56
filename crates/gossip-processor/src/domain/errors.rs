//! Error taxonomy of the inbound processing paths.

use shared_types::{MessageError, MessageId};
use thiserror::Error;

/// Errors arising while processing peer input.
///
/// Everything except serialization failures is swallowed inside the worker
/// after the prescribed side effects (metrics, punishment) have been taken;
/// only [`ProcessError::Serialization`] reaches a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// Transaction payload failed to parse or validate.
    #[error("payload parse failed: {0}")]
    Parse(MessageError),

    /// Payload id is on the invalid-milestone blocklist.
    #[error("blocklisted milestone payload: {0}")]
    BlocklistedMilestone(MessageId),

    /// Milestone request whose index cannot be extracted.
    #[error("malformed milestone request: expected {expected} bytes, got {actual}")]
    BadRequestFormat { expected: usize, actual: usize },

    /// Transaction request not of the identifier width.
    #[error("transaction request with unexpected width: {actual} bytes")]
    BadRequestLength { actual: usize },

    /// A requested message or milestone is not in the tangle.
    #[error("not found: {0}")]
    NotFound(MessageId),

    /// Local message could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(MessageError),

    /// Payload carries an invalid issue timestamp.
    ///
    /// Reserved: kept for callers matching on the kind; the core does not
    /// raise it.
    #[error("invalid timestamp")]
    InvalidTimestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ProcessError::BadRequestFormat { expected: 4, actual: 9 };
        assert_eq!(
            err.to_string(),
            "malformed milestone request: expected 4 bytes, got 9"
        );

        let err = ProcessError::Parse(MessageError::Truncated { len: 3, min: 111 });
        assert!(err.to_string().contains("Truncated frame"));
    }
}
