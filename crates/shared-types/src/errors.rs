//! # Error Types
//!
//! Defines error types used across subsystems.

use thiserror::Error;

/// Errors raised while parsing or serializing gossip message frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Frame version not supported.
    #[error("Unsupported version: received {received}, supported {supported}")]
    UnsupportedVersion { received: u8, supported: u8 },

    /// Frame shorter than the fixed header.
    #[error("Truncated frame: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },

    /// Declared payload length exceeds the protocol cap.
    #[error("Payload too large: {len} bytes (max: {max})")]
    PayloadTooLarge { len: usize, max: usize },

    /// Frame length disagrees with the declared payload length.
    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Issue timestamp outside the valid window.
    ///
    /// Declared for wire compatibility with callers that match on it; the
    /// processor core does not currently range-check timestamps.
    #[error("Timestamp out of range: {timestamp}")]
    TimestampOutOfRange { timestamp: u64 },
}
