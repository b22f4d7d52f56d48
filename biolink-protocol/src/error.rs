//! Protocol error types
//!
//! Kept small and `Copy`, the same discipline as the rest of the wire
//! types: decode errors are produced on every corrupt line and may be
//! counted or queued, so they must not allocate.

use thiserror_no_std::Error;

/// Errors produced while encoding or decoding wire frames.
///
/// A decode error always means "drop this line and keep reading" — the
/// receiver never propagates it as fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Line contained no tag at all.
    #[error("empty frame")]
    Empty,

    /// Leading tag is not one of TEL/CMD/ACK/EVT.
    #[error("unknown frame tag")]
    UnknownTag,

    /// Command frame carried an unknown `op=` token.
    #[error("unknown command op")]
    UnknownOp,

    /// Event frame carried an unknown `kind=` token.
    #[error("unknown event kind")]
    UnknownEvent,

    /// A token was not of the form `key=value`.
    #[error("malformed key=value pair")]
    MalformedPair,

    /// A required field was absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field was present but failed to parse as its expected type.
    #[error("invalid value for field `{0}`")]
    InvalidField(&'static str),

    /// Encoded frame would exceed [`MAX_FRAME_LEN`](crate::MAX_FRAME_LEN).
    #[error("frame exceeds maximum length")]
    Oversize,
}
