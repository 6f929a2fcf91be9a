//! Error types for the session crate.

use std::fmt;

/// Errors from creating or decoding session identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operating system entropy source failed.
    Entropy { reason: String },
    /// The decoded id was not exactly 64 bytes.
    InvalidLength { len: usize },
    /// The text form was not valid unpadded URL-safe base64.
    InvalidEncoding { reason: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entropy { reason } => {
                write!(f, "generate session id: entropy source failed: {reason}")
            }
            Self::InvalidLength { len } => {
                write!(
                    f,
                    "session id is {len} bytes, expected {}",
                    crate::SESSION_ID_LEN
                )
            }
            Self::InvalidEncoding { reason } => {
                write!(f, "session id is not valid base64: {reason}")
            }
        }
    }
}

impl std::error::Error for SessionError {}
