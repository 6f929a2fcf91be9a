//! Error types for the token crate.

use std::fmt;

/// Errors from creating keys and sealing or opening tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The key was not exactly 32 bytes.
    InvalidKeyLength { len: usize },
    /// The key was all zeroes, which is almost certainly a configuration mistake.
    NullKey,
    /// The key text was not valid base64.
    KeyEncoding { reason: String },
    /// No token was supplied.
    EmptyToken,
    /// The token text was not framed as a token.
    Malformed { reason: String },
    /// The token failed authentication: wrong key or tampered contents.
    InvalidToken,
    /// The token claims to be issued in the future.
    TooNew,
    /// The token is older than the caller accepts.
    TooOld,
    /// The token carries a different payload kind than requested.
    MismatchedType { expected: String, found: String },
    /// Encoding or decoding the payload failed.
    Payload { reason: String },
    /// Encryption failed.
    Seal,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKeyLength { len } => {
                write!(f, "token key is {len} bytes, expected {}", crate::KEY_LEN)
            }
            Self::NullKey => write!(f, "token key is all null bytes"),
            Self::KeyEncoding { reason } => write!(f, "token key is not valid base64: {reason}"),
            Self::EmptyToken => write!(f, "empty token"),
            Self::Malformed { reason } => write!(f, "malformed token: {reason}"),
            Self::InvalidToken => write!(f, "invalid token"),
            Self::TooNew => write!(f, "token issued in the future"),
            Self::TooOld => write!(f, "token too old"),
            Self::MismatchedType { expected, found } => {
                write!(f, "token holds a {found}, expected a {expected}")
            }
            Self::Payload { reason } => write!(f, "token payload: {reason}"),
            Self::Seal => write!(f, "failed to seal token"),
        }
    }
}

impl std::error::Error for TokenError {}
