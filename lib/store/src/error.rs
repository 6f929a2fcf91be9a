//! Error types for the store crate.

use std::fmt;

/// Errors from storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The id cannot name a stored session.
    InvalidSessionId,
    SessionNotFound,
    SessionExpired,
    SessionNotYetValid,
    /// A session failed validation before being written.
    InvalidSession { reason: String },
    UserNotFound,
    UserExists { username: String },
    /// A required field was empty.
    EmptyField { field: &'static str },
    CredentialNotFound,
    /// A credential failed validation before being written.
    InvalidCredential { reason: String },
    /// The authenticator's signature counter did not move forward.
    SignCountNotIncreased { stored: u32, presented: u32 },
    UnexpectedRowCount { expected: u64, actual: u64 },
    /// The transaction was already committed or rolled back.
    TxDone,
    /// The caller asked for the work to be retried.
    Retryable { reason: String },
    /// The database reported an error.
    Database { code: Option<String>, message: String },
    /// A stored row could not be decoded.
    Corrupt { reason: String },
}

impl StoreError {
    /// SQLSTATE reported by the database, if any.
    #[must_use]
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether the same unit of work may succeed if run again.
    ///
    /// SQLSTATE class 40 covers serialization failures and deadlocks; class
    /// 57 covers operator intervention such as an administrative shutdown.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TxDone | Self::Retryable { .. } => true,
            Self::Database { code: Some(code), .. } => {
                code.starts_with("40") || code.starts_with("57")
            }
            _ => false,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSessionId => write!(f, "invalid session id"),
            Self::SessionNotFound => write!(f, "session not found"),
            Self::SessionExpired => write!(f, "session expired"),
            Self::SessionNotYetValid => write!(f, "session not yet valid"),
            Self::InvalidSession { reason } => write!(f, "invalid session: {reason}"),
            Self::UserNotFound => write!(f, "user not found"),
            Self::UserExists { username } => write!(f, "user {username:?} already exists"),
            Self::EmptyField { field } => write!(f, "{field} must not be empty"),
            Self::CredentialNotFound => write!(f, "credential not found"),
            Self::InvalidCredential { reason } => write!(f, "invalid credential: {reason}"),
            Self::SignCountNotIncreased { stored, presented } => {
                write!(
                    f,
                    "signature counter did not increase: stored {stored}, presented {presented}"
                )
            }
            Self::UnexpectedRowCount { expected, actual } => {
                write!(f, "expected {expected} row(s) affected, got {actual}")
            }
            Self::TxDone => write!(f, "transaction has already been committed or rolled back"),
            Self::Retryable { reason } => write!(f, "retryable: {reason}"),
            Self::Database { code: Some(code), message } => {
                write!(f, "database error (SQLSTATE {code}): {message}")
            }
            Self::Database { code: None, message } => write!(f, "database error: {message}"),
            Self::Corrupt { reason } => write!(f, "corrupt row: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(code: &str) -> StoreError {
        StoreError::Database {
            code: Some(code.to_string()),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn transient_classes_are_retryable() {
        assert!(db("40001").is_retryable());
        assert!(db("40P01").is_retryable());
        assert!(db("57P01").is_retryable());
        assert!(StoreError::TxDone.is_retryable());
        assert!(
            StoreError::Retryable {
                reason: "try again".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn everything_else_is_fatal() {
        assert!(!db("23505").is_retryable());
        assert!(!StoreError::SessionNotFound.is_retryable());
        assert!(
            !StoreError::Database {
                code: None,
                message: "connection reset".into()
            }
            .is_retryable()
        );
    }
}
