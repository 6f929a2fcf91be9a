//! Authorization error types.

use portcullis_session::{HeaderProblem, SessionError, UntoleratedTaints};
use portcullis_store::{StoreError, TxError};
use std::fmt;

use crate::operation::Operation;

/// One reason a piece of presented credential material was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialProblem {
    /// A parsed session id that did not resolve to a live session.
    Candidate {
        index: usize,
        total: usize,
        error: StoreError,
    },
    /// An `Authorization` value that was not a usable session credential.
    Header { problem: HeaderProblem },
    /// A session cookie whose value did not decode.
    Cookie { name: String, problem: SessionError },
}

impl fmt::Display for CredentialProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Candidate {
                index,
                total,
                error,
            } => write!(f, "session {} of {total}: {error}", index + 1),
            Self::Header { problem } => write!(f, "authorization header: {problem}"),
            Self::Cookie { name, problem } => write!(f, "cookie {name:?}: {problem}"),
        }
    }
}

/// Credentials were presented but none of them identified a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    problems: Vec<CredentialProblem>,
}

impl AuthError {
    pub(crate) fn new(problems: Vec<CredentialProblem>) -> Self {
        Self { problems }
    }

    /// Every per-candidate and per-header failure, in scan order.
    #[must_use]
    pub fn problems(&self) -> &[CredentialProblem] {
        &self.problems
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no valid session in presented credentials ({} problem(s)): ",
            self.problems.len()
        )?;
        for (i, problem) in self.problems.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AuthError {}

/// Why a call was turned away before reaching its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallRejection {
    Unauthenticated(AuthError),
    PermissionDenied {
        operation: Operation,
        username: String,
        taints: UntoleratedTaints,
    },
}

impl fmt::Display for CallRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated(err) => write!(f, "get user from session: {err}"),
            Self::PermissionDenied {
                operation, taints, ..
            } => write!(f, "{operation}: {taints}"),
        }
    }
}

impl std::error::Error for CallRejection {}

/// Errors in startup configuration of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An operation has no tolerance entry.
    MissingOperation { operation: Operation },
    /// An operation has more than one tolerance entry.
    DuplicateOperation { operation: Operation },
    /// The public base URL cannot be used to build links.
    InvalidBaseUrl { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOperation { operation } => {
                write!(f, "no taint tolerance configured for {operation}")
            }
            Self::DuplicateOperation { operation } => {
                write!(f, "taint tolerance configured twice for {operation}")
            }
            Self::InvalidBaseUrl { reason } => write!(f, "invalid base URL: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors from minting and persisting session prototypes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrototypeError {
    /// Prototypes can only be issued to stored users.
    SyntheticUser { username: String },
    Session(SessionError),
    Store(TxError),
}

impl fmt::Display for PrototypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyntheticUser { username } => {
                write!(f, "cannot issue a session to synthetic user {username:?}")
            }
            Self::Session(err) => write!(f, "mint session: {err}"),
            Self::Store(err) => write!(f, "store session: {err}"),
        }
    }
}

impl std::error::Error for PrototypeError {}

/// Errors from judging a proxied HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebError {
    InvalidRequestUri { reason: String },
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequestUri { reason } => write!(f, "invalid request_uri: {reason}"),
        }
    }
}

impl std::error::Error for WebError {}
