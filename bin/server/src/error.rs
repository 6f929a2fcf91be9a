//! RPC error responses.
//!
//! Every RPC failure is returned as a JSON [`RpcStatus`] body with the HTTP
//! status derived from its [`Code`]. Internal details are logged and replaced
//! with a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portcullis_authz::{CallRejection, PrototypeError, WebError};
use portcullis_core::{Code, RpcStatus};
use portcullis_store::{StoreError, TxError};
use portcullis_token::TokenError;
use rootcause::Report;
use std::fmt;

/// A failed RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: Code,
    pub message: String,
}

impl RpcError {
    #[must_use]
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    #[must_use]
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Classifies a storage failure that happened while doing `what`.
    #[must_use]
    pub fn store(what: &str, err: &TxError) -> Self {
        Self::new(store_code(err.inner()), format!("{what}: {err}"))
    }
}

fn store_code(err: &StoreError) -> Code {
    match err {
        StoreError::UserNotFound
        | StoreError::SessionNotFound
        | StoreError::CredentialNotFound => Code::NotFound,
        StoreError::InvalidSessionId
        | StoreError::InvalidSession { .. }
        | StoreError::EmptyField { .. }
        | StoreError::InvalidCredential { .. } => Code::InvalidArgument,
        StoreError::SessionExpired | StoreError::SessionNotYetValid => Code::Unauthenticated,
        StoreError::SignCountNotIncreased { .. } => Code::PermissionDenied,
        StoreError::UserExists { .. } => Code::FailedPrecondition,
        err if err.is_retryable() => Code::Unavailable,
        _ => Code::Internal,
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

impl From<CallRejection> for RpcError {
    fn from(rejection: CallRejection) -> Self {
        let code = match rejection {
            CallRejection::Unauthenticated(_) => Code::Unauthenticated,
            CallRejection::PermissionDenied { .. } => Code::PermissionDenied,
        };
        Self::new(code, rejection.to_string())
    }
}

impl From<PrototypeError> for RpcError {
    fn from(err: PrototypeError) -> Self {
        match &err {
            PrototypeError::SyntheticUser { .. } => Self::invalid_argument(err.to_string()),
            PrototypeError::Session(_) => Self::internal(err.to_string()),
            PrototypeError::Store(tx) => Self::store("issue session", tx),
        }
    }
}

impl From<WebError> for RpcError {
    fn from(err: WebError) -> Self {
        Self::invalid_argument(err.to_string())
    }
}

impl From<Report<TokenError>> for RpcError {
    fn from(err: Report<TokenError>) -> Self {
        match err.current_context() {
            TokenError::Seal => Self::internal(format!("seal token: {err}")),
            _ => Self::invalid_argument(format!("token: {err}")),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = if self.code == Code::Internal {
            tracing::error!(error = %self.message, "internal error in RPC handler");
            RpcStatus::new(self.code, "internal error")
        } else {
            RpcStatus::new(self.code, self.message)
        };
        (status, Json(body)).into_response()
    }
}
