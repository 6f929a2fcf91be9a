//! RPC authorization hook and the extractors handlers use to see its result.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use portcullis_authz::{CallCredentials, Operation};
use portcullis_core::Code;
use portcullis_session::{Session, SessionMetadata};
use portcullis_store::Database;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{Instrument, field};

use crate::error::RpcError;
use crate::state::AppState;

/// Collects every `Authorization` and `Cookie` value from a request.
#[must_use]
pub fn call_credentials(headers: &HeaderMap) -> CallCredentials {
    let values = |name: header::HeaderName| {
        headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    CallCredentials {
        authorization: values(header::AUTHORIZATION),
        cookies: values(header::COOKIE),
    }
}

/// Resolves the caller and checks the operation's taint tolerance before
/// its handler runs. The resolved [`Session`] is stored in the request
/// extensions for [`CallSession`].
pub async fn authorize_rpc<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let Some(operation) = Operation::from_path(&path) else {
        return RpcError::new(Code::NotFound, format!("unknown operation {path}")).into_response();
    };

    let span = tracing::info_span!(
        "rpc",
        %operation,
        session.user = field::Empty,
        session.taints = field::Empty,
    );
    let credentials = call_credentials(req.headers());
    let result = state
        .authorizer
        .authorize_call(operation, &credentials)
        .instrument(span.clone())
        .await;

    match result {
        Ok(session) => {
            span.record("session.user", session.user().username());
            span.record("session.taints", field::display(session.taints()));
            req.extensions_mut().insert(session);
            next.run(req).instrument(span).await
        }
        Err(rejection) => {
            span.in_scope(|| tracing::info!(error = %rejection, "rejected call"));
            RpcError::from(rejection).into_response()
        }
    }
}

/// The session the authorization hook resolved for this call.
#[derive(Debug, Clone)]
pub struct CallSession(pub Session);

impl<S: Send + Sync> FromRequestParts<S> for CallSession {
    type Rejection = RpcError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(CallSession)
            .ok_or_else(|| RpcError::internal("no session attached to call"))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Request details recorded on sessions issued during this call.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata(pub SessionMetadata);

impl<S: Send + Sync> FromRequestParts<S> for RequestMetadata {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = header_str(&parts.headers, "x-forwarded-for")
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(RequestMetadata(SessionMetadata {
            user_agent: header_str(&parts.headers, header::USER_AGENT.as_str()).to_string(),
            ip_address,
            revocation_reason: String::new(),
        }))
    }
}
