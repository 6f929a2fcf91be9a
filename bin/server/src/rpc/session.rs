//! `Session.AuthorizeHTTP`, called by the reverse-proxy adapter.

use axum::{Json, extract::State};
use portcullis_core::{AuthorizeHttpReply, AuthorizeHttpRequest};
use portcullis_store::Database;
use std::sync::Arc;

use crate::auth::CallSession;
use crate::error::RpcError;
use crate::state::AppState;

/// Judges a proxied request.
///
/// The proxy's own session only has to pass the hook. The decision is made
/// from the credentials the end user presented to the proxy.
pub async fn authorize_http<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    CallSession(proxy): CallSession,
    Json(req): Json<AuthorizeHttpRequest>,
) -> Result<Json<AuthorizeHttpReply>, RpcError> {
    tracing::debug!(proxy = %proxy.user().username(), source_ip = %req.source_ip, "authorizing proxied request");
    let reply = state
        .authorizer
        .authorize_http(&req, &state.linker, &state.token_key)
        .await?;
    Ok(Json(reply))
}
