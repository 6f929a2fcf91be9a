//! `Login.*`: the WebAuthn authentication ceremony.
//!
//! `Start` issues a `start_login` session whose id doubles as the challenge.
//! The browser presents that session to `Finish`, which upgrades it in place
//! and hands back a link that installs it as the session cookie.

use axum::{Json, extract::State};
use portcullis_authz::mint_login;
use portcullis_core::Code;
use portcullis_session::{Credential, Session, taint};
use portcullis_store::{Access, Attempt, Database, credentials, sessions, tx, users};
use portcullis_token::{RedirectToken, SetCookieRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{CallSession, RequestMetadata};
use crate::error::RpcError;
use crate::state::AppState;
use crate::webauthn::{
    CEREMONY_TIMEOUT_MS, CeremonyError, CeremonyVerifier, CredentialDescriptor, TYPE_GET, b64,
    validate_client_data,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartLoginRequest {
    pub username: String,
}

/// `PublicKeyCredentialRequestOptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: String,
    pub rp_id: String,
    pub timeout: u64,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartLoginReply {
    /// Session id to present as `SessionID <token>` when finishing.
    pub token: String,
    pub options: RequestOptions,
}

pub async fn start<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    RequestMetadata(metadata): RequestMetadata,
    Json(req): Json<StartLoginRequest>,
) -> Result<Json<StartLoginReply>, RpcError> {
    let username = req.username;
    let (user, creds) = tx::run_with(state.db(), Access::ReadOnly, state.retry(), |tx| {
        let username = username.clone();
        Box::pin(async move {
            let user = users::lookup_user_by_name(tx, &username).await?;
            let creds = credentials::get_user_credentials(tx, &user).await?;
            Ok::<_, Attempt>((user, creds))
        })
    })
    .await
    .map_err(|e| RpcError::store("validate username", &e))?;

    if creds.is_empty() {
        return Err(RpcError::failed_precondition(format!(
            "begin login: user {:?} has no enrolled credentials",
            user.username()
        )));
    }

    let session = mint_login(state.db(), state.retry(), &user, metadata).await?;
    let token = session.id().to_base64();
    Ok(Json(StartLoginReply {
        options: RequestOptions {
            challenge: token.clone(),
            rp_id: state.linker.rp_id().to_string(),
            timeout: CEREMONY_TIMEOUT_MS,
            allow_credentials: creds
                .iter()
                .map(|c| CredentialDescriptor::public_key(&c.credential_id))
                .collect(),
            user_verification: "discouraged".to_string(),
        },
        token,
    }))
}

/// An `AuthenticatorAssertionResponse` plus the credential id that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionCredential {
    #[serde(with = "b64")]
    pub credential_id: Vec<u8>,
    #[serde(with = "b64")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "b64")]
    pub authenticator_data: Vec<u8>,
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishLoginRequest {
    pub credential: AssertionCredential,
    /// Sealed post-login destination from the login page URL, if any.
    #[serde(default)]
    pub redirect_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishLoginReply {
    /// Set-cookie link to send the browser to.
    pub redirect_url: String,
}

pub async fn finish<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    CallSession(session): CallSession,
    Json(req): Json<FinishLoginRequest>,
) -> Result<Json<FinishLoginReply>, RpcError> {
    let verifier = state
        .verifier
        .clone()
        .ok_or_else(|| RpcError::failed_precondition("login is not configured"))?;

    let upgraded = match verify_and_upgrade(&*state, verifier.as_ref(), &session, &req).await {
        Ok(upgraded) => upgraded,
        Err(err) => {
            if let Err(revoke) = state.authorizer.revoke(session.id(), "failed login").await {
                warn!(error = %revoke, "failed to revoke session after failed login");
            }
            return Err(err);
        }
    };

    let redirect_url = destination(&*state, &req.redirect_token);
    let token = SetCookieRequest {
        session_id: upgraded.id().clone(),
        session_expires_at: upgraded.expires_at(),
        redirect_url,
    }
    .seal(&state.token_key)?;

    info!(user = %upgraded.user().username(), "login finished");
    Ok(Json(FinishLoginReply {
        redirect_url: state.linker.set_cookie(&token),
    }))
}

async fn verify_and_upgrade<D: Database>(
    state: &AppState<D>,
    verifier: &dyn CeremonyVerifier,
    session: &Session,
    req: &FinishLoginRequest,
) -> Result<Session, RpcError> {
    let assertion = &req.credential;
    validate_client_data(
        &assertion.client_data_json,
        TYPE_GET,
        session,
        &state.linker.origin(),
    )
    .map_err(ceremony_failure)?;

    let user = session.user().clone();
    let creds = tx::run_with(state.db(), Access::ReadOnly, state.retry(), |tx| {
        let user = user.clone();
        Box::pin(async move { Ok::<_, Attempt>(credentials::get_user_credentials(tx, &user).await?) })
    })
    .await
    .map_err(|e| RpcError::store("lookup existing credentials", &e))?;

    let mut used: Credential = creds
        .into_iter()
        .find(|c| c.credential_id == assertion.credential_id)
        .ok_or_else(|| ceremony_failure(CeremonyError::UnknownCredential))?;
    used.sign_count = verifier
        .verify_assertion(
            state.linker.rp_id(),
            &used,
            &assertion.client_data_json,
            &assertion.authenticator_data,
            &assertion.signature,
        )
        .await
        .map_err(ceremony_failure)?;

    let id = session.id().clone();
    tx::run_with(state.db(), Access::ReadWrite, state.retry(), |tx| {
        let used = used.clone();
        let id = id.clone();
        Box::pin(async move {
            credentials::check_and_update_sign_count(tx, &used).await?;
            Ok::<_, Attempt>(sessions::untaint_session(tx, &id, taint::START_LOGIN).await?)
        })
    })
    .await
    .map_err(|e| RpcError::store("check counter and upgrade session", &e))
}

fn ceremony_failure(err: CeremonyError) -> RpcError {
    RpcError::new(Code::PermissionDenied, format!("finish login: {err}"))
}

/// Opens the optional redirect token. A bad token only loses the
/// destination; the login itself already succeeded.
fn destination<D>(state: &AppState<D>, redirect_token: &str) -> String {
    if redirect_token.is_empty() {
        return String::new();
    }
    match RedirectToken::open(redirect_token, &state.token_key) {
        Ok(target) => target.uri,
        Err(err) => {
            warn!(error = %err, "ignoring unusable redirect token");
            String::new()
        }
    }
}
