//! `Enrollment.*`: registering an authenticator from an enrollment link.

use axum::{Json, extract::State};
use chrono::Utc;
use portcullis_core::{Code, CredentialId};
use portcullis_session::{Credential, taint};
use portcullis_store::{Access, Attempt, Database, credentials, sessions, tx};
use portcullis_token::SetCookieRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::CallSession;
use crate::error::RpcError;
use crate::state::AppState;
use crate::webauthn::{
    CEREMONY_TIMEOUT_MS, CredentialDescriptor, SUPPORTED_ALGORITHMS, TYPE_CREATE, b64,
    validate_client_data,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    #[serde(with = "b64")]
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialParameter {
    #[serde(rename = "type")]
    pub kind: String,
    pub alg: i64,
}

/// `PublicKeyCredentialCreationOptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub challenge: String,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<CredentialParameter>,
    pub timeout: u64,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub attestation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartEnrollmentReply {
    pub options: CreationOptions,
}

pub async fn start<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    CallSession(session): CallSession,
) -> Result<Json<StartEnrollmentReply>, RpcError> {
    let user = session.user().clone();
    if !user.id().is_assigned() {
        return Err(RpcError::invalid_argument("invalid user attempting enrollment"));
    }
    let existing = tx::run_with(state.db(), Access::ReadOnly, state.retry(), |tx| {
        let user = user.clone();
        Box::pin(async move { Ok::<_, Attempt>(credentials::get_user_credentials(tx, &user).await?) })
    })
    .await
    .map_err(|e| RpcError::store("lookup existing credentials", &e))?;

    let domain = state.linker.rp_id().to_string();
    Ok(Json(StartEnrollmentReply {
        options: CreationOptions {
            challenge: session.id().to_base64(),
            rp: RelyingParty {
                id: domain.clone(),
                name: domain,
            },
            user: UserEntity {
                id: user.id().get().to_be_bytes().to_vec(),
                name: user.username().to_string(),
                display_name: user.username().to_string(),
            },
            pub_key_cred_params: SUPPORTED_ALGORITHMS
                .iter()
                .map(|alg| CredentialParameter {
                    kind: "public-key".to_string(),
                    alg: *alg,
                })
                .collect(),
            timeout: CEREMONY_TIMEOUT_MS,
            exclude_credentials: existing
                .iter()
                .map(|c| CredentialDescriptor::public_key(&c.credential_id))
                .collect(),
            attestation: "none".to_string(),
        },
    }))
}

/// An `AuthenticatorAttestationResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationCredential {
    #[serde(with = "b64")]
    pub client_data_json: Vec<u8>,
    #[serde(with = "b64")]
    pub attestation_object: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishEnrollmentRequest {
    /// Label the user gave the authenticator.
    pub name: String,
    pub credential: AttestationCredential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishEnrollmentReply {
    pub redirect_url: String,
}

pub async fn finish<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    CallSession(session): CallSession,
    Json(req): Json<FinishEnrollmentRequest>,
) -> Result<Json<FinishEnrollmentReply>, RpcError> {
    let verifier = state
        .verifier
        .clone()
        .ok_or_else(|| RpcError::failed_precondition("enrollment is not configured"))?;
    let refuse = |e: &dyn std::fmt::Display| {
        RpcError::new(Code::PermissionDenied, format!("finish enrollment: {e}"))
    };

    validate_client_data(
        &req.credential.client_data_json,
        TYPE_CREATE,
        &session,
        &state.linker.origin(),
    )
    .map_err(|e| refuse(&e))?;
    let attested = verifier
        .verify_attestation(
            state.linker.rp_id(),
            &req.credential.client_data_json,
            &req.credential.attestation_object,
        )
        .await
        .map_err(|e| refuse(&e))?;

    let credential = Credential {
        id: CredentialId::new(0),
        user: session.user().clone(),
        credential_id: attested.credential_id,
        public_key: attested.public_key,
        name: req.name,
        aaguid: attested.aaguid,
        sign_count: attested.sign_count,
        created_at: Utc::now(),
        created_by_session_id: session.id().clone(),
        deleted_at: None,
    };
    let id = session.id().clone();
    let upgraded = tx::run_with(state.db(), Access::ReadWrite, state.retry(), |tx| {
        let credential = credential.clone();
        let id = id.clone();
        Box::pin(async move {
            credentials::add_credential(tx, &credential).await?;
            Ok::<_, Attempt>(sessions::untaint_session(tx, &id, taint::ENROLLMENT).await?)
        })
    })
    .await
    .map_err(|e| RpcError::store("add credential and upgrade session", &e))?;

    let token = SetCookieRequest {
        session_id: upgraded.id().clone(),
        session_expires_at: upgraded.expires_at(),
        redirect_url: String::new(),
    }
    .seal(&state.token_key)?;

    info!(user = %upgraded.user().username(), credential = %credential.name, "enrolled credential");
    Ok(Json(FinishEnrollmentReply {
        redirect_url: state.linker.set_cookie(&token),
    }))
}
