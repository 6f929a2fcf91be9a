//! `User.*`: identity, user creation, and enrollment links.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use portcullis_authz::mint_enrollment;
use portcullis_session::User;
use portcullis_store::{Access, Attempt, Database, tx, users};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::{CallSession, RequestMetadata};
use crate::error::RpcError;
use crate::state::AppState;

/// A user as it appears on the wire. An id of zero means "not yet stored".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub username: String,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id().get(),
            username: user.username().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmIReply {
    pub user: UserInfo,
    pub taints: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

pub async fn who_am_i(CallSession(session): CallSession) -> Json<WhoAmIReply> {
    Json(WhoAmIReply {
        user: session.user().into(),
        taints: session.taints().to_vec(),
        expires_at: session.expires_at(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditUserRequest {
    pub user: UserInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditUserReply {
    pub user: UserInfo,
}

/// Creates the user named in the request.
pub async fn edit<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    CallSession(actor): CallSession,
    Json(req): Json<EditUserRequest>,
) -> Result<Json<EditUserReply>, RpcError> {
    if req.user.id != 0 {
        return Err(RpcError::invalid_argument(
            "only new users (id 0) can be submitted",
        ));
    }
    let username = req.user.username;
    let user = tx::run_with(state.db(), Access::ReadWrite, state.retry(), |tx| {
        let username = username.clone();
        Box::pin(async move { Ok::<_, Attempt>(users::create_user(tx, &username).await?) })
    })
    .await
    .map_err(|e| RpcError::store("update user", &e))?;

    info!(actor = %actor.user().username(), user = %user.username(), id = %user.id(), "created user");
    Ok(Json(EditUserReply {
        user: (&user).into(),
    }))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateEnrollmentLinkRequest {
    /// Looked up by id when non-zero, otherwise by username.
    pub target: UserInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateEnrollmentLinkReply {
    pub token: String,
    pub url: String,
}

pub async fn generate_enrollment_link<D: Database>(
    State(state): State<Arc<AppState<D>>>,
    CallSession(actor): CallSession,
    RequestMetadata(metadata): RequestMetadata,
    Json(req): Json<GenerateEnrollmentLinkRequest>,
) -> Result<Json<GenerateEnrollmentLinkReply>, RpcError> {
    let target = req.target;
    let user = tx::run_with(state.db(), Access::ReadOnly, state.retry(), |tx| {
        let target = target.clone();
        Box::pin(async move {
            let user = if target.id != 0 {
                users::lookup_user(tx, target.id.into()).await?
            } else {
                users::lookup_user_by_name(tx, &target.username).await?
            };
            Ok::<_, Attempt>(user)
        })
    })
    .await
    .map_err(|e| RpcError::store("lookup target user", &e))?;

    let session = mint_enrollment(state.db(), state.retry(), &user, metadata).await?;
    let token = session.id().to_base64();
    info!(actor = %actor.user().username(), user = %user.username(), "generated enrollment link");
    Ok(Json(GenerateEnrollmentLinkReply {
        url: state.linker.enrollment_page(&token),
        token,
    }))
}
