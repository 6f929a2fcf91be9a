//! Stored WebAuthn credentials.

use chrono::{DateTime, Utc};
use portcullis_core::CredentialId;

use crate::session::SessionId;
use crate::user::User;

/// A public-key credential registered by a user.
///
/// The signature counter is the only field that changes after
/// registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Storage id. Zero until the credential has been added.
    pub id: CredentialId,
    pub user: User,
    /// Authenticator-chosen credential id.
    pub credential_id: Vec<u8>,
    /// COSE-encoded public key.
    pub public_key: Vec<u8>,
    pub name: String,
    pub aaguid: Vec<u8>,
    pub sign_count: u32,
    pub created_at: DateTime<Utc>,
    pub created_by_session_id: SessionId,
    pub deleted_at: Option<DateTime<Utc>>,
}
