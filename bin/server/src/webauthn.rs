//! WebAuthn ceremony checks.
//!
//! The authority checks the parts of a ceremony that are about *this*
//! session and site: the client data type, the challenge, and the origin.
//! Signature and attestation cryptography is delegated to a
//! [`CeremonyVerifier`].

use async_trait::async_trait;
use portcullis_session::{Credential, Session};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client data type of a registration.
pub const TYPE_CREATE: &str = "webauthn.create";
/// Client data type of an authentication.
pub const TYPE_GET: &str = "webauthn.get";

/// How long the browser should wait for the authenticator.
pub const CEREMONY_TIMEOUT_MS: u64 = 60_000;

/// COSE algorithms offered at registration, in order of preference.
pub const SUPPORTED_ALGORITHMS: &[i64] = &[-7, -35, -36, -257, -258, -259, -37, -38, -39, -8];

/// Errors from validating or verifying a ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CeremonyError {
    ClientData { reason: String },
    WrongType { expected: &'static str, found: String },
    ChallengeMismatch,
    OriginMismatch { expected: String, found: String },
    CrossOrigin,
    UnknownCredential,
    Verification { reason: String },
}

impl fmt::Display for CeremonyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientData { reason } => write!(f, "unmarshal client data json: {reason}"),
            Self::WrongType { expected, found } => {
                write!(f, "client data type: got {found:?}, want {expected:?}")
            }
            Self::ChallengeMismatch => {
                f.write_str("provided challenge does not match the current session")
            }
            Self::OriginMismatch { expected, found } => {
                write!(f, "credential from invalid origin: got {found:?}, want {expected:?}")
            }
            Self::CrossOrigin => f.write_str("rejecting cross-origin credential"),
            Self::UnknownCredential => f.write_str("credential is not registered to this user"),
            Self::Verification { reason } => write!(f, "verify credential: {reason}"),
        }
    }
}

impl std::error::Error for CeremonyError {}

/// The browser's `CollectedClientData`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientData {
    #[serde(rename = "type")]
    pub kind: String,
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: bool,
}

/// Checks `clientDataJSON` against the session that issued the challenge.
///
/// The challenge is the session id, which the browser echoes as URL-safe
/// unpadded base64, the same text form session ids use.
///
/// # Errors
///
/// Returns the first check that failed.
pub fn validate_client_data(
    client_data_json: &[u8],
    kind: &'static str,
    session: &Session,
    origin: &str,
) -> Result<ClientData, CeremonyError> {
    let data: ClientData =
        serde_json::from_slice(client_data_json).map_err(|e| CeremonyError::ClientData {
            reason: e.to_string(),
        })?;
    if data.kind != kind {
        return Err(CeremonyError::WrongType {
            expected: kind,
            found: data.kind,
        });
    }
    if data.challenge != session.id().to_base64() {
        return Err(CeremonyError::ChallengeMismatch);
    }
    if data.origin != origin {
        return Err(CeremonyError::OriginMismatch {
            expected: origin.to_string(),
            found: data.origin,
        });
    }
    if data.cross_origin {
        return Err(CeremonyError::CrossOrigin);
    }
    Ok(data)
}

/// Key material extracted from a verified attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub credential_id: Vec<u8>,
    pub public_key: Vec<u8>,
    pub aaguid: Vec<u8>,
    pub sign_count: u32,
}

/// Attestation and assertion cryptography.
#[async_trait]
pub trait CeremonyVerifier: Send + Sync {
    /// Verifies a registration response for `rp_id` and returns the new
    /// credential.
    async fn verify_attestation(
        &self,
        rp_id: &str,
        client_data_json: &[u8],
        attestation_object: &[u8],
    ) -> Result<AttestedCredential, CeremonyError>;

    /// Verifies an authentication response signed by `credential` and
    /// returns the authenticator's signature counter.
    async fn verify_assertion(
        &self,
        rp_id: &str,
        credential: &Credential,
        client_data_json: &[u8],
        authenticator_data: &[u8],
        signature: &[u8],
    ) -> Result<u32, CeremonyError>;
}

/// Serde helper for byte fields carried as URL-safe unpadded base64.
pub mod b64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD
            .decode(text.trim_end_matches('='))
            .map_err(serde::de::Error::custom)
    }

    #[must_use]
    pub fn encode(bytes: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// A credential the browser may use, by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "b64")]
    pub id: Vec<u8>,
}

impl CredentialDescriptor {
    #[must_use]
    pub fn public_key(id: &[u8]) -> Self {
        Self {
            kind: "public-key".to_string(),
            id: id.to_vec(),
        }
    }
}
