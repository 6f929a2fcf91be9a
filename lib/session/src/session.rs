//! Sessions issued by the authority.
//!
//! A session id is 64 bytes from the operating system entropy source and is
//! the bearer token itself. Its text form is unpadded URL-safe base64, used
//! both in `Authorization: SessionID <id>` headers and as the cookie value.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::SessionError;
use crate::extract::SESSION_SCHEME;
use crate::taint::{self, TaintSet};
use crate::user::User;

/// Length of every session id, in bytes.
pub const SESSION_ID_LEN: usize = 64;

/// Returns true when `id` cannot name a persisted session.
///
/// Any length other than 64 counts, as does the all-zero id reserved for
/// the root and anonymous sentinels.
#[must_use]
pub fn is_zero(id: &[u8]) -> bool {
    id.len() != SESSION_ID_LEN || id.iter().all(|b| *b == 0)
}

/// Opaque bearer token identifying a session.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Vec<u8>);

impl SessionId {
    /// Generates a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns an error if the entropy source fails.
    pub fn generate() -> Result<Self, SessionError> {
        let mut bytes = vec![0u8; SESSION_ID_LEN];
        getrandom::fill(&mut bytes).map_err(|e| SessionError::Entropy {
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// The all-zero id shared by the sentinel sessions.
    #[must_use]
    pub fn zero() -> Self {
        Self(vec![0u8; SESSION_ID_LEN])
    }

    /// Wraps raw bytes read back from storage. No validation is performed.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Decodes the text form of an id.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid base64 (including padded input) or a
    /// decoded length other than 64 bytes.
    pub fn from_base64(text: &str) -> Result<Self, SessionError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|e| SessionError::InvalidEncoding {
                reason: e.to_string(),
            })?;
        if bytes.len() != SESSION_ID_LEN {
            return Err(SessionError::InvalidLength { len: bytes.len() });
        }
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        is_zero(&self.0)
    }

    /// Unpadded URL-safe base64 text form.
    #[must_use]
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    /// Value for an `Authorization` header carrying this session.
    #[must_use]
    pub fn to_header(&self) -> String {
        format!("{SESSION_SCHEME} {}", self.to_base64())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_base64();
        let prefix: String = text.chars().take(6).collect();
        write!(f, "SessionId({prefix}…)")
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_base64(&text).map_err(serde::de::Error::custom)
    }
}

/// Request details captured when a session is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub ip_address: String,
    /// Set once, by the first revocation.
    #[serde(default)]
    pub revocation_reason: String,
}

/// An issued session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    user: User,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    taints: TaintSet,
    metadata: SessionMetadata,
}

impl Session {
    #[must_use]
    pub fn new(
        id: SessionId,
        user: User,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        taints: TaintSet,
        metadata: SessionMetadata,
    ) -> Self {
        Self {
            id,
            user,
            created_at,
            expires_at,
            taints,
            metadata,
        }
    }

    /// Mints a new session for `user` that is valid for `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns an error if a session id cannot be generated.
    pub fn issue(
        user: User,
        ttl: Duration,
        taints: TaintSet,
        metadata: SessionMetadata,
    ) -> Result<Self, SessionError> {
        let now = Utc::now();
        Ok(Self::new(
            SessionId::generate()?,
            user,
            now,
            now + ttl,
            taints,
            metadata,
        ))
    }

    /// The bootstrap session granted by the root password.
    #[must_use]
    pub fn root() -> Self {
        Self::new(
            SessionId::zero(),
            User::root(),
            DateTime::<Utc>::MIN_UTC,
            DateTime::<Utc>::MAX_UTC,
            TaintSet::new(),
            SessionMetadata::default(),
        )
    }

    /// The session resolved when a caller presents no credentials at all.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(
            SessionId::zero(),
            User::anonymous(),
            DateTime::<Utc>::MIN_UTC,
            DateTime::<Utc>::MAX_UTC,
            TaintSet::from_iter([taint::ANONYMOUS]),
            SessionMetadata::default(),
        )
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn taints(&self) -> &TaintSet {
        &self.taints
    }

    #[must_use]
    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn has_taint(&self, name: &str) -> bool {
        self.taints.contains(name)
    }

    /// True for the root and anonymous sentinels, which are never stored.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.id.is_zero()
    }

    /// Removes a taint. Returns whether the session carried it.
    pub fn untaint(&mut self, name: &str) -> bool {
        self.taints.remove(name)
    }

    /// Ends the session at `now`.
    ///
    /// The first recorded reason is kept. Sessions that have already
    /// expired are left untouched and `false` is returned.
    pub fn revoke(&mut self, reason: &str, now: DateTime<Utc>) -> bool {
        if self.expires_at <= now {
            return false;
        }
        if self.metadata.revocation_reason.is_empty() {
            self.metadata.revocation_reason = reason.to_string();
        }
        self.expires_at = now;
        true
    }
}
