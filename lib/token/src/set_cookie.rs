//! Token handed to the set-cookie endpoint after a login completes.

use chrono::{DateTime, Duration, Utc};
use portcullis_session::SessionId;
use rootcause::Report;
use serde::{Deserialize, Serialize};

use crate::envelope::{self, TokenPayload};
use crate::error::TokenError;
use crate::key::TokenKey;

/// Asks the set-cookie endpoint to install a session cookie.
///
/// The token only has to survive a single redirect hop, so it is short-lived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCookieRequest {
    pub session_id: SessionId,
    pub session_expires_at: DateTime<Utc>,
    /// Where to send the browser once the cookie is set. Empty for none.
    #[serde(default)]
    pub redirect_url: String,
}

impl SetCookieRequest {
    /// How long a set-cookie token stays valid.
    #[must_use]
    pub fn max_age() -> Duration {
        Duration::minutes(1)
    }

    /// # Errors
    ///
    /// Returns an error if sealing fails.
    pub fn seal(&self, key: &TokenKey) -> Result<String, Report<TokenError>> {
        envelope::seal(self, key)
    }

    /// # Errors
    ///
    /// Returns an error if the token does not open as a fresh set-cookie request.
    pub fn open(token: &str, key: &TokenKey) -> Result<Self, Report<TokenError>> {
        envelope::open(token, Self::max_age(), key)
    }
}

impl TokenPayload for SetCookieRequest {
    const KIND: &'static str = "portcullis.SetCookieRequest";
}
