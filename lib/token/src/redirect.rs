//! Post-login destinations signed by the authority.
//!
//! A proxy deny carries one of these through the login page, so the login
//! flow only ever redirects to a destination the authority chose.

use chrono::Duration;
use rootcause::Report;
use serde::{Deserialize, Serialize};

use crate::envelope::{self, TokenPayload};
use crate::error::TokenError;
use crate::key::TokenKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectToken {
    pub uri: String,
}

impl RedirectToken {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// How long a redirect token stays valid.
    #[must_use]
    pub fn max_age() -> Duration {
        Duration::minutes(5)
    }

    /// # Errors
    ///
    /// Returns an error if sealing fails.
    pub fn seal(&self, key: &TokenKey) -> Result<String, Report<TokenError>> {
        envelope::seal(self, key)
    }

    /// # Errors
    ///
    /// Returns an error if the token does not open as a fresh redirect token.
    pub fn open(token: &str, key: &TokenKey) -> Result<Self, Report<TokenError>> {
        envelope::open(token, Self::max_age(), key)
    }
}

impl TokenPayload for RedirectToken {
    const KIND: &'static str = "portcullis.RedirectToken";
}
