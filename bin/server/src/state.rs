//! Shared application state.

use portcullis_authz::{Authorizer, Linker};
use portcullis_store::{Database, RetryPolicy};
use portcullis_token::TokenKey;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::config::CookieConfig;
use crate::webauthn::CeremonyVerifier;

/// Everything a handler needs, shared behind an `Arc`.
pub struct AppState<D> {
    pub authorizer: Authorizer<D>,
    pub token_key: TokenKey,
    pub linker: Linker,
    pub cookie: CookieConfig,
    /// Login and enrollment are only served when this is set.
    pub verifier: Option<Arc<dyn CeremonyVerifier>>,
}

impl<D: Database> AppState<D> {
    #[must_use]
    pub fn new(
        authorizer: Authorizer<D>,
        token_key: TokenKey,
        linker: Linker,
        cookie: CookieConfig,
    ) -> Self {
        Self {
            authorizer,
            token_key,
            linker,
            cookie,
            verifier: None,
        }
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn CeremonyVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    #[must_use]
    pub fn db(&self) -> &D {
        self.authorizer.db()
    }

    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.authorizer.retry()
    }
}

/// Converts a session expiry into the cookie crate's time type.
pub(crate) fn cookie_expiry(expires_at: chrono::DateTime<chrono::Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(expires_at.timestamp())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
