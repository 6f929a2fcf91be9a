//! Resolving and authorizing callers.

use portcullis_session::{Extracted, Session, SessionId, UntoleratedTaints, extract};
use portcullis_store::{Access, Attempt, Database, RetryPolicy, StoreError, TxError, sessions, tx};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

use crate::error::{AuthError, CallRejection, CredentialProblem};
use crate::operation::{Operation, ToleranceTable};

/// Scheme of the bootstrap credential `root <password>`.
const ROOT_SCHEME: &str = "root ";

/// Raw credential material from an inbound call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCredentials {
    /// `Authorization` header values.
    pub authorization: Vec<String>,
    /// `Cookie` header values.
    pub cookies: Vec<String>,
}

/// Engine settings read from configuration.
#[derive(Debug, Clone)]
pub struct AuthorizerConfig {
    /// Bootstrap password. `None` or empty disables root.
    pub root_password: Option<SecretString>,
    pub cookie_name: String,
    pub retry: RetryPolicy,
}

/// Resolves sessions and checks them against the tolerance table.
pub struct Authorizer<D> {
    db: Arc<D>,
    tolerances: ToleranceTable,
    root_password: Option<SecretString>,
    cookie_name: String,
    retry: RetryPolicy,
}

impl<D: Database> Authorizer<D> {
    #[must_use]
    pub fn new(db: Arc<D>, tolerances: ToleranceTable, config: AuthorizerConfig) -> Self {
        let root_password = config
            .root_password
            .filter(|p| !p.expose_secret().is_empty());
        Self {
            db,
            tolerances,
            root_password,
            cookie_name: config.cookie_name,
            retry: config.retry,
        }
    }

    #[must_use]
    pub fn db(&self) -> &Arc<D> {
        &self.db
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    #[must_use]
    pub fn tolerances(&self) -> &ToleranceTable {
        &self.tolerances
    }

    /// Whether any `Authorization` value carries the root password.
    #[must_use]
    pub fn is_root(&self, authorization: &[String]) -> bool {
        let Some(password) = &self.root_password else {
            return false;
        };
        let expected = password.expose_secret().as_bytes();
        authorization
            .iter()
            .filter_map(|value| value.strip_prefix(ROOT_SCHEME))
            .any(|supplied| bool::from(supplied.as_bytes().ct_eq(expected)))
    }

    /// Runs credential extraction with this engine's cookie name.
    #[must_use]
    pub fn extract(&self, credentials: &CallCredentials) -> Extracted {
        extract(
            &self.cookie_name,
            credentials.authorization.iter().map(String::as_str),
            credentials.cookies.iter().map(String::as_str),
        )
    }

    /// Resolves extracted material to a session.
    ///
    /// Each candidate is looked up in its own read-only transaction and the
    /// first live one in scan order wins. With no material at all the caller
    /// is anonymous.
    ///
    /// # Errors
    ///
    /// Returns every candidate and header problem when material was
    /// presented but none of it identified a live session.
    #[instrument(skip_all, fields(candidates = extracted.sessions.len()))]
    pub async fn authenticate(&self, extracted: &Extracted) -> Result<Session, AuthError> {
        if !extracted.offers_credentials() {
            return Ok(Session::anonymous());
        }

        let total = extracted.sessions.len();
        let mut problems = Vec::new();
        for (index, id) in extracted.sessions.iter().enumerate() {
            let result: Result<Session, TxError<StoreError>> =
                tx::run_with(self.db.as_ref(), Access::ReadOnly, self.retry, |tx| {
                    let id = id.clone();
                    Box::pin(async move { Ok::<_, Attempt>(sessions::lookup_session(tx, &id).await?) })
                })
                .await;
            match result {
                Ok(session) => return Ok(session),
                Err(err) => {
                    debug!(index, total, error = %err, "session candidate rejected");
                    problems.push(CredentialProblem::Candidate {
                        index,
                        total,
                        error: err.into_inner(),
                    });
                }
            }
        }

        problems.extend(
            extracted
                .unused_headers
                .iter()
                .filter_map(|h| h.reason.clone())
                .map(|problem| CredentialProblem::Header { problem }),
        );
        problems.extend(extracted.unused_cookies.iter().filter_map(|c| {
            c.reason.clone().map(|problem| CredentialProblem::Cookie {
                name: c.name.clone(),
                problem,
            })
        }));
        Err(AuthError::new(problems))
    }

    /// Root check, extraction, and authentication for one call.
    ///
    /// # Errors
    ///
    /// See [`Authorizer::authenticate`].
    pub async fn resolve(&self, credentials: &CallCredentials) -> Result<Session, AuthError> {
        if self.is_root(&credentials.authorization) {
            return Ok(Session::root());
        }
        self.authenticate(&self.extract(credentials)).await
    }

    /// # Errors
    ///
    /// Returns the session's taints that `operation` does not tolerate.
    pub fn authorize(&self, operation: Operation, session: &Session) -> Result<(), UntoleratedTaints> {
        self.tolerances.check(operation, session)
    }

    /// Resolves the caller and checks it may invoke `operation`.
    ///
    /// # Errors
    ///
    /// Rejects unauthenticated callers and callers whose session carries
    /// taints the operation does not tolerate.
    pub async fn authorize_call(
        &self,
        operation: Operation,
        credentials: &CallCredentials,
    ) -> Result<Session, CallRejection> {
        let session = self
            .resolve(credentials)
            .await
            .map_err(CallRejection::Unauthenticated)?;
        self.authorize(operation, &session)
            .map_err(|taints| CallRejection::PermissionDenied {
                operation,
                username: session.user().username().to_string(),
                taints,
            })?;
        Ok(session)
    }

    /// Ends a stored session. Sentinel ids are ignored.
    ///
    /// # Errors
    ///
    /// Fails when the session is unknown or storage is unavailable.
    #[instrument(skip(self))]
    pub async fn revoke(&self, id: &SessionId, reason: &str) -> Result<(), TxError> {
        if id.is_zero() {
            return Ok(());
        }
        tx::run_with(self.db.as_ref(), Access::ReadWrite, self.retry, |tx| {
            let id = id.clone();
            let reason = reason.to_string();
            Box::pin(async move {
                Ok::<_, Attempt>(sessions::revoke_session(tx, &id, &reason).await?)
            })
        })
        .await
    }
}
