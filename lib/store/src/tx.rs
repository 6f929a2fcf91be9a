//! Serializable transactions with classified-error retry.

use async_trait::async_trait;
use futures::future::BoxFuture;
use portcullis_core::{CredentialId, UserId};
use portcullis_session::{Credential, Session, SessionId, User};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::error::StoreError;

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// A storage backend that opens SERIALIZABLE transactions.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    type Tx: Transaction + 'static;

    async fn begin(&self, access: Access) -> Result<Self::Tx, StoreError>;
}

/// Row-level operations available inside a transaction.
///
/// These are raw reads and writes. Validation lives in the [`sessions`],
/// [`users`], and [`credentials`] modules.
///
/// [`sessions`]: crate::sessions
/// [`users`]: crate::users
/// [`credentials`]: crate::credentials
#[async_trait]
pub trait Transaction: Send {
    async fn find_session(&mut self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Inserts or replaces a session.
    async fn put_session(&mut self, session: &Session) -> Result<(), StoreError>;

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_name(&mut self, username: &str) -> Result<Option<User>, StoreError>;

    async fn insert_user(&mut self, username: &str) -> Result<User, StoreError>;

    /// Credentials of `user` that have not been deleted, oldest first.
    async fn list_credentials(&mut self, user: &User) -> Result<Vec<Credential>, StoreError>;

    async fn insert_credential(&mut self, credential: &Credential)
    -> Result<CredentialId, StoreError>;

    async fn credential_sign_count(&mut self, id: CredentialId)
    -> Result<Option<u32>, StoreError>;

    /// Returns the number of rows updated.
    async fn set_credential_sign_count(
        &mut self,
        id: CredentialId,
        count: u32,
    ) -> Result<u64, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Outcome of a failed unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<E = StoreError> {
    /// Running the work again may succeed.
    Retryable(E),
    /// Give up and report this error.
    Fatal(E),
}

impl<E> Attempt<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Retryable(e) | Self::Fatal(e) => e,
        }
    }
}

impl<E: From<StoreError>> From<StoreError> for Attempt<E> {
    fn from(err: StoreError) -> Self {
        if err.is_retryable() {
            Self::Retryable(err.into())
        } else {
            Self::Fatal(err.into())
        }
    }
}

/// Where in a transaction's life the final error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Begin,
    Work,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => f.write_str("begin"),
            Self::Work => f.write_str("work"),
            Self::Commit => f.write_str("commit"),
        }
    }
}

/// The last error of a transaction that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxError<E = StoreError> {
    pub attempts: usize,
    pub stage: Stage,
    pub source: E,
}

impl<E> TxError<E> {
    pub fn into_inner(self) -> E {
        self.source
    }

    pub fn inner(&self) -> &E {
        &self.source
    }
}

impl<E: fmt::Display> fmt::Display for TxError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction failed during {} after {} attempt(s): {}",
            self.stage, self.attempts, self.source
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for TxError<E> {}

/// How often and how quickly to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        }
    }
}

/// Runs `work` in a transaction under the default [`RetryPolicy`].
///
/// # Errors
///
/// Returns the last attempt's error once the work fails fatally or the
/// attempts run out.
pub async fn run<D, T, E, F>(db: &D, access: Access, work: F) -> Result<T, TxError<E>>
where
    D: Database + ?Sized,
    T: Send,
    E: From<StoreError> + fmt::Display + Send,
    F: for<'t> FnMut(&'t mut D::Tx) -> BoxFuture<'t, Result<T, Attempt<E>>> + Send,
{
    run_with(db, access, RetryPolicy::default(), work).await
}

/// Runs `work` in a transaction, retrying per `policy`.
///
/// The work's result is committed on success. On failure the transaction is
/// rolled back; the error decides whether another attempt is made. Commit
/// failures are classified the same way as work failures.
///
/// # Errors
///
/// Returns the last attempt's error once the work fails fatally or the
/// attempts run out.
pub async fn run_with<D, T, E, F>(
    db: &D,
    access: Access,
    policy: RetryPolicy,
    mut work: F,
) -> Result<T, TxError<E>>
where
    D: Database + ?Sized,
    T: Send,
    E: From<StoreError> + fmt::Display + Send,
    F: for<'t> FnMut(&'t mut D::Tx) -> BoxFuture<'t, Result<T, Attempt<E>>> + Send,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut earlier: Vec<String> = Vec::new();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let (stage, outcome) = match attempt_once(db, access, &mut work).await {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        let source = match outcome {
            Attempt::Retryable(source) if attempts < max_attempts => {
                debug!(
                    attempt = attempts,
                    max_attempts,
                    %stage,
                    error = %source,
                    "retrying transaction"
                );
                earlier.push(source.to_string());
                tokio::time::sleep(policy.delay).await;
                continue;
            }
            Attempt::Retryable(source) | Attempt::Fatal(source) => source,
        };

        if !earlier.is_empty() {
            debug!(attempts, errors = ?earlier, "errors from earlier transaction attempts");
        }
        return Err(TxError {
            attempts,
            stage,
            source,
        });
    }
}

async fn attempt_once<D, T, E, F>(
    db: &D,
    access: Access,
    work: &mut F,
) -> Result<T, (Stage, Attempt<E>)>
where
    D: Database + ?Sized,
    E: From<StoreError>,
    F: for<'t> FnMut(&'t mut D::Tx) -> BoxFuture<'t, Result<T, Attempt<E>>>,
{
    let mut tx = db
        .begin(access)
        .await
        .map_err(|e| (Stage::Begin, Attempt::from(e)))?;

    let result = work(&mut tx).await;
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| (Stage::Commit, Attempt::from(e)))?;
            Ok(value)
        }
        Err(err) => {
            match tx.rollback().await {
                Ok(()) | Err(StoreError::TxDone) => {}
                Err(rollback) => debug!(error = %rollback, "rollback failed"),
            }
            Err((Stage::Work, err))
        }
    }
}
