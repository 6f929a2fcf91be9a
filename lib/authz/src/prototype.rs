//! Restricted sessions issued ahead of a ceremony.
//!
//! A prototype is a stored session with one taint that limits it to the
//! ceremony it was issued for. Finishing the ceremony removes the taint, and
//! the same session becomes a full login.

use chrono::Duration;
use portcullis_session::{Session, SessionMetadata, TaintSet, User, taint};
use portcullis_store::{Access, Attempt, Database, RetryPolicy, sessions, tx};
use tracing::{info, instrument};

use crate::error::PrototypeError;

/// Lifetime of an enrollment link.
#[must_use]
pub fn enrollment_ttl() -> Duration {
    Duration::days(3)
}

/// Lifetime of a login, counted from when the ceremony started.
#[must_use]
pub fn login_ttl() -> Duration {
    Duration::hours(18)
}

/// Issues and stores a session tainted `enrollment`.
///
/// # Errors
///
/// Fails for the root and anonymous users, or when the session cannot be
/// generated or stored.
pub async fn mint_enrollment<D: Database>(
    db: &D,
    retry: RetryPolicy,
    user: &User,
    metadata: SessionMetadata,
) -> Result<Session, PrototypeError> {
    mint(db, retry, user, taint::ENROLLMENT, enrollment_ttl(), metadata).await
}

/// Issues and stores a session tainted `start_login`.
///
/// # Errors
///
/// See [`mint_enrollment`].
pub async fn mint_login<D: Database>(
    db: &D,
    retry: RetryPolicy,
    user: &User,
    metadata: SessionMetadata,
) -> Result<Session, PrototypeError> {
    mint(db, retry, user, taint::START_LOGIN, login_ttl(), metadata).await
}

#[instrument(skip(db, retry, user, metadata), fields(user = %user.username()))]
async fn mint<D: Database>(
    db: &D,
    retry: RetryPolicy,
    user: &User,
    name: &str,
    ttl: Duration,
    metadata: SessionMetadata,
) -> Result<Session, PrototypeError> {
    if !user.id().is_assigned() {
        return Err(PrototypeError::SyntheticUser {
            username: user.username().to_string(),
        });
    }
    let session = Session::issue(user.clone(), ttl, TaintSet::from_iter([name]), metadata)
        .map_err(PrototypeError::Session)?;

    tx::run_with(db, Access::ReadWrite, retry, |tx| {
        let session = session.clone();
        Box::pin(async move { Ok::<_, Attempt>(sessions::upsert_session(tx, &session).await?) })
    })
    .await
    .map_err(PrototypeError::Store)?;

    info!(session = ?session.id(), expires_at = %session.expires_at(), "issued session prototype");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use portcullis_store::{MemoryDatabase, StoreError, Transaction, users};

    async fn alice(db: &MemoryDatabase) -> User {
        let mut tx = db.begin(Access::ReadWrite).await.expect("begin");
        let user = users::create_user(&mut tx, "alice").await.expect("user");
        tx.commit().await.expect("commit");
        user
    }

    #[tokio::test]
    async fn enrollment_prototype_is_stored_and_tainted() {
        let db = MemoryDatabase::new();
        let user = alice(&db).await;

        let session = mint_enrollment(&db, RetryPolicy::default(), &user, SessionMetadata::default())
            .await
            .expect("mint");
        assert_eq!(session.taints().to_vec(), vec![taint::ENROLLMENT.to_string()]);
        let remaining = session.expires_at() - Utc::now();
        assert!(remaining > Duration::days(3) - Duration::minutes(1));

        let mut tx = db.begin(Access::ReadOnly).await.expect("begin");
        let stored = sessions::lookup_session(&mut tx, session.id())
            .await
            .expect("stored");
        assert_eq!(stored, session);
    }

    #[tokio::test]
    async fn login_prototype_keeps_metadata() {
        let db = MemoryDatabase::new();
        let user = alice(&db).await;
        let metadata = SessionMetadata {
            user_agent: "curl/8".to_string(),
            ip_address: "203.0.113.7".to_string(),
            revocation_reason: String::new(),
        };

        let session = mint_login(&db, RetryPolicy::default(), &user, metadata.clone())
            .await
            .expect("mint");
        assert!(session.has_taint(taint::START_LOGIN));
        assert_eq!(session.metadata(), &metadata);
    }

    #[tokio::test]
    async fn synthetic_users_get_no_prototypes() {
        let db = MemoryDatabase::new();
        let err = mint_login(&db, RetryPolicy::default(), &User::root(), SessionMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PrototypeError::SyntheticUser { .. }));
    }

    #[tokio::test]
    async fn unknown_users_fail_to_store() {
        let db = MemoryDatabase::new();
        let ghost = User::new(portcullis_core::UserId::new(7), "ghost");
        let err = mint_enrollment(&db, RetryPolicy::default(), &ghost, SessionMetadata::default())
            .await
            .unwrap_err();
        match err {
            PrototypeError::Store(err) => {
                assert!(matches!(err.inner(), StoreError::Database { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
