//! Session persistence policy.

use chrono::Utc;
use portcullis_session::{Session, SessionId};

use crate::error::StoreError;
use crate::tx::Transaction;

/// Loads a live session.
///
/// # Errors
///
/// Fails for a zero or malformed id, an unknown id, a session whose expiry
/// has passed, or one created in the future.
pub async fn lookup_session<T: Transaction + ?Sized>(
    tx: &mut T,
    id: &SessionId,
) -> Result<Session, StoreError> {
    if id.is_zero() {
        return Err(StoreError::InvalidSessionId);
    }
    let session = tx
        .find_session(id)
        .await?
        .ok_or(StoreError::SessionNotFound)?;

    let now = Utc::now();
    if session.expires_at() <= now {
        return Err(StoreError::SessionExpired);
    }
    if session.created_at() > now {
        return Err(StoreError::SessionNotYetValid);
    }
    Ok(session)
}

/// Inserts or replaces a session.
///
/// # Errors
///
/// Rejects sentinel ids and sessions that do not belong to a stored user.
pub async fn upsert_session<T: Transaction + ?Sized>(
    tx: &mut T,
    session: &Session,
) -> Result<(), StoreError> {
    if session.id().is_zero() {
        return Err(StoreError::InvalidSession {
            reason: "session id is zero".to_string(),
        });
    }
    if !session.user().id().is_assigned() {
        return Err(StoreError::InvalidSession {
            reason: format!("user id {} cannot own a session", session.user().id().get()),
        });
    }
    tx.put_session(session).await
}

/// Ends a session now. Revoking an expired session does nothing.
///
/// # Errors
///
/// Fails for a zero id or an unknown session.
pub async fn revoke_session<T: Transaction + ?Sized>(
    tx: &mut T,
    id: &SessionId,
    reason: &str,
) -> Result<(), StoreError> {
    if id.is_zero() {
        return Err(StoreError::InvalidSessionId);
    }
    let mut session = tx
        .find_session(id)
        .await?
        .ok_or(StoreError::SessionNotFound)?;
    if session.revoke(reason, Utc::now()) {
        tx.put_session(&session).await?;
    }
    Ok(())
}

/// Removes `taint` from a live session and returns the updated session.
///
/// # Errors
///
/// Fails if the session is not live.
pub async fn untaint_session<T: Transaction + ?Sized>(
    tx: &mut T,
    id: &SessionId,
    taint: &str,
) -> Result<Session, StoreError> {
    let mut session = lookup_session(tx, id).await?;
    if session.untaint(taint) {
        tx.put_session(&session).await?;
    }
    Ok(session)
}
