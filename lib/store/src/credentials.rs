//! Credential persistence and the signature-counter rule.

use portcullis_core::CredentialId;
use portcullis_session::{Credential, User};

use crate::error::StoreError;
use crate::tx::Transaction;

/// Active credentials registered by `user`.
///
/// # Errors
///
/// Returns storage errors only; a user without credentials gets an empty list.
pub async fn get_user_credentials<T: Transaction + ?Sized>(
    tx: &mut T,
    user: &User,
) -> Result<Vec<Credential>, StoreError> {
    tx.list_credentials(user).await
}

/// Stores a newly registered credential and returns its id.
///
/// # Errors
///
/// Rejects credentials that already have an id, lack key material, belong to
/// a synthetic user, or were not created by a stored session.
pub async fn add_credential<T: Transaction + ?Sized>(
    tx: &mut T,
    credential: &Credential,
) -> Result<CredentialId, StoreError> {
    let invalid = |reason: &str| StoreError::InvalidCredential {
        reason: reason.to_string(),
    };
    if credential.id.get() != 0 {
        return Err(invalid("credential already has an id"));
    }
    if credential.credential_id.is_empty() {
        return Err(StoreError::EmptyField {
            field: "credential_id",
        });
    }
    if credential.public_key.is_empty() {
        return Err(StoreError::EmptyField { field: "public_key" });
    }
    if !credential.user.id().is_assigned() {
        return Err(invalid("credential must belong to a stored user"));
    }
    if credential.created_by_session_id.is_zero() {
        return Err(invalid("credential must be created by a stored session"));
    }
    tx.insert_credential(credential).await
}

/// Records the counter presented in a successful assertion.
///
/// Authenticators that do not implement counters always report zero. When
/// both counters are non-zero, the presented one must be strictly greater,
/// otherwise the credential may have been cloned.
///
/// # Errors
///
/// Fails for an unknown credential, a counter that did not increase, or an
/// update that did not touch exactly one row.
pub async fn check_and_update_sign_count<T: Transaction + ?Sized>(
    tx: &mut T,
    credential: &Credential,
) -> Result<(), StoreError> {
    let stored = tx
        .credential_sign_count(credential.id)
        .await?
        .ok_or(StoreError::CredentialNotFound)?;
    let presented = credential.sign_count;
    if stored != 0 && presented != 0 && stored >= presented {
        return Err(StoreError::SignCountNotIncreased { stored, presented });
    }

    let updated = tx
        .set_credential_sign_count(credential.id, presented)
        .await?;
    if updated != 1 {
        return Err(StoreError::UnexpectedRowCount {
            expected: 1,
            actual: updated,
        });
    }
    Ok(())
}
