//! User lookup and creation.

use portcullis_core::UserId;
use portcullis_session::User;

use crate::error::StoreError;
use crate::tx::Transaction;

/// # Errors
///
/// Returns [`StoreError::UserNotFound`] for unknown ids.
pub async fn lookup_user<T: Transaction + ?Sized>(
    tx: &mut T,
    id: UserId,
) -> Result<User, StoreError> {
    tx.find_user(id).await?.ok_or(StoreError::UserNotFound)
}

/// # Errors
///
/// Returns [`StoreError::UserNotFound`] for unknown usernames.
pub async fn lookup_user_by_name<T: Transaction + ?Sized>(
    tx: &mut T,
    username: &str,
) -> Result<User, StoreError> {
    tx.find_user_by_name(username)
        .await?
        .ok_or(StoreError::UserNotFound)
}

/// # Errors
///
/// Fails for an empty username or one that is already taken.
pub async fn create_user<T: Transaction + ?Sized>(
    tx: &mut T,
    username: &str,
) -> Result<User, StoreError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(StoreError::EmptyField { field: "username" });
    }
    if tx.find_user_by_name(username).await?.is_some() {
        return Err(StoreError::UserExists {
            username: username.to_string(),
        });
    }
    tx.insert_user(username).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::tx::{Access, Database};

    #[tokio::test]
    async fn created_users_get_positive_ids() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin(Access::ReadWrite).await.expect("begin");
        let alice = create_user(&mut tx, "alice").await.expect("alice");
        let bob = create_user(&mut tx, " bob ").await.expect("bob");

        assert!(alice.id().is_assigned());
        assert_ne!(alice.id(), bob.id());
        assert_eq!(bob.username(), "bob");
        assert_eq!(lookup_user(&mut tx, bob.id()).await, Ok(bob));
    }

    #[tokio::test]
    async fn usernames_are_unique_and_required() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin(Access::ReadWrite).await.expect("begin");
        create_user(&mut tx, "alice").await.expect("alice");

        assert_eq!(
            create_user(&mut tx, "alice").await,
            Err(StoreError::UserExists {
                username: "alice".into()
            })
        );
        assert_eq!(
            create_user(&mut tx, "  ").await,
            Err(StoreError::EmptyField { field: "username" })
        );
    }
}
