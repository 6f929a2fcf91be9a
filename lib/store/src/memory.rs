//! In-memory storage backend.
//!
//! Transactions are serialized behind a single async lock and work on a
//! private copy of the data, which replaces the shared copy only on commit.
//! That gives the same all-or-nothing behaviour as a SERIALIZABLE database
//! without any real concurrency.

use async_trait::async_trait;
use portcullis_core::{CredentialId, UserId};
use portcullis_session::{Credential, Session, SessionId, User};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::tx::{Access, Database, Transaction};

#[derive(Debug, Clone, Default)]
struct State {
    users: BTreeMap<UserId, User>,
    sessions: HashMap<SessionId, Session>,
    credentials: BTreeMap<CredentialId, Credential>,
    last_user_id: i64,
    last_credential_id: i64,
}

/// A database that lives in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    failing_commits: Arc<AtomicUsize>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a serialization failure.
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Tx = MemoryTransaction;

    async fn begin(&self, access: Access) -> Result<Self::Tx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction {
            guard: Some(guard),
            working,
            access,
            failing_commits: Arc::clone(&self.failing_commits),
        })
    }
}

/// An open transaction against a [`MemoryDatabase`].
pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<State>>,
    working: State,
    access: Access,
    failing_commits: Arc<AtomicUsize>,
}

impl MemoryTransaction {
    fn read(&self) -> Result<&State, StoreError> {
        match self.guard {
            Some(_) => Ok(&self.working),
            None => Err(StoreError::TxDone),
        }
    }

    fn write(&mut self) -> Result<&mut State, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::TxDone);
        }
        if self.access == Access::ReadOnly {
            return Err(StoreError::Database {
                code: Some("25006".to_string()),
                message: "cannot write in a read-only transaction".to_string(),
            });
        }
        Ok(&mut self.working)
    }
}

fn missing_user(id: UserId) -> StoreError {
    StoreError::Database {
        code: Some("23503".to_string()),
        message: format!("user {id} does not exist"),
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn find_session(&mut self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.read()?.sessions.get(id).cloned())
    }

    async fn put_session(&mut self, session: &Session) -> Result<(), StoreError> {
        let state = self.write()?;
        if !state.users.contains_key(&session.user().id()) {
            return Err(missing_user(session.user().id()));
        }
        state
            .sessions
            .insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_name(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username() == username)
            .cloned())
    }

    async fn insert_user(&mut self, username: &str) -> Result<User, StoreError> {
        let state = self.write()?;
        if state.users.values().any(|u| u.username() == username) {
            return Err(StoreError::UserExists {
                username: username.to_string(),
            });
        }
        state.last_user_id += 1;
        let user = User::new(UserId::new(state.last_user_id), username);
        state.users.insert(user.id(), user.clone());
        Ok(user)
    }

    async fn list_credentials(&mut self, user: &User) -> Result<Vec<Credential>, StoreError> {
        Ok(self
            .read()?
            .credentials
            .values()
            .filter(|c| c.user.id() == user.id() && c.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn insert_credential(
        &mut self,
        credential: &Credential,
    ) -> Result<CredentialId, StoreError> {
        let state = self.write()?;
        if !state.users.contains_key(&credential.user.id()) {
            return Err(missing_user(credential.user.id()));
        }
        if state
            .credentials
            .values()
            .any(|c| c.credential_id == credential.credential_id)
        {
            return Err(StoreError::Database {
                code: Some("23505".to_string()),
                message: "credential id already registered".to_string(),
            });
        }
        state.last_credential_id += 1;
        let id = CredentialId::new(state.last_credential_id);
        let mut stored = credential.clone();
        stored.id = id;
        state.credentials.insert(id, stored);
        Ok(id)
    }

    async fn credential_sign_count(
        &mut self,
        id: CredentialId,
    ) -> Result<Option<u32>, StoreError> {
        Ok(self
            .read()?
            .credentials
            .get(&id)
            .filter(|c| c.deleted_at.is_none())
            .map(|c| c.sign_count))
    }

    async fn set_credential_sign_count(
        &mut self,
        id: CredentialId,
        count: u32,
    ) -> Result<u64, StoreError> {
        let state = self.write()?;
        match state
            .credentials
            .get_mut(&id)
            .filter(|c| c.deleted_at.is_none())
        {
            Some(credential) => {
                credential.sign_count = count;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self.guard.take().ok_or(StoreError::TxDone)?;
        let injected = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Database {
                code: Some("40001".to_string()),
                message: "could not serialize access due to concurrent update".to_string(),
            });
        }
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.guard.take().ok_or(StoreError::TxDone)?;
        Ok(())
    }
}
