//! PostgreSQL storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{CredentialId, UserId};
use portcullis_session::{Credential, Session, SessionId, SessionMetadata, TaintSet, User};
use sqlx::postgres::PgConnection;
use sqlx::{FromRow, PgPool, Postgres};

use crate::error::StoreError;
use crate::tx::{Access, Database, Transaction};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => Self::Database {
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_string(),
            },
            _ => Self::Database {
                code: None,
                message: err.to_string(),
            },
        }
    }
}

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: Vec<u8>,
    user_id: i64,
    username: String,
    metadata: serde_json::Value,
    taints: serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, StoreError> {
        let metadata: SessionMetadata =
            serde_json::from_value(self.metadata).map_err(|e| StoreError::Corrupt {
                reason: format!("session metadata: {e}"),
            })?;
        let taints: TaintSet =
            serde_json::from_value(self.taints).map_err(|e| StoreError::Corrupt {
                reason: format!("session taints: {e}"),
            })?;
        Ok(Session::new(
            SessionId::from_bytes(self.id),
            User::new(UserId::new(self.user_id), self.username),
            self.created_at,
            self.expires_at,
            taints,
            metadata,
        ))
    }
}

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User::new(UserId::new(row.id), row.username)
    }
}

/// Row type for credential queries.
#[derive(FromRow)]
struct CredentialRow {
    id: i64,
    credential_id: Vec<u8>,
    public_key: Vec<u8>,
    name: String,
    aaguid: Vec<u8>,
    sign_count: i64,
    created_at: DateTime<Utc>,
    created_by_session_id: Vec<u8>,
    deleted_at: Option<DateTime<Utc>>,
}

impl CredentialRow {
    fn try_into_credential(self, user: &User) -> Result<Credential, StoreError> {
        Ok(Credential {
            id: CredentialId::new(self.id),
            user: user.clone(),
            credential_id: self.credential_id,
            public_key: self.public_key,
            name: self.name,
            aaguid: self.aaguid,
            sign_count: decode_sign_count(self.sign_count)?,
            created_at: self.created_at,
            created_by_session_id: SessionId::from_bytes(self.created_by_session_id),
            deleted_at: self.deleted_at,
        })
    }
}

fn decode_sign_count(raw: i64) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| StoreError::Corrupt {
        reason: format!("sign count {raw} out of range"),
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt {
        reason: e.to_string(),
    })
}

/// Postgres-backed [`Database`].
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    type Tx = PgTransaction;

    async fn begin(&self, access: Access) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mode = match access {
            Access::ReadOnly => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY",
            Access::ReadWrite => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ WRITE",
        };
        sqlx::query(mode).execute(&mut *tx).await?;
        Ok(PgTransaction { inner: Some(tx) })
    }
}

/// An open transaction against a [`PgDatabase`].
pub struct PgTransaction {
    inner: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.inner.as_deref_mut().ok_or(StoreError::TxDone)
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn find_session(&mut self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.user_id, u.username, s.metadata, s.taints, s.created_at, s.expires_at
            FROM session s
            JOIN "user" u ON u.id = s.user_id
            WHERE s.id = $1
            "#,
        )
        .bind(id.as_bytes())
        .fetch_optional(self.conn()?)
        .await?;

        row.map(SessionRow::try_into_session).transpose()
    }

    async fn put_session(&mut self, session: &Session) -> Result<(), StoreError> {
        let metadata = encode_json(session.metadata())?;
        let taints = encode_json(session.taints())?;
        sqlx::query(
            r#"
            INSERT INTO session (id, user_id, metadata, taints, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                metadata = EXCLUDED.metadata,
                taints = EXCLUDED.taints,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(session.id().as_bytes())
        .bind(session.user().id().get())
        .bind(metadata)
        .bind(taints)
        .bind(session.created_at())
        .bind(session.expires_at())
        .execute(self.conn()?)
        .await?;

        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(r#"SELECT id, username FROM "user" WHERE id = $1"#)
            .bind(id.get())
            .fetch_optional(self.conn()?)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_name(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(r#"SELECT id, username FROM "user" WHERE username = $1"#)
                .bind(username)
                .fetch_optional(self.conn()?)
                .await?;
        Ok(row.map(User::from))
    }

    async fn insert_user(&mut self, username: &str) -> Result<User, StoreError> {
        let result: Result<UserRow, sqlx::Error> = sqlx::query_as(
            r#"INSERT INTO "user" (username) VALUES ($1) RETURNING id, username"#,
        )
        .bind(username)
        .fetch_one(self.conn()?)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::UserExists {
                    username: username.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_credentials(&mut self, user: &User) -> Result<Vec<Credential>, StoreError> {
        let rows: Vec<CredentialRow> = sqlx::query_as(
            r#"
            SELECT id, credential_id, public_key, name, aaguid, sign_count,
                   created_at, created_by_session_id, deleted_at
            FROM credential
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY id
            "#,
        )
        .bind(user.id().get())
        .fetch_all(self.conn()?)
        .await?;

        rows.into_iter()
            .map(|row| row.try_into_credential(user))
            .collect()
    }

    async fn insert_credential(
        &mut self,
        credential: &Credential,
    ) -> Result<CredentialId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO credential
                (user_id, credential_id, public_key, name, aaguid, sign_count,
                 created_at, created_by_session_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(credential.user.id().get())
        .bind(&credential.credential_id)
        .bind(&credential.public_key)
        .bind(&credential.name)
        .bind(&credential.aaguid)
        .bind(i64::from(credential.sign_count))
        .bind(credential.created_at)
        .bind(credential.created_by_session_id.as_bytes())
        .fetch_one(self.conn()?)
        .await?;

        Ok(CredentialId::new(id))
    }

    async fn credential_sign_count(
        &mut self,
        id: CredentialId,
    ) -> Result<Option<u32>, StoreError> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT sign_count FROM credential WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.get())
        .fetch_optional(self.conn()?)
        .await?;

        count.map(decode_sign_count).transpose()
    }

    async fn set_credential_sign_count(
        &mut self,
        id: CredentialId,
        count: u32,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE credential SET sign_count = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.get())
        .bind(i64::from(count))
        .execute(self.conn()?)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.inner.take().ok_or(StoreError::TxDone)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.inner.take().ok_or(StoreError::TxDone)?;
        tx.rollback().await?;
        Ok(())
    }
}
