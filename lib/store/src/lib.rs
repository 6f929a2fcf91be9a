//! Storage for sessions, users, and credentials.
//!
//! Every read and write runs inside [`tx::run`], which opens a SERIALIZABLE
//! transaction and retries the unit of work when the database reports a
//! transient conflict. There is no in-process locking; concurrent
//! read-modify-write sequences are resolved by aborting and retrying.
//!
//! The [`Database`] and [`Transaction`] traits are the storage seam.
//! [`PgDatabase`] is the production backend; [`MemoryDatabase`] backs tests.

pub mod credentials;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod sessions;
pub mod tx;
pub mod users;

pub use error::StoreError;
pub use memory::MemoryDatabase;
pub use postgres::PgDatabase;
pub use tx::{Access, Attempt, Database, RetryPolicy, Stage, Transaction, TxError, run, run_with};
