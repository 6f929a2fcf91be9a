//! Session identity and the taint capability model.
//!
//! A [`Session`] is an opaque 64-byte bearer token bound to a user. What a
//! session may be used for is defined negatively by its [`TaintSet`]: an
//! operation declares which taints it tolerates, and a session is allowed
//! only when every taint it carries is tolerated.
//!
//! The [`extract`] module turns raw `Authorization` and `Cookie` header
//! material into candidate session ids plus everything that was left over.

pub mod credential;
pub mod error;
pub mod extract;
pub mod session;
pub mod taint;
pub mod user;

pub use credential::Credential;
pub use error::SessionError;
pub use extract::{Extracted, HeaderProblem, SESSION_SCHEME, UnusedCookie, UnusedHeader, extract};
pub use session::{SESSION_ID_LEN, Session, SessionId, SessionMetadata, is_zero};
pub use taint::{TaintSet, UntoleratedTaints};
pub use user::User;
