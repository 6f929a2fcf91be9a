//! Authorization decision engine for portcullis.
//!
//! For every inbound call the [`Authorizer`] resolves who is calling, from
//! the root password, a stored session, or nobody at all, and then checks
//! the session's taints against the operation's entry in the
//! [`ToleranceTable`]. The same engine answers proxied HTTP visits through
//! [`Authorizer::authorize_http`].

mod engine;
mod error;
mod links;
mod operation;
mod prototype;
mod web;

pub use engine::{Authorizer, AuthorizerConfig, CallCredentials};
pub use error::{AuthError, CallRejection, ConfigError, CredentialProblem, PrototypeError, WebError};
pub use links::Linker;
pub use operation::{Operation, ToleranceTable};
pub use prototype::{enrollment_ttl, login_ttl, mint_enrollment, mint_login};
pub use web::{NOT_LOGGED_IN_BODY, WebVisitDenied, allow_web_visit};
