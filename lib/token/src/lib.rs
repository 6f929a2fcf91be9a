//! Typed, time-boxed, tamper-proof tokens for untrusted intermediaries.
//!
//! A payload is wrapped in an envelope with its kind and issuance time,
//! serialized, and sealed with XChaCha20-Poly1305. Opening a token checks
//! authenticity, age, and kind before the payload is decoded.
//!
//! Two payloads are defined: [`SetCookieRequest`] hands a freshly logged-in
//! session to the cookie-setting endpoint, and [`RedirectToken`] carries a
//! server-chosen post-login destination through the login page.

pub mod envelope;
pub mod error;
pub mod key;
pub mod redirect;
pub mod set_cookie;

pub use envelope::{TokenPayload, open, seal};
pub use error::TokenError;
pub use key::{KEY_LEN, TokenKey};
pub use redirect::RedirectToken;
pub use set_cookie::SetCookieRequest;
