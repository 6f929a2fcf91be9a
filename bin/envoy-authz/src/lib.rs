//! Envoy external-authorization adapter for portcullis.
//!
//! Each request Envoy replays is described as a [`CheckRequest`], decided by
//! the authority's `Session.AuthorizeHTTP`, and answered with the header
//! mutations or denial Envoy should apply.

pub mod adapter;
pub mod check;
pub mod client;
pub mod config;
pub mod error;
pub mod http;

pub use adapter::{CheckFailure, DecisionClient, ProxyAuthorizer};
pub use check::{CheckRequest, CheckResponse};
pub use client::HttpDecisionClient;
pub use error::{ClientError, ConfigError, ProxyError};
