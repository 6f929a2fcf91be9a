//! Core types shared by every portcullis crate.
//!
//! This crate holds the strongly-typed database identifiers, the rootcause
//! `Result` alias, and the JSON wire types exchanged between the SSO
//! authority and its reverse-proxy adapter.

pub mod error;
pub mod id;
pub mod wire;

pub use error::Result;
pub use id::{CredentialId, UserId};
pub use wire::{
    AuthorizeHttpReply, AuthorizeHttpRequest, Code, Decision, DenyDestination, Header, RpcStatus,
};
