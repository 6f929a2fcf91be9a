//! Sealing and opening tokens.
//!
//! # Wire Format
//!
//! `v1.` followed by unpadded URL-safe base64 of
//! `nonce (24 bytes) || ciphertext || tag (16 bytes)`. The plaintext is the
//! JSON envelope `{kind, issued_at, message}`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::XChaCha20Poly1305;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chrono::{DateTime, Duration, Utc};
use rootcause::Report;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::key::TokenKey;

const PREFIX: &str = "v1.";
const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;

/// A payload that can travel inside a token.
pub trait TokenPayload: Serialize + DeserializeOwned {
    /// Stable name recorded in the envelope and checked when opening.
    const KIND: &'static str;
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    kind: String,
    issued_at: DateTime<Utc>,
    message: serde_json::Value,
}

/// Seals `message` into a token issued now.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized or encrypted.
pub fn seal<P: TokenPayload>(message: &P, key: &TokenKey) -> Result<String, Report<TokenError>> {
    seal_at(message, key, Utc::now())
}

pub(crate) fn seal_at<P: TokenPayload>(
    message: &P,
    key: &TokenKey,
    issued_at: DateTime<Utc>,
) -> Result<String, Report<TokenError>> {
    let envelope = Envelope {
        kind: P::KIND.to_string(),
        issued_at,
        message: serde_json::to_value(message).map_err(|e| TokenError::Payload {
            reason: e.to_string(),
        })?,
    };
    let plaintext = serde_json::to_vec(&envelope).map_err(|e| TokenError::Payload {
        reason: e.to_string(),
    })?;

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|_| TokenError::Seal)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);

    Ok(format!("{PREFIX}{}", URL_SAFE_NO_PAD.encode(sealed)))
}

/// Opens a token and decodes its payload.
///
/// The token must authenticate under `key`, be no older than `max_age`, not
/// be issued in the future, and hold a `P`.
///
/// # Errors
///
/// Returns the first check that failed, in the order listed on
/// [`TokenError`].
pub fn open<P: TokenPayload>(
    token: &str,
    max_age: Duration,
    key: &TokenKey,
) -> Result<P, Report<TokenError>> {
    if token.is_empty() {
        return Err(TokenError::EmptyToken.into());
    }
    let envelope = decrypt(token, key)?;

    let age = Utc::now() - envelope.issued_at;
    if age < Duration::zero() {
        return Err(TokenError::TooNew.into());
    }
    if age > max_age {
        return Err(TokenError::TooOld.into());
    }

    if envelope.kind != P::KIND {
        return Err(TokenError::MismatchedType {
            expected: P::KIND.to_string(),
            found: envelope.kind,
        }
        .into());
    }

    serde_json::from_value(envelope.message).map_err(|e| {
        TokenError::Payload {
            reason: e.to_string(),
        }
        .into()
    })
}

fn decrypt(token: &str, key: &TokenKey) -> Result<Envelope, Report<TokenError>> {
    let body = token.strip_prefix(PREFIX).ok_or_else(|| TokenError::Malformed {
        reason: "unknown token version".to_string(),
    })?;
    let sealed = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|e| TokenError::Malformed {
            reason: e.to_string(),
        })?;
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(TokenError::Malformed {
            reason: "token too short".to_string(),
        }
        .into());
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let plaintext = cipher
        .decrypt(nonce.into(), ciphertext)
        .map_err(|_| TokenError::InvalidToken)?;

    serde_json::from_slice(&plaintext).map_err(|e| {
        TokenError::Malformed {
            reason: e.to_string(),
        }
        .into()
    })
}
