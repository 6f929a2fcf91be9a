//! The symmetric key tokens are sealed with.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rootcause::Report;
use std::fmt;

use crate::error::TokenError;

/// Length of a token key, in bytes.
pub const KEY_LEN: usize = 32;

/// A 256-bit XChaCha20-Poly1305 key.
///
/// The key is process-wide read-only configuration. It never appears in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenKey([u8; KEY_LEN]);

impl TokenKey {
    /// Builds a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error unless `bytes` is exactly 32 bytes with at least one
    /// non-zero byte.
    pub fn new(bytes: &[u8]) -> Result<Self, Report<TokenError>> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| TokenError::InvalidKeyLength { len: bytes.len() })?;
        if key.iter().all(|b| *b == 0) {
            return Err(TokenError::NullKey.into());
        }
        Ok(Self(key))
    }

    /// Builds a key from its standard base64 configuration form.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid base64 or an unacceptable key.
    pub fn from_base64(text: &str) -> Result<Self, Report<TokenError>> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| TokenError::KeyEncoding {
                reason: e.to_string(),
            })?;
        Self::new(&bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenKey(<redacted>)")
    }
}
