//! Opaque bearer tokens.
//!
//! Session identifiers and password-reset tokens are both 32 bytes from the
//! thread-local CSPRNG, encoded as unpadded base64url. The encoded string is
//! the store key; there is no separate id.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// Number of random bytes in a token.
pub const TOKEN_BYTES: usize = 32;

/// Length of the encoded form of a [`TOKEN_BYTES`]-byte token.
const ENCODED_LEN: usize = 43;

/// An unguessable bearer token.
///
/// `Debug` never prints the value, so tokens can sit inside structs that
/// get logged.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OpaqueToken(String);

impl OpaqueToken {
    /// Generate a fresh token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Accept a token presented by a client.
    ///
    /// Returns `None` for anything that could not have been produced by
    /// [`Self::generate`], which lets callers skip the store lookup.
    #[must_use]
    pub fn from_client(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let well_formed = raw.len() == ENCODED_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        well_formed.then(|| Self(raw.to_owned()))
    }

    /// Rehydrate a token read back from the store.
    #[must_use]
    pub(crate) const fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// The encoded token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OpaqueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OpaqueToken([REDACTED])")
    }
}
