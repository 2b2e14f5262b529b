//! Session key material shared by every peer of one coordinator run.
//!
//! The coordinator calls [`KeyMaterial::generate`] exactly once when it starts
//! listening.  The same key and IV are then written, unencrypted, as the first
//! 48 bytes of every accepted connection (see [`crate::protocol::HANDSHAKE_LEN`]).
//! Key material is never rotated while the coordinator is running.
//!
//! # Security note
//!
//! Sending the key in the clear means anyone able to observe the handshake can
//! read the whole conversation.  The handshake is kept as-is for compatibility
//! with existing peers; it is not a confidentiality boundary.

use std::fmt;

use rand::{rngs::OsRng, RngCore};

use super::cipher::{CipherError, CipherSession};
use super::{IV_LEN, KEY_LEN};
use crate::protocol::HANDSHAKE_LEN;

/// A 32-byte AES-256 key plus a 16-byte CFB initialization vector.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl KeyMaterial {
    /// Generates fresh key material from the operating system RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Builds key material from fixed-size arrays.
    pub fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { key, iv }
    }

    /// Builds key material from byte slices received off the wire.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidLength`] if `key` is not 32 bytes or
    /// `iv` is not 16 bytes.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| CipherError::InvalidLength {
            what: "key",
            expected: KEY_LEN,
            actual: key.len(),
        })?;
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| CipherError::InvalidLength {
            what: "iv",
            expected: IV_LEN,
            actual: iv.len(),
        })?;
        Ok(Self { key, iv })
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// Returns the 48 handshake bytes: the key followed by the IV.
    pub fn to_handshake_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut out = [0u8; HANDSHAKE_LEN];
        out[..KEY_LEN].copy_from_slice(&self.key);
        out[KEY_LEN..].copy_from_slice(&self.iv);
        out
    }

    /// Creates a fresh [`CipherSession`] keyed by this material.
    pub fn cipher(&self) -> CipherSession {
        CipherSession::from_key_material(self)
    }
}

// The key must never end up in a log line.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"<redacted>")
            .field("iv", &"<redacted>")
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
