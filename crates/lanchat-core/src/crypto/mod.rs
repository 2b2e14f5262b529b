//! Symmetric encryption for chat payloads.
//!
//! - **`keys`** – [`KeyMaterial`](keys::KeyMaterial): the 32-byte key and
//!   16-byte IV generated once per coordinator run and distributed to peers.
//! - **`cipher`** – [`CipherSession`](cipher::CipherSession): AES-256-CFB
//!   encryption and decryption of whole messages.

pub mod cipher;
pub mod keys;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES block size, and therefore the CFB initialization vector length, in bytes.
pub const IV_LEN: usize = 16;
