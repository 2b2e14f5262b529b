//! AES-256-CFB cipher session.
//!
//! Every call to [`CipherSession::encrypt`] or [`CipherSession::decrypt`]
//! builds a brand-new CFB stream from the session's key and IV.  The stream is
//! never carried over from one message to the next, so encrypting the same
//! plaintext twice yields the same ciphertext, and any peer holding the key/IV
//! can decrypt any message in isolation.
//!
//! # What is CFB mode? (for beginners)
//!
//! AES is a *block* cipher: it only knows how to scramble exactly 16 bytes at a
//! time.  Cipher Feedback (CFB) mode turns it into a *stream* cipher: AES
//! produces a keystream that is XOR-ed with the plaintext byte by byte.  The
//! result has the same length as the input, so no padding is needed and a
//! 12-byte chat line becomes a 12-byte ciphertext.
//!
//! This is full-block CFB (CFB-128), the mode most libraries call plain "CFB".
//!
//! # Security note
//!
//! Reusing one IV for every message reuses the keystream prefix, which lets an
//! observer XOR two ciphertexts to cancel the keystream.  The behaviour is kept
//! for wire compatibility with existing peers.

use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use thiserror::Error;

use super::keys::KeyMaterial;

type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;

/// Errors raised while building a cipher session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// The key or IV does not have the length AES-256-CFB requires.
    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Stateless AES-256-CFB encryptor/decryptor for whole chat messages.
#[derive(Debug, Clone)]
pub struct CipherSession {
    material: KeyMaterial,
}

impl CipherSession {
    /// Creates a session from raw key and IV bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidLength`] unless `key` is 32 bytes and
    /// `iv` is 16 bytes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanchat_core::CipherSession;
    ///
    /// let session = CipherSession::new(&[7u8; 32], &[9u8; 16]).unwrap();
    /// let ciphertext = session.encrypt(b"alice: hello");
    /// assert_eq!(ciphertext.len(), 12);
    /// assert_eq!(session.decrypt(&ciphertext), b"alice: hello");
    /// ```
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        Ok(Self {
            material: KeyMaterial::from_slices(key, iv)?,
        })
    }

    /// Creates a session from already-validated key material.
    pub fn from_key_material(material: &KeyMaterial) -> Self {
        Self {
            material: material.clone(),
        }
    }

    /// Encrypts `plaintext`, returning a ciphertext of the same length.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut buf = plaintext.to_vec();
        Aes256CfbEnc::new(&(*self.material.key()).into(), &(*self.material.iv()).into())
            .encrypt(&mut buf);
        buf
    }

    /// Decrypts `ciphertext`, returning a plaintext of the same length.
    ///
    /// Decryption cannot fail: a truncated or merged ciphertext simply yields
    /// garbage bytes, which callers detect when decoding the text.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8> {
        let mut buf = ciphertext.to_vec();
        Aes256CfbDec::new(&(*self.material.key()).into(), &(*self.material.iv()).into())
            .decrypt(&mut buf);
        buf
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38A, F.3.17 CFB128-AES256.Encrypt, first block.
    const NIST_KEY: [u8; 32] = [
        0x60, 0x3d, 0xeb, 0x10, 0x15, 0xca, 0x71, 0xbe, 0x2b, 0x73, 0xae, 0xf0, 0x85, 0x7d,
        0x77, 0x81, 0x1f, 0x35, 0x2c, 0x07, 0x3b, 0x61, 0x08, 0xd7, 0x2d, 0x98, 0x10, 0xa3,
        0x09, 0x14, 0xdf, 0xf4,
    ];
    const NIST_IV: [u8; 16] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
        0x0e, 0x0f,
    ];
    const NIST_PLAINTEXT: [u8; 16] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93,
        0x17, 0x2a,
    ];
    const NIST_CIPHERTEXT: [u8; 16] = [
        0xdc, 0x7e, 0x84, 0xbf, 0xda, 0x79, 0x16, 0x4b, 0x7e, 0xcd, 0x84, 0x86, 0x98, 0x5d,
        0x38, 0x60,
    ];

    fn nist_session() -> CipherSession {
        CipherSession::new(&NIST_KEY, &NIST_IV).unwrap()
    }

    #[test]
    fn test_encrypt_matches_nist_cfb128_vector() {
        assert_eq!(nist_session().encrypt(&NIST_PLAINTEXT), NIST_CIPHERTEXT);
    }

    #[test]
    fn test_decrypt_matches_nist_cfb128_vector() {
        assert_eq!(nist_session().decrypt(&NIST_CIPHERTEXT), NIST_PLAINTEXT);
    }

    #[test]
    fn test_partial_block_is_prefix_of_full_block_ciphertext() {
        // CFB is a stream mode: the first five ciphertext bytes depend only on
        // the first five plaintext bytes.
        let ct = nist_session().encrypt(&NIST_PLAINTEXT[..5]);
        assert_eq!(ct.as_slice(), &NIST_CIPHERTEXT[..5]);
    }

    #[test]
    fn test_round_trip_restores_plaintext() {
        // Arrange
        let material = KeyMaterial::generate();
        let plaintext = "bob: café at 5, bring the cards".as_bytes();

        // Act
        let ciphertext = CipherSession::from_key_material(&material).encrypt(plaintext);
        let restored = CipherSession::from_key_material(&material).decrypt(&ciphertext);

        // Assert
        assert_eq!(restored, plaintext);
    }

    #[test]
    fn test_ciphertext_length_equals_plaintext_length() {
        let session = KeyMaterial::generate().cipher();
        for len in [0usize, 1, 15, 16, 17, 1000] {
            let plaintext = vec![b'x'; len];
            assert_eq!(session.encrypt(&plaintext).len(), len);
        }
    }

    #[test]
    fn test_same_plaintext_encrypts_identically_on_each_call() {
        // Every message restarts from the shared IV.
        let material = KeyMaterial::generate();
        let first = material.cipher().encrypt(b"alice: hello");
        let second = material.cipher().encrypt(b"alice: hello");
        assert_eq!(first, second);
    }

    #[test]
    fn test_same_session_does_not_carry_stream_state_between_calls() {
        let session = KeyMaterial::generate().cipher();
        let first = session.encrypt(b"alice: hello");
        let second = session.encrypt(b"alice: hello");
        assert_eq!(first, second);
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let session = KeyMaterial::generate().cipher();
        assert_ne!(session.encrypt(b"alice: hello"), b"alice: hello");
    }

    #[test]
    fn test_new_rejects_wrong_key_length() {
        let result = CipherSession::new(&[0u8; 16], &[0u8; 16]);
        assert!(matches!(
            result,
            Err(CipherError::InvalidLength {
                what: "key",
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_new_rejects_wrong_iv_length() {
        let result = CipherSession::new(&[0u8; 32], &[0u8; 8]);
        assert!(matches!(result, Err(CipherError::InvalidLength { what: "iv", .. })));
    }

    #[test]
    fn test_different_keys_produce_different_ciphertext() {
        let a = CipherSession::new(&[1u8; 32], &[0u8; 16]).unwrap();
        let b = CipherSession::new(&[2u8; 32], &[0u8; 16]).unwrap();
        assert_ne!(a.encrypt(b"alice: hello"), b.encrypt(b"alice: hello"));
    }
}
