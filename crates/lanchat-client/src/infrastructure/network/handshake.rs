//! Client side of the key handshake.
//!
//! The coordinator's first 48 bytes on a new connection are the raw AES key
//! (32 bytes) followed by the raw IV (16 bytes).  The client reads exactly
//! that many bytes with `read_exact`, so a message that follows immediately is
//! never swallowed into the key.
//!
//! A coordinator that closes early produces [`HandshakeError::Truncated`]
//! instead of a hang.

use lanchat_core::crypto::{IV_LEN, KEY_LEN};
use lanchat_core::KeyMaterial;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The stream ended before the full key or IV arrived.
    #[error("connection closed before the full {what} was received")]
    Truncated { what: &'static str },

    /// No complete handshake within the configured timeout.
    #[error("timed out waiting for the session key")]
    TimedOut,

    #[error("handshake read failed: {0}")]
    Io(#[source] std::io::Error),
}

/// Reads the key then the IV from `reader`.
///
/// # Errors
///
/// [`HandshakeError::Truncated`] on early EOF, [`HandshakeError::Io`] for any
/// other read failure.
pub async fn read_key_material<R>(reader: &mut R) -> Result<KeyMaterial, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    read_part(reader, &mut key, "key").await?;
    read_part(reader, &mut iv, "iv").await?;
    Ok(KeyMaterial::new(key, iv))
}

async fn read_part<R>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), HandshakeError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(HandshakeError::Truncated { what })
        }
        Err(e) => Err(HandshakeError::Io(e)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn handshake_bytes() -> Vec<u8> {
        (0u8..48).collect()
    }

    #[tokio::test]
    async fn test_reads_key_then_iv() {
        // Arrange
        let bytes = handshake_bytes();
        let mut stream = Builder::new().read(&bytes).build();

        // Act
        let material = read_key_material(&mut stream).await.unwrap();

        // Assert
        assert_eq!(material.key().as_slice(), &bytes[..32]);
        assert_eq!(material.iv().as_slice(), &bytes[32..]);
    }

    #[tokio::test]
    async fn test_handshake_split_across_many_reads_is_reassembled() {
        // The IV arrives in a separate segment, and the key in two.
        let bytes = handshake_bytes();
        let mut stream = Builder::new()
            .read(&bytes[..10])
            .read(&bytes[10..32])
            .read(&bytes[32..])
            .build();

        let material = read_key_material(&mut stream).await.unwrap();

        assert_eq!(material.to_handshake_bytes().as_slice(), bytes.as_slice());
    }

    #[tokio::test]
    async fn test_short_key_is_reported_as_truncated() {
        let mut stream = Builder::new().read(&[7u8; 20]).build();

        let result = read_key_material(&mut stream).await;

        assert!(matches!(result, Err(HandshakeError::Truncated { what: "key" })));
    }

    #[tokio::test]
    async fn test_missing_iv_is_reported_as_truncated() {
        let mut stream = Builder::new().read(&[7u8; 32]).read(&[1u8; 5]).build();

        let result = read_key_material(&mut stream).await;

        assert!(matches!(result, Err(HandshakeError::Truncated { what: "iv" })));
    }

    #[tokio::test]
    async fn test_transport_error_is_surfaced() {
        let mut stream = Builder::new()
            .read(&[7u8; 4])
            .read_error(std::io::Error::from(std::io::ErrorKind::ConnectionReset))
            .build();

        let result = read_key_material(&mut stream).await;

        assert!(matches!(
            result,
            Err(HandshakeError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset
        ));
    }

    #[tokio::test]
    async fn test_bytes_after_the_handshake_are_left_unread() {
        // Arrange: the coordinator may relay a message right after the IV.
        let bytes = handshake_bytes();
        let mut stream = Builder::new().read(&bytes).read(b"next").build();

        // Act
        read_key_material(&mut stream).await.unwrap();
        let mut rest = [0u8; 4];
        stream.read_exact(&mut rest).await.unwrap();

        // Assert
        assert_eq!(&rest, b"next");
    }
}
