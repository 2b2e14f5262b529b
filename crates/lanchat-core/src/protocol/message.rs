//! The chat message layout: `"<nickname>: <text>"`.

use std::fmt;

use thiserror::Error;

use super::{QUIT_SENTINEL, READ_BUFFER_SIZE};

/// Errors that can occur while turning wire bytes into chat text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The decrypted bytes are not valid UTF-8.
    ///
    /// Usually a sign that two messages were coalesced into one read or one
    /// message was split across reads.
    #[error("decrypted message of {len} bytes is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { len: usize, valid_up_to: usize },

    /// The encoded message would not fit in a single receiver read.
    #[error("message of {len} bytes exceeds the {max}-byte single-read limit")]
    MessageTooLarge { len: usize, max: usize },
}

/// One line of chat, attributed to a nickname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub nickname: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(nickname: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            text: text.into(),
        }
    }

    /// Splits a received line at the first `": "`.
    ///
    /// Returns `None` for lines without a nickname, such as the coordinator's
    /// shutdown notice.
    pub fn parse(line: &str) -> Option<Self> {
        let (nickname, text) = line.split_once(": ")?;
        Some(Self::new(nickname, text))
    }

    /// Whether the body is the `{quit}` sentinel.
    pub fn is_quit(&self) -> bool {
        self.text == QUIT_SENTINEL
    }

    /// Returns the plaintext bytes that get encrypted and sent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooLarge`] when the encoded line is
    /// longer than one receiver read, since the receiver would otherwise split it.
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let line = self.to_string();
        if line.len() > READ_BUFFER_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                len: line.len(),
                max: READ_BUFFER_SIZE,
            });
        }
        Ok(line.into_bytes())
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.nickname, self.text)
    }
}

/// Decodes decrypted bytes as UTF-8 text.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidUtf8`] if the bytes are not valid UTF-8.
pub fn decode_text(plaintext: Vec<u8>) -> Result<String, ProtocolError> {
    let len = plaintext.len();
    String::from_utf8(plaintext).map_err(|e| ProtocolError::InvalidUtf8 {
        len,
        valid_up_to: e.utf8_error().valid_up_to(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
