//! ChatFeed: what the user sees, and what the transcript keeps.
//!
//! Every line shown on screen (the user's own echo, lines relayed from other
//! peers, and local status notes) goes through [`ChatFeed`], which tags it with
//! its origin and appends it to the transcript.  The transcript is an optional
//! [`TranscriptSink`] injected at construction; the file-backed implementation
//! lives in the infrastructure layer.
//!
//! A failing transcript never interrupts the chat.  The first write error is
//! logged, the transcript is dropped, and the feed keeps working.

use std::fmt;
use std::path::PathBuf;

use lanchat_core::ChatMessage;
use thiserror::Error;
use tracing::warn;

/// Error type for transcript persistence.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("I/O error on transcript {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Somewhere to append displayed lines.
pub trait TranscriptSink: Send {
    /// Appends one line; implementations persist it before returning.
    fn append_line(&mut self, line: &str) -> Result<(), TranscriptError>;

    /// Final cleanup when the client exits.
    fn close(&mut self) -> Result<(), TranscriptError>;
}

/// Where a displayed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrigin {
    /// Echo of something this client sent.
    Local,
    /// Relayed by the coordinator.
    Remote,
    /// Status generated by the client itself.
    System,
}

/// One line ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub origin: LineOrigin,
    pub text: String,
}

impl fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            LineOrigin::System => write!(f, "* {}", self.text),
            LineOrigin::Local | LineOrigin::Remote => f.write_str(&self.text),
        }
    }
}

/// The display-and-record use case.
pub struct ChatFeed {
    transcript: Option<Box<dyn TranscriptSink>>,
}

impl ChatFeed {
    pub fn new(transcript: Option<Box<dyn TranscriptSink>>) -> Self {
        Self { transcript }
    }

    /// Whether lines are still being recorded.
    pub fn is_recording(&self) -> bool {
        self.transcript.is_some()
    }

    /// Echo of a message this client just sent.
    pub fn local(&mut self, message: &ChatMessage) -> DisplayLine {
        self.record(LineOrigin::Local, message.to_string())
    }

    /// A line received from the coordinator.
    pub fn remote(&mut self, text: impl Into<String>) -> DisplayLine {
        self.record(LineOrigin::Remote, text.into())
    }

    /// A status note such as "connected" or "disconnected".
    pub fn system(&mut self, text: impl Into<String>) -> DisplayLine {
        self.record(LineOrigin::System, text.into())
    }

    /// Closes the transcript, if any.
    ///
    /// # Errors
    ///
    /// Returns the transcript's close error.
    pub fn close(&mut self) -> Result<(), TranscriptError> {
        match self.transcript.take() {
            Some(mut transcript) => transcript.close(),
            None => Ok(()),
        }
    }

    fn record(&mut self, origin: LineOrigin, text: String) -> DisplayLine {
        let line = DisplayLine { origin, text };
        if let Some(transcript) = self.transcript.as_mut() {
            if let Err(e) = transcript.append_line(&line.to_string()) {
                warn!("transcript disabled: {e}");
                self.transcript = None;
            }
        }
        line
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
