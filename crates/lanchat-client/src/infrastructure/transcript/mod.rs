//! File-backed chat transcript.
//!
//! The file is truncated when the client starts and every line is flushed as
//! soon as it is written, so the transcript is complete even if the process is
//! killed.  On a normal exit the file is removed unless the user asked to keep
//! it.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use crate::application::chat_feed::{TranscriptError, TranscriptSink};

/// File name used when `--transcript` is not given.
pub const DEFAULT_TRANSCRIPT_FILE: &str = "client_chat.log";

pub struct FileTranscript {
    path: PathBuf,
    /// `None` once closed.
    file: Option<File>,
    keep_on_close: bool,
}

impl FileTranscript {
    /// Creates (or truncates) the transcript at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TranscriptError::Io`] if the file cannot be created.
    pub fn create(path: impl Into<PathBuf>, keep_on_close: bool) -> Result<Self, TranscriptError> {
        let path = path.into();
        let file = File::create(&path).map_err(|source| TranscriptError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("recording transcript to {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
            keep_on_close,
        })
    }

    fn io_error(&self, source: std::io::Error) -> TranscriptError {
        TranscriptError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TranscriptSink for FileTranscript {
    fn append_line(&mut self, line: &str) -> Result<(), TranscriptError> {
        let Some(file) = self.file.as_mut() else {
            return Err(self.io_error(std::io::Error::other("transcript is closed")));
        };
        let written = writeln!(file, "{line}").and_then(|()| file.flush());
        written.map_err(|e| self.io_error(e))
    }

    fn close(&mut self) -> Result<(), TranscriptError> {
        if self.file.take().is_none() || self.keep_on_close {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_on_disk_before_close() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_TRANSCRIPT_FILE);
        let mut transcript = FileTranscript::create(&path, false).unwrap();

        // Act
        transcript.append_line("alice: hello").unwrap();
        transcript.append_line("bob: hi").unwrap();

        // Assert
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "alice: hello\nbob: hi\n");
    }

    #[test]
    fn test_create_truncates_previous_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_TRANSCRIPT_FILE);
        std::fs::write(&path, "old session\n").unwrap();

        let _transcript = FileTranscript::create(&path, false).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_close_removes_file_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_TRANSCRIPT_FILE);
        let mut transcript = FileTranscript::create(&path, false).unwrap();
        transcript.append_line("alice: bye").unwrap();

        transcript.close().unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_close_keeps_file_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kept.log");
        let mut transcript = FileTranscript::create(&path, true).unwrap();
        transcript.append_line("alice: keep this").unwrap();

        transcript.close().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "alice: keep this\n");
    }

    #[test]
    fn test_close_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_TRANSCRIPT_FILE);
        let mut transcript = FileTranscript::create(&path, false).unwrap();

        transcript.close().unwrap();

        assert!(transcript.close().is_ok());
    }

    #[test]
    fn test_append_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut transcript =
            FileTranscript::create(dir.path().join(DEFAULT_TRANSCRIPT_FILE), true).unwrap();
        transcript.close().unwrap();

        assert!(transcript.append_line("late").is_err());
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileTranscript::create(dir.path().join("no").join("such.log"), false);
        assert!(matches!(result, Err(TranscriptError::Io { .. })));
    }
}
