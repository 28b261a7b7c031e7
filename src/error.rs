//! Error handling for capture-replay
//!
//! This module defines the engine error type and a Result alias for use
//! throughout the crate. Errors fall into four groups:
//!
//! - **I/O faults** - open/seek/read failures, abort the operation in progress
//! - **Format faults** - malformed chunks or records, fatal to the engine instance
//! - **Codec faults** - unsupported compression is fatal; a single corrupt
//!   payload is not an error at all (the sample is skipped and logged)
//! - **Usage faults** - calling the engine in a way the protocol forbids
//!
//! Reaching the end of a recording is never an error.

use crate::types::StreamId;
use thiserror::Error;

/// Main error type for playback operations
#[derive(Error, Debug)]
pub enum ReplayError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed recording structure
    #[error("Format error at offset {offset}: {message}")]
    Format { offset: u64, message: String },

    /// A frame declares a compression type the engine cannot dispatch
    #[error("Unsupported compression type {0}")]
    UnsupportedCompression(u32),

    /// A compressed stream is active but no codec was registered
    #[error("No codec registered for {stream} ({compression})")]
    CodecUnavailable { stream: StreamId, compression: String },

    /// The stream is not declared in the recording
    #[error("Stream {0} is not present in the recording")]
    UnknownStream(StreamId),

    /// Seek by index past the last frame of a stream
    #[error("Frame index {index} out of range for {stream} ({available} frames)")]
    FrameIndexOutOfRange {
        stream: StreamId,
        index: usize,
        available: usize,
    },

    /// Seek by timestamp past the last image sample
    #[error("No image sample at or after timestamp {0}us")]
    TimestampOutOfRange(u64),

    /// `resume` while the reader thread is live
    #[error("Playback is already running")]
    AlreadyRunning,

    /// End of file reached with no completion callback registered
    #[error("End of file reached but no end-of-file callback is registered")]
    MissingEofCallback,

    /// The reader thread panicked (usually inside a sink callback)
    #[error("Reader thread panicked")]
    ReaderPanicked,

    /// A previous fatal fault left the engine unusable
    #[error("Engine faulted: {0}")]
    Faulted(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ReplayError>,
    },
}

impl ReplayError {
    /// Create a format error at the given file offset
    pub fn format(offset: u64, message: impl Into<String>) -> Self {
        ReplayError::Format {
            offset,
            message: message.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ReplayError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this fault leaves the engine unable to continue playback
    pub fn is_fatal(&self) -> bool {
        match self {
            ReplayError::Format { .. }
            | ReplayError::UnsupportedCompression(_)
            | ReplayError::CodecUnavailable { .. }
            | ReplayError::ReaderPanicked
            | ReplayError::Faulted(_) => true,
            ReplayError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Whether this is a protocol violation by the caller rather than a data error
    pub fn is_usage_error(&self) -> bool {
        match self {
            ReplayError::AlreadyRunning | ReplayError::MissingEofCallback => true,
            ReplayError::WithContext { source, .. } => source.is_usage_error(),
            _ => false,
        }
    }
}

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ReplayError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ReplayError::Io(e).with_context(f()))
    }
}
