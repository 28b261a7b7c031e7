//! Pluggable frame decompression
//!
//! The engine never decompresses pixels itself. Streams recorded with a
//! compressed codec are handed to a [`FrameCodec`] registered on the engine;
//! without one, playback of such a stream is a fatal configuration fault.

use crate::types::{ImageDescriptor, StreamInfo};
use thiserror::Error;

/// Failure to decode one payload; the frame is skipped, playback continues
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("corrupt payload: {0}")]
    Corrupt(String),

    #[error("decoded {actual} bytes, expected {expected}")]
    OutputSize { expected: usize, actual: usize },
}

/// Decompresses image payloads
#[cfg_attr(test, mockall::automock)]
pub trait FrameCodec: Send {
    /// Called whenever the decoder state is rebuilt for a new active stream set
    fn configure(&mut self, streams: &[StreamInfo]);

    /// Decompress one frame payload into raw pixels
    fn decode(
        &mut self,
        frame: &ImageDescriptor,
        info: &StreamInfo,
        payload: &[u8],
    ) -> Result<Vec<u8>, CodecError>;
}
