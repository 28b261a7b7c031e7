//! Playback engine
//!
//! This module replays a recording to a sample callback as if it were live
//! capture. It is organised leaves first:
//!
//! - [`indexer`] - incremental scan of the file into sample descriptors
//! - [`decoder`] - materializes image payloads, delegating to a [`FrameCodec`]
//! - [`prefetch`] - read-ahead into the shared [`SampleBuffer`]
//! - [`clock`] - maps capture timestamps to wall-clock delivery
//! - [`reader`] - the background loop tying the above together
//! - [`controller`] - [`PlaybackEngine`], the public control surface
//!
//! # Sinks
//!
//! Samples are pushed to a callback on the reader thread. [`sample_channel`]
//! and [`eof_channel`] adapt the callbacks to crossbeam channels for callers
//! that prefer to pull.

pub mod buffer;
pub mod clock;
pub mod codec;
pub mod controller;
pub mod decoder;
pub mod indexer;
#[cfg(any(test, feature = "mock-recording"))]
pub mod mock_recording;
pub mod prefetch;
pub(crate) mod reader;

pub use buffer::SampleBuffer;
pub use clock::{Clock, ManualClock, PacingClock, SystemClock};
pub use codec::{CodecError, FrameCodec};
pub use controller::PlaybackEngine;
pub use prefetch::Prefetched;

use crate::types::Sample;
use crossbeam_channel::{unbounded, Receiver};

/// Receives every delivered sample, on the reader thread
pub type SampleCallback = Box<dyn FnMut(Sample) + Send>;

/// Invoked once when a play-through reaches the end of the recording
pub type EofCallback = Box<dyn FnMut() + Send>;

/// Sample callback forwarding into a channel.
///
/// Samples are dropped once the receiver is gone.
pub fn sample_channel() -> (SampleCallback, Receiver<Sample>) {
    let (tx, rx) = unbounded();
    let callback = Box::new(move |sample: Sample| {
        let _ = tx.send(sample);
    });
    (callback, rx)
}

/// End-of-file callback signalling through a channel
pub fn eof_channel() -> (EofCallback, Receiver<()>) {
    let (tx, rx) = unbounded();
    let callback = Box::new(move || {
        let _ = tx.send(());
    });
    (callback, rx)
}
