//! # capture-replay: multi-sensor recording playback
//!
//! Replays recorded capture sessions (several camera image streams, inertial
//! motion samples and timing markers) to a consumer as if they came from live
//! hardware. The engine indexes the recording lazily, decodes frames on a
//! background reader thread, and paces delivery to the recorded timestamps.
//!
//! ## Architecture
//!
//! - **Format**: header and chunk parsing of the on-disk recording
//! - **Indexer**: incremental scan producing per-stream frame indices
//! - **Decoder**: raw pixel copies, compressed payloads via a pluggable codec
//! - **Prefetcher**: bounded read-ahead into a shared sample queue
//! - **Pacing clock**: maps capture timestamps onto wall-clock delivery
//! - **Controller**: [`PlaybackEngine`], which owns the reader thread and the controls
//!
//! ## Configuration
//!
//! [`PlaybackConfig`] can be persisted as TOML in the platform configuration
//! directory under `capture-replay/playback.toml`.
//!
//! ## Example
//!
//! ```ignore
//! use capture_replay::{PlaybackConfig, PlaybackEngine, StreamId};
//!
//! let mut engine = PlaybackEngine::init_with_config(
//!     "session.rssdk",
//!     PlaybackConfig {
//!         streams: vec![StreamId::Depth, StreamId::Color],
//!         ..Default::default()
//!     },
//! )?;
//! engine.set_sample_callback(|sample| println!("{}us", sample.capture_time()))?;
//! engine.set_eof_callback(|| println!("done"))?;
//! engine.resume()?;
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod playback;
pub mod types;

// Re-export commonly used types
pub use config::PlaybackConfig;
pub use error::{ReplayError, Result};
pub use playback::{FrameCodec, PlaybackEngine};
pub use types::{
    CaptureMode, CompressionType, FileInfo, FrameSample, PlaybackStats, Sample, StreamId,
    StreamInfo, StreamProfile, Version,
};
