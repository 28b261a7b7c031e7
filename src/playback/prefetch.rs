//! Read-ahead
//!
//! The prefetcher walks the descriptor list with a cursor and turns eligible
//! descriptors into queued [`Sample`]s: image descriptors of active streams
//! are decoded, motion and time-sync descriptors are queued as-is when motion
//! is enabled, everything else is passed over.
//!
//! # Buffering heuristic
//!
//! [`Prefetcher::all_streams_buffered`] decides when read-ahead may pause:
//! - indexing finished, the cursor is exhausted and something is queued
//! - the queue reached its hard cap
//! - image streams are active and each has a ready frame
//! - only motion is flowing and the queue exceeds its motion depth

use super::buffer::SampleBuffer;
use super::decoder::Decoder;
use super::indexer::Indexer;
use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::types::{Sample, SampleDescriptor, SampleKind};
use std::sync::Arc;

/// What a single prefetch step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefetched {
    /// Nothing to do: cursor exhausted or buffers already full
    Idle,
    /// A sample was queued
    Queued(SampleKind),
    /// The descriptor was passed over (inactive stream, motion disabled, debug event)
    Passed(SampleKind),
    /// An image could not be decoded and was skipped
    Skipped,
}

/// Cursor over the descriptor list feeding the shared buffer
#[derive(Debug)]
pub struct Prefetcher {
    cursor: usize,
    motion_enabled: bool,
    motion_prefetch_depth: usize,
    max_prefetch_depth: usize,
    buffer: Arc<SampleBuffer>,
}

impl Prefetcher {
    pub fn new(buffer: Arc<SampleBuffer>, config: &PlaybackConfig) -> Self {
        Self {
            cursor: 0,
            motion_enabled: config.motion_enabled,
            motion_prefetch_depth: config.motion_prefetch_depth,
            max_prefetch_depth: config.max_prefetch_depth.max(1),
            buffer,
        }
    }

    /// Position of the next descriptor to consider
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor;
    }

    pub fn motion_enabled(&self) -> bool {
        self.motion_enabled
    }

    pub fn set_motion_enabled(&mut self, enabled: bool) {
        self.motion_enabled = enabled;
    }

    /// Whether every descriptor known so far has been consumed
    pub fn is_exhausted(&self, indexer: &Indexer) -> bool {
        self.cursor >= indexer.len()
    }

    pub fn all_streams_buffered(&self, indexer: &Indexer) -> bool {
        let level = self.buffer.level();

        if indexer.is_complete() && self.is_exhausted(indexer) && level.queued > 0 {
            return true;
        }
        if level.queued >= self.max_prefetch_depth {
            return true;
        }
        if level.active_streams > 0 {
            return level.all_ready;
        }

        let threshold = if self.motion_enabled {
            self.motion_prefetch_depth
        } else {
            0
        };
        level.queued > threshold
    }

    /// Consider the descriptor at the cursor and advance past it
    pub fn prefetch_one(&mut self, indexer: &Indexer, decoder: &mut Decoder) -> Result<Prefetched> {
        if self.all_streams_buffered(indexer) {
            return Ok(Prefetched::Idle);
        }
        let Some(descriptor) = indexer.get(self.cursor).copied() else {
            return Ok(Prefetched::Idle);
        };
        self.cursor += 1;

        match descriptor {
            SampleDescriptor::Image(image) => {
                let Some(info) = self.buffer.active_info(image.stream) else {
                    return Ok(Prefetched::Passed(SampleKind::Image));
                };
                let active = self.buffer.active_infos();
                match decoder.decode(&image, &info, &active)? {
                    Some(frame) => {
                        tracing::trace!(
                            "Prefetched {} frame {} ({}us)",
                            image.stream,
                            image.frame_number,
                            image.capture_time
                        );
                        self.buffer.push(Sample::Frame(frame));
                        Ok(Prefetched::Queued(SampleKind::Image))
                    }
                    None => {
                        tracing::warn!(
                            "Skipping undecodable {} frame {}",
                            image.stream,
                            image.frame_number
                        );
                        self.buffer.record_skipped();
                        Ok(Prefetched::Skipped)
                    }
                }
            }
            SampleDescriptor::Motion(motion) if self.motion_enabled => {
                self.buffer.push(Sample::Motion(motion));
                Ok(Prefetched::Queued(SampleKind::Motion))
            }
            SampleDescriptor::TimeSync(sync) if self.motion_enabled => {
                self.buffer.push(Sample::TimeSync(sync));
                Ok(Prefetched::Queued(SampleKind::TimeSync))
            }
            other => Ok(Prefetched::Passed(other.kind())),
        }
    }
}
