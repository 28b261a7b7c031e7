//! Shared prefetch queue and active-stream bookkeeping
//!
//! [`SampleBuffer`] is the only state shared between the reader thread and
//! callers. A single mutex guards the queue, the per-stream ready counters
//! and the delivery statistics, so the three always agree. Every method
//! holds the lock only for its own duration; callbacks never run under it.

use crate::types::{PlaybackStats, Sample, StreamId, StreamInfo};
use std::collections::{BTreeMap, VecDeque};
use parking_lot::{Mutex, MutexGuard};

/// An enabled image stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveStream {
    pub info: StreamInfo,
    /// Decoded frames of this stream waiting in the queue
    pub ready: usize,
}

/// Snapshot used by the buffering heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLevel {
    pub queued: usize,
    pub active_streams: usize,
    /// Every active stream has at least one ready frame
    pub all_ready: bool,
}

#[derive(Debug, Default)]
struct BufferState {
    queue: VecDeque<Sample>,
    active: BTreeMap<StreamId, ActiveStream>,
    stats: PlaybackStats,
    /// Frame number last delivered per stream, for gap detection
    last_delivered: BTreeMap<StreamId, u32>,
}

/// Queue of decoded samples awaiting delivery
#[derive(Debug, Default)]
pub struct SampleBuffer {
    state: Mutex<BufferState>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock()
    }

    /// Enable a stream; a stream that is already active keeps its counter
    pub fn activate(&self, info: StreamInfo) {
        self.lock()
            .active
            .entry(info.stream)
            .or_insert(ActiveStream { info, ready: 0 });
    }

    /// Disable a stream and purge its queued frames; returns how many were purged
    pub fn deactivate(&self, stream: StreamId) -> usize {
        let mut state = self.lock();
        state.active.remove(&stream);
        let before = state.queue.len();
        state.queue.retain(|s| s.stream() != Some(stream));
        before - state.queue.len()
    }

    pub fn is_active(&self, stream: StreamId) -> bool {
        self.lock().active.contains_key(&stream)
    }

    pub fn active_info(&self, stream: StreamId) -> Option<StreamInfo> {
        self.lock().active.get(&stream).map(|a| a.info)
    }

    pub fn active_infos(&self) -> Vec<StreamInfo> {
        self.lock().active.values().map(|a| a.info).collect()
    }

    pub fn active_streams(&self) -> Vec<StreamId> {
        self.lock().active.keys().copied().collect()
    }

    /// Append a decoded sample, counting frames as ready for their stream
    pub fn push(&self, sample: Sample) {
        let mut state = self.lock();
        if let Some(stream) = sample.stream() {
            if let Some(active) = state.active.get_mut(&stream) {
                active.ready += 1;
            }
        }
        state.queue.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Ready frames of one stream (0 for inactive streams)
    pub fn ready_count(&self, stream: StreamId) -> usize {
        self.lock().active.get(&stream).map_or(0, |a| a.ready)
    }

    pub fn front_capture_time(&self) -> Option<u64> {
        self.lock().queue.front().map(Sample::capture_time)
    }

    pub fn level(&self) -> BufferLevel {
        let state = self.lock();
        BufferLevel {
            queued: state.queue.len(),
            active_streams: state.active.len(),
            all_ready: state.active.values().all(|a| a.ready > 0),
        }
    }

    /// Pop the front sample if `due(capture_time)` says it may be delivered.
    ///
    /// Updates the ready counter and the delivery statistics.
    pub fn pop_front_if(&self, due: impl FnOnce(u64) -> bool) -> Option<Sample> {
        let mut state = self.lock();
        let capture_time = state.queue.front()?.capture_time();
        if !due(capture_time) {
            return None;
        }
        let sample = state.queue.pop_front()?;
        state.record_delivery(&sample);
        Some(sample)
    }

    /// Count a frame that could not be decoded
    pub fn record_skipped(&self) {
        self.lock().stats.skipped_frames += 1;
    }

    /// Flush the queue, zero all ready counters and restart gap detection
    pub fn clear(&self) {
        let mut state = self.lock();
        state.queue.clear();
        for active in state.active.values_mut() {
            active.ready = 0;
        }
        state.last_delivered.clear();
    }

    pub fn stats(&self) -> PlaybackStats {
        self.lock().stats.clone()
    }
}

impl BufferState {
    fn record_delivery(&mut self, sample: &Sample) {
        match sample {
            Sample::Frame(frame) => {
                let stream = frame.stream();
                if let Some(active) = self.active.get_mut(&stream) {
                    active.ready = active.ready.saturating_sub(1);
                }
                self.stats.delivered_frames += 1;

                let number = frame.frame_number();
                if let Some(last) = self.last_delivered.insert(stream, number) {
                    let gap = number.saturating_sub(last).saturating_sub(1) as u64;
                    if gap > 0 {
                        tracing::debug!("{} dropped {} frames before frame {}", stream, gap, number);
                        *self.stats.frame_drops.entry(stream).or_default() += gap;
                        self.stats.total_frame_drops += gap;
                    }
                }
            }
            Sample::Motion(_) => self.stats.delivered_motion += 1,
            Sample::TimeSync(_) => self.stats.delivered_time_sync += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::mock_recording::image_stream;
    use crate::types::{
        CompressionType, FrameSample, ImageDescriptor, MotionSample, MotionType,
    };
    use std::collections::BTreeMap;

    fn frame(stream: StreamId, frame_number: u32, capture_time: u64) -> Sample {
        Sample::Frame(FrameSample {
            descriptor: ImageDescriptor {
                capture_time,
                offset: 0,
                stream,
                frame_number,
                time_stamp: 0.0,
                compression: CompressionType::None,
            },
            metadata: BTreeMap::new(),
            data: Vec::new(),
        })
    }

    fn motion(capture_time: u64) -> Sample {
        Sample::Motion(MotionSample {
            capture_time,
            offset: 0,
            motion_type: MotionType::Accel,
            timestamp: 0.0,
            frame_number: 0,
            data: [0.0; 3],
        })
    }

    #[test]
    fn test_ready_counts_follow_queue() {
        let buffer = SampleBuffer::new();
        buffer.activate(image_stream(StreamId::Depth, 4, 4));
        buffer.activate(image_stream(StreamId::Color, 4, 4));

        buffer.push(frame(StreamId::Depth, 0, 0));
        buffer.push(motion(5));
        assert_eq!(buffer.ready_count(StreamId::Depth), 1);
        assert!(!buffer.level().all_ready);

        buffer.push(frame(StreamId::Color, 0, 10));
        assert!(buffer.level().all_ready);
        assert_eq!(buffer.level().queued, 3);

        let first = buffer.pop_front_if(|_| true).unwrap();
        assert_eq!(first.stream(), Some(StreamId::Depth));
        assert_eq!(buffer.ready_count(StreamId::Depth), 0);
        assert_eq!(buffer.front_capture_time(), Some(5));
    }

    #[test]
    fn test_pop_respects_due_check() {
        let buffer = SampleBuffer::new();
        buffer.push(motion(100));
        assert!(buffer.pop_front_if(|t| t < 100).is_none());
        assert_eq!(buffer.len(), 1);
        assert!(buffer.pop_front_if(|t| t <= 100).is_some());
        assert!(buffer.pop_front_if(|_| true).is_none());
        assert_eq!(buffer.stats().delivered_motion, 1);
    }

    #[test]
    fn test_deactivate_purges_stream() {
        let buffer = SampleBuffer::new();
        buffer.activate(image_stream(StreamId::Depth, 4, 4));
        buffer.activate(image_stream(StreamId::Color, 4, 4));
        buffer.push(frame(StreamId::Depth, 0, 0));
        buffer.push(frame(StreamId::Color, 0, 1));
        buffer.push(motion(2));
        buffer.push(frame(StreamId::Color, 1, 3));

        assert_eq!(buffer.deactivate(StreamId::Color), 2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.ready_count(StreamId::Color), 0);
        assert!(!buffer.is_active(StreamId::Color));
        assert_eq!(buffer.active_streams(), vec![StreamId::Depth]);
    }

    #[test]
    fn test_frame_drop_accounting() {
        let buffer = SampleBuffer::new();
        buffer.activate(image_stream(StreamId::Depth, 4, 4));
        for n in [1, 2, 5, 6, 9] {
            buffer.push(frame(StreamId::Depth, n, n as u64));
        }
        while buffer.pop_front_if(|_| true).is_some() {}

        let stats = buffer.stats();
        assert_eq!(stats.delivered_frames, 5);
        assert_eq!(stats.total_frame_drops, 4);
        assert_eq!(stats.frame_drops[&StreamId::Depth], 4);
    }

    #[test]
    fn test_clear_resets_gap_tracking() {
        let buffer = SampleBuffer::new();
        buffer.activate(image_stream(StreamId::Depth, 4, 4));
        buffer.push(frame(StreamId::Depth, 1, 0));
        buffer.pop_front_if(|_| true);

        buffer.push(frame(StreamId::Depth, 2, 1));
        buffer.clear();
        assert_eq!(buffer.ready_count(StreamId::Depth), 0);
        assert!(buffer.is_empty());

        buffer.push(frame(StreamId::Depth, 40, 2));
        buffer.pop_front_if(|_| true);
        assert_eq!(buffer.stats().total_frame_drops, 0);
    }
}
