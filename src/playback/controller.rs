//! Playback controller
//!
//! [`PlaybackEngine`] is the public face of the crate. It opens a recording,
//! owns the background reader and exposes the playback controls.
//!
//! # States
//!
//! The engine is either idle (the reader core sits in the engine) or running
//! (the core has been moved into the reader thread). Every control that
//! mutates playback state stops the reader first, applies the change to the
//! reclaimed core, and restarts the reader if it had been running. Callers
//! therefore never observe a half-applied change.
//!
//! # Faults
//!
//! Errors the loop stops with are returned by the next `pause` or `resume`;
//! other controls log non-fatal ones and carry on. Format
//! faults and codec configuration faults are fatal: the engine refuses
//! further playback controls with [`ReplayError::Faulted`], while the header
//! queries keep working.

use super::buffer::SampleBuffer;
use super::clock::{Clock, PacingClock, SystemClock};
use super::codec::FrameCodec;
use super::decoder::Decoder;
use super::indexer::Indexer;
use super::prefetch::{Prefetched, Prefetcher};
use super::reader::{ReaderCore, ReaderTask};
use crate::config::PlaybackConfig;
use crate::error::{ReplayError, Result, ResultExt};
use crate::format::{read_headers, ByteSource, RecordingHeaders};
use crate::types::{
    CaptureMode, FileInfo, FrameSample, PlaybackStats, Sample, SampleDescriptor, StreamId,
    StreamInfo, StreamProfile, Version,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Replays one recording
pub struct PlaybackEngine {
    headers: RecordingHeaders,
    capture_mode: CaptureMode,
    config: PlaybackConfig,
    buffer: Arc<SampleBuffer>,
    pacing: Arc<PacingClock>,
    /// Present while idle
    core: Option<ReaderCore>,
    /// Present while a reader thread exists (possibly finished but not joined)
    task: Option<ReaderTask>,
    fault: Option<String>,
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("capture_mode", &self.capture_mode)
            .field("streams", &self.headers.streams.len())
            .field("running", &self.is_running())
            .field("fault", &self.fault)
            .finish()
    }
}

impl PlaybackEngine {
    /// Open a recording with the default configuration
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        Self::init_with_config(path, PlaybackConfig::default())
    }

    /// Open a recording; the file is opened twice, for indexing and for decoding
    pub fn init_with_config(path: impl AsRef<Path>, config: PlaybackConfig) -> Result<Self> {
        let path = path.as_ref();
        let open = || {
            File::open(path)
                .map(BufReader::new)
                .with_context(|| format!("Failed to open recording {:?}", path))
        };
        let index_source = open()?;
        let data_source = open()?;
        Self::from_sources(Box::new(index_source), Box::new(data_source), config)
    }

    /// Play a recording held in memory
    pub fn from_bytes(bytes: Vec<u8>, config: PlaybackConfig) -> Result<Self> {
        Self::from_sources(
            Box::new(Cursor::new(bytes.clone())),
            Box::new(Cursor::new(bytes)),
            config,
        )
    }

    /// Open a recording from two independent handles on the same bytes
    pub fn from_sources(
        index_source: Box<dyn ByteSource>,
        mut data_source: Box<dyn ByteSource>,
        config: PlaybackConfig,
    ) -> Result<Self> {
        config.validate()?;
        let headers =
            read_headers(&mut *data_source).context("Failed to read recording headers")?;

        let mut active = Vec::with_capacity(config.streams.len());
        for stream in &config.streams {
            let info = headers
                .streams
                .get(stream)
                .ok_or(ReplayError::UnknownStream(*stream))?;
            active.push(*info);
        }

        let batch = config.index_batch_size;
        let mut indexer = Indexer::new(
            index_source,
            headers.header.first_frame_offset,
            headers.file_len,
        );
        let capture_mode = match headers.header.capture_mode {
            CaptureMode::Unknown => {
                let streams: Vec<StreamId> = headers.streams.keys().copied().collect();
                let detected = indexer.detect_capture_mode(&streams, batch)?;
                tracing::debug!("Detected {:?} capture mode", detected);
                detected
            }
            declared => declared,
        };
        indexer.index_next_samples(batch)?;

        let buffer = Arc::new(SampleBuffer::new());
        for info in active {
            buffer.activate(info);
        }

        let pacing = Arc::new(PacingClock::new(Arc::new(SystemClock::new())));
        let core = ReaderCore {
            indexer,
            decoder: Decoder::new(
                data_source,
                headers.file_len,
                headers.header.pitch_table_len(),
            ),
            prefetcher: Prefetcher::new(buffer.clone(), &config),
            buffer: buffer.clone(),
            pacing: pacing.clone(),
            realtime: config.realtime,
            index_batch_size: batch,
            max_sleep_increment: config.max_sleep_increment(),
            on_sample: None,
            on_eof: None,
        };
        core.reset_time_base();

        tracing::info!(
            "Opened {:?} recording v{} with {} streams ({:?} capture)",
            headers.header.format(),
            headers.header.version,
            headers.streams.len(),
            capture_mode
        );

        Ok(Self {
            headers,
            capture_mode,
            config,
            buffer,
            pacing,
            core: Some(core),
            task: None,
            fault: None,
        })
    }

    // ==================== Reader lifecycle ====================

    fn note_fault(&mut self, error: &ReplayError) {
        if error.is_fatal() && self.fault.is_none() {
            tracing::error!("Playback engine faulted: {}", error);
            self.fault = Some(error.to_string());
        }
    }

    /// Stop and join the reader if one exists; returns whether it was still running
    fn stop_reader(&mut self) -> Result<bool> {
        let Some(task) = self.task.take() else {
            return Ok(false);
        };
        let was_running = task.is_running();

        match task.stop() {
            Ok((core, result)) => {
                self.core = Some(core);
                if let Err(e) = result {
                    self.note_fault(&e);
                    return Err(e);
                }
                Ok(was_running)
            }
            Err(e) => {
                self.note_fault(&e);
                Err(e)
            }
        }
    }

    fn core_mut(&mut self) -> Result<&mut ReaderCore> {
        if let Some(fault) = &self.fault {
            return Err(ReplayError::Faulted(fault.clone()));
        }
        self.core
            .as_mut()
            .ok_or_else(|| ReplayError::Faulted("reader state unavailable".to_string()))
    }

    /// Like [`Self::stop_reader`], but a non-fatal error left by a finished
    /// play-through is only logged. Fatal ones latch the engine and propagate.
    fn settle_reader(&mut self) -> Result<bool> {
        match self.stop_reader() {
            Ok(running) => Ok(running),
            Err(e) if !e.is_fatal() => {
                tracing::warn!("Previous play-through ended with: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Run `apply` with the reader stopped, restarting it afterwards if it was running
    fn with_paused<T>(&mut self, apply: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let was_running = self.settle_reader()?;
        let result = apply(self);
        if let Err(e) = &result {
            self.note_fault(e);
        }
        if was_running {
            if let Err(e) = self.resume() {
                if result.is_ok() {
                    return Err(e);
                }
                tracing::warn!("Failed to resume playback: {}", e);
            }
        }
        result
    }

    /// Start delivering samples from the current position
    pub fn resume(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ReplayError::AlreadyRunning);
        }
        self.stop_reader()?;

        if let Some(fault) = &self.fault {
            return Err(ReplayError::Faulted(fault.clone()));
        }
        let core = self
            .core
            .take()
            .ok_or_else(|| ReplayError::Faulted("reader state unavailable".to_string()))?;
        core.reset_time_base();

        match ReaderTask::start(core) {
            Ok(task) => {
                tracing::info!("Playback resumed");
                self.task = Some(task);
                Ok(())
            }
            Err(e) => {
                self.fault = Some(format!("failed to start reader: {}", e));
                Err(e)
            }
        }
    }

    /// Stop delivering samples; blocks until the reader has exited
    pub fn pause(&mut self) -> Result<()> {
        if self.stop_reader()? {
            tracing::info!("Playback paused");
        }
        Ok(())
    }

    /// Rewind to the first sample
    pub fn reset(&mut self) -> Result<()> {
        self.settle_reader()?;
        let core = self.core_mut()?;
        core.decoder.rewind()?;
        core.decoder.invalidate();
        core.prefetcher.set_cursor(0);
        core.buffer.clear();
        core.reset_time_base();
        tracing::debug!("Playback reset to the first sample");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(ReaderTask::is_running)
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    // ==================== Setup ====================

    /// Register the per-sample sink; called on the reader thread
    pub fn set_sample_callback(&mut self, callback: impl FnMut(Sample) + Send + 'static) -> Result<()> {
        self.with_paused(|engine| {
            engine.core_mut()?.on_sample = Some(Box::new(callback));
            Ok(())
        })
    }

    /// Register the end-of-recording sink
    pub fn set_eof_callback(&mut self, callback: impl FnMut() + Send + 'static) -> Result<()> {
        self.with_paused(|engine| {
            engine.core_mut()?.on_eof = Some(Box::new(callback));
            Ok(())
        })
    }

    /// Register the codec for compressed streams
    pub fn set_codec(&mut self, codec: impl FrameCodec + 'static) -> Result<()> {
        self.with_paused(|engine| {
            engine.core_mut()?.decoder.set_codec(Box::new(codec));
            Ok(())
        })
    }

    /// Replace the time source used for pacing
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) -> Result<()> {
        self.with_paused(|engine| {
            let pacing = Arc::new(PacingClock::new(clock));
            engine.pacing = pacing.clone();
            let core = engine.core_mut()?;
            core.pacing = pacing;
            core.reset_time_base();
            Ok(())
        })
    }

    // ==================== Controls ====================

    /// Enable or disable delivery of one image stream
    pub fn enable_stream(&mut self, stream: StreamId, enabled: bool) -> Result<()> {
        let info = *self
            .headers
            .streams
            .get(&stream)
            .ok_or(ReplayError::UnknownStream(stream))?;

        self.with_paused(|engine| {
            let core = engine.core_mut()?;
            if enabled {
                core.buffer.activate(info);
            } else {
                let purged = core.buffer.deactivate(stream);
                if purged > 0 {
                    tracing::debug!("Purged {} queued {} frames", purged, stream);
                }
            }
            core.decoder.invalidate();
            tracing::info!(
                "{} stream {}",
                if enabled { "Enabled" } else { "Disabled" },
                stream
            );
            Ok(())
        })
    }

    /// Enable or disable delivery of motion and time-sync samples
    pub fn enable_motion(&mut self, enabled: bool) -> Result<()> {
        self.with_paused(|engine| {
            engine.core_mut()?.prefetcher.set_motion_enabled(enabled);
            engine.config.motion_enabled = enabled;
            tracing::info!("Motion tracking {}", if enabled { "enabled" } else { "disabled" });
            Ok(())
        })
    }

    /// Switch between paced and as-fast-as-possible delivery
    pub fn set_realtime(&mut self, realtime: bool) -> Result<()> {
        self.with_paused(|engine| {
            let core = engine.core_mut()?;
            core.realtime = realtime;
            core.reset_time_base();
            engine.config.realtime = realtime;
            tracing::info!("Realtime playback {}", if realtime { "on" } else { "off" });
            Ok(())
        })
    }

    /// Run one read-ahead step by hand
    pub fn prefetch_one(&mut self) -> Result<Prefetched> {
        self.with_paused(|engine| {
            let core = engine.core_mut()?;
            core.prefetcher.prefetch_one(&core.indexer, &mut core.decoder)
        })
    }

    // ==================== Seeking ====================

    /// Jump to frame `index` of `stream`.
    ///
    /// Returns that frame plus, for every other active stream, the frame
    /// captured closest to it. Playback continues from the requested frame.
    pub fn set_frame_by_index(
        &mut self,
        index: usize,
        stream: StreamId,
    ) -> Result<BTreeMap<StreamId, FrameSample>> {
        let info = *self
            .headers
            .streams
            .get(&stream)
            .ok_or(ReplayError::UnknownStream(stream))?;
        let batch = self.config.index_batch_size;

        self.with_paused(|engine| {
            let core = engine.core_mut()?;
            while core.indexer.frame_count(stream) <= index && !core.indexer.is_complete() {
                core.indexer.index_next_samples(batch)?;
            }
            let Some(&anchor) = core.indexer.image_indices(stream).get(index) else {
                return Err(ReplayError::FrameIndexOutOfRange {
                    stream,
                    index,
                    available: core.indexer.frame_count(stream),
                });
            };
            let reference = core
                .indexer
                .get(anchor)
                .map_or(0, SampleDescriptor::capture_time);

            tracing::debug!("Seeking to {} frame {} ({}us)", stream, index, reference);
            seek_to(core, anchor, Some(info), reference, batch)
        })
    }

    /// Jump to the first image captured at or after `timestamp` (µs).
    ///
    /// Returns, for every active stream, the frame captured closest to
    /// `timestamp`.
    pub fn set_frame_by_timestamp(
        &mut self,
        timestamp: u64,
    ) -> Result<BTreeMap<StreamId, FrameSample>> {
        let batch = self.config.index_batch_size;

        self.with_paused(|engine| {
            let core = engine.core_mut()?;
            let mut position = 0;
            let anchor = loop {
                match core.indexer.get(position).copied() {
                    Some(SampleDescriptor::Image(image)) if image.capture_time >= timestamp => {
                        break position;
                    }
                    Some(_) => position += 1,
                    None if core.indexer.is_complete() => {
                        return Err(ReplayError::TimestampOutOfRange(timestamp));
                    }
                    None => {
                        core.indexer.index_next_samples(batch)?;
                    }
                }
            };

            tracing::debug!("Seeking to {}us (anchor sample {})", timestamp, anchor);
            seek_to(core, anchor, None, timestamp, batch)
        })
    }

    // ==================== Queries ====================

    /// Frames in `stream`; indexes the whole file when the header does not say
    pub fn query_number_of_frames(&mut self, stream: StreamId) -> Result<usize> {
        let declared = self
            .headers
            .streams
            .get(&stream)
            .ok_or(ReplayError::UnknownStream(stream))?
            .frame_count;
        if declared > 0 {
            return Ok(declared as usize);
        }

        let batch = self.config.index_batch_size;
        self.with_paused(|engine| {
            let core = engine.core_mut()?;
            core.indexer.index_to_end(batch)?;
            Ok(core.indexer.frame_count(stream))
        })
    }

    /// Wall time since playback was last (re)anchored
    pub fn query_run_time(&self) -> Duration {
        self.pacing.run_time()
    }

    pub fn query_file_info(&self) -> FileInfo {
        FileInfo {
            format: self.headers.header.format(),
            version: self.headers.header.version,
            capture_mode: self.capture_mode,
            sdk_version: self.headers.software.sdk.to_string(),
            librealsense_version: self.headers.software.librealsense.to_string(),
        }
    }

    pub fn query_sdk_version(&self) -> Version {
        self.headers.software.sdk
    }

    pub fn query_librealsense_version(&self) -> Version {
        self.headers.software.librealsense
    }

    pub fn query_capture_mode(&self) -> CaptureMode {
        self.capture_mode
    }

    /// Streams declared by the recording
    pub fn query_streams(&self) -> Vec<StreamInfo> {
        self.headers.streams.values().copied().collect()
    }

    /// Whether the recording holds `stream` with exactly this profile
    pub fn is_stream_profile_available(&self, stream: StreamId, profile: &StreamProfile) -> bool {
        self.headers
            .streams
            .get(&stream)
            .is_some_and(|info| info.profile == *profile)
    }

    pub fn is_stream_enabled(&self, stream: StreamId) -> bool {
        self.buffer.is_active(stream)
    }

    pub fn is_motion_enabled(&self) -> bool {
        self.config.motion_enabled
    }

    pub fn is_realtime(&self) -> bool {
        self.config.realtime
    }

    pub fn query_stats(&self) -> PlaybackStats {
        self.buffer.stats()
    }

    /// Decoded frames of `stream` waiting for delivery
    pub fn ready_count(&self, stream: StreamId) -> usize {
        self.buffer.ready_count(stream)
    }

    /// Samples waiting for delivery
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Descriptors indexed so far; `None` while the reader owns the index
    pub fn indexed_sample_count(&self) -> Option<usize> {
        self.core.as_ref().map(|core| core.indexer.len())
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if let Ok((_, Err(e))) = task.stop() {
                tracing::debug!("Reader ended with error during shutdown: {}", e);
            }
        }
    }
}

/// Reposition playback at descriptor `anchor` and return the selected frames.
///
/// With `anchor_stream` set, that stream's frame is the anchor itself and
/// only the other active streams are searched.
fn seek_to(
    core: &mut ReaderCore,
    anchor: usize,
    anchor_stream: Option<StreamInfo>,
    reference: u64,
    batch_size: usize,
) -> Result<BTreeMap<StreamId, FrameSample>> {
    let active = core.buffer.active_infos();
    let wanted: Vec<StreamId> = active
        .iter()
        .map(|info| info.stream)
        .filter(|stream| anchor_stream.map(|a| a.stream) != Some(*stream))
        .collect();

    let mut selected: Vec<(usize, StreamInfo)> = Vec::with_capacity(active.len());
    if let Some(info) = anchor_stream {
        selected.push((anchor, info));
    }
    let nearest = find_nearest_frames(&mut core.indexer, anchor, &wanted, reference, batch_size)?;
    for info in &active {
        if let Some(position) = nearest.get(&info.stream) {
            selected.push((*position, *info));
        }
    }

    let mut frames = BTreeMap::new();
    for (position, info) in selected {
        let Some(SampleDescriptor::Image(image)) = core.indexer.get(position).copied() else {
            continue;
        };
        match core.decoder.decode(&image, &info, &active)? {
            Some(frame) => {
                frames.insert(info.stream, frame);
            }
            None => tracing::warn!(
                "Could not decode {} frame {} while seeking",
                info.stream,
                image.frame_number
            ),
        }
    }

    core.prefetcher.set_cursor(anchor);
    core.buffer.clear();
    core.prefetcher
        .prefetch_one(&core.indexer, &mut core.decoder)?;
    core.reset_time_base();

    Ok(frames)
}

/// For each stream in `streams`, the image descriptor closest in capture time
/// to `reference` among the nearest one before `anchor` and the nearest one at
/// or after it. Ties go to the earlier sample.
pub(crate) fn find_nearest_frames(
    indexer: &mut Indexer,
    anchor: usize,
    streams: &[StreamId],
    reference: u64,
    batch_size: usize,
) -> Result<BTreeMap<StreamId, usize>> {
    let mut following: BTreeMap<StreamId, usize> = BTreeMap::new();
    let mut position = anchor;
    while following.len() < streams.len() {
        match indexer.get(position).copied() {
            Some(descriptor) => {
                if let SampleDescriptor::Image(image) = descriptor {
                    if streams.contains(&image.stream) {
                        following.entry(image.stream).or_insert(position);
                    }
                }
                position += 1;
            }
            None if indexer.is_complete() => break,
            None => {
                indexer.index_next_samples(batch_size)?;
            }
        }
    }

    let mut previous: BTreeMap<StreamId, usize> = BTreeMap::new();
    for position in (0..anchor).rev() {
        if previous.len() == streams.len() {
            break;
        }
        if let Some(SampleDescriptor::Image(image)) = indexer.get(position) {
            if streams.contains(&image.stream) {
                previous.entry(image.stream).or_insert(position);
            }
        }
    }

    let distance = |position: usize| {
        indexer
            .get(position)
            .map_or(u64::MAX, |d| d.capture_time().abs_diff(reference))
    };

    Ok(streams
        .iter()
        .filter_map(|stream| {
            let chosen = match (previous.get(stream), following.get(stream)) {
                (Some(&before), Some(&after)) => {
                    if distance(before) <= distance(after) {
                        before
                    } else {
                        after
                    }
                }
                (Some(&before), None) => before,
                (None, Some(&after)) => after,
                (None, None) => return None,
            };
            Some((*stream, chosen))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::read_headers;
    use crate::playback::mock_recording::{image_stream, RecordingBuilder};
    use crate::playback::{eof_channel, sample_channel};
    use std::io::Cursor;

    /// Depth at t={0,10,20,30}ms, color at t={0,11,19,31}ms
    fn two_stream_recording() -> Vec<u8> {
        let mut builder = RecordingBuilder::new()
            .stream(image_stream(StreamId::Depth, 4, 2))
            .stream(image_stream(StreamId::Color, 4, 2));
        let depth = [0u64, 10, 20, 30];
        let color = [0u64, 11, 19, 31];
        for i in 0..4 {
            builder = builder
                .image(StreamId::Depth, i as u32, depth[i] * 1_000)
                .image(StreamId::Color, i as u32, color[i] * 1_000);
        }
        builder.build()
    }

    fn engine(config: PlaybackConfig) -> PlaybackEngine {
        PlaybackEngine::from_bytes(two_stream_recording(), config).unwrap()
    }

    fn both_streams() -> PlaybackConfig {
        PlaybackConfig {
            realtime: false,
            streams: vec![StreamId::Depth, StreamId::Color],
            ..Default::default()
        }
    }

    #[test]
    fn test_find_nearest_prefers_closest_then_earlier() {
        let bytes = two_stream_recording();
        let headers = read_headers(&mut Cursor::new(bytes.clone())).unwrap();
        let mut indexer = Indexer::new(
            Box::new(Cursor::new(bytes)),
            headers.header.first_frame_offset,
            headers.file_len,
        );
        indexer.index_next_samples(1).unwrap();

        // depth frame 2 (t=20ms) sits at position 4; color 19ms is at 5, 31ms at 7
        let nearest =
            find_nearest_frames(&mut indexer, 4, &[StreamId::Color], 20_000, 2).unwrap();
        assert_eq!(nearest[&StreamId::Color], 5);

        // 15ms is 4ms from color 11ms (position 3) and 4ms from 19ms (position 5)
        let nearest =
            find_nearest_frames(&mut indexer, 5, &[StreamId::Color], 15_000, 2).unwrap();
        assert_eq!(nearest[&StreamId::Color], 3);
    }

    #[test]
    fn test_seek_by_index_selects_nearest_other_stream() {
        let mut engine = engine(both_streams());
        let frames = engine.set_frame_by_index(2, StreamId::Depth).unwrap();

        assert_eq!(frames[&StreamId::Depth].capture_time(), 20_000);
        assert_eq!(frames[&StreamId::Color].capture_time(), 19_000);
        assert_eq!(engine.ready_count(StreamId::Depth), 1);
        assert!(!engine.is_running());
    }

    #[test]
    fn test_seek_errors() {
        let mut engine = engine(both_streams());
        assert!(matches!(
            engine.set_frame_by_index(4, StreamId::Depth),
            Err(ReplayError::FrameIndexOutOfRange { available: 4, .. })
        ));
        assert!(matches!(
            engine.set_frame_by_index(0, StreamId::Fisheye),
            Err(ReplayError::UnknownStream(StreamId::Fisheye))
        ));
        assert!(matches!(
            engine.set_frame_by_timestamp(40_000),
            Err(ReplayError::TimestampOutOfRange(40_000))
        ));
        assert!(!engine.is_faulted());
    }

    #[test]
    fn test_disabled_stream_not_prefetched() {
        let mut engine = engine(both_streams());
        engine.enable_stream(StreamId::Color, false).unwrap();

        assert_eq!(
            engine.prefetch_one().unwrap(),
            Prefetched::Queued(crate::types::SampleKind::Image)
        );
        assert_eq!(engine.prefetch_one().unwrap(), Prefetched::Idle);
        assert_eq!(engine.ready_count(StreamId::Color), 0);
        assert!(!engine.is_stream_enabled(StreamId::Color));
    }

    #[test]
    fn test_resume_twice_is_usage_error() {
        let mut engine = engine(both_streams());
        let (release, blocked) = crossbeam_channel::bounded::<()>(0);
        engine
            .set_sample_callback(move |_| {
                let _ = blocked.recv();
            })
            .unwrap();
        let (on_eof, _eof) = eof_channel();
        engine.set_eof_callback(on_eof).unwrap();

        engine.resume().unwrap();
        // the reader cannot finish while the first delivery is blocked
        assert!(engine.is_running());
        assert!(matches!(engine.resume(), Err(ReplayError::AlreadyRunning)));

        drop(release);
        engine.pause().unwrap();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_play_through_without_eof_callback() {
        let mut engine = engine(both_streams());
        let (on_sample, samples) = sample_channel();
        engine.set_sample_callback(on_sample).unwrap();

        engine.resume().unwrap();
        while engine.is_running() {
            std::thread::yield_now();
        }
        let err = engine.pause().unwrap_err();
        assert!(err.is_usage_error());
        assert_eq!(samples.try_iter().count(), 8);

        // the engine stays usable after a usage fault
        engine.reset().unwrap();
        assert!(!engine.is_faulted());
    }

    #[test]
    fn test_controls_after_play_through_without_eof_callback() {
        let mut engine = engine(both_streams());
        let (on_sample, samples) = sample_channel();
        engine.set_sample_callback(on_sample).unwrap();

        engine.resume().unwrap();
        while engine.is_running() {
            std::thread::yield_now();
        }
        assert_eq!(samples.try_iter().count(), 8);

        // The missing-callback error from the finished run must not swallow this call
        engine.enable_stream(StreamId::Color, false).unwrap();
        assert!(!engine.is_stream_enabled(StreamId::Color));
        assert!(engine.is_stream_enabled(StreamId::Depth));
        assert!(!engine.is_faulted());

        // Already reported, so the next pause has nothing left to say
        engine.pause().unwrap();
    }

    #[test]
    fn test_queries() {
        let mut engine = engine(both_streams());
        assert_eq!(engine.query_number_of_frames(StreamId::Color).unwrap(), 4);
        assert_eq!(engine.query_streams().len(), 2);
        assert_eq!(engine.query_sdk_version(), Version::new(10, 0, 26));
        assert_eq!(engine.query_file_info().librealsense_version, "1.12.1");

        let depth = image_stream(StreamId::Depth, 4, 2);
        assert!(engine.is_stream_profile_available(StreamId::Depth, &depth.profile));
        let mut other = depth.profile;
        other.width = 640;
        assert!(!engine.is_stream_profile_available(StreamId::Depth, &other));
        assert!(!engine.is_stream_profile_available(StreamId::Fisheye, &depth.profile));
    }
}
