//! Integration tests for continuous playback
//!
//! Tests the complete delivery path:
//! - Play-through and end-of-file signalling
//! - Realtime pacing against a synthetic clock
//! - Stream and motion toggling
//! - Compressed streams and decode failures

mod common;

use capture_replay::playback::mock_recording::{frame_pixels, image_stream, MockCodec, RecordingBuilder};
use capture_replay::playback::ManualClock;
use capture_replay::playback::Clock;
use capture_replay::{CompressionType, PlaybackConfig, ReplayError, Sample, StreamId};
use common::builders::{
    compressed_recording, depth_and_motion_recording, fast_config, realtime_config,
    two_stream_recording,
};
use common::mock_helpers::Harness;
use common::wait_until;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn frame_times(samples: &[Sample], stream: StreamId) -> Vec<u64> {
    samples
        .iter()
        .filter(|s| s.stream() == Some(stream))
        .map(Sample::capture_time)
        .collect()
}

#[test]
fn test_play_through_delivers_file_order_and_signals_eof_once() {
    let mut harness = Harness::new(
        two_stream_recording(),
        fast_config(&[StreamId::Depth, StreamId::Color]),
    );

    let samples = harness.play_to_end();
    assert_eq!(samples.len(), 8);
    assert_eq!(frame_times(&samples, StreamId::Depth), vec![0, 10_000, 20_000, 30_000]);
    assert_eq!(frame_times(&samples, StreamId::Color), vec![0, 11_000, 19_000, 31_000]);

    // Interleaved exactly as stored
    let streams: Vec<_> = samples.iter().filter_map(Sample::stream).collect();
    assert_eq!(streams[..2], [StreamId::Depth, StreamId::Color]);

    std::thread::sleep(Duration::from_millis(20));
    assert!(harness.eof.try_recv().is_err(), "EOF must fire once per play-through");
    assert!(!harness.engine.is_running());

    let stats = harness.engine.query_stats();
    assert_eq!(stats.delivered_frames, 8);
    assert_eq!(stats.total_frame_drops, 0);
}

#[test]
fn test_only_enabled_streams_are_delivered() {
    let mut harness = Harness::new(two_stream_recording(), fast_config(&[StreamId::Color]));

    let samples = harness.play_to_end();
    assert_eq!(samples.len(), 4);
    assert!(samples.iter().all(|s| s.stream() == Some(StreamId::Color)));
}

#[test]
fn test_non_realtime_never_sleeps() {
    let (mut harness, clock) = Harness::with_manual_clock(
        two_stream_recording(),
        fast_config(&[StreamId::Depth, StreamId::Color]),
    );

    let samples = harness.play_to_end();
    assert_eq!(samples.len(), 8);
    assert_eq!(clock.now(), Duration::ZERO);
}

#[test]
fn test_realtime_never_delivers_early() {
    let mut harness = Harness::new(
        two_stream_recording(),
        realtime_config(&[StreamId::Depth, StreamId::Color]),
    );
    let clock = Arc::new(ManualClock::new());
    harness.engine.set_clock(clock.clone()).unwrap();

    let deliveries = Arc::new(Mutex::new(Vec::new()));
    let sink = deliveries.clone();
    let sink_clock = clock.clone();
    harness
        .engine
        .set_sample_callback(move |sample: Sample| {
            sink.lock()
                .unwrap()
                .push((sink_clock.now(), sample.capture_time()));
        })
        .unwrap();

    let resumed_at = clock.now();
    harness.play_to_end();

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 8);
    for (delivered_at, capture_time) in deliveries.iter() {
        let elapsed = *delivered_at - resumed_at;
        assert!(
            elapsed >= Duration::from_micros(*capture_time),
            "sample at {}us delivered after only {:?}",
            capture_time,
            elapsed
        );
    }

    // Sleeps never overshoot the last sample by more than one increment
    let end = clock.now();
    assert!(end >= Duration::from_millis(31));
    assert!(end <= Duration::from_millis(31) + PlaybackConfig::default().max_sleep_increment());
}

#[test]
fn test_reset_replays_from_start() {
    let mut harness = Harness::new(
        two_stream_recording(),
        fast_config(&[StreamId::Depth, StreamId::Color]),
    );

    let first = harness.play_to_end();
    harness.engine.reset().unwrap();
    let second = harness.play_to_end();

    assert_eq!(first, second);
}

#[test]
fn test_resume_at_end_without_reset_is_an_empty_play_through() {
    let mut harness = Harness::new(two_stream_recording(), fast_config(&[StreamId::Depth]));

    assert_eq!(harness.play_to_end().len(), 4);
    assert!(harness.play_to_end().is_empty());
}

#[test]
fn test_toggling_streams_keeps_the_index() {
    let mut harness = Harness::new(
        two_stream_recording(),
        fast_config(&[StreamId::Depth, StreamId::Color]),
    );
    harness.play_to_end();
    let indexed = harness.engine.indexed_sample_count().unwrap();
    assert_eq!(indexed, 8);

    harness.engine.enable_stream(StreamId::Color, false).unwrap();
    harness.engine.enable_stream(StreamId::Color, true).unwrap();
    assert_eq!(harness.engine.indexed_sample_count(), Some(indexed));
    assert!(harness.engine.is_stream_enabled(StreamId::Color));

    assert!(matches!(
        harness.engine.enable_stream(StreamId::Fisheye, true),
        Err(ReplayError::UnknownStream(StreamId::Fisheye))
    ));
}

#[test]
fn test_disabling_a_stream_while_running() {
    let mut harness = Harness::new(
        two_stream_recording(),
        realtime_config(&[StreamId::Depth, StreamId::Color]),
    );
    let clock = Arc::new(ManualClock::new());
    harness.engine.set_clock(clock).unwrap();

    harness.engine.resume().unwrap();
    harness.engine.enable_stream(StreamId::Color, false).unwrap();
    assert_eq!(harness.engine.ready_count(StreamId::Color), 0);

    // The reader picks up where it stopped
    harness
        .eof
        .recv_timeout(common::test_timeout())
        .expect("playback should continue after the toggle");
    harness.engine.pause().unwrap();
    assert!(!harness.engine.is_faulted());
}

#[test]
fn test_motion_samples_delivered_when_enabled() {
    let config = PlaybackConfig {
        motion_enabled: true,
        ..fast_config(&[StreamId::Depth])
    };
    let mut harness = Harness::new(depth_and_motion_recording(5, 10_000), config);

    let samples = harness.play_to_end();
    assert_eq!(samples.len(), 15);

    let motion: Vec<_> = samples
        .iter()
        .filter_map(|s| match s {
            Sample::Motion(m) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(motion.len(), 5);
    assert_eq!(motion[0].data, [0.0, 0.0, 9.81]);
    assert_eq!(motion[0].capture_time, 5_000);

    let stats = harness.engine.query_stats();
    assert_eq!(stats.delivered_frames, 5);
    assert_eq!(stats.delivered_motion, 5);
    assert_eq!(stats.delivered_time_sync, 5);
}

#[test]
fn test_motion_suppressed_when_disabled() {
    let mut harness = Harness::new(
        depth_and_motion_recording(5, 10_000),
        fast_config(&[StreamId::Depth]),
    );
    assert!(!harness.engine.is_motion_enabled());

    let samples = harness.play_to_end();
    assert_eq!(samples.len(), 5);
    assert_eq!(harness.engine.query_stats().delivered_motion, 0);

    harness.engine.reset().unwrap();
    harness.engine.enable_motion(true).unwrap();
    assert_eq!(harness.play_to_end().len(), 15);
}

#[test]
fn test_motion_only_playback() {
    let config = PlaybackConfig {
        motion_enabled: true,
        ..fast_config(&[])
    };
    let mut harness = Harness::new(depth_and_motion_recording(20, 1_000), config);

    let samples = harness.play_to_end();
    assert_eq!(samples.len(), 40);
    assert!(samples.iter().all(|s| s.as_frame().is_none()));
}

#[test]
fn test_frame_gaps_are_counted_as_drops() {
    let bytes = RecordingBuilder::new()
        .stream(image_stream(StreamId::Depth, 4, 2))
        .image(StreamId::Depth, 1, 0)
        .image(StreamId::Depth, 2, 33_000)
        .image(StreamId::Depth, 5, 66_000)
        .image(StreamId::Depth, 6, 99_000)
        .build();
    let mut harness = Harness::new(bytes, fast_config(&[StreamId::Depth]));

    harness.play_to_end();
    let stats = harness.engine.query_stats();
    assert_eq!(stats.delivered_frames, 4);
    assert_eq!(stats.total_frame_drops, 2);
    assert_eq!(stats.frame_drops[&StreamId::Depth], 2);
}

#[test]
fn test_compressed_stream_decoded_through_codec() {
    let mut harness = Harness::new(compressed_recording(3), fast_config(&[StreamId::Color]));
    harness.engine.set_codec(MockCodec::default()).unwrap();

    let samples = harness.play_to_end();
    assert_eq!(samples.len(), 3);

    let info = harness.engine.query_streams()[0];
    assert_eq!(info.compression, CompressionType::Lz4);
    for sample in &samples {
        let frame = sample.as_frame().unwrap();
        assert_eq!(frame.data, frame_pixels(&info, frame.frame_number()));
    }
}

#[test]
fn test_corrupt_compressed_frame_is_skipped() {
    let mut color = image_stream(StreamId::Color, 8, 4);
    color.compression = CompressionType::Lz4;
    let mut corrupt = MockCodec::compress(&frame_pixels(&color, 1));
    corrupt[5] ^= 0xFF;

    let bytes = RecordingBuilder::new()
        .stream(color)
        .image(StreamId::Color, 0, 0)
        .image_payload(StreamId::Color, 1, 33_333, corrupt)
        .image(StreamId::Color, 2, 66_666)
        .build();
    let mut harness = Harness::new(bytes, fast_config(&[StreamId::Color]));
    harness.engine.set_codec(MockCodec::default()).unwrap();

    let samples = harness.play_to_end();
    let numbers: Vec<_> = samples
        .iter()
        .filter_map(Sample::as_frame)
        .map(|f| f.frame_number())
        .collect();
    assert_eq!(numbers, vec![0, 2]);

    let stats = harness.engine.query_stats();
    assert_eq!(stats.skipped_frames, 1);
    assert!(!harness.engine.is_faulted());
}

#[test]
fn test_missing_codec_faults_the_engine() {
    let mut harness = Harness::new(compressed_recording(3), fast_config(&[StreamId::Color]));

    harness.engine.resume().unwrap();
    assert!(wait_until(|| !harness.engine.is_running()));

    let err = harness.engine.pause().unwrap_err();
    assert!(matches!(err, ReplayError::CodecUnavailable { stream: StreamId::Color, .. }));
    assert!(harness.engine.is_faulted());
    assert!(harness.eof.try_recv().is_err());

    assert!(matches!(harness.engine.resume(), Err(ReplayError::Faulted(_))));
    assert!(matches!(harness.engine.reset(), Err(ReplayError::Faulted(_))));

    // Header queries survive the fault
    assert_eq!(harness.engine.query_streams().len(), 1);
    assert_eq!(harness.engine.query_file_info().sdk_version, "10.0.26");
}

#[test]
fn test_realtime_toggle_while_paused() {
    let mut harness = Harness::new(two_stream_recording(), realtime_config(&[StreamId::Depth]));
    assert!(harness.engine.is_realtime());

    harness.engine.set_realtime(false).unwrap();
    assert!(!harness.engine.is_realtime());
    assert_eq!(harness.play_to_end().len(), 4);
}
