//! Test recordings

use capture_replay::playback::mock_recording::{image_stream, RecordingBuilder};
use capture_replay::types::MotionType;
use capture_replay::{CompressionType, PlaybackConfig, StreamId};

/// Capture times (ms) of the two-stream scenario: depth then color
pub const DEPTH_TIMES_MS: [u64; 4] = [0, 10, 20, 30];
pub const COLOR_TIMES_MS: [u64; 4] = [0, 11, 19, 31];

/// Depth and color recorded side by side, interleaved in file order
pub fn two_stream_recording() -> Vec<u8> {
    let mut builder = RecordingBuilder::new()
        .stream(image_stream(StreamId::Depth, 8, 4))
        .stream(image_stream(StreamId::Color, 8, 4));
    for i in 0..4 {
        builder = builder
            .image(StreamId::Depth, i as u32 + 1, DEPTH_TIMES_MS[i] * 1_000)
            .image(StreamId::Color, i as u32 + 1, COLOR_TIMES_MS[i] * 1_000);
    }
    builder.build()
}

/// Depth at a fixed period with motion samples in between
pub fn depth_and_motion_recording(frames: u32, period_us: u64) -> Vec<u8> {
    let mut builder = RecordingBuilder::new().stream(image_stream(StreamId::Depth, 8, 4));
    for i in 0..frames {
        let t = i as u64 * period_us;
        builder = builder
            .image(StreamId::Depth, i, t)
            .motion(t + period_us / 2, MotionType::Accel, [0.0, 0.0, 9.81])
            .time_sync(t + period_us / 2 + 1, i);
    }
    builder.build()
}

/// A single compressed color stream
pub fn compressed_recording(frames: u32) -> Vec<u8> {
    let mut color = image_stream(StreamId::Color, 8, 4);
    color.compression = CompressionType::Lz4;
    let mut builder = RecordingBuilder::new().stream(color);
    for i in 0..frames {
        builder = builder.image(StreamId::Color, i, i as u64 * 33_333);
    }
    builder.build()
}

/// Non-realtime playback of the given streams
pub fn fast_config(streams: &[StreamId]) -> PlaybackConfig {
    PlaybackConfig {
        realtime: false,
        streams: streams.to_vec(),
        ..Default::default()
    }
}

/// Realtime playback of the given streams
pub fn realtime_config(streams: &[StreamId]) -> PlaybackConfig {
    PlaybackConfig {
        realtime: true,
        streams: streams.to_vec(),
        ..Default::default()
    }
}
