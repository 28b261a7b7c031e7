//! Synthetic recordings for testing
//!
//! This module writes small recordings in the on-disk format entirely in
//! memory, so the engine can be exercised without capture hardware or
//! fixture files. It also provides [`MockCodec`], a reversible byte scrambler
//! standing in for a real decompressor.
//!
//! # Example
//!
//! ```ignore
//! use capture_replay::playback::mock_recording::{image_stream, RecordingBuilder};
//! use capture_replay::StreamId;
//!
//! let bytes = RecordingBuilder::new()
//!     .stream(image_stream(StreamId::Depth, 8, 4))
//!     .image(StreamId::Depth, 0, 0)
//!     .image(StreamId::Depth, 1, 33_333)
//!     .motion(40_000, MotionType::Gyro, [0.0, 0.1, 0.0])
//!     .build();
//! ```
//!
//! # Enabling
//!
//! Only compiled for the crate's own tests or with the `mock-recording` feature.

use super::codec::{CodecError, FrameCodec};
use crate::format::{
    ChunkId, FILE_HEADER_SIZE, MAGIC_LINUX_V2, PITCH_TABLE_PLANES,
};
use crate::types::{
    CaptureMode, CompressionType, ImageDescriptor, MotionType, PixelFormat, StreamId, StreamInfo,
    StreamProfile, Version,
};

/// Image stream description with a format picked per sensor
pub fn image_stream(stream: StreamId, width: u32, height: u32) -> StreamInfo {
    let format = match stream {
        StreamId::Depth => PixelFormat::Z16,
        StreamId::Color => PixelFormat::Rgb8,
        StreamId::Infrared | StreamId::Infrared2 | StreamId::Fisheye => PixelFormat::Y8,
    };
    StreamInfo {
        stream,
        profile: StreamProfile {
            width,
            height,
            format,
            frame_rate: 30,
        },
        compression: CompressionType::None,
        frame_count: 0,
    }
}

/// Deterministic pixel content for one frame
pub fn frame_pixels(info: &StreamInfo, frame_number: u32) -> Vec<u8> {
    let bpp = info.profile.format.bytes_per_pixel().unwrap_or(1);
    let seed = frame_number.wrapping_mul(31).wrapping_add(info.stream.as_raw() * 7);
    (0..info.profile.area() * bpp)
        .map(|i| (seed as usize + i) as u8)
        .collect()
}

enum Record {
    Image {
        stream: StreamId,
        frame_number: u32,
        capture_time: u64,
        metadata: Vec<(u32, Vec<u8>)>,
        /// Payload as stored (already compressed if the stream is)
        payload: Vec<u8>,
    },
    Motion {
        capture_time: u64,
        motion_type: MotionType,
        data: [f32; 3],
    },
    TimeSync {
        capture_time: u64,
        frame_number: u32,
    },
    DebugEvent {
        capture_time: u64,
        payload: Vec<u8>,
    },
    RawChunk {
        id: u32,
        payload: Vec<u8>,
    },
}

/// In-memory recording writer
pub struct RecordingBuilder {
    magic: [u8; 4],
    capture_mode: CaptureMode,
    declared_stream_count: Option<u32>,
    streams: Vec<StreamInfo>,
    sdk: Version,
    librealsense: Version,
    records: Vec<Record>,
}

impl Default for RecordingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self {
            magic: MAGIC_LINUX_V2,
            capture_mode: CaptureMode::Async,
            declared_stream_count: None,
            streams: Vec::new(),
            sdk: Version::new(10, 0, 26),
            librealsense: Version::new(1, 12, 1),
            records: Vec::new(),
        }
    }

    pub fn magic(mut self, magic: [u8; 4]) -> Self {
        self.magic = magic;
        self
    }

    pub fn capture_mode(mut self, mode: CaptureMode) -> Self {
        self.capture_mode = mode;
        self
    }

    /// Override the stream count written in the file header
    pub fn declared_stream_count(mut self, count: u32) -> Self {
        self.declared_stream_count = Some(count);
        self
    }

    pub fn software(mut self, sdk: Version, librealsense: Version) -> Self {
        self.sdk = sdk;
        self.librealsense = librealsense;
        self
    }

    /// Declare a stream; images of undeclared streams are stored raw
    pub fn stream(mut self, info: StreamInfo) -> Self {
        self.streams.retain(|s| s.stream != info.stream);
        self.streams.push(info);
        self
    }

    /// Image frame with generated pixels
    pub fn image(self, stream: StreamId, frame_number: u32, capture_time: u64) -> Self {
        self.image_with_metadata(stream, frame_number, capture_time, &[])
    }

    /// Image frame with generated pixels and metadata entries
    pub fn image_with_metadata(
        mut self,
        stream: StreamId,
        frame_number: u32,
        capture_time: u64,
        metadata: &[(u32, &[u8])],
    ) -> Self {
        let info = self.stream_info(stream);
        let pixels = frame_pixels(&info, frame_number);
        let payload = if info.compression.is_compressed() {
            MockCodec::compress(&pixels)
        } else {
            pixels
        };
        self.records.push(Record::Image {
            stream,
            frame_number,
            capture_time,
            metadata: metadata.iter().map(|(id, b)| (*id, b.to_vec())).collect(),
            payload,
        });
        self
    }

    /// Image frame whose stored payload is given verbatim
    pub fn image_payload(
        mut self,
        stream: StreamId,
        frame_number: u32,
        capture_time: u64,
        payload: Vec<u8>,
    ) -> Self {
        self.records.push(Record::Image {
            stream,
            frame_number,
            capture_time,
            metadata: Vec::new(),
            payload,
        });
        self
    }

    pub fn motion(mut self, capture_time: u64, motion_type: MotionType, data: [f32; 3]) -> Self {
        self.records.push(Record::Motion {
            capture_time,
            motion_type,
            data,
        });
        self
    }

    pub fn time_sync(mut self, capture_time: u64, frame_number: u32) -> Self {
        self.records.push(Record::TimeSync {
            capture_time,
            frame_number,
        });
        self
    }

    pub fn debug_event(mut self, capture_time: u64, payload: &[u8]) -> Self {
        self.records.push(Record::DebugEvent {
            capture_time,
            payload: payload.to_vec(),
        });
        self
    }

    /// Arbitrary chunk in the record area
    pub fn raw_chunk(mut self, id: u32, payload: &[u8]) -> Self {
        self.records.push(Record::RawChunk {
            id,
            payload: payload.to_vec(),
        });
        self
    }

    fn stream_info(&self, stream: StreamId) -> StreamInfo {
        self.streams
            .iter()
            .find(|s| s.stream == stream)
            .copied()
            .unwrap_or_else(|| image_stream(stream, 0, 0))
    }

    /// Serialize the recording
    pub fn build(&self) -> Vec<u8> {
        let mut headers = Vec::new();
        for info in &self.streams {
            let mut payload = Vec::new();
            for field in [
                info.stream.as_raw(),
                info.profile.width,
                info.profile.height,
                info.profile.format.as_raw(),
                info.profile.frame_rate,
                info.compression.as_raw(),
                info.frame_count,
            ] {
                payload.extend_from_slice(&field.to_le_bytes());
            }
            push_chunk(&mut headers, ChunkId::StreamInfo.as_raw(), &payload);
        }
        let mut software = Vec::new();
        for field in [
            self.sdk.major,
            self.sdk.minor,
            self.sdk.patch,
            self.librealsense.major,
            self.librealsense.minor,
            self.librealsense.patch,
        ] {
            software.extend_from_slice(&field.to_le_bytes());
        }
        push_chunk(&mut headers, ChunkId::SoftwareInfo.as_raw(), &software);

        let first_frame_offset = FILE_HEADER_SIZE + headers.len() as u64;
        let stream_count = self
            .declared_stream_count
            .unwrap_or(self.streams.len() as u32);

        let mut out = Vec::new();
        out.extend_from_slice(&self.magic);
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&self.capture_mode.as_raw().to_le_bytes());
        out.extend_from_slice(&stream_count.to_le_bytes());
        out.extend_from_slice(&first_frame_offset.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.extend(headers);

        for record in &self.records {
            self.write_record(&mut out, record);
        }
        out
    }

    fn write_record(&self, out: &mut Vec<u8>, record: &Record) {
        match record {
            Record::Image {
                stream,
                frame_number,
                capture_time,
                metadata,
                payload,
            } => {
                let info = self.stream_info(*stream);
                push_sample_info(out, 1, *capture_time);

                let mut frame = Vec::new();
                frame.extend_from_slice(&stream.as_raw().to_le_bytes());
                frame.extend_from_slice(&frame_number.to_le_bytes());
                frame.extend_from_slice(&info.compression.as_raw().to_le_bytes());
                frame.extend_from_slice(&(*capture_time as f64 / 1000.0).to_le_bytes());
                push_chunk(out, ChunkId::FrameInfo.as_raw(), &frame);

                if !metadata.is_empty() {
                    let mut entries = Vec::new();
                    for (id, bytes) in metadata {
                        entries.extend_from_slice(&id.to_le_bytes());
                        entries.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                        entries.extend_from_slice(bytes);
                    }
                    push_chunk(out, ChunkId::ImageMetadata.as_raw(), &entries);
                }

                let mut data = Vec::new();
                if self.magic == MAGIC_LINUX_V2 {
                    let bpp = info.profile.format.bytes_per_pixel().unwrap_or(1) as u32;
                    let pitch = info.profile.width * bpp;
                    for plane in 0..PITCH_TABLE_PLANES {
                        let value = if plane == 0 { pitch } else { 0 };
                        data.extend_from_slice(&value.to_le_bytes());
                    }
                }
                data.extend_from_slice(payload);
                push_chunk(out, ChunkId::SampleData.as_raw(), &data);
            }
            Record::Motion {
                capture_time,
                motion_type,
                data,
            } => {
                push_sample_info(out, 2, *capture_time);
                let mut payload = Vec::new();
                payload.extend_from_slice(&motion_type.as_raw().to_le_bytes());
                payload.extend_from_slice(&(*capture_time as f64 / 1000.0).to_le_bytes());
                payload.extend_from_slice(&0u32.to_le_bytes());
                for axis in data {
                    payload.extend_from_slice(&axis.to_le_bytes());
                }
                push_chunk(out, ChunkId::SampleData.as_raw(), &payload);
            }
            Record::TimeSync {
                capture_time,
                frame_number,
            } => {
                push_sample_info(out, 3, *capture_time);
                let mut payload = Vec::new();
                payload.extend_from_slice(&0u32.to_le_bytes());
                payload.extend_from_slice(&(*capture_time as f64 / 1000.0).to_le_bytes());
                payload.extend_from_slice(&frame_number.to_le_bytes());
                push_chunk(out, ChunkId::SampleData.as_raw(), &payload);
            }
            Record::DebugEvent {
                capture_time,
                payload,
            } => {
                push_sample_info(out, 4, *capture_time);
                push_chunk(out, ChunkId::SampleData.as_raw(), payload);
            }
            Record::RawChunk { id, payload } => push_chunk(out, *id, payload),
        }
    }
}

fn push_chunk(out: &mut Vec<u8>, id: u32, payload: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

fn push_sample_info(out: &mut Vec<u8>, kind: u32, capture_time: u64) {
    let mut payload = Vec::new();
    payload.extend_from_slice(&kind.to_le_bytes());
    payload.extend_from_slice(&capture_time.to_le_bytes());
    push_chunk(out, ChunkId::SampleInfo.as_raw(), &payload);
}

/// Reversible stand-in for a real decompressor.
///
/// Payloads are a checksum byte followed by the pixels XORed with a fixed
/// key, so corruption is detectable.
#[derive(Debug, Default, Clone)]
pub struct MockCodec {
    /// Stream sets passed to `configure`, most recent last
    pub configured: Vec<Vec<StreamId>>,
}

const MOCK_KEY: u8 = 0x5A;

impl MockCodec {
    pub fn compress(pixels: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(pixels.len() + 1);
        out.push(checksum(pixels));
        out.extend(pixels.iter().map(|b| b ^ MOCK_KEY));
        out
    }

    pub fn decompress(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        let (sum, body) = payload
            .split_first()
            .ok_or_else(|| CodecError::Corrupt("empty payload".into()))?;
        let pixels: Vec<u8> = body.iter().map(|b| b ^ MOCK_KEY).collect();
        if checksum(&pixels) != *sum {
            return Err(CodecError::Corrupt("checksum mismatch".into()));
        }
        Ok(pixels)
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

impl FrameCodec for MockCodec {
    fn configure(&mut self, streams: &[StreamInfo]) {
        self.configured
            .push(streams.iter().map(|s| s.stream).collect());
    }

    fn decode(
        &mut self,
        _frame: &ImageDescriptor,
        info: &StreamInfo,
        payload: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        let pixels = Self::decompress(payload)?;
        if let Some(bpp) = info.profile.format.bytes_per_pixel() {
            let expected = info.profile.area() * bpp;
            if pixels.len() != expected {
                return Err(CodecError::OutputSize {
                    expected,
                    actual: pixels.len(),
                });
            }
        }
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::read_headers;
    use std::io::Cursor;

    #[test]
    fn test_built_headers_parse() {
        let depth = image_stream(StreamId::Depth, 8, 4);
        let bytes = RecordingBuilder::new()
            .capture_mode(CaptureMode::Synced)
            .stream(depth)
            .software(Version::new(2, 0, 0), Version::new(1, 9, 0))
            .image(StreamId::Depth, 0, 0)
            .build();

        let headers = read_headers(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(headers.header.capture_mode, CaptureMode::Synced);
        assert_eq!(headers.streams[&StreamId::Depth], depth);
        assert_eq!(headers.software.sdk, Version::new(2, 0, 0));
    }

    #[test]
    fn test_mock_codec_detects_corruption() {
        let pixels = vec![1, 2, 3, 250];
        let mut packed = MockCodec::compress(&pixels);
        assert_eq!(MockCodec::decompress(&packed).unwrap(), pixels);

        packed[2] ^= 0xFF;
        assert!(MockCodec::decompress(&packed).is_err());
        assert!(MockCodec::decompress(&[]).is_err());
    }
}
