//! Core data types for capture-replay
//!
//! This module contains the fundamental data structures shared by the
//! indexer, decoder and playback controller.
//!
//! # Main Types
//!
//! - [`StreamId`] / [`StreamInfo`] - Declared sensor streams and their profiles
//! - [`SampleDescriptor`] - Payload-free record locating one stored sample
//! - [`Sample`] - A fully materialized sample handed to the delivery callback
//! - [`FileInfo`] - Summary of the recording header
//! - [`PlaybackStats`] - Delivery and frame-drop counters
//!
//! # Timestamps
//!
//! Capture times are recorded in microseconds and are the basis for pacing
//! and cross-stream alignment. Device timestamps (milliseconds, `f64`) are
//! carried through untouched for consumers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical sensor channel
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StreamId {
    /// Depth camera
    Depth,
    /// Color camera
    Color,
    /// First infrared camera
    Infrared,
    /// Second infrared camera
    Infrared2,
    /// Wide-angle tracking camera
    Fisheye,
}

impl StreamId {
    /// All stream identifiers, in on-disk numbering order
    pub const ALL: [StreamId; 5] = [
        StreamId::Depth,
        StreamId::Color,
        StreamId::Infrared,
        StreamId::Infrared2,
        StreamId::Fisheye,
    ];

    /// Decode the on-disk stream number
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// On-disk stream number
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Display name for the stream
    pub fn display_name(&self) -> &'static str {
        match self {
            StreamId::Depth => "depth",
            StreamId::Color => "color",
            StreamId::Infrared => "infrared",
            StreamId::Infrared2 => "infrared2",
            StreamId::Fisheye => "fisheye",
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Pixel layout of an image stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PixelFormat {
    #[default]
    Any,
    Z16,
    Disparity16,
    Xyz32f,
    Yuyv,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Y8,
    Y16,
    Raw10,
    Raw16,
    Raw8,
    /// Format number this crate does not know about.
    ///
    /// Only ever holds numbers past the known range; build values with
    /// [`PixelFormat::from_raw`] so a known number maps to its variant.
    Other(u32),
}

impl PixelFormat {
    const KNOWN: [PixelFormat; 14] = [
        PixelFormat::Any,
        PixelFormat::Z16,
        PixelFormat::Disparity16,
        PixelFormat::Xyz32f,
        PixelFormat::Yuyv,
        PixelFormat::Rgb8,
        PixelFormat::Bgr8,
        PixelFormat::Rgba8,
        PixelFormat::Bgra8,
        PixelFormat::Y8,
        PixelFormat::Y16,
        PixelFormat::Raw10,
        PixelFormat::Raw16,
        PixelFormat::Raw8,
    ];

    /// Decode the on-disk format number
    pub fn from_raw(raw: u32) -> Self {
        Self::KNOWN
            .get(raw as usize)
            .copied()
            .unwrap_or(PixelFormat::Other(raw))
    }

    /// On-disk format number; `from_raw(f.as_raw()) == f` for every value `from_raw` produces
    pub fn as_raw(self) -> u32 {
        match self {
            PixelFormat::Other(raw) => raw,
            known => Self::KNOWN.iter().position(|f| *f == known).unwrap_or(0) as u32,
        }
    }

    /// Bytes per pixel for packed formats
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Y8 | PixelFormat::Raw8 => Some(1),
            PixelFormat::Z16
            | PixelFormat::Disparity16
            | PixelFormat::Yuyv
            | PixelFormat::Y16
            | PixelFormat::Raw16 => Some(2),
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => Some(3),
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => Some(4),
            PixelFormat::Xyz32f => Some(12),
            PixelFormat::Any | PixelFormat::Raw10 | PixelFormat::Other(_) => None,
        }
    }
}

/// Compression applied to a stream's pixel payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CompressionType {
    /// Raw pixels
    #[default]
    None,
    /// LZ4 block compression
    Lz4,
    /// H.264 elementary stream
    H264,
    /// Compression number this crate cannot dispatch
    Unrecognized(u32),
}

impl CompressionType {
    /// Decode the on-disk compression number
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => CompressionType::None,
            1 => CompressionType::Lz4,
            2 => CompressionType::H264,
            other => CompressionType::Unrecognized(other),
        }
    }

    /// On-disk compression number
    pub fn as_raw(self) -> u32 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lz4 => 1,
            CompressionType::H264 => 2,
            CompressionType::Unrecognized(raw) => raw,
        }
    }

    /// Whether payloads must go through a codec
    pub fn is_compressed(&self) -> bool {
        !matches!(self, CompressionType::None)
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionType::None => f.write_str("none"),
            CompressionType::Lz4 => f.write_str("lz4"),
            CompressionType::H264 => f.write_str("h264"),
            CompressionType::Unrecognized(raw) => write!(f, "unrecognized({})", raw),
        }
    }
}

/// Whether the streams were captured with a shared trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CaptureMode {
    /// Header does not say; detected at init
    #[default]
    Unknown,
    /// All streams share capture times
    Synced,
    /// Streams are independently clocked
    Async,
}

impl CaptureMode {
    /// Decode the on-disk capture mode
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => CaptureMode::Synced,
            2 => CaptureMode::Async,
            _ => CaptureMode::Unknown,
        }
    }

    /// On-disk capture mode
    pub fn as_raw(self) -> u32 {
        match self {
            CaptureMode::Unknown => 0,
            CaptureMode::Synced => 1,
            CaptureMode::Async => 2,
        }
    }
}

/// Resolution, pixel format and rate of an image stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreamProfile {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate: u32,
}

impl StreamProfile {
    /// Pixel count of one frame
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Static descriptor of one recorded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream: StreamId,
    pub profile: StreamProfile,
    pub compression: CompressionType,
    /// Declared number of frames (0 when the recorder did not know)
    pub frame_count: u32,
}

/// Producer software version triplet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Recording format family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    /// Recorded by the Windows SDK (`RSCF`)
    RssdkFormat,
    /// Recorded by the Linux SDK (`RSL1` / `RSL2`)
    LinuxFormat,
}

/// Summary of a recording, as reported by `query_file_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub format: FileFormat,
    pub version: u32,
    pub capture_mode: CaptureMode,
    pub sdk_version: String,
    pub librealsense_version: String,
}

/// Kind of a stored sample, as numbered on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Image,
    Motion,
    TimeSync,
    DebugEvent,
}

impl SampleKind {
    /// Decode the on-disk sample type
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(SampleKind::Image),
            2 => Some(SampleKind::Motion),
            3 => Some(SampleKind::TimeSync),
            4 => Some(SampleKind::DebugEvent),
            _ => None,
        }
    }

    /// On-disk sample type
    pub fn as_raw(self) -> u32 {
        match self {
            SampleKind::Image => 1,
            SampleKind::Motion => 2,
            SampleKind::TimeSync => 3,
            SampleKind::DebugEvent => 4,
        }
    }
}

/// Locates one image sample's chunks in the file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageDescriptor {
    /// Capture time in microseconds
    pub capture_time: u64,
    /// Offset of the first chunk after the frame info
    pub offset: u64,
    pub stream: StreamId,
    pub frame_number: u32,
    /// Device timestamp in milliseconds
    pub time_stamp: f64,
    pub compression: CompressionType,
}

/// Inertial sensor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionType {
    Accel,
    Gyro,
    Other(u32),
}

impl MotionType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => MotionType::Accel,
            2 => MotionType::Gyro,
            other => MotionType::Other(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            MotionType::Accel => 1,
            MotionType::Gyro => 2,
            MotionType::Other(raw) => raw,
        }
    }
}

/// One inertial sample; small enough to live in the index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub capture_time: u64,
    pub offset: u64,
    pub motion_type: MotionType,
    /// Device timestamp in milliseconds
    pub timestamp: f64,
    pub frame_number: u32,
    pub data: [f32; 3],
}

/// Timing marker correlating a device clock with a frame number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSyncSample {
    pub capture_time: u64,
    pub offset: u64,
    pub source: u32,
    pub timestamp: f64,
    pub frame_number: u32,
}

/// Recorder diagnostic record; indexed but never delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugEventDescriptor {
    pub capture_time: u64,
    pub offset: u64,
}

/// Payload-free record of one stored sample, in file order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleDescriptor {
    Image(ImageDescriptor),
    Motion(MotionSample),
    TimeSync(TimeSyncSample),
    DebugEvent(DebugEventDescriptor),
}

impl SampleDescriptor {
    pub fn capture_time(&self) -> u64 {
        match self {
            SampleDescriptor::Image(d) => d.capture_time,
            SampleDescriptor::Motion(m) => m.capture_time,
            SampleDescriptor::TimeSync(t) => t.capture_time,
            SampleDescriptor::DebugEvent(e) => e.capture_time,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            SampleDescriptor::Image(d) => d.offset,
            SampleDescriptor::Motion(m) => m.offset,
            SampleDescriptor::TimeSync(t) => t.offset,
            SampleDescriptor::DebugEvent(e) => e.offset,
        }
    }

    pub fn kind(&self) -> SampleKind {
        match self {
            SampleDescriptor::Image(_) => SampleKind::Image,
            SampleDescriptor::Motion(_) => SampleKind::Motion,
            SampleDescriptor::TimeSync(_) => SampleKind::TimeSync,
            SampleDescriptor::DebugEvent(_) => SampleKind::DebugEvent,
        }
    }

    pub fn as_image(&self) -> Option<&ImageDescriptor> {
        match self {
            SampleDescriptor::Image(d) => Some(d),
            _ => None,
        }
    }
}

/// A decoded image frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub descriptor: ImageDescriptor,
    /// Metadata entries keyed by metadata id
    pub metadata: BTreeMap<u32, Vec<u8>>,
    /// Pixel data, uncompressed
    pub data: Vec<u8>,
}

impl FrameSample {
    pub fn stream(&self) -> StreamId {
        self.descriptor.stream
    }

    pub fn capture_time(&self) -> u64 {
        self.descriptor.capture_time
    }

    pub fn frame_number(&self) -> u32 {
        self.descriptor.frame_number
    }
}

/// A sample ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Frame(FrameSample),
    Motion(MotionSample),
    TimeSync(TimeSyncSample),
}

impl Sample {
    pub fn capture_time(&self) -> u64 {
        match self {
            Sample::Frame(f) => f.capture_time(),
            Sample::Motion(m) => m.capture_time,
            Sample::TimeSync(t) => t.capture_time,
        }
    }

    /// Stream of an image sample
    pub fn stream(&self) -> Option<StreamId> {
        match self {
            Sample::Frame(f) => Some(f.stream()),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&FrameSample> {
        match self {
            Sample::Frame(f) => Some(f),
            _ => None,
        }
    }
}

/// Delivery statistics for one engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackStats {
    /// Image frames handed to the sample callback
    pub delivered_frames: u64,
    /// Motion samples handed to the sample callback
    pub delivered_motion: u64,
    /// Time-sync samples handed to the sample callback
    pub delivered_time_sync: u64,
    /// Frames skipped because their payload could not be decoded
    pub skipped_frames: u64,
    /// Sum of all per-stream frame drops
    pub total_frame_drops: u64,
    /// Frame-number gaps observed per stream
    pub frame_drops: BTreeMap<StreamId, u64>,
}
