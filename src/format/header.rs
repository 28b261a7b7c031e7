//! File header and header chunk parsing

use super::{
    read_chunk_header, read_payload, source_len, ChunkId, ChunkRead, FieldReader,
    FILE_HEADER_SIZE, MAGIC_LINUX_V1, MAGIC_LINUX_V2, MAGIC_RSSDK, PITCH_TABLE_PLANES,
    SOFTWARE_INFO_SIZE, STREAM_INFO_SIZE,
};
use crate::error::{ReplayError, Result};
use crate::types::{
    CaptureMode, CompressionType, FileFormat, PixelFormat, StreamId, StreamInfo, StreamProfile,
    Version,
};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};

/// Fixed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub capture_mode: CaptureMode,
    pub stream_count: u32,
    pub first_frame_offset: u64,
}

impl FileHeader {
    /// Format family implied by the magic
    pub fn format(&self) -> FileFormat {
        if self.magic == MAGIC_RSSDK {
            FileFormat::RssdkFormat
        } else {
            FileFormat::LinuxFormat
        }
    }

    /// Bytes of per-plane pitches preceding every pixel payload
    pub fn pitch_table_len(&self) -> u64 {
        if self.magic == MAGIC_LINUX_V2 {
            PITCH_TABLE_PLANES * 4
        } else {
            0
        }
    }

    fn parse(bytes: &[u8; FILE_HEADER_SIZE as usize]) -> Result<Self> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if ![MAGIC_RSSDK, MAGIC_LINUX_V1, MAGIC_LINUX_V2].contains(&magic) {
            return Err(ReplayError::format(
                0,
                format!("unrecognized file magic {:02X?}", magic),
            ));
        }

        let mut fields = FieldReader::new(&bytes[4..]);
        let (Some(version), Some(mode), Some(stream_count), Some(first_frame_offset)) =
            (fields.u32(), fields.u32(), fields.u32(), fields.u64())
        else {
            return Err(ReplayError::format(0, "short file header"));
        };

        Ok(Self {
            magic,
            version,
            capture_mode: CaptureMode::from_raw(mode),
            stream_count,
            first_frame_offset,
        })
    }
}

/// Versions of the software that produced the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoftwareInfo {
    pub sdk: Version,
    pub librealsense: Version,
}

/// Everything known about a recording before the first sample
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingHeaders {
    pub header: FileHeader,
    pub streams: BTreeMap<StreamId, StreamInfo>,
    pub software: SoftwareInfo,
    pub file_len: u64,
}

/// Read the file header and all header chunks up to the first frame offset
pub fn read_headers<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<RecordingHeaders> {
    let file_len = source_len(reader)?;
    if file_len < FILE_HEADER_SIZE {
        return Err(ReplayError::format(0, "file shorter than its header"));
    }

    reader.seek(SeekFrom::Start(0))?;
    let mut raw = [0u8; FILE_HEADER_SIZE as usize];
    reader.read_exact(&mut raw)?;
    let header = FileHeader::parse(&raw)?;

    if header.first_frame_offset < FILE_HEADER_SIZE || header.first_frame_offset > file_len {
        return Err(ReplayError::format(
            16,
            format!(
                "first frame offset {} outside file of {} bytes",
                header.first_frame_offset, file_len
            ),
        ));
    }

    let mut streams = BTreeMap::new();
    let mut software = SoftwareInfo::default();
    let mut offset = FILE_HEADER_SIZE;

    while offset < header.first_frame_offset {
        let chunk = match read_chunk_header(reader, offset, header.first_frame_offset)? {
            ChunkRead::Chunk(chunk) => chunk,
            ChunkRead::EndOfFile => break,
        };

        match chunk.id {
            ChunkId::StreamInfo => {
                let info = parse_stream_info(&read_payload(reader, &chunk, STREAM_INFO_SIZE)?)
                    .ok_or_else(|| ReplayError::format(chunk.offset, "unknown stream id"))?;
                tracing::debug!(
                    "Stream {}: {}x{} @ {} fps, {} compression, {} frames declared",
                    info.stream,
                    info.profile.width,
                    info.profile.height,
                    info.profile.frame_rate,
                    info.compression,
                    info.frame_count
                );
                streams.insert(info.stream, info);
            }
            ChunkId::SoftwareInfo => {
                software = parse_software_info(&read_payload(reader, &chunk, SOFTWARE_INFO_SIZE)?);
            }
            _ => {}
        }

        offset = chunk.end();
    }

    if streams.len() as u32 != header.stream_count {
        tracing::warn!(
            "Header declares {} streams but {} stream descriptions were found",
            header.stream_count,
            streams.len()
        );
    }

    Ok(RecordingHeaders {
        header,
        streams,
        software,
        file_len,
    })
}

fn parse_stream_info(payload: &[u8]) -> Option<StreamInfo> {
    let mut fields = FieldReader::new(payload);
    let stream = StreamId::from_raw(fields.u32()?)?;
    let width = fields.u32()?;
    let height = fields.u32()?;
    let format = PixelFormat::from_raw(fields.u32()?);
    let frame_rate = fields.u32()?;
    let compression = CompressionType::from_raw(fields.u32()?);
    let frame_count = fields.u32()?;

    Some(StreamInfo {
        stream,
        profile: StreamProfile {
            width,
            height,
            format,
            frame_rate,
        },
        compression,
        frame_count,
    })
}

fn parse_software_info(payload: &[u8]) -> SoftwareInfo {
    let mut fields = FieldReader::new(payload);
    let mut version = || {
        Version::new(
            fields.u32().unwrap_or(0),
            fields.u32().unwrap_or(0),
            fields.u32().unwrap_or(0),
        )
    };
    let sdk = version();
    let librealsense = version();
    SoftwareInfo { sdk, librealsense }
}
