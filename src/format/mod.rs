//! On-disk recording format
//!
//! A recording is a fixed 32-byte file header followed by a sequence of
//! length-prefixed chunks. Header chunks (stream descriptions, software
//! versions) sit between the file header and the first frame offset; sample
//! records follow, each starting with a sample-info chunk and ending with a
//! sample-data chunk. All integers are little-endian.
//!
//! This module only knows how to *read* the format. Producing recordings is
//! the recorder's job; the `mock-recording` feature carries a minimal writer
//! for tests.

pub mod header;

pub use header::{read_headers, FileHeader, RecordingHeaders, SoftwareInfo};

use crate::error::{ReplayError, Result};
use std::io::{self, Read, Seek, SeekFrom};

/// Size of a chunk header (`id` + `size`)
pub const CHUNK_HEADER_SIZE: u64 = 8;

/// Size of the fixed file header
pub const FILE_HEADER_SIZE: u64 = 32;

/// Size of a stream-info chunk payload
pub const STREAM_INFO_SIZE: u32 = 28;

/// Size of a software-info chunk payload
pub const SOFTWARE_INFO_SIZE: u32 = 24;

/// Size of a sample-info chunk payload
pub const SAMPLE_INFO_SIZE: u32 = 12;

/// Size of a frame-info chunk payload
pub const FRAME_INFO_SIZE: u32 = 20;

/// Size of a motion sample-data payload
pub const MOTION_DATA_SIZE: u32 = 28;

/// Size of a time-sync sample-data payload
pub const TIME_SYNC_DATA_SIZE: u32 = 16;

/// Number of image planes with a recorded pitch in `RSL2` files
pub const PITCH_TABLE_PLANES: u64 = 4;

/// Magic of recordings made by the Windows SDK
pub const MAGIC_RSSDK: [u8; 4] = *b"RSCF";

/// Magic of first-generation Linux recordings
pub const MAGIC_LINUX_V1: [u8; 4] = *b"RSL1";

/// Magic of second-generation Linux recordings (adds a pitch table per frame)
pub const MAGIC_LINUX_V2: [u8; 4] = *b"RSL2";

/// Chunk identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkId {
    DeviceInfo,
    StreamInfo,
    SoftwareInfo,
    SampleInfo,
    FrameInfo,
    ImageMetadata,
    SampleData,
    /// Anything else; skipped using the declared size
    Unknown(u32),
}

impl ChunkId {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ChunkId::DeviceInfo,
            2 => ChunkId::StreamInfo,
            3 => ChunkId::SoftwareInfo,
            10 => ChunkId::SampleInfo,
            11 => ChunkId::FrameInfo,
            12 => ChunkId::ImageMetadata,
            13 => ChunkId::SampleData,
            other => ChunkId::Unknown(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            ChunkId::DeviceInfo => 1,
            ChunkId::StreamInfo => 2,
            ChunkId::SoftwareInfo => 3,
            ChunkId::SampleInfo => 10,
            ChunkId::FrameInfo => 11,
            ChunkId::ImageMetadata => 12,
            ChunkId::SampleData => 13,
            ChunkId::Unknown(raw) => raw,
        }
    }
}

/// A chunk header together with where it was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: ChunkId,
    pub size: u32,
    /// Offset of the chunk header
    pub offset: u64,
}

impl Chunk {
    /// Offset of the first payload byte
    pub fn payload_offset(&self) -> u64 {
        self.offset + CHUNK_HEADER_SIZE
    }

    /// Offset just past the payload
    pub fn end(&self) -> u64 {
        self.payload_offset() + self.size as u64
    }
}

/// Byte-addressable read primitive the engine consumes
pub trait ByteSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ByteSource for T {}

/// Length of a source, restoring the current position
pub fn source_len<R: Seek + ?Sized>(reader: &mut R) -> io::Result<u64> {
    let pos = reader.stream_position()?;
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(pos))?;
    Ok(len)
}

/// Outcome of trying to read a chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRead {
    Chunk(Chunk),
    /// Clean end of file on a chunk boundary
    EndOfFile,
}

/// Read a chunk header at `offset`, validating that its payload fits in the file.
///
/// A partial header or a payload running past `file_len` is a format fault.
pub fn read_chunk_header<R: Read + Seek + ?Sized>(
    reader: &mut R,
    offset: u64,
    file_len: u64,
) -> Result<ChunkRead> {
    if offset >= file_len {
        return Ok(ChunkRead::EndOfFile);
    }
    if offset + CHUNK_HEADER_SIZE > file_len {
        return Err(ReplayError::format(offset, "truncated chunk header"));
    }

    reader.seek(SeekFrom::Start(offset))?;
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;

    let id = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let chunk = Chunk {
        id: ChunkId::from_raw(id),
        size,
        offset,
    };
    if chunk.end() > file_len {
        return Err(ReplayError::format(
            offset,
            format!(
                "chunk {} declares {} bytes, only {} remain",
                id,
                size,
                file_len - chunk.payload_offset()
            ),
        ));
    }

    Ok(ChunkRead::Chunk(chunk))
}

/// Read a chunk payload, rejecting chunks shorter than `min_size`
pub fn read_payload<R: Read + Seek + ?Sized>(
    reader: &mut R,
    chunk: &Chunk,
    min_size: u32,
) -> Result<Vec<u8>> {
    if chunk.size < min_size {
        return Err(ReplayError::format(
            chunk.offset,
            format!(
                "{:?} chunk is {} bytes, expected at least {}",
                chunk.id, chunk.size, min_size
            ),
        ));
    }
    reader.seek(SeekFrom::Start(chunk.payload_offset()))?;
    let mut data = vec![0u8; chunk.size as usize];
    reader.read_exact(&mut data)?;
    Ok(data)
}

/// Little-endian field cursor over a chunk payload
pub(crate) struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    pub(crate) fn u32(&mut self) -> Option<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self) -> Option<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    pub(crate) fn f32(&mut self) -> Option<f32> {
        self.take::<4>().map(f32::from_le_bytes)
    }

    pub(crate) fn f64(&mut self) -> Option<f64> {
        self.take::<8>().map(f64::from_le_bytes)
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(bytes)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk_bytes(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_chunk_id_raw() {
        for raw in [1, 2, 3, 10, 11, 12, 13, 77] {
            assert_eq!(ChunkId::from_raw(raw).as_raw(), raw);
        }
        assert_eq!(ChunkId::from_raw(77), ChunkId::Unknown(77));
    }

    #[test]
    fn test_read_chunk_header() {
        let bytes = chunk_bytes(13, &[1, 2, 3, 4]);
        let len = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);

        let read = read_chunk_header(&mut cursor, 0, len).unwrap();
        let ChunkRead::Chunk(chunk) = read else {
            panic!("expected a chunk");
        };
        assert_eq!(chunk.id, ChunkId::SampleData);
        assert_eq!(chunk.size, 4);
        assert_eq!(chunk.end(), len);

        let payload = read_payload(&mut cursor, &chunk, 4).unwrap();
        assert_eq!(payload, vec![1, 2, 3, 4]);

        assert_eq!(
            read_chunk_header(&mut cursor, len, len).unwrap(),
            ChunkRead::EndOfFile
        );
    }

    #[test]
    fn test_truncated_chunk_header_is_format_error() {
        let mut bytes = chunk_bytes(13, &[]);
        bytes.truncate(5);
        let len = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);
        let err = read_chunk_header(&mut cursor, 0, len).unwrap_err();
        assert!(matches!(err, ReplayError::Format { offset: 0, .. }));
    }

    #[test]
    fn test_oversized_chunk_is_format_error() {
        let mut bytes = chunk_bytes(13, &[0; 4]);
        bytes[4] = 200;
        let len = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);
        let err = read_chunk_header(&mut cursor, 0, len).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_short_payload_rejected() {
        let bytes = chunk_bytes(10, &[0; 4]);
        let len = bytes.len() as u64;
        let mut cursor = Cursor::new(bytes);
        let ChunkRead::Chunk(chunk) = read_chunk_header(&mut cursor, 0, len).unwrap() else {
            panic!("expected a chunk");
        };
        assert!(read_payload(&mut cursor, &chunk, SAMPLE_INFO_SIZE).is_err());
    }

    #[test]
    fn test_field_reader() {
        let mut data = Vec::new();
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(&9u64.to_le_bytes());
        data.extend_from_slice(&1.5f64.to_le_bytes());
        let mut fields = FieldReader::new(&data);
        assert_eq!(fields.u32(), Some(7));
        assert_eq!(fields.u64(), Some(9));
        assert_eq!(fields.f64(), Some(1.5));
        assert_eq!(fields.remaining(), 0);
        assert_eq!(fields.u32(), None);
    }
}
