//! Image payload materialization
//!
//! The decoder owns the second read handle on the recording. Given an image
//! descriptor it walks the record's remaining chunks, collects metadata,
//! skips the pitch table and either copies the raw pixels or hands the
//! compressed payload to the registered [`FrameCodec`].
//!
//! Compressed payloads are staged in a scratch buffer sized for the worst
//! case of the active stream set (largest frame area, four bytes per pixel).
//! It is built on first use and discarded whenever the active set changes.

use super::codec::FrameCodec;
use crate::error::{ReplayError, Result};
use crate::format::{read_chunk_header, ByteSource, Chunk, ChunkId, ChunkRead, FieldReader};
use crate::types::{CompressionType, FrameSample, ImageDescriptor, StreamInfo};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};

const WORST_CASE_BYTES_PER_PIXEL: usize = 4;

/// Per-active-set decoder state
struct DecoderState {
    scratch: Vec<u8>,
}

/// Reads and decodes image samples
pub struct Decoder {
    reader: Box<dyn ByteSource>,
    file_len: u64,
    pitch_table_len: u64,
    codec: Option<Box<dyn FrameCodec>>,
    state: Option<DecoderState>,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("file_len", &self.file_len)
            .field("pitch_table_len", &self.pitch_table_len)
            .field("has_codec", &self.codec.is_some())
            .field("initialized", &self.state.is_some())
            .finish()
    }
}

impl Decoder {
    pub fn new(reader: Box<dyn ByteSource>, file_len: u64, pitch_table_len: u64) -> Self {
        Self {
            reader,
            file_len,
            pitch_table_len,
            codec: None,
            state: None,
        }
    }

    /// Register the codec used for compressed streams
    pub fn set_codec(&mut self, codec: Box<dyn FrameCodec>) {
        self.codec = Some(codec);
        self.invalidate();
    }

    pub fn has_codec(&self) -> bool {
        self.codec.is_some()
    }

    /// Drop cached state; it is rebuilt on the next decode
    pub fn invalidate(&mut self) {
        self.state = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Move the read handle back to the start of the file
    pub fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn initialize(&mut self, active: &[StreamInfo]) {
        let compressed = active.iter().any(|s| s.compression.is_compressed());
        let scratch_len = if compressed {
            active
                .iter()
                .map(|s| s.profile.area())
                .max()
                .unwrap_or(0)
                * WORST_CASE_BYTES_PER_PIXEL
        } else {
            0
        };

        if let Some(codec) = self.codec.as_mut() {
            codec.configure(active);
        }

        tracing::debug!(
            "Decoder initialized for {} streams, scratch {} bytes",
            active.len(),
            scratch_len
        );
        self.state = Some(DecoderState {
            scratch: vec![0; scratch_len],
        });
    }

    /// Materialize one image sample.
    ///
    /// `Ok(None)` means this frame could not be produced (read failure,
    /// corrupt or oversized payload) and should be skipped. Errors are
    /// configuration faults that make further playback pointless.
    pub fn decode(
        &mut self,
        frame: &ImageDescriptor,
        info: &StreamInfo,
        active: &[StreamInfo],
    ) -> Result<Option<FrameSample>> {
        if self.state.is_none() {
            self.initialize(active);
        }

        let mut offset = frame.offset;
        let mut metadata = BTreeMap::new();

        loop {
            let chunk = match read_chunk_header(&mut *self.reader, offset, self.file_len) {
                Ok(ChunkRead::Chunk(chunk)) => chunk,
                Ok(ChunkRead::EndOfFile) => {
                    tracing::warn!(
                        "Frame {} of {} ends without sample data",
                        frame.frame_number,
                        frame.stream
                    );
                    return Ok(None);
                }
                Err(ReplayError::Io(e)) => {
                    tracing::warn!("Failed to read frame {}: {}", frame.frame_number, e);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            offset = chunk.end();

            match chunk.id {
                ChunkId::ImageMetadata => {
                    if chunk.size == 0 {
                        tracing::error!("Empty metadata chunk at offset {}", chunk.offset);
                        continue;
                    }
                    let Some(payload) = self.read_exact_at(chunk.payload_offset(), chunk.size as usize)
                    else {
                        return Ok(None);
                    };
                    parse_metadata(&payload, &mut metadata);
                }
                ChunkId::SampleData => {
                    return self.read_pixels(frame, info, &chunk, metadata);
                }
                _ => {
                    if chunk.size == 0 {
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn read_pixels(
        &mut self,
        frame: &ImageDescriptor,
        info: &StreamInfo,
        chunk: &Chunk,
        metadata: BTreeMap<u32, Vec<u8>>,
    ) -> Result<Option<FrameSample>> {
        let pitch = self.pitch_table_len.min(chunk.size as u64);
        let payload_offset = chunk.payload_offset() + pitch;
        let payload_len = (chunk.size as u64 - pitch) as usize;

        let data = match frame.compression {
            CompressionType::None => match self.read_exact_at(payload_offset, payload_len) {
                Some(data) => data,
                None => return Ok(None),
            },
            CompressionType::Lz4 | CompressionType::H264 => {
                let Some(codec) = self.codec.as_mut() else {
                    return Err(ReplayError::CodecUnavailable {
                        stream: frame.stream,
                        compression: frame.compression.to_string(),
                    });
                };
                let Some(state) = self.state.as_mut() else {
                    return Ok(None);
                };

                // Frames of streams outside the active set (seek anchors) need room too
                let worst_case = info.profile.area() * WORST_CASE_BYTES_PER_PIXEL;
                if state.scratch.len() < worst_case {
                    tracing::debug!(
                        "Growing decoder scratch from {} to {} bytes for {}",
                        state.scratch.len(),
                        worst_case,
                        info.stream
                    );
                    state.scratch.resize(worst_case, 0);
                }

                if payload_len > state.scratch.len() {
                    tracing::warn!(
                        "Compressed frame {} of {} is {} bytes, larger than the {} byte worst case",
                        frame.frame_number,
                        frame.stream,
                        payload_len,
                        state.scratch.len()
                    );
                    return Ok(None);
                }

                let staged = &mut state.scratch[..payload_len];
                let read = self
                    .reader
                    .seek(SeekFrom::Start(payload_offset))
                    .and_then(|_| self.reader.read_exact(staged));
                if let Err(e) = read {
                    tracing::warn!("Failed to read frame {}: {}", frame.frame_number, e);
                    return Ok(None);
                }

                match codec.decode(frame, info, staged) {
                    Ok(pixels) => pixels,
                    Err(e) => {
                        tracing::warn!(
                            "Skipping frame {} of {}: {}",
                            frame.frame_number,
                            frame.stream,
                            e
                        );
                        return Ok(None);
                    }
                }
            }
            CompressionType::Unrecognized(raw) => {
                return Err(ReplayError::UnsupportedCompression(raw));
            }
        };

        Ok(Some(FrameSample {
            descriptor: *frame,
            metadata,
            data,
        }))
    }

    fn read_exact_at(&mut self, offset: u64, len: usize) -> Option<Vec<u8>> {
        let mut data = vec![0u8; len];
        let read = self
            .reader
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.reader.read_exact(&mut data));
        match read {
            Ok(()) => Some(data),
            Err(e) => {
                tracing::warn!("Read of {} bytes at offset {} failed: {}", len, offset, e);
                None
            }
        }
    }
}

fn parse_metadata(payload: &[u8], out: &mut BTreeMap<u32, Vec<u8>>) {
    let mut fields = FieldReader::new(payload);
    while fields.remaining() > 0 {
        let entry = (|| {
            let id = fields.u32()?;
            let len = fields.u32()? as usize;
            Some((id, fields.bytes(len)?.to_vec()))
        })();
        match entry {
            Some((id, bytes)) => {
                out.insert(id, bytes);
            }
            None => {
                tracing::warn!("Truncated image metadata entry");
                break;
            }
        }
    }
}
