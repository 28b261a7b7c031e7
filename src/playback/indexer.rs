//! Incremental sample indexer
//!
//! The indexer walks the recording with its own read handle, one sample
//! record at a time, and appends a [`SampleDescriptor`] per record. Image
//! descriptors are additionally listed in a per-stream index so seeks can
//! address "frame N of stream S" directly.
//!
//! Indexing is lazy: the controller asks for a batch whenever playback or a
//! seek runs past what is known. The scan position only moves forward, and
//! descriptors are never modified once appended, so positions handed out
//! earlier stay valid.

use crate::error::{ReplayError, Result};
use crate::format::{
    read_chunk_header, read_payload, ByteSource, ChunkId, ChunkRead, FieldReader,
    FRAME_INFO_SIZE, MOTION_DATA_SIZE, SAMPLE_INFO_SIZE, TIME_SYNC_DATA_SIZE,
};
use crate::types::{
    CaptureMode, CompressionType, DebugEventDescriptor, ImageDescriptor, MotionSample,
    MotionType, SampleDescriptor, SampleKind, StreamId, TimeSyncSample,
};
use std::collections::BTreeMap;

/// Number of frames per stream inspected before deciding the capture mode
pub const CAPTURE_MODE_VALIDATION_FRAMES: usize = 10;

/// Record being assembled from its chunks
struct PendingRecord {
    kind: SampleKind,
    capture_time: u64,
    offset: u64,
    frame: Option<FrameFields>,
    data_offset: Option<u64>,
}

#[derive(Clone, Copy)]
struct FrameFields {
    stream: StreamId,
    frame_number: u32,
    compression: CompressionType,
    time_stamp: f64,
}

/// Builds the descriptor list and per-stream image indices
pub struct Indexer {
    reader: Box<dyn ByteSource>,
    file_len: u64,
    /// Offset of the next unread record
    position: u64,
    complete: bool,
    descriptors: Vec<SampleDescriptor>,
    image_indices: BTreeMap<StreamId, Vec<usize>>,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("position", &self.position)
            .field("file_len", &self.file_len)
            .field("complete", &self.complete)
            .field("descriptors", &self.descriptors.len())
            .finish()
    }
}

impl Indexer {
    /// Create an indexer that starts scanning at `first_frame_offset`
    pub fn new(reader: Box<dyn ByteSource>, first_frame_offset: u64, file_len: u64) -> Self {
        Self {
            reader,
            file_len,
            position: first_frame_offset,
            complete: false,
            descriptors: Vec::new(),
            image_indices: BTreeMap::new(),
        }
    }

    /// Whether the scan reached the end of the file
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Offset up to which the file has been scanned
    pub fn scanned_offset(&self) -> u64 {
        self.position
    }

    /// Number of descriptors discovered so far
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&SampleDescriptor> {
        self.descriptors.get(position)
    }

    pub fn descriptors(&self) -> &[SampleDescriptor] {
        &self.descriptors
    }

    /// Descriptor positions of one stream's image samples, in file order
    pub fn image_indices(&self, stream: StreamId) -> &[usize] {
        self.image_indices
            .get(&stream)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Image samples of `stream` indexed so far
    pub fn frame_count(&self, stream: StreamId) -> usize {
        self.image_indices(stream).len()
    }

    /// Parse up to `batch_size` more sample records.
    ///
    /// Returns the number of descriptors appended. Once the end of file is
    /// reached the indexer is complete and further calls return 0.
    pub fn index_next_samples(&mut self, batch_size: usize) -> Result<usize> {
        if self.complete {
            return Ok(0);
        }

        let mut added = 0;
        while added < batch_size.max(1) {
            match self.read_record()? {
                Some(descriptor) => {
                    if let SampleDescriptor::Image(image) = &descriptor {
                        self.image_indices
                            .entry(image.stream)
                            .or_default()
                            .push(self.descriptors.len());
                    }
                    self.descriptors.push(descriptor);
                    added += 1;
                }
                None => {
                    self.complete = true;
                    tracing::debug!(
                        "Indexing complete: {} samples, {} bytes",
                        self.descriptors.len(),
                        self.position
                    );
                    break;
                }
            }
        }

        Ok(added)
    }

    /// Index the remainder of the file
    pub fn index_to_end(&mut self, batch_size: usize) -> Result<()> {
        while !self.complete {
            self.index_next_samples(batch_size)?;
        }
        Ok(())
    }

    /// Decide whether the streams were captured in lock-step.
    ///
    /// A single stream is trivially synced. Otherwise a few frames of every
    /// stream are indexed and the recording counts as synced as soon as the
    /// latest capture time of every stream is identical.
    pub fn detect_capture_mode(
        &mut self,
        streams: &[StreamId],
        batch_size: usize,
    ) -> Result<CaptureMode> {
        if streams.len() <= 1 {
            return Ok(CaptureMode::Synced);
        }

        while !self.complete {
            self.index_next_samples(batch_size)?;
            let enough = streams
                .iter()
                .all(|s| self.frame_count(*s) >= CAPTURE_MODE_VALIDATION_FRAMES);
            if enough {
                break;
            }
        }

        let mut latest: BTreeMap<StreamId, u64> = BTreeMap::new();
        for image in self.descriptors.iter().filter_map(SampleDescriptor::as_image) {
            if !streams.contains(&image.stream) {
                continue;
            }
            latest.insert(image.stream, image.capture_time);
            if latest.len() == streams.len() {
                let mut times = latest.values();
                let first = times.next().copied();
                if times.all(|t| Some(*t) == first) {
                    return Ok(CaptureMode::Synced);
                }
            }
        }

        Ok(CaptureMode::Async)
    }

    /// Read one complete record starting at the scan position.
    ///
    /// `Ok(None)` means a clean end of file between records.
    fn read_record(&mut self) -> Result<Option<SampleDescriptor>> {
        let mut offset = self.position;
        let mut pending: Option<PendingRecord> = None;

        loop {
            let chunk = match read_chunk_header(&mut *self.reader, offset, self.file_len)? {
                ChunkRead::Chunk(chunk) => chunk,
                ChunkRead::EndOfFile => {
                    if let Some(record) = pending {
                        return Err(ReplayError::format(
                            record.offset,
                            "sample record truncated at end of file",
                        ));
                    }
                    self.position = offset;
                    return Ok(None);
                }
            };
            offset = chunk.end();

            match chunk.id {
                ChunkId::SampleInfo => {
                    if pending.is_some() {
                        return Err(ReplayError::format(
                            chunk.offset,
                            "sample info inside an unfinished record",
                        ));
                    }
                    let payload = read_payload(&mut *self.reader, &chunk, SAMPLE_INFO_SIZE)?;
                    let mut fields = FieldReader::new(&payload);
                    let (Some(raw_kind), Some(capture_time)) = (fields.u32(), fields.u64()) else {
                        return Err(ReplayError::format(chunk.offset, "short sample info"));
                    };
                    let kind = SampleKind::from_raw(raw_kind).ok_or_else(|| {
                        ReplayError::format(chunk.offset, format!("unknown sample type {}", raw_kind))
                    })?;
                    pending = Some(PendingRecord {
                        kind,
                        capture_time,
                        offset: chunk.offset,
                        frame: None,
                        data_offset: None,
                    });
                }
                ChunkId::FrameInfo => {
                    let record = pending.as_mut().ok_or_else(|| {
                        ReplayError::format(chunk.offset, "frame info without sample info")
                    })?;
                    let payload = read_payload(&mut *self.reader, &chunk, FRAME_INFO_SIZE)?;
                    record.frame = Some(parse_frame_fields(&payload).ok_or_else(|| {
                        ReplayError::format(chunk.offset, "frame info names an unknown stream")
                    })?);
                }
                ChunkId::SampleData => {
                    let record = pending.take().ok_or_else(|| {
                        ReplayError::format(chunk.offset, "sample data without sample info")
                    })?;
                    let descriptor = self.finish_record(record, &chunk)?;
                    self.position = offset;
                    return Ok(Some(descriptor));
                }
                _ => {
                    if chunk.id == ChunkId::ImageMetadata && pending.is_none() {
                        return Err(ReplayError::format(
                            chunk.offset,
                            "image metadata without sample info",
                        ));
                    }
                    // Pixel chunks of an image start at the first chunk after its frame info
                    if let Some(record) = pending.as_mut() {
                        if record.frame.is_some() {
                            record.data_offset.get_or_insert(chunk.offset);
                        }
                    }
                }
            }
        }
    }

    fn finish_record(
        &mut self,
        record: PendingRecord,
        data: &crate::format::Chunk,
    ) -> Result<SampleDescriptor> {
        let descriptor = match record.kind {
            SampleKind::Image => {
                let frame = record.frame.ok_or_else(|| {
                    ReplayError::format(record.offset, "image record without frame info")
                })?;
                SampleDescriptor::Image(ImageDescriptor {
                    capture_time: record.capture_time,
                    offset: record.data_offset.unwrap_or(data.offset),
                    stream: frame.stream,
                    frame_number: frame.frame_number,
                    time_stamp: frame.time_stamp,
                    compression: frame.compression,
                })
            }
            SampleKind::Motion => {
                let payload = read_payload(&mut *self.reader, data, MOTION_DATA_SIZE)?;
                let mut fields = FieldReader::new(&payload);
                let parsed = (|| {
                    Some(MotionSample {
                        capture_time: record.capture_time,
                        offset: record.offset,
                        motion_type: MotionType::from_raw(fields.u32()?),
                        timestamp: fields.f64()?,
                        frame_number: fields.u32()?,
                        data: [fields.f32()?, fields.f32()?, fields.f32()?],
                    })
                })();
                SampleDescriptor::Motion(
                    parsed.ok_or_else(|| ReplayError::format(data.offset, "short motion data"))?,
                )
            }
            SampleKind::TimeSync => {
                let payload = read_payload(&mut *self.reader, data, TIME_SYNC_DATA_SIZE)?;
                let mut fields = FieldReader::new(&payload);
                let parsed = (|| {
                    Some(TimeSyncSample {
                        capture_time: record.capture_time,
                        offset: record.offset,
                        source: fields.u32()?,
                        timestamp: fields.f64()?,
                        frame_number: fields.u32()?,
                    })
                })();
                SampleDescriptor::TimeSync(
                    parsed.ok_or_else(|| ReplayError::format(data.offset, "short time sync data"))?,
                )
            }
            SampleKind::DebugEvent => SampleDescriptor::DebugEvent(DebugEventDescriptor {
                capture_time: record.capture_time,
                offset: record.offset,
            }),
        };

        tracing::trace!(
            "Indexed {:?} sample at {} (capture time {}us)",
            descriptor.kind(),
            descriptor.offset(),
            descriptor.capture_time()
        );
        Ok(descriptor)
    }
}

fn parse_frame_fields(payload: &[u8]) -> Option<FrameFields> {
    let mut fields = FieldReader::new(payload);
    Some(FrameFields {
        stream: StreamId::from_raw(fields.u32()?)?,
        frame_number: fields.u32()?,
        compression: CompressionType::from_raw(fields.u32()?),
        time_stamp: fields.f64()?,
    })
}
