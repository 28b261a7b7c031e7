//! Background read loop
//!
//! [`ReaderCore`] bundles everything the loop mutates: indexer, decoder,
//! prefetcher and the caller's sinks. [`ReaderTask::start`] moves the core
//! into a dedicated thread and [`ReaderTask::stop`] hands it back through the
//! join handle, so the controller can only touch the core while no reader is
//! running.
//!
//! # Loop body
//!
//! 1. Deliver every queued sample that is due (all of them when not pacing)
//! 2. Index more of the file if the cursor has caught up with the index
//! 3. Stop at end of file once nothing is left to read or deliver
//! 4. Prefetch one descriptor
//! 5. When pacing and the buffers are full, wait for the front sample,
//!    indexing ahead while the file is not fully scanned

use super::buffer::SampleBuffer;
use super::clock::PacingClock;
use super::decoder::Decoder;
use super::indexer::Indexer;
use super::prefetch::Prefetcher;
use super::{EofCallback, SampleCallback};
use crate::error::{ReplayError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// State owned by whichever side is currently driving playback
pub(crate) struct ReaderCore {
    pub indexer: Indexer,
    pub decoder: Decoder,
    pub prefetcher: Prefetcher,
    pub buffer: Arc<SampleBuffer>,
    pub pacing: Arc<PacingClock>,
    pub realtime: bool,
    pub index_batch_size: usize,
    pub max_sleep_increment: Duration,
    pub on_sample: Option<SampleCallback>,
    pub on_eof: Option<EofCallback>,
}

/// How one loop iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    EndOfFile,
}

impl ReaderCore {
    /// Re-anchor pacing on the next sample to be delivered
    pub fn reset_time_base(&self) {
        let base = self
            .buffer
            .front_capture_time()
            .or_else(|| {
                self.indexer
                    .get(self.prefetcher.cursor())
                    .map(|d| d.capture_time())
            })
            .unwrap_or(0);
        self.pacing.reset(base);
    }

    /// Run until `running` is cleared or the recording ends
    fn run(&mut self, running: &AtomicBool) -> Result<()> {
        tracing::info!("Reader started at sample {}", self.prefetcher.cursor());

        let result = loop {
            if !running.load(Ordering::SeqCst) {
                break Ok(());
            }
            match self.read_next_sample(running) {
                Ok(Step::Continue) => {}
                Ok(Step::EndOfFile) => break self.finish_play_through(),
                Err(e) => {
                    tracing::error!("Reader stopped: {}", e);
                    break Err(e);
                }
            }
        };

        let stats = self.buffer.stats();
        tracing::info!(
            "Reader stopped: {} frames delivered, {} dropped, {} skipped",
            stats.delivered_frames,
            stats.total_frame_drops,
            stats.skipped_frames
        );
        result
    }

    fn finish_play_through(&mut self) -> Result<()> {
        match self.on_eof.as_mut() {
            Some(on_eof) => {
                tracing::info!("End of recording reached");
                on_eof();
                Ok(())
            }
            None => Err(ReplayError::MissingEofCallback),
        }
    }

    fn read_next_sample(&mut self, running: &AtomicBool) -> Result<Step> {
        self.deliver_due_samples(running);

        while self.prefetcher.is_exhausted(&self.indexer) && !self.indexer.is_complete() {
            self.indexer.index_next_samples(self.index_batch_size)?;
        }

        if self.prefetcher.is_exhausted(&self.indexer) && self.buffer.is_empty() {
            return Ok(Step::EndOfFile);
        }

        self.prefetcher
            .prefetch_one(&self.indexer, &mut self.decoder)?;

        if self.realtime && self.prefetcher.all_streams_buffered(&self.indexer) {
            self.wait_for_front(running)?;
        }
        Ok(Step::Continue)
    }

    /// Hand due samples to the sink; the buffer lock is released before each call
    fn deliver_due_samples(&mut self, running: &AtomicBool) {
        let realtime = self.realtime;
        while running.load(Ordering::SeqCst) {
            let pacing = &self.pacing;
            let Some(sample) = self
                .buffer
                .pop_front_if(|capture_time| !realtime || pacing.due_delay(capture_time) <= 0)
            else {
                break;
            };

            tracing::trace!("Delivering sample captured at {}us", sample.capture_time());
            if let Some(on_sample) = self.on_sample.as_mut() {
                on_sample(sample);
            }
        }
    }

    fn wait_for_front(&mut self, running: &AtomicBool) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            let Some(capture_time) = self.buffer.front_capture_time() else {
                break;
            };
            let delay = self.pacing.due_delay(capture_time);
            if delay <= 0 {
                break;
            }
            if self.indexer.is_complete() {
                self.pacing.sleep_toward(delay, self.max_sleep_increment);
            } else {
                self.indexer.index_next_samples(self.index_batch_size)?;
            }
        }
        Ok(())
    }
}

/// Handle on a running reader thread
pub(crate) struct ReaderTask {
    running: Arc<AtomicBool>,
    handle: JoinHandle<(ReaderCore, Result<()>)>,
}

impl ReaderTask {
    pub fn start(mut core: ReaderCore) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = std::thread::Builder::new()
            .name("capture-replay-reader".to_string())
            .spawn(move || {
                let result = core.run(&flag);
                flag.store(false, Ordering::SeqCst);
                (core, result)
            })?;

        Ok(Self { running, handle })
    }

    /// Whether the loop is still working (it clears the flag itself at end of file)
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.handle.is_finished()
    }

    /// Signal the loop to stop, wait for it, and take the core back
    pub fn stop(self) -> Result<(ReaderCore, Result<()>)> {
        self.running.store(false, Ordering::SeqCst);
        self.handle.join().map_err(|_| ReplayError::ReaderPanicked)
    }
}
