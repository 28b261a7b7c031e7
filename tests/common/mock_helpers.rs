//! Engine construction helpers

use super::test_timeout;
use capture_replay::playback::{eof_channel, sample_channel, ManualClock};
use capture_replay::{PlaybackConfig, PlaybackEngine, Sample};
use crossbeam_channel::Receiver;
use std::sync::Arc;

/// An engine wired to channel sinks
pub struct Harness {
    pub engine: PlaybackEngine,
    pub samples: Receiver<Sample>,
    pub eof: Receiver<()>,
}

impl Harness {
    pub fn new(bytes: Vec<u8>, config: PlaybackConfig) -> Self {
        let mut engine = PlaybackEngine::from_bytes(bytes, config).expect("recording should open");
        let (on_sample, samples) = sample_channel();
        let (on_eof, eof) = eof_channel();
        engine.set_sample_callback(on_sample).unwrap();
        engine.set_eof_callback(on_eof).unwrap();
        Self {
            engine,
            samples,
            eof,
        }
    }

    /// Same, paced by a synthetic clock
    pub fn with_manual_clock(bytes: Vec<u8>, config: PlaybackConfig) -> (Self, Arc<ManualClock>) {
        let mut harness = Self::new(bytes, config);
        let clock = Arc::new(ManualClock::new());
        harness.engine.set_clock(clock.clone()).unwrap();
        (harness, clock)
    }

    /// Resume and block until the end-of-file callback fires
    pub fn play_to_end(&mut self) -> Vec<Sample> {
        self.engine.resume().unwrap();
        self.eof
            .recv_timeout(test_timeout())
            .expect("end of file should be reached");
        self.engine.pause().unwrap();
        self.samples.try_iter().collect()
    }
}
