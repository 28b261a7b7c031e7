//! Wall-clock pacing
//!
//! [`PacingClock`] maps recorded capture times onto wall-clock delivery times.
//! It keeps a (wall instant, recorded base timestamp) pair that is reset on
//! resume, on realtime toggling and after every seek. A sample is due once
//! the wall time elapsed since the reset covers the distance between the
//! sample's capture time and the base timestamp.
//!
//! Time itself comes from a [`Clock`], so tests can drive playback with
//! [`ManualClock`], whose `sleep` advances synthetic time instead of blocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Real monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Synthetic clock; `sleep` advances time immediately
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        self.now_us
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Maps capture timestamps to wall-clock delivery times
///
/// Shared between the controller (which resets it and answers run-time
/// queries) and the reader thread (which asks for delays), so both halves of
/// the base pair are atomics.
pub struct PacingClock {
    clock: Arc<dyn Clock>,
    /// Wall time of the last reset, in microseconds of `clock`
    base_wall_us: AtomicU64,
    /// Recorded capture time matching `base_wall_us`
    base_ts: AtomicU64,
}

impl std::fmt::Debug for PacingClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacingClock")
            .field("base_wall_us", &self.base_wall_us.load(Ordering::SeqCst))
            .field("base_ts", &self.base_ts.load(Ordering::SeqCst))
            .finish()
    }
}

impl PacingClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now().as_micros() as u64;
        Self {
            clock,
            base_wall_us: AtomicU64::new(now),
            base_ts: AtomicU64::new(0),
        }
    }

    /// Re-anchor: `base_ts` is due right now
    pub fn reset(&self, base_ts: u64) {
        self.base_ts.store(base_ts, Ordering::SeqCst);
        self.base_wall_us
            .store(self.clock.now().as_micros() as u64, Ordering::SeqCst);
        tracing::trace!("New time base {}us", base_ts);
    }

    /// Recorded timestamp of the current base
    pub fn base_timestamp(&self) -> u64 {
        self.base_ts.load(Ordering::SeqCst)
    }

    /// Wall time elapsed since the last reset
    pub fn run_time(&self) -> Duration {
        let now = self.clock.now().as_micros() as u64;
        Duration::from_micros(now.saturating_sub(self.base_wall_us.load(Ordering::SeqCst)))
    }

    /// Microseconds until a sample captured at `capture_time` is due.
    ///
    /// Zero or negative means the sample is due now.
    pub fn due_delay(&self, capture_time: u64) -> i64 {
        let base = self.base_ts.load(Ordering::SeqCst) as i64;
        capture_time as i64 - base - self.run_time().as_micros() as i64
    }

    /// Sleep for at most `max_increment` of the given delay
    pub fn sleep_toward(&self, delay_us: i64, max_increment: Duration) {
        if delay_us <= 0 {
            return;
        }
        let wait = Duration::from_micros(delay_us as u64).min(max_increment);
        self.clock.sleep(wait);
    }
}
