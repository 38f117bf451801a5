//! Time-window arithmetic and an injectable wall clock.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::totp::types::PERIOD_SECONDS;

/// Source of unix time in whole seconds.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;

    /// How long until the next whole second begins. Used to align
    /// countdown tasks with second boundaries.
    fn until_next_second(&self) -> Duration {
        Duration::ZERO
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// The operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    fn until_next_second(&self) -> Duration {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        Duration::from_nanos(u64::from(1_000_000_000 - nanos))
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(unix_seconds: u64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(unix_seconds),
        })
    }

    pub fn set(&self, unix_seconds: u64) {
        self.now.store(unix_seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Time-step counter for a unix timestamp.
pub fn counter_for(unix_seconds: u64) -> u64 {
    unix_seconds / PERIOD_SECONDS
}

/// Seconds until the current window ends, always in `1..=30`.
pub fn seconds_remaining(unix_seconds: u64) -> u32 {
    (PERIOD_SECONDS - unix_seconds % PERIOD_SECONDS) as u32
}

/// Elapsed fraction of the current window (0.0 = fresh code).
pub fn progress_fraction(unix_seconds: u64) -> f64 {
    (unix_seconds % PERIOD_SECONDS) as f64 / PERIOD_SECONDS as f64
}

/// `true` on the first second of a window, where codes roll over.
pub fn is_window_start(unix_seconds: u64) -> bool {
    seconds_remaining(unix_seconds) as u64 == PERIOD_SECONDS
}

/// Snapshot of the window a timestamp falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub counter: u64,
    pub remaining_seconds: u32,
}

impl TimeWindow {
    pub fn at(unix_seconds: u64) -> Self {
        Self {
            counter: counter_for(unix_seconds),
            remaining_seconds: seconds_remaining(unix_seconds),
        }
    }

    pub fn now(clock: &dyn Clock) -> Self {
        Self::at(clock.now_unix())
    }

    /// Unix second at which this window began.
    pub fn start_unix(&self) -> u64 {
        self.counter * PERIOD_SECONDS
    }
}
