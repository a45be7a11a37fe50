//! Time sources for the game engine.
//!
//! The engine never reads the system time directly. Production code uses
//! [`SystemClock`]; tests drive the engine with a [`ManualClock`] so phase
//! timers and race ticks can be stepped deterministically.

use crate::utils::get_timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Millisecond wall-clock source.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        get_timestamp()
    }
}

/// Virtual clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle
/// while the engine owns another.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
