//! Mock HAL implementation for testing the simulator runtime
//!
//! Captures every debug line so tests can assert on what the runtime logged,
//! and exposes a manually advanced clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use ownsim_hal::HAL;

/// Mock HAL for unit testing
pub struct MockHal {
    /// Simulated time in nanoseconds
    time: AtomicU64,
    /// Amount the clock moves on every `now_nanos` call
    tick: u64,
    /// Captured debug messages
    debug_log: Mutex<Vec<String>>,
}

impl MockHal {
    /// Create a new mock HAL with a frozen clock
    pub fn new() -> Self {
        Self::with_tick(0)
    }

    /// Create a mock HAL whose clock advances by `tick` on every read
    pub fn with_tick(tick: u64) -> Self {
        Self {
            time: AtomicU64::new(0),
            tick,
            debug_log: Mutex::new(Vec::new()),
        }
    }

    /// Advance the simulated time by the given duration
    pub fn advance_time(&self, nanos: u64) {
        self.time.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Snapshot of every captured debug line
    pub fn get_debug_log(&self) -> Vec<String> {
        self.debug_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Whether any captured line contains `needle`
    pub fn has_log_containing(&self, needle: &str) -> bool {
        self.get_debug_log().iter().any(|line| line.contains(needle))
    }

    /// Drop all captured lines
    pub fn clear_debug_log(&self) {
        if let Ok(mut log) = self.debug_log.lock() {
            log.clear();
        }
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl HAL for MockHal {
    fn now_nanos(&self) -> u64 {
        self.time.fetch_add(self.tick, Ordering::SeqCst)
    }

    fn wallclock_ms(&self) -> u64 {
        1737504000000
    }

    fn debug_write(&self, msg: &str) {
        if let Ok(mut log) = self.debug_log.lock() {
            log.push(String::from(msg));
        }
    }
}
