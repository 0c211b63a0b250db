//! Host abstraction for the ownership simulator
//!
//! The simulator core is a pure state machine. Everything it needs from the
//! outside world (a clock for commit timestamps, a sink for diagnostics) goes
//! through the [`HAL`] trait so the same runtime can be driven from a CLI, a
//! test harness, or an embedding host.

#![no_std]

use core::sync::atomic::{AtomicU64, Ordering};

/// Host Abstraction Layer trait
///
/// Implementations provide:
/// - Time measurement (used to stamp op and commit log entries)
/// - Debug output
pub trait HAL: Send + Sync + 'static {
    // === Time ===

    /// Current time in nanoseconds (monotonic)
    fn now_nanos(&self) -> u64;

    /// Wall-clock time in milliseconds since Unix epoch
    ///
    /// Only used for report headers. Hosts without a wall clock return 0.
    fn wallclock_ms(&self) -> u64 {
        0
    }

    // === Debug ===

    /// Write a debug message to the host's console/log
    fn debug_write(&self, msg: &str);
}

/// A minimal HAL for unit testing
///
/// Time only moves when told to; debug output is discarded.
#[derive(Default)]
pub struct TestHal {
    time: AtomicU64,
}

impl TestHal {
    pub fn new() -> Self {
        Self {
            time: AtomicU64::new(0),
        }
    }

    /// Advance the simulated clock
    pub fn advance_time(&self, nanos: u64) {
        self.time.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl HAL for TestHal {
    fn now_nanos(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    fn debug_write(&self, _msg: &str) {
        // No-op for tests
    }
}
