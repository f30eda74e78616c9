//! Millisecond tick sources
//!
//! Event timestamps and reconnect backoff are expressed in wrapping `u32`
//! millisecond ticks, the same resolution an RTOS tick counter gives.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A monotonic millisecond tick source
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock's epoch, wrapping at `u32::MAX`
    fn now_ms(&self) -> u32;
}

/// Shared handle to a clock
pub type ClockRef = Arc<dyn Clock>;

/// Wall clock backed by `Instant`, counting from construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Create a clock whose epoch is now
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Convenience constructor returning a shared handle
    pub fn shared() -> ClockRef {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Start at 1 so a stamped timestamp is never the "unset" value.
        (self.epoch.elapsed().as_millis() as u32).wrapping_add(1)
    }
}

/// Manually advanced clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    /// Create a clock reading `start`
    pub fn new(start: u32) -> Self {
        Self {
            now: AtomicU32::new(start),
        }
    }

    /// Set the current tick
    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Advance by `delta_ms`, returning the new tick
    pub fn advance(&self, delta_ms: u32) -> u32 {
        self.now
            .fetch_add(delta_ms, Ordering::SeqCst)
            .wrapping_add(delta_ms)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}
