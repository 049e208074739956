//! Byte counters for both traffic directions
//!
//! The pump and write dispatch add to these while the reporter drains them
//! once per window. Draining uses an atomic swap, so an increment lands
//! either in the window being read or in the next one, never both.

use core::sync::atomic::{AtomicU32, Ordering};

/// Values drained from [`ThroughputCounters`] at a sample boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSample {
    /// Bytes confirmed sent as notifications
    pub outbound_bytes: u32,
    /// Bytes received through writes
    pub inbound_bytes: u32,
}

/// Outbound and inbound byte counters
pub struct ThroughputCounters {
    outbound: AtomicU32,
    inbound: AtomicU32,
}

impl ThroughputCounters {
    pub const fn new() -> Self {
        Self {
            outbound: AtomicU32::new(0),
            inbound: AtomicU32::new(0),
        }
    }

    pub fn add_outbound(&self, bytes: u32) {
        self.outbound.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn add_inbound(&self, bytes: u32) {
        self.inbound.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Read and zero both counters
    pub fn take(&self) -> CounterSample {
        CounterSample {
            outbound_bytes: self.outbound.swap(0, Ordering::AcqRel),
            inbound_bytes: self.inbound.swap(0, Ordering::AcqRel),
        }
    }

    pub fn reset_outbound(&self) {
        self.outbound.store(0, Ordering::Release);
    }

    pub fn reset_inbound(&self) {
        self.inbound.store(0, Ordering::Release);
    }

    pub fn reset(&self) {
        self.reset_outbound();
        self.reset_inbound();
    }

    /// Current outbound count without clearing it
    pub fn outbound(&self) -> u32 {
        self.outbound.load(Ordering::Acquire)
    }

    /// Current inbound count without clearing it
    pub fn inbound(&self) -> u32 {
        self.inbound.load(Ordering::Acquire)
    }
}

impl Default for ThroughputCounters {
    fn default() -> Self {
        Self::new()
    }
}
