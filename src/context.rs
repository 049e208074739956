//! Shared throughput context
//!
//! Everything the pump, the reporter and the GATT callbacks share lives
//! here, passed by reference into each component. All state is either
//! atomic or behind a critical-section mutex, so callbacks never block.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::ThroughputConfig;
use crate::throughput::counters::ThroughputCounters;
use crate::throughput::gate::CongestionGate;
use crate::throughput::sampler::SampleScheduler;

/// Sentinel stored while no peer is connected
const NO_CONNECTION: u32 = u32::MAX;

/// Process-lifetime state shared between tasks and callbacks
pub struct ThroughputContext {
    config: ThroughputConfig,
    pub counters: ThroughputCounters,
    pub gate: CongestionGate,
    pub sampler: SampleScheduler,
    connection: AtomicU32,
    notifications_enabled: AtomicBool,
}

impl ThroughputContext {
    pub const fn new(config: ThroughputConfig) -> Self {
        Self {
            config,
            counters: ThroughputCounters::new(),
            gate: CongestionGate::new(),
            sampler: SampleScheduler::new(config.sample_window_ms),
            connection: AtomicU32::new(NO_CONNECTION),
            notifications_enabled: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ThroughputConfig {
        &self.config
    }

    /// Handle of the active connection, if any
    pub fn connection_handle(&self) -> Option<u16> {
        match self.connection.load(Ordering::Acquire) {
            NO_CONNECTION => None,
            handle => Some(handle as u16),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_handle().is_some()
    }

    pub(crate) fn set_connection(&self, handle: Option<u16>) {
        let raw = handle.map_or(NO_CONNECTION, u32::from);
        self.connection.store(raw, Ordering::Release);
        if handle.is_none() {
            self.gate.wake();
        }
    }

    /// Mirror of bit 0 of the enable-flag attribute
    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_notifications_enabled(&self, enabled: bool) {
        self.notifications_enabled.store(enabled, Ordering::Release);
        if !enabled {
            // Let a pump parked on congestion notice it has nothing to send
            self.gate.wake();
        }
    }

    /// Connection handle the pump may send on: connected and enabled
    pub fn pump_target(&self) -> Option<u16> {
        if self.notifications_enabled() {
            self.connection_handle()
        } else {
            None
        }
    }
}

impl Default for ThroughputContext {
    fn default() -> Self {
        Self::new(ThroughputConfig::new())
    }
}
