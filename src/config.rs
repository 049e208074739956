//! Throughput server configuration
//!
//! Compile-time constants grouped by concern, plus the runtime
//! [`ThroughputConfig`] whose defaults are built from them.

/// Notification pump and sampling constants
pub mod throughput {
    /// Size of one notification payload (ATT MTU 247 minus 3 byte header)
    pub const NOTIFICATION_DATA_SIZE: usize = 244;

    /// Notifications emitted per pump cycle
    pub const PACKETS_PER_BATCH: usize = 10;

    /// Length of one sampling window
    pub const SAMPLE_WINDOW_MS: u32 = 5000;

    /// Delay between batches while notifications are flowing
    pub const ACTIVE_PACING_MS: u32 = 10;

    /// Delay between checks while the pump is idle
    pub const IDLE_PACING_MS: u32 = 100;
}

/// Attribute protocol constants
pub mod gatt {
    /// Minimum ATT MTU for LE
    pub const ATT_DEFAULT_MTU: u16 = 23;

    /// Largest MTU this server accepts (max LE RX PDU)
    pub const LOCAL_MAX_MTU: u16 = 247;

    /// Capacity of the read-by-type response buffer
    pub const MAX_RESPONSE_LEN: usize = 512;

    /// Capacity of a single attribute value slot
    pub const MAX_VALUE_LEN: usize = 244;

    /// Bit 0 of the client characteristic configuration descriptor
    pub const CLIENT_CONFIG_NOTIFICATION: u8 = 0x01;

    /// Maximum number of entries in the application value table
    pub const MAX_ATTRIBUTES: usize = 8;
}

/// Connection parameter request sent after the PHY update
pub mod connection {
    /// Connection interval in 1.25 ms units (35 ms)
    pub const CONNECTION_INTERVAL: u16 = 28;

    /// Slave latency
    pub const CONNECTION_LATENCY: u16 = 0;

    /// Supervision timeout in 10 ms units
    pub const SUPERVISION_TIMEOUT: u16 = 1000;

    /// Microseconds per connection interval unit
    pub const CONN_INTERVAL_UNIT_US: u32 = 1250;

    /// Milliseconds per supervision timeout unit
    pub const SUPERVISION_TIMEOUT_UNIT_MS: u32 = 10;
}

/// Advertising configuration
pub mod advertising {
    /// Complete local name advertised by the server
    pub const DEVICE_NAME: &str = "TPUT";
}

/// Notification pump tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    /// Bytes per notification
    pub unit_size: usize,
    /// Notifications per cycle
    pub batch_len: usize,
    /// Pacing delay after a batch
    pub active_pacing_ms: u32,
    /// Pacing delay while idle
    pub idle_pacing_ms: u32,
}

impl PumpConfig {
    /// Settings built from the [`throughput`] constants
    pub const fn new() -> Self {
        Self {
            unit_size: throughput::NOTIFICATION_DATA_SIZE,
            batch_len: throughput::PACKETS_PER_BATCH,
            active_pacing_ms: throughput::ACTIVE_PACING_MS,
            idle_pacing_ms: throughput::IDLE_PACING_MS,
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime configuration for the throughput server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputConfig {
    /// Sampling window in milliseconds
    pub sample_window_ms: u32,
    /// Notification pump settings
    pub pump: PumpConfig,
}

impl ThroughputConfig {
    pub const fn new() -> Self {
        Self {
            sample_window_ms: throughput::SAMPLE_WINDOW_MS,
            pump: PumpConfig::new(),
        }
    }
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self::new()
    }
}
