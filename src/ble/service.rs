//! Throughput measurement service definition
//!
//! - Service UUID: 1B2F0001-4A0D-4C7B-9E7C-52A3B6F9C001
//! - Notify Characteristic: 1B2F0002-... (read, notify)
//! - WriteMe Characteristic: 1B2F0003-... (write, write without response)

use trouble_host::prelude::*;

use crate::config::throughput::NOTIFICATION_DATA_SIZE;
use crate::gatt::database::NOTIFY_PATTERN;

/// Throughput measurement service
#[gatt_service(uuid = "1b2f0001-4a0d-4c7b-9e7c-52a3b6f9c001")]
pub struct ThroughputService {
    /// Server streams the counting pattern here while the client subscribes
    #[characteristic(uuid = "1b2f0002-4a0d-4c7b-9e7c-52a3b6f9c001", read, notify, value = NOTIFY_PATTERN)]
    pub notify: [u8; NOTIFICATION_DATA_SIZE],

    /// Client writes arbitrary data here to measure inbound rate
    #[characteristic(uuid = "1b2f0003-4a0d-4c7b-9e7c-52a3b6f9c001", write, write_without_response, value = [0u8; 244])]
    pub writeme: [u8; NOTIFICATION_DATA_SIZE],
}
