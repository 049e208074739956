//! Static GATT database for the throughput service
//!
//! Two tables describe the server:
//! - [`DECLARATIONS`]: every attribute handle with its type, in handle order.
//!   This is what read-by-type queries scan.
//! - [`VALUES`]: the application-owned value slots. Declarations such as
//!   service and characteristic definitions have no slot here.
//!
//! ```text
//! 0x01 Primary Service      GAP
//! 0x02   Characteristic     Device Name
//! 0x03     Value            "TPUT"
//! 0x04   Characteristic     Appearance
//! 0x05     Value            0x0000
//! 0x06 Primary Service      Throughput Measurement
//! 0x07   Characteristic     Notify (notify)
//! 0x08     Value            244 byte counting pattern
//! 0x09     CCCD             enable flag
//! 0x0A   Characteristic     WriteMe (write, write without response)
//! 0x0B     Value            up to 244 bytes
//! ```

use crate::config::{advertising, throughput};

/// Attribute type (UUID) as used by type-scoped queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    /// Bluetooth SIG assigned 16-bit UUID
    Uuid16(u16),
    /// Vendor specific 128-bit UUID
    Uuid128(u128),
}

/// Assigned numbers used by the database
pub mod uuid {
    use super::AttributeType;

    pub const PRIMARY_SERVICE: AttributeType = AttributeType::Uuid16(0x2800);
    pub const CHARACTERISTIC: AttributeType = AttributeType::Uuid16(0x2803);
    pub const CLIENT_CHAR_CONFIG: AttributeType = AttributeType::Uuid16(0x2902);
    pub const DEVICE_NAME: AttributeType = AttributeType::Uuid16(0x2A00);
    pub const APPEARANCE: AttributeType = AttributeType::Uuid16(0x2A01);

    /// Throughput measurement service
    pub const THROUGHPUT_SERVICE_UUID: u128 = 0x1b2f0001_4a0d_4c7b_9e7c_52a3b6f9c001;
    /// Notification source characteristic
    pub const NOTIFY_UUID: u128 = 0x1b2f0002_4a0d_4c7b_9e7c_52a3b6f9c001;
    /// Write sink characteristic
    pub const WRITEME_UUID: u128 = 0x1b2f0003_4a0d_4c7b_9e7c_52a3b6f9c001;

    pub const NOTIFY_VALUE: AttributeType = AttributeType::Uuid128(NOTIFY_UUID);
    pub const WRITEME_VALUE: AttributeType = AttributeType::Uuid128(WRITEME_UUID);
}

/// Attribute handles
pub mod handles {
    pub const GAP_SERVICE: u16 = 0x01;
    pub const DEVICE_NAME_DECL: u16 = 0x02;
    pub const DEVICE_NAME_VALUE: u16 = 0x03;
    pub const APPEARANCE_DECL: u16 = 0x04;
    pub const APPEARANCE_VALUE: u16 = 0x05;
    pub const THROUGHPUT_SERVICE: u16 = 0x06;
    pub const NOTIFY_DECL: u16 = 0x07;
    pub const NOTIFY_VALUE: u16 = 0x08;
    /// Enable flag: bit 0 set means notifications enabled
    pub const NOTIFY_CLIENT_CONFIG: u16 = 0x09;
    pub const WRITEME_DECL: u16 = 0x0A;
    /// Inbound writes here are counted as received throughput
    pub const WRITEME_VALUE: u16 = 0x0B;
}

/// One entry of the declaration table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration {
    pub handle: u16,
    pub attr_type: AttributeType,
}

/// Initial definition of one application value slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSpec {
    pub handle: u16,
    pub max_len: usize,
    pub initial: &'static [u8],
}

const fn counting_pattern<const N: usize>() -> [u8; N] {
    let mut pattern = [0u8; N];
    let mut i = 0;
    while i < N {
        pattern[i] = i as u8;
        i += 1;
    }
    pattern
}

/// Initial notify value: the same 0, 1, 2, ... pattern the pump sends
pub static NOTIFY_PATTERN: [u8; throughput::NOTIFICATION_DATA_SIZE] = counting_pattern();

const fn decl(handle: u16, attr_type: AttributeType) -> Declaration {
    Declaration { handle, attr_type }
}

/// Every attribute of the server in ascending handle order
pub static DECLARATIONS: [Declaration; 11] = [
    decl(handles::GAP_SERVICE, uuid::PRIMARY_SERVICE),
    decl(handles::DEVICE_NAME_DECL, uuid::CHARACTERISTIC),
    decl(handles::DEVICE_NAME_VALUE, uuid::DEVICE_NAME),
    decl(handles::APPEARANCE_DECL, uuid::CHARACTERISTIC),
    decl(handles::APPEARANCE_VALUE, uuid::APPEARANCE),
    decl(handles::THROUGHPUT_SERVICE, uuid::PRIMARY_SERVICE),
    decl(handles::NOTIFY_DECL, uuid::CHARACTERISTIC),
    decl(handles::NOTIFY_VALUE, uuid::NOTIFY_VALUE),
    decl(handles::NOTIFY_CLIENT_CONFIG, uuid::CLIENT_CHAR_CONFIG),
    decl(handles::WRITEME_DECL, uuid::CHARACTERISTIC),
    decl(handles::WRITEME_VALUE, uuid::WRITEME_VALUE),
];

/// Application value slots
pub static VALUES: [ValueSpec; 5] = [
    ValueSpec {
        handle: handles::DEVICE_NAME_VALUE,
        max_len: advertising::DEVICE_NAME.len(),
        initial: advertising::DEVICE_NAME.as_bytes(),
    },
    ValueSpec {
        handle: handles::APPEARANCE_VALUE,
        max_len: 2,
        initial: &[0x00, 0x00],
    },
    ValueSpec {
        handle: handles::NOTIFY_VALUE,
        max_len: throughput::NOTIFICATION_DATA_SIZE,
        initial: &NOTIFY_PATTERN,
    },
    ValueSpec {
        handle: handles::NOTIFY_CLIENT_CONFIG,
        max_len: 2,
        initial: &[0x00, 0x00],
    },
    ValueSpec {
        handle: handles::WRITEME_VALUE,
        max_len: throughput::NOTIFICATION_DATA_SIZE,
        initial: &[],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarations_sorted_and_unique() {
        for pair in DECLARATIONS.windows(2) {
            assert!(pair[0].handle < pair[1].handle);
        }
    }

    #[test]
    fn test_every_value_has_declaration() {
        for value in VALUES.iter() {
            assert!(DECLARATIONS.iter().any(|d| d.handle == value.handle));
            assert!(value.initial.len() <= value.max_len);
        }
    }

    #[test]
    fn test_notify_pattern() {
        assert_eq!(NOTIFY_PATTERN[0], 0);
        assert_eq!(NOTIFY_PATTERN[243], 243);
    }
}
