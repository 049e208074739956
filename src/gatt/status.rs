//! Attribute protocol status codes
//!
//! Errors returned by attribute dispatch are surfaced to the peer as an
//! ATT error response, so each variant carries its wire code.

/// Errors returned by read / write / read-by-type dispatch
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttError {
    /// Handle unknown, or no attribute matched a read-by-type query (0x01)
    InvalidHandle = 0x01,

    /// Read offset at or past the current value length (0x07)
    InvalidOffset = 0x07,

    /// Written value longer than the attribute's maximum length (0x0D)
    InvalidAttributeLength = 0x0D,

    /// Response buffer could not hold a single result (0x11)
    InsufficientResources = 0x11,
}

impl AttError {
    /// ATT error code sent to the peer
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Errors raised while building the attribute database at startup
///
/// These are fatal: the firmware halts rather than run with a partial table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseError {
    /// Two value entries share a handle
    DuplicateHandle(u16),
    /// Initial value or declared maximum exceeds the value slot
    ValueTooLong(u16),
    /// Declarations not in strictly ascending handle order
    Unordered(u16),
    /// More entries than the table can hold
    TableFull,
}
