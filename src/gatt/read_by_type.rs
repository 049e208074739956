//! Read-by-type response builder
//!
//! Serialises `[handle: u16 LE][value]` tuples for every attribute of the
//! requested type in a handle range, until the next tuple no longer fits.
//! Every tuple in a single response has the same length (`pair_len`), as the
//! attribute protocol requires; a tuple of a different size ends the response
//! and the peer continues with a new request starting past the last handle.

use crate::config::gatt::MAX_RESPONSE_LEN;
use crate::gatt::database::AttributeType;
use crate::gatt::status::AttError;
use crate::gatt::store::AttributeStore;
use heapless::Vec;

/// Serialised read-by-type result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadByTypeResponse {
    /// Length of each `(handle, value)` tuple
    pub pair_len: u8,
    /// Concatenated tuples
    pub data: Vec<u8, MAX_RESPONSE_LEN>,
}

impl ReadByTypeResponse {
    fn new() -> Self {
        Self {
            pair_len: 0,
            data: Vec::new(),
        }
    }

    /// Number of tuples in the response
    pub fn count(&self) -> usize {
        if self.pair_len == 0 {
            0
        } else {
            self.data.len() / self.pair_len as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over `(handle, value)` tuples
    pub fn tuples(&self) -> impl Iterator<Item = (u16, &[u8])> {
        let step = (self.pair_len as usize).max(1);
        self.data
            .chunks(step)
            .filter(|chunk| chunk.len() >= 2)
            .map(|chunk| (u16::from_le_bytes([chunk[0], chunk[1]]), &chunk[2..]))
    }

    /// Append one tuple. Returns false if it does not fit or its length
    /// differs from the tuples already present.
    fn push(&mut self, handle: u16, value: &[u8], limit: usize) -> bool {
        let tuple_len = 2 + value.len();
        let Ok(tuple_len_u8) = u8::try_from(tuple_len) else {
            return false;
        };

        if self.pair_len != 0 && self.pair_len != tuple_len_u8 {
            return false;
        }
        if self.data.len() + tuple_len > limit {
            return false;
        }

        // Capacity is checked against limit above, which never exceeds it
        if self.data.extend_from_slice(&handle.to_le_bytes()).is_err()
            || self.data.extend_from_slice(value).is_err()
        {
            return false;
        }
        self.pair_len = tuple_len_u8;
        true
    }
}

/// Serve a read-by-type query against the store.
///
/// `max_response_len` is clamped to the response buffer capacity.
///
/// Errors:
/// - `InvalidHandle` when nothing in the range matches, or a matching
///   declaration has no value slot (a database inconsistency).
/// - `InsufficientResources` when matches exist but not even the first
///   tuple fits.
pub fn read_by_type<const N: usize>(
    store: &AttributeStore<N>,
    start_handle: u16,
    end_handle: u16,
    attr_type: AttributeType,
    max_response_len: usize,
) -> Result<ReadByTypeResponse, AttError> {
    let limit = max_response_len.min(MAX_RESPONSE_LEN);
    let mut response = ReadByTypeResponse::new();
    let mut matched = false;

    for handle in store.find_range(start_handle, end_handle, attr_type) {
        matched = true;

        let entry = store.find(handle).map_err(|e| {
            log::warn!("read_by_type: type matched but no attribute at {:#06x}", handle);
            e
        })?;

        if !response.push(handle, entry.value(), limit) {
            break;
        }
    }

    if response.is_empty() {
        if matched {
            log::warn!(
                "read_by_type: no room for a single tuple in {} bytes",
                limit
            );
            return Err(AttError::InsufficientResources);
        }
        log::debug!(
            "read_by_type: attr not found start {:#06x} end {:#06x} type {:?}",
            start_handle,
            end_handle,
            attr_type
        );
        return Err(AttError::InvalidHandle);
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::database::{handles, uuid, Declaration, ValueSpec, DECLARATIONS, VALUES};

    const SENSOR: AttributeType = AttributeType::Uuid16(0xFFF1);
    const FILLER: AttributeType = AttributeType::Uuid16(0xFFF2);

    static SENSORS: [Declaration; 5] = [
        Declaration { handle: 10, attr_type: FILLER },
        Declaration { handle: 11, attr_type: SENSOR },
        Declaration { handle: 12, attr_type: SENSOR },
        Declaration { handle: 13, attr_type: SENSOR },
        Declaration { handle: 20, attr_type: SENSOR },
    ];

    static SENSOR_VALUES: [ValueSpec; 4] = [
        ValueSpec { handle: 11, max_len: 4, initial: &[1, 1, 1, 1] },
        ValueSpec { handle: 12, max_len: 4, initial: &[2, 2, 2, 2] },
        ValueSpec { handle: 13, max_len: 4, initial: &[3, 3] },
        ValueSpec { handle: 20, max_len: 4, initial: &[4, 4, 4, 4] },
    ];

    fn sensor_store() -> AttributeStore<4> {
        AttributeStore::new(&SENSORS, &SENSOR_VALUES).unwrap()
    }

    #[test]
    fn test_single_match() {
        let store: AttributeStore<8> = AttributeStore::new(&DECLARATIONS, &VALUES).unwrap();
        let rsp = read_by_type(&store, 0x0001, 0xFFFF, uuid::DEVICE_NAME, 64).unwrap();

        assert_eq!(rsp.pair_len, 6);
        assert_eq!(rsp.count(), 1);
        let (handle, value) = rsp.tuples().next().unwrap();
        assert_eq!(handle, handles::DEVICE_NAME_VALUE);
        assert_eq!(value, b"TPUT");
    }

    #[test]
    fn test_stops_when_length_changes() {
        let store = sensor_store();
        let rsp = read_by_type(&store, 1, 0xFFFF, SENSOR, 64).unwrap();

        // Handle 13 holds a shorter value, so the response ends after 12
        assert_eq!(rsp.pair_len, 6);
        assert_eq!(rsp.count(), 2);
        assert_eq!(rsp.data.as_slice(), &[11, 0, 1, 1, 1, 1, 12, 0, 2, 2, 2, 2]);

        // Paging resumes from the next handle
        let next = read_by_type(&store, 13, 0xFFFF, SENSOR, 64).unwrap();
        assert_eq!(next.pair_len, 4);
        assert_eq!(next.count(), 1);
    }

    #[test]
    fn test_partial_when_buffer_small() {
        let store = sensor_store();
        let rsp = read_by_type(&store, 1, 0xFFFF, SENSOR, 11).unwrap();
        assert_eq!(rsp.count(), 1);
        assert_eq!(rsp.data.len(), 6);
    }

    #[test]
    fn test_no_match_is_invalid_handle() {
        let store = sensor_store();
        assert_eq!(
            read_by_type(&store, 1, 0xFFFF, AttributeType::Uuid16(0x1234), 64),
            Err(AttError::InvalidHandle)
        );
        // Range excludes every match
        assert_eq!(
            read_by_type(&store, 21, 0xFFFF, SENSOR, 64),
            Err(AttError::InvalidHandle)
        );
    }

    #[test]
    fn test_match_without_value_is_invalid_handle() {
        let store: AttributeStore<8> = AttributeStore::new(&DECLARATIONS, &VALUES).unwrap();
        // Characteristic declarations are not in the value table
        assert_eq!(
            read_by_type(&store, 0x0001, 0xFFFF, uuid::CHARACTERISTIC, 64),
            Err(AttError::InvalidHandle)
        );
    }

    #[test]
    fn test_nothing_fits_is_insufficient_resources() {
        let store = sensor_store();
        assert_eq!(
            read_by_type(&store, 1, 0xFFFF, SENSOR, 5),
            Err(AttError::InsufficientResources)
        );
    }
}
