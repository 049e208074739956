//! Attribute value store
//!
//! A fixed arena of value slots addressed by handle. Slots are created once
//! from the static database and never removed; only write dispatch mutates
//! them.

use crate::config::gatt::MAX_VALUE_LEN;
use crate::gatt::database::{AttributeType, Declaration, ValueSpec};
use crate::gatt::status::{AttError, DatabaseError};
use heapless::Vec;

/// One addressable value
#[derive(Debug, Clone)]
pub struct AttributeEntry {
    handle: u16,
    data: [u8; MAX_VALUE_LEN],
    max_len: usize,
    cur_len: usize,
}

impl AttributeEntry {
    pub fn handle(&self) -> u16 {
        self.handle
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Current value length (never above `max_len`)
    pub fn len(&self) -> usize {
        self.cur_len
    }

    pub fn is_empty(&self) -> bool {
        self.cur_len == 0
    }

    /// Current value bytes
    pub fn value(&self) -> &[u8] {
        &self.data[..self.cur_len]
    }

    fn overwrite(&mut self, value: &[u8]) {
        // Zero the whole slot so shorter writes never expose stale bytes
        self.data[..self.max_len].fill(0);
        self.data[..value.len()].copy_from_slice(value);
        self.cur_len = value.len();
    }
}

/// Fixed table of attribute values plus the declaration list used for
/// type-scoped lookups.
pub struct AttributeStore<const N: usize> {
    entries: Vec<AttributeEntry, N>,
    declarations: &'static [Declaration],
}

impl<const N: usize> AttributeStore<N> {
    /// Build the store from the static tables.
    ///
    /// Fails if the tables are inconsistent; callers treat that as fatal.
    pub fn new(
        declarations: &'static [Declaration],
        values: &[ValueSpec],
    ) -> Result<Self, DatabaseError> {
        for pair in declarations.windows(2) {
            if pair[1].handle <= pair[0].handle {
                return Err(DatabaseError::Unordered(pair[1].handle));
            }
        }

        let mut entries: Vec<AttributeEntry, N> = Vec::new();
        for spec in values {
            if entries.iter().any(|e| e.handle == spec.handle) {
                return Err(DatabaseError::DuplicateHandle(spec.handle));
            }
            if spec.max_len > MAX_VALUE_LEN || spec.initial.len() > spec.max_len {
                return Err(DatabaseError::ValueTooLong(spec.handle));
            }

            let mut entry = AttributeEntry {
                handle: spec.handle,
                data: [0u8; MAX_VALUE_LEN],
                max_len: spec.max_len,
                cur_len: 0,
            };
            entry.overwrite(spec.initial);
            entries.push(entry).map_err(|_| DatabaseError::TableFull)?;
        }

        Ok(Self {
            entries,
            declarations,
        })
    }

    /// Look up the value slot for a handle
    pub fn find(&self, handle: u16) -> Result<&AttributeEntry, AttError> {
        self.entries
            .iter()
            .find(|e| e.handle == handle)
            .ok_or(AttError::InvalidHandle)
    }

    fn find_mut(&mut self, handle: u16) -> Result<&mut AttributeEntry, AttError> {
        self.entries
            .iter_mut()
            .find(|e| e.handle == handle)
            .ok_or(AttError::InvalidHandle)
    }

    /// Read up to `max_len_requested` bytes starting at `offset`.
    pub fn read(
        &self,
        handle: u16,
        offset: usize,
        max_len_requested: usize,
    ) -> Result<&[u8], AttError> {
        let entry = self.find(handle)?;
        if offset >= entry.cur_len {
            return Err(AttError::InvalidOffset);
        }

        let to_send = max_len_requested.min(entry.cur_len - offset);
        Ok(&entry.data[offset..offset + to_send])
    }

    /// Replace the value at `handle`.
    ///
    /// Values longer than the slot's maximum are rejected and leave the
    /// entry untouched.
    pub fn write(&mut self, handle: u16, value: &[u8]) -> Result<(), AttError> {
        let entry = self.find_mut(handle)?;
        if value.len() > entry.max_len {
            return Err(AttError::InvalidAttributeLength);
        }

        entry.overwrite(value);
        Ok(())
    }

    /// Handles in `[start_handle, end_handle]` whose type equals `filter`,
    /// in ascending order.
    ///
    /// The iterator is lazy; a query can be resumed by calling this again
    /// with `start_handle` one past the last handle consumed.
    pub fn find_range(
        &self,
        start_handle: u16,
        end_handle: u16,
        filter: AttributeType,
    ) -> FindRange<'_> {
        FindRange {
            declarations: self.declarations.iter(),
            start_handle,
            end_handle,
            filter,
        }
    }
}

/// Lazy iterator returned by [`AttributeStore::find_range`]
pub struct FindRange<'a> {
    declarations: core::slice::Iter<'a, Declaration>,
    start_handle: u16,
    end_handle: u16,
    filter: AttributeType,
}

impl Iterator for FindRange<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        for decl in self.declarations.by_ref() {
            if decl.handle < self.start_handle {
                continue;
            }
            if decl.handle > self.end_handle {
                return None;
            }
            if decl.attr_type == self.filter {
                return Some(decl.handle);
            }
        }
        None
    }
}
