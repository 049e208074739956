//! GATT attribute table and request handling
//!
//! Provides the static database, the value store, and the read-by-type
//! response builder used by the throughput server.

pub mod database;
pub mod read_by_type;
pub mod status;
pub mod store;

pub use database::{handles, AttributeType};
pub use read_by_type::{read_by_type, ReadByTypeResponse};
pub use status::{AttError, DatabaseError};
pub use store::{AttributeEntry, AttributeStore};

/// Store sized for the throughput database
pub type ThroughputStore = AttributeStore<{ crate::config::gatt::MAX_ATTRIBUTES }>;
