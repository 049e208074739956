//! Bluetooth Low Energy glue
//!
//! Binds the throughput server to the TrouBLE host stack: the GATT service
//! definition and the notification transport used by the pump.

pub mod notifier;
pub mod service;

pub use notifier::GattNotifier;
pub use service::ThroughputService;
