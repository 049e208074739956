#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod connection;
pub mod context;
pub mod gatt;
pub mod server;
pub mod throughput;

// Radio glue and executor tasks, only available with the embedded feature
#[cfg(feature = "embedded")]
pub mod ble;
#[cfg(feature = "embedded")]
pub mod tasks;
