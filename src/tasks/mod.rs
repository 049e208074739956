//! Executor tasks
//!
//! Plain async functions; the `#[embassy_executor::task]` wrappers live in
//! the binary because tasks cannot be generic.

pub mod ble;
pub mod tput;

pub use ble::ble_task;
pub use tput::tput_task;
