//! BLE client for exercising the TPUT throughput service.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::tests::pattern_mismatch;

/// Throughput service UUIDs
const THROUGHPUT_SERVICE_UUID: Uuid = Uuid::from_u128(0x1b2f0001_4a0d_4c7b_9e7c_52a3b6f9c001);
const NOTIFY_UUID: Uuid = Uuid::from_u128(0x1b2f0002_4a0d_4c7b_9e7c_52a3b6f9c001); // Notify from device
const WRITEME_UUID: Uuid = Uuid::from_u128(0x1b2f0003_4a0d_4c7b_9e7c_52a3b6f9c001); // Write to device

/// Notification statistics gathered since the last reset.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationStats {
    pub packets: u64,
    pub bytes: u64,
    /// Packets whose payload did not follow the 0, 1, 2, ... pattern
    pub bad_packets: u64,
    /// Length of the most recent packet
    pub last_len: usize,
}

/// BLE client for the throughput device.
pub struct ThroughputClient {
    peripheral: Peripheral,
    notify_char: Characteristic,
    writeme_char: Characteristic,
    stats: Arc<Mutex<NotificationStats>>,
}

impl ThroughputClient {
    /// Scan for a device by name and connect.
    pub async fn connect_by_name(name: &str, scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        adapter
            .start_scan(ScanFilter {
                services: vec![THROUGHPUT_SERVICE_UUID],
            })
            .await?;
        let peripheral = Self::find_device_by_name(&adapter, name, scan_timeout).await?;
        adapter.stop_scan().await?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();

        let notify_char = characteristics
            .iter()
            .find(|c| c.uuid == NOTIFY_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("Notify characteristic not found"))?;

        let writeme_char = characteristics
            .iter()
            .find(|c| c.uuid == WRITEME_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("WriteMe characteristic not found"))?;

        let stats = Arc::new(Mutex::new(NotificationStats::default()));

        // Count every notification as it arrives
        let stats_clone = stats.clone();
        let peripheral_clone = peripheral.clone();
        tokio::spawn(async move {
            let mut stream = match peripheral_clone.notifications().await {
                Ok(s) => s,
                Err(_) => return,
            };

            while let Some(data) = stream.next().await {
                if data.uuid == NOTIFY_UUID {
                    let mut stats = stats_clone.lock().await;
                    stats.packets += 1;
                    stats.bytes += data.value.len() as u64;
                    stats.last_len = data.value.len();
                    if pattern_mismatch(&data.value).is_some() {
                        stats.bad_packets += 1;
                    }
                }
            }
        });

        Ok(Self {
            peripheral,
            notify_char,
            writeme_char,
            stats,
        })
    }

    /// Find a device by name within the scan timeout.
    async fn find_device_by_name(
        adapter: &Adapter,
        name: &str,
        scan_timeout: Duration,
    ) -> Result<Peripheral> {
        let start = std::time::Instant::now();

        while start.elapsed() < scan_timeout {
            let peripherals = adapter.peripherals().await?;

            for peripheral in peripherals {
                if let Some(props) = peripheral.properties().await? {
                    if props.local_name.as_deref() == Some(name) {
                        return Ok(peripheral);
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("Device '{}' not found within timeout", name))
    }

    /// Write the enable flag so the device starts streaming.
    pub async fn enable_notifications(&self) -> Result<()> {
        self.peripheral.subscribe(&self.notify_char).await?;
        Ok(())
    }

    /// Clear the enable flag.
    pub async fn disable_notifications(&self) -> Result<()> {
        self.peripheral.unsubscribe(&self.notify_char).await?;
        Ok(())
    }

    /// Read the current notify characteristic value.
    pub async fn read_notify_value(&self) -> Result<Vec<u8>> {
        Ok(self.peripheral.read(&self.notify_char).await?)
    }

    /// Write `count` payloads of `len` bytes to the write target.
    pub async fn write_burst(&self, count: usize, len: usize, write_type: WriteType) -> Result<u64> {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let mut written = 0u64;
        for _ in 0..count {
            self.peripheral
                .write(&self.writeme_char, &payload, write_type)
                .await?;
            written += len as u64;
        }
        Ok(written)
    }

    /// Snapshot of the notification statistics.
    pub async fn stats(&self) -> NotificationStats {
        *self.stats.lock().await
    }

    /// Zero the notification statistics.
    pub async fn reset_stats(&self) {
        *self.stats.lock().await = NotificationStats::default();
    }

    /// Disconnect from the device.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
