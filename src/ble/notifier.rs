//! Notification transport over a TrouBLE connection

use trouble_host::prelude::*;

use crate::config::throughput::NOTIFICATION_DATA_SIZE;
use crate::throughput::{NotificationTransport, SendError};

/// Sends pump units as notifications on one characteristic
pub struct GattNotifier<'a, 'stack, 'server, P: PacketPool> {
    characteristic: &'a Characteristic<[u8; NOTIFICATION_DATA_SIZE]>,
    conn: &'a GattConnection<'stack, 'server, P>,
    buf: [u8; NOTIFICATION_DATA_SIZE],
}

impl<'a, 'stack, 'server, P: PacketPool> GattNotifier<'a, 'stack, 'server, P> {
    pub fn new(
        characteristic: &'a Characteristic<[u8; NOTIFICATION_DATA_SIZE]>,
        conn: &'a GattConnection<'stack, 'server, P>,
    ) -> Self {
        Self {
            characteristic,
            conn,
            buf: [0u8; NOTIFICATION_DATA_SIZE],
        }
    }
}

impl<P: PacketPool> NotificationTransport for GattNotifier<'_, '_, '_, P> {
    async fn send_unit(&mut self, connection_handle: u16, data: &[u8]) -> Result<(), SendError> {
        if self.conn.raw().handle().raw() != connection_handle {
            return Err(SendError::Transport);
        }

        let len = data.len().min(self.buf.len());
        self.buf[..len].copy_from_slice(&data[..len]);

        match self.characteristic.notify(self.conn, &self.buf).await {
            Ok(()) => Ok(()),
            // No free TX buffer in the host: treat as link congestion
            Err(Error::OutOfMemory) => Err(SendError::Congested),
            Err(_) => Err(SendError::Transport),
        }
    }
}
