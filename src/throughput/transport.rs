//! Outbound transport interface
//!
//! The link stack is an external collaborator; the pump only needs a way
//! to push one notification and learn whether the link accepted it.

use core::future::Future;

/// Why a notification was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Link buffers are full; retry after congestion clears
    Congested,
    /// Opaque failure reported by the link stack
    Transport,
}

/// Link stack interface used by the notification pump
pub trait NotificationTransport {
    /// Attempt to send one notification on the given connection
    fn send_unit(
        &mut self,
        connection_handle: u16,
        data: &[u8],
    ) -> impl Future<Output = Result<(), SendError>>;
}
