//! Congestion gate
//!
//! Open while the link accepts notifications, closed while the transport
//! reports congestion. Both the congestion callback and a congested send
//! result close it; only the congestion-cleared signal (or a connection
//! reset) reopens it.
//!
//! Every reopen advances an epoch. A producer that saw a congested send
//! result closes the gate only if no reopen happened since it started that
//! send, so a clear that raced ahead of the result is never lost.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Bit 0 of the packed state: gate closed. The remaining bits hold the epoch.
const CLOSED: u32 = 1;
const EPOCH_STEP: u32 = 2;

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Open,
    Closed,
}

/// Binary backpressure gate between the transport and the notification pump
pub struct CongestionGate {
    state: AtomicU32,
    changed: Signal<CriticalSectionRawMutex, ()>,
}

impl CongestionGate {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
            changed: Signal::new(),
        }
    }

    pub fn state(&self) -> GateState {
        if self.state.load(Ordering::Acquire) & CLOSED != 0 {
            GateState::Closed
        } else {
            GateState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == GateState::Open
    }

    /// Number of reopens so far (wrapping)
    pub fn epoch(&self) -> u32 {
        self.state.load(Ordering::Acquire) >> 1
    }

    /// Close the gate. Returns true if it was open.
    pub fn close(&self) -> bool {
        self.state.fetch_or(CLOSED, Ordering::AcqRel) & CLOSED == 0
    }

    /// Close the gate unless it was reopened after `epoch` was read.
    /// Returns true if this call closed it.
    pub fn close_if_epoch(&self, epoch: u32) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s & CLOSED == 0 && s >> 1 == epoch).then_some(s | CLOSED)
            })
            .is_ok()
    }

    /// Open the gate and wake a waiting producer. Returns true if it was closed.
    pub fn open(&self) -> bool {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                Some((s & !CLOSED).wrapping_add(EPOCH_STEP))
            })
            .unwrap_or_else(|s| s);
        self.changed.signal(());
        prev & CLOSED != 0
    }

    /// Apply the transport's congestion signal
    pub fn set_congested(&self, congested: bool) -> bool {
        if congested {
            self.close()
        } else {
            self.open()
        }
    }

    /// Wake a parked producer without opening the gate, so it re-checks
    /// whether it still has anything to send.
    pub fn wake(&self) {
        self.changed.signal(());
    }

    /// Wait until the gate is open
    pub async fn wait_open(&self) {
        self.wait_open_while(|| true).await
    }

    /// Wait until the gate is open or `keep_waiting` turns false.
    ///
    /// `keep_waiting` is re-evaluated on every reopen and every [`wake`](Self::wake).
    /// Stale wake-ups only cost one extra check.
    pub async fn wait_open_while<F: FnMut() -> bool>(&self, mut keep_waiting: F) {
        while !self.is_open() && keep_waiting() {
            self.changed.wait().await;
        }
    }
}

impl Default for CongestionGate {
    fn default() -> Self {
        Self::new()
    }
}
