//! Notification pump
//!
//! Streams fixed-size notifications to the connected peer while the enable
//! flag is set, stopping as soon as the link reports congestion.
//!
//! ```text
//!            enable + connected              send -> Congested
//!   Idle ------------------------> Sending ---------------------> Blocked
//!    ^                               ^  |                            |
//!    |   disconnect / disable        |  +-- batch done, pace --+     |
//!    +-------------------------------+                              |
//!    |                               +------- gate reopens ---------+
//!    +--------------------- disconnect / disable -------------------+
//! ```
//!
//! While blocked the pump parks on the gate; disable and disconnect wake it
//! so it drops to idle without waiting for the congestion to clear.
//!
//! Payloads are generated on demand, so nothing is queued while blocked.

use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use crate::config::throughput::NOTIFICATION_DATA_SIZE;
use crate::config::PumpConfig;
use crate::context::ThroughputContext;
use crate::throughput::transport::{NotificationTransport, SendError};

/// Pump state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Notifications disabled or no connection
    Idle,
    /// Enabled, connected, gate open
    Sending,
    /// Enabled, connected, waiting for congestion to clear
    Blocked,
}

/// How the pump suspends after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// Sleep for the given pacing interval
    Delay { ms: u32 },
    /// Wait for the congestion gate to reopen
    UntilGateOpen,
}

/// Producer loop feeding notifications into the transport
pub struct NotificationPump<'a> {
    ctx: &'a ThroughputContext,
    config: PumpConfig,
    state: PumpState,
    payload: Vec<u8, NOTIFICATION_DATA_SIZE>,
}

impl<'a> NotificationPump<'a> {
    pub fn new(ctx: &'a ThroughputContext) -> Self {
        let config = ctx.config().pump;
        let unit_size = config.unit_size.min(NOTIFICATION_DATA_SIZE);

        // Verifiable pattern 0, 1, 2, ... wrapping at 256
        let payload = (0..unit_size).map(|i| i as u8).collect();

        Self {
            ctx,
            config,
            state: PumpState::Idle,
            payload,
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Bytes of one notification
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn transition(&mut self, next: PumpState) {
        if self.state != next {
            log::debug!("pump: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn idle(&mut self) -> Suspend {
        self.transition(PumpState::Idle);
        Suspend::Delay {
            ms: self.config.idle_pacing_ms,
        }
    }

    fn block(&mut self) -> Suspend {
        self.transition(PumpState::Blocked);
        Suspend::UntilGateOpen
    }

    /// Run one cycle: send up to one batch, then tell the caller how to wait.
    pub async fn run_cycle<T: NotificationTransport>(&mut self, transport: &mut T) -> Suspend {
        let Some(connection_handle) = self.ctx.pump_target() else {
            return self.idle();
        };
        if !self.ctx.gate.is_open() {
            return self.block();
        }
        self.transition(PumpState::Sending);

        let unit_len = self.payload.len() as u32;
        for _ in 0..self.config.batch_len {
            // The congestion callback may close the gate between sends
            if !self.ctx.gate.is_open() {
                return self.block();
            }
            // Disconnect or disable mid-batch is picked up on the next send
            if self.ctx.pump_target() != Some(connection_handle) {
                return self.idle();
            }

            let epoch = self.ctx.gate.epoch();
            match transport.send_unit(connection_handle, &self.payload).await {
                Ok(()) => self.ctx.counters.add_outbound(unit_len),
                Err(SendError::Congested) => {
                    // A clear reported while the send was in flight wins
                    self.ctx.gate.close_if_epoch(epoch);
                    if !self.ctx.gate.is_open() {
                        return self.block();
                    }
                }
                Err(SendError::Transport) => {
                    log::warn!("pump: notification failed on connection {}", connection_handle);
                    break;
                }
            }
        }

        Suspend::Delay {
            ms: self.config.active_pacing_ms,
        }
    }

    /// Drive the pump forever, suspending between cycles
    pub async fn run<T: NotificationTransport, D: DelayNs>(
        &mut self,
        transport: &mut T,
        delay: &mut D,
    ) -> ! {
        loop {
            match self.run_cycle(transport).await {
                Suspend::Delay { ms } => delay.delay_ms(ms).await,
                Suspend::UntilGateOpen => {
                    let ctx = self.ctx;
                    ctx.gate
                        .wait_open_while(|| ctx.pump_target().is_some())
                        .await
                }
            }
        }
    }
}
