//! Throughput GATT server
//!
//! Single entry point for everything the link stack reports: lifecycle and
//! congestion events go through [`ThroughputServer::handle_event`], which
//! returns the status to acknowledge plus any requests for the stack.
//! Read requests are answered directly from the attribute store.
//!
//! Two handles have side effects on write:
//! - the enable flag (CCCD of the notify characteristic) switches the pump
//!   on or off; disabling also clears the outbound counter
//! - the write-target value adds the written length to the inbound counter

use crate::config::gatt::CLIENT_CONFIG_NOTIFICATION;
use crate::connection::{ConnectionLifecycle, DisconnectReason, Effects, PeerAddress, Phy};
use crate::context::ThroughputContext;
use crate::gatt::database::{handles, DECLARATIONS, VALUES};
use crate::gatt::{read_by_type, AttError, AttributeType, DatabaseError, ReadByTypeResponse, ThroughputStore};

/// ATT write opcode family
///
/// Only [`WriteKind::Request`] is acknowledged. The TrouBLE host handles the
/// acknowledgment itself and does not report the opcode, so the device glue
/// always dispatches `Request`; the distinction matters to stacks that do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Write request; acknowledged with a write response
    Request,
    /// Write command (without response)
    Command,
    /// Signed write command
    SignedCommand,
}

/// Events delivered by the link stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent<'d> {
    Connected {
        peer: PeerAddress,
        connection_handle: u16,
    },
    Disconnected {
        connection_handle: u16,
        reason: DisconnectReason,
    },
    CongestionChanged {
        congested: bool,
    },
    MtuRequested {
        client_mtu: u16,
    },
    PhyUpdated {
        rx_phy: Phy,
        tx_phy: Phy,
    },
    ConnectionParamsUpdated {
        interval: u16,
        latency: u16,
        supervision_timeout: u16,
    },
    AdvertisingChanged {
        advertising: bool,
    },
    Write {
        handle: u16,
        value: &'d [u8],
        kind: WriteKind,
    },
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Status surfaced to the peer (error response on `Err`)
    pub status: Result<(), AttError>,
    /// Whether a write response must be sent
    pub respond: bool,
    /// MTU to answer an exchange request with
    pub mtu: Option<u16>,
    /// Requests for the link stack
    pub effects: Effects,
}

impl Outcome {
    fn done() -> Self {
        Self {
            status: Ok(()),
            respond: false,
            mtu: None,
            effects: Effects::new(),
        }
    }

    fn with_effects(effects: Effects) -> Self {
        Self {
            effects,
            ..Self::done()
        }
    }
}

/// Attribute dispatch and connection handling for the throughput service
pub struct ThroughputServer<'a> {
    ctx: &'a ThroughputContext,
    store: ThroughputStore,
    lifecycle: ConnectionLifecycle<'a>,
}

impl<'a> ThroughputServer<'a> {
    /// Build the server over the static throughput database
    pub fn new(ctx: &'a ThroughputContext) -> Result<Self, DatabaseError> {
        let store = ThroughputStore::new(&DECLARATIONS, &VALUES)?;
        Ok(Self::with_store(ctx, store))
    }

    pub fn with_store(ctx: &'a ThroughputContext, store: ThroughputStore) -> Self {
        Self {
            ctx,
            store,
            lifecycle: ConnectionLifecycle::new(ctx),
        }
    }

    pub fn store(&self) -> &ThroughputStore {
        &self.store
    }

    pub fn lifecycle(&self) -> &ConnectionLifecycle<'a> {
        &self.lifecycle
    }

    /// Dispatch one event. Never blocks.
    pub fn handle_event(&mut self, event: LinkEvent<'_>, now_ms: u64) -> Outcome {
        match event {
            LinkEvent::Connected {
                peer,
                connection_handle,
            } => {
                let effects = self.lifecycle.on_connected(peer, connection_handle, now_ms);
                if self.ctx.notifications_enabled() {
                    log::info!("Notifications already enabled, resuming");
                }
                Outcome::with_effects(effects)
            }
            LinkEvent::Disconnected {
                connection_handle,
                reason,
            } => Outcome::with_effects(self.lifecycle.on_disconnected(connection_handle, reason)),
            LinkEvent::CongestionChanged { congested } => {
                if self.ctx.gate.set_congested(congested) {
                    log::debug!("congestion {}", if congested { "on" } else { "off" });
                }
                Outcome::done()
            }
            LinkEvent::MtuRequested { client_mtu } => Outcome {
                mtu: Some(self.lifecycle.negotiate_mtu(client_mtu)),
                ..Outcome::done()
            },
            LinkEvent::PhyUpdated { rx_phy, tx_phy } => {
                Outcome::with_effects(self.lifecycle.on_phy_updated(rx_phy, tx_phy))
            }
            LinkEvent::ConnectionParamsUpdated {
                interval,
                latency,
                supervision_timeout,
            } => {
                self.lifecycle
                    .on_connection_params_updated(interval, latency, supervision_timeout);
                Outcome::done()
            }
            LinkEvent::AdvertisingChanged { advertising } => {
                self.lifecycle.on_advertising_changed(advertising);
                Outcome::done()
            }
            LinkEvent::Write {
                handle,
                value,
                kind,
            } => {
                let status = self.on_write(handle, value);
                Outcome {
                    respond: kind == WriteKind::Request && status.is_ok(),
                    status,
                    ..Outcome::done()
                }
            }
        }
    }

    /// Store a written value and apply its side effects
    pub fn on_write(&mut self, handle: u16, value: &[u8]) -> Result<(), AttError> {
        if let Err(e) = self.store.write(handle, value) {
            log::warn!("write to {:#06x} ({} bytes) failed: {:?}", handle, value.len(), e);
            return Err(e);
        }

        match handle {
            handles::NOTIFY_CLIENT_CONFIG => {
                let enabled = value
                    .first()
                    .is_some_and(|flags| flags & CLIENT_CONFIG_NOTIFICATION != 0);
                self.ctx.set_notifications_enabled(enabled);
                if enabled {
                    log::info!("Notifications Enabled");
                } else {
                    log::info!("Notifications Disabled");
                    self.ctx.counters.reset_outbound();
                }
            }
            handles::WRITEME_VALUE => self.ctx.counters.add_inbound(value.len() as u32),
            _ => {}
        }
        Ok(())
    }

    /// Serve a read or read-blob request
    pub fn on_read(&self, handle: u16, offset: usize, max_len: usize) -> Result<&[u8], AttError> {
        log::debug!("read: handle {:#06x} offset {} len {}", handle, offset, max_len);
        self.store.read(handle, offset, max_len).map_err(|e| {
            log::warn!("read of {:#06x} failed: {:?}", handle, e);
            e
        })
    }

    /// Serve a read-by-type request
    pub fn on_read_by_type(
        &self,
        start_handle: u16,
        end_handle: u16,
        attr_type: AttributeType,
        max_response_len: usize,
    ) -> Result<ReadByTypeResponse, AttError> {
        read_by_type(&self.store, start_handle, end_handle, attr_type, max_response_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThroughputConfig;
    use crate::connection::Effect;
    use crate::gatt::database::uuid;
    use crate::throughput::pump::{NotificationPump, PumpState};
    use crate::throughput::reporter::RateReporter;
    use crate::throughput::transport::mock::MockTransport;
    use futures::executor::block_on;

    const PEER: PeerAddress = PeerAddress([1, 2, 3, 4, 5, 6]);
    const CONN: u16 = 0x40;

    fn connect(server: &mut ThroughputServer<'_>, now_ms: u64) -> Outcome {
        server.handle_event(
            LinkEvent::Connected {
                peer: PEER,
                connection_handle: CONN,
            },
            now_ms,
        )
    }

    fn write(server: &mut ThroughputServer<'_>, handle: u16, value: &[u8]) -> Outcome {
        server.handle_event(
            LinkEvent::Write {
                handle,
                value,
                kind: WriteKind::Request,
            },
            0,
        )
    }

    fn enable(server: &mut ThroughputServer<'_>, on: bool) -> Outcome {
        let flags = if on { [0x01, 0x00] } else { [0x00, 0x00] };
        write(server, handles::NOTIFY_CLIENT_CONFIG, &flags)
    }

    #[test]
    fn test_connect_outcome() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();

        let outcome = connect(&mut server, 0);
        assert_eq!(outcome.status, Ok(()));
        assert_eq!(outcome.effects.as_slice(), &[Effect::RequestPhy2M { peer: PEER }]);
        assert!(ctx.is_connected());
    }

    #[test]
    fn test_enable_flag_write() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();
        connect(&mut server, 0);

        let outcome = enable(&mut server, true);
        assert_eq!(outcome.status, Ok(()));
        assert!(outcome.respond);
        assert!(ctx.notifications_enabled());
        assert_eq!(ctx.pump_target(), Some(CONN));
        assert_eq!(
            server.on_read(handles::NOTIFY_CLIENT_CONFIG, 0, 2).unwrap(),
            &[0x01, 0x00]
        );

        ctx.counters.add_outbound(1000);
        ctx.counters.add_inbound(1000);
        enable(&mut server, false);
        assert!(!ctx.notifications_enabled());
        assert_eq!(ctx.counters.outbound(), 0);
        // Inbound accounting is independent of the enable flag
        assert_eq!(ctx.counters.inbound(), 1000);
    }

    #[test]
    fn test_write_target_counts_inbound() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();
        connect(&mut server, 0);

        let outcome = server.handle_event(
            LinkEvent::Write {
                handle: handles::WRITEME_VALUE,
                value: &[0x55; 244],
                kind: WriteKind::Command,
            },
            0,
        );
        assert_eq!(outcome.status, Ok(()));
        assert!(!outcome.respond);
        assert_eq!(ctx.counters.inbound(), 244);

        // Rejected writes are not counted
        let outcome = write(&mut server, handles::WRITEME_VALUE, &[0x55; 245]);
        assert_eq!(outcome.status, Err(AttError::InvalidAttributeLength));
        assert!(!outcome.respond);
        assert_eq!(ctx.counters.inbound(), 244);

        // Passive handles have no side effects
        write(&mut server, handles::APPEARANCE_VALUE, &[0x40, 0x00]);
        assert_eq!(ctx.counters.inbound(), 244);
    }

    #[test]
    fn test_write_unknown_handle() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();

        let outcome = write(&mut server, 0x0100, &[1]);
        assert_eq!(outcome.status, Err(AttError::InvalidHandle));
    }

    #[test]
    fn test_reads() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let server = ThroughputServer::new(&ctx).unwrap();

        assert_eq!(server.on_read(handles::DEVICE_NAME_VALUE, 0, 22).unwrap(), b"TPUT");
        assert_eq!(
            server.on_read(handles::DEVICE_NAME_VALUE, 4, 22),
            Err(AttError::InvalidOffset)
        );
        assert_eq!(server.on_read(0x0100, 0, 22), Err(AttError::InvalidHandle));

        let pattern = server.on_read(handles::NOTIFY_VALUE, 0, 246).unwrap();
        assert_eq!(pattern.len(), 244);
        assert!(pattern.iter().enumerate().all(|(i, &b)| b == i as u8));

        let rsp = server
            .on_read_by_type(0x0001, 0xFFFF, uuid::CLIENT_CHAR_CONFIG, 22)
            .unwrap();
        assert_eq!(rsp.data.as_slice(), &[0x09, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_mtu_exchange() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();
        connect(&mut server, 0);

        let outcome = server.handle_event(LinkEvent::MtuRequested { client_mtu: 517 }, 0);
        assert_eq!(outcome.mtu, Some(247));
        assert_eq!(server.lifecycle().state().mtu, 247);
    }

    #[test]
    fn test_disable_stops_pump_within_one_cycle() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();
        let mut pump = NotificationPump::new(&ctx);
        let mut transport = MockTransport::new();

        connect(&mut server, 0);
        enable(&mut server, true);
        block_on(pump.run_cycle(&mut transport));
        assert_eq!(pump.state(), PumpState::Sending);
        let sent = transport.attempts();

        enable(&mut server, false);
        block_on(pump.run_cycle(&mut transport));
        assert_eq!(pump.state(), PumpState::Idle);

        for _ in 0..5 {
            block_on(pump.run_cycle(&mut transport));
        }
        assert_eq!(transport.attempts(), sent);

        enable(&mut server, true);
        block_on(pump.run_cycle(&mut transport));
        assert_eq!(transport.attempts(), sent + 10);
    }

    #[test]
    fn test_enable_before_connect_starts_on_connect() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();
        let mut pump = NotificationPump::new(&ctx);
        let mut transport = MockTransport::new();

        enable(&mut server, true);
        block_on(pump.run_cycle(&mut transport));
        assert_eq!(pump.state(), PumpState::Idle);

        connect(&mut server, 0);
        block_on(pump.run_cycle(&mut transport));
        assert_eq!(pump.state(), PumpState::Sending);
    }

    #[test]
    fn test_congestion_event_gates_pump() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();
        let mut pump = NotificationPump::new(&ctx);
        let mut transport = MockTransport::new();
        connect(&mut server, 0);
        enable(&mut server, true);

        server.handle_event(LinkEvent::CongestionChanged { congested: true }, 0);
        block_on(pump.run_cycle(&mut transport));
        assert_eq!(pump.state(), PumpState::Blocked);
        assert_eq!(transport.attempts(), 0);

        server.handle_event(LinkEvent::CongestionChanged { congested: false }, 0);
        block_on(pump.run_cycle(&mut transport));
        assert_eq!(pump.state(), PumpState::Sending);
        assert_eq!(transport.attempts(), 10);
    }

    #[test]
    fn test_sample_window_report() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();
        let mut pump = NotificationPump::new(&ctx);
        let mut transport = MockTransport::new();
        let reporter = RateReporter::new(&ctx);

        connect(&mut server, 0);
        enable(&mut server, true);
        for _ in 0..10 {
            block_on(pump.run_cycle(&mut transport));
        }
        assert_eq!(transport.attempts(), 100);

        assert!(!ctx.sampler.poll(4999));
        assert!(ctx.sampler.poll(5000));
        let report = reporter.sample();
        assert_eq!(report.outbound_kbps, Some(244 * 100 * 8 / 5000));
        assert_eq!(report.inbound_kbps, None);

        // Next window starts from zero
        assert!(ctx.sampler.poll(10_000));
        assert!(reporter.sample().is_empty());
    }

    #[test]
    fn test_reconnect_resets_counters_and_gate() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut server = ThroughputServer::new(&ctx).unwrap();
        connect(&mut server, 0);
        enable(&mut server, true);
        write(&mut server, handles::WRITEME_VALUE, &[1, 2, 3]);
        ctx.counters.add_outbound(244);
        server.handle_event(LinkEvent::CongestionChanged { congested: true }, 0);

        let outcome = server.handle_event(
            LinkEvent::Disconnected {
                connection_handle: CONN,
                reason: DisconnectReason(0x13),
            },
            100,
        );
        assert_eq!(outcome.effects.as_slice(), &[Effect::ResumeAdvertising]);
        assert!(!ctx.sampler.is_running());

        connect(&mut server, 200);
        assert_eq!(ctx.counters.take(), Default::default());
        assert!(ctx.gate.is_open());
        // The enable flag survives the reconnect
        assert!(ctx.notifications_enabled());
        assert_eq!(ctx.sampler.next_deadline(), Some(5200));
    }
}
