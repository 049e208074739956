//! Connection lifecycle
//!
//! Tracks the single active peer, starts and stops the sample scheduler,
//! and resets per-connection throughput state. Requests to the link stack
//! (PHY switch, parameter update, restart advertising) are returned as
//! [`Effect`]s for the caller to execute.

use core::fmt;

use heapless::Vec;

use crate::config::{connection, gatt};
use crate::context::ThroughputContext;

/// Bluetooth device address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerAddress(pub [u8; 6]);

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// LE physical layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phy {
    Le1M,
    Le2M,
    LeCoded,
}

impl Phy {
    /// Nominal symbol rate in Msym/s (coded PHY reported as 1)
    pub fn megasymbols(self) -> u8 {
        match self {
            Phy::Le2M => 2,
            Phy::Le1M | Phy::LeCoded => 1,
        }
    }
}

/// HCI disconnect reason code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectReason(pub u8);

impl DisconnectReason {
    pub fn name(self) -> &'static str {
        match self.0 {
            0x08 => "connection timeout",
            0x13 => "remote user terminated",
            0x16 => "local host terminated",
            0x22 => "LL response timeout",
            0x3B => "unacceptable connection parameters",
            0x3E => "failed to establish",
            _ => "unknown",
        }
    }
}

/// Advertising / connection mode of the peripheral
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdvertisingMode {
    /// Neither advertising nor connected
    #[default]
    Off,
    /// Advertising, no connection
    Advertising,
    /// Connected, advertising stopped
    Connected,
}

/// Per-connection state; zeroed on disconnect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub peer: PeerAddress,
    pub handle: u16,
    pub is_connected: bool,
    /// Negotiated ATT MTU (0 until exchanged)
    pub mtu: u16,
    /// Negotiated connection interval in microseconds
    pub conn_interval_us: u32,
    pub rx_phy: Option<Phy>,
    pub tx_phy: Option<Phy>,
}

/// Request for the link stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Ask for the 2M PHY in both directions
    RequestPhy2M { peer: PeerAddress },
    /// Ask the central for new connection parameters
    UpdateConnectionParams {
        peer: PeerAddress,
        interval_min: u16,
        interval_max: u16,
        latency: u16,
        supervision_timeout: u16,
    },
    /// Become discoverable again
    ResumeAdvertising,
}

/// Requests produced by one event
pub type Effects = Vec<Effect, 4>;

/// Connect / disconnect handling for the single supported peer
pub struct ConnectionLifecycle<'a> {
    ctx: &'a ThroughputContext,
    state: ConnectionState,
    mode: AdvertisingMode,
}

impl<'a> ConnectionLifecycle<'a> {
    pub fn new(ctx: &'a ThroughputContext) -> Self {
        Self {
            ctx,
            state: ConnectionState::default(),
            mode: AdvertisingMode::Off,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn mode(&self) -> AdvertisingMode {
        self.mode
    }

    /// Reset counters and gate so each connection starts measuring from zero
    fn reset_throughput(&self) {
        self.ctx.counters.reset();
        self.ctx.gate.open();
    }

    pub fn on_connected(&mut self, peer: PeerAddress, handle: u16, now_ms: u64) -> Effects {
        if self.state.is_connected {
            log::warn!(
                "Connected: replacing connection {} with {}",
                self.state.handle,
                handle
            );
        }
        log::info!("Connected : BDA {} Connection ID {}", peer, handle);

        self.state = ConnectionState {
            peer,
            handle,
            is_connected: true,
            ..ConnectionState::default()
        };
        self.mode = AdvertisingMode::Connected;

        self.reset_throughput();
        self.ctx.set_connection(Some(handle));
        self.ctx.sampler.start(now_ms);

        let mut effects = Effects::new();
        let _ = effects.push(Effect::RequestPhy2M { peer });
        effects
    }

    pub fn on_disconnected(&mut self, handle: u16, reason: DisconnectReason) -> Effects {
        let mut effects = Effects::new();
        if !self.state.is_connected || self.state.handle != handle {
            log::warn!("Disconnected: connection {} is not active, ignoring", handle);
            return effects;
        }

        log::info!(
            "Disconnected : BDA {} Connection ID {}, Reason '{}'",
            self.state.peer,
            handle,
            reason.name()
        );

        self.state = ConnectionState::default();
        self.ctx.set_connection(None);
        self.ctx.sampler.stop();
        // Reopening the gate also wakes a pump blocked on congestion
        self.reset_throughput();

        let _ = effects.push(Effect::ResumeAdvertising);
        self.mode = AdvertisingMode::Advertising;
        effects
    }

    /// Record the selected PHYs and request the throughput connection interval
    pub fn on_phy_updated(&mut self, rx_phy: Phy, tx_phy: Phy) -> Effects {
        let mut effects = Effects::new();
        if !self.state.is_connected {
            return effects;
        }

        self.state.rx_phy = Some(rx_phy);
        self.state.tx_phy = Some(tx_phy);
        log::info!(
            "Selected RX PHY - {}M, TX PHY - {}M",
            rx_phy.megasymbols(),
            tx_phy.megasymbols()
        );

        let _ = effects.push(Effect::UpdateConnectionParams {
            peer: self.state.peer,
            interval_min: connection::CONNECTION_INTERVAL,
            interval_max: connection::CONNECTION_INTERVAL + 1,
            latency: connection::CONNECTION_LATENCY,
            supervision_timeout: connection::SUPERVISION_TIMEOUT,
        });
        effects
    }

    /// Record parameters chosen by the central (interval in 1.25 ms units)
    pub fn on_connection_params_updated(
        &mut self,
        interval: u16,
        latency: u16,
        supervision_timeout: u16,
    ) {
        let interval_us = u32::from(interval) * connection::CONN_INTERVAL_UNIT_US;
        self.state.conn_interval_us = interval_us;
        log::info!(
            "Connection parameters: interval {}.{:02} ms, latency {}, supervision timeout {}",
            interval_us / 1000,
            (interval_us % 1000) / 10,
            latency,
            supervision_timeout
        );
    }

    pub fn on_advertising_changed(&mut self, advertising: bool) {
        self.mode = if advertising {
            log::info!("Advertisement Started");
            AdvertisingMode::Advertising
        } else if self.state.is_connected {
            log::info!("Advertisement Stopped");
            AdvertisingMode::Connected
        } else {
            log::info!("Advertisement Stopped");
            AdvertisingMode::Off
        };
    }

    /// Agree on an ATT MTU with the client
    pub fn negotiate_mtu(&mut self, client_mtu: u16) -> u16 {
        let mtu = client_mtu.clamp(gatt::ATT_DEFAULT_MTU, gatt::LOCAL_MAX_MTU);
        log::info!("Client MTU: {}, using {}", client_mtu, mtu);
        self.state.mtu = mtu;
        mtu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThroughputConfig;

    const PEER: PeerAddress = PeerAddress([0x00, 0xA0, 0x50, 0x11, 0x22, 0x33]);

    #[test]
    fn test_connect_starts_sampler() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut lifecycle = ConnectionLifecycle::new(&ctx);

        let effects = lifecycle.on_connected(PEER, 0x40, 1000);

        assert_eq!(effects.as_slice(), &[Effect::RequestPhy2M { peer: PEER }]);
        assert_eq!(ctx.connection_handle(), Some(0x40));
        assert_eq!(ctx.sampler.next_deadline(), Some(6000));
        assert_eq!(lifecycle.mode(), AdvertisingMode::Connected);
        assert!(lifecycle.state().is_connected);
    }

    #[test]
    fn test_disconnect_clears_everything() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut lifecycle = ConnectionLifecycle::new(&ctx);
        lifecycle.on_connected(PEER, 0x40, 0);
        lifecycle.negotiate_mtu(247);
        ctx.counters.add_outbound(100);
        ctx.gate.close();

        let effects = lifecycle.on_disconnected(0x40, DisconnectReason(0x13));

        assert_eq!(effects.as_slice(), &[Effect::ResumeAdvertising]);
        assert_eq!(*lifecycle.state(), ConnectionState::default());
        assert_eq!(ctx.connection_handle(), None);
        assert!(!ctx.sampler.is_running());
        assert_eq!(ctx.counters.outbound(), 0);
        assert!(ctx.gate.is_open());
        assert_eq!(lifecycle.mode(), AdvertisingMode::Advertising);
    }

    #[test]
    fn test_disconnect_unknown_handle_ignored() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut lifecycle = ConnectionLifecycle::new(&ctx);
        lifecycle.on_connected(PEER, 0x40, 0);

        let effects = lifecycle.on_disconnected(0x41, DisconnectReason(0x08));
        assert!(effects.is_empty());
        assert_eq!(ctx.connection_handle(), Some(0x40));
    }

    #[test]
    fn test_phy_update_requests_params() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut lifecycle = ConnectionLifecycle::new(&ctx);
        lifecycle.on_connected(PEER, 0x40, 0);

        let effects = lifecycle.on_phy_updated(Phy::Le2M, Phy::Le2M);
        assert_eq!(
            effects.as_slice(),
            &[Effect::UpdateConnectionParams {
                peer: PEER,
                interval_min: 28,
                interval_max: 29,
                latency: 0,
                supervision_timeout: 1000,
            }]
        );
        assert_eq!(lifecycle.state().tx_phy, Some(Phy::Le2M));

        lifecycle.on_connection_params_updated(28, 0, 1000);
        assert_eq!(lifecycle.state().conn_interval_us, 35_000);
    }

    #[test]
    fn test_mtu_clamped() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut lifecycle = ConnectionLifecycle::new(&ctx);

        assert_eq!(lifecycle.negotiate_mtu(517), 247);
        assert_eq!(lifecycle.negotiate_mtu(10), 23);
        assert_eq!(lifecycle.negotiate_mtu(100), 100);
    }

    #[test]
    fn test_advertising_mode() {
        let ctx = ThroughputContext::new(ThroughputConfig::new());
        let mut lifecycle = ConnectionLifecycle::new(&ctx);

        lifecycle.on_advertising_changed(true);
        assert_eq!(lifecycle.mode(), AdvertisingMode::Advertising);
        lifecycle.on_advertising_changed(false);
        assert_eq!(lifecycle.mode(), AdvertisingMode::Off);

        lifecycle.on_connected(PEER, 1, 0);
        lifecycle.on_advertising_changed(false);
        assert_eq!(lifecycle.mode(), AdvertisingMode::Connected);
    }

    #[test]
    fn test_peer_address_display() {
        let text = std::format!("{}", PEER);
        assert_eq!(text, "00:A0:50:11:22:33");
    }
}
