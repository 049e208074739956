//! BLE host task
//!
//! Advertises as "TPUT", accepts one central at a time and feeds every link
//! and GATT event into the [`ThroughputServer`]. While a connection is up the
//! notification pump runs alongside the event loop on the same connection.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Delay, Duration, Instant, Timer};
use trouble_host::prelude::*;

use crate::ble::{GattNotifier, ThroughputService};
use crate::config::throughput::NOTIFICATION_DATA_SIZE;
use crate::config::{advertising, connection, gatt};
use crate::connection::{DisconnectReason, Effect, Effects, PeerAddress, Phy};
use crate::context::ThroughputContext;
use crate::gatt::{handles, AttError};
use crate::server::{LinkEvent, ThroughputServer, WriteKind};
use crate::throughput::NotificationPump;

/// Number of maximum concurrent connections
const CONNECTIONS_MAX: usize = 1;
/// Number of L2CAP channels
const L2CAP_CHANNELS_MAX: usize = 3;

/// GATT server exposing the throughput service
#[gatt_server(mutex_type = CriticalSectionRawMutex)]
struct TputServer {
    throughput: ThroughputService,
}

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

/// Stack-assigned handles of the throughput characteristics
struct HandleMap {
    notify_value: u16,
    notify_cccd: Option<u16>,
    writeme_value: u16,
}

impl HandleMap {
    fn new(service: &ThroughputService) -> Self {
        Self {
            notify_value: service.notify.handle,
            notify_cccd: service.notify.cccd_handle,
            writeme_value: service.writeme.handle,
        }
    }

    /// Translate a stack handle into the throughput database handle
    fn local(&self, handle: u16) -> Option<u16> {
        if handle == self.notify_value {
            Some(handles::NOTIFY_VALUE)
        } else if Some(handle) == self.notify_cccd {
            Some(handles::NOTIFY_CLIENT_CONFIG)
        } else if handle == self.writeme_value {
            Some(handles::WRITEME_VALUE)
        } else {
            None
        }
    }
}

fn att_error_code(error: AttError) -> AttErrorCode {
    match error {
        AttError::InvalidHandle => AttErrorCode::INVALID_HANDLE,
        AttError::InvalidOffset => AttErrorCode::INVALID_OFFSET,
        AttError::InvalidAttributeLength => AttErrorCode::INVALID_ATTRIBUTE_VALUE_LENGTH,
        AttError::InsufficientResources => AttErrorCode::INSUFFICIENT_RESOURCES,
    }
}

fn phy(kind: PhyKind) -> Phy {
    match kind {
        PhyKind::Le1M => Phy::Le1M,
        PhyKind::Le2M => Phy::Le2M,
        _ => Phy::LeCoded,
    }
}

fn peer_address<P: PacketPool>(conn: &Connection<'_, P>) -> PeerAddress {
    let mut bytes = [0u8; 6];
    let raw = conn.peer_address();
    let raw = raw.raw();
    // Over the air the address is little endian
    for (dst, src) in bytes.iter_mut().zip(raw.iter().rev()) {
        *dst = *src;
    }
    PeerAddress(bytes)
}

/// Carry out the requests the server returned for the link stack
async fn apply_effects<C: Controller, P: PacketPool>(
    stack: &Stack<'_, C, P>,
    conn: &Connection<'_, P>,
    effects: &Effects,
) {
    for effect in effects {
        match *effect {
            Effect::RequestPhy2M { peer } => {
                log::debug!("BLE: requesting 2M PHY with {}", peer);
                if conn.set_phy(stack, PhyKind::Le2M).await.is_err() {
                    log::warn!("BLE: PHY update request failed");
                }
            }
            Effect::UpdateConnectionParams {
                peer,
                interval_min,
                interval_max,
                latency,
                supervision_timeout,
            } => {
                log::debug!("BLE: requesting connection parameters from {}", peer);
                let unit_us = u64::from(connection::CONN_INTERVAL_UNIT_US);
                let params = ConnectParams {
                    min_connection_interval: Duration::from_micros(u64::from(interval_min) * unit_us),
                    max_connection_interval: Duration::from_micros(u64::from(interval_max) * unit_us),
                    max_latency: latency,
                    supervision_timeout: Duration::from_millis(
                        u64::from(supervision_timeout)
                            * u64::from(connection::SUPERVISION_TIMEOUT_UNIT_MS),
                    ),
                    ..Default::default()
                };
                if conn.update_connection_params(stack, &params).await.is_err() {
                    log::warn!("BLE: connection parameter update failed");
                }
            }
            // The advertising loop restarts as soon as the connection ends
            Effect::ResumeAdvertising => log::debug!("BLE: advertising will resume"),
        }
    }
}

/// Copy a store value into the stack's table so `accept` serves it
fn mirror_value(gatt_server: &TputServer, handle: u16, value: &[u8]) -> Result<(), AttError> {
    if handle != handles::NOTIFY_VALUE {
        // The stack keeps the enable flag per connection and serves it itself
        return Ok(());
    }
    let mut buf = [0u8; NOTIFICATION_DATA_SIZE];
    let len = value.len().min(buf.len());
    buf[..len].copy_from_slice(&value[..len]);
    gatt_server
        .set(&gatt_server.throughput.notify, &buf)
        .map_err(|_| AttError::InsufficientResources)
}

/// Handle one GATT request against the throughput server
fn dispatch_gatt<P: PacketPool>(
    server: &mut ThroughputServer<'_>,
    gatt_server: &TputServer,
    map: &HandleMap,
    event: GattEvent<'_, '_, P>,
) {
    match event {
        GattEvent::Write(write_event) => {
            let Some(handle) = map.local(write_event.handle()) else {
                let _ = write_event.accept();
                return;
            };
            // The stack answers requests and commands alike on accept and
            // does not expose the opcode
            let outcome = server.handle_event(
                LinkEvent::Write {
                    handle,
                    value: write_event.data(),
                    kind: WriteKind::Request,
                },
                now_ms(),
            );
            match outcome.status {
                Ok(()) => {
                    let _ = write_event.accept();
                }
                Err(e) => {
                    let _ = write_event.reject(att_error_code(e));
                }
            }
        }
        GattEvent::Read(read_event) => {
            let status = match map.local(read_event.handle()) {
                Some(handle) => server
                    .on_read(handle, 0, usize::from(gatt::LOCAL_MAX_MTU - 1))
                    .and_then(|value| mirror_value(gatt_server, handle, value)),
                None => Ok(()),
            };
            match status {
                Ok(()) => {
                    let _ = read_event.accept();
                }
                Err(e) => {
                    let _ = read_event.reject(att_error_code(e));
                }
            }
        }
        GattEvent::Other(other_event) => {
            let _ = other_event.accept();
        }
    }
}

/// Main BLE task that manages the Bluetooth stack and connections
///
/// This task:
/// 1. Starts advertising as "TPUT"
/// 2. Reports connect, disconnect, PHY and parameter changes to the server
/// 3. Routes writes to the enable flag and the write target
/// 4. Runs the notification pump while connected
pub async fn ble_task<C: Controller>(
    controller: C,
    ctx: &'static ThroughputContext,
    mut server: ThroughputServer<'static>,
    device_id: [u8; 3],
) {
    log::info!("BLE: Starting as '{}'", advertising::DEVICE_NAME);

    // Create BLE host resources
    let mut resources: HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX> =
        HostResources::new();

    // Build the BLE stack with address derived from device ID
    let stack = trouble_host::new(controller, &mut resources).set_random_address(
        Address::random([device_id[0], device_id[1], device_id[2], 0x1E, 0x83, 0xE7]),
    );

    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let gap = GapConfig::Peripheral(PeripheralConfig {
        name: advertising::DEVICE_NAME,
        appearance: &appearance::UNKNOWN,
    });
    let gatt_server: TputServer = match TputServer::new_with_config(gap) {
        Ok(s) => s,
        Err(_) => panic!("GATT server registration failed"),
    };
    let map = HandleMap::new(&gatt_server.throughput);

    let runner_task = runner.run();

    let peripheral_task = async {
        let mut adv_data = [0u8; 31];
        let len = match AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                AdStructure::CompleteLocalName(advertising::DEVICE_NAME.as_bytes()),
            ],
            &mut adv_data,
        ) {
            Ok(l) => l,
            Err(_) => return,
        };

        loop {
            let advertiser = match peripheral
                .advertise(
                    &Default::default(),
                    Advertisement::ConnectableScannableUndirected {
                        adv_data: &adv_data[..len],
                        scan_data: &[],
                    },
                )
                .await
            {
                Ok(a) => a,
                Err(_) => {
                    Timer::after_millis(100).await;
                    continue;
                }
            };
            server.handle_event(LinkEvent::AdvertisingChanged { advertising: true }, now_ms());

            let acceptor = match advertiser.accept().await {
                Ok(a) => a,
                Err(_) => continue,
            };
            let conn = match acceptor.with_attribute_server(&*gatt_server) {
                Ok(c) => c,
                Err(_) => continue,
            };

            let connection_handle = conn.raw().handle().raw();
            let outcome = server.handle_event(
                LinkEvent::Connected {
                    peer: peer_address(conn.raw()),
                    connection_handle,
                },
                now_ms(),
            );
            server.handle_event(LinkEvent::AdvertisingChanged { advertising: false }, now_ms());
            apply_effects(&stack, conn.raw(), &outcome.effects).await;

            let events = async {
                loop {
                    // While the gate is closed, retry once per pacing interval
                    let event = if ctx.gate.is_open() {
                        conn.next().await
                    } else {
                        let retry = Timer::after_millis(u64::from(ctx.config().pump.active_pacing_ms));
                        match select(conn.next(), retry).await {
                            Either::First(event) => event,
                            Either::Second(()) => {
                                server.handle_event(
                                    LinkEvent::CongestionChanged { congested: false },
                                    now_ms(),
                                );
                                continue;
                            }
                        }
                    };

                    match event {
                        GattConnectionEvent::Disconnected { reason } => {
                            let outcome = server.handle_event(
                                LinkEvent::Disconnected {
                                    connection_handle,
                                    reason: DisconnectReason(reason.into_inner()),
                                },
                                now_ms(),
                            );
                            apply_effects(&stack, conn.raw(), &outcome.effects).await;
                            break;
                        }
                        GattConnectionEvent::PhyUpdated { tx_phy, rx_phy } => {
                            let outcome = server.handle_event(
                                LinkEvent::PhyUpdated {
                                    rx_phy: phy(rx_phy),
                                    tx_phy: phy(tx_phy),
                                },
                                now_ms(),
                            );
                            apply_effects(&stack, conn.raw(), &outcome.effects).await;
                        }
                        GattConnectionEvent::ConnectionParamsUpdated {
                            conn_interval,
                            peripheral_latency,
                            supervision_timeout,
                        } => {
                            let unit_us = u64::from(connection::CONN_INTERVAL_UNIT_US);
                            let unit_ms = u64::from(connection::SUPERVISION_TIMEOUT_UNIT_MS);
                            server.handle_event(
                                LinkEvent::ConnectionParamsUpdated {
                                    interval: (conn_interval.as_micros() / unit_us) as u16,
                                    latency: peripheral_latency,
                                    supervision_timeout: (supervision_timeout.as_millis() / unit_ms)
                                        as u16,
                                },
                                now_ms(),
                            );
                        }
                        GattConnectionEvent::Gatt { event } => {
                            dispatch_gatt(&mut server, &gatt_server, &map, event);
                        }
                        _ => {}
                    }
                }
            };

            let mut pump = NotificationPump::new(ctx);
            let mut notifier = GattNotifier::new(&gatt_server.throughput.notify, &conn);
            let mut delay = Delay;
            let pumping = pump.run(&mut notifier, &mut delay);

            // The event loop ends on disconnect, which also drops the pump
            select(events, pumping).await;
        }
    };

    select(runner_task, peripheral_task).await;
}
