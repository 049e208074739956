#![no_std]
#![no_main]

extern crate alloc;

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use ble_throughput_firmware::config::ThroughputConfig;
use ble_throughput_firmware::context::ThroughputContext;
use ble_throughput_firmware::server::ThroughputServer;
use ble_throughput_firmware::tasks;

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

/// Static cell for esp-radio controller (needed for 'static lifetime)
static RADIO_CONTROLLER: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

/// Counters, congestion gate and sample schedule shared by all tasks
static CONTEXT: ThroughputContext = ThroughputContext::new(ThroughputConfig::new());

/// Type alias for the BLE controller
type BleController = trouble_host::prelude::ExternalController<
    esp_radio::ble::controller::BleConnector<'static>,
    10,
>;

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);

    // Initialise heap allocator for BLE support (64KB - BLE requires significant heap)
    esp_alloc::heap_allocator!(size: 64 * 1024);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Read unique device ID from eFuse MAC address (last 3 bytes)
    let mac = esp_hal::efuse::Efuse::read_base_mac_address();
    let device_id: [u8; 3] = [mac[3], mac[4], mac[5]];

    // A malformed attribute table is unrecoverable
    let server = ThroughputServer::new(&CONTEXT).expect("Failed to build GATT database");

    // Initialise esp-radio for BLE support (must be after esp_rtos::start)
    let radio_controller = RADIO_CONTROLLER.init(
        esp_radio::init().expect("Failed to initialize esp-radio")
    );

    // Create BLE connector (ownership is passed to ExternalController)
    let ble_connector = esp_radio::ble::controller::BleConnector::new(
        radio_controller,
        peripherals.BT,
        esp_radio::ble::Config::default(),
    ).expect("Failed to initialize BLE connector");

    // Wrap in ExternalController for trouble-host compatibility
    let controller: BleController = trouble_host::prelude::ExternalController::new(ble_connector);

    // Create and run the embassy executor
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(async_main(spawner, controller, server, device_id));
    })
}

#[embassy_executor::task]
async fn async_main(
    spawner: Spawner,
    ble_controller: BleController,
    server: ThroughputServer<'static>,
    device_id: [u8; 3],
) {
    // Spawn tasks
    spawner.must_spawn(tput_task());
    spawner.must_spawn(ble_host_task(ble_controller, server, device_id));
}

/// Task that logs throughput once per sample window
#[embassy_executor::task]
async fn tput_task() {
    tasks::tput_task(&CONTEXT).await
}

/// Task that manages BLE connectivity
///
/// This task handles advertising, connections, GATT requests and the
/// notification pump for the active connection.
#[embassy_executor::task]
async fn ble_host_task(controller: BleController, server: ThroughputServer<'static>, device_id: [u8; 3]) {
    tasks::ble_task(controller, &CONTEXT, server, device_id).await;
}
