//! Throughput integration tests.
//!
//! Connects to a flashed device over BLE, checks the notification stream
//! and the write target, and prints client-side rates to compare with the
//! device log.

mod ble_client;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use ble_client::ThroughputClient;
use tests::TestOptions;

#[derive(Parser)]
#[command(name = "throughput-tests")]
#[command(about = "Integration tests for the BLE throughput firmware")]
struct Args {
    /// BLE device name
    #[arg(long, default_value = "TPUT")]
    ble_name: String,

    /// BLE scan timeout in seconds
    #[arg(long, default_value = "10")]
    scan_timeout: u64,

    /// Notification measurement time in seconds
    #[arg(long, default_value = "5")]
    measure: u64,

    /// Number of writes per write test
    #[arg(long, default_value = "200")]
    write_count: usize,

    /// Bytes per write (must fit the negotiated MTU)
    #[arg(long, default_value = "100")]
    write_len: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("{}", "BLE Throughput Integration Tests".bold());
    println!("Scanning for \"{}\"...", args.ble_name);

    let client = ThroughputClient::connect_by_name(
        &args.ble_name,
        Duration::from_secs(args.scan_timeout),
    )
    .await?;
    println!("{}", "  Connected!".green());

    let options = TestOptions {
        measure: Duration::from_secs(args.measure),
        write_count: args.write_count,
        write_len: args.write_len,
    };

    println!("\n{}", "Running tests...".bold());
    println!();

    let results = tests::run_all_tests(&client, &options).await;
    tests::print_results(&results);

    client.disconnect().await?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
    Ok(())
}
