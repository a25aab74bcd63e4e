//! Integration tests for the Hublink node firmware.
//!
//! Run after flashing the firmware and placing a few files on the SD card.
//! Acts as a collector: reads the catalog, downloads a file and checks the
//! watchdog drops an idle connection.

mod ble_client;
mod protocol;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use ble_client::HublinkClient;
use tests::{print_results, run_all_tests, TestOptions};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Integration tests for Hublink node firmware")]
struct Args {
    /// Advertised name or name prefix of the node
    #[arg(short, long, default_value = "Hublink-")]
    name: String,

    /// BLE scan timeout in seconds
    #[arg(long, default_value = "10")]
    scan_timeout: u64,

    /// File to download (defaults to the first catalog entry)
    #[arg(short, long)]
    file: Option<String>,

    /// Skip the watchdog disconnect test
    #[arg(long)]
    skip_watchdog: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("{}", "Hublink Node Integration Tests".bold());
    println!("Scanning for \"{}\"...", args.name);

    let client = HublinkClient::connect_by_name(
        &args.name,
        Duration::from_secs(args.scan_timeout),
    )
    .await?;
    let local_name = client.local_name().await?.unwrap_or_default();
    println!("{} {}", "Connected!".green(), local_name);

    println!("\nRunning tests...\n");

    let options = TestOptions {
        file: args.file,
        skip_watchdog: args.skip_watchdog,
    };
    let results = run_all_tests(&client, &options).await;
    print_results(&results);

    client.disconnect().await.ok();

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
