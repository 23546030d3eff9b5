/*!
 * DASHLINK Control Client
 * Inspect and drive the Bluetooth daemon from a terminal
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::Result;
use clap::{Parser, Subcommand};
use dashlink_bluetooth::protocol::Request;
use dashlink_bluetooth::Snapshot;
use tokio::time::{interval, Duration, MissedTickBehavior};

mod client;
mod view;

use client::DashlinkClient;

#[derive(Parser)]
#[command(name = "dashctl")]
#[command(about = "DASHLINK Bluetooth Control Client")]
struct Cli {
    /// Daemon socket path
    #[arg(short, long, default_value = "/run/dashlink/dashlink.sock")]
    socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show status and now playing
    Status,
    /// List known devices
    Devices,
    /// Toggle device discovery
    Scan,
    /// Pair (if needed) and connect a device
    Pair { path: String },
    /// Disconnect a device
    Disconnect { path: String },
    /// Poll the daemon and print changes
    Watch {
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut client = DashlinkClient::connect(&cli.socket).await?;

    match cli.command {
        Commands::Status => {
            let snapshot = client.snapshot().await?;
            for line in view::render(&snapshot) {
                println!("{}", line);
            }
        }
        Commands::Devices => {
            let snapshot = client.snapshot().await?;
            if snapshot.devices.is_empty() {
                println!("No devices known");
            }
            for (path, device) in &snapshot.devices {
                println!("{}", view::device_line(path, device));
            }
        }
        Commands::Scan => {
            client.command(&Request::ToggleDiscovery).await?;
            println!("Discovery toggle requested");
        }
        Commands::Pair { path } => {
            client.command(&Request::PairAndConnect { path }).await?;
            println!("Pair and connect requested");
        }
        Commands::Disconnect { path } => {
            client.command(&Request::Disconnect { path }).await?;
            println!("Disconnect requested");
        }
        Commands::Watch { interval_ms } => watch(&mut client, interval_ms).await?,
    }

    Ok(())
}

async fn watch(client: &mut DashlinkClient, interval_ms: u64) -> Result<()> {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(50)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last: Option<Snapshot> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let snapshot = client.snapshot().await?;
                if last.as_ref().map_or(true, |prev| changed(prev, &snapshot)) {
                    println!("{}", snapshot.taken_at.format("%H:%M:%S"));
                    for line in view::render(&snapshot) {
                        println!("  {}", line);
                    }
                }
                last = Some(snapshot);
            }
        }
    }

    Ok(())
}

fn changed(prev: &Snapshot, next: &Snapshot) -> bool {
    prev.status != next.status
        || prev.metadata != next.metadata
        || prev.connected_device != next.connected_device
        || prev.devices != next.devices
        || prev.scanning != next.scanning
        || prev.last_error != next.last_error
}
