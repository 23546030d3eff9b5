/*!
 * DASHLINK Bluetooth Daemon
 * Hosts the Bluetooth engine and serves its projection over a Unix socket
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use dashlink_bluetooth::protocol::{Request, Response};
use dashlink_bluetooth::{BluezSession, Engine};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};

mod config;
mod ipc;

use config::DaemonConfig;
use ipc::IpcServer;

#[derive(Parser)]
#[command(name = "dashlinkd")]
#[command(about = "DASHLINK Bluetooth Daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/dashlink/dashlinkd.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run,
    /// Check daemon status
    Status,
    /// Stop the daemon
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("dashlink={}", log_level))
        .init();

    let config = DaemonConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::Status => check_status(&config).await,
        Commands::Stop => stop_daemon(&config).await,
    }
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    info!("DASHLINK Bluetooth Daemon starting...");

    let session = BluezSession::connect(config.bluetooth.call_timeout()).await?;
    let (engine, engine_task) = Engine::spawn(session, config.bluetooth.engine_config());

    // A halted engine leaves its final status in the projection; keep serving it.
    let engine_watch = tokio::spawn(async move { log_engine_exit(engine_task.await) });

    let socket = Path::new(&config.socket_path);
    if socket.exists() {
        warn!("Removing stale socket {}", socket.display());
        std::fs::remove_file(socket)?;
    }
    if let Some(parent) = socket.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket)?;
    let ipc_server = IpcServer::new(listener, engine.clone());

    info!("DASHLINK daemon ready on socket: {}", config.socket_path);

    tokio::select! {
        result = ipc_server.run() => {
            if let Err(e) = result {
                error!("IPC server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
        _ = engine.stopped() => info!("Shutdown requested"),
    }

    engine.shutdown();
    if let Err(e) = engine_watch.await {
        error!("Engine watcher failed: {}", e);
    }

    if let Err(e) = std::fs::remove_file(socket) {
        warn!("Could not remove socket {}: {}", socket.display(), e);
    }
    info!("DASHLINK daemon stopped");
    Ok(())
}

fn log_engine_exit(
    result: Result<Result<(), dashlink_bluetooth::EngineError>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => info!("Bluetooth engine stopped"),
        Ok(Err(e)) => error!("Bluetooth engine exited: {}", e),
        Err(e) => error!("Bluetooth engine task failed: {}", e),
    }
}

async fn send_request(socket_path: &str, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();

    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;

    match BufReader::new(reader).lines().next_line().await? {
        Some(line) => Ok(serde_json::from_str(&line)?),
        None => bail!("Daemon closed the connection without answering"),
    }
}

async fn check_status(config: &DaemonConfig) -> Result<()> {
    match send_request(&config.socket_path, &Request::Snapshot).await {
        Ok(Response::Snapshot { snapshot }) => {
            println!("dashlinkd running on {}", config.socket_path);
            println!("Status: {}", snapshot.status);
            println!("Connected: {}", snapshot.connected_device.name);
            println!("Known devices: {}", snapshot.devices.len());
            if let Some(err) = snapshot.last_error {
                println!("Last error: {}", err);
            }
            Ok(())
        }
        Ok(Response::Error { message }) => bail!("Daemon error: {}", message),
        Ok(other) => bail!("Unexpected response: {:?}", other),
        Err(e) => bail!("dashlinkd not reachable on {}: {}", config.socket_path, e),
    }
}

async fn stop_daemon(config: &DaemonConfig) -> Result<()> {
    match send_request(&config.socket_path, &Request::Shutdown).await? {
        Response::Accepted => {
            println!("dashlinkd stopping");
            Ok(())
        }
        Response::Error { message } => bail!("Daemon error: {}", message),
        other => bail!("Unexpected response: {:?}", other),
    }
}
