/*!
 * IPC Server for DASHLINK Daemon
 * JSON lines over Unix socket, one response per request
 */

use anyhow::Result;
use dashlink_bluetooth::protocol::{Request, Response};
use dashlink_bluetooth::EngineHandle;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub struct IpcServer {
    listener: UnixListener,
    engine: EngineHandle,
}

impl IpcServer {
    pub fn new(listener: UnixListener, engine: EngineHandle) -> Self {
        Self { listener, engine }
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!("IPC server listening for connections...");

        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    tracing::debug!("New client connected");
                    let engine = self.engine.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, engine).await {
                            tracing::error!("Client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_client(stream: UnixStream, engine: EngineHandle) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        tracing::debug!("Received request: {}", request);

        let response = match serde_json::from_str::<Request>(request) {
            Ok(request) => handle_request(&engine, request).await,
            Err(e) => Response::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;
    }

    tracing::debug!("Client disconnected");
    Ok(())
}

pub async fn handle_request(engine: &EngineHandle, request: Request) -> Response {
    let submitted = match request {
        Request::Snapshot => {
            return Response::Snapshot {
                snapshot: engine.snapshot().await,
            }
        }
        Request::ToggleDiscovery => engine.toggle_discovery(),
        Request::PairAndConnect { path } => engine.pair_and_connect(path),
        Request::Disconnect { path } => engine.disconnect(path),
        Request::Shutdown => {
            tracing::info!("Shutdown requested over IPC");
            engine.shutdown();
            Ok(())
        }
    };

    match submitted {
        Ok(()) => Response::Accepted,
        Err(e) => Response::Error {
            message: e.to_string(),
        },
    }
}
