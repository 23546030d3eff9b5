/*!
 * DASHLINK Daemon Client
 * JSON IPC communication with dashlinkd
 */

use anyhow::{anyhow, bail, Result};
use dashlink_bluetooth::protocol::{Request, Response};
use dashlink_bluetooth::Snapshot;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

/// One connection, reused for every request.
pub struct DashlinkClient {
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl DashlinkClient {
    pub async fn connect(socket_path: &str) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| anyhow!("Cannot reach dashlinkd at {}: {}", socket_path, e))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader).lines(),
            writer,
        })
    }

    pub async fn send_request(&mut self, request: &Request) -> Result<Response> {
        let mut payload = serde_json::to_vec(request)?;
        payload.push(b'\n');
        self.writer.write_all(&payload).await?;

        match self.reader.next_line().await? {
            Some(line) => Ok(serde_json::from_str(&line)?),
            None => bail!("dashlinkd closed the connection"),
        }
    }

    pub async fn snapshot(&mut self) -> Result<Snapshot> {
        match self.send_request(&Request::Snapshot).await? {
            Response::Snapshot { snapshot } => Ok(snapshot),
            Response::Error { message } => bail!(message),
            other => bail!("Unexpected response: {:?}", other),
        }
    }

    /// Submit a command; the daemon only confirms it was queued.
    pub async fn command(&mut self, request: &Request) -> Result<()> {
        match self.send_request(request).await? {
            Response::Accepted => Ok(()),
            Response::Error { message } => bail!(message),
            other => bail!("Unexpected response: {:?}", other),
        }
    }
}
