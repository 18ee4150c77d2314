//! Client side of the daemon socket, used by the CLI subcommands

use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::net::UnixStream;

use super::protocol::{read_frame, write_frame, Notification, Request, Response};

/// A connection to a running daemon
pub struct Client {
    stream: UnixStream,
}

impl Client {
    /// Connect to the daemon socket
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("daemon is not listening on {}", socket_path.display()))?;
        Ok(Self { stream })
    }

    /// Send one request and wait for its response
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        write_frame(&mut self.stream, request).await?;
        match read_frame(&mut self.stream).await? {
            Some(response) => Ok(response),
            None => bail!("daemon closed the connection"),
        }
    }

    /// Next pushed notification after `subscribe`; `None` once the daemon hangs up
    pub async fn next_notification(&mut self) -> Result<Option<Notification>> {
        read_frame(&mut self.stream).await
    }
}
