//! Unix domain socket server for IPC
//!
//! Menu actions and forwarded deep links arrive here as requests. Clients that
//! subscribe also receive state changes and lock events as they happen.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::deeplink::DeepLink;
use crate::events::LockEvent;
use crate::lock::LockController;

use super::protocol::{read_frame, write_frame, DaemonStatus, Notification, Request, Response};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// State every client handler needs
struct Shared {
    controller: Arc<LockController>,
    event_tx: broadcast::Sender<LockEvent>,
    url_scheme: String,
    start_time: Instant,
}

impl Server {
    /// Bind the socket
    pub fn new(
        socket_path: &Path,
        controller: Arc<LockController>,
        event_tx: broadcast::Sender<LockEvent>,
        url_scheme: &str,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            shared: Arc::new(Shared {
                controller,
                event_tx,
                url_scheme: url_scheme.to_string(),
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(writer));
        let mut forwarder: Option<tokio::task::JoinHandle<()>> = None;

        let result: Result<()> = async {
            loop {
                let Some(frame) = read_frame::<_, serde_json::Value>(&mut reader).await? else {
                    debug!("client disconnected");
                    return Ok(());
                };

                let request = match serde_json::from_value::<Request>(frame) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(%e, "rejecting unknown request");
                        let response = Response::Error {
                            code: "invalid_request".to_string(),
                            message: e.to_string(),
                        };
                        write_frame(&mut *writer.lock().await, &response).await?;
                        continue;
                    }
                };
                debug!(?request, "received request");

                let subscribe = matches!(request, Request::Subscribe);
                // Transitions may wait on the tap thread; keep them off the workers
                let worker_shared = Arc::clone(&shared);
                let response = tokio::task::spawn_blocking(move || {
                    Self::process_request(request, &worker_shared)
                })
                .await
                .context("request handler panicked")?;

                write_frame(&mut *writer.lock().await, &response).await?;

                if subscribe && forwarder.is_none() {
                    debug!("client subscribed to notifications");
                    forwarder = Some(Self::spawn_forwarder(&shared, Arc::clone(&writer)));
                }
            }
        }
        .await;

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        result
    }

    /// Push state changes and events to a subscribed client
    fn spawn_forwarder(
        shared: &Shared,
        writer: Arc<Mutex<OwnedWriteHalf>>,
    ) -> tokio::task::JoinHandle<()> {
        let mut state_rx = shared.controller.subscribe();
        let mut event_rx = shared.event_tx.subscribe();

        tokio::spawn(async move {
            // Start from the current snapshot
            let initial = Notification::StateChanged(*state_rx.borrow_and_update());
            if write_frame(&mut *writer.lock().await, &initial).await.is_err() {
                return;
            }

            loop {
                let notification = tokio::select! {
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *state_rx.borrow_and_update();
                        Notification::StateChanged(state)
                    }
                    event = event_rx.recv() => match event {
                        Ok(event) => Notification::Event { event },
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber lagged behind lock events");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };

                if let Err(e) = write_frame(&mut *writer.lock().await, &notification).await {
                    debug!(?e, "subscriber went away");
                    break;
                }
            }
        })
    }

    /// Process a request and return a response
    fn process_request(request: Request, shared: &Shared) -> Response {
        let controller = &shared.controller;
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(DaemonStatus::new(
                controller.snapshot(),
                shared.start_time.elapsed().as_secs(),
            )),

            Request::ToggleLock { target } => {
                info!(?target, "screen lock menu action");
                Response::LockState(controller.toggle_screen_lock(target))
            }

            Request::ToggleKeyboardLock { target } => {
                info!(?target, "keyboard lock menu action");
                Response::LockState(controller.toggle_keyboard_lock(target))
            }

            Request::OpenUrl { url } => {
                // Unknown links are dropped silently, like the OS handler would
                match DeepLink::parse(&url, &shared.url_scheme) {
                    Some(link) => {
                        info!(?link, "deep link received");
                        controller.deliver_deep_link(link);
                    }
                    None => debug!(url, "deep link ignored"),
                }
                Response::Accepted
            }

            Request::OpenPrivacySettings => {
                controller.open_privacy_settings();
                Response::Accepted
            }

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}
