//! wool: menu-bar keyboard and screen lock daemon for macOS
//!
//! The daemon runs next to the menu-bar app and provides:
//! - Keyboard lock via a CGEventTap that swallows every key press
//! - Screen lock (keyboard lock plus a full-screen overlay)
//! - Emergency unlock on Cmd+Shift+S, handled inside the tap
//! - Accessibility permission tracking with background polling
//! - `wool://` deep links and an IPC server for the menu-bar app
//!
//! The overlay windows themselves belong to the app; the daemon tells it
//! when to show and hide them.

mod cli;
mod config;
mod deeplink;
mod events;
mod interceptor;
mod ipc;
mod lifecycle;
mod lock;
mod overlay;
mod permission;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::Config;
use crate::deeplink::DeepLink;
use crate::events::LockEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::lock::{LockController, LockDeps};
use crate::overlay::BroadcastOverlay;
use crate::permission::SystemGate;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Load configuration
    let mut config = Config::load()?;
    if let Some(socket) = &cli.socket {
        config.socket_path = socket.clone();
    }

    match &cli.command {
        Some(command) if !cli.is_daemon() => cli::run_client(command, &config.socket_path).await,
        _ => run_daemon(config, cli.launch_urls()).await,
    }
}

async fn run_daemon(config: Config, launch_urls: &[String]) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "wool daemon starting");
    config.ensure_dirs()?;
    info!(?config.socket_path, "configuration loaded");

    // Create shutdown signal handler
    let mut shutdown = ShutdownSignal::new()?;

    // Controller -> IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<LockEvent>(64);

    let controller = LockController::new(
        LockDeps {
            interceptor: interceptor::platform_interceptor(),
            gate: Arc::new(SystemGate),
            overlay: Arc::new(BroadcastOverlay::new(event_tx.clone())),
        },
        event_tx.clone(),
        config.permission_poll_interval,
        tokio::runtime::Handle::current(),
    );

    // Links handed over at launch wait in the mailbox
    for url in launch_urls {
        match DeepLink::parse(url, &config.url_scheme) {
            Some(link) => controller.deliver_deep_link(link),
            None => warn!(url, "ignoring launch argument that is not a wool link"),
        }
    }

    let server = Server::new(
        &config.socket_path,
        Arc::clone(&controller),
        event_tx,
        &config.url_scheme,
    )?;

    controller.finish_launching();
    info!(state = %controller.snapshot(), "daemon initialized, entering main loop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    // Tearing down the tap may wait on its thread
    let releasing = Arc::clone(&controller);
    if let Err(e) = tokio::task::spawn_blocking(move || releasing.shutdown()).await {
        error!(?e, "lock controller shutdown failed");
    }
    server.shutdown().await;

    info!("wool daemon stopped");

    Ok(())
}
