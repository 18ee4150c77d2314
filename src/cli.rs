//! Command line interface
//!
//! `wool` (or `wool run`) starts the daemon. The other subcommands talk to a
//! running daemon over its socket.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{ArgAction, Parser, Subcommand};

use crate::ipc::{Client, Request, Response};

#[derive(Debug, Parser)]
#[command(name = "wool")]
#[command(about = "Lock the keyboard and screen from the menu bar")]
#[command(version)]
pub struct Cli {
    /// Socket path, overriding WOOL_SOCKET and the default
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon (the default)
    Run {
        /// Deep links to handle once launch completes; the last one wins
        urls: Vec<String>,
    },
    /// Forward a deep link to the running daemon
    Send { url: String },
    /// Print the lock state as JSON
    Status,
    /// Screen & keyboard lock, or keyboard only with --keyboard
    Toggle {
        #[arg(long)]
        keyboard: bool,
        /// Set instead of toggling
        #[arg(long, action = ArgAction::Set)]
        target: Option<bool>,
    },
    /// Open the accessibility settings pane
    Settings,
    /// Stream state changes and lock events until the daemon exits
    Watch,
}

impl Cli {
    /// Deep links to queue when running the daemon
    pub fn launch_urls(&self) -> &[String] {
        match &self.command {
            Some(Command::Run { urls }) => urls.as_slice(),
            _ => &[],
        }
    }

    /// Whether this invocation starts the daemon
    pub fn is_daemon(&self) -> bool {
        matches!(self.command, None | Some(Command::Run { .. }))
    }
}

/// Run a client subcommand against the daemon at `socket_path`
pub async fn run_client(command: &Command, socket_path: &Path) -> Result<()> {
    let mut client = Client::connect(socket_path).await?;

    let request = match command {
        Command::Run { .. } => bail!("`run` starts the daemon, it is not a client command"),
        Command::Send { url } => Request::OpenUrl { url: url.clone() },
        Command::Status => Request::GetStatus,
        Command::Toggle {
            keyboard: true,
            target,
        } => Request::ToggleKeyboardLock { target: *target },
        Command::Toggle {
            keyboard: false,
            target,
        } => Request::ToggleLock { target: *target },
        Command::Settings => Request::OpenPrivacySettings,
        Command::Watch => Request::Subscribe,
    };

    let response = client.request(&request).await?;
    if let Response::Error { code, message } = &response {
        bail!("daemon error {code}: {message}");
    }
    println!("{}", serde_json::to_string_pretty(&response)?);

    if matches!(command, Command::Watch) {
        while let Some(notification) = client.next_notification().await? {
            println!("{}", serde_json::to_string(&notification)?);
        }
    }

    Ok(())
}
