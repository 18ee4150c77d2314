//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Interval between permission checks while waiting for the user to grant access
pub const DEFAULT_PERMISSION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// URL scheme registered for deep links
pub const URL_SCHEME: &str = "wool";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// How often to re-check input permission after a denied lock attempt
    pub permission_poll_interval: Duration,

    /// Scheme accepted by the deep link parser
    pub url_scheme: String,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("wool");

        let socket_path = match std::env::var_os("WOOL_SOCKET") {
            Some(path) => PathBuf::from(path),
            None => data_dir.join("daemon.sock"),
        };

        let permission_poll_interval = match std::env::var("WOOL_PERMISSION_POLL_MS") {
            Ok(raw) => parse_poll_interval(&raw)?,
            Err(_) => DEFAULT_PERMISSION_POLL_INTERVAL,
        };

        Ok(Self {
            socket_path,
            data_dir,
            permission_poll_interval,
            url_scheme: URL_SCHEME.to_string(),
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn parse_poll_interval(raw: &str) -> Result<Duration> {
    let millis: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("WOOL_PERMISSION_POLL_MS is not a number: {raw:?}"))?;
    if millis == 0 {
        bail!("WOOL_PERMISSION_POLL_MS must be greater than zero");
    }
    Ok(Duration::from_millis(millis))
}
