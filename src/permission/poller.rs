//! Background re-check of input permission
//!
//! A cancellable tokio task that runs a blocking check on a fixed interval
//! until the check reports success. Dropping the poller cancels it.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to a running permission poll loop
#[derive(Debug)]
pub struct PermissionPoller {
    task: JoinHandle<()>,
}

impl PermissionPoller {
    /// Spawn the loop on `runtime`
    ///
    /// `check` runs on the blocking pool once per `interval`; returning `true`
    /// ends the loop. No lock is held between checks.
    pub fn spawn<F>(runtime: &Handle, interval: Duration, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let check = Arc::new(check);
        let task = runtime.spawn(async move {
            debug!(interval_ms = interval.as_millis() as u64, "permission poller started");
            let mut attempts: u64 = 0;
            loop {
                tokio::time::sleep(interval).await;
                attempts += 1;

                let check = Arc::clone(&check);
                match tokio::task::spawn_blocking(move || check()).await {
                    Ok(true) => {
                        debug!(attempts, "permission poller finished");
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(?e, "permission check panicked"),
                }
            }
        });

        Self { task }
    }

    /// Whether the loop has ended on its own (or was cancelled)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling; safe to call more than once
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for PermissionPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
