//! Permission gate for the privileged keyboard hook
//!
//! The gate answers "may we install the hook?" and can ask the OS to prompt
//! the user. [`PermissionPoller`] keeps re-checking in the background until
//! the answer becomes yes.

#[cfg(target_os = "macos")]
mod accessibility;
mod poller;

use std::process::Command;

use tracing::{info, warn};

pub use poller::PermissionPoller;

/// System Settings pane for Privacy & Security > Accessibility
pub const ACCESSIBILITY_SETTINGS_URL: &str =
    "x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility";

/// Queries and requests OS authorization for input interception
pub trait PermissionGate: Send + Sync {
    /// Non-blocking check, no side effects
    fn has_access(&self) -> bool;

    /// Start the OS consent flow if needed; returns the current status
    fn request_access(&self) -> bool;

    /// Open the privacy settings pane; fire-and-forget
    fn open_settings(&self);
}

/// Gate backed by the accessibility trust APIs
#[derive(Debug, Default)]
pub struct SystemGate;

impl PermissionGate for SystemGate {
    fn has_access(&self) -> bool {
        process_is_trusted()
    }

    fn request_access(&self) -> bool {
        #[cfg(target_os = "macos")]
        {
            let trusted = accessibility::is_trusted_with_prompt();
            info!(trusted, "requested accessibility access");
            trusted
        }
        #[cfg(not(target_os = "macos"))]
        {
            warn!("input permission cannot be requested on this platform");
            false
        }
    }

    fn open_settings(&self) {
        if let Err(e) = open_privacy_settings() {
            warn!(?e, "failed to open privacy settings");
        }
    }
}

/// Whether this process may install a default event tap
pub fn process_is_trusted() -> bool {
    #[cfg(target_os = "macos")]
    {
        accessibility::is_trusted()
    }
    #[cfg(not(target_os = "macos"))]
    {
        false
    }
}

/// Open System Settings at the Accessibility pane
pub fn open_privacy_settings() -> std::io::Result<()> {
    Command::new("open").arg(ACCESSIBILITY_SETTINGS_URL).spawn()?;
    info!("opened accessibility privacy settings");
    Ok(())
}
