//! Occlusion overlay presenter
//!
//! The daemon does not draw windows itself. The presenter publishes
//! show/hide events that the menu-bar app turns into one window per display.

use tokio::sync::broadcast;
use tracing::debug;

use crate::events::LockEvent;

/// Shows and hides the per-display occlusion surfaces
///
/// Both calls must tolerate repetition.
pub trait OverlayPresenter: Send + Sync {
    fn show_for_each_display(&self, display_label: &str);
    fn hide_all(&self);
}

/// Presenter that forwards overlay requests to IPC subscribers
pub struct BroadcastOverlay {
    event_tx: broadcast::Sender<LockEvent>,
}

impl BroadcastOverlay {
    pub fn new(event_tx: broadcast::Sender<LockEvent>) -> Self {
        Self { event_tx }
    }
}

impl OverlayPresenter for BroadcastOverlay {
    fn show_for_each_display(&self, display_label: &str) {
        debug!(display_label, "requesting overlay");
        // No subscribers simply means no UI is attached yet
        let _ = self.event_tx.send(LockEvent::OverlayShown {
            display_label: display_label.to_string(),
        });
    }

    fn hide_all(&self) {
        debug!("requesting overlay removal");
        let _ = self.event_tx.send(LockEvent::OverlayHidden);
    }
}

/// Name of the main display, rendered on the overlay
pub fn main_display_label() -> String {
    #[cfg(target_os = "macos")]
    {
        use core_graphics::display::CGDisplay;

        let main = CGDisplay::main();
        let active = CGDisplay::active_displays().map(|d| d.len()).unwrap_or(1);
        let name = if main.is_builtin() {
            "Built-in Display".to_string()
        } else {
            format!("Display {}", main.id)
        };
        if active > 1 {
            format!("{name} (+{} more)", active - 1)
        } else {
            name
        }
    }
    #[cfg(not(target_os = "macos"))]
    {
        "Display".to_string()
    }
}
