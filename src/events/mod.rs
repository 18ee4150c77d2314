//! Events emitted by the lock controller
//!
//! Every observable transition is published on a broadcast channel so the
//! IPC server can forward it to subscribed menu-bar clients.

use serde::{Deserialize, Serialize};

/// Events emitted during lock transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LockEvent {
    /// Keyboard interception engaged
    KeyboardLocked,

    /// Keyboard interception released
    KeyboardUnlocked,

    /// Occlusion overlay engaged (always after `KeyboardLocked`)
    ScreenLocked,

    /// Occlusion overlay released
    ScreenUnlocked,

    /// The reserved hotkey forced a full unlock
    EmergencyUnlock,

    /// Input permission confirmed by a successful probe
    PermissionGranted,

    /// A lock attempt failed for lack of permission
    PermissionDenied,

    /// The overlay should be presented on every display
    OverlayShown {
        /// Human-readable name rendered on the overlay
        display_label: String,
    },

    /// All overlay surfaces should be removed
    OverlayHidden,
}

impl std::fmt::Display for LockEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockEvent::KeyboardLocked => write!(f, "KEYBOARD_LOCKED"),
            LockEvent::KeyboardUnlocked => write!(f, "KEYBOARD_UNLOCKED"),
            LockEvent::ScreenLocked => write!(f, "SCREEN_LOCKED"),
            LockEvent::ScreenUnlocked => write!(f, "SCREEN_UNLOCKED"),
            LockEvent::EmergencyUnlock => write!(f, "EMERGENCY_UNLOCK"),
            LockEvent::PermissionGranted => write!(f, "PERMISSION_GRANTED"),
            LockEvent::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            LockEvent::OverlayShown { display_label } => {
                write!(f, "OVERLAY_SHOWN ({})", display_label)
            }
            LockEvent::OverlayHidden => write!(f, "OVERLAY_HIDDEN"),
        }
    }
}
