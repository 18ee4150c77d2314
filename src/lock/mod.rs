//! Lock state and its controller
//!
//! Three reachable states over `(screen_locked, keyboard_locked)`:
//! - Unlocked: `(false, false)`
//! - KeyboardOnly: `(false, true)`
//! - Full: `(true, true)`
//!
//! `(true, false)` is unreachable: a screen lock always holds the keyboard.

mod controller;
mod mailbox;

use serde::{Deserialize, Serialize};

pub use controller::{LockController, LockDeps};
pub use mailbox::Mailbox;

/// Snapshot of the lock flags, as exposed to the UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub screen_locked: bool,
    pub keyboard_locked: bool,
    pub has_permission: bool,
}

impl LockState {
    /// `screen_locked ⇒ keyboard_locked`
    pub fn is_consistent(&self) -> bool {
        !self.screen_locked || self.keyboard_locked
    }

    /// Either lock engaged
    pub fn is_locked(&self) -> bool {
        self.screen_locked || self.keyboard_locked
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.screen_locked, self.keyboard_locked) {
            (false, false) => write!(f, "Unlocked"),
            (false, true) => write!(f, "KeyboardOnly"),
            (true, true) => write!(f, "Full"),
            (true, false) => write!(f, "Invalid"),
        }
    }
}
