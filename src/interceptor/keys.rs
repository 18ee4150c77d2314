//! Modifier flags, the reserved unlock hotkey and the key-down policy
//!
//! Flag values are the raw `CGEventFlags` bits so recognition stays testable
//! without a live event tap.

/// Modifier key flag masks from macOS CGEventFlags
pub mod flags {
    /// Shift key modifier flag
    pub const SHIFT: u64 = 0x0002_0000;
    /// Control key modifier flag
    pub const CONTROL: u64 = 0x0004_0000;
    /// Option/Alt key modifier flag
    pub const OPTION: u64 = 0x0008_0000;
    /// Command key modifier flag
    pub const COMMAND: u64 = 0x0010_0000;
}

/// macOS virtual keycode for the physical "S" key (ANSI layout position)
pub const KEYCODE_S: u16 = 0x01;

/// Tracks which modifier keys are held for a key event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub shift: bool,
    pub control: bool,
    pub option: bool,
    pub command: bool,
}

impl ModifierState {
    /// Create a new ModifierState from raw CGEventFlags bits
    pub fn from_bits(bits: u64) -> Self {
        Self {
            shift: bits & flags::SHIFT != 0,
            control: bits & flags::CONTROL != 0,
            option: bits & flags::OPTION != 0,
            command: bits & flags::COMMAND != 0,
        }
    }
}

/// A fixed keycode + modifier combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub keycode: u16,
    pub modifiers: ModifierState,
}

/// Cmd+Shift+S, the only key the interceptor lets through to the controller
pub const UNLOCK_HOTKEY: Hotkey = Hotkey {
    keycode: KEYCODE_S,
    modifiers: ModifierState {
        shift: true,
        control: false,
        option: false,
        command: true,
    },
};

impl Hotkey {
    /// Exact match: extra modifiers (Control, Option) do not count as the hotkey
    pub fn matches(&self, keycode: u16, modifiers: ModifierState) -> bool {
        self.keycode == keycode && self.modifiers == modifiers
    }
}

/// What the tap does with a key-down event while interception is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Drop the event
    Swallow,
    /// Drop the event and force a full unlock
    SwallowAndUnlock,
}

/// Decide the fate of an intercepted key-down
///
/// Every outcome swallows; only the unlock hotkey additionally reports.
pub fn classify_key_down(keycode: u16, flag_bits: u64) -> KeyAction {
    if UNLOCK_HOTKEY.matches(keycode, ModifierState::from_bits(flag_bits)) {
        KeyAction::SwallowAndUnlock
    } else {
        KeyAction::Swallow
    }
}
