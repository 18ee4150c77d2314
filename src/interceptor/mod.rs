//! Keyboard interceptor: a global key-down hook that swallows input
//!
//! On macOS the hook is a CGEventTap running on a dedicated thread. The
//! controller only sees the [`KeyboardInterceptor`] trait, so the tap can be
//! replaced by a fake in tests and by [`UnsupportedInterceptor`] elsewhere.

// Only the tap consumes the key policy
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod keys;
#[cfg(target_os = "macos")]
mod tap;

use std::sync::Weak;

#[cfg(target_os = "macos")]
pub use tap::TapInterceptor;

/// How a freshly installed hook should behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Keep the hook enabled and start swallowing keys
    Engage,
    /// Create the hook and disable it immediately, only to provoke the consent prompt
    Probe,
}

/// Errors that can occur while installing the hook
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterceptorError {
    #[error("input monitoring permission has not been granted")]
    PermissionDenied,

    #[error("failed to install keyboard hook: {0}")]
    HookInstallFailed(String),
}

/// Receiver of the unlock hotkey
pub trait UnlockSink: Send + Sync {
    fn emergency_unlock(&self);
}

/// Non-owning capability handed to the hook at install time
///
/// The hook never keeps the controller alive; once the controller is gone
/// firing the handle does nothing.
#[derive(Clone)]
pub struct UnlockHandle(Weak<dyn UnlockSink>);

impl UnlockHandle {
    pub fn new(sink: Weak<dyn UnlockSink>) -> Self {
        Self(sink)
    }

    /// Forward the hotkey to the controller if it still exists
    pub fn fire(&self) {
        if let Some(sink) = self.0.upgrade() {
            sink.emergency_unlock();
        }
    }
}

impl std::fmt::Debug for UnlockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UnlockHandle")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

/// A global keyboard hook owned by the lock controller
///
/// `enable`/`disable` must not block on the hook thread: they are called
/// with the controller lock held, possibly from inside the hook callback.
pub trait KeyboardInterceptor: Send {
    /// Whether an OS hook currently exists
    fn is_installed(&self) -> bool;

    /// Whether installed and currently swallowing keys
    fn is_enabled(&self) -> bool;

    /// Create the hook; a no-op returning `Ok` if already installed
    fn try_install(
        &mut self,
        unlock: UnlockHandle,
        mode: InstallMode,
    ) -> Result<(), InterceptorError>;

    /// Resume swallowing on an installed hook
    fn enable(&mut self);

    /// Stop swallowing without tearing the hook down
    fn disable(&mut self);

    /// Unregister and release the hook; idempotent
    fn destroy(&mut self);
}

/// Interceptor for platforms without an event tap
///
/// Every install fails, which keeps the controller in the permission-denied
/// path.
#[derive(Debug, Default)]
pub struct UnsupportedInterceptor;

impl KeyboardInterceptor for UnsupportedInterceptor {
    fn is_installed(&self) -> bool {
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn try_install(
        &mut self,
        _unlock: UnlockHandle,
        _mode: InstallMode,
    ) -> Result<(), InterceptorError> {
        Err(InterceptorError::HookInstallFailed(
            "keyboard interception is only available on macOS".to_string(),
        ))
    }

    fn enable(&mut self) {}

    fn disable(&mut self) {}

    fn destroy(&mut self) {}
}

/// The interceptor for the current platform
pub fn platform_interceptor() -> Box<dyn KeyboardInterceptor> {
    #[cfg(target_os = "macos")]
    {
        Box::new(TapInterceptor::new())
    }
    #[cfg(not(target_os = "macos"))]
    {
        Box::new(UnsupportedInterceptor)
    }
}
