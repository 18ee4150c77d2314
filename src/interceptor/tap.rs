//! Keyboard interceptor backed by a macOS CGEventTap
//!
//! The tap runs on a dedicated thread with its own CFRunLoop. Enabling and
//! disabling only flip an atomic and call `CGEventTapEnable`, so they are safe
//! from any thread, including from inside the tap callback. The raw FFI is
//! used instead of `core_graphics::event::CGEventTap` because returning NULL
//! from the callback is the only way to swallow an event.

use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use core_foundation::base::TCFType;
use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
use core_foundation::runloop::{
    kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopRef, CFRunLoopStop,
};
use core_graphics::event::{
    CGEvent, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventTapProxy,
    CGEventType, EventField,
};
use foreign_types::ForeignType;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::keys::{classify_key_down, KeyAction};
use super::{InstallMode, InterceptorError, KeyboardInterceptor, UnlockHandle};

type CGEventMask = u64;

/// Callback signature with the event type kept raw: the OS may hand us
/// values that are not `CGEventType` variants.
type TapCallback = unsafe extern "C" fn(
    proxy: CGEventTapProxy,
    event_type: u32,
    event: *mut c_void,
    user_info: *mut c_void,
) -> *mut c_void;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: CGEventTapLocation,
        place: CGEventTapPlacement,
        options: CGEventTapOptions,
        events_of_interest: CGEventMask,
        callback: TapCallback,
        user_info: *mut c_void,
    ) -> CFMachPortRef;

    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
}

/// How long `try_install` waits for the tap thread to report
const INSTALL_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `destroy` waits for the tap thread before detaching it
const DESTROY_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on how long the run loop sleeps between `running` checks
const RUN_LOOP_SLICE: Duration = Duration::from_millis(250);

/// CF references of a live tap, published by the tap thread
struct LiveTap {
    port: CFMachPortRef,
    run_loop: CFRunLoopRef,
}

// Both references stay retained by the tap thread until it clears the slot,
// and CGEventTapEnable / CFRunLoopStop are thread-safe.
unsafe impl Send for LiveTap {}

/// State shared between the owner, the tap thread and the callback
struct TapShared {
    /// Swallow keys (as opposed to passing them through)
    enabled: AtomicBool,
    /// Keep the run loop spinning
    running: AtomicBool,
    /// Set while the tap thread holds a registered tap
    live: Mutex<Option<LiveTap>>,
}

impl TapShared {
    fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            running: AtomicBool::new(true),
            live: Mutex::new(None),
        }
    }

    fn set_tap_enabled(&self, enable: bool) {
        if let Some(live) = self.live.lock().as_ref() {
            unsafe { CGEventTapEnable(live.port, enable) };
        }
    }
}

/// Context handed to the C callback through `user_info`
struct TapContext {
    shared: Arc<TapShared>,
    unlock: UnlockHandle,
}

/// CGEventTap interceptor
pub struct TapInterceptor {
    shared: Arc<TapShared>,
    thread: Option<JoinHandle<()>>,
}

impl TapInterceptor {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TapShared::new(false)),
            thread: None,
        }
    }
}

impl Default for TapInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardInterceptor for TapInterceptor {
    fn is_installed(&self) -> bool {
        self.thread.is_some()
    }

    fn is_enabled(&self) -> bool {
        self.is_installed() && self.shared.enabled.load(Ordering::SeqCst)
    }

    fn try_install(
        &mut self,
        unlock: UnlockHandle,
        mode: InstallMode,
    ) -> Result<(), InterceptorError> {
        if self.is_installed() {
            return Ok(());
        }

        // A detached thread from an earlier destroy keeps its own shared state
        let shared = Arc::new(TapShared::new(mode == InstallMode::Engage));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("keyboard-interceptor".to_string())
            .spawn(move || {
                debug!("keyboard interceptor thread started");
                run_tap_loop(thread_shared, unlock, ready_tx);
                debug!("keyboard interceptor thread stopped");
            })
            .map_err(|e| InterceptorError::HookInstallFailed(e.to_string()))?;

        match ready_rx.recv_timeout(INSTALL_TIMEOUT) {
            Ok(Ok(())) => {
                info!(?mode, "keyboard hook installed");
                self.shared = shared;
                self.thread = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                shared.running.store(false, Ordering::SeqCst);
                error!("keyboard interceptor thread did not report in time");
                Err(InterceptorError::HookInstallFailed(
                    "event tap thread did not start".to_string(),
                ))
            }
        }
    }

    fn enable(&mut self) {
        self.shared.enabled.store(true, Ordering::SeqCst);
        self.shared.set_tap_enabled(true);
    }

    fn disable(&mut self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
        self.shared.set_tap_enabled(false);
    }

    fn destroy(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        self.shared.enabled.store(false, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(live) = self.shared.live.lock().as_ref() {
            unsafe {
                CGEventTapEnable(live.port, false);
                CFRunLoopStop(live.run_loop);
            }
        }

        // The callback may be blocked on the controller lock our caller holds,
        // so never join unconditionally.
        let start = Instant::now();
        while !handle.is_finished() && start.elapsed() < DESTROY_TIMEOUT {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                error!("keyboard interceptor thread panicked");
            }
            info!("keyboard hook destroyed");
        } else {
            warn!("keyboard interceptor thread did not stop in time, detaching");
        }
    }
}

impl Drop for TapInterceptor {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Create the tap, register it on this thread's run loop and spin until stopped
fn run_tap_loop(
    shared: Arc<TapShared>,
    unlock: UnlockHandle,
    ready: mpsc::Sender<Result<(), InterceptorError>>,
) {
    let context = Box::into_raw(Box::new(TapContext {
        shared: Arc::clone(&shared),
        unlock,
    }));

    let event_mask: CGEventMask = 1 << (CGEventType::KeyDown as u64);
    let tap_ref = unsafe {
        CGEventTapCreate(
            CGEventTapLocation::HID,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::Default,
            event_mask,
            tap_callback,
            context as *mut c_void,
        )
    };

    if tap_ref.is_null() {
        unsafe { drop(Box::from_raw(context)) };
        let _ = ready.send(Err(classify_install_failure()));
        return;
    }

    let port = unsafe { CFMachPort::wrap_under_create_rule(tap_ref) };
    let source = match port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            drop(port);
            unsafe { drop(Box::from_raw(context)) };
            let _ = ready.send(Err(InterceptorError::HookInstallFailed(
                "failed to create run loop source".to_string(),
            )));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    run_loop.add_source(&source, unsafe { kCFRunLoopCommonModes });

    *shared.live.lock() = Some(LiveTap {
        port: tap_ref,
        run_loop: run_loop.as_concrete_TypeRef(),
    });
    unsafe { CGEventTapEnable(tap_ref, shared.enabled.load(Ordering::SeqCst)) };
    let _ = ready.send(Ok(()));

    while shared.running.load(Ordering::SeqCst) {
        CFRunLoop::run_in_mode(unsafe { kCFRunLoopDefaultMode }, RUN_LOOP_SLICE, false);
    }

    // Unpublish before releasing so no other thread touches a dead port
    *shared.live.lock() = None;
    unsafe { CGEventTapEnable(tap_ref, false) };
    run_loop.remove_source(&source, unsafe { kCFRunLoopCommonModes });
    drop(source);
    drop(port);

    // No callback can run once the source is off the run loop
    unsafe { drop(Box::from_raw(context)) };
}

/// CGEventTapCreate only says "no"; ask the accessibility API why
fn classify_install_failure() -> InterceptorError {
    if crate::permission::process_is_trusted() {
        error!("CGEventTapCreate failed although the process is trusted");
        InterceptorError::HookInstallFailed("CGEventTapCreate returned NULL".to_string())
    } else {
        warn!("CGEventTapCreate failed - accessibility permission missing");
        InterceptorError::PermissionDenied
    }
}

/// Tap callback
///
/// Returning the event passes it on; returning NULL swallows it.
unsafe extern "C" fn tap_callback(
    _proxy: CGEventTapProxy,
    event_type: u32,
    event_ref: *mut c_void,
    user_info: *mut c_void,
) -> *mut c_void {
    let context = &*(user_info as *const TapContext);
    let shared = &context.shared;

    if event_type == CGEventType::TapDisabledByTimeout as u32
        || event_type == CGEventType::TapDisabledByUserInput as u32
    {
        if shared.enabled.load(Ordering::SeqCst) {
            warn!("event tap disabled by the system, re-enabling");
            shared.set_tap_enabled(true);
        }
        return event_ref;
    }

    if event_type != CGEventType::KeyDown as u32 || !shared.enabled.load(Ordering::SeqCst) {
        return event_ref;
    }

    let action = catch_unwind(AssertUnwindSafe(|| {
        // Borrowed from the OS; must not be released here
        let event = ManuallyDrop::new(CGEvent::from_ptr(event_ref as *mut _));
        let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
        classify_key_down(keycode, event.get_flags().bits())
    }));

    match action {
        Ok(KeyAction::Swallow) => {}
        Ok(KeyAction::SwallowAndUnlock) => {
            info!("unlock hotkey pressed");
            if catch_unwind(AssertUnwindSafe(|| context.unlock.fire())).is_err() {
                error!("emergency unlock panicked inside the tap callback");
            }
        }
        Err(_) => {
            error!("key classification panicked, swallowing event");
        }
    }

    std::ptr::null_mut()
}
