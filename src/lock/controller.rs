//! Lock state controller
//!
//! Owns the lock flags and serializes every transition, together with its
//! side effects on the keyboard hook and the overlay, behind one mutex. The
//! IPC tasks, the permission poller and the hook thread all come through here.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::deeplink::{DeepLink, LinkCommand};
use crate::events::LockEvent;
use crate::interceptor::{
    InstallMode, InterceptorError, KeyboardInterceptor, UnlockHandle, UnlockSink,
};
use crate::overlay::{self, OverlayPresenter};
use crate::permission::{PermissionGate, PermissionPoller};

use super::{LockState, Mailbox};

/// Collaborators the controller drives
pub struct LockDeps {
    pub interceptor: Box<dyn KeyboardInterceptor>,
    pub gate: Arc<dyn PermissionGate>,
    pub overlay: Arc<dyn OverlayPresenter>,
}

/// Everything guarded by the controller mutex
struct Inner {
    state: LockState,
    interceptor: Box<dyn KeyboardInterceptor>,
    poller: Option<PermissionPoller>,
    mailbox: Mailbox,
}

/// The single owner of the lock state
pub struct LockController {
    inner: Mutex<Inner>,
    gate: Arc<dyn PermissionGate>,
    overlay: Arc<dyn OverlayPresenter>,
    state_tx: watch::Sender<LockState>,
    event_tx: broadcast::Sender<LockEvent>,
    poll_interval: Duration,
    runtime: Handle,
    this: Weak<LockController>,
}

impl LockController {
    /// Create the controller with all flags cleared
    ///
    /// `runtime` hosts the permission poller.
    pub fn new(
        deps: LockDeps,
        event_tx: broadcast::Sender<LockEvent>,
        poll_interval: Duration,
        runtime: Handle,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(LockState::default());

        Arc::new_cyclic(|this| Self {
            inner: Mutex::new(Inner {
                state: LockState::default(),
                interceptor: deps.interceptor,
                poller: None,
                mailbox: Mailbox::default(),
            }),
            gate: deps.gate,
            overlay: deps.overlay,
            state_tx,
            event_tx,
            poll_interval,
            runtime,
            this: this.clone(),
        })
    }

    /// Current flags
    pub fn snapshot(&self) -> LockState {
        self.inner.lock().state
    }

    /// Observe the flags; the receiver sees every committed transition
    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.state_tx.subscribe()
    }

    /// Whether a permission poll loop is running
    pub fn is_polling(&self) -> bool {
        self.inner
            .lock()
            .poller
            .as_ref()
            .is_some_and(|poller| !poller.is_finished())
    }

    /// Menu action: `None` toggles, `Some` sets
    pub fn toggle_screen_lock(&self, target: Option<bool>) -> LockState {
        let mut inner = self.inner.lock();
        let locked = target.unwrap_or(!inner.state.screen_locked);
        if let Err(e) = self.set_screen_lock(&mut inner, locked) {
            debug!(%e, "screen lock not engaged");
        }
        self.publish(&inner);
        inner.state
    }

    /// Menu action: `None` toggles, `Some` sets
    pub fn toggle_keyboard_lock(&self, target: Option<bool>) -> LockState {
        let mut inner = self.inner.lock();
        let locked = target.unwrap_or(!inner.state.keyboard_locked);
        if let Err(e) = self.set_keyboard_lock(&mut inner, locked) {
            debug!(%e, "keyboard lock not engaged");
        }
        self.publish(&inner);
        inner.state
    }

    /// Explicit screen lock transition
    pub fn request_screen_lock(&self, locked: bool) -> Result<LockState, InterceptorError> {
        let mut inner = self.inner.lock();
        let result = self.set_screen_lock(&mut inner, locked);
        self.publish(&inner);
        result.map(|()| inner.state)
    }

    /// Explicit keyboard lock transition
    pub fn request_keyboard_lock(&self, locked: bool) -> Result<LockState, InterceptorError> {
        let mut inner = self.inner.lock();
        let result = self.set_keyboard_lock(&mut inner, locked);
        self.publish(&inner);
        result.map(|()| inner.state)
    }

    /// Apply a deep link now, or park it until launch completes
    pub fn deliver_deep_link(&self, link: DeepLink) {
        let mut inner = self.inner.lock();
        if let Some(link) = inner.mailbox.deliver(link) {
            self.apply_link(&mut inner, link);
            self.publish(&inner);
        }
    }

    /// Launch milestone: read the permission state and drain the mailbox
    pub fn finish_launching(&self) {
        let mut inner = self.inner.lock();
        if inner.mailbox.is_open() {
            return;
        }

        inner.state.has_permission = self.gate.has_access();
        info!(has_permission = inner.state.has_permission, "launch complete");

        if let Some(link) = inner.mailbox.open() {
            info!(?link, "applying deep link received during launch");
            self.apply_link(&mut inner, link);
        }
        self.publish(&inner);
    }

    /// Escape hatch shown while unauthorized
    pub fn open_privacy_settings(&self) {
        self.gate.open_settings();

        let mut inner = self.inner.lock();
        if !inner.state.has_permission {
            self.start_polling(&mut inner);
        }
    }

    /// Release everything; used on termination
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if let Some(poller) = inner.poller.take() {
            poller.cancel();
        }
        if let Err(e) = self.set_screen_lock(&mut inner, false) {
            error!(%e, "unlock during shutdown failed");
        }
        inner.interceptor.destroy();
        self.publish(&inner);
        info!("lock controller shut down");
    }

    /// One poll tick: returns `true` once permission is confirmed
    fn poll_permission(&self) -> bool {
        if !self.gate.has_access() {
            debug!("still waiting for input permission");
            return false;
        }

        let mut inner = self.inner.lock();
        if inner.state.has_permission {
            return true;
        }

        if !inner.interceptor.is_installed() {
            match inner
                .interceptor
                .try_install(self.unlock_handle(), InstallMode::Probe)
            {
                Ok(()) => inner.interceptor.destroy(),
                Err(e) => {
                    debug!(%e, "permission probe failed, will retry");
                    return false;
                }
            }
        }

        self.grant_permission(&mut inner);
        self.publish(&inner);
        true
    }

    fn set_screen_lock(&self, inner: &mut Inner, locked: bool) -> Result<(), InterceptorError> {
        if !locked {
            if inner.state.screen_locked {
                self.overlay.hide_all();
                inner.state.screen_locked = false;
                self.emit(LockEvent::ScreenUnlocked);
            }
            self.set_keyboard_lock(inner, false)?;
            return Ok(());
        }

        if inner.state.screen_locked {
            return Ok(());
        }

        self.set_keyboard_lock(inner, true)?;

        self.overlay.show_for_each_display(&overlay::main_display_label());
        inner.state.screen_locked = true;
        self.emit(LockEvent::ScreenLocked);
        Ok(())
    }

    fn set_keyboard_lock(&self, inner: &mut Inner, locked: bool) -> Result<(), InterceptorError> {
        if !locked {
            if inner.state.screen_locked {
                self.overlay.hide_all();
                inner.state.screen_locked = false;
                self.emit(LockEvent::ScreenUnlocked);
            }
            if inner.state.keyboard_locked {
                inner.interceptor.disable();
                inner.state.keyboard_locked = false;
                self.emit(LockEvent::KeyboardUnlocked);
            }
            return Ok(());
        }

        if inner.state.keyboard_locked {
            return Ok(());
        }

        if !inner.state.has_permission {
            if self.gate.has_access() || self.gate.request_access() {
                self.grant_permission(inner);
            } else {
                warn!("keyboard lock requested without input permission");
                self.deny_permission(inner);
                return Err(InterceptorError::PermissionDenied);
            }
        }

        if inner.interceptor.is_installed() {
            inner.interceptor.enable();
        } else if let Err(e) = inner
            .interceptor
            .try_install(self.unlock_handle(), InstallMode::Engage)
        {
            match &e {
                InterceptorError::PermissionDenied => warn!("keyboard hook refused, permission missing"),
                // Indistinguishable from a permission problem for recovery purposes
                InterceptorError::HookInstallFailed(reason) => {
                    error!(reason = %reason, "keyboard hook install failed")
                }
            }
            self.deny_permission(inner);
            return Err(e);
        }

        inner.state.keyboard_locked = true;
        self.emit(LockEvent::KeyboardLocked);
        Ok(())
    }

    fn apply_link(&self, inner: &mut Inner, link: DeepLink) {
        let result = match link.command {
            LinkCommand::ToggleLock => {
                let locked = link.target.unwrap_or(!inner.state.screen_locked);
                self.set_screen_lock(inner, locked)
            }
            LinkCommand::ToggleKeyboardLock => {
                let locked = link.target.unwrap_or(!inner.state.keyboard_locked);
                self.set_keyboard_lock(inner, locked)
            }
        };
        if let Err(e) = result {
            debug!(?link, %e, "deep link not applied");
        }
    }

    fn grant_permission(&self, inner: &mut Inner) {
        inner.state.has_permission = true;
        if let Some(poller) = inner.poller.take() {
            poller.cancel();
        }
        info!("input permission granted");
        self.emit(LockEvent::PermissionGranted);
    }

    fn deny_permission(&self, inner: &mut Inner) {
        inner.state.has_permission = false;
        self.emit(LockEvent::PermissionDenied);
        self.start_polling(inner);
    }

    fn start_polling(&self, inner: &mut Inner) {
        if inner
            .poller
            .as_ref()
            .is_some_and(|poller| !poller.is_finished())
        {
            return;
        }

        let controller = self.this.clone();
        inner.poller = Some(PermissionPoller::spawn(
            &self.runtime,
            self.poll_interval,
            move || match controller.upgrade() {
                Some(controller) => controller.poll_permission(),
                None => true,
            },
        ));
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "polling for input permission"
        );
    }

    fn unlock_handle(&self) -> UnlockHandle {
        let sink: Weak<dyn UnlockSink> = self.this.clone();
        UnlockHandle::new(sink)
    }

    fn emit(&self, event: LockEvent) {
        debug!(%event, "emitting lock event");
        let _ = self.event_tx.send(event);
    }

    fn publish(&self, inner: &Inner) {
        let state = inner.state;
        debug_assert!(state.is_consistent(), "screen lock without keyboard lock");
        debug_assert_eq!(
            inner.interceptor.is_enabled(),
            state.keyboard_locked,
            "keyboard hook out of step with the keyboard lock"
        );

        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            info!(
                from = %*current,
                to = %state,
                has_permission = state.has_permission,
                "lock state transition"
            );
            *current = state;
            true
        });
    }
}

impl UnlockSink for LockController {
    /// Forced full unlock from the hotkey; a no-op when nothing is locked
    fn emergency_unlock(&self) {
        let mut inner = self.inner.lock();
        if !inner.state.is_locked() {
            debug!("emergency unlock while unlocked, ignoring");
            return;
        }

        warn!(from = %inner.state, "emergency unlock");
        if let Err(e) = self.set_screen_lock(&mut inner, false) {
            error!(%e, "emergency unlock failed");
        }
        self.emit(LockEvent::EmergencyUnlock);
        self.publish(&inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Shared call log for the fake collaborators
    #[derive(Default)]
    struct Recorder {
        access: AtomicBool,
        install_fails: AtomicBool,
        access_requests: AtomicUsize,
        settings_opened: AtomicUsize,
        installs: AtomicUsize,
        probes: AtomicUsize,
        destroys: AtomicUsize,
        hook_enabled: AtomicBool,
        shows: AtomicUsize,
        hides: AtomicUsize,
        unlock: Mutex<Option<UnlockHandle>>,
    }

    impl Recorder {
        fn count(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }

        /// Simulate Cmd+Shift+S arriving on the hook thread
        fn press_unlock_hotkey(&self) {
            let handle = self.unlock.lock().clone().expect("hook was never installed");
            std::thread::spawn(move || handle.fire())
                .join()
                .unwrap();
        }
    }

    struct FakeInterceptor {
        rec: Arc<Recorder>,
        installed: bool,
    }

    impl KeyboardInterceptor for FakeInterceptor {
        fn is_installed(&self) -> bool {
            self.installed
        }

        fn is_enabled(&self) -> bool {
            self.installed && self.rec.hook_enabled.load(Ordering::SeqCst)
        }

        fn try_install(
            &mut self,
            unlock: UnlockHandle,
            mode: InstallMode,
        ) -> Result<(), InterceptorError> {
            if self.rec.install_fails.load(Ordering::SeqCst) {
                return Err(InterceptorError::HookInstallFailed("conflicting tap".into()));
            }
            match mode {
                InstallMode::Engage => self.rec.installs.fetch_add(1, Ordering::SeqCst),
                InstallMode::Probe => self.rec.probes.fetch_add(1, Ordering::SeqCst),
            };
            self.installed = true;
            self.rec
                .hook_enabled
                .store(mode == InstallMode::Engage, Ordering::SeqCst);
            *self.rec.unlock.lock() = Some(unlock);
            Ok(())
        }

        fn enable(&mut self) {
            self.rec.hook_enabled.store(true, Ordering::SeqCst);
        }

        fn disable(&mut self) {
            self.rec.hook_enabled.store(false, Ordering::SeqCst);
        }

        fn destroy(&mut self) {
            if self.installed {
                self.installed = false;
                self.rec.hook_enabled.store(false, Ordering::SeqCst);
                self.rec.destroys.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct FakeGate(Arc<Recorder>);

    impl PermissionGate for FakeGate {
        fn has_access(&self) -> bool {
            self.0.access.load(Ordering::SeqCst)
        }

        fn request_access(&self) -> bool {
            self.0.access_requests.fetch_add(1, Ordering::SeqCst);
            self.has_access()
        }

        fn open_settings(&self) {
            self.0.settings_opened.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeOverlay(Arc<Recorder>);

    impl OverlayPresenter for FakeOverlay {
        fn show_for_each_display(&self, _display_label: &str) {
            self.0.shows.fetch_add(1, Ordering::SeqCst);
        }

        fn hide_all(&self) {
            self.0.hides.fetch_add(1, Ordering::SeqCst);
        }
    }

    const FULL: LockState = LockState {
        screen_locked: true,
        keyboard_locked: true,
        has_permission: true,
    };

    const KEYBOARD_ONLY: LockState = LockState {
        screen_locked: false,
        keyboard_locked: true,
        has_permission: true,
    };

    const UNLOCKED: LockState = LockState {
        screen_locked: false,
        keyboard_locked: false,
        has_permission: true,
    };

    fn create_controller(
        access: bool,
    ) -> (Arc<LockController>, Arc<Recorder>, broadcast::Receiver<LockEvent>) {
        let rec = Arc::new(Recorder::default());
        rec.access.store(access, Ordering::SeqCst);

        let (event_tx, event_rx) = broadcast::channel(64);
        let controller = LockController::new(
            LockDeps {
                interceptor: Box::new(FakeInterceptor {
                    rec: Arc::clone(&rec),
                    installed: false,
                }),
                gate: Arc::new(FakeGate(Arc::clone(&rec))),
                overlay: Arc::new(FakeOverlay(Arc::clone(&rec))),
            },
            event_tx,
            Duration::from_millis(10),
            Handle::current(),
        );
        (controller, rec, event_rx)
    }

    fn launched(access: bool) -> (Arc<LockController>, Arc<Recorder>) {
        let (controller, rec, _) = create_controller(access);
        controller.finish_launching();
        (controller, rec)
    }

    fn link(raw: &str) -> DeepLink {
        DeepLink::parse(raw, "wool").expect("test link should parse")
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (controller, _, _) = create_controller(true);
        assert_eq!(controller.snapshot(), LockState::default());

        controller.finish_launching();
        assert_eq!(controller.snapshot(), UNLOCKED);
    }

    #[tokio::test]
    async fn test_screen_lock_is_idempotent() {
        let (controller, rec) = launched(true);

        assert_eq!(controller.request_screen_lock(true).unwrap(), FULL);
        assert_eq!(controller.request_screen_lock(true).unwrap(), FULL);

        assert_eq!(Recorder::count(&rec.shows), 1);
        assert_eq!(Recorder::count(&rec.installs), 1);
        assert!(rec.hook_enabled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_keyboard_lock_reuses_installed_hook() {
        let (controller, rec) = launched(true);

        controller.toggle_keyboard_lock(None);
        controller.toggle_keyboard_lock(None);
        assert!(!rec.hook_enabled.load(Ordering::SeqCst));

        assert_eq!(controller.toggle_keyboard_lock(None), KEYBOARD_ONLY);
        assert_eq!(Recorder::count(&rec.installs), 1);
        assert!(rec.hook_enabled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_screen_toggle_from_keyboard_only_goes_full() {
        let (controller, rec) = launched(true);

        controller.toggle_keyboard_lock(None);
        assert_eq!(controller.toggle_screen_lock(None), FULL);
        assert_eq!(controller.toggle_screen_lock(None), UNLOCKED);
        assert_eq!(Recorder::count(&rec.shows), 1);
        assert_eq!(Recorder::count(&rec.hides), 1);
    }

    #[tokio::test]
    async fn test_emergency_unlock_from_full() {
        let (controller, rec) = launched(true);
        controller.request_screen_lock(true).unwrap();

        rec.press_unlock_hotkey();

        assert_eq!(controller.snapshot(), UNLOCKED);
        assert!(!rec.hook_enabled.load(Ordering::SeqCst));
        assert_eq!(Recorder::count(&rec.hides), 1);
    }

    #[tokio::test]
    async fn test_emergency_unlock_from_keyboard_only() {
        let (controller, rec) = launched(true);
        controller.request_keyboard_lock(true).unwrap();

        rec.press_unlock_hotkey();

        assert_eq!(controller.snapshot(), UNLOCKED);
        assert!(!rec.hook_enabled.load(Ordering::SeqCst));
        assert_eq!(Recorder::count(&rec.hides), 0);
    }

    #[tokio::test]
    async fn test_emergency_unlock_when_unlocked_is_noop() {
        let (controller, rec, mut events) = create_controller(true);
        controller.finish_launching();
        while events.try_recv().is_ok() {}

        controller.emergency_unlock();
        controller.emergency_unlock();

        assert_eq!(controller.snapshot(), UNLOCKED);
        assert_eq!(Recorder::count(&rec.hides), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deep_link_lock_with_permission() {
        let (controller, _) = launched(true);

        controller.deliver_deep_link(link("wool://toggle-lock/true"));
        assert_eq!(controller.snapshot(), FULL);
    }

    #[tokio::test]
    async fn test_deep_link_lock_without_permission_schedules_recheck() {
        let (controller, rec) = launched(false);

        controller.deliver_deep_link(link("wool://toggle-lock/true"));

        let state = controller.snapshot();
        assert!(!state.is_locked());
        assert!(!state.has_permission);
        assert!(controller.is_polling());
        assert_eq!(Recorder::count(&rec.access_requests), 1);
        assert_eq!(Recorder::count(&rec.installs), 0);
        assert_eq!(Recorder::count(&rec.shows), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_poller_confirms_permission_with_probe() {
        let (controller, rec) = launched(false);
        let mut state_rx = controller.subscribe();

        controller.toggle_keyboard_lock(None);
        assert!(controller.is_polling());

        rec.access.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), async {
            while !state_rx.borrow_and_update().has_permission {
                state_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("permission was never confirmed");

        // The probe hook is created and torn down, nothing gets locked
        assert_eq!(controller.snapshot(), UNLOCKED);
        assert_eq!(Recorder::count(&rec.probes), 1);
        assert_eq!(Recorder::count(&rec.destroys), 1);
        assert!(!controller.is_polling());
    }

    #[tokio::test]
    async fn test_keyboard_unlock_from_full_clears_screen() {
        let (controller, rec) = launched(true);
        controller.request_screen_lock(true).unwrap();

        controller.deliver_deep_link(link("wool://toggle-keyboard-lock/false"));

        assert_eq!(controller.snapshot(), UNLOCKED);
        assert_eq!(Recorder::count(&rec.hides), 1);
    }

    #[tokio::test]
    async fn test_mailbox_keeps_only_latest_link() {
        let (controller, rec, _) = create_controller(true);

        controller.deliver_deep_link(link("wool://toggle-lock/true"));
        controller.deliver_deep_link(link("wool://toggle-keyboard-lock/on"));
        assert_eq!(controller.snapshot(), LockState::default());

        controller.finish_launching();
        assert_eq!(controller.snapshot(), KEYBOARD_ONLY);
        assert_eq!(Recorder::count(&rec.shows), 0);

        // Launch only completes once
        controller.finish_launching();
        assert_eq!(controller.snapshot(), KEYBOARD_ONLY);
    }

    #[tokio::test]
    async fn test_malformed_payload_toggles() {
        let (controller, _) = launched(true);

        controller.deliver_deep_link(link("wool://toggle-lock/xyz"));
        assert_eq!(controller.snapshot(), FULL);

        controller.deliver_deep_link(link("wool://toggle-lock/xyz"));
        assert_eq!(controller.snapshot(), UNLOCKED);
    }

    #[tokio::test]
    async fn test_hook_install_failure_behaves_like_denied_permission() {
        let (controller, rec) = launched(true);
        rec.install_fails.store(true, Ordering::SeqCst);

        let result = controller.request_screen_lock(true);

        assert!(matches!(result, Err(InterceptorError::HookInstallFailed(_))));
        let state = controller.snapshot();
        assert!(!state.is_locked());
        assert!(!state.has_permission);
        assert!(controller.is_polling());
        assert_eq!(Recorder::count(&rec.shows), 0);
    }

    #[tokio::test]
    async fn test_open_settings_starts_polling_only_without_permission() {
        let (controller, rec) = launched(true);
        controller.open_privacy_settings();
        assert!(!controller.is_polling());

        let (controller, rec_denied) = launched(false);
        controller.open_privacy_settings();
        assert!(controller.is_polling());

        assert_eq!(Recorder::count(&rec.settings_opened), 1);
        assert_eq!(Recorder::count(&rec_denied.settings_opened), 1);
    }

    #[tokio::test]
    async fn test_invariant_holds_across_all_operations() {
        let (controller, rec) = launched(true);
        let mut state_rx = controller.subscribe();

        let ops: Vec<Box<dyn Fn(&LockController)>> = vec![
            Box::new(|c: &LockController| {
                c.toggle_screen_lock(None);
            }),
            Box::new(|c: &LockController| {
                c.toggle_keyboard_lock(None);
            }),
            Box::new(|c: &LockController| {
                let _ = c.request_screen_lock(true);
            }),
            Box::new(|c: &LockController| {
                let _ = c.request_keyboard_lock(false);
            }),
            Box::new(|c: &LockController| c.emergency_unlock()),
            Box::new(|c: &LockController| {
                let _ = c.request_keyboard_lock(true);
            }),
            Box::new(|c: &LockController| {
                let _ = c.request_screen_lock(false);
            }),
        ];

        // Every ordered pair of operations, starting from each reachable state
        for first in &ops {
            for second in &ops {
                first(&controller);
                second(&controller);
                let state = controller.snapshot();
                assert!(state.is_consistent(), "reached {state:?}");
                assert_eq!(state.keyboard_locked, rec.hook_enabled.load(Ordering::SeqCst));
                assert!(state_rx.borrow_and_update().is_consistent());
            }
        }
    }

    #[tokio::test]
    async fn test_events_follow_transitions() {
        let (controller, _, mut events) = create_controller(true);
        controller.finish_launching();

        controller.request_screen_lock(true).unwrap();
        controller.request_screen_lock(false).unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                LockEvent::KeyboardLocked,
                LockEvent::ScreenLocked,
                LockEvent::ScreenUnlocked,
                LockEvent::KeyboardUnlocked,
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let (controller, rec) = launched(true);
        controller.request_screen_lock(true).unwrap();

        controller.shutdown();
        controller.shutdown();

        assert_eq!(controller.snapshot(), UNLOCKED);
        assert_eq!(Recorder::count(&rec.destroys), 1);
        assert_eq!(Recorder::count(&rec.hides), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_poller() {
        let (controller, _) = launched(false);
        controller.toggle_screen_lock(None);
        assert!(controller.is_polling());

        controller.shutdown();
        assert!(!controller.is_polling());
    }

    #[tokio::test]
    async fn test_hotkey_thread_races_menu_actions() {
        let (controller, rec) = launched(true);
        controller.request_keyboard_lock(true).unwrap();
        let handle = rec.unlock.lock().clone().expect("hook was never installed");

        let stop = Arc::new(AtomicBool::new(false));
        let hotkey = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut presses = 0usize;
                while !stop.load(Ordering::SeqCst) {
                    handle.fire();
                    presses += 1;
                    std::thread::yield_now();
                }
                presses
            })
        };

        for round in 0..500 {
            let state = if round % 2 == 0 {
                controller.toggle_screen_lock(None)
            } else {
                controller.toggle_keyboard_lock(None)
            };
            assert!(state.is_consistent(), "round {round}: {state:?}");
            assert!(controller.snapshot().is_consistent());
        }

        stop.store(true, Ordering::SeqCst);
        let presses = hotkey.join().unwrap();
        assert!(presses > 0);

        let state = controller.snapshot();
        assert!(state.is_consistent());
        assert_eq!(state.keyboard_locked, rec.hook_enabled.load(Ordering::SeqCst));
        assert_eq!(Recorder::count(&rec.installs), 1);
    }
}
