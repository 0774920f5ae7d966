//! Output synthesis for fired triggers.
//!
//! Everything in here runs on the dispatcher thread. The hook thread only
//! hands over [`FireRequest`]s and checks the [`InjectionGuard`].

use crate::clipboard::ClipboardBackend;
use crate::error::{BinderError, Result};
use crate::keyboard::{create_keyboard_controller, send_backspace, send_paste_shortcut};
use crate::models::{InjectionMode, Trigger};
use crate::registry::StatusListener;
use enigo::{Direction, Enigo, Key, Keyboard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the guard stays up after output was sent. Some platforms hand
/// synthetic events to the hook asynchronously, after enigo has returned.
pub const SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Reentrancy flag raised while synthetic input is being sent.
///
/// Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct InjectionGuard {
    active: Arc<AtomicBool>,
}

impl InjectionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Raise the guard. Returns `None` when another injection holds it.
    pub fn enter(&self) -> Option<GuardToken> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| GuardToken {
                active: Arc::clone(&self.active),
            })
    }
}

/// Lowers the guard when dropped, including during unwinding.
#[derive(Debug)]
pub struct GuardToken {
    active: Arc<AtomicBool>,
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Synthetic keyboard output.
pub trait OutputBackend {
    fn type_text(&mut self, text: &str) -> Result<()>;

    fn backspace(&mut self, count: usize) -> Result<()>;

    fn paste_shortcut(&mut self) -> Result<()>;
}

pub struct EnigoOutput {
    keyboard: Enigo,
}

impl EnigoOutput {
    pub fn new() -> Result<Self> {
        Ok(Self {
            keyboard: create_keyboard_controller()?,
        })
    }
}

impl OutputBackend for EnigoOutput {
    fn type_text(&mut self, text: &str) -> Result<()> {
        type_text_with_newlines(&mut self.keyboard, text)
    }

    fn backspace(&mut self, count: usize) -> Result<()> {
        send_backspace(&mut self.keyboard, count)
    }

    fn paste_shortcut(&mut self) -> Result<()> {
        send_paste_shortcut(&mut self.keyboard)
    }
}

/// Type `text`, turning each newline into a Return key click.
pub fn type_text_with_newlines(keyboard: &mut impl Keyboard, text: &str) -> Result<()> {
    // Large strings are split so the platform input queue is not flooded.
    const CHUNK_SIZE: usize = 512;

    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            keyboard
                .key(Key::Return, Direction::Click)
                .map_err(|err| BinderError::Enigo(format!("Failed to type newline: {}", err)))?;
        }

        let chars: Vec<char> = line.trim_end_matches('\r').chars().collect();
        for chunk in chars.chunks(CHUNK_SIZE) {
            let chunk: String = chunk.iter().collect();
            keyboard
                .text(&chunk)
                .map_err(|err| BinderError::Enigo(format!("Failed to type text: {}", err)))?;
        }
    }

    Ok(())
}

/// A trigger that matched, plus how many typed characters to erase first.
#[derive(Debug, Clone, PartialEq)]
pub struct FireRequest {
    pub trigger: Trigger,
    pub erase: usize,
}

impl FireRequest {
    pub fn combo(trigger: Trigger) -> Self {
        Self { trigger, erase: 0 }
    }

    pub fn text(trigger: Trigger, erase: usize) -> Self {
        Self { trigger, erase }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Payload delivered with the given mode.
    Delivered(InjectionMode),
    /// The global switch is off.
    Disabled,
    /// Another injection was still in flight.
    Busy,
    Failed,
}

/// Performs output for fired triggers.
///
/// Paste mode overwrites the system clipboard. The clipboard is shared
/// with every other application and is written here without coordination.
pub struct Dispatcher {
    output: Option<Box<dyn OutputBackend>>,
    clipboard: Option<Box<dyn ClipboardBackend>>,
    guard: InjectionGuard,
    enabled: Arc<AtomicBool>,
    listener: Option<StatusListener>,
    settle: Duration,
}

impl Dispatcher {
    pub fn new(
        output: Option<Box<dyn OutputBackend>>,
        clipboard: Option<Box<dyn ClipboardBackend>>,
        guard: InjectionGuard,
        enabled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            output,
            clipboard,
            guard,
            enabled,
            listener: None,
            settle: SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_status_listener(mut self, listener: StatusListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn fire(&mut self, request: &FireRequest) -> FireOutcome {
        if !self.enabled.load(Ordering::SeqCst) {
            debug!(pattern = %request.trigger.pattern, "Engine disabled, not firing");
            return FireOutcome::Disabled;
        }

        let Some(token) = self.guard.enter() else {
            debug!(pattern = %request.trigger.pattern, "Injection in progress, dropping fire");
            return FireOutcome::Busy;
        };

        let result = self.deliver(request);
        // Our own keystrokes may still be on their way to the hook.
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        drop(token);

        match result {
            Ok(mode) => {
                info!(pattern = %request.trigger.pattern, ?mode, "Trigger fired");
                FireOutcome::Delivered(mode)
            }
            Err(e) => {
                warn!(pattern = %request.trigger.pattern, error = %e, "Injection failed");
                self.notify(&format!("injection failed: {}", e));
                FireOutcome::Failed
            }
        }
    }

    fn deliver(&mut self, request: &FireRequest) -> Result<InjectionMode> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| BinderError::BackendUnavailable("no keyboard output".to_string()))?;

        output.backspace(request.erase)?;

        let payload = &request.trigger.payload;
        match request.trigger.injection_mode {
            InjectionMode::Type => {
                output.type_text(payload)?;
                Ok(InjectionMode::Type)
            }
            InjectionMode::Paste => match self.clipboard.as_mut() {
                Some(clipboard) => match clipboard.set_text(payload) {
                    Ok(()) => {
                        output.paste_shortcut()?;
                        Ok(InjectionMode::Paste)
                    }
                    Err(e) => {
                        warn!(error = %e, "Clipboard write failed, typing instead");
                        output.type_text(payload)?;
                        Ok(InjectionMode::Type)
                    }
                },
                None => {
                    debug!("No clipboard backend, typing instead");
                    output.type_text(payload)?;
                    Ok(InjectionMode::Type)
                }
            },
        }
    }

    fn notify(&self, message: &str) {
        if let Some(listener) = &self.listener {
            listener(message);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Action {
        Typed(String),
        Backspace(usize),
        Paste,
        Clipboard(String),
    }

    /// Records every call; optionally fails typing.
    #[derive(Clone, Default)]
    pub(crate) struct FakeOutput {
        pub actions: Arc<Mutex<Vec<Action>>>,
        pub fail_typing: bool,
        pub guard_seen: Arc<Mutex<Vec<bool>>>,
        pub guard: Option<InjectionGuard>,
    }

    impl FakeOutput {
        fn observe_guard(&self) {
            if let Some(guard) = &self.guard {
                self.guard_seen.lock().push(guard.is_active());
            }
        }
    }

    impl OutputBackend for FakeOutput {
        fn type_text(&mut self, text: &str) -> Result<()> {
            self.observe_guard();
            if self.fail_typing {
                return Err(BinderError::Enigo("synthetic failure".to_string()));
            }
            self.actions.lock().push(Action::Typed(text.to_string()));
            Ok(())
        }

        fn backspace(&mut self, count: usize) -> Result<()> {
            self.observe_guard();
            self.actions.lock().push(Action::Backspace(count));
            Ok(())
        }

        fn paste_shortcut(&mut self) -> Result<()> {
            self.observe_guard();
            self.actions.lock().push(Action::Paste);
            Ok(())
        }
    }

    pub(crate) struct FakeClipboard {
        pub actions: Arc<Mutex<Vec<Action>>>,
        pub fail: bool,
    }

    impl ClipboardBackend for FakeClipboard {
        fn set_text(&mut self, text: &str) -> Result<()> {
            if self.fail {
                return Err(BinderError::Clipboard("locked".to_string()));
            }
            self.actions.lock().push(Action::Clipboard(text.to_string()));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn dispatcher(output: FakeOutput, clipboard: Option<FakeClipboard>) -> (Dispatcher, Arc<AtomicBool>) {
        let enabled = Arc::new(AtomicBool::new(true));
        let guard = output.guard.clone().unwrap_or_default();
        let clipboard = clipboard.map(|c| Box::new(c) as Box<dyn ClipboardBackend>);
        (
            Dispatcher::new(Some(Box::new(output)), clipboard, guard, enabled.clone())
                .with_settle_delay(Duration::ZERO),
            enabled,
        )
    }

    #[test]
    fn guard_token_clears_on_drop_and_blocks_reentry() {
        let guard = InjectionGuard::new();
        let token = guard.enter().unwrap();
        assert!(guard.is_active());
        assert!(guard.enter().is_none());
        drop(token);
        assert!(!guard.is_active());
        assert!(guard.enter().is_some());
    }

    #[test]
    fn guard_clears_even_when_the_holder_panics() {
        let guard = InjectionGuard::new();
        let inner = guard.clone();
        let result = std::panic::catch_unwind(move || {
            let _token = inner.enter().unwrap();
            panic!("synthesis blew up");
        });
        assert!(result.is_err());
        assert!(!guard.is_active());
    }

    #[test]
    fn type_mode_erases_then_types_under_guard() {
        let guard = InjectionGuard::new();
        let output = FakeOutput {
            guard: Some(guard.clone()),
            ..Default::default()
        };
        let actions = output.actions.clone();
        let seen = output.guard_seen.clone();
        let (mut dispatcher, _) = dispatcher(output, None);

        let trigger = Trigger::text(";sig", "Best regards").with_mode(InjectionMode::Type);
        let outcome = dispatcher.fire(&FireRequest::text(trigger, 4));

        assert_eq!(outcome, FireOutcome::Delivered(InjectionMode::Type));
        assert_eq!(
            *actions.lock(),
            vec![Action::Backspace(4), Action::Typed("Best regards".to_string())]
        );
        assert!(seen.lock().iter().all(|active| *active));
        assert!(!guard.is_active());
    }

    #[test]
    fn guard_stays_up_while_synthetic_input_settles() {
        let guard = InjectionGuard::new();
        let output = FakeOutput {
            guard: Some(guard.clone()),
            ..Default::default()
        };
        let actions = output.actions.clone();
        let worker_guard = guard.clone();

        let worker = thread::spawn(move || {
            let enabled = Arc::new(AtomicBool::new(true));
            let mut dispatcher = Dispatcher::new(Some(Box::new(output)), None, worker_guard, enabled)
                .with_settle_delay(Duration::from_millis(500));
            let trigger = Trigger::combo("F10", "hi").with_mode(InjectionMode::Type);
            dispatcher.fire(&FireRequest::combo(trigger))
        });

        let started = std::time::Instant::now();
        while actions.lock().len() < 2 {
            assert!(started.elapsed() < Duration::from_secs(5), "output never happened");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(guard.is_active());

        assert_eq!(worker.join().unwrap(), FireOutcome::Delivered(InjectionMode::Type));
        assert!(!guard.is_active());
    }

    #[test]
    fn paste_mode_writes_clipboard_then_sends_shortcut() {
        let output = FakeOutput::default();
        let actions = output.actions.clone();
        let clipboard = FakeClipboard {
            actions: actions.clone(),
            fail: false,
        };
        let (mut dispatcher, _) = dispatcher(output, Some(clipboard));

        let outcome = dispatcher.fire(&FireRequest::combo(Trigger::combo("F10", "hello")));

        assert_eq!(outcome, FireOutcome::Delivered(InjectionMode::Paste));
        assert_eq!(
            *actions.lock(),
            vec![
                Action::Backspace(0),
                Action::Clipboard("hello".to_string()),
                Action::Paste
            ]
        );
    }

    #[test]
    fn paste_without_clipboard_falls_back_to_typing() {
        let output = FakeOutput::default();
        let actions = output.actions.clone();
        let (mut dispatcher, _) = dispatcher(output, None);

        let outcome = dispatcher.fire(&FireRequest::combo(Trigger::combo("F10", "hello")));

        assert_eq!(outcome, FireOutcome::Delivered(InjectionMode::Type));
        assert!(actions.lock().contains(&Action::Typed("hello".to_string())));
    }

    #[test]
    fn failing_clipboard_falls_back_to_typing() {
        let output = FakeOutput::default();
        let actions = output.actions.clone();
        let clipboard = FakeClipboard {
            actions: actions.clone(),
            fail: true,
        };
        let (mut dispatcher, _) = dispatcher(output, Some(clipboard));

        let outcome = dispatcher.fire(&FireRequest::combo(Trigger::combo("F2", "x")));
        assert_eq!(outcome, FireOutcome::Delivered(InjectionMode::Type));
        assert!(!actions.lock().contains(&Action::Paste));
    }

    #[test]
    fn disabled_engine_fires_nothing() {
        let output = FakeOutput::default();
        let actions = output.actions.clone();
        let (mut dispatcher, enabled) = dispatcher(output, None);
        enabled.store(false, Ordering::SeqCst);

        let outcome = dispatcher.fire(&FireRequest::combo(Trigger::combo("F10", "hello")));

        assert_eq!(outcome, FireOutcome::Disabled);
        assert!(actions.lock().is_empty());
    }

    #[test]
    fn synthesis_failure_is_reported_and_guard_released() {
        let guard = InjectionGuard::new();
        let output = FakeOutput {
            fail_typing: true,
            guard: Some(guard.clone()),
            ..Default::default()
        };
        let statuses = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = statuses.clone();
        let (dispatcher, _) = dispatcher(output, None);
        let mut dispatcher =
            dispatcher.with_status_listener(Arc::new(move |msg: &str| sink.lock().push(msg.to_string())));

        let trigger = Trigger::combo("F3", "x").with_mode(InjectionMode::Type);
        assert_eq!(dispatcher.fire(&FireRequest::combo(trigger)), FireOutcome::Failed);

        assert!(!guard.is_active());
        assert_eq!(statuses.lock().len(), 1);
        assert!(statuses.lock()[0].starts_with("injection failed"));
    }

    #[test]
    fn busy_guard_drops_the_request() {
        let guard = InjectionGuard::new();
        let output = FakeOutput {
            guard: Some(guard.clone()),
            ..Default::default()
        };
        let actions = output.actions.clone();
        let (mut dispatcher, _) = dispatcher(output, None);

        let _held = guard.enter().unwrap();
        let outcome = dispatcher.fire(&FireRequest::combo(Trigger::combo("F4", "x")));
        assert_eq!(outcome, FireOutcome::Busy);
        assert!(actions.lock().is_empty());
    }

    #[test]
    fn missing_output_backend_is_reported_not_fatal() {
        let enabled = Arc::new(AtomicBool::new(true));
        let guard = InjectionGuard::new();
        let mut dispatcher = Dispatcher::new(None, None, guard.clone(), enabled);

        let outcome = dispatcher.fire(&FireRequest::combo(Trigger::combo("F5", "x")));
        assert_eq!(outcome, FireOutcome::Failed);
        assert!(!guard.is_active());
    }
}
