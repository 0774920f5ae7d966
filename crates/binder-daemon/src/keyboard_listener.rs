use binder_core::injection::{Dispatcher, EnigoOutput, FireRequest, InjectionGuard};
use binder_core::registry::{HookState, StatusListener, TriggerRegistry, STATUS_NO_BACKEND};
use binder_core::{ClipboardBackend, ClipboardChain, InputEvent, OutputBackend};
use parking_lot::Mutex;
use rdev::{self, Event};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAX_RETRIES: u32 = 5;
const DISPATCH_POLL: Duration = Duration::from_millis(200);

/// Decides, for one OS event, whether to swallow it.
type Handler = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// The global keyboard hook plus the thread that performs output.
///
/// The hook callback never synthesizes input itself. Matches are sent to
/// the dispatcher thread, so the OS callback returns immediately.
pub struct HookService {
    running: Arc<AtomicBool>,
    dispatcher_thread: Option<JoinHandle<()>>,
    hook_thread: Option<JoinHandle<()>>,
}

impl HookService {
    pub fn start(registry: Arc<TriggerRegistry>, status: StatusListener) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let guard = InjectionGuard::new();
        let (sender, receiver) = mpsc::channel::<FireRequest>();

        let dispatcher_thread = spawn_dispatcher(
            receiver,
            guard.clone(),
            registry.enabled_flag(),
            Arc::clone(&running),
            status.clone(),
        );

        let handler = make_handler(Arc::clone(&registry), guard, sender, Arc::clone(&running));
        let hook_running = Arc::clone(&running);
        let hook_thread = thread::spawn(move || run_hook(handler, hook_running, registry, status));

        info!("Keyboard hook started");
        Self {
            running,
            dispatcher_thread: Some(dispatcher_thread),
            hook_thread: Some(hook_thread),
        }
    }

    /// Stop reacting to input. The OS hook itself cannot be removed, so the
    /// callback keeps passing every event through until the process exits.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.dispatcher_thread.take() {
            if handle.join().is_err() {
                error!("Dispatcher thread panicked");
            }
        }
        // The hook thread stays blocked inside rdev; detach it.
        self.hook_thread.take();
        info!("Keyboard hook stopped");
    }
}

impl Drop for HookService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn make_handler(
    registry: Arc<TriggerRegistry>,
    guard: InjectionGuard,
    sender: Sender<FireRequest>,
    running: Arc<AtomicBool>,
) -> Handler {
    let state = Mutex::new(HookState::new());
    Arc::new(move |event: &Event| {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let Some(input) = InputEvent::from_rdev(event) else {
            return false;
        };

        let active = registry.snapshot();
        let outcome = state.lock().process(&input, &active, &guard);
        if let Some(request) = outcome.fire {
            if sender.send(request).is_err() {
                warn!("Dispatcher is gone, dropping trigger");
            }
        }
        outcome.suppress
    })
}

fn spawn_dispatcher(
    receiver: Receiver<FireRequest>,
    guard: InjectionGuard,
    enabled: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    status: StatusListener,
) -> JoinHandle<()> {
    thread::spawn(move || {
        // Output backends are created on this thread and never leave it.
        let output: Option<Box<dyn OutputBackend>> = match EnigoOutput::new() {
            Ok(output) => Some(Box::new(output)),
            Err(e) => {
                warn!(error = %e, "Keyboard output unavailable, triggers will not fire");
                status(&format!("keyboard output unavailable: {}", e));
                None
            }
        };
        let clipboard: Option<Box<dyn ClipboardBackend>> = Some(Box::new(ClipboardChain::system()));
        let mut dispatcher =
            Dispatcher::new(output, clipboard, guard, enabled).with_status_listener(status);

        while running.load(Ordering::SeqCst) {
            match receiver.recv_timeout(DISPATCH_POLL) {
                Ok(request) => {
                    let outcome = dispatcher.fire(&request);
                    debug!(pattern = %request.trigger.pattern, ?outcome, "Dispatched");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}

fn run_hook(
    handler: Handler,
    running: Arc<AtomicBool>,
    registry: Arc<TriggerRegistry>,
    status: StatusListener,
) {
    // Grabbing lets combos be swallowed before other applications see them.
    let grab_handler = Arc::clone(&handler);
    match rdev::grab(move |event| {
        if grab_handler(&event) {
            None
        } else {
            Some(event)
        }
    }) {
        Ok(()) => return,
        Err(e) => {
            warn!(error = ?e, "Keyboard grab unavailable, combos will not be suppressed");
        }
    }

    let mut retry_count = 0;
    while running.load(Ordering::SeqCst) && retry_count < MAX_RETRIES {
        let listen_handler = Arc::clone(&handler);
        match rdev::listen(move |event| {
            listen_handler(&event);
        }) {
            // listen only returns when the platform hook goes away.
            Ok(()) => break,
            Err(e) => {
                retry_count += 1;
                warn!(error = ?e, attempt = retry_count, max = MAX_RETRIES, "Keyboard listener failed, retrying");
                thread::sleep(Duration::from_secs(1));
            }
        }
    }

    if retry_count >= MAX_RETRIES {
        error!("Failed to start keyboard listener after {} attempts", MAX_RETRIES);
        registry.set_backend_available(false);
        status(STATUS_NO_BACKEND);
    }
}
