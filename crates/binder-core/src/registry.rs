//! The set of active triggers and the per-event matching state of the hook.
//!
//! [`TriggerRegistry`] owns an immutable [`ActiveTriggers`] snapshot that is
//! swapped wholesale on [`TriggerRegistry::apply`]. The hook thread reads the
//! current snapshot for every event and feeds it to its own [`HookState`].

use crate::error::BinderError;
use crate::expansion::{erase_count, find_text_match, TextBuffer};
use crate::injection::{FireRequest, InjectionGuard};
use crate::keyboard::{classify_key, normalize_key, InputEvent, KeyCombo, KeyInput};
use crate::models::{Trigger, TriggerKind};
use parking_lot::RwLock;
use rdev::Key;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives human-readable status lines for the presentation layer.
pub type StatusListener = Arc<dyn Fn(&str) + Send + Sync>;

pub const STATUS_UPDATED: &str = "triggers updated";
pub const STATUS_NO_BACKEND: &str = "no input backend available, triggers saved but inactive";

/// Immutable snapshot of what the hook matches against.
#[derive(Debug, Default)]
pub struct ActiveTriggers {
    /// Combos in registration order: longest pattern first.
    combos: Vec<(KeyCombo, Trigger)>,
    /// Enabled text triggers in profile order.
    texts: Vec<Trigger>,
}

impl ActiveTriggers {
    pub fn combos(&self) -> &[(KeyCombo, Trigger)] {
        &self.combos
    }

    pub fn text_triggers(&self) -> &[Trigger] {
        &self.texts
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty() && self.texts.is_empty()
    }

    fn match_held(&self, held: &[Key]) -> Option<&(KeyCombo, Trigger)> {
        self.combos.iter().find(|(combo, _)| combo.matches_held(held))
    }

    fn has_extension(&self, combo: &KeyCombo) -> bool {
        self.combos
            .iter()
            .any(|(other, _)| combo.is_strict_subset_of(other))
    }
}

#[derive(Debug)]
pub struct ApplyReport {
    pub combos: usize,
    pub texts: usize,
    pub failures: Vec<BinderError>,
    pub status: String,
}

pub struct TriggerRegistry {
    active: RwLock<Arc<ActiveTriggers>>,
    enabled: Arc<AtomicBool>,
    backend_available: AtomicBool,
    listener: RwLock<Option<StatusListener>>,
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(Arc::new(ActiveTriggers::default())),
            enabled: Arc::new(AtomicBool::new(true)),
            backend_available: AtomicBool::new(true),
            listener: RwLock::new(None),
        }
    }

    pub fn set_status_listener(&self, listener: StatusListener) {
        *self.listener.write() = Some(listener);
    }

    /// Whether an input hook is installed. Without one triggers are kept
    /// but can never fire.
    pub fn set_backend_available(&self, available: bool) {
        self.backend_available.store(available, Ordering::SeqCst);
    }

    pub fn backend_available(&self) -> bool {
        self.backend_available.load(Ordering::SeqCst)
    }

    /// Replace the active set: clear, then register every enabled trigger.
    ///
    /// Combos are registered longest pattern first, so `F10+1` is always
    /// considered before `F10`. A pattern that fails to parse is logged and
    /// skipped without affecting the others.
    pub fn apply(&self, triggers: &[Trigger]) -> ApplyReport {
        self.clear();

        let mut candidates: Vec<&Trigger> = triggers
            .iter()
            .filter(|t| t.is_active(TriggerKind::Combo))
            .collect();
        // Stable sort: equal lengths keep profile order.
        candidates.sort_by_key(|t| Reverse(t.trimmed_pattern().chars().count()));

        let mut combos = Vec::with_capacity(candidates.len());
        let mut failures = Vec::new();
        for trigger in candidates {
            match KeyCombo::parse(&trigger.pattern) {
                Ok(combo) => {
                    debug!(pattern = %combo.source(), "Registered combo");
                    combos.push((combo, trigger.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "Skipping trigger");
                    self.notify(&e.to_string());
                    failures.push(e);
                }
            }
        }

        let texts: Vec<Trigger> = triggers
            .iter()
            .filter(|t| t.is_active(TriggerKind::TextPattern))
            .cloned()
            .collect();

        let snapshot = ActiveTriggers { combos, texts };
        let (combo_count, text_count) = (snapshot.combos.len(), snapshot.texts.len());
        *self.active.write() = Arc::new(snapshot);

        let status = if self.backend_available() {
            STATUS_UPDATED
        } else {
            STATUS_NO_BACKEND
        };
        info!(combos = combo_count, texts = text_count, "{}", status);
        self.notify(status);

        ApplyReport {
            combos: combo_count,
            texts: text_count,
            failures,
            status: status.to_string(),
        }
    }

    /// Drop every registration. Safe to call repeatedly.
    pub fn clear(&self) {
        let mut active = self.active.write();
        if !active.is_empty() {
            *active = Arc::new(ActiveTriggers::default());
        }
    }

    pub fn snapshot(&self) -> Arc<ActiveTriggers> {
        Arc::clone(&self.active.read())
    }

    /// Global kill switch. Registrations stay installed; only firing stops.
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            let status = if enabled {
                "engine enabled"
            } else {
                "engine disabled"
            };
            info!("{}", status);
            self.notify(status);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// The flag the dispatcher checks before firing.
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }

    fn notify(&self, message: &str) {
        if let Some(listener) = self.listener.read().as_ref() {
            listener(message);
        }
    }
}

/// What the hook should do with one event.
#[derive(Debug, Default, PartialEq)]
pub struct HookOutcome {
    /// Keep the event from reaching other applications.
    pub suppress: bool,
    pub fire: Option<FireRequest>,
}

impl HookOutcome {
    fn pass() -> Self {
        Self::default()
    }

    fn suppressed(fire: Option<FireRequest>) -> Self {
        Self {
            suppress: true,
            fire,
        }
    }
}

#[derive(Debug)]
struct PendingCombo {
    combo: KeyCombo,
    trigger: Trigger,
}

/// Matching state owned by the hook thread.
#[derive(Debug, Default)]
pub struct HookState {
    held: Vec<Key>,
    /// Keys whose press was consumed; their repeats and release are too.
    swallowed: Vec<Key>,
    /// A combo that matched but could still grow into a longer one.
    pending: Option<PendingCombo>,
    /// Printable keys that are down, committed to the buffer on release.
    pressed: Vec<(Key, KeyInput)>,
    buffer: TextBuffer,
}

impl HookState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    pub fn process(
        &mut self,
        event: &InputEvent,
        active: &ActiveTriggers,
        guard: &InjectionGuard,
    ) -> HookOutcome {
        if guard.is_active() {
            // Synthetic input: only forget keys that went up.
            if let InputEvent::Release { key } = event {
                let key = normalize_key(*key);
                self.held.retain(|k| *k != key);
                self.pressed.retain(|(k, _)| *k != key);
                if take(&mut self.swallowed, key) {
                    return HookOutcome::suppressed(None);
                }
            }
            return HookOutcome::pass();
        }

        match event {
            InputEvent::Press { key, name } => self.on_press(*key, name.as_deref(), active),
            InputEvent::Release { key } => self.on_release(*key, active),
        }
    }

    fn on_press(&mut self, raw: Key, name: Option<&str>, active: &ActiveTriggers) -> HookOutcome {
        let key = normalize_key(raw);

        if self.held.contains(&key) {
            // Auto-repeat.
            if self.swallowed.contains(&key) {
                return HookOutcome::suppressed(None);
            }
            return HookOutcome::pass();
        }
        self.held.push(key);

        if let Some(pending) = self.pending.take() {
            debug!(pattern = %pending.combo.source(), "Deferred combo cancelled");
        }

        if let Some((combo, trigger)) = active.match_held(&self.held) {
            self.swallowed.push(key);
            if active.has_extension(combo) {
                debug!(pattern = %combo.source(), "Combo matched, waiting for release");
                self.pending = Some(PendingCombo {
                    combo: combo.clone(),
                    trigger: trigger.clone(),
                });
                return HookOutcome::suppressed(None);
            }
            debug!(pattern = %combo.source(), "Combo matched");
            return HookOutcome::suppressed(Some(FireRequest::combo(trigger.clone())));
        }

        match classify_key(raw, name) {
            KeyInput::Ignored => {}
            input => {
                self.pressed.retain(|(k, _)| *k != key);
                self.pressed.push((key, input));
            }
        }
        HookOutcome::pass()
    }

    fn on_release(&mut self, raw: Key, active: &ActiveTriggers) -> HookOutcome {
        let key = normalize_key(raw);
        self.held.retain(|k| *k != key);
        let suppress = take(&mut self.swallowed, key);

        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.combo.contains(key))
        {
            if let Some(pending) = self.pending.take() {
                debug!(pattern = %pending.combo.source(), "Deferred combo fired on release");
                return HookOutcome {
                    suppress,
                    fire: Some(FireRequest::combo(pending.trigger)),
                };
            }
        }

        let input = match self.pressed.iter().position(|(k, _)| *k == key) {
            Some(index) => self.pressed.remove(index).1,
            None => return HookOutcome { suppress, fire: None },
        };

        if !self.buffer.apply(input) {
            return HookOutcome { suppress, fire: None };
        }

        let fire = find_text_match(&self.buffer, active.text_triggers()).map(|trigger| {
            debug!(pattern = %trigger.pattern, "Text trigger matched");
            FireRequest::text(trigger.clone(), erase_count(trigger))
        });
        if fire.is_some() {
            self.buffer.clear();
        }

        HookOutcome { suppress, fire }
    }
}

fn take(keys: &mut Vec<Key>, key: Key) -> bool {
    match keys.iter().position(|k| *k == key) {
        Some(index) => {
            keys.remove(index);
            true
        }
        None => false,
    }
}
