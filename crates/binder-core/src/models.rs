use crate::config::DEFAULT_CATEGORY;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// What makes a trigger fire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// A key combination such as `F10+1`, consumed before other apps see it.
    #[serde(rename = "hotkey")]
    Combo,
    /// A literal text fragment matched at the end of the typed buffer.
    #[serde(rename = "text")]
    TextPattern,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InjectionMode {
    #[default]
    Paste,
    Type,
}

/// A user-defined trigger bound to an output payload.
///
/// Field names on disk are `kind`, `key`, `text` and `mode`, the layout
/// existing profile files already use.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    #[serde(rename = "kind")]
    pub variant: TriggerKind,
    #[serde(rename = "key")]
    pub pattern: String,
    #[serde(rename = "text")]
    pub payload: String,
    #[serde(rename = "mode", default)]
    pub injection_mode: InjectionMode,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub favorite: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Trigger {
    pub fn combo(pattern: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(TriggerKind::Combo, pattern, payload)
    }

    pub fn text(pattern: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(TriggerKind::TextPattern, pattern, payload)
    }

    pub fn new(variant: TriggerKind, pattern: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            variant,
            pattern: pattern.into(),
            payload: payload.into(),
            injection_mode: InjectionMode::default(),
            enabled: true,
            category: default_category(),
            favorite: false,
        }
    }

    pub fn with_mode(mut self, mode: InjectionMode) -> Self {
        self.injection_mode = mode;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Pattern with surrounding whitespace removed, the form used for matching.
    pub fn trimmed_pattern(&self) -> &str {
        self.pattern.trim()
    }

    /// True when this trigger takes part in matching at all.
    pub fn is_active(&self, variant: TriggerKind) -> bool {
        self.enabled && self.variant == variant && !self.trimmed_pattern().is_empty()
    }
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A reusable message snippet with usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub uses_total: u64,
    #[serde(default)]
    pub uses_by_day: BTreeMap<String, u64>,
    #[serde(default)]
    pub last_used: Option<String>,
    #[serde(default)]
    pub copies_total: u64,
}

impl ContentItem {
    pub fn new(text: &str, hint: &str) -> Self {
        let now = Utc::now();
        let text = text.trim().to_string();
        let hint = hint.trim().to_string();
        Self {
            id: generate_id(&text, &hint, now),
            text,
            hint,
            created_at: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            uses_total: 0,
            uses_by_day: BTreeMap::new(),
            last_used: None,
            copies_total: 0,
        }
    }

    pub fn uses_on(&self, day: &str) -> u64 {
        self.uses_by_day.get(day).copied().unwrap_or(0)
    }

    /// Count one use at `now`; copies are counted separately.
    pub fn record_use(&mut self, as_copy: bool, now: NaiveDateTime) {
        let day = day_key(now.date());
        if as_copy {
            self.copies_total += 1;
        }
        self.uses_total += 1;
        *self.uses_by_day.entry(day).or_insert(0) += 1;
        self.last_used = Some(now.format("%Y-%m-%dT%H:%M:%S").to_string());
    }

    pub fn formatted_last_used(&self) -> String {
        let Some(last_used) = &self.last_used else {
            return "never".to_string();
        };
        let Ok(used_at) = NaiveDateTime::parse_from_str(last_used, "%Y-%m-%dT%H:%M:%S") else {
            return last_used.clone();
        };

        let duration = Local::now().naive_local().signed_duration_since(used_at);

        if duration.num_seconds() < 60 {
            format!("{}s ago", duration.num_seconds().max(0))
        } else if duration.num_minutes() < 60 {
            format!("{}m ago", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h ago", duration.num_hours())
        } else {
            format!("{}d ago", duration.num_days())
        }
    }
}

/// ISO date used as the per-day usage key.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn today_key() -> String {
    day_key(Local::now().date_naive())
}

// Hash of the content plus creation time and a process-wide counter, so two
// identical snippets added in the same nanosecond still get distinct ids.
fn generate_id(text: &str, hint: &str, now: DateTime<Utc>) -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(hint.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(seq.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("t_{}", hex)
}
