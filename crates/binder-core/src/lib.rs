pub mod clipboard;
pub mod config;
pub mod content;
pub mod error;
pub mod expansion;
pub mod injection;
pub mod keyboard;
pub mod logging;
pub mod models;
pub mod profile;
pub mod registry;
pub mod settings;
pub mod share;
pub mod storage;

// Re-export common items for convenience
pub use clipboard::{set_clipboard_text, ClipboardBackend, ClipboardChain};
pub use config::{get_config_dir, is_daemon_running, DEFAULT_CATEGORY, DEFAULT_PROFILE};
pub use content::{CategoryStats, ContentLibrary};
pub use error::{BinderError, Result};
pub use injection::{Dispatcher, EnigoOutput, FireOutcome, FireRequest, InjectionGuard, OutputBackend};
pub use keyboard::InputEvent;
pub use models::{ContentItem, InjectionMode, Trigger, TriggerKind};
pub use profile::{Profile, ProfileStore};
pub use registry::{ActiveTriggers, HookOutcome, HookState, StatusListener, TriggerRegistry};
pub use settings::Settings;
