pub mod daemon_manager;
pub mod keyboard_listener;
pub mod permissions;
pub mod process;

pub use daemon_manager::{daemon_status, run_daemon, stop_daemon, DaemonStatus, ProfileWatcher};
pub use keyboard_listener::HookService;
