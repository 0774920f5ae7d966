use crate::keyboard_listener::HookService;
use crate::permissions::hook_permission_hint;
use crate::process::{terminate_process, verify_process_running};
use binder_core::config::{ensure_config_dir, get_pid_file_path, get_settings_path};
use binder_core::registry::StatusListener;
use binder_core::{is_daemon_running, BinderError, ProfileStore, Result, Settings, TriggerRegistry};
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{info, warn};

const TICK: Duration = Duration::from_millis(100);
const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// What `status` found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(u32),
    /// A PID file exists but its process is gone.
    Stale(u32),
    Stopped,
}

pub fn daemon_status() -> Result<DaemonStatus> {
    let status = match is_daemon_running()? {
        Some(pid) if verify_process_running(pid) => DaemonStatus::Running(pid),
        Some(pid) => DaemonStatus::Stale(pid),
        None => DaemonStatus::Stopped,
    };
    Ok(status)
}

/// Stop a running worker. Returns the PID that was stopped.
pub fn stop_daemon() -> Result<u32> {
    let pid_file = get_pid_file_path();
    let pid = match is_daemon_running()? {
        Some(pid) => pid,
        None => return Err(BinderError::DaemonNotRunning),
    };

    if !verify_process_running(pid) {
        info!(pid, "Process is not running, removing stale PID file");
        let _ = fs::remove_file(&pid_file);
        return Err(BinderError::DaemonNotRunning);
    }

    info!(pid, "Stopping worker");
    if !terminate_process(pid) {
        warn!(pid, "Failed to stop worker process, PID file will be removed anyway");
    }
    let _ = fs::remove_file(&pid_file);
    Ok(pid)
}

/// Removes the PID file when the worker exits.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn create(path: PathBuf) -> Result<Self> {
        fs::write(&path, process::id().to_string())?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // A newer worker may already have claimed the file after `stop`.
        let ours = fs::read_to_string(&self.path)
            .map(|content| content.trim() == process::id().to_string())
            .unwrap_or(false);
        if ours {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Size and modification time of each watched file.
type Fingerprint = Vec<Option<(SystemTime, u64)>>;

fn fingerprint(paths: &[PathBuf]) -> Fingerprint {
    paths
        .iter()
        .map(|path| {
            fs::metadata(path)
                .ok()
                .and_then(|m| m.modified().ok().map(|t| (t, m.len())))
        })
        .collect()
}

/// Watches the active profile and the settings file and pushes changes
/// into the registry.
pub struct ProfileWatcher {
    store: ProfileStore,
    settings_path: PathBuf,
    profile_override: Option<String>,
    profile: String,
    profile_print: Fingerprint,
    settings_print: Fingerprint,
}

impl ProfileWatcher {
    pub fn new(store: ProfileStore, settings_path: impl Into<PathBuf>, profile_override: Option<String>) -> Self {
        Self {
            store,
            settings_path: settings_path.into(),
            profile_override,
            profile: String::new(),
            profile_print: Vec::new(),
            settings_print: Vec::new(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn profile_files(&self) -> Vec<PathBuf> {
        let dir = self.store.profile_dir(&self.profile);
        vec![
            dir.join(binder_core::profile::CATEGORIES_FILENAME),
            dir.join(binder_core::profile::TRIGGERS_FILENAME),
        ]
    }

    /// Apply whatever changed since the last call. The first call always
    /// applies. Returns whether the registry was re-applied.
    pub fn poll(&mut self, registry: &TriggerRegistry) -> Result<bool> {
        let mut reload = self.profile.is_empty();

        let settings_print = fingerprint(&[self.settings_path.clone()]);
        if settings_print != self.settings_print {
            self.settings_print = settings_print;
            let settings = Settings::load_from(&self.settings_path);
            registry.set_enabled(settings.engine_enabled);

            let wanted = self.profile_override.clone().unwrap_or(settings.profile);
            if wanted != self.profile {
                info!(profile = %wanted, "Switching profile");
                self.profile = wanted;
                reload = true;
            }
        }

        // Taken before reading, so a save racing the read shows up next poll.
        let profile_print = fingerprint(&self.profile_files());
        if profile_print != self.profile_print {
            reload = true;
        }

        if !reload {
            return Ok(false);
        }

        // Read-only: the CLI owns seeding and recovery.
        let profile = self.store.read(&self.profile)?;
        self.profile_print = profile_print;
        registry.apply(&profile.triggers);
        Ok(true)
    }
}

/// Run the hook service in the foreground until `shutdown` is set.
pub fn run_daemon_worker(
    watcher: &mut ProfileWatcher,
    registry: Arc<TriggerRegistry>,
    status: StatusListener,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    if let Some(hint) = hook_permission_hint() {
        warn!("{}", hint);
    }

    watcher.poll(&registry)?;
    let mut hook = HookService::start(Arc::clone(&registry), status);
    info!(profile = %watcher.profile(), "Worker running");

    watch_until_shutdown(watcher, &registry, &shutdown, CHECK_INTERVAL);

    // Joins the dispatcher, so a fire already underway completes.
    hook.stop();
    info!("Worker stopped");
    Ok(())
}

/// Poll `watcher` every `interval` until `shutdown` is set.
pub fn watch_until_shutdown(
    watcher: &mut ProfileWatcher,
    registry: &TriggerRegistry,
    shutdown: &AtomicBool,
    interval: Duration,
) {
    let mut last_check = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(TICK);
        if last_check.elapsed() < interval {
            continue;
        }
        last_check = Instant::now();

        if let Err(e) = watcher.poll(registry) {
            warn!(error = %e, "Failed to reload profile");
        }
    }
}

/// Entry point for `binder run`: claim the PID file and run until killed.
pub fn run_daemon(profile_override: Option<String>) -> Result<()> {
    if let DaemonStatus::Running(pid) = daemon_status()? {
        return Err(BinderError::Other(format!(
            "worker is already running with PID {}",
            pid
        )));
    }

    ensure_config_dir()?;
    let _pid_file = PidFile::create(get_pid_file_path())?;

    let registry = Arc::new(TriggerRegistry::new());
    let status: StatusListener = Arc::new(|message: &str| info!(status = message, "Status"));
    registry.set_status_listener(status.clone());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    // Covers Ctrl+C and the SIGTERM sent by `binder stop`.
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown requested");
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install shutdown handler");
    }

    let mut watcher = ProfileWatcher::new(ProfileStore::open_default(), get_settings_path(), profile_override);
    run_daemon_worker(&mut watcher, registry, status, shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use binder_core::{Profile, Trigger};
    use tempfile::TempDir;

    fn setup() -> (TempDir, ProfileStore, PathBuf) {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles"));
        let settings = dir.path().join("settings.json");
        (dir, store, settings)
    }

    #[test]
    fn first_poll_applies_the_configured_profile() {
        let (_dir, store, settings_path) = setup();
        let mut profile = Profile::new("work");
        profile.add_trigger(Trigger::combo("F10", "hi"));
        store.save(&profile).unwrap();
        Settings {
            profile: "work".to_string(),
            engine_enabled: false,
        }
        .save_to(&settings_path)
        .unwrap();

        let registry = TriggerRegistry::new();
        let mut watcher = ProfileWatcher::new(store, &settings_path, None);

        assert!(watcher.poll(&registry).unwrap());
        assert_eq!(watcher.profile(), "work");
        assert_eq!(registry.snapshot().combos().len(), 1);
        assert!(!registry.is_enabled());

        assert!(!watcher.poll(&registry).unwrap());
    }

    #[test]
    fn profile_edits_on_disk_are_reapplied() {
        let (_dir, store, settings_path) = setup();
        let registry = TriggerRegistry::new();
        let mut watcher = ProfileWatcher::new(store.clone(), &settings_path, Some("main".to_string()));
        watcher.poll(&registry).unwrap();
        assert!(registry.snapshot().is_empty());

        let mut profile = store.load("main").unwrap();
        profile.add_trigger(Trigger::text(";sig", "Regards"));
        store.save(&profile).unwrap();

        assert!(watcher.poll(&registry).unwrap());
        assert_eq!(registry.snapshot().text_triggers().len(), 1);
    }

    #[test]
    fn watch_loop_returns_once_shutdown_is_set() {
        let (_dir, store, settings_path) = setup();
        let registry = TriggerRegistry::new();
        let mut watcher = ProfileWatcher::new(store.clone(), &settings_path, Some("main".to_string()));
        watcher.poll(&registry).unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let writer = thread::spawn(move || {
            let mut profile = store.load("main").unwrap();
            profile.add_trigger(Trigger::combo("F8", "later"));
            store.save(&profile).unwrap();
            thread::sleep(Duration::from_millis(600));
            flag.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        watch_until_shutdown(&mut watcher, &registry, &shutdown, Duration::from_millis(100));
        writer.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(registry.snapshot().combos().len(), 1);
    }

    #[test]
    fn pid_file_is_left_alone_when_another_worker_owns_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("binder-daemon.pid");

        let pid_file = PidFile::create(path.clone()).unwrap();
        fs::write(&path, "4194999").unwrap();
        drop(pid_file);
        assert!(path.exists());

        let pid_file = PidFile::create(path.clone()).unwrap();
        drop(pid_file);
        assert!(!path.exists());
    }

    #[test]
    fn override_wins_over_settings_profile() {
        let (_dir, store, settings_path) = setup();
        Settings {
            profile: "other".to_string(),
            engine_enabled: true,
        }
        .save_to(&settings_path)
        .unwrap();

        let registry = TriggerRegistry::new();
        let mut watcher = ProfileWatcher::new(store, &settings_path, Some("pinned".to_string()));
        watcher.poll(&registry).unwrap();
        assert_eq!(watcher.profile(), "pinned");
    }
}
