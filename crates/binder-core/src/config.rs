use crate::error::{BinderError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CATEGORY: &str = "Uncategorized";
pub const DEFAULT_PROFILE: &str = "main";
pub const SHARE_PREFIX: &str = "WB1:";
pub const TEXT_BUFFER_CAPACITY: usize = 120;
pub const CONTENT_SCHEMA_VERSION: u32 = 2;
pub const EXPORT_FORMAT_VERSION: u32 = 1;

pub const PID_FILENAME: &str = "binder-daemon.pid";
pub const CONTENT_DB_FILENAME: &str = "content_bases.json";
pub const SETTINGS_FILENAME: &str = "settings.json";
pub const PROFILES_DIRNAME: &str = "profiles";
pub const LOGS_DIRNAME: &str = "logs";

/// Get the binder configuration directory
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = env::var("BINDER_HOME") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".binder"))
        .unwrap_or_else(|_| PathBuf::from(".binder"))
}

/// Ensure the configuration directory and its profile folder exist
pub fn ensure_config_dir() -> Result<PathBuf> {
    let config_dir = get_config_dir();
    let profiles_dir = config_dir.join(PROFILES_DIRNAME);
    if !profiles_dir.exists() {
        fs::create_dir_all(&profiles_dir)?;
    }
    Ok(config_dir)
}

pub fn get_pid_file_path() -> PathBuf {
    get_config_dir().join(PID_FILENAME)
}

pub fn get_profiles_dir() -> PathBuf {
    get_config_dir().join(PROFILES_DIRNAME)
}

pub fn get_content_db_path() -> PathBuf {
    get_config_dir().join(CONTENT_DB_FILENAME)
}

pub fn get_settings_path() -> PathBuf {
    get_config_dir().join(SETTINGS_FILENAME)
}

pub fn get_log_dir() -> PathBuf {
    get_config_dir().join(LOGS_DIRNAME)
}

/// Check if daemon is running
pub fn is_daemon_running() -> Result<Option<u32>> {
    read_pid_file(&get_pid_file_path())
}

pub(crate) fn read_pid_file(pid_file: &Path) -> Result<Option<u32>> {
    if !pid_file.exists() {
        return Ok(None);
    }

    match fs::read_to_string(pid_file) {
        Ok(contents) => match contents.trim().parse::<u32>() {
            Ok(pid) => Ok(Some(pid)),
            Err(_) => {
                // Invalid PID, treat as not running and clean up
                let _ = fs::remove_file(pid_file);
                Err(BinderError::InvalidPid)
            }
        },
        Err(_) => {
            let _ = fs::remove_file(pid_file);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_pid_file_means_not_running() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PID_FILENAME);
        assert!(read_pid_file(&path).unwrap().is_none());
    }

    #[test]
    fn garbage_pid_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PID_FILENAME);
        fs::write(&path, "not-a-pid").unwrap();

        assert!(matches!(read_pid_file(&path), Err(BinderError::InvalidPid)));
        assert!(!path.exists());
    }

    #[test]
    fn pid_file_is_parsed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PID_FILENAME);
        fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_pid_file(&path).unwrap(), Some(4242));
    }
}
