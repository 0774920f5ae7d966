use crate::config::{get_settings_path, DEFAULT_PROFILE};
use crate::error::Result;
use crate::storage::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::warn;

/// Application-wide settings kept in `settings.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_engine_enabled")]
    pub engine_enabled: bool,
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_engine_enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            engine_enabled: default_engine_enabled(),
        }
    }
}

impl Settings {
    pub fn load() -> Self {
        Self::load_from(&get_settings_path())
    }

    /// Missing files, bad JSON and wrongly typed fields all give defaults.
    pub fn load_from(path: &Path) -> Self {
        let Some(Value::Object(mut map)) = read_json(path) else {
            return Self::default();
        };

        let mut settings = Self::default();
        if let Some(Value::String(profile)) = map.remove("profile") {
            if !profile.trim().is_empty() {
                settings.profile = profile.trim().to_string();
            }
        }
        match map.remove("engine_enabled") {
            Some(Value::Bool(enabled)) => settings.engine_enabled = enabled,
            Some(other) => warn!(value = %other, "Ignoring invalid engine_enabled setting"),
            None => {}
        }
        settings
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&get_settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_or_corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(Settings::load_from(&path), Settings::default());

        fs::write(&path, "[1, 2").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn bad_fields_fall_back_individually() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"profile": "work", "engine_enabled": "yes", "theme": "dark"}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.profile, "work");
        assert!(settings.engine_enabled);
    }

    #[test]
    fn save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            profile: "alt".to_string(),
            engine_enabled: false,
        };

        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }
}
