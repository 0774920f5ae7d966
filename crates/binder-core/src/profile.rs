//! Named profiles: an ordered category list plus the triggers that use it.
//!
//! On disk a profile is `profiles/<name>/categories.json` and
//! `profiles/<name>/binds.json`. Both files are replaced together by
//! writing a sibling `<name>.staging` directory and swapping it in. Every
//! load and save holds an advisory lock on `<name>.lock`, so another process
//! never observes the swap half done.

use crate::config::{get_profiles_dir, DEFAULT_CATEGORY};
use crate::error::{BinderError, Result};
use crate::models::Trigger;
use crate::share;
use crate::storage::{read_json, write_json_atomic};
use fs2::FileExt;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

pub const CATEGORIES_FILENAME: &str = "categories.json";
pub const TRIGGERS_FILENAME: &str = "binds.json";

const STAGING_SUFFIX: &str = ".staging";
const BACKUP_SUFFIX: &str = ".old";
const LOCK_SUFFIX: &str = ".lock";

/// Categories written the first time a profile is referenced.
pub const SEED_CATEGORIES: &[&str] = &[DEFAULT_CATEGORY, "Greetings", "About me", "Offers"];

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub categories: Vec<String>,
    pub triggers: Vec<Trigger>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_parts(name, Vec::new(), Vec::new())
    }

    /// Build a profile and repair its category list.
    pub fn from_parts(name: impl Into<String>, categories: Vec<String>, triggers: Vec<Trigger>) -> Self {
        let mut profile = Self {
            name: name.into(),
            categories,
            triggers,
        };
        profile.repair();
        profile
    }

    /// The default category comes first; every category a trigger uses is
    /// listed. Existing order is kept otherwise.
    fn repair(&mut self) {
        let mut seen = BTreeSet::new();
        self.categories = std::mem::take(&mut self.categories)
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .collect();

        if !self.has_category(DEFAULT_CATEGORY) {
            self.categories.insert(0, DEFAULT_CATEGORY.to_string());
        }

        for i in 0..self.triggers.len() {
            let category = self.triggers[i].category.trim().to_string();
            if category.is_empty() {
                self.triggers[i].category = DEFAULT_CATEGORY.to_string();
            } else if !self.has_category(&category) {
                self.categories.push(category);
            }
        }
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c == name)
    }

    /// Append a category. Blank and existing names are ignored.
    pub fn add_category(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.has_category(name) {
            return false;
        }
        self.categories.push(name.to_string());
        true
    }

    /// Rename in place and move every trigger along.
    pub fn rename_category(&mut self, old: &str, new: &str) -> Result<()> {
        let new = new.trim();
        if !self.has_category(old) {
            return Err(BinderError::NotFound(format!("category '{}'", old)));
        }
        if old == DEFAULT_CATEGORY {
            return Err(BinderError::Other(
                "the default category cannot be renamed".to_string(),
            ));
        }
        if new.is_empty() {
            return Err(BinderError::Other("category name is empty".to_string()));
        }
        if self.has_category(new) {
            return Err(BinderError::Other(format!("category '{}' already exists", new)));
        }

        for category in self.categories.iter_mut().filter(|c| c.as_str() == old) {
            *category = new.to_string();
        }
        for trigger in self.triggers.iter_mut().filter(|t| t.category == old) {
            trigger.category = new.to_string();
        }
        Ok(())
    }

    /// Remove a category. Its triggers move to the default category.
    /// Returns how many triggers moved.
    pub fn delete_category(&mut self, name: &str) -> Result<usize> {
        if name == DEFAULT_CATEGORY {
            return Err(BinderError::Other(
                "the default category cannot be deleted".to_string(),
            ));
        }
        if !self.has_category(name) {
            return Err(BinderError::NotFound(format!("category '{}'", name)));
        }

        self.categories.retain(|c| c != name);
        let mut moved = 0;
        for trigger in self.triggers.iter_mut().filter(|t| t.category == name) {
            trigger.category = DEFAULT_CATEGORY.to_string();
            moved += 1;
        }
        Ok(moved)
    }

    /// Append a trigger, registering its category if new. Returns its index.
    pub fn add_trigger(&mut self, trigger: Trigger) -> usize {
        self.ensure_category_of(&trigger);
        self.triggers.push(trigger);
        self.triggers.len() - 1
    }

    pub fn update_trigger(&mut self, index: usize, trigger: Trigger) -> Result<()> {
        self.check_index(index)?;
        self.ensure_category_of(&trigger);
        self.triggers[index] = trigger;
        Ok(())
    }

    /// Remove the triggers at `indices`. Nothing is removed if any index is
    /// out of range.
    pub fn remove_triggers(&mut self, indices: &[usize]) -> Result<Vec<Trigger>> {
        let indices = self.check_indices(indices)?;
        let mut removed: Vec<Trigger> = indices
            .iter()
            .rev()
            .map(|&i| self.triggers.remove(i))
            .collect();
        removed.reverse();
        Ok(removed)
    }

    /// Copy a trigger to the end of the list with `_copy` added to its pattern.
    pub fn duplicate_trigger(&mut self, index: usize) -> Result<usize> {
        self.check_index(index)?;
        let mut copy = self.triggers[index].clone();
        copy.pattern.push_str("_copy");
        self.triggers.push(copy);
        Ok(self.triggers.len() - 1)
    }

    pub fn set_enabled_many(&mut self, indices: &[usize], enabled: bool) -> Result<()> {
        for i in self.check_indices(indices)? {
            self.triggers[i].enabled = enabled;
        }
        Ok(())
    }

    pub fn move_to_category(&mut self, indices: &[usize], category: &str) -> Result<()> {
        let indices = self.check_indices(indices)?;
        let category = match category.trim() {
            "" => DEFAULT_CATEGORY,
            name => name,
        };
        self.add_category(category);
        for i in indices {
            self.triggers[i].category = category.to_string();
        }
        Ok(())
    }

    /// Flip the favorite mark and return the new value.
    pub fn toggle_favorite(&mut self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        let trigger = &mut self.triggers[index];
        trigger.favorite = !trigger.favorite;
        Ok(trigger.favorite)
    }

    /// Decode a share code and append the trigger it carries.
    pub fn import_share_code(&mut self, code: &str) -> Result<usize> {
        let trigger = share::decode_trigger(code)?;
        Ok(self.add_trigger(trigger))
    }

    /// Indices into `triggers`, favorites first, then by category and pattern.
    pub fn listing_order(&self, category: Option<&str>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.triggers.len())
            .filter(|&i| category.map_or(true, |c| self.triggers[i].category == c))
            .collect();
        order.sort_by(|&a, &b| {
            let (a, b) = (&self.triggers[a], &self.triggers[b]);
            (!a.favorite, &a.category, &a.pattern).cmp(&(!b.favorite, &b.category, &b.pattern))
        });
        order
    }

    fn ensure_category_of(&mut self, trigger: &Trigger) {
        let category = trigger.category.clone();
        self.add_category(&category);
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.triggers.len() {
            Ok(())
        } else {
            Err(BinderError::NotFound(format!("trigger #{}", index)))
        }
    }

    fn check_indices(&self, indices: &[usize]) -> Result<Vec<usize>> {
        let unique: BTreeSet<usize> = indices.iter().copied().collect();
        for &i in &unique {
            self.check_index(i)?;
        }
        Ok(unique.into_iter().collect())
    }
}

/// Advisory lock on one profile, released on drop.
struct ProfileLock {
    file: File,
}

impl ProfileLock {
    fn acquire(path: &Path, exclusive: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(Self { file })
    }
}

impl Drop for ProfileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Reads and writes profiles under one root directory.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn open_default() -> Self {
        Self::new(get_profiles_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Load a profile, seeding it on first use.
    ///
    /// Unreadable files fall back to defaults and bad trigger entries are
    /// skipped, so this only fails for an invalid profile name.
    pub fn load(&self, name: &str) -> Result<Profile> {
        validate_name(name)?;
        let _lock = self.lock(name, true)?;
        self.recover(name);

        let dir = self.profile_dir(name);
        if !dir.join(CATEGORIES_FILENAME).exists() {
            let seeded = seed_profile(name, &dir);
            if let Err(e) = self.write_locked(&seeded) {
                warn!(profile = name, error = %e, "Failed to seed profile");
            } else {
                info!(profile = name, "Seeded new profile");
            }
            return Ok(seeded);
        }

        Ok(read_profile_dir(name, &dir))
    }

    /// Load a profile without touching the disk.
    ///
    /// Used by the running worker. A profile that does not exist yet reads
    /// as its seed, and the copy left by an interrupted save is read in
    /// place instead of being restored.
    pub fn read(&self, name: &str) -> Result<Profile> {
        validate_name(name)?;
        let _lock = self.lock(name, false)?;

        let dir = self.profile_dir(name);
        let backup = self.sibling(name, BACKUP_SUFFIX);
        for source in [&dir, &backup] {
            if source.join(CATEGORIES_FILENAME).exists() {
                return Ok(read_profile_dir(name, source));
            }
        }
        Ok(seed_profile(name, &dir))
    }

    /// Write both files of a profile as one unit.
    pub fn save(&self, profile: &Profile) -> Result<()> {
        validate_name(&profile.name)?;
        let _lock = self.lock(&profile.name, true)?;
        self.write_locked(profile)
    }

    fn lock(&self, name: &str, exclusive: bool) -> Result<ProfileLock> {
        ProfileLock::acquire(&self.sibling(name, LOCK_SUFFIX), exclusive)
    }

    // Caller holds the exclusive lock.
    fn write_locked(&self, profile: &Profile) -> Result<()> {
        let dir = self.profile_dir(&profile.name);
        let staging = self.sibling(&profile.name, STAGING_SUFFIX);
        let backup = self.sibling(&profile.name, BACKUP_SUFFIX);

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        write_json_atomic(&staging.join(CATEGORIES_FILENAME), &profile.categories)?;
        write_json_atomic(&staging.join(TRIGGERS_FILENAME), &profile.triggers)?;

        if backup.exists() {
            fs::remove_dir_all(&backup)?;
        }
        if dir.exists() {
            fs::rename(&dir, &backup)?;
        }
        fs::rename(&staging, &dir)?;
        if backup.exists() {
            if let Err(e) = fs::remove_dir_all(&backup) {
                warn!(path = %backup.display(), error = %e, "Failed to remove previous profile copy");
            }
        }

        debug!(profile = %profile.name, triggers = profile.triggers.len(), "Saved profile");
        Ok(())
    }

    /// Names of the profiles on disk, sorted.
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                ![STAGING_SUFFIX, BACKUP_SUFFIX, LOCK_SUFFIX]
                    .iter()
                    .any(|suffix| name.ends_with(suffix))
            })
            .collect();
        names.sort();
        names
    }

    /// Latest modification time of a profile's files, used to notice edits.
    pub fn modified(&self, name: &str) -> Option<SystemTime> {
        let dir = self.profile_dir(name);
        [CATEGORIES_FILENAME, TRIGGERS_FILENAME]
            .iter()
            .filter_map(|file| fs::metadata(dir.join(file)).and_then(|m| m.modified()).ok())
            .max()
    }

    fn sibling(&self, name: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, suffix))
    }

    // A save interrupted between its two renames leaves only `<name>.old`.
    fn recover(&self, name: &str) {
        let dir = self.profile_dir(name);
        let backup = self.sibling(name, BACKUP_SUFFIX);
        if !dir.exists() && backup.exists() {
            match fs::rename(&backup, &dir) {
                Ok(()) => warn!(profile = name, "Restored profile from interrupted save"),
                Err(e) => warn!(profile = name, error = %e, "Failed to restore profile"),
            }
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name != name.trim()
        || name.contains(['/', '\\'])
        || name == "."
        || name == ".."
        || name.ends_with(STAGING_SUFFIX)
        || name.ends_with(BACKUP_SUFFIX)
        || name.ends_with(LOCK_SUFFIX);
    if invalid {
        return Err(BinderError::Other(format!("invalid profile name '{}'", name)));
    }
    Ok(())
}

fn seed_profile(name: &str, dir: &Path) -> Profile {
    Profile::from_parts(
        name,
        SEED_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        read_triggers(&dir.join(TRIGGERS_FILENAME)),
    )
}

fn read_profile_dir(name: &str, dir: &Path) -> Profile {
    let categories = read_categories(&dir.join(CATEGORIES_FILENAME));
    let triggers = read_triggers(&dir.join(TRIGGERS_FILENAME));
    debug!(
        profile = name,
        categories = categories.len(),
        triggers = triggers.len(),
        "Loaded profile"
    );
    Profile::from_parts(name, categories, triggers)
}

fn read_categories(path: &Path) -> Vec<String> {
    match read_json(path) {
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(_) => {
            warn!(path = %path.display(), "Categories file is not a list, using defaults");
            Vec::new()
        }
        None => Vec::new(),
    }
}

fn read_triggers(path: &Path) -> Vec<Trigger> {
    let Some(Value::Array(values)) = read_json(path) else {
        return Vec::new();
    };
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Trigger>(value) {
            Ok(trigger) => Some(trigger),
            Err(e) => {
                debug!(error = %e, "Skipping malformed trigger entry");
                None
            }
        })
        .collect()
}
