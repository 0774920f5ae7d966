//! Categorized library of reusable message snippets.
//!
//! The library is one versioned JSON document:
//! `{"version": 2, "areas": {area: {category: {"items": [...]}}}}`.
//! A document with any other version is discarded wholesale and replaced by
//! the empty default schema; there is no incremental migration.

use crate::config::{get_content_db_path, CONTENT_SCHEMA_VERSION, EXPORT_FORMAT_VERSION};
use crate::error::{BinderError, Result};
use crate::models::{today_key, ContentItem};
use crate::storage::{read_json, write_json_atomic};
use chrono::{Local, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fixed areas and the categories each one starts with.
pub const DEFAULT_AREAS: &[(&str, &[&str])] = &[
    (
        "ppv",
        &["Teaser", "Photo set", "Video", "Bundle", "Custom", "Follow-up"],
    ),
    ("mailing", &["Casual", "Lifestyle", "VIP"]),
];

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryBucket {
    #[serde(default)]
    pub items: Vec<ContentItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LibraryDocument {
    pub version: u32,
    pub areas: BTreeMap<String, BTreeMap<String, CategoryBucket>>,
}

impl Default for LibraryDocument {
    fn default() -> Self {
        let areas = DEFAULT_AREAS
            .iter()
            .map(|(area, categories)| {
                let buckets = categories
                    .iter()
                    .map(|c| (c.to_string(), CategoryBucket::default()))
                    .collect();
                (area.to_string(), buckets)
            })
            .collect();
        Self {
            version: CONTENT_SCHEMA_VERSION,
            areas,
        }
    }
}

/// Turn whatever was read from disk into a current document.
///
/// Missing input, a non-object, or a version other than the current one all
/// yield the default schema. For a current document, malformed items are
/// dropped and missing default buckets are re-created.
pub fn migrate(raw: Option<Value>) -> LibraryDocument {
    let mut doc = LibraryDocument::default();

    let Some(Value::Object(obj)) = raw else {
        return doc;
    };
    // Numeric comparison, so `2.0` counts as the current version.
    if obj.get("version").and_then(Value::as_f64) != Some(f64::from(CONTENT_SCHEMA_VERSION)) {
        info!(
            found = ?obj.get("version"),
            expected = CONTENT_SCHEMA_VERSION,
            "Content library version mismatch, starting from the default schema"
        );
        return doc;
    }

    let Some(Value::Object(areas)) = obj.get("areas") else {
        return doc;
    };

    for (area, categories) in areas {
        let Value::Object(categories) = categories else {
            continue;
        };
        let buckets = doc.areas.entry(area.clone()).or_default();
        for (category, bucket) in categories {
            let items = bucket
                .get("items")
                .and_then(Value::as_array)
                .map(|raw_items| {
                    raw_items
                        .iter()
                        .filter_map(|raw| match serde_json::from_value(raw.clone()) {
                            Ok(item) => Some(item),
                            Err(e) => {
                                warn!(%area, %category, error = %e, "Skipping malformed content item");
                                None
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            buckets.insert(category.clone(), CategoryBucket { items });
        }
    }

    doc
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub items: usize,
    pub used_today: usize,
    pub uses_total: u64,
}

pub struct ContentLibrary {
    path: Option<PathBuf>,
    doc: LibraryDocument,
}

impl ContentLibrary {
    /// Load the library from `path`. Never fails: unreadable or outdated
    /// files start a fresh default library.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = migrate(read_json(&path));
        Self {
            path: Some(path),
            doc,
        }
    }

    pub fn open_default() -> Self {
        Self::open(get_content_db_path())
    }

    /// A library that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: LibraryDocument::default(),
        }
    }

    pub fn document(&self) -> &LibraryDocument {
        &self.doc
    }

    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => write_json_atomic(path, &self.doc),
            None => Ok(()),
        }
    }

    // Write failures are reported but never undo the in-memory change.
    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "Failed to save content library");
        }
    }

    pub fn areas(&self) -> Vec<String> {
        self.doc.areas.keys().cloned().collect()
    }

    /// Category names of `area`, default categories first in their fixed order.
    pub fn categories(&self, area: &str) -> Vec<String> {
        let Some(buckets) = self.doc.areas.get(area) else {
            return Vec::new();
        };
        let defaults: &[&str] = DEFAULT_AREAS
            .iter()
            .find(|(name, _)| *name == area)
            .map(|(_, cats)| *cats)
            .unwrap_or(&[]);

        let mut names: Vec<String> = defaults
            .iter()
            .filter(|c| buckets.contains_key(**c))
            .map(|c| c.to_string())
            .collect();
        names.extend(
            buckets
                .keys()
                .filter(|k| !defaults.contains(&k.as_str()))
                .cloned(),
        );
        names
    }

    pub fn items(&self, area: &str, category: &str) -> Vec<ContentItem> {
        self.bucket(area, category)
            .map(|b| b.items.clone())
            .unwrap_or_default()
    }

    fn bucket(&self, area: &str, category: &str) -> Option<&CategoryBucket> {
        self.doc.areas.get(area)?.get(category)
    }

    fn bucket_mut(&mut self, area: &str, category: &str) -> Option<&mut CategoryBucket> {
        self.doc.areas.get_mut(area)?.get_mut(category)
    }

    // Known area: the bucket is created on demand. Unknown area: error.
    fn ensure_bucket(&mut self, area: &str, category: &str) -> Result<&mut CategoryBucket> {
        let buckets = self
            .doc
            .areas
            .get_mut(area)
            .ok_or_else(|| BinderError::UnknownArea(area.to_string()))?;
        Ok(buckets.entry(category.to_string()).or_default())
    }

    pub fn add(&mut self, area: &str, category: &str, text: &str, hint: &str) -> Result<ContentItem> {
        let item = ContentItem::new(text, hint);
        self.ensure_bucket(area, category)?.items.push(item.clone());
        debug!(%area, %category, id = %item.id, "Added content item");
        self.persist();
        Ok(item)
    }

    /// Replace text and hint of an item. Unknown ids are an error, unlike
    /// [`ContentLibrary::mark_used`].
    pub fn update(
        &mut self,
        area: &str,
        category: &str,
        id: &str,
        text: &str,
        hint: &str,
    ) -> Result<()> {
        let item = self
            .bucket_mut(area, category)
            .and_then(|b| b.items.iter_mut().find(|it| it.id == id))
            .ok_or_else(|| BinderError::NotFound(id.to_string()))?;
        item.text = text.trim().to_string();
        item.hint = hint.trim().to_string();
        self.persist();
        Ok(())
    }

    pub fn delete(&mut self, area: &str, category: &str, id: &str) -> Result<()> {
        let bucket = self
            .bucket_mut(area, category)
            .ok_or_else(|| BinderError::NotFound(id.to_string()))?;
        let before = bucket.items.len();
        bucket.items.retain(|it| it.id != id);
        if bucket.items.len() == before {
            return Err(BinderError::NotFound(id.to_string()));
        }
        self.persist();
        Ok(())
    }

    /// Record one use of an item. An unknown id is silently ignored.
    pub fn mark_used(&mut self, area: &str, category: &str, id: &str, as_copy: bool) {
        let now = Local::now().naive_local();
        let Some(item) = self
            .bucket_mut(area, category)
            .and_then(|b| b.items.iter_mut().find(|it| it.id == id))
        else {
            debug!(%area, %category, %id, "mark_used on unknown item ignored");
            return;
        };
        item.record_use(as_copy, now);
        self.persist();
    }

    pub fn pick_random(
        &self,
        area: &str,
        category: &str,
        only_not_used_today: bool,
    ) -> Option<ContentItem> {
        self.pick_random_with(&mut rand::thread_rng(), area, category, only_not_used_today)
    }

    /// Uniform pick, preferring items unused today when asked. Falls back to
    /// the whole category when every item was already used today.
    pub fn pick_random_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        area: &str,
        category: &str,
        only_not_used_today: bool,
    ) -> Option<ContentItem> {
        let items = self.bucket(area, category).map(|b| b.items.as_slice())?;
        if items.is_empty() {
            return None;
        }
        if !only_not_used_today {
            return items.choose(rng).cloned();
        }

        let today = today_key();
        let fresh: Vec<&ContentItem> = items.iter().filter(|it| it.uses_on(&today) == 0).collect();
        match fresh.choose(rng) {
            Some(item) => Some((*item).clone()),
            None => items.choose(rng).cloned(),
        }
    }

    pub fn stats(&self, area: &str, category: &str) -> CategoryStats {
        let today = today_key();
        let Some(bucket) = self.bucket(area, category) else {
            return CategoryStats::default();
        };
        CategoryStats {
            items: bucket.items.len(),
            used_today: bucket.items.iter().filter(|it| it.uses_on(&today) > 0).count(),
            uses_total: bucket.items.iter().map(|it| it.uses_total).sum(),
        }
    }

    pub fn import_json(&mut self, area: &str, category: &str, source: &Path) -> Result<usize> {
        let content = fs::read_to_string(source)?;
        self.import_json_str(area, category, &content)
    }

    /// Import snippets from JSON text and return how many were added.
    ///
    /// Accepts an array of strings and/or `{text, hint?}` objects, or an
    /// exported document with an `items` array. Other entries are skipped.
    pub fn import_json_str(&mut self, area: &str, category: &str, content: &str) -> Result<usize> {
        let parsed: Value =
            serde_json::from_str(content).map_err(|e| BinderError::MalformedImport(e.to_string()))?;

        let entries: &[Value] = match &parsed {
            Value::Array(entries) => entries.as_slice(),
            Value::Object(obj) => obj
                .get("items")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            _ => &[],
        };

        let new_items: Vec<ContentItem> = entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(text) if !text.trim().is_empty() => Some(ContentItem::new(text, "")),
                Value::Object(obj) => {
                    let text = obj.get("text").and_then(Value::as_str)?;
                    if text.trim().is_empty() {
                        return None;
                    }
                    let hint = obj.get("hint").and_then(Value::as_str).unwrap_or("");
                    Some(ContentItem::new(text, hint))
                }
                _ => None,
            })
            .collect();

        let added = new_items.len();
        self.ensure_bucket(area, category)?.items.extend(new_items);
        info!(%area, %category, added, skipped = entries.len() - added, "Imported content");
        self.persist();
        Ok(added)
    }

    /// Exported form of a category: text and hint only, no usage statistics.
    pub fn export_document(&self, area: &str, category: &str) -> Value {
        let items: Vec<Value> = self
            .items(area, category)
            .iter()
            .map(|it| json!({"text": it.text, "hint": it.hint}))
            .collect();
        json!({
            "version": EXPORT_FORMAT_VERSION,
            "area": area,
            "category": category,
            "exported_at": Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "items": items,
        })
    }

    pub fn export_json(&self, area: &str, category: &str, destination: &Path) -> Result<()> {
        write_json_atomic(destination, &self.export_document(area, category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use tempfile::TempDir;

    const AREA: &str = "ppv";
    const CAT: &str = "Teaser";

    #[test]
    fn default_schema_has_fixed_areas_and_categories() {
        let lib = ContentLibrary::in_memory();
        assert_eq!(lib.areas(), vec!["mailing".to_string(), "ppv".to_string()]);
        assert_eq!(
            lib.categories("ppv"),
            vec!["Teaser", "Photo set", "Video", "Bundle", "Custom", "Follow-up"]
        );
        assert_eq!(lib.categories("mailing"), vec!["Casual", "Lifestyle", "VIP"]);
        assert!(lib.categories("nope").is_empty());
    }

    #[test]
    fn wrong_or_missing_version_replaces_everything() {
        let stored = json!({
            "version": 1,
            "areas": {"ppv": {"Teaser": {"items": [{"id": "t_1", "text": "old"}]}}}
        });
        assert_eq!(migrate(Some(stored)), LibraryDocument::default());

        let unversioned = json!({"areas": {"ppv": {"Teaser": {"items": [{"id": "t_1", "text": "x"}]}}}});
        assert_eq!(migrate(Some(unversioned)), LibraryDocument::default());
        assert_eq!(migrate(Some(json!([1, 2]))), LibraryDocument::default());
        assert_eq!(migrate(None), LibraryDocument::default());
    }

    #[test]
    fn float_version_counts_as_current() {
        let stored = json!({
            "version": 2.0,
            "areas": {"ppv": {"Teaser": {"items": [{"id": "t_1", "text": "kept"}]}}}
        });
        let doc = migrate(Some(stored));
        assert_eq!(doc.areas["ppv"]["Teaser"].items.len(), 1);
        assert_eq!(doc.areas["ppv"]["Teaser"].items[0].text, "kept");

        let stored = json!({"version": 2.5, "areas": {}});
        assert_eq!(migrate(Some(stored)), LibraryDocument::default());
    }

    #[test]
    fn current_version_keeps_items_and_repairs_buckets() {
        let stored = json!({
            "version": 2,
            "areas": {
                "ppv": {
                    "Teaser": {"items": [{"id": "t_1", "text": "kept"}, {"no_id": true}]},
                    "Extra": {"items": []}
                }
            }
        });
        let doc = migrate(Some(stored));

        let ppv = &doc.areas["ppv"];
        assert_eq!(ppv["Teaser"].items.len(), 1);
        assert_eq!(ppv["Teaser"].items[0].text, "kept");
        assert!(ppv.contains_key("Extra"));
        assert!(ppv.contains_key("Video"));
        assert!(doc.areas.contains_key("mailing"));
    }

    #[test]
    fn add_creates_bucket_only_in_known_areas() {
        let mut lib = ContentLibrary::in_memory();
        lib.add("mailing", "Seasonal", "Happy holidays", "").unwrap();
        assert_eq!(lib.items("mailing", "Seasonal").len(), 1);

        assert!(matches!(
            lib.add("unknown", "Any", "text", ""),
            Err(BinderError::UnknownArea(_))
        ));
    }

    #[test]
    fn items_returns_a_snapshot() {
        let mut lib = ContentLibrary::in_memory();
        lib.add(AREA, CAT, "one", "").unwrap();
        let snapshot = lib.items(AREA, CAT);
        lib.add(AREA, CAT, "two", "").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(lib.items(AREA, CAT).len(), 2);
    }

    #[test]
    fn update_and_delete_report_missing_ids_but_mark_used_does_not() {
        let mut lib = ContentLibrary::in_memory();
        let item = lib.add(AREA, CAT, "hello", "").unwrap();

        lib.update(AREA, CAT, &item.id, " hi ", " greeting ").unwrap();
        let stored = &lib.items(AREA, CAT)[0];
        assert_eq!(stored.text, "hi");
        assert_eq!(stored.hint, "greeting");

        assert!(matches!(
            lib.update(AREA, CAT, "t_missing", "x", ""),
            Err(BinderError::NotFound(_))
        ));
        assert!(matches!(
            lib.delete(AREA, CAT, "t_missing"),
            Err(BinderError::NotFound(_))
        ));
        assert!(matches!(
            lib.delete(AREA, "No such category", &item.id),
            Err(BinderError::NotFound(_))
        ));

        // Asymmetric on purpose: an unknown id is silently ignored here.
        lib.mark_used(AREA, CAT, "t_missing", true);
        assert_eq!(lib.items(AREA, CAT)[0].uses_total, 0);

        lib.delete(AREA, CAT, &item.id).unwrap();
        assert!(lib.items(AREA, CAT).is_empty());
    }

    #[test]
    fn mark_used_twice_counts_uses_days_and_copies() {
        let mut lib = ContentLibrary::in_memory();
        let copied = lib.add(AREA, CAT, "copied", "").unwrap();
        let used = lib.add(AREA, CAT, "used", "").unwrap();

        lib.mark_used(AREA, CAT, &copied.id, true);
        lib.mark_used(AREA, CAT, &copied.id, true);
        lib.mark_used(AREA, CAT, &used.id, false);
        lib.mark_used(AREA, CAT, &used.id, false);

        let today = today_key();
        let items = lib.items(AREA, CAT);
        assert_eq!(items[0].uses_total, 2);
        assert_eq!(items[0].uses_on(&today), 2);
        assert_eq!(items[0].copies_total, 2);
        assert!(items[0].last_used.is_some());

        assert_eq!(items[1].uses_total, 2);
        assert_eq!(items[1].uses_on(&today), 2);
        assert_eq!(items[1].copies_total, 0);
    }

    #[test]
    fn pick_random_on_empty_category_is_none() {
        let lib = ContentLibrary::in_memory();
        assert!(lib.pick_random(AREA, CAT, false).is_none());
        assert!(lib.pick_random(AREA, CAT, true).is_none());
        assert!(lib.pick_random(AREA, "missing", true).is_none());
    }

    #[test]
    fn pick_random_prefers_items_not_used_today() {
        let mut lib = ContentLibrary::in_memory();
        let used = lib.add(AREA, CAT, "used", "").unwrap();
        let fresh = lib.add(AREA, CAT, "fresh", "").unwrap();
        lib.mark_used(AREA, CAT, &used.id, false);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let pick = lib.pick_random_with(&mut rng, AREA, CAT, true).unwrap();
            assert_eq!(pick.id, fresh.id);
        }
    }

    #[test]
    fn pick_random_falls_back_when_everything_was_used_today() {
        let mut lib = ContentLibrary::in_memory();
        let a = lib.add(AREA, CAT, "a", "").unwrap();
        let b = lib.add(AREA, CAT, "b", "").unwrap();
        lib.mark_used(AREA, CAT, &a.id, false);
        lib.mark_used(AREA, CAT, &b.id, true);

        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let pick = lib.pick_random_with(&mut rng, AREA, CAT, true).unwrap();
            seen.insert(pick.id);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn import_mixed_array_counts_accepted_entries() {
        let mut lib = ContentLibrary::in_memory();
        let added = lib
            .import_json_str(AREA, CAT, r#"["a", {"text": "b", "hint": "h"}, {"text": ""}, 42]"#)
            .unwrap();

        assert_eq!(added, 2);
        let items = lib.items(AREA, CAT);
        assert_eq!(items.len(), 2);
        assert_eq!((items[0].text.as_str(), items[0].hint.as_str()), ("a", ""));
        assert_eq!((items[1].text.as_str(), items[1].hint.as_str()), ("b", "h"));
    }

    #[test]
    fn import_of_invalid_json_is_a_hard_error() {
        let mut lib = ContentLibrary::in_memory();
        assert!(matches!(
            lib.import_json_str(AREA, CAT, "not json at all"),
            Err(BinderError::MalformedImport(_))
        ));
        assert!(lib.items(AREA, CAT).is_empty());
    }

    #[test]
    fn export_then_import_round_trips_text_and_hint_only() {
        let dir = TempDir::new().unwrap();
        let mut lib = ContentLibrary::in_memory();
        let item = lib.add(AREA, CAT, "hello", "wave").unwrap();
        lib.mark_used(AREA, CAT, &item.id, true);

        let export_path = dir.path().join("export.json");
        lib.export_json(AREA, CAT, &export_path).unwrap();

        let exported: Value = serde_json::from_str(&fs::read_to_string(&export_path).unwrap()).unwrap();
        assert_eq!(exported["version"], json!(EXPORT_FORMAT_VERSION));
        assert_eq!(exported["items"], json!([{"text": "hello", "hint": "wave"}]));

        let added = lib.import_json("mailing", "VIP", &export_path).unwrap();
        assert_eq!(added, 1);
        let imported = &lib.items("mailing", "VIP")[0];
        assert_eq!(imported.text, "hello");
        assert_eq!(imported.uses_total, 0);
        assert_ne!(imported.id, item.id);
    }

    #[test]
    fn stats_count_items_and_todays_uses() {
        let mut lib = ContentLibrary::in_memory();
        let a = lib.add(AREA, CAT, "a", "").unwrap();
        lib.add(AREA, CAT, "b", "").unwrap();
        lib.mark_used(AREA, CAT, &a.id, false);
        lib.mark_used(AREA, CAT, &a.id, false);

        assert_eq!(
            lib.stats(AREA, CAT),
            CategoryStats {
                items: 2,
                used_today: 1,
                uses_total: 2
            }
        );
    }

    #[test]
    fn changes_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("content_bases.json");

        let id = {
            let mut lib = ContentLibrary::open(&path);
            let item = lib.add(AREA, CAT, "persisted", "").unwrap();
            lib.mark_used(AREA, CAT, &item.id, true);
            item.id
        };

        let reopened = ContentLibrary::open(&path);
        let items = reopened.items(AREA, CAT);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].copies_total, 1);
    }

    #[test]
    fn outdated_file_on_disk_is_replaced_by_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("content_bases.json");
        fs::write(
            &path,
            r#"{"version": 1, "ppv": {"Teaser": {"items": [{"id": "x", "text": "legacy"}]}}}"#,
        )
        .unwrap();

        let lib = ContentLibrary::open(&path);
        assert!(lib.items(AREA, CAT).is_empty());
        assert_eq!(lib.document(), &LibraryDocument::default());
    }
}
