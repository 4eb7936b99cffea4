//! Persistent build cache.
//!
//! Maps the canonical input path (site-relative, `/`-separated) to the
//! timestamp it was last processed at and the output it produced:
//!
//! ```json
//! {
//!   "inputs/index.md": { "lastUpdate": 1700000000.5, "outputPath": "outputs/index.html" },
//!   "layouts/layout.html": { "lastUpdate": 1700000000.0, "outputPath": null }
//! }
//! ```
//!
//! The store is loaded once at startup and rewritten wholesale at the end of
//! each full build. Nothing is persisted in between.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file `{}` could not be accessed", .0.display())]
    Io(PathBuf, #[source] io::Error),

    #[error("cache file `{}` is not valid JSON", .0.display())]
    Json(PathBuf, #[source] serde_json::Error),
}

/// Last known state of one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Input mtime (float unix seconds) the last time it was processed.
    pub last_update: f64,
    /// Output produced from the input. Layouts have none.
    #[serde(default)]
    pub output_path: Option<String>,
}

impl CacheEntry {
    pub fn new(last_update: f64, output_path: Option<String>) -> Self {
        Self {
            last_update,
            output_path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheStore {
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheStore {
    /// Load the store, creating an empty one on disk if the file is missing.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            let store = Self::default();
            store.save(path)?;
            return Ok(store);
        }

        let content =
            fs::read_to_string(path).map_err(|err| CacheError::Io(path.to_path_buf(), err))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|err| CacheError::Json(path.to_path_buf(), err))
    }

    /// Rewrite the whole store through a temp file and a rename.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let io_err = |err| CacheError::Io(path.to_path_buf(), err);

        let json = serde_json::to_string_pretty(self)
            .map_err(|err| CacheError::Json(path.to_path_buf(), err))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    pub fn set(&mut self, key: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(key.into(), entry);
    }

    /// Remove one entry. A missing key is not an error.
    pub fn delete(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Remove `prefix` itself and every key below it (`prefix/...`).
    ///
    /// Returns how many entries were dropped.
    pub fn delete_prefix(&mut self, prefix: &str) -> usize {
        let prefix = prefix.trim_end_matches('/');
        let nested = format!("{prefix}/");
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key != prefix && !key.starts_with(&nested));
        before - self.entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(t: f64, out: &str) -> CacheEntry {
        CacheEntry::new(t, Some(out.to_string()))
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".kiln_caches.json");

        let store = CacheStore::load(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut store = CacheStore::default();
        store.set("inputs/index.md", entry(1_700_000_000.5, "outputs/index.html"));
        store.set("layouts/layout.html", CacheEntry::new(10.0, None));
        store.save(&path).unwrap();

        assert!(!dir.path().join("cache.json.tmp").exists());
        assert_eq!(CacheStore::load(&path).unwrap(), store);
    }

    #[test]
    fn test_wire_format() {
        let mut store = CacheStore::default();
        store.set("inputs/index.md", entry(12.5, "outputs/index.html"));

        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "inputs/index.md": { "lastUpdate": 12.5, "outputPath": "outputs/index.html" }
            })
        );
    }

    #[test]
    fn test_reads_entry_without_output_path() {
        let store: CacheStore =
            serde_json::from_str(r#"{"layouts/a.html": {"lastUpdate": 3}}"#).unwrap();
        assert_eq!(store.get("layouts/a.html"), Some(&CacheEntry::new(3.0, None)));
    }

    #[test]
    fn test_load_invalid_json_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let err = CacheStore::load(&path).unwrap_err();
        assert!(matches!(err, CacheError::Json(..)));
        assert!(err.to_string().contains("cache.json"));
    }

    #[test]
    fn test_delete_missing_key() {
        let mut store = CacheStore::default();
        assert!(store.delete("inputs/nope.md").is_none());
    }

    #[test]
    fn test_delete_prefix() {
        let mut store = CacheStore::default();
        store.set("inputs/blog", entry(1.0, "outputs/blog"));
        store.set("inputs/blog/a.md", entry(1.0, "outputs/blog/a.html"));
        store.set("inputs/blog/deep/b.md", entry(1.0, "outputs/blog/deep/b.html"));
        store.set("inputs/blogroll.md", entry(1.0, "outputs/blogroll.html"));

        assert_eq!(store.delete_prefix("inputs/blog"), 3);
        assert_eq!(store.len(), 1);
        assert!(store.get("inputs/blogroll.md").is_some());
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut store = CacheStore::default();
        store.set("inputs/a.md", entry(1.0, "outputs/a.html"));
        store.get_mut("inputs/a.md").unwrap().last_update = 2.0;
        assert_eq!(store.get("inputs/a.md").unwrap().last_update, 2.0);
    }
}
