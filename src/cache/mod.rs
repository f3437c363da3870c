//! Persistent `scryfallId -> image URL` cache.
//!
//! The cache only ever holds successful resolutions. An id that could not be
//! resolved stays absent and is retried by the next run.

pub mod diagnostics;
pub mod reconcile;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;

pub use diagnostics::MissingImageLog;
pub use reconcile::{CacheReconciler, ReconcileReport};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlCache {
    entries: IndexMap<String, String>,
}

impl UrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a cache file. A missing file is an empty cache; a malformed one is an
    /// error so prior work is never silently discarded.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading image cache {}", path.display()))
            }
        };
        let entries: IndexMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("image cache {} is malformed", path.display()))?;
        Ok(Self { entries })
    }

    /// Overwrite `path` with the full mapping via a temp file + rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&self.entries)?;
        fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("replacing image cache {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    /// Upsert one resolution. Empty URLs are refused; returns whether it was stored.
    pub fn insert(&mut self, id: impl Into<String>, url: impl Into<String>) -> bool {
        let url = url.into();
        if url.trim().is_empty() {
            return false;
        }
        self.entries.insert(id.into(), url);
        true
    }

    /// Merge a batch of resolutions, last write wins. Returns how many were stored.
    pub fn merge<I>(&mut self, resolved: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut stored = 0;
        for (id, url) in resolved {
            if self.insert(id, url) {
                stored += 1;
            }
        }
        stored
    }

    /// Ids from `ids` that have no cached URL.
    pub fn missing_from<'a, I>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter()
            .filter(|id| !self.entries.contains_key(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
