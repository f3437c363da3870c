use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use super::{MissingImageLog, UrlCache};
use crate::config::LookupConfig;
use crate::providers::mtgjson::SetFile;
use crate::providers::scryfall::{
    resolve_snapshot, CardLookup, RateLimitedResolver, SnapshotSource,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub set_files: usize,
    pub total_ids: usize,
    pub initially_missing: usize,
    pub resolved_by_snapshot: usize,
    pub resolved_by_lookup: usize,
    pub throttled: usize,
    pub still_missing: usize,
    pub cache_size: usize,
}

/// Brings the image cache up to date with the ids referenced by a set of MTGJSON
/// files: bulk snapshot first, point lookups for whatever the snapshot never saw.
pub struct CacheReconciler {
    cache_path: PathBuf,
    log: MissingImageLog,
    snapshot: Option<Arc<dyn SnapshotSource>>,
    lookup: Option<Arc<dyn CardLookup>>,
    lookup_cfg: LookupConfig,
}

impl CacheReconciler {
    pub fn new(cache_path: impl Into<PathBuf>, log: MissingImageLog, lookup_cfg: LookupConfig) -> Self {
        Self {
            cache_path: cache_path.into(),
            log,
            snapshot: None,
            lookup: None,
            lookup_cfg,
        }
    }

    pub fn with_snapshot(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshot = Some(source);
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn CardLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Only a malformed cache file is fatal; everything after loading it is
    /// recovered locally and the cache is always saved at the end.
    pub async fn run(&self, set_files: &[PathBuf]) -> Result<ReconcileReport> {
        let mut cache = UrlCache::load(&self.cache_path)?;
        info!(cached = cache.len(), path = %self.cache_path.display(), "image cache loaded");

        let all_ids = collect_ids(set_files);
        let mut report = ReconcileReport {
            set_files: set_files.len(),
            total_ids: all_ids.len(),
            ..Default::default()
        };
        report.initially_missing = cache.missing_from(&all_ids).len();
        info!(
            total_ids = report.total_ids,
            missing = report.initially_missing,
            "collected scryfall ids"
        );

        let mut covered_by_snapshot: HashSet<String> = HashSet::new();
        if let Some(source) = &self.snapshot {
            match source.fetch_cards().await {
                Ok(cards) => {
                    let resolution = resolve_snapshot(&cards, &self.log);
                    report.resolved_by_snapshot = cache.merge(resolution.resolved);
                    covered_by_snapshot = resolution.covered;
                    self.save_or_warn(&cache);
                }
                Err(err) => {
                    warn!(error = %err, "scryfall snapshot unavailable; falling back to point lookups");
                }
            }
        }

        if let Some(lookup) = &self.lookup {
            let pending: Vec<String> = cache
                .missing_from(&all_ids)
                .into_iter()
                .filter(|id| !covered_by_snapshot.contains(id))
                .collect();
            if pending.is_empty() {
                info!("no ids left for point lookups");
            } else {
                let resolver =
                    RateLimitedResolver::new(lookup.clone(), self.lookup_cfg.clone(), self.log.clone());
                let summary = resolver
                    .resolve(pending, |delta| {
                        cache.merge(delta.iter().map(|(k, v)| (k.clone(), v.clone())));
                        self.save_or_warn(&cache);
                    })
                    .await;
                report.resolved_by_lookup = summary.resolved.len();
                report.throttled = summary.throttled.len();
                cache.merge(summary.resolved);
            }
        }

        cache.save(&self.cache_path)?;
        report.still_missing = cache.missing_from(&all_ids).len();
        report.cache_size = cache.len();
        info!(
            cache_size = report.cache_size,
            still_missing = report.still_missing,
            path = %self.cache_path.display(),
            "image cache saved"
        );
        Ok(report)
    }

    fn save_or_warn(&self, cache: &UrlCache) {
        match cache.save(&self.cache_path) {
            Ok(()) => info!(entries = cache.len(), "image cache checkpoint saved"),
            Err(err) => warn!(error = %err, "image cache checkpoint failed"),
        }
    }
}

/// Union of the scryfall ids across all set files; unreadable files are skipped.
pub fn collect_ids(set_files: &[PathBuf]) -> HashSet<String> {
    let mut all = HashSet::new();
    for path in set_files {
        match SetFile::load(path) {
            Ok(set) => {
                let ids = set.scryfall_ids();
                tracing::debug!(file = %path.display(), ids = ids.len(), "collected ids");
                all.extend(ids);
            }
            Err(err) => warn!(file = %path.display(), error = %err, "skipping unreadable set file"),
        }
    }
    all
}
