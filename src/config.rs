use std::path::PathBuf;
use std::time::Duration;

use crate::util::env::{env_flag, env_opt, env_parse};

pub const DEFAULT_SET_FILES_DIR: &str = "AllSetFiles";
pub const DEFAULT_IMAGE_CACHE_PATH: &str = "image_cache.json";
pub const DEFAULT_MISSING_IMAGE_LOG: &str = "missing_image_uris.log";
pub const DEFAULT_SCRYFALL_BULK_FILE: &str = "scryfall_bulk.json";
pub const DEFAULT_ELASTIC_URL: &str = "http://localhost:9200";
pub const DEFAULT_INDEX_NAME: &str = "mtg_cards";

/// Tunables for the point-lookup path.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub concurrency: usize,
    pub min_interval: Duration,
    pub throttle_cooldown: Duration,
    pub save_every: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            // just under 9 requests/second
            min_interval: Duration::from_millis(112),
            throttle_cooldown: Duration::from_secs(5),
            save_every: 100,
        }
    }
}

impl LookupConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            concurrency: env_parse("SCRYFALL_CONCURRENCY", d.concurrency).max(1),
            min_interval: Duration::from_millis(env_parse(
                "SCRYFALL_MIN_INTERVAL_MS",
                d.min_interval.as_millis() as u64,
            )),
            throttle_cooldown: Duration::from_secs(env_parse(
                "SCRYFALL_THROTTLE_COOLDOWN_SECS",
                d.throttle_cooldown.as_secs(),
            )),
            save_every: env_parse("CACHE_SAVE_EVERY", d.save_every).max(1),
        }
    }
}

/// Everything the pipeline reads from the environment, with defaults.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub set_files_dir: PathBuf,
    pub image_cache_path: PathBuf,
    pub missing_image_log: PathBuf,
    pub scryfall_bulk_file: PathBuf,
    /// Resolve from the bulk snapshot before falling back to point lookups.
    pub use_bulk_snapshot: bool,
    /// Reuse an already-downloaded bulk snapshot instead of fetching a fresh one.
    pub reuse_bulk_file: bool,
    pub lookup: LookupConfig,
    pub elastic_url: String,
    pub index_name: String,
    pub bulk_batch_docs: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            set_files_dir: PathBuf::from(DEFAULT_SET_FILES_DIR),
            image_cache_path: PathBuf::from(DEFAULT_IMAGE_CACHE_PATH),
            missing_image_log: PathBuf::from(DEFAULT_MISSING_IMAGE_LOG),
            scryfall_bulk_file: PathBuf::from(DEFAULT_SCRYFALL_BULK_FILE),
            use_bulk_snapshot: true,
            reuse_bulk_file: false,
            lookup: LookupConfig::default(),
            elastic_url: DEFAULT_ELASTIC_URL.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            bulk_batch_docs: 100,
        }
    }
}

impl IndexerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            set_files_dir: env_opt("SET_FILES_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.set_files_dir),
            image_cache_path: env_opt("IMAGE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.image_cache_path),
            missing_image_log: env_opt("MISSING_IMAGE_LOG")
                .map(PathBuf::from)
                .unwrap_or(d.missing_image_log),
            scryfall_bulk_file: env_opt("SCRYFALL_BULK_FILE")
                .map(PathBuf::from)
                .unwrap_or(d.scryfall_bulk_file),
            use_bulk_snapshot: env_flag("USE_BULK_SNAPSHOT", d.use_bulk_snapshot),
            reuse_bulk_file: env_flag("SCRYFALL_BULK_REUSE", d.reuse_bulk_file),
            lookup: LookupConfig::from_env(),
            elastic_url: env_opt("ELASTIC_URL").unwrap_or(d.elastic_url),
            index_name: env_opt("INDEX_NAME").unwrap_or(d.index_name),
            bulk_batch_docs: env_parse("BULK_BATCH_DOCS", d.bulk_batch_docs).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_limits() {
        let cfg = IndexerConfig::default();
        assert_eq!(cfg.bulk_batch_docs, 100);
        assert_eq!(cfg.lookup.concurrency, 1);
        assert_eq!(cfg.lookup.save_every, 100);
        assert_eq!(cfg.lookup.throttle_cooldown, Duration::from_secs(5));
        assert!(cfg.lookup.min_interval >= Duration::from_millis(1000 / 9));
        assert_eq!(cfg.index_name, "mtg_cards");
    }

    #[test]
    fn default_spacing_stays_under_nine_requests_per_second() {
        let cfg = LookupConfig::default();
        let per_second = cfg.concurrency as f64 / cfg.min_interval.as_secs_f64();
        assert!(per_second < 9.0, "default allows {per_second:.3} req/s");
    }
}
