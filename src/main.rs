use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{info, warn};

use mtg_indexer::cache::{CacheReconciler, MissingImageLog, ReconcileReport, UrlCache};
use mtg_indexer::config::IndexerConfig;
use mtg_indexer::providers::mtgjson::{self, list_set_files};
use mtg_indexer::providers::scryfall::{client::user_agent, ScryfallBulkSource, ScryfallClient};
use mtg_indexer::search::{BulkIngestWriter, ElasticsearchStore, IndexReport, SearchStore};
use mtg_indexer::telemetry::init_tracing;
use mtg_indexer::util::env as env_util;

#[derive(Parser, Debug)]
#[command(
    name = "mtg-indexer",
    version,
    about = "Index MTGJSON set files into Elasticsearch with Scryfall artwork URLs"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // `mtg-indexer` with no subcommand behaves like `mtg-indexer run`.
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download AllSetFiles.zip and extract it into the set directory
    DownloadSets(DownloadArgs),
    /// Fill the image cache for every scryfallId referenced by the set files
    Preload(PreloadArgs),
    /// Bulk-index all set files using the current image cache
    Index(IndexArgs),
    /// Preload, then index (default when no command supplied)
    Run(RunArgs),
}

#[derive(Debug, Default, Args)]
struct PathArgs {
    /// Directory of MTGJSON set files (overrides SET_FILES_DIR)
    #[arg(long)]
    sets_dir: Option<PathBuf>,
    /// Image cache JSON file (overrides IMAGE_CACHE_PATH)
    #[arg(long)]
    cache: Option<PathBuf>,
}

#[derive(Debug, Default, Args)]
struct DownloadArgs {
    #[command(flatten)]
    paths: PathArgs,
    /// Replace an existing set directory
    #[arg(long, action = ArgAction::SetTrue)]
    force: bool,
}

#[derive(Debug, Default, Args)]
struct PreloadArgs {
    #[command(flatten)]
    paths: PathArgs,
    /// Skip the bulk snapshot and resolve through point lookups only
    #[arg(long = "no-snapshot", action = ArgAction::SetTrue)]
    no_snapshot: bool,
    /// Reuse a previously downloaded bulk snapshot file
    #[arg(long = "reuse-snapshot", action = ArgAction::SetTrue)]
    reuse_snapshot: bool,
    /// Resolve from the snapshot only; never hit the per-card endpoint
    #[arg(long = "no-lookups", action = ArgAction::SetTrue)]
    no_lookups: bool,
    /// Maximum in-flight point lookups (overrides SCRYFALL_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(Debug, Default, Args)]
struct IndexArgs {
    #[command(flatten)]
    paths: PathArgs,
    /// Target index (overrides INDEX_NAME)
    #[arg(long)]
    index: Option<String>,
    /// Documents per bulk request (overrides BULK_BATCH_DOCS)
    #[arg(long)]
    batch_docs: Option<usize>,
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    #[command(flatten)]
    paths: PathArgs,
    /// Skip the bulk snapshot and resolve through point lookups only
    #[arg(long = "no-snapshot", action = ArgAction::SetTrue)]
    no_snapshot: bool,
    /// Reuse a previously downloaded bulk snapshot file
    #[arg(long = "reuse-snapshot", action = ArgAction::SetTrue)]
    reuse_snapshot: bool,
    /// Resolve from the snapshot only; never hit the per-card endpoint
    #[arg(long = "no-lookups", action = ArgAction::SetTrue)]
    no_lookups: bool,
    /// Target index (overrides INDEX_NAME)
    #[arg(long)]
    index: Option<String>,
}

impl PathArgs {
    fn apply(&self, cfg: &mut IndexerConfig) {
        if let Some(dir) = &self.sets_dir {
            cfg.set_files_dir = dir.clone();
        }
        if let Some(cache) = &self.cache {
            cfg.image_cache_path = cache.clone();
        }
    }
}

impl RunArgs {
    fn preload(&self) -> PreloadArgs {
        PreloadArgs {
            no_snapshot: self.no_snapshot,
            reuse_snapshot: self.reuse_snapshot,
            no_lookups: self.no_lookups,
            ..Default::default()
        }
    }

    fn index(&self) -> IndexArgs {
        IndexArgs {
            index: self.index.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing("info")?;

    let cli = Cli::parse();
    let mut cfg = IndexerConfig::from_env();
    let started = Instant::now();

    match cli.command {
        Some(Command::DownloadSets(args)) => {
            args.paths.apply(&mut cfg);
            download_sets(&cfg, args.force).await?;
        }
        Some(Command::Preload(args)) => {
            args.paths.apply(&mut cfg);
            preload(&mut cfg, &args).await?;
        }
        Some(Command::Index(args)) => {
            args.paths.apply(&mut cfg);
            index(&mut cfg, &args).await?;
        }
        Some(Command::Run(args)) => run(&mut cfg, &args).await?,
        None => run(&mut cfg, &cli.run).await?,
    }

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "done");
    Ok(())
}

async fn run(cfg: &mut IndexerConfig, args: &RunArgs) -> Result<()> {
    args.paths.apply(cfg);
    // Both halves' credentials are checked before the (long) preload starts.
    env_util::preflight_check("run", &["USER_EMAIL", "ELASTIC_KEY"], &[])?;
    let index_args = args.index();
    index_args.apply(cfg);
    let store = open_store(cfg)?;

    let report = preload(cfg, &args.preload()).await?;
    if report.still_missing > 0 {
        info!(
            still_missing = report.still_missing,
            "indexing with partial artwork; unresolved ids are retried next run"
        );
    }
    index_with(cfg, Arc::new(store)).await?;
    Ok(())
}

async fn download_sets(cfg: &IndexerConfig, force: bool) -> Result<()> {
    let dir = &cfg.set_files_dir;
    if dir.exists() && !force {
        info!(dir = %dir.display(), "set directory already present; pass --force to replace it");
        return Ok(());
    }
    let contact = env_util::env_opt("USER_EMAIL").unwrap_or_else(|| "unknown".to_string());
    let http = reqwest::Client::builder()
        .user_agent(user_agent(&contact))
        .build()?;
    let entries = mtgjson::download_all_sets(&http, mtgjson::ALL_SET_FILES_URL, dir).await?;
    info!(entries, dir = %dir.display(), "set files ready");
    Ok(())
}

async fn preload(cfg: &mut IndexerConfig, args: &PreloadArgs) -> Result<ReconcileReport> {
    env_util::preflight_check(
        "preload",
        &["USER_EMAIL"],
        &[
            "SET_FILES_DIR",
            "IMAGE_CACHE_PATH",
            "SCRYFALL_BULK_FILE",
            "USE_BULK_SNAPSHOT",
            "SCRYFALL_CONCURRENCY",
        ],
    )?;
    if args.no_snapshot {
        cfg.use_bulk_snapshot = false;
    }
    if args.reuse_snapshot {
        cfg.reuse_bulk_file = true;
    }
    if let Some(n) = args.concurrency {
        cfg.lookup.concurrency = n.max(1);
    }
    let email = env_util::env_req("USER_EMAIL")?;

    let set_files = list_set_files(&cfg.set_files_dir)?;
    if set_files.is_empty() {
        warn!(dir = %cfg.set_files_dir.display(), "no set files found; run download-sets first");
    }

    let log = MissingImageLog::new(&cfg.missing_image_log);
    let mut reconciler =
        CacheReconciler::new(&cfg.image_cache_path, log, cfg.lookup.clone());
    if cfg.use_bulk_snapshot {
        // The snapshot is a few hundred MB; no whole-request timeout on this client.
        let bulk_client = ScryfallClient::new(&email, None, None)?;
        let source = ScryfallBulkSource::new(bulk_client, &cfg.scryfall_bulk_file)
            .with_reuse_local(cfg.reuse_bulk_file);
        reconciler = reconciler.with_snapshot(Arc::new(source));
    }
    if !args.no_lookups {
        let lookup_client = ScryfallClient::new(&email, None, Some(30))?;
        reconciler = reconciler.with_lookup(Arc::new(lookup_client));
    }

    let report = reconciler.run(&set_files).await?;
    info!(
        set_files = report.set_files,
        total_ids = report.total_ids,
        initially_missing = report.initially_missing,
        by_snapshot = report.resolved_by_snapshot,
        by_lookup = report.resolved_by_lookup,
        throttled = report.throttled,
        still_missing = report.still_missing,
        cache_size = report.cache_size,
        "preload summary"
    );
    Ok(report)
}

impl IndexArgs {
    fn apply(&self, cfg: &mut IndexerConfig) {
        if let Some(index) = &self.index {
            cfg.index_name = index.clone();
        }
        if let Some(n) = self.batch_docs {
            cfg.bulk_batch_docs = n.max(1);
        }
    }
}

/// Validate store configuration and build the client without contacting it.
fn open_store(cfg: &IndexerConfig) -> Result<ElasticsearchStore> {
    env_util::preflight_check(
        "index",
        &["ELASTIC_KEY"],
        &["ELASTIC_URL", "INDEX_NAME", "SET_FILES_DIR", "IMAGE_CACHE_PATH"],
    )?;
    let key = env_util::env_req("ELASTIC_KEY")?;
    ElasticsearchStore::new(&cfg.elastic_url, Some(&key), None)
}

async fn index(cfg: &mut IndexerConfig, args: &IndexArgs) -> Result<IndexReport> {
    args.apply(cfg);
    let store = open_store(cfg)?;
    index_with(cfg, Arc::new(store)).await
}

async fn index_with(cfg: &IndexerConfig, store: Arc<dyn SearchStore>) -> Result<IndexReport> {
    let cache = UrlCache::load(&cfg.image_cache_path)
        .with_context(|| format!("loading image cache {}", cfg.image_cache_path.display()))?;
    info!(entries = cache.len(), "image cache loaded for indexing");

    let writer = BulkIngestWriter::new(store, &cfg.index_name, cfg.bulk_batch_docs);
    let set_files = list_set_files(&cfg.set_files_dir)?;

    let report = writer.index_files(&set_files, &cache).await?;
    info!(
        index = %cfg.index_name,
        files = set_files.len(),
        files_indexed = report.files_indexed,
        files_skipped = report.files_skipped,
        succeeded = report.documents.succeeded,
        failed = report.documents.failed,
        "index summary"
    );
    if report.documents.failed > 0 || report.files_skipped > 0 {
        warn!(
            failed = report.documents.failed,
            files_skipped = report.files_skipped,
            "some documents were not indexed; see log above"
        );
    }
    Ok(report)
}
