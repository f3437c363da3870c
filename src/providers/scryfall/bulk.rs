use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::client::{ScryfallClient, DEFAULT_BULK_TYPE};
use super::{ImageResolution, ScryfallCard};
use crate::cache::MissingImageLog;

/// Supplier of a full catalog snapshot.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_cards(&self) -> Result<Vec<ScryfallCard>>;
}

/// Downloads Scryfall's `default_cards` bulk file and parses it.
#[derive(Debug, Clone)]
pub struct ScryfallBulkSource {
    client: ScryfallClient,
    local_path: PathBuf,
    reuse_local: bool,
}

impl ScryfallBulkSource {
    pub fn new(client: ScryfallClient, local_path: impl Into<PathBuf>) -> Self {
        Self {
            client,
            local_path: local_path.into(),
            reuse_local: false,
        }
    }

    /// Skip the download when a previous snapshot is already on disk.
    pub fn with_reuse_local(mut self, reuse: bool) -> Self {
        self.reuse_local = reuse;
        self
    }
}

#[async_trait::async_trait]
impl SnapshotSource for ScryfallBulkSource {
    async fn fetch_cards(&self) -> Result<Vec<ScryfallCard>> {
        if self.reuse_local && self.local_path.exists() {
            info!(path = %self.local_path.display(), "reusing local scryfall bulk file");
        } else {
            let item = self.client.bulk_data_item(DEFAULT_BULK_TYPE).await?;
            info!(
                updated_at = item.updated_at.as_deref().unwrap_or("?"),
                size = item.size.unwrap_or(0),
                "downloading scryfall bulk data"
            );
            self.client
                .download_to(&item.download_uri, &self.local_path)
                .await?;
        }

        let path = self.local_path.clone();
        // Parsing the snapshot is several hundred MB of JSON; keep it off the reactor.
        tokio::task::spawn_blocking(move || -> Result<Vec<ScryfallCard>> {
            let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("parsing scryfall bulk file {}", path.display()))
        })
        .await?
    }
}

#[derive(Debug, Default)]
pub struct SnapshotResolution {
    pub resolved: HashMap<String, String>,
    /// Every id the snapshot listed, resolvable or not.
    pub covered: HashSet<String>,
    pub art_series: usize,
    pub missing: usize,
}

/// Resolve every card in a snapshot, logging the ones without artwork.
pub fn resolve_snapshot(cards: &[ScryfallCard], log: &MissingImageLog) -> SnapshotResolution {
    let mut out = SnapshotResolution::default();
    for (idx, card) in cards.iter().enumerate() {
        out.covered.insert(card.id.clone());
        match card.resolve_image() {
            ImageResolution::Direct(url) | ImageResolution::FrontFace(url) => {
                out.resolved.insert(card.id.clone(), url);
            }
            ImageResolution::ArtSeries => out.art_series += 1,
            ImageResolution::Missing(msg) => {
                warn!(
                    scryfall_id = %card.id,
                    layout = card.layout.as_deref().unwrap_or("?"),
                    name = card.name.as_deref().unwrap_or("?"),
                    "{msg}"
                );
                log.record_or_warn(&msg);
                out.missing += 1;
            }
        }
        if (idx + 1) % 50_000 == 0 {
            info!(processed = idx + 1, total = cards.len(), "building image cache from snapshot");
        }
    }
    info!(
        resolved = out.resolved.len(),
        art_series = out.art_series,
        missing = out.missing,
        "snapshot resolution complete"
    );
    out
}
