use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::client::{CardLookup, LookupOutcome};
use super::ImageResolution;
use crate::cache::MissingImageLog;
use crate::config::LookupConfig;

#[derive(Debug)]
enum TaskResult {
    Resolved(String),
    ArtSeries,
    MissingArtwork(String),
    Throttled,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct LookupSummary {
    pub resolved: HashMap<String, String>,
    pub throttled: Vec<String>,
    pub missing_artwork: usize,
    pub art_series: usize,
    pub failed: usize,
    pub checkpoints: usize,
}

impl LookupSummary {
    pub fn completed(&self) -> usize {
        self.resolved.len()
            + self.throttled.len()
            + self.missing_artwork
            + self.art_series
            + self.failed
    }
}

/// Resolves ids one request at a time against a rate-limited endpoint.
///
/// Two limits apply together: a semaphore caps in-flight requests, and every task
/// keeps its permit for `min_interval` after its request finishes, which caps the
/// request rate at roughly `concurrency / min_interval`. A 429 holds the permit for
/// the throttle cooldown as well, so the whole pool backs off.
pub struct RateLimitedResolver {
    lookup: Arc<dyn CardLookup>,
    permits: Arc<Semaphore>,
    cfg: LookupConfig,
    log: MissingImageLog,
}

impl RateLimitedResolver {
    pub fn new(lookup: Arc<dyn CardLookup>, cfg: LookupConfig, log: MissingImageLog) -> Self {
        let permits = Arc::new(Semaphore::new(cfg.concurrency.max(1)));
        Self {
            lookup,
            permits,
            cfg,
            log,
        }
    }

    /// Look up every id and return what resolved.
    ///
    /// Every `save_every` completions `on_checkpoint` receives the ids resolved since
    /// the previous checkpoint, so the caller can persist partial progress.
    pub async fn resolve<F>(&self, ids: Vec<String>, mut on_checkpoint: F) -> LookupSummary
    where
        F: FnMut(&HashMap<String, String>),
    {
        let total = ids.len();
        info!(total, concurrency = self.cfg.concurrency, "starting scryfall point lookups");
        let mut tally = Tally::new(self.cfg.save_every, total);
        let mut tasks: JoinSet<(String, TaskResult)> = JoinSet::new();

        for id in ids {
            // Permits are taken here, in input order, before the task exists.
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let lookup = self.lookup.clone();
            let cfg = self.cfg.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = lookup_one(lookup.as_ref(), &id, &cfg).await;
                (id, result)
            });

            while let Some(joined) = tasks.join_next().now_or_never().flatten() {
                if tally.absorb(joined, &self.log) {
                    tally.checkpoint(&mut on_checkpoint);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if tally.absorb(joined, &self.log) {
                tally.checkpoint(&mut on_checkpoint);
            }
        }

        let summary = tally.summary;
        info!(
            resolved = summary.resolved.len(),
            throttled = summary.throttled.len(),
            missing_artwork = summary.missing_artwork,
            failed = summary.failed,
            "scryfall point lookups finished"
        );
        summary
    }
}

async fn lookup_one(lookup: &dyn CardLookup, id: &str, cfg: &LookupConfig) -> TaskResult {
    let result = match lookup.lookup(id).await {
        LookupOutcome::Found(card) => match card.resolve_image() {
            ImageResolution::Direct(url) | ImageResolution::FrontFace(url) => {
                TaskResult::Resolved(url)
            }
            ImageResolution::ArtSeries => TaskResult::ArtSeries,
            ImageResolution::Missing(msg) => TaskResult::MissingArtwork(msg),
        },
        LookupOutcome::Throttled => {
            warn!(
                scryfall_id = id,
                cooldown_ms = cfg.throttle_cooldown.as_millis() as u64,
                "scryfall 429 throttled; cooling down"
            );
            sleep(cfg.throttle_cooldown).await;
            TaskResult::Throttled
        }
        LookupOutcome::Failed(reason) => TaskResult::Failed(reason),
    };
    sleep(cfg.min_interval).await;
    result
}

/// Completion bookkeeping, owned by the coordinating loop only.
struct Tally {
    summary: LookupSummary,
    since_checkpoint: HashMap<String, String>,
    completed: usize,
    save_every: usize,
    total: usize,
}

impl Tally {
    fn new(save_every: usize, total: usize) -> Self {
        Self {
            summary: LookupSummary::default(),
            since_checkpoint: HashMap::new(),
            completed: 0,
            save_every: save_every.max(1),
            total,
        }
    }

    /// Record one finished task; returns true when a checkpoint is due.
    fn absorb(
        &mut self,
        joined: Result<(String, TaskResult), JoinError>,
        log: &MissingImageLog,
    ) -> bool {
        self.completed += 1;
        match joined {
            Ok((id, TaskResult::Resolved(url))) => {
                self.since_checkpoint.insert(id.clone(), url.clone());
                self.summary.resolved.insert(id, url);
            }
            Ok((_, TaskResult::ArtSeries)) => self.summary.art_series += 1,
            Ok((id, TaskResult::MissingArtwork(msg))) => {
                warn!(scryfall_id = %id, "{msg}");
                log.record_or_warn(&msg);
                self.summary.missing_artwork += 1;
            }
            Ok((id, TaskResult::Throttled)) => self.summary.throttled.push(id),
            Ok((id, TaskResult::Failed(reason))) => {
                warn!(scryfall_id = %id, reason = %reason, "scryfall lookup failed");
                self.summary.failed += 1;
            }
            Err(err) => {
                error!(error = %err, "scryfall lookup task aborted");
                self.summary.failed += 1;
            }
        }
        if self.completed % 100 == 0 {
            info!(completed = self.completed, total = self.total, "scryfall lookup progress");
        }
        self.completed % self.save_every == 0
    }

    fn checkpoint<F>(&mut self, on_checkpoint: &mut F)
    where
        F: FnMut(&HashMap<String, String>),
    {
        on_checkpoint(&self.since_checkpoint);
        self.since_checkpoint.clear();
        self.summary.checkpoints += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::scryfall::{ImageUris, ScryfallCard};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Answers every id with a card, except for configured quirks.
    #[derive(Default)]
    struct FakeScryfall {
        calls: AtomicUsize,
        throttle_call: Option<usize>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        call_order: Mutex<Vec<String>>,
        started_at: Mutex<Vec<Instant>>,
    }

    #[async_trait::async_trait]
    impl CardLookup for FakeScryfall {
        async fn lookup(&self, scryfall_id: &str) -> LookupOutcome {
            self.started_at.lock().unwrap().push(Instant::now());
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.call_order.lock().unwrap().push(scryfall_id.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if Some(call) == self.throttle_call {
                return LookupOutcome::Throttled;
            }
            match scryfall_id {
                "broken" => LookupOutcome::Failed("status 500 Internal Server Error".into()),
                "bare" => LookupOutcome::Found(ScryfallCard {
                    id: scryfall_id.to_string(),
                    layout: Some("normal".into()),
                    ..Default::default()
                }),
                _ => LookupOutcome::Found(ScryfallCard {
                    id: scryfall_id.to_string(),
                    layout: Some("normal".into()),
                    image_uris: Some(ImageUris {
                        normal: Some(format!("https://img/{scryfall_id}.jpg")),
                    }),
                    ..Default::default()
                }),
            }
        }
    }

    fn fast_cfg(concurrency: usize, save_every: usize) -> LookupConfig {
        LookupConfig {
            concurrency,
            min_interval: Duration::from_millis(1),
            throttle_cooldown: Duration::from_millis(5),
            save_every,
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("id-{i:02}")).collect()
    }

    #[tokio::test]
    async fn throttled_fifth_call_is_left_unresolved() {
        let fake = Arc::new(FakeScryfall {
            throttle_call: Some(5),
            ..Default::default()
        });
        let tmp = tempfile::tempdir().unwrap();
        let resolver = RateLimitedResolver::new(
            fake.clone(),
            fast_cfg(1, 100),
            MissingImageLog::new(tmp.path().join("missing.log")),
        );

        let input = ids(12);
        let summary = resolver.resolve(input.clone(), |_| {}).await;

        assert_eq!(fake.calls.load(Ordering::SeqCst), 12);
        assert_eq!(*fake.call_order.lock().unwrap(), input);
        assert_eq!(summary.throttled, vec![input[4].clone()]);
        assert!(!summary.resolved.contains_key(&input[4]));
        assert_eq!(summary.resolved.len(), 11);
        for (i, id) in input.iter().enumerate() {
            if i != 4 {
                assert_eq!(summary.resolved[id], format!("https://img/{id}.jpg"));
            }
        }
    }

    #[tokio::test]
    async fn checkpoints_fire_every_n_completions_with_the_delta() {
        let fake = Arc::new(FakeScryfall {
            throttle_call: Some(3),
            ..Default::default()
        });
        let tmp = tempfile::tempdir().unwrap();
        let resolver = RateLimitedResolver::new(
            fake,
            fast_cfg(1, 5),
            MissingImageLog::new(tmp.path().join("missing.log")),
        );

        let mut deltas: Vec<usize> = Vec::new();
        let summary = resolver.resolve(ids(12), |delta| deltas.push(delta.len())).await;

        assert_eq!(summary.checkpoints, 2);
        assert_eq!(deltas, vec![4, 5]);
        assert_eq!(summary.completed(), 12);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_permit_count() {
        let fake = Arc::new(FakeScryfall::default());
        let tmp = tempfile::tempdir().unwrap();
        let resolver = RateLimitedResolver::new(
            fake.clone(),
            fast_cfg(3, 100),
            MissingImageLog::new(tmp.path().join("missing.log")),
        );

        let summary = resolver.resolve(ids(20), |_| {}).await;
        assert_eq!(summary.resolved.len(), 20);
        assert!(fake.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    /// Request `i + concurrency` may only start once some permit holder that started
    /// at or after request `i` has finished its `min_interval` wait.
    async fn assert_spacing(concurrency: usize) {
        let min_interval = Duration::from_millis(25);
        let fake = Arc::new(FakeScryfall::default());
        let tmp = tempfile::tempdir().unwrap();
        let resolver = RateLimitedResolver::new(
            fake.clone(),
            LookupConfig {
                concurrency,
                min_interval,
                throttle_cooldown: Duration::from_millis(5),
                save_every: 100,
            },
            MissingImageLog::new(tmp.path().join("missing.log")),
        );

        let summary = resolver.resolve(ids(8), |_| {}).await;
        assert_eq!(summary.resolved.len(), 8);

        let starts = fake.started_at.lock().unwrap().clone();
        assert_eq!(starts.len(), 8);
        for pair in starts.windows(concurrency + 1) {
            let gap = pair[concurrency] - pair[0];
            assert!(gap >= min_interval, "requests only {gap:?} apart");
        }
    }

    #[tokio::test]
    async fn sequential_requests_respect_min_interval() {
        assert_spacing(1).await;
    }

    #[tokio::test]
    async fn parallel_requests_still_respect_min_interval() {
        assert_spacing(3).await;
    }

    #[tokio::test]
    async fn failures_and_missing_artwork_are_not_resolved() {
        let fake = Arc::new(FakeScryfall::default());
        let tmp = tempfile::tempdir().unwrap();
        let log = MissingImageLog::new(tmp.path().join("missing.log"));
        let resolver = RateLimitedResolver::new(fake, fast_cfg(2, 100), log.clone());

        let input = vec!["ok".to_string(), "broken".to_string(), "bare".to_string()];
        let summary = resolver.resolve(input, |_| {}).await;

        assert_eq!(summary.resolved.len(), 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.missing_artwork, 1);
        let body = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(body.lines().count(), 1);
        assert!(body.contains("No image_uris found for ID: bare"));
    }
}
