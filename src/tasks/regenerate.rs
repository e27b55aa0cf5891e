//! Regeneration Task
//!
//! Background task that sweeps stale content, claims it and replaces it with
//! freshly generated copy. Render-side misses and stale hits arrive over the
//! [`RegenerationQueue`](super::RegenerationQueue) channel between sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::{
    CacheStats, ClaimOutcome, ClaimToken, ContentKey, RegenerationPolicy, SharedClock, SharedStore,
    StaleSweep,
};
use crate::config::Config;
use crate::error::{GenerationError, Result};
use crate::generation::SharedGenerator;

use super::queue::{RegenerationQueue, RegenerationRequest};

// == Worker Config ==
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause between sweep passes
    pub sweep_interval: Duration,
    /// `list_stale` page size
    pub sweep_batch: usize,
    /// Upper bound on one generator call
    pub generation_timeout: Duration,
    /// TTL given to regenerated records
    pub ttl: Duration,
    /// Backoff for first generations that fail; they have no record to carry it
    pub miss_policy: RegenerationPolicy,
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sweep_interval: Duration::from_secs(config.sweep_interval.max(1)),
            sweep_batch: config.sweep_batch,
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
            ttl: Duration::from_secs(config.default_ttl),
            miss_policy: config.regeneration_policy(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What happened to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerationOutcome {
    Regenerated { version: u32 },
    /// Claim lost, or a record appeared before generation started
    Skipped,
    Failed,
}

/// Tally of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub regenerated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: RegenerationOutcome) {
        match outcome {
            RegenerationOutcome::Regenerated { .. } => self.regenerated += 1,
            RegenerationOutcome::Skipped => self.skipped += 1,
            RegenerationOutcome::Failed => self.failed += 1,
        }
    }
}

/// Consecutive failed first generations of one key.
#[derive(Debug, Clone, Copy)]
struct MissFailure {
    failures: u32,
    retry_after: DateTime<Utc>,
}

// == Regenerator ==
/// Claim, generate and commit logic shared by the sweep and the request path.
#[derive(Clone)]
pub struct Regenerator {
    store: SharedStore,
    generator: SharedGenerator,
    stats: Arc<CacheStats>,
    clock: SharedClock,
    config: WorkerConfig,
    miss_failures: Arc<DashMap<ContentKey, MissFailure>>,
}

impl Regenerator {
    pub fn new(
        store: SharedStore,
        generator: SharedGenerator,
        stats: Arc<CacheStats>,
        clock: SharedClock,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            generator,
            stats,
            clock,
            config,
            miss_failures: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    // == Sweep ==
    /// One full pass over everything stale as of now.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut sweep = StaleSweep::new(
            self.store.clone(),
            self.clock.now(),
            self.config.sweep_batch,
        );

        while let Some(batch) = sweep.next_batch().await? {
            report.scanned += batch.len();

            let mut tasks = JoinSet::new();
            for entry in batch {
                let this = self.clone();
                tasks.spawn(async move { this.refresh(&entry.key()).await });
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(outcome) => report.record(outcome),
                    Err(err) => {
                        warn!("Regeneration task panicked: {}", err);
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    // == Refresh ==
    /// Claims the current record and regenerates it if the claim is won.
    pub async fn refresh(&self, key: &ContentKey) -> RegenerationOutcome {
        match self.store.claim_for_regeneration(key).await {
            Ok(ClaimOutcome::Won(claim)) => {
                self.stats.record_claim(true);
                debug!(page_key = %key.page_key, locale = %key.locale, version = claim.version, "Claim won");
                self.regenerate(key, Some(claim)).await
            }
            Ok(ClaimOutcome::Lost) => {
                self.stats.record_claim(false);
                RegenerationOutcome::Skipped
            }
            Err(err) => {
                warn!(page_key = %key.page_key, locale = %key.locale, "Claim failed: {}", err);
                RegenerationOutcome::Failed
            }
        }
    }

    // == First Generation ==
    /// Generates a first record for a key that had nothing at `version`.
    ///
    /// Writes at the generator's version. Skipped when something is already
    /// visible at `version`, when the key already holds a record at or above
    /// the generator's version, or while an earlier failure is backing off.
    pub async fn generate_missing(&self, key: &ContentKey, version: u32) -> RegenerationOutcome {
        let now = self.clock.now();
        if let Some(failure) = self.miss_failures.get(key).map(|entry| *entry) {
            if failure.retry_after > now {
                debug!(page_key = %key.page_key, locale = %key.locale, "First generation backing off");
                return RegenerationOutcome::Skipped;
            }
        }

        match self.already_covered(key, version).await {
            Ok(true) => return RegenerationOutcome::Skipped,
            Ok(false) => {}
            Err(err) => {
                warn!(page_key = %key.page_key, locale = %key.locale, "Lookup failed: {}", err);
                return RegenerationOutcome::Failed;
            }
        }

        let outcome = self.regenerate(key, None).await;
        match outcome {
            RegenerationOutcome::Failed => {
                let failures = self
                    .miss_failures
                    .get(key)
                    .map_or(0, |entry| entry.failures)
                    .saturating_add(1);
                let retry_after = self.config.miss_policy.retry_after(self.clock.now(), failures);
                self.miss_failures.insert(
                    key.clone(),
                    MissFailure {
                        failures,
                        retry_after,
                    },
                );
            }
            _ => {
                self.miss_failures.remove(key);
            }
        }
        outcome
    }

    /// Whether a first generation would be redundant or rejected by the store.
    async fn already_covered(&self, key: &ContentKey, version: u32) -> Result<bool> {
        if self.store.get(key, version).await?.is_some() {
            return Ok(true);
        }
        let latest = self.store.get(key, u32::MAX).await?;
        Ok(latest.is_some_and(|record| record.version >= self.generator.version()))
    }

    pub async fn handle(&self, request: &RegenerationRequest) -> RegenerationOutcome {
        match request {
            RegenerationRequest::Missing { key, version } => {
                self.generate_missing(key, *version).await
            }
            RegenerationRequest::Refresh { key } => self.refresh(key).await,
        }
    }

    /// Runs the generator under the timeout and commits or reverts.
    async fn regenerate(&self, key: &ContentKey, claim: Option<ClaimToken>) -> RegenerationOutcome {
        let version = self
            .generator
            .version()
            .max(claim.map_or(0, |claim| claim.version));
        let generated = match timeout(self.config.generation_timeout, self.generator.generate(key))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.config.generation_timeout)),
        };

        let failure = match generated {
            Ok(payload) => match self.store.put(key, version, payload, self.config.ttl).await {
                Ok(record) => {
                    self.stats.record_regeneration();
                    info!(
                        page_key = %key.page_key,
                        locale = %key.locale,
                        version = record.version,
                        "Content regenerated"
                    );
                    return RegenerationOutcome::Regenerated {
                        version: record.version,
                    };
                }
                Err(err) => err.to_string(),
            },
            Err(err) => err.to_string(),
        };

        self.stats.record_failure();
        warn!(page_key = %key.page_key, locale = %key.locale, version, "Regeneration failed: {}", failure);
        if let Some(claim) = claim {
            if let Err(err) = self.store.release_claim(key, claim).await {
                warn!(page_key = %key.page_key, locale = %key.locale, "Claim release failed: {}", err);
            }
        }
        RegenerationOutcome::Failed
    }
}

/// Spawns the background regeneration loop.
///
/// Every `sweep_interval` the task sweeps all stale records; in between it
/// serves requests from the render path, each on its own task.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be aborted during graceful
/// shutdown.
pub fn spawn_regeneration_task(
    regenerator: Regenerator,
    queue: RegenerationQueue,
    mut requests: mpsc::Receiver<RegenerationRequest>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = regenerator.config().sweep_interval;
        info!(
            "Starting regeneration task with sweep interval of {} seconds",
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match regenerator.sweep().await {
                        Ok(report) if report.scanned > 0 => info!(
                            scanned = report.scanned,
                            regenerated = report.regenerated,
                            skipped = report.skipped,
                            failed = report.failed,
                            "Stale sweep finished"
                        ),
                        Ok(_) => debug!("Stale sweep: nothing due"),
                        Err(err) => warn!("Stale sweep aborted: {}", err),
                    }
                }
                Some(request) = requests.recv() => {
                    let regenerator = regenerator.clone();
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        regenerator.handle(&request).await;
                        queue.complete(request.key());
                    });
                }
            }
        }
    })
}
