//! Storage abstraction for content records.
//!
//! Both the in-memory [`MemoryStore`](crate::cache::MemoryStore) and the
//! [`PostgresStore`](crate::cache::PostgresStore) implement [`ContentStore`];
//! callers hold an `Arc<dyn ContentStore>` handle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{ContentCacheRecord, ContentKey, ContentPayload, MAX_STALE_LIMIT};
use crate::error::{ContentCacheError, Result};

/// Shared store handle passed to the API, resolver and worker.
pub type SharedStore = Arc<dyn ContentStore>;

// == Claim Outcome ==
/// Proof of a won claim. `claimed_at` is the claim's identity: a release only
/// applies while the record still carries the same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimToken {
    pub version: u32,
    pub claimed_at: DateTime<Utc>,
}

/// Result of a regeneration claim. Losing is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller owns regeneration of the record at `token.version`
    Won(ClaimToken),
    /// Nothing claimable, or another caller got there first
    Lost,
}

impl ClaimOutcome {
    pub fn is_won(&self) -> bool {
        matches!(self, ClaimOutcome::Won(_))
    }

    pub fn token(&self) -> Option<ClaimToken> {
        match self {
            ClaimOutcome::Won(token) => Some(*token),
            ClaimOutcome::Lost => None,
        }
    }

    pub fn version(&self) -> Option<u32> {
        self.token().map(|token| token.version)
    }
}

// == Stale Listing ==
/// Position in the stale sweep: resume strictly after this entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleCursor {
    pub stale_after: DateTime<Utc>,
    pub key: ContentKey,
}

impl StaleCursor {
    /// Opaque token form: `<unix micros>:<locale>:<page_key>`.
    ///
    /// The page key goes last because it may itself contain `:`.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}",
            self.stale_after.timestamp_micros(),
            self.key.locale,
            self.key.page_key
        )
    }

    pub fn decode(token: &str) -> Result<Self> {
        let invalid = || ContentCacheError::Validation(format!("invalid cursor '{}'", token));
        let mut parts = token.splitn(3, ':');
        let micros: i64 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let locale = parts.next().ok_or_else(invalid)?;
        let page_key = parts.next().ok_or_else(invalid)?;
        let stale_after = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(invalid)?;
        let key = ContentKey::new(page_key, locale).map_err(|_| invalid())?;
        Ok(Self { stale_after, key })
    }
}

/// Parameters of one `list_stale` call.
#[derive(Debug, Clone)]
pub struct StaleQuery {
    /// Only records with `stale_after <= cutoff` qualify
    pub cutoff: DateTime<Utc>,
    /// Maximum number of entries in the page
    pub limit: usize,
    pub after: Option<StaleCursor>,
}

impl StaleQuery {
    pub fn new(cutoff: DateTime<Utc>, limit: usize) -> Self {
        Self {
            cutoff,
            limit,
            after: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > MAX_STALE_LIMIT {
            return Err(ContentCacheError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_STALE_LIMIT
            )));
        }
        Ok(())
    }
}

/// A record due for regeneration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleEntry {
    pub page_key: String,
    pub locale: String,
    pub version: u32,
    pub stale_after: DateTime<Utc>,
}

impl StaleEntry {
    pub fn key(&self) -> ContentKey {
        ContentKey {
            page_key: self.page_key.clone(),
            locale: self.locale.clone(),
        }
    }

    pub fn cursor(&self) -> StaleCursor {
        StaleCursor {
            stale_after: self.stale_after,
            key: self.key(),
        }
    }
}

/// One page of the stale sweep, oldest staleness first.
#[derive(Debug, Clone, Default)]
pub struct StalePage {
    pub entries: Vec<StaleEntry>,
    /// Present when more entries may follow
    pub next: Option<StaleCursor>,
}

// == Content Store Trait ==
/// Durable, versioned storage for generated content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Highest-version record `<= current_version` for the key, with its
    /// effective status. `None` is a normal outcome.
    async fn get(&self, key: &ContentKey, current_version: u32)
        -> Result<Option<ContentCacheRecord>>;

    /// Upserts the exact `(key, version)` record as fresh with `stale_after = now + ttl`.
    async fn put(
        &self,
        key: &ContentKey,
        version: u32,
        payload: ContentPayload,
        ttl: Duration,
    ) -> Result<ContentCacheRecord>;

    /// Forces a record stale ahead of its TTL. Returns whether it existed.
    ///
    /// A record under a live claim stays `regenerating`; only its
    /// `stale_after` moves to now.
    async fn mark_stale(&self, key: &ContentKey, version: u32) -> Result<bool>;

    /// Atomically moves the current record from stale to regenerating.
    async fn claim_for_regeneration(&self, key: &ContentKey) -> Result<ClaimOutcome>;

    /// Reverts a failed or timed-out claim, applying failure backoff.
    /// Returns whether a claim was released; a claim that was already taken
    /// over by another worker is left alone.
    async fn release_claim(&self, key: &ContentKey, claim: ClaimToken) -> Result<bool>;

    /// Bounded page of current records due for regeneration.
    async fn list_stale(&self, query: StaleQuery) -> Result<StalePage>;

    /// Deletes superseded versions. Returns the number of records removed.
    async fn purge_superseded(&self) -> Result<usize>;

    /// Number of stored records, superseded ones included.
    async fn len(&self) -> Result<usize>;
}

// == Stale Sweep ==
/// Lazily pages through `list_stale` for one sweep pass.
///
/// The sweep is finite: it stops when the store reports no further page, and
/// a new pass starts from scratch with a fresh cutoff.
pub struct StaleSweep {
    store: SharedStore,
    cutoff: DateTime<Utc>,
    batch: usize,
    cursor: Option<StaleCursor>,
    done: bool,
}

impl StaleSweep {
    pub fn new(store: SharedStore, cutoff: DateTime<Utc>, batch: usize) -> Self {
        Self {
            store,
            cutoff,
            batch: batch.clamp(1, MAX_STALE_LIMIT),
            cursor: None,
            done: false,
        }
    }

    /// Resumes a sweep from a previously returned cursor.
    pub fn resume(mut self, cursor: StaleCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn cursor(&self) -> Option<&StaleCursor> {
        self.cursor.as_ref()
    }

    /// Fetches the next batch, or `None` once the sweep is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<StaleEntry>>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .store
            .list_stale(StaleQuery {
                cutoff: self.cutoff,
                limit: self.batch,
                after: self.cursor.clone(),
            })
            .await?;

        match page.next {
            Some(next) => self.cursor = Some(next),
            None => self.done = true,
        }
        if page.entries.is_empty() {
            self.done = true;
            return Ok(None);
        }
        Ok(Some(page.entries))
    }
}
