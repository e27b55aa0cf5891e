//! Memory Store Module
//!
//! In-process content store: versioned record map plus a sweep index over
//! current records.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::lock::{rw_read, rw_write};
use crate::cache::{
    ClaimOutcome, ClaimToken, ContentCacheRecord, ContentKey, ContentPayload, ContentStore, RecordStatus,
    RegenerationPolicy, SharedClock, StaleEntry, StalePage, StaleQuery, SweepIndex,
};
use crate::error::Result;

const SOURCE: &str = "cache::store";

#[derive(Debug, Default)]
struct Inner {
    /// Versions per key; the last entry is the current record
    slots: HashMap<ContentKey, BTreeMap<u32, ContentCacheRecord>>,
    /// `(stale_after, key)` of every current record
    sweep: SweepIndex,
    records: usize,
}

// == Memory Store ==
/// In-memory [`ContentStore`].
///
/// Every mutation, including the regeneration claim, runs under one write
/// lock, which makes the claim's compare-and-swap atomic.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    policy: RegenerationPolicy,
    clock: SharedClock,
}

impl MemoryStore {
    // == Constructor ==
    pub fn new(policy: RegenerationPolicy, clock: SharedClock) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &RegenerationPolicy {
        &self.policy
    }

    /// Number of current records tracked by the sweep index.
    pub fn current_len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "current_len").sweep.len()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    // == Get ==
    async fn get(
        &self,
        key: &ContentKey,
        current_version: u32,
    ) -> Result<Option<ContentCacheRecord>> {
        let now = self.clock.now();
        let inner = rw_read(&self.inner, SOURCE, "get");

        Ok(inner
            .slots
            .get(key)
            .and_then(|slot| slot.range(..=current_version).next_back())
            .map(|(_, record)| record.observed(now, &self.policy)))
    }

    // == Put ==
    async fn put(
        &self,
        key: &ContentKey,
        version: u32,
        payload: ContentPayload,
        ttl: Duration,
    ) -> Result<ContentCacheRecord> {
        key.validate()?;
        payload.validate()?;
        let now = self.clock.now();
        let stale_after = super::stale_deadline(now, ttl)?;

        let mut guard = rw_write(&self.inner, SOURCE, "put");
        let inner = &mut *guard;
        let slot = inner.slots.entry(key.clone()).or_default();

        if let Some((&current_version, current)) = slot.iter().next_back() {
            super::check_version_order(version, current_version)?;
            inner.sweep.remove(current.stale_after, key);
        }

        let record = ContentCacheRecord::fresh(key, version, payload, now, stale_after);
        if slot.insert(version, record.clone()).is_none() {
            inner.records += 1;
        }
        inner.sweep.insert(stale_after, key.clone());

        Ok(record)
    }

    // == Mark Stale ==
    async fn mark_stale(&self, key: &ContentKey, version: u32) -> Result<bool> {
        let now = self.clock.now();
        let mut guard = rw_write(&self.inner, SOURCE, "mark_stale");
        let inner = &mut *guard;

        let Some(slot) = inner.slots.get_mut(key) else {
            return Ok(false);
        };
        let is_current = slot.keys().next_back() == Some(&version);
        let Some(record) = slot.get_mut(&version) else {
            return Ok(false);
        };

        let previous = record.stale_after;
        record.stale_after = previous.min(now);
        if record.effective_status(now, &self.policy) != RecordStatus::Regenerating {
            record.status = RecordStatus::Stale;
            record.claimed_at = None;
            record.retry_after = None;
        }

        if is_current {
            inner.sweep.reindex(previous, record.stale_after, key);
        }
        Ok(true)
    }

    // == Claim ==
    async fn claim_for_regeneration(&self, key: &ContentKey) -> Result<ClaimOutcome> {
        let now = self.clock.now();
        let mut inner = rw_write(&self.inner, SOURCE, "claim_for_regeneration");

        let Some((&version, record)) = inner
            .slots
            .get_mut(key)
            .and_then(|slot| slot.iter_mut().next_back())
        else {
            return Ok(ClaimOutcome::Lost);
        };

        if !record.is_claimable(now, &self.policy) {
            return Ok(ClaimOutcome::Lost);
        }
        record.status = RecordStatus::Regenerating;
        record.claimed_at = Some(now);

        Ok(ClaimOutcome::Won(ClaimToken {
            version,
            claimed_at: now,
        }))
    }

    // == Release Claim ==
    async fn release_claim(&self, key: &ContentKey, claim: ClaimToken) -> Result<bool> {
        let now = self.clock.now();
        let mut inner = rw_write(&self.inner, SOURCE, "release_claim");

        let Some(record) = inner
            .slots
            .get_mut(key)
            .and_then(|slot| slot.get_mut(&claim.version))
        else {
            return Ok(false);
        };
        if record.status != RecordStatus::Regenerating
            || record.claimed_at != Some(claim.claimed_at)
        {
            return Ok(false);
        }

        record.failure_count = record.failure_count.saturating_add(1);
        record.status = RecordStatus::Failed;
        record.claimed_at = None;
        record.retry_after = Some(self.policy.retry_after(now, record.failure_count));
        Ok(true)
    }

    // == List Stale ==
    async fn list_stale(&self, query: StaleQuery) -> Result<StalePage> {
        query.validate()?;
        let now = self.clock.now();
        let inner = rw_read(&self.inner, SOURCE, "list_stale");

        let after = query.after.map(|c| (c.stale_after, c.key));
        let mut entries = Vec::new();
        let mut more = false;

        for (stale_after, key) in inner.sweep.due(query.cutoff, after.as_ref()) {
            if entries.len() == query.limit {
                more = true;
                break;
            }
            let Some((&version, record)) = inner.slots.get(key).and_then(|s| s.iter().next_back())
            else {
                continue;
            };
            if !super::is_sweepable(record.effective_status(now, &self.policy)) {
                continue;
            }
            entries.push(StaleEntry {
                page_key: key.page_key.clone(),
                locale: key.locale.clone(),
                version,
                stale_after: *stale_after,
            });
        }

        let next = if more {
            entries.last().map(StaleEntry::cursor)
        } else {
            None
        };
        Ok(StalePage { entries, next })
    }

    // == Purge Superseded ==
    async fn purge_superseded(&self) -> Result<usize> {
        let mut inner = rw_write(&self.inner, SOURCE, "purge_superseded");

        let mut removed = 0;
        for slot in inner.slots.values_mut() {
            while slot.len() > 1 {
                slot.pop_first();
                removed += 1;
            }
        }
        inner.records -= removed;
        Ok(removed)
    }

    // == Length ==
    async fn len(&self) -> Result<usize> {
        Ok(rw_read(&self.inner, SOURCE, "len").records)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::Clock;
    use crate::cache::{ManualClock, StaleCursor};
    use crate::error::ContentCacheError;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    fn setup() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ));
        let policy = RegenerationPolicy::new(
            Duration::from_secs(600),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        );
        (MemoryStore::new(policy, clock.clone()), clock)
    }

    fn key(page: &str, locale: &str) -> ContentKey {
        ContentKey::new(page, locale).unwrap()
    }

    fn payload(intro: &str) -> ContentPayload {
        ContentPayload::intro_only(intro)
    }

    #[tokio::test]
    async fn test_store_new() {
        let (store, _) = setup();
        assert_eq!(store.len().await.unwrap(), 0);
        assert_eq!(store.current_len(), 0);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, _) = setup();
        let k = key("dog-vaccines", "nl");

        store.put(&k, 1, payload("Hallo"), HOUR).await.unwrap();
        let record = store.get(&k, 1).await.unwrap().unwrap();

        assert_eq!(record.payload, payload("Hallo"));
        assert_eq!(record.status, RecordStatus::Fresh);
        assert_eq!(record.stale_after - record.generated_at, chrono::Duration::hours(1));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (store, _) = setup();
        assert!(store.get(&key("cat-food", "en"), 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_locales_are_independent() {
        let (store, _) = setup();
        store.put(&key("dog", "en"), 1, payload("Hello"), HOUR).await.unwrap();
        store.put(&key("dog", "nl"), 1, payload("Hallo"), HOUR).await.unwrap();

        let en = store.get(&key("dog", "en"), 1).await.unwrap().unwrap();
        let nl = store.get(&key("dog", "nl"), 1).await.unwrap().unwrap();
        assert_eq!(en.payload.intro, "Hello");
        assert_eq!(nl.payload.intro, "Hallo");
        assert!(store.get(&key("dog", "de"), 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_same_version_overwrites() {
        let (store, _) = setup();
        let k = key("dog", "en");

        store.put(&k, 1, payload("first"), HOUR).await.unwrap();
        store.put(&k, 1, payload("second"), HOUR).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        assert_eq!(store.get(&k, 1).await.unwrap().unwrap().payload.intro, "second");
    }

    #[tokio::test]
    async fn test_get_picks_highest_version_not_above_current() {
        let (store, _) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("v1"), HOUR).await.unwrap();
        store.put(&k, 3, payload("v3"), HOUR).await.unwrap();

        assert!(store.get(&k, 0).await.unwrap().is_none());
        assert_eq!(store.get(&k, 1).await.unwrap().unwrap().version, 1);
        assert_eq!(store.get(&k, 2).await.unwrap().unwrap().version, 1);
        assert_eq!(store.get(&k, 3).await.unwrap().unwrap().version, 3);
        assert_eq!(store.get(&k, 9).await.unwrap().unwrap().version, 3);
    }

    #[tokio::test]
    async fn test_put_rejects_version_regression() {
        let (store, _) = setup();
        let k = key("dog", "en");
        store.put(&k, 2, payload("v2"), HOUR).await.unwrap();

        let result = store.put(&k, 1, payload("v1"), HOUR).await;
        assert!(matches!(result, Err(ContentCacheError::Validation(_))));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_rejects_invalid_payload_and_key() {
        let (store, _) = setup();
        let empty = store
            .put(&key("dog", "en"), 1, ContentPayload::default(), HOUR)
            .await;
        assert!(matches!(empty, Err(ContentCacheError::Validation(_))));

        let bad_key = ContentKey {
            page_key: "dog".to_string(),
            locale: "n l".to_string(),
        };
        let result = store.put(&bad_key, 1, payload("x"), HOUR).await;
        assert!(matches!(result, Err(ContentCacheError::Validation(_))));
    }

    #[tokio::test]
    async fn test_ttl_elapses_to_stale_but_still_served() {
        let (store, clock) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("kept"), HOUR).await.unwrap();

        clock.advance(HOUR);

        let record = store.get(&k, 1).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Stale);
        assert_eq!(record.payload.intro, "kept");
    }

    #[tokio::test]
    async fn test_mark_stale() {
        let (store, clock) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("x"), HOUR).await.unwrap();

        assert!(store.mark_stale(&k, 1).await.unwrap());
        assert!(!store.mark_stale(&k, 2).await.unwrap());
        assert!(!store.mark_stale(&key("cat", "en"), 1).await.unwrap());

        let record = store.get(&k, 1).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Stale);
        assert_eq!(record.stale_after, clock.now());

        let page = store
            .list_stale(StaleQuery::new(clock.now(), 10))
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_claim_requires_stale_record() {
        let (store, clock) = setup();
        let k = key("dog", "en");

        assert_eq!(store.claim_for_regeneration(&k).await.unwrap(), ClaimOutcome::Lost);

        store.put(&k, 1, payload("x"), HOUR).await.unwrap();
        assert_eq!(store.claim_for_regeneration(&k).await.unwrap(), ClaimOutcome::Lost);

        clock.advance(HOUR);
        assert_eq!(
            store.claim_for_regeneration(&k).await.unwrap(),
            ClaimOutcome::Won(ClaimToken {
                version: 1,
                claimed_at: clock.now()
            })
        );
        assert_eq!(store.claim_for_regeneration(&k).await.unwrap(), ClaimOutcome::Lost);
        assert_eq!(
            store.get(&k, 1).await.unwrap().unwrap().status,
            RecordStatus::Regenerating
        );
    }

    #[tokio::test]
    async fn test_watchdog_makes_dead_claim_reclaimable() {
        let (store, clock) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("x"), Duration::ZERO).await.unwrap();

        assert!(store.claim_for_regeneration(&k).await.unwrap().is_won());
        clock.advance(Duration::from_secs(599));
        assert!(!store.claim_for_regeneration(&k).await.unwrap().is_won());

        clock.advance(Duration::from_secs(1));
        assert!(store.claim_for_regeneration(&k).await.unwrap().is_won());
    }

    #[tokio::test]
    async fn test_mark_stale_keeps_live_claim() {
        let (store, clock) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("x"), HOUR).await.unwrap();
        clock.advance(HOUR);
        let first = store.claim_for_regeneration(&k).await.unwrap().token().unwrap();

        clock.advance(Duration::from_secs(5));
        assert!(store.mark_stale(&k, 1).await.unwrap());
        assert_eq!(store.claim_for_regeneration(&k).await.unwrap(), ClaimOutcome::Lost);

        let record = store.get(&k, 1).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Regenerating);
        assert_eq!(record.claimed_at, Some(first.claimed_at));
        assert_eq!(record.stale_after, clock.now() - chrono::Duration::seconds(5));
        assert!(store.release_claim(&k, first).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_stale_frees_expired_claim() {
        let (store, clock) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("x"), Duration::ZERO).await.unwrap();
        store.claim_for_regeneration(&k).await.unwrap();
        clock.advance(Duration::from_secs(600));

        assert!(store.mark_stale(&k, 1).await.unwrap());
        let record = store.get(&k, 1).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Stale);
        assert!(record.claimed_at.is_none());
    }

    #[tokio::test]
    async fn test_release_of_taken_over_claim_is_ignored() {
        let (store, clock) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("x"), Duration::ZERO).await.unwrap();
        let dead = store.claim_for_regeneration(&k).await.unwrap().token().unwrap();

        clock.advance(Duration::from_secs(600));
        let live = store.claim_for_regeneration(&k).await.unwrap().token().unwrap();

        assert!(!store.release_claim(&k, dead).await.unwrap());
        let record = store.get(&k, 1).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Regenerating);
        assert_eq!(record.failure_count, 0);

        assert!(store.release_claim(&k, live).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_claim_applies_backoff() {
        let (store, clock) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("x"), Duration::ZERO).await.unwrap();

        let claim = store.claim_for_regeneration(&k).await.unwrap().token().unwrap();
        assert!(store.release_claim(&k, claim).await.unwrap());
        assert!(!store.release_claim(&k, claim).await.unwrap());

        let record = store.get(&k, 1).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.failure_count, 1);
        assert_eq!(record.payload.intro, "x");
        assert!(!store.claim_for_regeneration(&k).await.unwrap().is_won());

        clock.advance(Duration::from_secs(60));
        assert_eq!(store.get(&k, 1).await.unwrap().unwrap().status, RecordStatus::Stale);
        let claim = store.claim_for_regeneration(&k).await.unwrap().token().unwrap();

        // second consecutive failure doubles the wait
        assert!(store.release_claim(&k, claim).await.unwrap());
        clock.advance(Duration::from_secs(60));
        assert!(!store.claim_for_regeneration(&k).await.unwrap().is_won());
        clock.advance(Duration::from_secs(60));
        assert!(store.claim_for_regeneration(&k).await.unwrap().is_won());
    }

    #[tokio::test]
    async fn test_put_after_claim_resets_failure_state() {
        let (store, _) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("old"), Duration::ZERO).await.unwrap();
        let claim = store.claim_for_regeneration(&k).await.unwrap().token().unwrap();
        store.release_claim(&k, claim).await.unwrap();

        let record = store.put(&k, 1, payload("new"), HOUR).await.unwrap();
        assert_eq!(record.status, RecordStatus::Fresh);
        assert_eq!(record.failure_count, 0);
        assert!(record.retry_after.is_none());
        assert!(record.claimed_at.is_none());
    }

    #[tokio::test]
    async fn test_list_stale_respects_cutoff_and_order() {
        let (store, clock) = setup();
        store.put(&key("a", "en"), 1, payload("a"), Duration::from_secs(30)).await.unwrap();
        store.put(&key("b", "en"), 1, payload("b"), Duration::from_secs(10)).await.unwrap();
        store.put(&key("c", "en"), 1, payload("c"), Duration::from_secs(90)).await.unwrap();

        clock.advance(Duration::from_secs(60));
        let page = store.list_stale(StaleQuery::new(clock.now(), 10)).await.unwrap();

        let pages: Vec<_> = page.entries.iter().map(|e| e.page_key.as_str()).collect();
        assert_eq!(pages, vec!["b", "a"]);
        assert!(page.entries.iter().all(|e| e.stale_after <= clock.now()));
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn test_list_stale_pages_with_cursor() {
        let (store, clock) = setup();
        for (i, page) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            let ttl = Duration::from_secs(i as u64);
            store.put(&key(page, "en"), 1, payload(page), ttl).await.unwrap();
        }
        clock.advance(Duration::from_secs(10));

        let mut query = StaleQuery::new(clock.now(), 2);
        let mut seen = Vec::new();
        loop {
            let page = store.list_stale(query.clone()).await.unwrap();
            seen.extend(page.entries.iter().map(|e| e.page_key.clone()));
            match page.next {
                Some(cursor) => query.after = Some(cursor),
                None => break,
            }
        }
        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_list_stale_skips_claimed_and_backing_off() {
        let (store, clock) = setup();
        let claimed = key("claimed", "en");
        let failed = key("failed", "en");
        let due = key("due", "en");
        for k in [&claimed, &failed, &due] {
            store.put(k, 1, payload("x"), Duration::ZERO).await.unwrap();
        }
        store.claim_for_regeneration(&claimed).await.unwrap();
        let claim = store.claim_for_regeneration(&failed).await.unwrap().token().unwrap();
        store.release_claim(&failed, claim).await.unwrap();

        let page = store.list_stale(StaleQuery::new(clock.now(), 10)).await.unwrap();
        let pages: Vec<_> = page.entries.iter().map(|e| e.page_key.as_str()).collect();
        assert_eq!(pages, vec!["due"]);
    }

    #[tokio::test]
    async fn test_list_stale_only_current_versions() {
        let (store, clock) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("v1"), Duration::ZERO).await.unwrap();
        store.put(&k, 2, payload("v2"), HOUR).await.unwrap();

        let page = store.list_stale(StaleQuery::new(clock.now(), 10)).await.unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(store.current_len(), 1);
    }

    #[tokio::test]
    async fn test_list_stale_rejects_zero_limit() {
        let (store, clock) = setup();
        let result = store.list_stale(StaleQuery::new(clock.now(), 0)).await;
        assert!(matches!(result, Err(ContentCacheError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_stale_cursor_past_everything() {
        let (store, clock) = setup();
        store.put(&key("a", "en"), 1, payload("a"), Duration::ZERO).await.unwrap();

        let mut query = StaleQuery::new(clock.now(), 10);
        query.after = Some(StaleCursor {
            stale_after: clock.now(),
            key: key("zzz", "en"),
        });
        assert!(store.list_stale(query).await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_purge_superseded() {
        let (store, _) = setup();
        let k = key("dog", "en");
        store.put(&k, 1, payload("v1"), HOUR).await.unwrap();
        store.put(&k, 2, payload("v2"), HOUR).await.unwrap();
        store.put(&k, 3, payload("v3"), HOUR).await.unwrap();
        store.put(&key("cat", "en"), 1, payload("c"), HOUR).await.unwrap();

        assert_eq!(store.purge_superseded().await.unwrap(), 2);
        assert_eq!(store.len().await.unwrap(), 2);
        assert!(store.get(&k, 2).await.unwrap().is_none());
        assert_eq!(store.get(&k, 3).await.unwrap().unwrap().payload.intro, "v3");
    }
}
