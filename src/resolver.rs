//! Content Resolver Module
//!
//! Render-side entry point. Always answers with a payload: cached copy when
//! there is any, default copy otherwise. Stale hits and misses are handed to
//! the regeneration worker without waiting for it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::cache::{CacheStats, ContentKey, ContentPayload, RecordStatus, SharedStore};
use crate::generation::TemplateGenerator;
use crate::tasks::RegenerationQueue;

/// Where a resolved payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Fresh,
    /// Cached copy awaiting (or undergoing) regeneration
    Stale,
    /// Default copy; nothing cached or the store was unreachable
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub payload: ContentPayload,
    pub source: ContentSource,
    /// Version of the cached record, absent for default copy
    pub version: Option<u32>,
    pub generated_at: Option<DateTime<Utc>>,
}

impl Resolved {
    fn fallback(payload: ContentPayload) -> Self {
        Self {
            payload,
            source: ContentSource::Default,
            version: None,
            generated_at: None,
        }
    }
}

// == Content Resolver ==
#[derive(Clone)]
pub struct ContentResolver {
    store: SharedStore,
    stats: Arc<CacheStats>,
    queue: RegenerationQueue,
    defaults: TemplateGenerator,
}

impl ContentResolver {
    pub fn new(
        store: SharedStore,
        stats: Arc<CacheStats>,
        queue: RegenerationQueue,
        defaults: TemplateGenerator,
    ) -> Self {
        Self {
            store,
            stats,
            queue,
            defaults,
        }
    }

    /// Template copy used when nothing better is available.
    pub fn default_copy(&self, key: &ContentKey) -> ContentPayload {
        self.defaults.render(key)
    }

    /// Resolves copy for a render. Never fails and never waits on generation.
    pub async fn resolve(
        &self,
        key: &ContentKey,
        current_version: u32,
        fallback: ContentPayload,
    ) -> Resolved {
        let record = match self.store.get(key, current_version).await {
            Ok(record) => record,
            Err(err) => {
                warn!(page_key = %key.page_key, locale = %key.locale, "Content lookup failed, serving default copy: {}", err);
                self.stats.record_fallback();
                return Resolved::fallback(fallback);
            }
        };

        let Some(record) = record else {
            self.stats.record_miss();
            self.stats.record_fallback();
            self.queue.request_missing(key, current_version);
            return Resolved::fallback(fallback);
        };

        let source = match record.status {
            RecordStatus::Fresh => {
                self.stats.record_hit();
                ContentSource::Fresh
            }
            RecordStatus::Stale => {
                self.stats.record_stale_hit();
                self.queue.request_refresh(key);
                ContentSource::Stale
            }
            RecordStatus::Regenerating | RecordStatus::Failed => {
                self.stats.record_stale_hit();
                ContentSource::Stale
            }
        };

        Resolved {
            payload: record.payload,
            source,
            version: Some(record.version),
            generated_at: Some(record.generated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::cache::{
        ClaimOutcome, ClaimToken, ContentCacheRecord, ContentStore, ManualClock, MemoryStore,
        RegenerationPolicy, StalePage, StaleQuery,
    };
    use crate::error::{ContentCacheError, Result};
    use crate::tasks::RegenerationRequest;

    fn setup() -> (
        Arc<MemoryStore>,
        Arc<ManualClock>,
        ContentResolver,
        tokio::sync::mpsc::Receiver<RegenerationRequest>,
    ) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new(
            RegenerationPolicy::default(),
            clock.clone(),
        ));
        let (queue, rx) = RegenerationQueue::channel(16);
        let resolver = ContentResolver::new(
            store.clone(),
            Arc::new(CacheStats::new()),
            queue,
            TemplateGenerator::new(1),
        );
        (store, clock, resolver, rx)
    }

    #[tokio::test]
    async fn test_fresh_hit() {
        let (store, _clock, resolver, mut rx) = setup();
        let key = ContentKey::new("dog-walking", "en").unwrap();
        store
            .put(&key, 1, ContentPayload::intro_only("Walks"), Duration::from_secs(60))
            .await
            .unwrap();

        let resolved = resolver.resolve(&key, 1, resolver.default_copy(&key)).await;
        assert_eq!(resolved.source, ContentSource::Fresh);
        assert_eq!(resolved.payload.intro, "Walks");
        assert_eq!(resolved.version, Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_hit_serves_and_requests_refresh() {
        let (store, clock, resolver, mut rx) = setup();
        let key = ContentKey::new("dog-walking", "en").unwrap();
        store
            .put(&key, 1, ContentPayload::intro_only("Walks"), Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(60));

        let resolved = resolver.resolve(&key, 1, resolver.default_copy(&key)).await;
        assert_eq!(resolved.source, ContentSource::Stale);
        assert_eq!(resolved.payload.intro, "Walks");
        assert_eq!(
            rx.try_recv().unwrap(),
            RegenerationRequest::Refresh { key: key.clone() }
        );
    }

    #[tokio::test]
    async fn test_miss_serves_fallback_and_requests_generation() {
        let (_store, _clock, resolver, mut rx) = setup();
        let key = ContentKey::new("cat-sitting", "nl").unwrap();

        let fallback = ContentPayload::intro_only("Standaardtekst");
        let resolved = resolver.resolve(&key, 2, fallback.clone()).await;
        assert_eq!(resolved, Resolved::fallback(fallback));
        assert_eq!(
            rx.try_recv().unwrap(),
            RegenerationRequest::Missing { key, version: 2 }
        );
    }

    #[derive(Debug)]
    struct UnreachableStore;

    #[async_trait]
    impl ContentStore for UnreachableStore {
        async fn get(&self, _: &ContentKey, _: u32) -> Result<Option<ContentCacheRecord>> {
            Err(ContentCacheError::StorageUnavailable("connection refused".into()))
        }
        async fn put(
            &self,
            _: &ContentKey,
            _: u32,
            _: ContentPayload,
            _: Duration,
        ) -> Result<ContentCacheRecord> {
            Err(ContentCacheError::StorageUnavailable("connection refused".into()))
        }
        async fn mark_stale(&self, _: &ContentKey, _: u32) -> Result<bool> {
            Err(ContentCacheError::StorageUnavailable("connection refused".into()))
        }
        async fn claim_for_regeneration(&self, _: &ContentKey) -> Result<ClaimOutcome> {
            Err(ContentCacheError::StorageUnavailable("connection refused".into()))
        }
        async fn release_claim(&self, _: &ContentKey, _: ClaimToken) -> Result<bool> {
            Err(ContentCacheError::StorageUnavailable("connection refused".into()))
        }
        async fn list_stale(&self, _: StaleQuery) -> Result<StalePage> {
            Err(ContentCacheError::StorageUnavailable("connection refused".into()))
        }
        async fn purge_superseded(&self) -> Result<usize> {
            Err(ContentCacheError::StorageUnavailable("connection refused".into()))
        }
        async fn len(&self) -> Result<usize> {
            Err(ContentCacheError::StorageUnavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_error_serves_fallback() {
        let (queue, mut rx) = RegenerationQueue::channel(4);
        let stats = Arc::new(CacheStats::new());
        let resolver = ContentResolver::new(
            Arc::new(UnreachableStore),
            stats.clone(),
            queue,
            TemplateGenerator::new(1),
        );
        let key = ContentKey::new("dog-walking", "nl").unwrap();

        let resolved = resolver.resolve(&key, 1, resolver.default_copy(&key)).await;
        assert_eq!(resolved.source, ContentSource::Default);
        assert!(resolved.payload.intro.starts_with("Alles"));
        assert_eq!(stats.snapshot().fallbacks, 1);
        assert!(rx.try_recv().is_err());
    }
}
