//! Regeneration Request Queue
//!
//! Render-side handle for nudging the regeneration worker. Requests for a key
//! that is already queued or in flight are dropped.

use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::ContentKey;

/// Work item sent from the resolver to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegenerationRequest {
    /// No record exists at or below `version`; generate a first one
    Missing { key: ContentKey, version: u32 },
    /// A stale record was served; claim and refresh it
    Refresh { key: ContentKey },
}

impl RegenerationRequest {
    pub fn key(&self) -> &ContentKey {
        match self {
            RegenerationRequest::Missing { key, .. } | RegenerationRequest::Refresh { key } => key,
        }
    }
}

// == Regeneration Queue ==
/// Bounded, deduplicating sender side of the worker channel.
#[derive(Debug, Clone)]
pub struct RegenerationQueue {
    tx: mpsc::Sender<RegenerationRequest>,
    pending: Arc<DashSet<ContentKey>>,
}

impl RegenerationQueue {
    /// Creates the queue and the receiver the worker consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RegenerationRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                pending: Arc::new(DashSet::new()),
            },
            rx,
        )
    }

    pub fn request_missing(&self, key: &ContentKey, version: u32) -> bool {
        self.enqueue(RegenerationRequest::Missing {
            key: key.clone(),
            version,
        })
    }

    pub fn request_refresh(&self, key: &ContentKey) -> bool {
        self.enqueue(RegenerationRequest::Refresh { key: key.clone() })
    }

    /// Never waits: a full channel drops the request and the next sweep
    /// picks the key up instead.
    fn enqueue(&self, request: RegenerationRequest) -> bool {
        let key = request.key().clone();
        if !self.pending.insert(key.clone()) {
            return false;
        }
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(err) => {
                debug!(page_key = %key.page_key, locale = %key.locale, "Regeneration request dropped: {}", err);
                self.pending.remove(&key);
                false
            }
        }
    }

    /// Releases the key so later requests are accepted again.
    pub fn complete(&self, key: &ContentKey) {
        self.pending.remove(key);
    }

    pub fn is_pending(&self, key: &ContentKey) -> bool {
        self.pending.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(page: &str) -> ContentKey {
        ContentKey::new(page, "en").unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_requests_are_dropped() {
        let (queue, mut rx) = RegenerationQueue::channel(8);

        assert!(queue.request_missing(&key("dog-walking"), 1));
        assert!(!queue.request_missing(&key("dog-walking"), 1));
        assert!(!queue.request_refresh(&key("dog-walking")));
        assert!(queue.request_refresh(&key("cat-sitting")));

        assert_eq!(
            rx.recv().await,
            Some(RegenerationRequest::Missing {
                key: key("dog-walking"),
                version: 1
            })
        );
        assert_eq!(rx.recv().await.map(|r| r.key().clone()), Some(key("cat-sitting")));
    }

    #[tokio::test]
    async fn test_complete_allows_requeue() {
        let (queue, _rx) = RegenerationQueue::channel(8);

        assert!(queue.request_refresh(&key("dog-walking")));
        assert!(queue.is_pending(&key("dog-walking")));
        queue.complete(&key("dog-walking"));
        assert!(!queue.is_pending(&key("dog-walking")));
        assert!(queue.request_refresh(&key("dog-walking")));
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_pending() {
        let (queue, _rx) = RegenerationQueue::channel(1);

        assert!(queue.request_refresh(&key("a")));
        assert!(!queue.request_refresh(&key("b")));
        assert!(!queue.is_pending(&key("b")));
    }
}
