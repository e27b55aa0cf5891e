//! Cache Module
//!
//! Versioned storage for generated SEO content with staleness tracking and
//! single-winner regeneration claims.

mod backend;
mod clock;
mod index;
pub(crate) mod lock;
mod payload;
mod policy;
mod postgres;
mod record;
mod stats;
mod store;


use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{ContentCacheError, Result};

// Re-export public types
pub use backend::{
    ClaimOutcome, ClaimToken, ContentStore, SharedStore, StaleCursor, StaleEntry, StalePage, StaleQuery,
    StaleSweep,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use index::SweepIndex;
pub use payload::{ContentPayload, FaqItem};
pub use policy::RegenerationPolicy;
pub use postgres::PostgresStore;
pub use record::{ContentCacheRecord, ContentKey, RecordStatus};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::MemoryStore;

// == Public Constants ==
/// Maximum allowed page key length in bytes
pub const MAX_PAGE_KEY_LENGTH: usize = 256;

/// Maximum allowed locale length (longest practical BCP-47 tag)
pub const MAX_LOCALE_LENGTH: usize = 35;

/// Maximum serialized payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024; // 64 KiB

pub const MAX_BULLETS: usize = 32;

pub const MAX_FAQ_ITEMS: usize = 64;

/// Upper bound on one `list_stale` page
pub const MAX_STALE_LIMIT: usize = 1000;

// == Shared Store Rules ==
/// `now + ttl`, rejecting TTLs that do not fit the timestamp range.
pub(crate) fn stale_deadline(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| ContentCacheError::Validation(format!("ttl {:?} is out of range", ttl)))
}

/// Versions never move backwards for a key.
pub(crate) fn check_version_order(version: u32, current_version: u32) -> Result<()> {
    if version < current_version {
        return Err(ContentCacheError::Validation(format!(
            "version {} is older than current version {}",
            version, current_version
        )));
    }
    Ok(())
}

/// A due record is handed to the sweep unless it is under a live claim or
/// waiting out a failure backoff.
pub(crate) fn is_sweepable(status: RecordStatus) -> bool {
    !matches!(status, RecordStatus::Regenerating | RecordStatus::Failed)
}
