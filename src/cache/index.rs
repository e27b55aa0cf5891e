//! Sweep Index Module
//!
//! Orders current records by `stale_after` so the stale sweep is a range
//! scan instead of a full table walk.

use std::collections::BTreeSet;
use std::ops::Bound;

use chrono::{DateTime, Utc};

use crate::cache::ContentKey;

// == Sweep Index ==
/// Tracks one `(stale_after, key)` entry per current record.
///
/// Entries are ordered by:
/// - `stale_after` ascending (oldest staleness first)
/// - then `page_key`, then `locale`
#[derive(Debug, Default)]
pub struct SweepIndex {
    entries: BTreeSet<(DateTime<Utc>, ContentKey)>,
}

impl SweepIndex {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            entries: BTreeSet::new(),
        }
    }

    // == Insert ==
    pub fn insert(&mut self, stale_after: DateTime<Utc>, key: ContentKey) {
        self.entries.insert((stale_after, key));
    }

    // == Remove ==
    /// Removes an entry, returning whether it was present.
    pub fn remove(&mut self, stale_after: DateTime<Utc>, key: &ContentKey) -> bool {
        self.entries.remove(&(stale_after, key.clone()))
    }

    // == Reindex ==
    /// Moves a key from one staleness deadline to another.
    pub fn reindex(&mut self, from: DateTime<Utc>, to: DateTime<Utc>, key: &ContentKey) {
        if from != to {
            self.remove(from, key);
            self.insert(to, key.clone());
        }
    }

    // == Due ==
    /// Iterates entries with `stale_after <= cutoff`, strictly after `after` when given.
    pub fn due<'a>(
        &'a self,
        cutoff: DateTime<Utc>,
        after: Option<&(DateTime<Utc>, ContentKey)>,
    ) -> impl Iterator<Item = &'a (DateTime<Utc>, ContentKey)> + 'a {
        let lower = match after {
            Some(cursor) => Bound::Excluded(cursor.clone()),
            None => Bound::Unbounded,
        };
        self.entries
            .range((lower, Bound::Unbounded))
            .take_while(move |(stale_after, _)| *stale_after <= cutoff)
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Contains ==
    pub fn contains(&self, stale_after: DateTime<Utc>, key: &ContentKey) -> bool {
        self.entries.contains(&(stale_after, key.clone()))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn key(page: &str) -> ContentKey {
        ContentKey::new(page, "en").unwrap()
    }

    #[test]
    fn test_index_new() {
        let index = SweepIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_due_is_ordered_and_bounded_by_cutoff() {
        let mut index = SweepIndex::new();
        index.insert(t(30), key("c"));
        index.insert(t(10), key("a"));
        index.insert(t(20), key("b"));
        index.insert(t(40), key("d"));

        let due: Vec<_> = index.due(t(30), None).map(|(_, k)| k.page_key.clone()).collect();
        assert_eq!(due, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_due_resumes_after_cursor() {
        let mut index = SweepIndex::new();
        index.insert(t(10), key("a"));
        index.insert(t(10), key("b"));
        index.insert(t(20), key("c"));

        let cursor = (t(10), key("a"));
        let due: Vec<_> = index
            .due(t(100), Some(&cursor))
            .map(|(_, k)| k.page_key.clone())
            .collect();
        assert_eq!(due, vec!["b", "c"]);
    }

    #[test]
    fn test_reindex_moves_entry() {
        let mut index = SweepIndex::new();
        index.insert(t(50), key("a"));
        index.reindex(t(50), t(5), &key("a"));

        assert!(!index.contains(t(50), &key("a")));
        assert!(index.contains(t(5), &key("a")));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_missing_entry() {
        let mut index = SweepIndex::new();
        assert!(!index.remove(t(1), &key("nope")));
    }
}
