//! Content Record Module
//!
//! Defines cache keys, record status and the persisted content record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{ContentPayload, RegenerationPolicy, MAX_LOCALE_LENGTH, MAX_PAGE_KEY_LENGTH};
use crate::error::{ContentCacheError, Result};

// == Content Key ==
/// Identity of a content slot: page/topic plus locale, independent of version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey {
    /// Stable semantic identifier (slug or route pattern)
    pub page_key: String,
    /// Language/region variant, e.g. "en" or "nl-BE"
    pub locale: String,
}

impl ContentKey {
    /// Builds a key after validating both parts.
    pub fn new(page_key: impl Into<String>, locale: impl Into<String>) -> Result<Self> {
        let key = Self {
            page_key: page_key.into(),
            locale: locale.into(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Checks the key against length and character rules.
    pub fn validate(&self) -> Result<()> {
        if self.page_key.trim().is_empty() {
            return Err(ContentCacheError::Validation(
                "page_key cannot be empty".to_string(),
            ));
        }
        if self.page_key.len() > MAX_PAGE_KEY_LENGTH {
            return Err(ContentCacheError::Validation(format!(
                "page_key exceeds maximum length of {} bytes",
                MAX_PAGE_KEY_LENGTH
            )));
        }
        if self.page_key.chars().any(char::is_control) {
            return Err(ContentCacheError::Validation(
                "page_key contains control characters".to_string(),
            ));
        }
        if self.locale.is_empty() || self.locale.len() > MAX_LOCALE_LENGTH {
            return Err(ContentCacheError::Validation(format!(
                "locale must be 1 to {} characters",
                MAX_LOCALE_LENGTH
            )));
        }
        if !self
            .locale
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ContentCacheError::Validation(format!(
                "locale '{}' contains invalid characters",
                self.locale
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.page_key, self.locale)
    }
}

// == Record Status ==
/// Regeneration state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Fresh,
    Stale,
    Regenerating,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Fresh => "fresh",
            RecordStatus::Stale => "stale",
            RecordStatus::Regenerating => "regenerating",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = ContentCacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fresh" => Ok(RecordStatus::Fresh),
            "stale" => Ok(RecordStatus::Stale),
            "regenerating" => Ok(RecordStatus::Regenerating),
            "failed" => Ok(RecordStatus::Failed),
            other => Err(ContentCacheError::Internal(format!(
                "unknown record status '{}'",
                other
            ))),
        }
    }
}

// == Content Cache Record ==
/// One generated content document for a (page, locale, version) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentCacheRecord {
    pub page_key: String,
    pub locale: String,
    /// Prompt/template version that produced the payload
    pub version: u32,
    pub payload: ContentPayload,
    pub generated_at: DateTime<Utc>,
    /// Past this instant the record is still served but eligible for regeneration
    pub stale_after: DateTime<Utc>,
    pub status: RecordStatus,
    /// When the running regeneration claim was taken
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    /// Consecutive failed regenerations since the last successful put
    #[serde(default)]
    pub failure_count: u32,
    /// Backoff gate after a failed regeneration
    #[serde(default)]
    pub retry_after: Option<DateTime<Utc>>,
}

impl ContentCacheRecord {
    // == Constructor ==
    /// Creates a fresh record generated at `now`.
    pub fn fresh(
        key: &ContentKey,
        version: u32,
        payload: ContentPayload,
        now: DateTime<Utc>,
        stale_after: DateTime<Utc>,
    ) -> Self {
        Self {
            page_key: key.page_key.clone(),
            locale: key.locale.clone(),
            version,
            payload,
            generated_at: now,
            stale_after,
            status: RecordStatus::Fresh,
            claimed_at: None,
            failure_count: 0,
            retry_after: None,
        }
    }

    pub fn key(&self) -> ContentKey {
        ContentKey {
            page_key: self.page_key.clone(),
            locale: self.locale.clone(),
        }
    }

    // == Effective Status ==
    /// Status as observed at `now`, after applying TTL, watchdog and backoff.
    ///
    /// Boundary condition: every deadline is inclusive, so a record whose
    /// `stale_after == now` is already stale.
    pub fn effective_status(&self, now: DateTime<Utc>, policy: &RegenerationPolicy) -> RecordStatus {
        match self.status {
            RecordStatus::Fresh if self.stale_after <= now => RecordStatus::Stale,
            RecordStatus::Regenerating => match self.claimed_at {
                Some(claimed) if policy.claim_deadline(claimed) > now => RecordStatus::Regenerating,
                _ => RecordStatus::Stale,
            },
            RecordStatus::Failed => match self.retry_after {
                Some(retry) if retry > now => RecordStatus::Failed,
                _ => RecordStatus::Stale,
            },
            status => status,
        }
    }

    /// Whether a regeneration claim may be taken at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>, policy: &RegenerationPolicy) -> bool {
        self.effective_status(now, policy) == RecordStatus::Stale
    }

    /// Copy of the record carrying its effective status, as handed to readers.
    pub fn observed(&self, now: DateTime<Utc>, policy: &RegenerationPolicy) -> Self {
        let mut record = self.clone();
        record.status = self.effective_status(now, policy);
        record
    }
}
