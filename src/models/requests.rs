//! Request DTOs for the content cache API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cache::{ContentKey, ContentPayload};
use crate::error::Result;

/// Request body for storing generated content (PUT /content)
///
/// # Fields
/// - `page_key`, `locale`: content identity
/// - `version`: prompt/template version that produced the payload
/// - `payload`: structured copy
/// - `ttl`: Optional TTL in seconds (uses default if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct PutContentRequest {
    pub page_key: String,
    pub locale: String,
    pub version: u32,
    pub payload: ContentPayload,
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl PutContentRequest {
    /// Validates the identity fields and returns the content key.
    pub fn key(&self) -> Result<ContentKey> {
        ContentKey::new(self.page_key.clone(), self.locale.clone())
    }
}

/// Query string selecting a content version (`?version=N`).
///
/// Falls back to the server's current content version when absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionQuery {
    #[serde(default)]
    pub version: Option<u32>,
}

/// Query string for GET /stale
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaleListParams {
    /// Page size (default 100)
    #[serde(default)]
    pub limit: Option<usize>,
    /// RFC 3339 instant; defaults to now
    #[serde(default)]
    pub cutoff: Option<DateTime<Utc>>,
    /// Opaque continuation token from a previous page
    #[serde(default)]
    pub cursor: Option<String>,
}
