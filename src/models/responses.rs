//! Response DTOs for the content cache API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{ContentKey, StaleEntry, StatsSnapshot};
use crate::resolver::Resolved;

/// Response body for POST /content/:page_key/:locale/:version/stale
#[derive(Debug, Clone, Serialize)]
pub struct MarkStaleResponse {
    /// Success message
    pub message: String,
    pub page_key: String,
    pub locale: String,
    pub version: u32,
}

impl MarkStaleResponse {
    pub fn new(key: &ContentKey, version: u32) -> Self {
        Self {
            message: format!("Content '{}' v{} marked stale", key, version),
            page_key: key.page_key.clone(),
            locale: key.locale.clone(),
            version,
        }
    }
}

/// Response body for POST /content/:page_key/:locale/claim
#[derive(Debug, Clone, Serialize)]
pub struct ClaimResponse {
    /// Whether this caller now owns regeneration
    pub claimed: bool,
    /// Version of the claimed record
    pub version: Option<u32>,
}

/// Response body for GET /stale
#[derive(Debug, Clone, Serialize)]
pub struct StaleListResponse {
    pub entries: Vec<StaleEntry>,
    /// Pass back as `cursor` to fetch the next page
    pub next_cursor: Option<String>,
}

/// Response body for GET /render/:page_key/:locale
#[derive(Debug, Clone, Serialize)]
pub struct RenderResponse {
    pub page_key: String,
    pub locale: String,
    #[serde(flatten)]
    pub content: Resolved,
}

/// Response body for POST /gc
#[derive(Debug, Clone, Serialize)]
pub struct PurgeResponse {
    /// Number of superseded records deleted
    pub removed: usize,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    /// Share of lookups answered from the cache
    pub hit_rate: f64,
    /// Records in the store, superseded versions included
    pub total_records: usize,
}

impl StatsResponse {
    /// Creates a new StatsResponse from a counter snapshot
    pub fn new(counters: StatsSnapshot, total_records: usize) -> Self {
        Self {
            hit_rate: counters.hit_rate(),
            counters,
            total_records,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentPayload;
    use crate::resolver::ContentSource;

    #[test]
    fn test_mark_stale_response_serialize() {
        let key = ContentKey::new("dog-walking", "nl").unwrap();
        let json = serde_json::to_string(&MarkStaleResponse::new(&key, 3)).unwrap();
        assert!(json.contains("dog-walking@nl"));
        assert!(json.contains("\"version\":3"));
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let counters = StatsSnapshot {
            hits: 8,
            stale_hits: 0,
            misses: 2,
            ..StatsSnapshot::default()
        };
        let resp = StatsResponse::new(counters, 5);
        let json: serde_json::Value = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["hits"], 8);
        assert_eq!(json["total_records"], 5);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_render_response_serialize() {
        let resp = RenderResponse {
            page_key: "dog-walking".to_string(),
            locale: "en".to_string(),
            content: Resolved {
                payload: ContentPayload::intro_only("Walks"),
                source: ContentSource::Default,
                version: None,
                generated_at: None,
            },
        };
        let json: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["source"], "default");
        assert_eq!(json["payload"]["intro"], "Walks");
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
