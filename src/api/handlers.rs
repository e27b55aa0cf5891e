//! API Handlers
//!
//! HTTP request handlers for each content cache endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tokio::sync::mpsc;

use crate::cache::{
    CacheStats, ClaimOutcome, ContentCacheRecord, ContentKey, SharedClock, SharedStore,
    StaleCursor, StaleQuery,
};
use crate::config::Config;
use crate::error::{ContentCacheError, Result};
use crate::generation::TemplateGenerator;
use crate::models::{
    ClaimResponse, HealthResponse, MarkStaleResponse, PurgeResponse, PutContentRequest,
    RenderResponse, StaleListParams, StaleListResponse, StatsResponse, VersionQuery,
};
use crate::resolver::ContentResolver;
use crate::tasks::{RegenerationQueue, RegenerationRequest};

/// Page size of GET /stale when no limit is given
pub const DEFAULT_STALE_LIMIT: usize = 100;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub stats: Arc<CacheStats>,
    pub resolver: ContentResolver,
    pub clock: SharedClock,
    /// TTL for writes that do not carry one
    pub default_ttl: Duration,
    /// Version served when a request does not name one
    pub content_version: u32,
}

impl AppState {
    /// Wires the state around a store.
    ///
    /// Returns the request queue and the receiver the regeneration task
    /// consumes.
    pub fn from_store(
        store: SharedStore,
        clock: SharedClock,
        config: &Config,
    ) -> (
        Self,
        RegenerationQueue,
        mpsc::Receiver<RegenerationRequest>,
    ) {
        let stats = Arc::new(CacheStats::new());
        let (queue, requests) = RegenerationQueue::channel(config.queue_capacity);
        let resolver = ContentResolver::new(
            store.clone(),
            stats.clone(),
            queue.clone(),
            TemplateGenerator::new(config.content_version),
        );
        let state = Self {
            store,
            stats,
            resolver,
            clock,
            default_ttl: config.ttl(),
            content_version: config.content_version,
        };
        (state, queue, requests)
    }
}

/// Handler for GET /content/:page_key/:locale
///
/// Returns the raw record at the highest version not above `?version`.
pub async fn get_content_handler(
    State(state): State<AppState>,
    Path((page_key, locale)): Path<(String, String)>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<ContentCacheRecord>> {
    let key = ContentKey::new(page_key, locale)?;
    let version = query.version.unwrap_or(state.content_version);

    state
        .store
        .get(&key, version)
        .await?
        .map(Json)
        .ok_or_else(|| ContentCacheError::NotFound(format!("{} at version {}", key, version)))
}

/// Handler for PUT /content
///
/// Stores generated content with optional TTL.
pub async fn put_content_handler(
    State(state): State<AppState>,
    Json(req): Json<PutContentRequest>,
) -> Result<Json<ContentCacheRecord>> {
    let key = req.key()?;
    let ttl = req.ttl.map(Duration::from_secs).unwrap_or(state.default_ttl);

    let record = state.store.put(&key, req.version, req.payload, ttl).await?;
    Ok(Json(record))
}

/// Handler for POST /content/:page_key/:locale/:version/stale
pub async fn mark_stale_handler(
    State(state): State<AppState>,
    Path((page_key, locale, version)): Path<(String, String, u32)>,
) -> Result<Json<MarkStaleResponse>> {
    let key = ContentKey::new(page_key, locale)?;

    if !state.store.mark_stale(&key, version).await? {
        return Err(ContentCacheError::NotFound(format!(
            "{} at version {}",
            key, version
        )));
    }
    Ok(Json(MarkStaleResponse::new(&key, version)))
}

/// Handler for POST /content/:page_key/:locale/claim
///
/// Losing the claim is a normal `200` answer with `claimed: false`.
pub async fn claim_handler(
    State(state): State<AppState>,
    Path((page_key, locale)): Path<(String, String)>,
) -> Result<Json<ClaimResponse>> {
    let key = ContentKey::new(page_key, locale)?;

    let outcome = state.store.claim_for_regeneration(&key).await?;
    state.stats.record_claim(outcome.is_won());

    Ok(Json(match outcome {
        ClaimOutcome::Won(claim) => ClaimResponse {
            claimed: true,
            version: Some(claim.version),
        },
        ClaimOutcome::Lost => ClaimResponse {
            claimed: false,
            version: None,
        },
    }))
}

/// Handler for GET /stale
pub async fn list_stale_handler(
    State(state): State<AppState>,
    Query(params): Query<StaleListParams>,
) -> Result<Json<StaleListResponse>> {
    let query = StaleQuery {
        cutoff: params.cutoff.unwrap_or_else(|| state.clock.now()),
        limit: params.limit.unwrap_or(DEFAULT_STALE_LIMIT),
        after: params
            .cursor
            .as_deref()
            .map(StaleCursor::decode)
            .transpose()?,
    };

    let page = state.store.list_stale(query).await?;
    Ok(Json(StaleListResponse {
        entries: page.entries,
        next_cursor: page.next.map(|cursor| cursor.encode()),
    }))
}

/// Handler for GET /render/:page_key/:locale
///
/// Resolves copy the way a page render does. Only a malformed key is an error.
pub async fn render_handler(
    State(state): State<AppState>,
    Path((page_key, locale)): Path<(String, String)>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<RenderResponse>> {
    let key = ContentKey::new(page_key, locale)?;
    let version = query.version.unwrap_or(state.content_version);

    let fallback = state.resolver.default_copy(&key);
    let content = state.resolver.resolve(&key, version, fallback).await;

    Ok(Json(RenderResponse {
        page_key: key.page_key,
        locale: key.locale,
        content,
    }))
}

/// Handler for POST /gc
///
/// Deletes superseded versions.
pub async fn gc_handler(State(state): State<AppState>) -> Result<Json<PurgeResponse>> {
    let removed = state.store.purge_superseded().await?;
    Ok(Json(PurgeResponse { removed }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let total_records = state.store.len().await?;
    Ok(Json(StatsResponse::new(
        state.stats.snapshot(),
        total_records,
    )))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
