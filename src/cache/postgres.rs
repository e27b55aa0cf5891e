//! Postgres-backed content store.
//!
//! One `content_cache` table keyed by `(page_key, locale, version)`. Older
//! versions are flagged `superseded` when a newer one is written, which keeps
//! the sweep index limited to current records.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, types::Json, PgPool};

use crate::cache::{
    ClaimOutcome, ClaimToken, ContentCacheRecord, ContentKey, ContentPayload, ContentStore,
    RegenerationPolicy, SharedClock, StaleEntry, StalePage, StaleQuery,
};
use crate::error::{ContentCacheError, Result};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const RECORD_COLUMNS: &str = "page_key, locale, version, payload, generated_at, stale_after, \
    status, claimed_at, failure_count, retry_after";

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    page_key: String,
    locale: String,
    version: i32,
    payload: Json<ContentPayload>,
    generated_at: DateTime<Utc>,
    stale_after: DateTime<Utc>,
    status: String,
    claimed_at: Option<DateTime<Utc>>,
    failure_count: i32,
    retry_after: Option<DateTime<Utc>>,
}

impl TryFrom<RecordRow> for ContentCacheRecord {
    type Error = ContentCacheError;

    fn try_from(row: RecordRow) -> Result<Self> {
        Ok(ContentCacheRecord {
            page_key: row.page_key,
            locale: row.locale,
            version: from_db_version(row.version)?,
            payload: row.payload.0,
            generated_at: row.generated_at,
            stale_after: row.stale_after,
            status: row.status.parse()?,
            claimed_at: row.claimed_at,
            failure_count: u32::try_from(row.failure_count).unwrap_or(0),
            retry_after: row.retry_after,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StaleRow {
    page_key: String,
    locale: String,
    version: i32,
    stale_after: DateTime<Utc>,
}

fn to_db_version(version: u32) -> Result<i32> {
    i32::try_from(version).map_err(|_| {
        ContentCacheError::Validation(format!("version {} exceeds {}", version, i32::MAX))
    })
}

fn from_db_version(version: i32) -> Result<u32> {
    u32::try_from(version)
        .map_err(|_| ContentCacheError::Internal(format!("negative version {} in storage", version)))
}

// == Postgres Store ==
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    policy: RegenerationPolicy,
    clock: SharedClock,
}

impl PostgresStore {
    pub fn new(pool: PgPool, policy: RegenerationPolicy, clock: SharedClock) -> Self {
        Self {
            pool,
            policy,
            clock,
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| ContentCacheError::StorageUnavailable(e.to_string()))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| ContentCacheError::StorageUnavailable(e.to_string()))
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ContentStore for PostgresStore {
    async fn get(
        &self,
        key: &ContentKey,
        current_version: u32,
    ) -> Result<Option<ContentCacheRecord>> {
        let now = self.clock.now();
        let current_version = i32::try_from(current_version).unwrap_or(i32::MAX);

        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM content_cache \
             WHERE page_key = $1 AND locale = $2 AND version <= $3 \
             ORDER BY version DESC LIMIT 1"
        ))
        .bind(&key.page_key)
        .bind(&key.locale)
        .bind(current_version)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ContentCacheRecord::try_from)
            .transpose()
            .map(|record| record.map(|r| r.observed(now, &self.policy)))
    }

    async fn put(
        &self,
        key: &ContentKey,
        version: u32,
        payload: ContentPayload,
        ttl: Duration,
    ) -> Result<ContentCacheRecord> {
        key.validate()?;
        payload.validate()?;
        let db_version = to_db_version(version)?;
        let now = self.clock.now();
        let stale_after = super::stale_deadline(now, ttl)?;

        let mut tx = self.pool.begin().await?;

        // Serialize writers per key so the version check and the superseded
        // flag agree with the row that is written.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
            .bind(&key.page_key)
            .bind(&key.locale)
            .execute(&mut *tx)
            .await?;

        let current: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(version) FROM content_cache WHERE page_key = $1 AND locale = $2",
        )
        .bind(&key.page_key)
        .bind(&key.locale)
        .fetch_one(&mut *tx)
        .await?;
        if let Some(current) = current {
            super::check_version_order(version, from_db_version(current)?)?;
        }

        let row: RecordRow = sqlx::query_as(&format!(
            "INSERT INTO content_cache \
                (page_key, locale, version, payload, generated_at, stale_after, \
                 status, claimed_at, failure_count, retry_after, superseded) \
             VALUES ($1, $2, $3, $4, $5, $6, 'fresh', NULL, 0, NULL, FALSE) \
             ON CONFLICT (page_key, locale, version) DO UPDATE SET \
                payload = EXCLUDED.payload, \
                generated_at = EXCLUDED.generated_at, \
                stale_after = EXCLUDED.stale_after, \
                status = 'fresh', \
                claimed_at = NULL, \
                failure_count = 0, \
                retry_after = NULL \
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(&key.page_key)
        .bind(&key.locale)
        .bind(db_version)
        .bind(Json(&payload))
        .bind(now)
        .bind(stale_after)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE content_cache SET superseded = TRUE \
             WHERE page_key = $1 AND locale = $2 AND version < $3 AND NOT superseded",
        )
        .bind(&key.page_key)
        .bind(&key.locale)
        .bind(db_version)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn mark_stale(&self, key: &ContentKey, version: u32) -> Result<bool> {
        let Ok(db_version) = to_db_version(version) else {
            return Ok(false);
        };
        let now = self.clock.now();

        // A live claim keeps its status and claimed_at; only the deadline moves.
        let result = sqlx::query(
            "UPDATE content_cache SET \
                stale_after = LEAST(stale_after, $4), \
                status = CASE WHEN status = 'regenerating' AND COALESCE(claimed_at > $5, FALSE) \
                    THEN status ELSE 'stale' END, \
                claimed_at = CASE WHEN status = 'regenerating' AND COALESCE(claimed_at > $5, FALSE) \
                    THEN claimed_at ELSE NULL END, \
                retry_after = CASE WHEN status = 'regenerating' AND COALESCE(claimed_at > $5, FALSE) \
                    THEN retry_after ELSE NULL END \
             WHERE page_key = $1 AND locale = $2 AND version = $3",
        )
        .bind(&key.page_key)
        .bind(&key.locale)
        .bind(db_version)
        .bind(now)
        .bind(self.policy.watchdog_cutoff(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_for_regeneration(&self, key: &ContentKey) -> Result<ClaimOutcome> {
        let now = self.clock.now();

        // Single conditional update: concurrent claimers block on the row lock
        // and re-check the predicate against the winner's committed row.
        let version: Option<i32> = sqlx::query_scalar(
            "UPDATE content_cache SET status = 'regenerating', claimed_at = $3 \
             WHERE page_key = $1 AND locale = $2 AND NOT superseded AND ( \
                status = 'stale' \
                OR (status = 'fresh' AND stale_after <= $3) \
                OR (status = 'failed' AND (retry_after IS NULL OR retry_after <= $3)) \
                OR (status = 'regenerating' AND (claimed_at IS NULL OR claimed_at <= $4)) \
             ) \
             RETURNING version",
        )
        .bind(&key.page_key)
        .bind(&key.locale)
        .bind(now)
        .bind(self.policy.watchdog_cutoff(now))
        .fetch_optional(&self.pool)
        .await?;

        match version {
            Some(version) => Ok(ClaimOutcome::Won(ClaimToken {
                version: from_db_version(version)?,
                claimed_at: now,
            })),
            None => Ok(ClaimOutcome::Lost),
        }
    }

    async fn release_claim(&self, key: &ContentKey, claim: ClaimToken) -> Result<bool> {
        let Ok(db_version) = to_db_version(claim.version) else {
            return Ok(false);
        };
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let failures: Option<i32> = sqlx::query_scalar(
            "UPDATE content_cache SET \
                status = 'failed', \
                claimed_at = NULL, \
                failure_count = failure_count + 1 \
             WHERE page_key = $1 AND locale = $2 AND version = $3 \
               AND status = 'regenerating' AND claimed_at = $4 \
             RETURNING failure_count",
        )
        .bind(&key.page_key)
        .bind(&key.locale)
        .bind(db_version)
        .bind(claim.claimed_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(failures) = failures else {
            tx.rollback().await?;
            return Ok(false);
        };
        let retry_after = self
            .policy
            .retry_after(now, u32::try_from(failures).unwrap_or(u32::MAX));

        sqlx::query(
            "UPDATE content_cache SET retry_after = $4 \
             WHERE page_key = $1 AND locale = $2 AND version = $3",
        )
        .bind(&key.page_key)
        .bind(&key.locale)
        .bind(db_version)
        .bind(retry_after)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_stale(&self, query: StaleQuery) -> Result<StalePage> {
        query.validate()?;
        let now = self.clock.now();
        let (after_at, after_page, after_locale) = match query.after {
            Some(cursor) => (
                Some(cursor.stale_after),
                Some(cursor.key.page_key),
                Some(cursor.key.locale),
            ),
            None => (None, None, None),
        };

        let mut rows: Vec<StaleRow> = sqlx::query_as(
            "SELECT page_key, locale, version, stale_after FROM content_cache \
             WHERE NOT superseded AND stale_after <= $1 \
               AND NOT (status = 'regenerating' AND COALESCE(claimed_at > $2, FALSE)) \
               AND NOT (status = 'failed' AND COALESCE(retry_after > $3, FALSE)) \
               AND ($4::timestamptz IS NULL \
                    OR (stale_after, page_key, locale) > ($4::timestamptz, $5::text, $6::text)) \
             ORDER BY stale_after, page_key, locale \
             LIMIT $7",
        )
        .bind(query.cutoff)
        .bind(self.policy.watchdog_cutoff(now))
        .bind(now)
        .bind(after_at)
        .bind(after_page)
        .bind(after_locale)
        .bind(query.limit as i64 + 1)
        .fetch_all(&self.pool)
        .await?;

        let more = rows.len() > query.limit;
        rows.truncate(query.limit);

        let entries = rows
            .into_iter()
            .map(|row| {
                Ok(StaleEntry {
                    page_key: row.page_key,
                    locale: row.locale,
                    version: from_db_version(row.version)?,
                    stale_after: row.stale_after,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let next = if more {
            entries.last().map(StaleEntry::cursor)
        } else {
            None
        };
        Ok(StalePage { entries, next })
    }

    async fn purge_superseded(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM content_cache WHERE superseded")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }
}
