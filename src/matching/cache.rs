//! Fingerprint-based match cache
//!
//! Caches successful stream-to-event matches so repeated generation runs
//! skip fuzzy matching entirely. The fingerprint is a SHA-256 over
//! `group_id || stream_id || stream_name`; only successful matches are
//! cached. On a hit the cached event snapshot is reused verbatim except
//! for the dynamic fields (status, scores, odds), which are re-fetched
//! from the provider's single-event endpoint.
//!
//! Entries carry `last_seen_generation`; the sweeper evicts entries not
//! seen for a configured number of runs. Writes tolerate SQLite lock
//! contention via the shared retry policy.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::{debug, warn};

use super::stream::{DetectionTier, StreamMatchResult};
use crate::database::{with_write_retry, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Event, MatchCacheEntry};
use crate::providers::SportsDataService;

#[derive(Clone)]
pub struct StreamMatchCache {
    db: Database,
}

impl StreamMatchCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fingerprint for a (group, stream id, stream name) triple.
    pub fn fingerprint(group_id: i64, stream_id: &str, stream_name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(group_id.to_le_bytes());
        hasher.update(stream_id.as_bytes());
        hasher.update(stream_name.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn get(
        &self,
        group_id: i64,
        stream_id: &str,
        stream_name: &str,
    ) -> Result<Option<MatchCacheEntry>> {
        let fingerprint = Self::fingerprint(group_id, stream_id, stream_name);
        let row = sqlx::query(
            "SELECT event_id, league, snapshot, last_seen_generation
             FROM stream_match_cache WHERE fingerprint = ?",
        )
        .bind(&fingerprint)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // A snapshot that no longer deserializes is treated as a miss
        let snapshot: Event = match serde_json::from_str(&row.get::<String, _>("snapshot")) {
            Ok(event) => event,
            Err(e) => {
                debug!("Discarding undecodable cache snapshot: {}", e);
                return Ok(None);
            }
        };

        Ok(Some(MatchCacheEntry {
            event_id: row.get("event_id"),
            league: row.get("league"),
            snapshot,
            last_seen_generation: row.get("last_seen_generation"),
        }))
    }

    /// Store a successful match. Failed matches are never cached.
    pub async fn set(
        &self,
        group_id: i64,
        stream_id: &str,
        stream_name: &str,
        event: &Event,
        generation: i64,
    ) -> AppResult<()> {
        let fingerprint = Self::fingerprint(group_id, stream_id, stream_name);
        let snapshot = serde_json::to_string(event)
            .map_err(|e| AppError::internal(format!("snapshot serialization: {e}")))?;

        let pool = self.db.pool().clone();
        with_write_retry(
            || {
                let pool = pool.clone();
                let fingerprint = fingerprint.clone();
                let snapshot = snapshot.clone();
                let event_id = event.id.clone();
                let league = event.league.clone();
                let stream_id = stream_id.to_string();
                let stream_name = stream_name.to_string();
                async move {
                    sqlx::query(
                        "INSERT INTO stream_match_cache
                         (fingerprint, event_group_id, stream_id, stream_name,
                          event_id, league, snapshot, last_seen_generation)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                         ON CONFLICT (fingerprint) DO UPDATE SET
                            event_id = excluded.event_id,
                            league = excluded.league,
                            snapshot = excluded.snapshot,
                            last_seen_generation = excluded.last_seen_generation",
                    )
                    .bind(&fingerprint)
                    .bind(group_id)
                    .bind(&stream_id)
                    .bind(&stream_name)
                    .bind(&event_id)
                    .bind(&league)
                    .bind(&snapshot)
                    .bind(generation)
                    .execute(&pool)
                    .await
                    .map(|_| ())
                }
            },
            "match cache set",
        )
        .await
        .map_err(|e| AppError::cache_contention(e.to_string()))
    }

    /// Stamp an entry with the current generation.
    pub async fn touch(
        &self,
        group_id: i64,
        stream_id: &str,
        stream_name: &str,
        generation: i64,
    ) -> AppResult<()> {
        let fingerprint = Self::fingerprint(group_id, stream_id, stream_name);
        let pool = self.db.pool().clone();
        with_write_retry(
            || {
                let pool = pool.clone();
                let fingerprint = fingerprint.clone();
                async move {
                    sqlx::query(
                        "UPDATE stream_match_cache SET last_seen_generation = ? WHERE fingerprint = ?",
                    )
                    .bind(generation)
                    .bind(&fingerprint)
                    .execute(&pool)
                    .await
                    .map(|_| ())
                }
            },
            "match cache touch",
        )
        .await
        .map_err(|e| AppError::cache_contention(e.to_string()))
    }

    /// Evict entries not seen within the last `max_age_generations` runs.
    pub async fn evict_stale(
        &self,
        current_generation: i64,
        max_age_generations: i64,
    ) -> Result<u64> {
        let cutoff = current_generation - max_age_generations;
        let result = sqlx::query("DELETE FROM stream_match_cache WHERE last_seen_generation < ?")
            .bind(cutoff)
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() > 0 {
            debug!("Evicted {} stale match cache entries", result.rows_affected());
        }
        Ok(result.rows_affected())
    }

    /// Cache-tier lookup: on a hit, refresh the snapshot's dynamic fields,
    /// stamp the entry, and return a complete match result. Cache-read
    /// misses are silent and equivalent to "no entry".
    pub async fn lookup(
        &self,
        service: &SportsDataService,
        group_id: i64,
        stream_id: &str,
        stream_name: &str,
        generation: i64,
    ) -> AppResult<Option<StreamMatchResult>> {
        let entry = match self.get(group_id, stream_id, stream_name).await {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Cache read failed (treated as miss): {}", e);
                None
            }
        };

        let Some(entry) = entry else {
            return Ok(None);
        };

        let event = refresh_dynamic_fields(service, entry.snapshot, &entry.league).await;

        if let Err(e) = self.touch(group_id, stream_id, stream_name, generation).await {
            warn!("Failed to touch cache entry: {}", e);
        }

        Ok(Some(StreamMatchResult {
            stream_id: stream_id.to_string(),
            stream_name: stream_name.to_string(),
            event: Some(event),
            league: entry.league,
            matched: true,
            match_score: 100.0,
            exception_keyword: None,
            detection_tier: Some(DetectionTier::Cache),
            from_cache: true,
        }))
    }

    /// Cache a successful match result.
    pub async fn store(&self, group_id: i64, result: &StreamMatchResult, generation: i64) {
        let Some(event) = &result.event else {
            return;
        };
        if let Err(e) = self
            .set(group_id, &result.stream_id, &result.stream_name, event, generation)
            .await
        {
            warn!("Failed to cache match for '{}': {}", result.stream_name, e);
        }
    }
}

/// Refresh only the dynamic fields of a cached event snapshot: status,
/// scores, and odds change between runs; everything else is reused
/// verbatim. A failed re-fetch leaves the snapshot untouched.
pub async fn refresh_dynamic_fields(
    service: &SportsDataService,
    mut snapshot: Event,
    league: &str,
) -> Event {
    match service.get_event(&snapshot.id, league).await {
        Ok(Some(fresh)) => {
            snapshot.status = fresh.status;
            snapshot.home_score = fresh.home_score;
            snapshot.away_score = fresh.away_score;
            if fresh.odds.is_some() {
                snapshot.odds = fresh.odds;
            }
            snapshot
        }
        Ok(None) => snapshot,
        Err(e) => {
            debug!("Dynamic refresh failed for event {}: {}", snapshot.id, e);
            snapshot
        }
    }
}
