use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use super::Database;
use crate::models::{ManagedChannel, SyncStatus};

fn parse_optional_instant(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn channel_from_row(row: &sqlx::sqlite::SqliteRow) -> ManagedChannel {
    ManagedChannel {
        id: row.get("id"),
        event_group_id: row.get("event_group_id"),
        dispatcharr_channel_id: row.get("dispatcharr_channel_id"),
        dispatcharr_uuid: row.get("dispatcharr_uuid"),
        dispatcharr_stream_id: row.get("dispatcharr_stream_id"),
        channel_number: row.get("channel_number"),
        channel_name: row.get("channel_name"),
        espn_event_id: row.get("espn_event_id"),
        event_date: row
            .get::<Option<String>, _>("event_date")
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        scheduled_delete_at: parse_optional_instant(row.get("scheduled_delete_at")),
        logo_id: row.get("logo_id"),
        sync_status: SyncStatus::parse(&row.get::<String, _>("sync_status")),
        deleted_at: parse_optional_instant(row.get("deleted_at")),
    }
}

/// Fields for inserting a new managed channel row.
pub struct NewManagedChannel<'a> {
    pub event_group_id: i64,
    pub dispatcharr_channel_id: i64,
    pub dispatcharr_uuid: Option<&'a str>,
    pub dispatcharr_stream_id: i64,
    pub channel_number: i64,
    pub channel_name: &'a str,
    pub espn_event_id: &'a str,
    pub event_date: Option<NaiveDate>,
    pub scheduled_delete_at: Option<DateTime<Utc>>,
    pub logo_id: Option<i64>,
}

impl Database {
    pub async fn insert_managed_channel(&self, new: NewManagedChannel<'_>) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO managed_channels
             (event_group_id, dispatcharr_channel_id, dispatcharr_uuid, dispatcharr_stream_id,
              channel_number, channel_name, espn_event_id, event_date, scheduled_delete_at, logo_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.event_group_id)
        .bind(new.dispatcharr_channel_id)
        .bind(new.dispatcharr_uuid)
        .bind(new.dispatcharr_stream_id)
        .bind(new.channel_number)
        .bind(new.channel_name)
        .bind(new.espn_event_id)
        .bind(new.event_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(new.scheduled_delete_at.map(|dt| dt.to_rfc3339()))
        .bind(new.logo_id)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_managed_channel(&self, id: i64) -> Result<Option<ManagedChannel>> {
        let row = sqlx::query("SELECT * FROM managed_channels WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().map(channel_from_row))
    }

    /// Find the undeleted channel for an event within a group.
    pub async fn get_managed_channel_by_event(
        &self,
        espn_event_id: &str,
        event_group_id: i64,
    ) -> Result<Option<ManagedChannel>> {
        let row = sqlx::query(
            "SELECT * FROM managed_channels
             WHERE espn_event_id = ? AND event_group_id = ? AND deleted_at IS NULL
             ORDER BY id LIMIT 1",
        )
        .bind(espn_event_id)
        .bind(event_group_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.as_ref().map(channel_from_row))
    }

    /// Undeleted channels for a group.
    pub async fn list_managed_channels_for_group(
        &self,
        event_group_id: i64,
    ) -> Result<Vec<ManagedChannel>> {
        let rows = sqlx::query(
            "SELECT * FROM managed_channels
             WHERE event_group_id = ? AND deleted_at IS NULL ORDER BY channel_number",
        )
        .bind(event_group_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(channel_from_row).collect())
    }

    /// All undeleted channels, optionally limited to specific groups.
    pub async fn list_managed_channels(
        &self,
        group_ids: Option<&[i64]>,
    ) -> Result<Vec<ManagedChannel>> {
        let rows = match group_ids {
            Some(ids) if !ids.is_empty() => {
                let placeholders = vec!["?"; ids.len()].join(",");
                let query = format!(
                    "SELECT * FROM managed_channels
                     WHERE deleted_at IS NULL AND event_group_id IN ({placeholders})
                     ORDER BY id"
                );
                let mut q = sqlx::query(&query);
                for id in ids {
                    q = q.bind(id);
                }
                q.fetch_all(self.pool()).await?
            }
            _ => {
                sqlx::query("SELECT * FROM managed_channels WHERE deleted_at IS NULL ORDER BY id")
                    .fetch_all(self.pool())
                    .await?
            }
        };
        Ok(rows.iter().map(channel_from_row).collect())
    }

    /// Channels past their scheduled deletion time.
    pub async fn list_channels_pending_deletion(&self) -> Result<Vec<ManagedChannel>> {
        let rows = sqlx::query(
            "SELECT * FROM managed_channels
             WHERE deleted_at IS NULL
               AND scheduled_delete_at IS NOT NULL
               AND scheduled_delete_at <= ?
             ORDER BY scheduled_delete_at",
        )
        .bind(Utc::now().to_rfc3339())
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(channel_from_row).collect())
    }

    /// Allocate the next channel number for a group. Numbers are strictly
    /// monotonic from `channel_start` and never reuse a number held by an
    /// undeleted channel.
    pub async fn next_channel_number(&self, event_group_id: i64, channel_start: i64) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(channel_number) FROM managed_channels
             WHERE event_group_id = ? AND deleted_at IS NULL",
        )
        .bind(event_group_id)
        .fetch_one(self.pool())
        .await?;

        Ok(match max {
            Some(n) if n >= channel_start => n + 1,
            _ => channel_start,
        })
    }

    pub async fn update_scheduled_delete_at(
        &self,
        id: i64,
        scheduled_delete_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE managed_channels SET scheduled_delete_at = ? WHERE id = ?")
            .bind(scheduled_delete_at.map(|dt| dt.to_rfc3339()))
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_dispatcharr_uuid(&self, id: i64, uuid: &str) -> Result<()> {
        sqlx::query("UPDATE managed_channels SET dispatcharr_uuid = ? WHERE id = ?")
            .bind(uuid)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_sync_status(
        &self,
        id: i64,
        status: SyncStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE managed_channels SET sync_status = ?, sync_detail = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(detail)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Soft-delete: the row survives for history, identity stays reserved
    /// against channel-number reuse until the row is purged.
    pub async fn mark_managed_channel_deleted(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE managed_channels SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Count undeleted channels referencing a logo (cleanup guard).
    pub async fn count_channels_with_logo(&self, logo_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM managed_channels WHERE logo_id = ? AND deleted_at IS NULL",
        )
        .bind(logo_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// Duplicate detection: undeleted rows sharing (espn_event_id, group).
    pub async fn list_duplicate_events(
        &self,
        group_ids: Option<&[i64]>,
    ) -> Result<Vec<(String, i64, i64)>> {
        let base = "SELECT espn_event_id, event_group_id, COUNT(*) as channel_count
             FROM managed_channels
             WHERE deleted_at IS NULL";
        let rows = match group_ids {
            Some(ids) if !ids.is_empty() => {
                let placeholders = vec!["?"; ids.len()].join(",");
                let query = format!(
                    "{base} AND event_group_id IN ({placeholders})
                     GROUP BY espn_event_id, event_group_id HAVING channel_count > 1"
                );
                let mut q = sqlx::query(&query);
                for id in ids {
                    q = q.bind(id);
                }
                q.fetch_all(self.pool()).await?
            }
            _ => {
                let query = format!(
                    "{base} GROUP BY espn_event_id, event_group_id HAVING channel_count > 1"
                );
                sqlx::query(&query).fetch_all(self.pool()).await?
            }
        };

        Ok(rows
            .iter()
            .map(|r| {
                (
                    r.get::<String, _>("espn_event_id"),
                    r.get::<i64, _>("event_group_id"),
                    r.get::<i64, _>("channel_count"),
                )
            })
            .collect())
    }
}
