use anyhow::Result;
use sqlx::Row;

use super::Database;
use crate::models::{CreateTiming, DeleteTiming, EventGroup};

fn group_from_row(row: &sqlx::sqlite::SqliteRow) -> EventGroup {
    let exception_keywords: Vec<String> = row
        .get::<Option<String>, _>("exception_keywords")
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    // Absent per-group timings fall back to the global settings at use sites
    let create_timing = row
        .get::<Option<String>, _>("channel_create_timing")
        .filter(|s| !s.is_empty())
        .map(|s| CreateTiming::parse(&s));
    let delete_timing = row
        .get::<Option<String>, _>("channel_delete_timing")
        .filter(|s| !s.is_empty())
        .map(|s| DeleteTiming::parse(&s));

    EventGroup {
        id: row.get("id"),
        name: row.get("name"),
        enabled: row.get("enabled"),
        assigned_league: row.get("assigned_league"),
        assigned_sport: row.get("assigned_sport"),
        is_multi_sport: row.get("is_multi_sport"),
        dispatcharr_group_id: row.get("dispatcharr_group_id"),
        channel_group_id: row.get("channel_group_id"),
        channel_start: row.get("channel_start"),
        create_timing,
        delete_timing,
        event_template_id: row.get("event_template_id"),
        exception_keywords,
        duplicate_event_handling: row.get("duplicate_event_handling"),
        create_unmatched_channels: row
            .try_get("create_unmatched_channels")
            .unwrap_or(false),
        unmatched_channel_epg_source_id: row
            .try_get("unmatched_channel_epg_source_id")
            .unwrap_or(None),
    }
}

impl Database {
    pub async fn list_event_groups(&self, enabled_only: bool) -> Result<Vec<EventGroup>> {
        let query = if enabled_only {
            "SELECT * FROM event_groups WHERE enabled = 1 ORDER BY id"
        } else {
            "SELECT * FROM event_groups ORDER BY id"
        };
        let rows = sqlx::query(query).fetch_all(self.pool()).await?;
        Ok(rows.iter().map(group_from_row).collect())
    }

    pub async fn get_event_group(&self, group_id: i64) -> Result<Option<EventGroup>> {
        let row = sqlx::query("SELECT * FROM event_groups WHERE id = ?")
            .bind(group_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().map(group_from_row))
    }
}
