use anyhow::Result;
use sqlx::Row;

use super::Database;

/// A change record from the managed-channel audit log.
#[derive(Debug, Clone)]
pub struct ChannelHistoryEntry {
    pub id: i64,
    pub managed_channel_id: i64,
    pub change_type: String,
    pub change_source: Option<String>,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
}

impl Database {
    /// Append a change to the channel history log.
    pub async fn log_channel_history(
        &self,
        managed_channel_id: i64,
        change_type: &str,
        change_source: Option<&str>,
        notes: Option<&str>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO managed_channel_history
             (managed_channel_id, change_type, change_source, notes)
             VALUES (?, ?, ?, ?)",
        )
        .bind(managed_channel_id)
        .bind(change_type)
        .bind(change_source)
        .bind(notes)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_channel_history(
        &self,
        managed_channel_id: i64,
        limit: i64,
    ) -> Result<Vec<ChannelHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM managed_channel_history
             WHERE managed_channel_id = ?
             ORDER BY changed_at DESC, id DESC LIMIT ?",
        )
        .bind(managed_channel_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| ChannelHistoryEntry {
                id: row.get("id"),
                managed_channel_id: row.get("managed_channel_id"),
                change_type: row.get("change_type"),
                change_source: row.get("change_source"),
                field_name: row.get("field_name"),
                old_value: row.get("old_value"),
                new_value: row.get("new_value"),
                notes: row.get("notes"),
            })
            .collect())
    }

    /// Delete history records older than the retention period.
    pub async fn cleanup_old_history(&self, retention_days: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM managed_channel_history
             WHERE changed_at < datetime('now', ? || ' days')",
        )
        .bind(format!("-{retention_days}"))
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
