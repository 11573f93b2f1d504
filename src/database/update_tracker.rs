use anyhow::Result;
use sqlx::Row;

use super::Database;

impl Database {
    /// Currently stored dev build digest, if any.
    pub async fn get_current_dev_digest(&self) -> Result<Option<String>> {
        let row = sqlx::query("SELECT current_dev_digest FROM update_tracker WHERE id = 1")
            .fetch_optional(self.pool())
            .await?;
        Ok(row.and_then(|r| r.get("current_dev_digest")))
    }

    pub async fn update_dev_digest(&self, digest: &str) -> Result<()> {
        sqlx::query(
            "UPDATE update_tracker
             SET current_dev_digest = ?, last_checked_at = CURRENT_TIMESTAMP
             WHERE id = 1",
        )
        .bind(digest)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn mark_update_notified(&self) -> Result<()> {
        sqlx::query("UPDATE update_tracker SET last_notified_at = CURRENT_TIMESTAMP WHERE id = 1")
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
