use anyhow::Result;
use sqlx::Row;

use super::Database;
use crate::errors::AppError;
use crate::models::{CreateTiming, DeleteTiming};

/// User-facing generation settings stored in the singleton settings row.
#[derive(Debug, Clone)]
pub struct Settings {
    pub schema_version: i64,
    pub default_timezone: String,
    pub use_24h_time: bool,
    pub show_timezone: bool,
    pub epg_output_path: Option<String>,
    pub channel_create_timing: CreateTiming,
    pub channel_delete_timing: DeleteTiming,
    pub auto_fix_enabled: bool,
    pub auto_fix_orphan_teamarr: bool,
    pub auto_fix_orphan_dispatcharr: bool,
    pub auto_fix_drift: bool,
    pub cache_eviction_generations: i64,
    pub current_generation: i64,
}

impl Database {
    /// Load the settings row. A missing row is a fatal configuration
    /// error that aborts the run.
    pub async fn get_settings(&self) -> Result<Settings, AppError> {
        let row = sqlx::query("SELECT * FROM settings WHERE id = 1")
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| AppError::fatal_config("settings row missing"))?;

        Ok(Settings {
            schema_version: row.get("schema_version"),
            default_timezone: row.get("default_timezone"),
            use_24h_time: row.get::<String, _>("time_format") == "24h",
            show_timezone: row.get("show_timezone"),
            epg_output_path: row.get("epg_output_path"),
            channel_create_timing: CreateTiming::parse(&row.get::<String, _>("channel_create_timing")),
            channel_delete_timing: DeleteTiming::parse(&row.get::<String, _>("channel_delete_timing")),
            auto_fix_enabled: row.get("auto_fix_enabled"),
            auto_fix_orphan_teamarr: row.get("auto_fix_orphan_teamarr"),
            auto_fix_orphan_dispatcharr: row.get("auto_fix_orphan_dispatcharr"),
            auto_fix_drift: row.get("auto_fix_drift"),
            cache_eviction_generations: row.get("cache_eviction_generations"),
            current_generation: row.get("current_generation"),
        })
    }

    /// Bump and return the generation counter stamped onto cache entries.
    pub async fn next_generation(&self) -> Result<i64> {
        let mut transaction = self.pool().begin().await?;
        sqlx::query("UPDATE settings SET current_generation = current_generation + 1 WHERE id = 1")
            .execute(&mut *transaction)
            .await?;
        let generation: i64 =
            sqlx::query_scalar("SELECT current_generation FROM settings WHERE id = 1")
                .fetch_one(&mut *transaction)
                .await?;
        transaction.commit().await?;
        Ok(generation)
    }
}
