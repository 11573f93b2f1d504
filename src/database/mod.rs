use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::DatabaseConfig;

pub mod event_groups;
pub mod history;
pub mod managed_channels;
pub mod settings;
pub mod teams;
pub mod templates;
pub mod update_tracker;

/// SQLite busy timeout: wait up to 30 seconds for a lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry settings for write operations under lock contention.
const WRITE_MAX_ATTEMPTS: u32 = 3;
const WRITE_BASE_DELAY_MS: u64 = 100;

/// Embedded schema migrations, applied in order inside transactions.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema.sql",
    include_str!("migrations/001_initial_schema.sql"),
)];

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(10))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Apply embedded migrations, then incremental schema checkpoints
    /// gated by `settings.schema_version`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, content) in MIGRATIONS {
            let version: i64 = name
                .split('_')
                .next()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM _migrations WHERE version = ?",
            )
            .bind(version)
            .fetch_one(&self.pool)
            .await?;

            if existing > 0 {
                continue;
            }

            let mut transaction = self.pool.begin().await?;
            match sqlx::query(content).execute(&mut *transaction).await {
                Ok(_) => {
                    sqlx::query("INSERT INTO _migrations (version, description) VALUES (?, ?)")
                        .bind(version)
                        .bind(name)
                        .execute(&mut *transaction)
                        .await?;
                    transaction.commit().await?;
                    info!("Applied migration: {}", name);
                }
                Err(e) => {
                    transaction.rollback().await?;
                    return Err(anyhow::anyhow!("Migration {} failed: {}", name, e));
                }
            }
        }

        self.apply_checkpoints().await?;
        Ok(())
    }

    /// Incremental checkpoints for columns added after the initial schema.
    /// v47 adds unmatched-stream handling columns to event_groups.
    async fn apply_checkpoints(&self) -> Result<()> {
        let version: i64 =
            sqlx::query_scalar("SELECT schema_version FROM settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?
                .unwrap_or(0);

        if version < 47 {
            info!("Applying checkpoint v47 (unmatched stream handling)");
            let columns = sqlx::query("PRAGMA table_info(event_groups)")
                .fetch_all(&self.pool)
                .await?;
            let names: Vec<String> = columns.iter().map(|r| r.get::<String, _>("name")).collect();

            let mut transaction = self.pool.begin().await?;
            if !names.iter().any(|n| n == "create_unmatched_channels") {
                sqlx::query(
                    "ALTER TABLE event_groups ADD COLUMN create_unmatched_channels BOOLEAN NOT NULL DEFAULT 0",
                )
                .execute(&mut *transaction)
                .await?;
            }
            if !names.iter().any(|n| n == "unmatched_channel_epg_source_id") {
                sqlx::query(
                    "ALTER TABLE event_groups ADD COLUMN unmatched_channel_epg_source_id INTEGER",
                )
                .execute(&mut *transaction)
                .await?;
            }
            sqlx::query("UPDATE settings SET schema_version = 47 WHERE id = 1")
                .execute(&mut *transaction)
                .await?;
            transaction.commit().await?;
        }

        Ok(())
    }
}

/// True when an sqlx error is SQLite lock contention worth retrying.
pub fn is_busy_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code();
            code.as_deref() == Some("5")
                || code.as_deref() == Some("SQLITE_BUSY")
                || db_err.message().to_lowercase().contains("locked")
                || db_err.message().to_lowercase().contains("busy")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// Execute a write operation with exponential backoff on SQLite lock
/// contention: 100ms base delay, doubling, up to 3 attempts, with jitter.
pub async fn with_write_retry<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let mut last_error = None;

    for attempt in 1..=WRITE_MAX_ATTEMPTS {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_busy_error(&err) {
                    return Err(err);
                }
                last_error = Some(err);
                if attempt < WRITE_MAX_ATTEMPTS {
                    let base = WRITE_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                    let jitter = fastrand::u64(0..=(base / 4).max(10));
                    let delay = Duration::from_millis(base + jitter);
                    warn!(
                        "Write '{}' hit lock contention on attempt {}/{}, retrying in {:?}",
                        operation_name, attempt, WRITE_MAX_ATTEMPTS, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.expect("retry loop recorded an error"))
}
