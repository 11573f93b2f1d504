use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub dispatcharr: DispatcharrConfig,
    pub epg: EpgConfig,
    pub storage: StorageConfig,
    pub display: Option<DisplayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcharrConfig {
    pub enabled: bool,
    pub url: String,
    pub username: String,
    pub password: String,
    /// Teamarr's EPG source id in Dispatcharr, used for set-epg injection
    pub epg_data_id: Option<i64>,
    /// Skip upstream M3U refresh if the account updated within this window
    pub refresh_skip_if_recent_minutes: i64,
    /// Per-batch refresh deadline in seconds
    pub refresh_timeout_secs: u64,
    /// Seconds between refresh status polls
    pub refresh_poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgConfig {
    /// How far ahead to fetch team schedules (for .next variables)
    pub schedule_days_ahead: i64,
    /// How many days of programmes to include in XMLTV output
    pub output_days_ahead: i64,
    pub pregame_minutes: i64,
    pub filler_enabled: bool,
    pub default_duration_hours: f64,
    /// Per-sport game durations in hours
    pub duration_football: f64,
    pub duration_basketball: f64,
    pub duration_hockey: f64,
    pub duration_baseball: f64,
    pub duration_soccer: f64,
    pub duration_mma: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding teamarr.xml and the intermediate fragments
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub timezone: String,
    pub use_24h_time: bool,
    pub show_timezone: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./teamarr.db".to_string(),
                max_connections: Some(10),
            },
            dispatcharr: DispatcharrConfig {
                enabled: false,
                url: "http://localhost:9191".to_string(),
                username: String::new(),
                password: String::new(),
                epg_data_id: None,
                refresh_skip_if_recent_minutes: 60,
                refresh_timeout_secs: 120,
                refresh_poll_interval_secs: 2,
            },
            epg: EpgConfig {
                schedule_days_ahead: 30,
                output_days_ahead: 14,
                pregame_minutes: 30,
                filler_enabled: true,
                default_duration_hours: 3.0,
                duration_football: 3.5,
                duration_basketball: 2.5,
                duration_hockey: 3.0,
                duration_baseball: 3.5,
                duration_soccer: 2.0,
                duration_mma: 5.0,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
            },
            display: Some(DisplayConfig {
                timezone: "America/New_York".to_string(),
                use_24h_time: false,
                show_timezone: true,
            }),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all(&default_config.storage.data_dir)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }

    /// Per-sport duration lookup with the global default as fallback.
    pub fn sport_duration_hours(&self, sport: &str) -> f64 {
        match sport.to_ascii_lowercase().as_str() {
            "football" => self.epg.duration_football,
            "basketball" => self.epg.duration_basketball,
            "hockey" => self.epg.duration_hockey,
            "baseball" => self.epg.duration_baseball,
            "soccer" => self.epg.duration_soccer,
            "mma" => self.epg.duration_mma,
            _ => self.epg.default_duration_hours,
        }
    }
}
