use anyhow::Result;
use sqlx::Row;

use super::Database;
use crate::models::TeamChannelConfig;

impl Database {
    /// Load active team channels for team-based EPG generation.
    pub async fn list_active_teams(&self) -> Result<Vec<TeamChannelConfig>> {
        let rows = sqlx::query(
            "SELECT team_id, provider, league, team_name, team_abbrev,
             channel_id, logo_url, sport, template_id
             FROM teams WHERE active = 1 ORDER BY team_name",
        )
        .fetch_all(self.pool())
        .await?;

        let mut configs = Vec::new();
        for row in rows {
            let team_id: String = row.get("team_id");
            let channel_id: Option<String> = row.get("channel_id");
            configs.push(TeamChannelConfig {
                channel_id: channel_id.unwrap_or_else(|| format!("teamarr-team-{}", team_id)),
                team_id,
                provider: row.get("provider"),
                league: row.get("league"),
                team_name: row.get("team_name"),
                team_abbrev: row.get("team_abbrev"),
                logo_url: row.get("logo_url"),
                sport: row.get("sport"),
                template_id: row.get("template_id"),
            });
        }
        Ok(configs)
    }

    /// Cached multi-league lookup for a team (soccer multi-competition).
    /// Entries older than the weekly refresh window are treated as absent.
    pub async fn get_team_leagues(&self, provider: &str, team_id: &str) -> Result<Vec<String>> {
        let row = sqlx::query(
            "SELECT leagues FROM team_league_cache
             WHERE provider = ? AND team_id = ?
               AND refreshed_at > datetime('now', '-7 days')",
        )
        .bind(provider)
        .bind(team_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row
            .and_then(|r| serde_json::from_str(&r.get::<String, _>("leagues")).ok())
            .unwrap_or_default())
    }

    pub async fn store_team_leagues(
        &self,
        provider: &str,
        team_id: &str,
        leagues: &[String],
    ) -> Result<()> {
        let json = serde_json::to_string(leagues)?;
        sqlx::query(
            "INSERT INTO team_league_cache (provider, team_id, leagues, refreshed_at)
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT (provider, team_id)
             DO UPDATE SET leagues = excluded.leagues, refreshed_at = CURRENT_TIMESTAMP",
        )
        .bind(provider)
        .bind(team_id)
        .bind(json)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
