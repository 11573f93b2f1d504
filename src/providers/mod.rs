//! Sports data providers
//!
//! External feeds are normalized into the canonical [`Event`]/[`Team`]
//! shapes at ingest so downstream code is provider-agnostic. The service
//! layer routes by league: US sports and soccer go to ESPN, leagues
//! configured for TheSportsDB go there, cricket uses the hybrid provider.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::AppResult;
use crate::models::{Event, TeamStats};

pub mod cricket;
pub mod espn;
pub mod tsdb;

pub use cricket::CricketHybridProvider;
pub use espn::EspnProvider;
pub use tsdb::TheSportsDbProvider;

/// Capability set every sports data source implements.
#[async_trait]
pub trait SportsProvider: Send + Sync {
    /// All events for a league on a given date.
    async fn get_events(&self, league: &str, date: NaiveDate) -> AppResult<Vec<Event>>;

    /// A single event by id, freshly fetched (used for enrichment).
    async fn get_event(&self, event_id: &str, league: &str) -> AppResult<Option<Event>>;

    /// A team's upcoming schedule.
    async fn get_team_schedule(
        &self,
        team_id: &str,
        league: &str,
        days_ahead: i64,
    ) -> AppResult<Vec<Event>>;

    /// Aggregate team statistics for template variables.
    async fn get_team_stats(&self, team_id: &str, league: &str) -> AppResult<Option<TeamStats>>;

    fn provider_name(&self) -> &'static str;
}

/// A league known to the service: sport, display name, owning provider.
#[derive(Debug, Clone)]
pub struct LeagueInfo {
    pub code: String,
    pub sport: String,
    pub display_name: String,
    pub provider: String,
}

/// Routes league codes to providers and owns the league registry.
pub struct SportsDataService {
    providers: HashMap<String, Arc<dyn SportsProvider>>,
    default_provider: Arc<dyn SportsProvider>,
    leagues: HashMap<String, LeagueInfo>,
}

impl SportsDataService {
    pub fn new(default_provider: Arc<dyn SportsProvider>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider,
            leagues: builtin_leagues(),
        }
    }

    /// Construct the default service: ESPN everywhere, with registry
    /// routing ready for TheSportsDB / cricket overrides.
    pub fn with_defaults() -> Self {
        let espn: Arc<dyn SportsProvider> = Arc::new(EspnProvider::new());
        Self::new(espn)
    }

    /// Register a provider under a name referenced by league entries.
    pub fn register_provider(&mut self, name: &str, provider: Arc<dyn SportsProvider>) {
        self.providers.insert(name.to_string(), provider);
    }

    /// Register or override a league entry.
    pub fn register_league(&mut self, info: LeagueInfo) {
        self.leagues.insert(info.code.clone(), info);
    }

    pub fn provider_for(&self, league: &str) -> Arc<dyn SportsProvider> {
        self.leagues
            .get(&league.to_ascii_lowercase())
            .and_then(|info| self.providers.get(&info.provider))
            .cloned()
            .unwrap_or_else(|| self.default_provider.clone())
    }

    /// Sport for a league code. Unknown dotted codes ("eng.1") are soccer.
    pub fn sport_for_league(&self, league: &str) -> String {
        let league = league.to_ascii_lowercase();
        if let Some(info) = self.leagues.get(&league) {
            return info.sport.clone();
        }
        if league.contains('.') {
            return "soccer".to_string();
        }
        "football".to_string()
    }

    /// Display name for a league code, falling back to the uppercase code.
    pub fn league_display_name(&self, league: &str) -> String {
        self.leagues
            .get(&league.to_ascii_lowercase())
            .map(|info| info.display_name.clone())
            .unwrap_or_else(|| league.to_uppercase())
    }

    pub fn known_leagues(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.leagues.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub async fn get_events(&self, league: &str, date: NaiveDate) -> AppResult<Vec<Event>> {
        self.provider_for(league).get_events(league, date).await
    }

    pub async fn get_event(&self, event_id: &str, league: &str) -> AppResult<Option<Event>> {
        self.provider_for(league).get_event(event_id, league).await
    }

    pub async fn get_team_schedule(
        &self,
        team_id: &str,
        league: &str,
        days_ahead: i64,
    ) -> AppResult<Vec<Event>> {
        self.provider_for(league)
            .get_team_schedule(team_id, league, days_ahead)
            .await
    }

    pub async fn get_team_stats(
        &self,
        team_id: &str,
        league: &str,
    ) -> AppResult<Option<TeamStats>> {
        self.provider_for(league).get_team_stats(team_id, league).await
    }
}

fn builtin_leagues() -> HashMap<String, LeagueInfo> {
    let entries = [
        ("nfl", "football", "NFL"),
        ("college-football", "football", "NCAAF"),
        ("nba", "basketball", "NBA"),
        ("wnba", "basketball", "WNBA"),
        ("mens-college-basketball", "basketball", "NCAAM"),
        ("womens-college-basketball", "basketball", "NCAAW"),
        ("nhl", "hockey", "NHL"),
        ("mlb", "baseball", "MLB"),
        ("ufc", "mma", "UFC"),
        ("eng.1", "soccer", "English Premier League"),
        ("esp.1", "soccer", "Spanish LaLiga"),
        ("ger.1", "soccer", "German Bundesliga"),
        ("ita.1", "soccer", "Italian Serie A"),
        ("fra.1", "soccer", "French Ligue 1"),
        ("usa.1", "soccer", "MLS"),
        ("uefa.champions", "soccer", "UEFA Champions League"),
        ("cricket", "cricket", "Cricket"),
    ];

    entries
        .into_iter()
        .map(|(code, sport, name)| {
            (
                code.to_string(),
                LeagueInfo {
                    code: code.to_string(),
                    sport: sport.to_string(),
                    display_name: name.to_string(),
                    provider: "espn".to_string(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sport_for_league() {
        let service = SportsDataService::with_defaults();
        assert_eq!(service.sport_for_league("nfl"), "football");
        assert_eq!(service.sport_for_league("NHL"), "hockey");
        assert_eq!(service.sport_for_league("ufc"), "mma");
        // Dotted codes not in the registry are soccer competitions
        assert_eq!(service.sport_for_league("aus.1"), "soccer");
    }

    #[test]
    fn test_league_display_name_fallback() {
        let service = SportsDataService::with_defaults();
        assert_eq!(service.league_display_name("eng.1"), "English Premier League");
        assert_eq!(service.league_display_name("xfl"), "XFL");
    }
}
