//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use teamarr::config::DatabaseConfig;
use teamarr::database::Database;
use teamarr::errors::AppResult;
use teamarr::models::{Event, EventState, EventStatus, Team, TeamStats};
use teamarr::providers::{SportsDataService, SportsProvider};

pub fn team(id: &str, name: &str, short: &str, abbrev: &str, league: &str, sport: &str) -> Team {
    Team {
        id: id.to_string(),
        provider: "espn".to_string(),
        name: name.to_string(),
        short_name: short.to_string(),
        abbreviation: abbrev.to_string(),
        league: league.to_string(),
        sport: sport.to_string(),
        logo_url: None,
        color: None,
    }
}

pub fn nfl_event(id: &str, name: &str, home: Team, away: Team) -> Event {
    Event {
        id: id.to_string(),
        provider: "espn".to_string(),
        name: name.to_string(),
        short_name: name.to_string(),
        start_time: Utc.with_ymd_and_hms(2025, 12, 14, 18, 0, 0).unwrap(),
        home_team: home,
        away_team: away,
        status: EventStatus::scheduled(),
        league: "nfl".to_string(),
        sport: "football".to_string(),
        home_score: None,
        away_score: None,
        venue: None,
        broadcasts: Vec::new(),
        season_year: None,
        season_type: None,
        odds: None,
        main_card_start: None,
    }
}

pub fn lions_bears() -> Event {
    nfl_event(
        "401547",
        "Detroit Lions at Chicago Bears",
        team("3", "Chicago Bears", "Bears", "CHI", "nfl", "football"),
        team("8", "Detroit Lions", "Lions", "DET", "nfl", "football"),
    )
}

/// Provider serving a fixed event set, counting fetches so tests can
/// assert the cache tier skipped fuzzy work.
pub struct StaticProvider {
    pub events: HashMap<String, Vec<Event>>,
    pub scoreboard_fetches: AtomicUsize,
}

impl StaticProvider {
    pub fn new(events: HashMap<String, Vec<Event>>) -> Self {
        Self {
            events,
            scoreboard_fetches: AtomicUsize::new(0),
        }
    }

    pub fn single(league: &str, events: Vec<Event>) -> Arc<Self> {
        let mut map = HashMap::new();
        map.insert(league.to_string(), events);
        Arc::new(Self::new(map))
    }
}

#[async_trait]
impl SportsProvider for StaticProvider {
    async fn get_events(&self, league: &str, _date: NaiveDate) -> AppResult<Vec<Event>> {
        self.scoreboard_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.events.get(league).cloned().unwrap_or_default())
    }

    async fn get_event(&self, event_id: &str, league: &str) -> AppResult<Option<Event>> {
        Ok(self
            .events
            .get(league)
            .and_then(|events| events.iter().find(|e| e.id == event_id).cloned()))
    }

    async fn get_team_schedule(
        &self,
        team_id: &str,
        league: &str,
        _days_ahead: i64,
    ) -> AppResult<Vec<Event>> {
        Ok(self
            .events
            .get(league)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.home_team.id == team_id || e.away_team.id == team_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_team_stats(&self, _team_id: &str, _league: &str) -> AppResult<Option<TeamStats>> {
        Ok(Some(TeamStats {
            record: "10-3".to_string(),
            wins: 10,
            losses: 3,
            streak: Some("W3".to_string()),
            ..TeamStats::default()
        }))
    }

    fn provider_name(&self) -> &'static str {
        "static"
    }
}

pub fn service_with(provider: Arc<StaticProvider>) -> SportsDataService {
    SportsDataService::new(provider)
}

/// Fresh in-memory database with migrations applied. A single
/// connection keeps the in-memory store visible across queries.
pub async fn test_database() -> Database {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: Some(1),
    };
    let db = Database::new(&config).await.expect("in-memory database");
    db.migrate().await.expect("migrations apply");
    db
}

pub fn final_event(mut event: Event, home_score: i32, away_score: i32) -> Event {
    event.status = EventStatus {
        state: EventState::Final,
        detail: Some("Final".to_string()),
        period: Some(4),
        clock: None,
    };
    event.home_score = Some(home_score);
    event.away_score = Some(away_score);
    event
}
