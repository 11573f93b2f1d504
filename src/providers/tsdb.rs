//! TheSportsDB provider
//!
//! Used for leagues ESPN does not carry. The free-tier API returns
//! flat string-keyed objects; everything is normalized into canonical
//! events at ingest.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::SportsProvider;
use crate::errors::{AppError, AppResult};
use crate::models::{Event, EventState, EventStatus, Team, TeamStats, Venue};
use crate::utils::DateTimeParser;

const API_BASE: &str = "https://www.thesportsdb.com/api/v1/json";

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Option<Vec<WireEvent>>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "idEvent")]
    id: String,
    #[serde(rename = "strEvent", default)]
    name: Option<String>,
    #[serde(rename = "strEventAlternate", default)]
    short_name: Option<String>,
    #[serde(rename = "strTimestamp", default)]
    timestamp: Option<String>,
    #[serde(rename = "dateEvent", default)]
    date: Option<String>,
    #[serde(rename = "strTime", default)]
    time: Option<String>,
    #[serde(rename = "idHomeTeam", default)]
    home_team_id: Option<String>,
    #[serde(rename = "strHomeTeam", default)]
    home_team_name: Option<String>,
    #[serde(rename = "idAwayTeam", default)]
    away_team_id: Option<String>,
    #[serde(rename = "strAwayTeam", default)]
    away_team_name: Option<String>,
    #[serde(rename = "intHomeScore", default)]
    home_score: Option<String>,
    #[serde(rename = "intAwayScore", default)]
    away_score: Option<String>,
    #[serde(rename = "strStatus", default)]
    status: Option<String>,
    #[serde(rename = "strVenue", default)]
    venue: Option<String>,
    #[serde(rename = "strLeague", default)]
    league_name: Option<String>,
    #[serde(rename = "strSport", default)]
    sport: Option<String>,
}

fn canonical_state(status: Option<&str>) -> EventState {
    let status = status.unwrap_or("").to_ascii_lowercase();
    if status.contains("finished") || status == "ft" || status == "match finished" {
        EventState::Final
    } else if status.contains("progress") || status.contains("live") || status == "1h" || status == "2h" {
        EventState::Live
    } else if status.contains("postponed") {
        EventState::Postponed
    } else if status.contains("cancel") {
        EventState::Cancelled
    } else {
        EventState::Scheduled
    }
}

fn event_start_time(wire: &WireEvent) -> Option<DateTime<Utc>> {
    if let Some(ts) = wire.timestamp.as_deref() {
        if let Ok(dt) = DateTimeParser::parse_flexible(ts) {
            return Some(dt);
        }
    }
    let date = wire.date.as_deref()?;
    let time = wire.time.as_deref().unwrap_or("00:00:00");
    DateTimeParser::parse_flexible(&format!("{date} {time}")).ok()
}

fn wire_team(id: Option<&str>, name: Option<&str>, league: &str, sport: &str) -> Team {
    let name = name.unwrap_or_default().to_string();
    Team {
        id: id.unwrap_or_default().to_string(),
        provider: "thesportsdb".to_string(),
        short_name: name.clone(),
        abbreviation: String::new(),
        name,
        league: league.to_string(),
        sport: sport.to_string(),
        logo_url: None,
        color: None,
    }
}

fn normalize_event(wire: &WireEvent, league: &str) -> Option<Event> {
    let start_time = event_start_time(wire)?;
    let sport = wire
        .sport
        .as_deref()
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| "soccer".to_string());

    let home_team = wire_team(
        wire.home_team_id.as_deref(),
        wire.home_team_name.as_deref(),
        league,
        &sport,
    );
    let away_team = wire_team(
        wire.away_team_id.as_deref(),
        wire.away_team_name.as_deref(),
        league,
        &sport,
    );

    let name = wire.name.clone().unwrap_or_else(|| {
        format!("{} vs {}", home_team.name, away_team.name)
    });

    Some(Event {
        id: wire.id.clone(),
        provider: "thesportsdb".to_string(),
        short_name: wire.short_name.clone().unwrap_or_else(|| name.clone()),
        name,
        start_time,
        home_score: wire.home_score.as_deref().and_then(|s| s.parse().ok()),
        away_score: wire.away_score.as_deref().and_then(|s| s.parse().ok()),
        home_team,
        away_team,
        status: EventStatus {
            state: canonical_state(wire.status.as_deref()),
            detail: wire.status.clone(),
            period: None,
            clock: None,
        },
        league: league.to_string(),
        sport,
        venue: wire.venue.as_ref().map(|name| Venue {
            name: name.clone(),
            city: None,
            state: None,
            country: None,
        }),
        broadcasts: Vec::new(),
        season_year: None,
        season_type: None,
        odds: None,
        main_card_start: None,
    })
}

pub struct TheSportsDbProvider {
    client: Client,
    base_url: String,
    api_key: String,
    /// TSDB league id per league code, configured at construction.
    league_ids: std::collections::HashMap<String, String>,
}

impl TheSportsDbProvider {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(API_BASE, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("teamarr/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            league_ids: std::collections::HashMap::new(),
        }
    }

    pub fn register_league_id(&mut self, league: &str, tsdb_id: &str) {
        self.league_ids.insert(league.to_string(), tsdb_id.to_string());
    }

    async fn fetch_events(&self, path: &str) -> AppResult<Vec<WireEvent>> {
        let url = format!("{}/{}/{}", self.base_url, self.api_key, path);
        debug!("TheSportsDB fetch: {}", path);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::upstream(
                "thesportsdb",
                format!("HTTP {} for {}", response.status(), path),
            ));
        }
        let body: EventsResponse = response
            .json()
            .await
            .map_err(|e| AppError::parse("thesportsdb payload", e.to_string()))?;
        Ok(body.events.unwrap_or_default())
    }
}

#[async_trait]
impl SportsProvider for TheSportsDbProvider {
    async fn get_events(&self, league: &str, date: NaiveDate) -> AppResult<Vec<Event>> {
        let league_param = self
            .league_ids
            .get(league)
            .cloned()
            .unwrap_or_else(|| league.to_string());
        let events = self
            .fetch_events(&format!(
                "eventsday.php?d={}&l={}",
                date.format("%Y-%m-%d"),
                league_param
            ))
            .await?;
        Ok(events.iter().filter_map(|e| normalize_event(e, league)).collect())
    }

    async fn get_event(&self, event_id: &str, league: &str) -> AppResult<Option<Event>> {
        let events = self
            .fetch_events(&format!("lookupevent.php?id={event_id}"))
            .await?;
        Ok(events.first().and_then(|e| normalize_event(e, league)))
    }

    async fn get_team_schedule(
        &self,
        team_id: &str,
        league: &str,
        days_ahead: i64,
    ) -> AppResult<Vec<Event>> {
        let events = self
            .fetch_events(&format!("eventsnext.php?id={team_id}"))
            .await?;
        let cutoff = Utc::now() + chrono::Duration::days(days_ahead);
        let mut normalized: Vec<Event> = events
            .iter()
            .filter_map(|e| normalize_event(e, league))
            .filter(|e| e.start_time <= cutoff)
            .collect();
        normalized.sort_by_key(|e| e.start_time);
        Ok(normalized)
    }

    async fn get_team_stats(&self, _team_id: &str, _league: &str) -> AppResult<Option<TeamStats>> {
        // Standings require the premium tier; templates degrade gracefully
        // when stats are absent.
        Ok(None)
    }

    fn provider_name(&self) -> &'static str {
        "thesportsdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_event_from_timestamp() {
        let wire: WireEvent = serde_json::from_value(json!({
            "idEvent": "1032912",
            "strEvent": "Mumbai Indians vs Chennai Super Kings",
            "strTimestamp": "2025-12-14T14:00:00",
            "idHomeTeam": "135580",
            "strHomeTeam": "Mumbai Indians",
            "idAwayTeam": "135581",
            "strAwayTeam": "Chennai Super Kings",
            "intHomeScore": "187",
            "intAwayScore": "185",
            "strStatus": "Match Finished",
            "strVenue": "Wankhede Stadium",
            "strSport": "Cricket"
        }))
        .unwrap();

        let event = normalize_event(&wire, "cricket").unwrap();
        assert_eq!(event.provider, "thesportsdb");
        assert_eq!(event.sport, "cricket");
        assert_eq!(event.status.state, EventState::Final);
        assert_eq!(event.home_score, Some(187));
        assert_eq!(event.venue.as_ref().unwrap().name, "Wankhede Stadium");
    }

    #[test]
    fn test_canonical_state_variants() {
        assert_eq!(canonical_state(Some("Match Finished")), EventState::Final);
        assert_eq!(canonical_state(Some("In Progress")), EventState::Live);
        assert_eq!(canonical_state(Some("Postponed")), EventState::Postponed);
        assert_eq!(canonical_state(Some("Not Started")), EventState::Scheduled);
        assert_eq!(canonical_state(None), EventState::Scheduled);
    }

    #[test]
    fn test_event_without_times_is_skipped() {
        let wire: WireEvent = serde_json::from_value(json!({ "idEvent": "1" })).unwrap();
        assert!(normalize_event(&wire, "cricket").is_none());
    }
}
