//! ESPN provider
//!
//! Normalizes ESPN's site API payloads (scoreboard, event summary, team
//! schedule, team record) into canonical events. Parsing goes through
//! typed serde structs so malformed payloads surface as parse errors
//! instead of silent field misses.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::SportsProvider;
use crate::errors::{AppError, AppResult};
use crate::models::{Event, EventOdds, EventState, EventStatus, Team, TeamStats, Venue};
use crate::utils::DateTimeParser;

const SITE_API_BASE: &str = "https://site.api.espn.com/apis/site/v2/sports";

/// ESPN sport path segment for a league code.
fn sport_path(league: &str) -> &'static str {
    match league {
        "nfl" | "college-football" => "football",
        "nba" | "wnba" | "mens-college-basketball" | "womens-college-basketball" => "basketball",
        "nhl" => "hockey",
        "mlb" | "college-baseball" => "baseball",
        "ufc" => "mma",
        _ => "soccer",
    }
}

/// Canonical sport name for a league code.
fn sport_name(league: &str) -> &'static str {
    match sport_path(league) {
        "football" => "football",
        "basketball" => "basketball",
        "hockey" => "hockey",
        "baseball" => "baseball",
        "mma" => "mma",
        _ => "soccer",
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ScoreboardResponse {
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    header: Option<SummaryHeader>,
}

#[derive(Debug, Deserialize)]
struct SummaryHeader {
    id: String,
    #[serde(default)]
    competitions: Vec<WireCompetition>,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    competitions: Vec<WireCompetition>,
    #[serde(default)]
    season: Option<WireSeason>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSeason {
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    r#type: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCompetition {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    competitors: Vec<WireCompetitor>,
    #[serde(default)]
    venue: Option<WireVenue>,
    #[serde(default)]
    broadcasts: Vec<WireBroadcast>,
    #[serde(default)]
    status: Option<WireStatus>,
    #[serde(default)]
    odds: Vec<WireOdds>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCompetitor {
    #[serde(default)]
    home_away: Option<String>,
    #[serde(default)]
    score: Option<serde_json::Value>,
    #[serde(default)]
    team: Option<WireTeam>,
    #[serde(default)]
    records: Vec<WireRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTeam {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    short_display_name: Option<String>,
    #[serde(default)]
    abbreviation: Option<String>,
    #[serde(default)]
    logo: Option<String>,
    #[serde(default)]
    logos: Vec<WireLogo>,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireLogo {
    href: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVenue {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    address: Option<WireAddress>,
}

#[derive(Debug, Deserialize)]
struct WireAddress {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireBroadcast {
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatus {
    #[serde(default)]
    period: Option<u32>,
    #[serde(default)]
    display_clock: Option<String>,
    #[serde(default)]
    r#type: Option<WireStatusType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatusType {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOdds {
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    over_under: Option<f64>,
    #[serde(default)]
    provider: Option<WireOddsProvider>,
}

#[derive(Debug, Deserialize)]
struct WireOddsProvider {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamResponse {
    #[serde(default)]
    team: Option<TeamDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamDetail {
    #[serde(default)]
    record: Option<TeamRecordWrapper>,
    #[serde(default)]
    standing_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamRecordWrapper {
    #[serde(default)]
    items: Vec<TeamRecordItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamRecordItem {
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    stats: Vec<TeamRecordStat>,
}

#[derive(Debug, Deserialize)]
struct TeamRecordStat {
    name: String,
    #[serde(default)]
    value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Map ESPN status names/states to canonical states. Legacy payloads mix
/// `STATUS_FINAL` names with `state == "post"`, so both are honored.
fn canonical_state(name: Option<&str>, state: Option<&str>) -> EventState {
    if let Some(name) = name {
        match name {
            "STATUS_SCHEDULED" | "STATUS_DELAYED" => return EventState::Scheduled,
            "STATUS_IN_PROGRESS" | "STATUS_HALFTIME" | "STATUS_END_PERIOD" => {
                return EventState::Live
            }
            "STATUS_FINAL" | "STATUS_FINAL_OT" => return EventState::Final,
            "STATUS_POSTPONED" => return EventState::Postponed,
            "STATUS_CANCELED" | "STATUS_CANCELLED" => return EventState::Cancelled,
            _ => {}
        }
    }
    match state {
        Some("in") => EventState::Live,
        Some("post") => EventState::Final,
        _ => EventState::Scheduled,
    }
}

fn parse_score(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|f| f as i32),
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Object(obj) => obj.get("value").and_then(parse_score_inner),
        _ => None,
    }
}

fn parse_score_inner(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|f| f as i32),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn normalize_team(wire: &WireTeam, league: &str) -> Team {
    let name = wire.display_name.clone().unwrap_or_default();
    let logo_url = wire
        .logo
        .clone()
        .or_else(|| wire.logos.first().map(|l| l.href.clone()));

    Team {
        id: wire.id.clone().unwrap_or_default(),
        provider: "espn".to_string(),
        short_name: wire.short_display_name.clone().unwrap_or_else(|| name.clone()),
        abbreviation: wire.abbreviation.clone().unwrap_or_default(),
        name,
        league: league.to_string(),
        sport: sport_name(league).to_string(),
        logo_url,
        color: wire.color.clone(),
    }
}

fn normalize_event(wire: &WireEvent, league: &str) -> Option<Event> {
    let competition = wire.competitions.first()?;

    let date_str = wire.date.as_deref().or(competition.date.as_deref())?;
    let start_time: DateTime<Utc> = DateTimeParser::parse_flexible(date_str).ok()?;

    let home_wire = competition
        .competitors
        .iter()
        .find(|c| c.home_away.as_deref() == Some("home"))?;
    let away_wire = competition
        .competitors
        .iter()
        .find(|c| c.home_away.as_deref() == Some("away"))?;

    let home_team = normalize_team(home_wire.team.as_ref()?, league);
    let away_team = normalize_team(away_wire.team.as_ref()?, league);

    let status = match &competition.status {
        Some(s) => EventStatus {
            state: canonical_state(
                s.r#type.as_ref().and_then(|t| t.name.as_deref()),
                s.r#type.as_ref().and_then(|t| t.state.as_deref()),
            ),
            detail: s.r#type.as_ref().and_then(|t| t.detail.clone()),
            period: s.period,
            clock: s.display_clock.clone(),
        },
        None => EventStatus::scheduled(),
    };

    let venue = competition.venue.as_ref().map(|v| Venue {
        name: v.full_name.clone().unwrap_or_default(),
        city: v.address.as_ref().and_then(|a| a.city.clone()),
        state: v.address.as_ref().and_then(|a| a.state.clone()),
        country: v.address.as_ref().and_then(|a| a.country.clone()),
    });

    let broadcasts: Vec<String> = competition
        .broadcasts
        .iter()
        .flat_map(|b| b.names.iter().cloned())
        .collect();

    let odds = competition.odds.first().map(|o| EventOdds {
        spread: o.details.clone(),
        over_under: o.over_under.map(|v| v.to_string()),
        provider: o.provider.as_ref().and_then(|p| p.name.clone()),
        home_moneyline: None,
        away_moneyline: None,
    });

    let name = wire.name.clone().unwrap_or_else(|| {
        format!("{} at {}", away_team.name, home_team.name)
    });
    let short_name = wire.short_name.clone().unwrap_or_else(|| name.clone());

    Some(Event {
        id: wire.id.clone(),
        provider: "espn".to_string(),
        name,
        short_name,
        start_time,
        home_score: home_wire.score.as_ref().and_then(parse_score),
        away_score: away_wire.score.as_ref().and_then(parse_score),
        home_team,
        away_team,
        status,
        league: league.to_string(),
        sport: sport_name(league).to_string(),
        venue,
        broadcasts,
        season_year: wire.season.as_ref().and_then(|s| s.year),
        season_type: wire
            .season
            .as_ref()
            .and_then(|s| s.r#type.as_ref())
            .map(|t| t.to_string()),
        odds,
        main_card_start: None,
    })
}

fn normalize_scoreboard(response: ScoreboardResponse, league: &str) -> Vec<Event> {
    response
        .events
        .iter()
        .filter_map(|e| normalize_event(e, league))
        .collect()
}

fn parse_team_stats(response: TeamResponse) -> Option<TeamStats> {
    let detail = response.team?;
    let record = detail.record.as_ref()?;

    let mut stats = TeamStats::default();

    for item in &record.items {
        let summary = item.summary.clone().unwrap_or_default();
        match item.r#type.as_deref() {
            Some("total") | None => {
                stats.record = summary;
                for stat in &item.stats {
                    match stat.name.as_str() {
                        "wins" => stats.wins = stat.value.unwrap_or(0.0) as i32,
                        "losses" => stats.losses = stat.value.unwrap_or(0.0) as i32,
                        "ties" => stats.ties = stat.value.unwrap_or(0.0) as i32,
                        "streak" => {
                            let streak = stat.value.unwrap_or(0.0) as i32;
                            if streak != 0 {
                                stats.streak = Some(if streak > 0 {
                                    format!("W{streak}")
                                } else {
                                    format!("L{}", -streak)
                                });
                            }
                        }
                        "playoffSeed" => {
                            let seed = stat.value.unwrap_or(0.0) as i32;
                            if seed > 0 {
                                stats.playoff_seed = Some(seed);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some("home") => stats.home_record = Some(summary),
            Some("road") | Some("away") => stats.away_record = Some(summary),
            _ => {}
        }
    }

    stats.division = detail.standing_summary;
    Some(stats)
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct EspnProvider {
    client: Client,
    base_url: String,
}

impl EspnProvider {
    pub fn new() -> Self {
        Self::with_base_url(SITE_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("teamarr/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> AppResult<T> {
        debug!("ESPN fetch: {}", url);
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::not_found("espn resource", url.to_string()));
        }
        if !response.status().is_success() {
            return Err(AppError::upstream(
                "espn",
                format!("HTTP {} for {}", response.status(), url),
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::parse("espn payload", e.to_string()))
    }
}

impl Default for EspnProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SportsProvider for EspnProvider {
    async fn get_events(&self, league: &str, date: NaiveDate) -> AppResult<Vec<Event>> {
        let url = format!(
            "{}/{}/{}/scoreboard?dates={}",
            self.base_url,
            sport_path(league),
            league,
            date.format("%Y%m%d")
        );
        let response: ScoreboardResponse = self.fetch_json(&url).await?;
        Ok(normalize_scoreboard(response, league))
    }

    async fn get_event(&self, event_id: &str, league: &str) -> AppResult<Option<Event>> {
        let url = format!(
            "{}/{}/{}/summary?event={}",
            self.base_url,
            sport_path(league),
            league,
            event_id
        );
        let response: SummaryResponse = match self.fetch_json(&url).await {
            Ok(r) => r,
            Err(AppError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(header) = response.header else {
            return Ok(None);
        };
        let wire = WireEvent {
            id: header.id,
            name: None,
            short_name: None,
            date: None,
            competitions: header.competitions,
            season: None,
        };
        Ok(normalize_event(&wire, league))
    }

    async fn get_team_schedule(
        &self,
        team_id: &str,
        league: &str,
        days_ahead: i64,
    ) -> AppResult<Vec<Event>> {
        let url = format!(
            "{}/{}/{}/teams/{}/schedule",
            self.base_url,
            sport_path(league),
            league,
            team_id
        );
        let response: ScheduleResponse = self.fetch_json(&url).await?;
        let cutoff = Utc::now() + chrono::Duration::days(days_ahead);
        let yesterday = Utc::now() - chrono::Duration::days(2);

        let mut events: Vec<Event> = response
            .events
            .iter()
            .filter_map(|e| normalize_event(e, league))
            .filter(|e| e.start_time >= yesterday && e.start_time <= cutoff)
            .collect();
        events.sort_by_key(|e| e.start_time);
        Ok(events)
    }

    async fn get_team_stats(&self, team_id: &str, league: &str) -> AppResult<Option<TeamStats>> {
        let url = format!(
            "{}/{}/{}/teams/{}",
            self.base_url,
            sport_path(league),
            league,
            team_id
        );
        let response: TeamResponse = match self.fetch_json(&url).await {
            Ok(r) => r,
            Err(AppError::NotFound { .. }) => return Ok(None),
            Err(e) => {
                warn!("Team stats fetch failed for {}: {}", team_id, e);
                return Ok(None);
            }
        };
        Ok(parse_team_stats(response))
    }

    fn provider_name(&self) -> &'static str {
        "espn"
    }
}
