use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Event location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Team identity. IDs are globally unique only within a (provider, id) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub short_name: String,
    pub abbreviation: String,
    pub league: String,
    pub sport: String,
    pub logo_url: Option<String>,
    pub color: Option<String>,
}

/// Canonical event lifecycle state, normalized at provider ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    Scheduled,
    Live,
    Final,
    Postponed,
    Cancelled,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Final => "final",
            Self::Postponed => "postponed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "live" => Self::Live,
            "final" => Self::Final,
            "postponed" => Self::Postponed,
            "cancelled" => Self::Cancelled,
            _ => Self::Scheduled,
        }
    }
}

/// Current state of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStatus {
    pub state: EventState,
    pub detail: Option<String>,
    pub period: Option<u32>,
    pub clock: Option<String>,
}

impl EventStatus {
    pub fn scheduled() -> Self {
        Self {
            state: EventState::Scheduled,
            detail: None,
            period: None,
            clock: None,
        }
    }

    pub fn is_final(&self) -> bool {
        self.state == EventState::Final
    }
}

/// Betting odds attached to an event by scoreboard enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOdds {
    pub spread: Option<String>,
    pub over_under: Option<String>,
    pub provider: Option<String>,
    pub home_moneyline: Option<i32>,
    pub away_moneyline: Option<i32>,
}

/// A single sporting event (game/match/fight).
///
/// Scores are only meaningful when `status.state` is live or final.
/// `start_time` is always timezone-aware (UTC internally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub short_name: String,
    pub start_time: DateTime<Utc>,
    pub home_team: Team,
    pub away_team: Team,
    pub status: EventStatus,
    pub league: String,
    pub sport: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub venue: Option<Venue>,
    pub broadcasts: Vec<String>,
    pub season_year: Option<i32>,
    pub season_type: Option<String>,
    pub odds: Option<EventOdds>,
    /// MMA only: when the main card begins (prelims start at `start_time`).
    pub main_card_start: Option<DateTime<Utc>>,
}

/// Team statistics for template variables.
///
/// Record fields store formatted strings like "10-2" or "8-3-1".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub record: String,
    pub wins: i32,
    pub losses: i32,
    pub ties: i32,
    pub home_record: Option<String>,
    pub away_record: Option<String>,
    /// "W3" or "L2" format.
    pub streak: Option<String>,
    pub rank: Option<i32>,
    pub playoff_seed: Option<i32>,
    pub conference: Option<String>,
    pub conference_abbrev: Option<String>,
    pub division: Option<String>,
}

/// An XMLTV programme entry. `stop` is always after `start`; programmes
/// on the same channel never overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Programme {
    pub channel_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub description: Option<String>,
    pub subtitle: Option<String>,
    pub categories: Vec<String>,
    pub icon: Option<String>,
    pub episode_num: Option<String>,
    pub flag_new: bool,
    pub flag_live: bool,
}

impl Programme {
    pub fn new(channel_id: &str, title: &str, start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            title: title.to_string(),
            start,
            stop,
            description: None,
            subtitle: None,
            categories: Vec::new(),
            icon: None,
            episode_num: None,
            flag_new: false,
            flag_live: false,
        }
    }
}

/// A channel entry for XMLTV output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmltvChannel {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
}

/// A stream bound to an event for the duration of one generation run.
#[derive(Debug, Clone)]
pub struct MatchedStream {
    pub stream_id: String,
    pub stream_name: String,
    pub event: Event,
    pub channel_id: String,
    pub exception_keyword: Option<String>,
}

/// Sync state of a managed channel relative to Dispatcharr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InSync,
    Drifted,
    Orphaned,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InSync => "in_sync",
            Self::Drifted => "drifted",
            Self::Orphaned => "orphaned",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "drifted" => Self::Drifted,
            "orphaned" => Self::Orphaned,
            _ => Self::InSync,
        }
    }
}

/// A Dispatcharr channel whose lifecycle Teamarr owns.
///
/// `dispatcharr_uuid` is the immutable upstream identifier and is
/// authoritative for identity when present; the numeric channel id is
/// the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedChannel {
    pub id: i64,
    pub event_group_id: i64,
    pub dispatcharr_channel_id: i64,
    pub dispatcharr_uuid: Option<String>,
    pub dispatcharr_stream_id: i64,
    pub channel_number: i64,
    pub channel_name: String,
    pub espn_event_id: String,
    pub event_date: Option<NaiveDate>,
    pub scheduled_delete_at: Option<DateTime<Utc>>,
    pub logo_id: Option<i64>,
    pub sync_status: SyncStatus,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Earliest instant a channel may be created for a matched stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateTiming {
    StreamAvailable,
    SameDay,
    DayBefore,
    TwoDaysBefore,
    Manual,
}

impl CreateTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StreamAvailable => "stream_available",
            Self::SameDay => "same_day",
            Self::DayBefore => "day_before",
            Self::TwoDaysBefore => "2_days_before",
            Self::Manual => "manual",
        }
    }

    /// Parse a timing value, normalizing legacy spellings.
    pub fn parse(s: &str) -> Self {
        match s {
            "stream_available" => Self::StreamAvailable,
            "day_before" => Self::DayBefore,
            "2_days_before" | "week_before" => Self::TwoDaysBefore,
            "manual" => Self::Manual,
            _ => Self::SameDay, // includes legacy "day_of"
        }
    }
}

/// Latest instant a channel survives, derived from the event's end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteTiming {
    SameDay,
    DayAfter,
    TwoDaysAfter,
    StreamRemoved,
    Manual,
}

impl DeleteTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameDay => "same_day",
            Self::DayAfter => "day_after",
            Self::TwoDaysAfter => "2_days_after",
            Self::StreamRemoved => "stream_removed",
            Self::Manual => "manual",
        }
    }

    /// Parse a timing value, normalizing legacy spellings.
    pub fn parse(s: &str) -> Self {
        match s {
            "day_after" | "end_of_next_day" => Self::DayAfter,
            "2_days_after" => Self::TwoDaysAfter,
            "stream_removed" => Self::StreamRemoved,
            "manual" => Self::Manual,
            _ => Self::SameDay, // includes legacy "end_of_day"
        }
    }
}

/// A user-defined bucket of upstream streams sharing matching policy,
/// template, and lifecycle rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventGroup {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub assigned_league: Option<String>,
    pub assigned_sport: Option<String>,
    pub is_multi_sport: bool,
    pub dispatcharr_group_id: Option<i64>,
    pub channel_group_id: Option<i64>,
    pub channel_start: Option<i64>,
    /// Per-group timing overrides; None falls back to the global setting.
    pub create_timing: Option<CreateTiming>,
    pub delete_timing: Option<DeleteTiming>,
    pub event_template_id: Option<i64>,
    pub exception_keywords: Vec<String>,
    /// "consolidate" (default) or "separate" - in separate mode duplicate
    /// channels per event are expected and not flagged.
    pub duplicate_event_handling: String,
    pub create_unmatched_channels: bool,
    pub unmatched_channel_epg_source_id: Option<i64>,
}

/// How a game programme's duration is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationMode {
    Custom,
    Sport,
    Default,
}

impl DurationMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "custom" => Self::Custom,
            "default" => Self::Default,
            _ => Self::Sport,
        }
    }
}

/// A conditional description option: lowest priority among matching
/// conditions wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalDescription {
    #[serde(default)]
    pub condition: Option<String>,
    pub template: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    50
}

/// XMLTV flag emission controls; flags come from the template, never
/// hardcoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XmltvFlags {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub live: bool,
}

/// Event template: title/subtitle/description formats plus filler and
/// category configuration. JSON columns are deserialized into the nested
/// fields at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub title_format: String,
    pub subtitle_format: Option<String>,
    pub channel_name_format: Option<String>,
    pub channel_logo_url: Option<String>,
    pub program_art_url: Option<String>,
    pub conditional_descriptions: Vec<ConditionalDescription>,

    pub pregame_enabled: bool,
    pub pregame_title: String,
    pub pregame_subtitle: Option<String>,
    pub pregame_description: Option<String>,
    pub pregame_art_url: Option<String>,

    pub postgame_enabled: bool,
    pub postgame_title: String,
    pub postgame_subtitle: Option<String>,
    pub postgame_description: Option<String>,
    pub postgame_art_url: Option<String>,
    pub postgame_conditional_enabled: bool,
    pub postgame_description_final: Option<String>,
    pub postgame_description_not_final: Option<String>,

    pub idle_title: Option<String>,
    pub idle_description: Option<String>,

    pub xmltv_flags: XmltvFlags,
    pub xmltv_categories: Vec<String>,
    /// "all", or comma-combination of "events", "pregame", "postgame".
    pub categories_apply_to: String,

    pub game_duration_mode: DurationMode,
    pub game_duration_override: Option<f64>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            id: 0,
            name: "Default".to_string(),
            title_format: "{away_team} @ {home_team}".to_string(),
            subtitle_format: None,
            channel_name_format: None,
            channel_logo_url: None,
            program_art_url: None,
            conditional_descriptions: Vec::new(),
            pregame_enabled: false,
            pregame_title: "Pregame Coverage".to_string(),
            pregame_subtitle: None,
            pregame_description: None,
            pregame_art_url: None,
            postgame_enabled: false,
            postgame_title: "Postgame Recap".to_string(),
            postgame_subtitle: None,
            postgame_description: None,
            postgame_art_url: None,
            postgame_conditional_enabled: false,
            postgame_description_final: None,
            postgame_description_not_final: None,
            idle_title: None,
            idle_description: None,
            xmltv_flags: XmltvFlags::default(),
            xmltv_categories: Vec::new(),
            categories_apply_to: "all".to_string(),
            game_duration_mode: DurationMode::Sport,
            game_duration_override: None,
        }
    }
}

/// Programme type for category apply-to gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgrammeKind {
    Event,
    Pregame,
    Postgame,
}

impl ProgrammeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "events",
            Self::Pregame => "pregame",
            Self::Postgame => "postgame",
        }
    }
}

impl Template {
    /// Check whether categories apply to the given programme type.
    /// `apply_to` is "all" or a comma-combination like "events,pregame".
    pub fn categories_apply(&self, kind: ProgrammeKind) -> bool {
        let apply_to = self.categories_apply_to.trim();
        if apply_to.is_empty() || apply_to.eq_ignore_ascii_case("all") {
            return true;
        }
        apply_to
            .split(',')
            .map(|t| t.trim().to_ascii_lowercase())
            .any(|t| t == kind.as_str() || (t == "game" && kind == ProgrammeKind::Event))
    }
}

/// A persistent fingerprint-cache entry for a prior successful match.
#[derive(Debug, Clone)]
pub struct MatchCacheEntry {
    pub event_id: String,
    pub league: String,
    pub snapshot: Event,
    pub last_seen_generation: i64,
}

/// A team channel configured for team-based EPG.
#[derive(Debug, Clone)]
pub struct TeamChannelConfig {
    pub team_id: String,
    pub provider: String,
    pub league: String,
    pub channel_id: String,
    pub team_name: String,
    pub team_abbrev: Option<String>,
    pub logo_url: Option<String>,
    pub sport: Option<String>,
    pub template_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_parse_normalizes_legacy_values() {
        assert_eq!(CreateTiming::parse("day_of"), CreateTiming::SameDay);
        assert_eq!(CreateTiming::parse("week_before"), CreateTiming::TwoDaysBefore);
        assert_eq!(DeleteTiming::parse("end_of_day"), DeleteTiming::SameDay);
        assert_eq!(DeleteTiming::parse("end_of_next_day"), DeleteTiming::DayAfter);
    }

    #[test]
    fn test_categories_apply_gating() {
        let mut template = Template::default();
        assert!(template.categories_apply(ProgrammeKind::Event));
        assert!(template.categories_apply(ProgrammeKind::Pregame));

        template.categories_apply_to = "events,postgame".to_string();
        assert!(template.categories_apply(ProgrammeKind::Event));
        assert!(!template.categories_apply(ProgrammeKind::Pregame));
        assert!(template.categories_apply(ProgrammeKind::Postgame));

        template.categories_apply_to = "game".to_string();
        assert!(template.categories_apply(ProgrammeKind::Event));
    }

    #[test]
    fn test_event_state_round_trip() {
        for state in [
            EventState::Scheduled,
            EventState::Live,
            EventState::Final,
            EventState::Postponed,
            EventState::Cancelled,
        ] {
            assert_eq!(EventState::parse(state.as_str()), state);
        }
    }
}
