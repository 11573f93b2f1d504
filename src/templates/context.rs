//! Template resolution context
//!
//! A context carries the current event, its schedule neighbors for
//! suffix resolution, the team perspective (for team channels), and
//! display settings. Resolution is a pure function of (template, context).

use chrono_tz::Tz;

use crate::models::{Event, TeamStats};
use crate::utils::time::{parse_timezone, TimeFormatSettings};

/// Which event a variable resolves against. `{var.next}` reads the
/// subsequent scheduled event, `{var.last}` the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSlot {
    Current,
    Next,
    Last,
}

/// The "our team" perspective for team-channel templates. Event-channel
/// templates are positional (home/away) and leave this unset.
#[derive(Debug, Clone)]
pub struct TeamPerspective {
    pub team_id: String,
    pub team_name: String,
    pub team_abbrev: String,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub event: Option<Event>,
    pub next_event: Option<Event>,
    pub last_event: Option<Event>,
    pub team: Option<TeamPerspective>,
    pub team_stats: Option<TeamStats>,
    pub opponent_stats: Option<TeamStats>,
    pub stream_name: Option<String>,
    pub stream_id: Option<String>,
    pub league_display: Option<String>,
    pub sport_display: Option<String>,
    pub exception_keyword: Option<String>,
    pub timezone: Tz,
    pub time_format: TimeFormatSettings,
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self {
            event: None,
            next_event: None,
            last_event: None,
            team: None,
            team_stats: None,
            opponent_stats: None,
            stream_name: None,
            stream_id: None,
            league_display: None,
            sport_display: None,
            exception_keyword: None,
            timezone: parse_timezone(crate::utils::time::DEFAULT_TIMEZONE),
            time_format: TimeFormatSettings::default(),
        }
    }
}

impl TemplateContext {
    /// Context for an event channel (positional variables).
    pub fn for_event(event: Event, timezone: Tz) -> Self {
        Self {
            event: Some(event),
            timezone,
            ..Self::default()
        }
    }

    /// Context for a team channel: the event plus its schedule neighbors
    /// and the team's perspective.
    pub fn for_team_event(
        event: Event,
        next_event: Option<Event>,
        last_event: Option<Event>,
        team: TeamPerspective,
        team_stats: Option<TeamStats>,
        timezone: Tz,
    ) -> Self {
        Self {
            event: Some(event),
            next_event,
            last_event,
            team: Some(team),
            team_stats,
            timezone,
            ..Self::default()
        }
    }

    /// Filler context: no current event, the surrounding games live in
    /// the `.next`/`.last` slots.
    pub fn for_filler(
        next_event: Option<Event>,
        last_event: Option<Event>,
        team: Option<TeamPerspective>,
        team_stats: Option<TeamStats>,
        timezone: Tz,
    ) -> Self {
        Self {
            next_event,
            last_event,
            team,
            team_stats,
            timezone,
            ..Self::default()
        }
    }

    pub fn with_stream(mut self, stream_id: &str, stream_name: &str) -> Self {
        self.stream_id = Some(stream_id.to_string());
        self.stream_name = Some(stream_name.to_string());
        self
    }

    pub fn with_exception_keyword(mut self, keyword: Option<&str>) -> Self {
        self.exception_keyword = keyword.map(str::to_string);
        self
    }

    pub fn with_league_display(mut self, league: &str, sport: &str) -> Self {
        self.league_display = Some(league.to_string());
        self.sport_display = Some(sport.to_string());
        self
    }

    pub fn with_time_format(mut self, time_format: TimeFormatSettings) -> Self {
        self.time_format = time_format;
        self
    }

    /// The event a variable with the given suffix resolves against.
    pub fn event_for(&self, slot: EventSlot) -> Option<&Event> {
        match slot {
            EventSlot::Current => self.event.as_ref(),
            EventSlot::Next => self.next_event.as_ref(),
            EventSlot::Last => self.last_event.as_ref(),
        }
    }

    /// For team channels: is our team the home side of this event?
    pub fn is_home(&self, event: &Event) -> Option<bool> {
        let team = self.team.as_ref()?;
        if event.home_team.id == team.team_id {
            Some(true)
        } else if event.away_team.id == team.team_id {
            Some(false)
        } else {
            None
        }
    }
}
