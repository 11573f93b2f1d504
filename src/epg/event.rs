//! Event-based EPG generation
//!
//! One synthetic channel per matched stream (`teamarr-event-<id>`), one
//! game programme per channel, plus optional pregame/postgame filler
//! bounded by the local day. Every displayed field flows through the
//! template resolver; `<live>`/`<new>` flags come from the template.

use chrono::Duration;
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};

use crate::models::{
    Event, EventGroup, MatchedStream, Programme, ProgrammeKind, Template, XmltvChannel,
};
use crate::templates::{TemplateContext, TemplateResolver};
use crate::utils::time::{local_date, local_end_of_day_utc, local_midnight_utc, TimeFormatSettings};

/// Fallback durations (hours), used only when settings carry no value
/// for the sport.
const FALLBACK_DURATIONS: &[(&str, f64)] = &[
    ("football", 3.5),
    ("basketball", 2.5),
    ("hockey", 3.0),
    ("baseball", 3.5),
    ("soccer", 2.0),
];

#[derive(Debug, Clone)]
pub struct EventEpgOptions {
    pub timezone: Tz,
    pub time_format: TimeFormatSettings,
    /// Per-sport durations from settings.
    pub sport_durations: HashMap<String, f64>,
    pub default_duration_hours: f64,
    /// Display names per league code, for the {league} variable.
    pub league_names: HashMap<String, String>,
}

impl EventEpgOptions {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            time_format: TimeFormatSettings::default(),
            sport_durations: HashMap::new(),
            default_duration_hours: 3.0,
            league_names: HashMap::new(),
        }
    }
}

/// Resolved output of one generation pass.
#[derive(Debug, Default)]
pub struct EventEpgOutput {
    pub channels: Vec<XmltvChannel>,
    pub programmes: Vec<Programme>,
    pub event_count: usize,
    pub pregame_count: usize,
    pub postgame_count: usize,
}

pub struct EventEpgGenerator {
    resolver: TemplateResolver,
    options: EventEpgOptions,
}

impl EventEpgGenerator {
    pub fn new(options: EventEpgOptions) -> Self {
        Self {
            resolver: TemplateResolver::new(),
            options,
        }
    }

    /// Channel id (tvg_id) for an event stream. Used consistently in
    /// XMLTV output, channel creation, and reconciliation.
    pub fn channel_id(event: &Event) -> String {
        format!("teamarr-event-{}", event.id)
    }

    /// Duration for an event programme, honoring the template's duration
    /// mode. `custom` without an override falls back to `sport`.
    pub fn event_duration_hours(&self, template: &Template, sport: &str) -> f64 {
        use crate::models::DurationMode;

        let mut mode = template.game_duration_mode;
        if mode == DurationMode::Custom {
            if let Some(override_hours) = template.game_duration_override {
                return override_hours;
            }
            mode = DurationMode::Sport;
        }

        let sport = sport.to_ascii_lowercase();
        match mode {
            DurationMode::Sport => {
                if let Some(hours) = self.options.sport_durations.get(&sport) {
                    return *hours;
                }
                FALLBACK_DURATIONS
                    .iter()
                    .find(|(s, _)| *s == sport)
                    .map(|(_, h)| *h)
                    .unwrap_or(self.options.default_duration_hours)
            }
            _ => self.options.default_duration_hours,
        }
    }

    /// Generate channels and programmes for a group's matched streams.
    pub fn generate(
        &self,
        matched_streams: &[MatchedStream],
        group: &EventGroup,
        template: &Template,
    ) -> EventEpgOutput {
        let mut output = EventEpgOutput::default();
        let mut seen_channels: HashSet<String> = HashSet::new();

        for matched in matched_streams {
            let event = &matched.event;
            let context = self.context_for(matched, group);

            // Duplicate streams for one event share a channel and its
            // programmes; emitting twice would overlap.
            if !seen_channels.insert(matched.channel_id.clone()) {
                continue;
            }
            output.channels.push(self.build_channel(matched, template, &context));

            let sport = if event.sport.is_empty() {
                group.assigned_sport.clone().unwrap_or_default()
            } else {
                event.sport.clone()
            };
            let duration_hours = self.event_duration_hours(template, &sport);
            let event_end =
                event.start_time + Duration::seconds((duration_hours * 3600.0) as i64);

            if template.pregame_enabled {
                if let Some(programme) =
                    self.build_pregame(matched, template, &context)
                {
                    output.programmes.push(programme);
                    output.pregame_count += 1;
                }
            }

            output
                .programmes
                .push(self.build_game(matched, template, &context, event_end));
            output.event_count += 1;

            if template.postgame_enabled {
                if let Some(programme) =
                    self.build_postgame(matched, template, &context, event_end)
                {
                    output.programmes.push(programme);
                    output.postgame_count += 1;
                }
            }
        }

        output
            .programmes
            .sort_by(|a, b| (&a.channel_id, a.start).cmp(&(&b.channel_id, b.start)));
        output
    }

    fn context_for(&self, matched: &MatchedStream, group: &EventGroup) -> TemplateContext {
        let event = matched.event.clone();
        let league = event.league.clone();
        let sport = event.sport.clone();
        let league_display = self
            .options
            .league_names
            .get(&league)
            .cloned()
            .unwrap_or_else(|| league.to_uppercase());

        let sport_display = {
            let source = if sport.is_empty() {
                group.assigned_sport.clone().unwrap_or_default()
            } else {
                sport
            };
            let mut chars = source.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        };

        TemplateContext::for_event(event, self.options.timezone)
            .with_stream(&matched.stream_id, &matched.stream_name)
            .with_exception_keyword(matched.exception_keyword.as_deref())
            .with_league_display(&league_display, &sport_display)
            .with_time_format(self.options.time_format)
    }

    fn build_channel(
        &self,
        matched: &MatchedStream,
        template: &Template,
        context: &TemplateContext,
    ) -> XmltvChannel {
        let name = template
            .channel_name_format
            .as_deref()
            .map(|format| self.resolver.resolve(format, context))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| matched.stream_name.clone());

        let icon = template
            .channel_logo_url
            .as_deref()
            .map(|format| self.resolver.resolve(format, context))
            .filter(|s| !s.is_empty());

        XmltvChannel {
            id: matched.channel_id.clone(),
            name,
            icon,
        }
    }

    fn apply_flags(programme: &mut Programme, template: &Template) {
        programme.flag_new = template.xmltv_flags.new;
        programme.flag_live = template.xmltv_flags.live;
    }

    fn resolved_categories(
        &self,
        template: &Template,
        context: &TemplateContext,
        kind: ProgrammeKind,
    ) -> Vec<String> {
        if !template.categories_apply(kind) {
            return Vec::new();
        }
        template
            .xmltv_categories
            .iter()
            .map(|category| {
                if category.contains('{') {
                    self.resolver.resolve(category, context)
                } else {
                    category.clone()
                }
            })
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn build_game(
        &self,
        matched: &MatchedStream,
        template: &Template,
        context: &TemplateContext,
        event_end: chrono::DateTime<chrono::Utc>,
    ) -> Programme {
        let event = &matched.event;

        let title = {
            let resolved = self.resolver.resolve(&template.title_format, context);
            if resolved.is_empty() {
                format!("{} @ {}", event.away_team.name, event.home_team.name)
            } else {
                resolved
            }
        };

        let mut programme =
            Programme::new(&matched.channel_id, &title, event.start_time, event_end);

        programme.subtitle = template
            .subtitle_format
            .as_deref()
            .map(|format| self.resolver.resolve(format, context))
            .filter(|s| !s.is_empty());

        programme.description = self
            .resolver
            .select_description(&template.conditional_descriptions, context)
            .map(|selected| self.resolver.resolve(&selected, context))
            .filter(|s| !s.is_empty());

        programme.icon = template
            .program_art_url
            .as_deref()
            .map(|format| self.resolver.resolve(format, context))
            .filter(|s| !s.is_empty());

        programme.categories = self.resolved_categories(template, context, ProgrammeKind::Event);
        Self::apply_flags(&mut programme, template);
        programme
    }

    /// Pregame filler from local midnight to the event start. Skipped
    /// when the event starts at local midnight.
    fn build_pregame(
        &self,
        matched: &MatchedStream,
        template: &Template,
        context: &TemplateContext,
    ) -> Option<Programme> {
        let event = &matched.event;
        let event_date = local_date(event.start_time, self.options.timezone);
        let day_start = local_midnight_utc(event_date, self.options.timezone);

        if day_start >= event.start_time {
            return None;
        }

        let title = self.resolver.resolve(&template.pregame_title, context);
        let mut programme =
            Programme::new(&matched.channel_id, &title, day_start, event.start_time);

        programme.subtitle = template
            .pregame_subtitle
            .as_deref()
            .map(|format| self.resolver.resolve(format, context))
            .filter(|s| !s.is_empty());
        programme.description = template
            .pregame_description
            .as_deref()
            .map(|format| self.resolver.resolve(format, context))
            .filter(|s| !s.is_empty());
        programme.icon = template
            .pregame_art_url
            .as_deref()
            .map(|format| self.resolver.resolve(format, context))
            .filter(|s| !s.is_empty());

        programme.categories =
            self.resolved_categories(template, context, ProgrammeKind::Pregame);
        Self::apply_flags(&mut programme, template);
        Some(programme)
    }

    /// Postgame filler from the event end to local 23:59:59. Suppressed
    /// when the event crosses local midnight.
    fn build_postgame(
        &self,
        matched: &MatchedStream,
        template: &Template,
        context: &TemplateContext,
        event_end: chrono::DateTime<chrono::Utc>,
    ) -> Option<Programme> {
        let event = &matched.event;
        let start_date = local_date(event.start_time, self.options.timezone);
        let end_date = local_date(event_end, self.options.timezone);

        if end_date != start_date {
            return None;
        }

        let day_end = local_end_of_day_utc(end_date, self.options.timezone);
        if event_end >= day_end {
            return None;
        }

        let title = self.resolver.resolve(&template.postgame_title, context);
        let mut programme = Programme::new(&matched.channel_id, &title, event_end, day_end);

        programme.subtitle = template
            .postgame_subtitle
            .as_deref()
            .map(|format| self.resolver.resolve(format, context))
            .filter(|s| !s.is_empty());
        programme.description = self
            .resolver
            .postgame_description(template, context)
            .map(|selected| self.resolver.resolve(&selected, context))
            .filter(|s| !s.is_empty());
        programme.icon = template
            .postgame_art_url
            .as_deref()
            .map(|format| self.resolver.resolve(format, context))
            .filter(|s| !s.is_empty());

        programme.categories =
            self.resolved_categories(template, context, ProgrammeKind::Postgame);
        Self::apply_flags(&mut programme, template);
        Some(programme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, Team, XmltvFlags};
    use crate::utils::time::parse_timezone;
    use chrono::{TimeZone, Utc};

    fn team(id: &str, name: &str, abbrev: &str) -> Team {
        Team {
            id: id.to_string(),
            provider: "espn".to_string(),
            name: name.to_string(),
            short_name: name.to_string(),
            abbreviation: abbrev.to_string(),
            league: "nfl".to_string(),
            sport: "football".to_string(),
            logo_url: None,
            color: None,
        }
    }

    fn event_at(hour_utc: u32) -> Event {
        Event {
            id: "401547".to_string(),
            provider: "espn".to_string(),
            name: "New York Giants at Dallas Cowboys".to_string(),
            short_name: "NYG @ DAL".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 12, 14, hour_utc, 0, 0).unwrap(),
            home_team: team("6", "Dallas Cowboys", "DAL"),
            away_team: team("19", "New York Giants", "NYG"),
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

    fn matched(event: Event) -> MatchedStream {
        MatchedStream {
            stream_id: "77".to_string(),
            stream_name: "Giants @ Cowboys".to_string(),
            channel_id: EventEpgGenerator::channel_id(&event),
            event,
            exception_keyword: None,
        }
    }

    fn group() -> EventGroup {
        EventGroup {
            id: 1,
            name: "NFL Games".to_string(),
            enabled: true,
            assigned_league: Some("nfl".to_string()),
            assigned_sport: Some("football".to_string()),
            is_multi_sport: false,
            dispatcharr_group_id: Some(10),
            channel_group_id: Some(20),
            channel_start: Some(5000),
            create_timing: None,
            delete_timing: None,
            event_template_id: Some(1),
            exception_keywords: Vec::new(),
            duplicate_event_handling: "consolidate".to_string(),
            create_unmatched_channels: false,
            unmatched_channel_epg_source_id: None,
        }
    }

    fn options() -> EventEpgOptions {
        let mut options = EventEpgOptions::new(parse_timezone("America/New_York"));
        options
            .sport_durations
            .insert("football".to_string(), 3.5);
        options
    }

    fn full_template() -> Template {
        Template {
            pregame_enabled: true,
            postgame_enabled: true,
            title_format: "{away_team} @ {home_team}".to_string(),
            xmltv_flags: XmltvFlags { new: true, live: true },
            xmltv_categories: vec!["Sports".to_string()],
            ..Template::default()
        }
    }

    #[test]
    fn test_generates_game_with_filler_windows() {
        // 6pm UTC = 1pm EST; same local day throughout
        let generator = EventEpgGenerator::new(options());
        let output = generator.generate(&[matched(event_at(18))], &group(), &full_template());

        assert_eq!(output.channels.len(), 1);
        assert_eq!(output.event_count, 1);
        assert_eq!(output.pregame_count, 1);
        assert_eq!(output.postgame_count, 1);
        assert_eq!(output.programmes.len(), 3);

        // Non-overlap and contiguity in ascending order
        for pair in output.programmes.windows(2) {
            assert!(pair[0].stop <= pair[1].start);
        }
        let game = &output.programmes[1];
        assert_eq!(game.title, "New York Giants @ Dallas Cowboys");
        assert!(game.flag_new);
        assert!(game.flag_live);
        // 3.5 hour football duration
        assert_eq!(game.stop - game.start, Duration::minutes(210));
    }

    #[test]
    fn test_postgame_suppressed_when_crossing_midnight() {
        // 1am UTC Dec 15 = 8pm EST Dec 14; game ends 11:30pm EST - fits.
        // 3am UTC = 10pm EST; 3.5h duration ends 1:30am next local day.
        let late_night = event_at(18);
        let mut late = matched(late_night);
        late.event.start_time = Utc.with_ymd_and_hms(2025, 12, 15, 3, 0, 0).unwrap();

        let generator = EventEpgGenerator::new(options());
        let output = generator.generate(&[late], &group(), &full_template());

        assert_eq!(output.event_count, 1);
        assert_eq!(output.pregame_count, 1);
        assert_eq!(output.postgame_count, 0);
    }

    #[test]
    fn test_duration_mode_custom_and_fallback() {
        let generator = EventEpgGenerator::new(options());

        let mut template = full_template();
        template.game_duration_mode = crate::models::DurationMode::Custom;
        template.game_duration_override = Some(2.0);
        assert_eq!(generator.event_duration_hours(&template, "football"), 2.0);

        // Custom with a null override falls back to sport mode
        template.game_duration_override = None;
        assert_eq!(generator.event_duration_hours(&template, "football"), 3.5);

        // Unknown sport falls to the hardcoded table, then default
        assert_eq!(generator.event_duration_hours(&template, "soccer"), 2.0);
        assert_eq!(generator.event_duration_hours(&template, "curling"), 3.0);
    }

    #[test]
    fn test_categories_gated_by_apply_to() {
        let mut template = full_template();
        template.categories_apply_to = "events".to_string();

        let generator = EventEpgGenerator::new(options());
        let output = generator.generate(&[matched(event_at(18))], &group(), &template);

        let game = &output.programmes[1];
        let pregame = &output.programmes[0];
        assert_eq!(game.categories, vec!["Sports"]);
        assert!(pregame.categories.is_empty());
    }

    #[test]
    fn test_duplicate_streams_share_one_channel() {
        let generator = EventEpgGenerator::new(options());
        let first = matched(event_at(18));
        let mut second = matched(event_at(18));
        second.stream_id = "78".to_string();
        second.stream_name = "NYG/DAL alternate feed".to_string();

        let output = generator.generate(&[first, second], &group(), &full_template());
        assert_eq!(output.channels.len(), 1);
        // Programmes are emitted once per channel, not per stream
        assert_eq!(output.event_count, 1);
        for pair in output.programmes.windows(2) {
            assert!(pair[0].stop <= pair[1].start);
        }
    }
}
