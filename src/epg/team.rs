//! Team-based EPG generation
//!
//! One persistent channel per configured team. The schedule is fetched
//! from the team's primary league plus any additional competitions
//! (soccer multi-league), deduplicated by event id, and enriched for
//! today's and yesterday's games. Filler windows run between games with
//! hard boundaries at local midnight on the first and last day.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::errors::AppResult;
use crate::models::{Event, Programme, TeamChannelConfig, Template, TeamStats, XmltvChannel};
use crate::providers::SportsDataService;
use crate::templates::{TeamPerspective, TemplateContext, TemplateResolver};
use crate::utils::time::{local_date, local_midnight_utc, today_local, TimeFormatSettings};

#[derive(Debug, Clone)]
pub struct TeamEpgOptions {
    /// How far ahead to fetch the schedule (feeds `.next` variables).
    pub schedule_days_ahead: i64,
    /// How many days of programmes land in the XMLTV output.
    pub output_days_ahead: i64,
    pub pregame_minutes: i64,
    pub filler_enabled: bool,
    pub timezone: Tz,
    pub time_format: TimeFormatSettings,
    pub sport_durations: HashMap<String, f64>,
    pub default_duration_hours: f64,
}

impl TeamEpgOptions {
    pub fn new(timezone: Tz) -> Self {
        Self {
            schedule_days_ahead: 30,
            output_days_ahead: 14,
            pregame_minutes: 30,
            filler_enabled: true,
            timezone,
            time_format: TimeFormatSettings::default(),
            sport_durations: HashMap::new(),
            default_duration_hours: 3.0,
        }
    }

    fn duration_hours(&self, sport: &str) -> f64 {
        self.sport_durations
            .get(&sport.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_duration_hours)
    }
}

pub struct TeamEpgGenerator<'a> {
    service: &'a SportsDataService,
    resolver: TemplateResolver,
}

impl<'a> TeamEpgGenerator<'a> {
    pub fn new(service: &'a SportsDataService) -> Self {
        Self {
            service,
            resolver: TemplateResolver::new(),
        }
    }

    /// Generate the channel entry and programmes for one team.
    pub async fn generate(
        &self,
        config: &TeamChannelConfig,
        template: &Template,
        options: &TeamEpgOptions,
        additional_leagues: &[String],
    ) -> AppResult<(XmltvChannel, Vec<Programme>)> {
        let channel = XmltvChannel {
            id: config.channel_id.clone(),
            name: config.team_name.clone(),
            icon: config.logo_url.clone(),
        };

        // Fetch from the primary league plus additional competitions,
        // deduplicating by event id
        let mut events: Vec<Event> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        let mut leagues = vec![config.league.clone()];
        leagues.extend(
            additional_leagues
                .iter()
                .filter(|l| **l != config.league)
                .cloned(),
        );

        for league in &leagues {
            let schedule = self
                .service
                .get_team_schedule(&config.team_id, league, options.schedule_days_ahead)
                .await?;
            for event in schedule {
                if seen_ids.insert(event.id.clone()) {
                    events.push(event);
                }
            }
        }

        let events = self.enrich_recent_events(events, options.timezone).await;
        let team_stats = self
            .service
            .get_team_stats(&config.team_id, &config.league)
            .await
            .unwrap_or(None);

        let mut sorted = events;
        sorted.sort_by_key(|e| e.start_time);

        let output_cutoff = Utc::now() + Duration::days(options.output_days_ahead);
        let perspective = TeamPerspective {
            team_id: config.team_id.clone(),
            team_name: config.team_name.clone(),
            team_abbrev: config.team_abbrev.clone().unwrap_or_default(),
            logo_url: config.logo_url.clone(),
        };

        let mut programmes = Vec::new();

        for (i, event) in sorted.iter().enumerate() {
            if event.start_time > output_cutoff {
                continue;
            }

            let next_event = sorted.get(i + 1).cloned();
            let last_event = if i > 0 { sorted.get(i - 1).cloned() } else { None };

            let context = TemplateContext::for_team_event(
                event.clone(),
                next_event,
                last_event,
                perspective.clone(),
                team_stats.clone(),
                options.timezone,
            )
            .with_time_format(options.time_format);

            programmes.push(self.event_programme(event, config, template, options, &context));
        }

        if options.filler_enabled && !sorted.is_empty() {
            let output_events: Vec<&Event> = sorted
                .iter()
                .filter(|e| e.start_time <= output_cutoff)
                .collect();
            programmes.extend(self.filler_programmes(
                &output_events,
                config,
                template,
                options,
                &perspective,
                &team_stats,
            ));
        }

        programmes.sort_by_key(|p| p.start);
        let programmes = normalize_non_overlapping(programmes);

        debug!(
            "Team '{}': {} programme(s) from {} event(s)",
            config.team_name,
            programmes.len(),
            sorted.len()
        );

        Ok((channel, programmes))
    }

    /// The schedule endpoint is cached upstream and goes stale for live
    /// games; today's and yesterday's events are re-fetched from the
    /// single-event endpoint for current status and scores.
    async fn enrich_recent_events(&self, events: Vec<Event>, timezone: Tz) -> Vec<Event> {
        let today = today_local(timezone);
        let yesterday = today - Duration::days(1);

        let mut enriched = Vec::with_capacity(events.len());
        for event in events {
            let event_date = local_date(event.start_time, timezone);
            if event_date == today || event_date == yesterday {
                match self.service.get_event(&event.id, &event.league).await {
                    Ok(Some(fresh)) => enriched.push(fresh),
                    _ => enriched.push(event),
                }
            } else {
                enriched.push(event);
            }
        }
        enriched
    }

    fn event_programme(
        &self,
        event: &Event,
        config: &TeamChannelConfig,
        template: &Template,
        options: &TeamEpgOptions,
        context: &TemplateContext,
    ) -> Programme {
        let start = event.start_time - Duration::minutes(options.pregame_minutes);
        let duration = options.duration_hours(&event.sport);
        let stop = event.start_time + Duration::seconds((duration * 3600.0) as i64);

        let title = {
            let resolved = self.resolver.resolve(&template.title_format, context);
            if resolved.is_empty() {
                format!("{} @ {}", event.away_team.name, event.home_team.name)
            } else {
                resolved
            }
        };

        let mut programme = Programme::new(&config.channel_id, &title, start, stop);
        programme.subtitle = template
            .subtitle_format
            .as_deref()
            .map(|f| self.resolver.resolve(f, context))
            .filter(|s| !s.is_empty());
        programme.description = self
            .resolver
            .select_description(&template.conditional_descriptions, context)
            .map(|selected| self.resolver.resolve(&selected, context))
            .filter(|s| !s.is_empty());
        programme.icon = config
            .logo_url
            .clone()
            .or_else(|| event.home_team.logo_url.clone());
        programme.categories = template.xmltv_categories.clone();
        programme.flag_new = template.xmltv_flags.new;
        programme.flag_live = template.xmltv_flags.live;
        programme
    }

    /// Filler between games: pregame from the previous game's end (or
    /// local midnight on the first day), postgame until the next game's
    /// lead-in (or local midnight after the last day). Filler contexts
    /// swap the event into the `.next` or `.last` slot.
    fn filler_programmes(
        &self,
        events: &[&Event],
        config: &TeamChannelConfig,
        template: &Template,
        options: &TeamEpgOptions,
        perspective: &TeamPerspective,
        team_stats: &Option<TeamStats>,
    ) -> Vec<Programme> {
        let mut programmes = Vec::new();

        for (i, event) in events.iter().enumerate() {
            let next_event = events.get(i + 1).map(|e| (*e).clone());
            let last_event = if i > 0 {
                events.get(i - 1).map(|e| (*e).clone())
            } else {
                None
            };

            let duration = options.duration_hours(&event.sport);
            let lead_in = event.start_time - Duration::minutes(options.pregame_minutes);
            let event_end = event.start_time + Duration::seconds((duration * 3600.0) as i64);

            // Pregame window start
            let pregame_start = if i == 0 {
                let first_date = local_date(event.start_time, options.timezone);
                local_midnight_utc(first_date, options.timezone)
            } else {
                let previous = events[i - 1];
                let prev_duration = options.duration_hours(&previous.sport);
                previous.start_time + Duration::seconds((prev_duration * 3600.0) as i64)
            };

            if pregame_start < lead_in {
                let context = TemplateContext::for_filler(
                    Some((*event).clone()),
                    last_event,
                    Some(perspective.clone()),
                    team_stats.clone(),
                    options.timezone,
                )
                .with_time_format(options.time_format);

                let title = self.resolver.resolve(&template.pregame_title, &context);
                let mut programme =
                    Programme::new(&config.channel_id, &title, pregame_start, lead_in);
                programme.description = template
                    .pregame_description
                    .as_deref()
                    .map(|f| self.resolver.resolve(f, &context))
                    .filter(|s| !s.is_empty());
                programme.icon = config.logo_url.clone();
                programmes.push(programme);
            }

            // Postgame window end
            let postgame_end = match &next_event {
                Some(next) => next.start_time - Duration::minutes(options.pregame_minutes),
                None => {
                    let last_date = local_date(event.start_time, options.timezone);
                    local_midnight_utc(last_date + Duration::days(1), options.timezone)
                }
            };

            if event_end < postgame_end {
                let context = TemplateContext::for_filler(
                    next_event,
                    Some((*event).clone()),
                    Some(perspective.clone()),
                    team_stats.clone(),
                    options.timezone,
                )
                .with_time_format(options.time_format);

                let title = self.resolver.resolve(&template.postgame_title, &context);
                let mut programme =
                    Programme::new(&config.channel_id, &title, event_end, postgame_end);
                programme.description = template
                    .postgame_description
                    .as_deref()
                    .map(|f| self.resolver.resolve(f, &context))
                    .filter(|s| !s.is_empty());
                programme.icon = config.logo_url.clone();
                programmes.push(programme);
            }
        }

        programmes
    }
}

/// Enforce the per-channel non-overlap invariant on a sorted programme
/// list: each start is clamped to the previous stop; emptied windows are
/// dropped. Doubleheaders and back-to-back games otherwise overlap.
pub fn normalize_non_overlapping(programmes: Vec<Programme>) -> Vec<Programme> {
    let mut result: Vec<Programme> = Vec::with_capacity(programmes.len());
    let mut last_stop: Option<DateTime<Utc>> = None;

    for mut programme in programmes {
        if let Some(stop) = last_stop {
            if programme.start < stop {
                programme.start = stop;
            }
        }
        if programme.start >= programme.stop {
            continue;
        }
        last_stop = Some(programme.stop);
        result.push(programme);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn programme(start_hour: u32, stop_hour: u32) -> Programme {
        Programme::new(
            "teamarr-team-8",
            "test",
            Utc.with_ymd_and_hms(2025, 12, 14, start_hour, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 12, 14, stop_hour, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_normalize_clamps_overlaps() {
        let programmes = vec![programme(10, 14), programme(13, 16), programme(15, 18)];
        let normalized = normalize_non_overlapping(programmes);

        assert_eq!(normalized.len(), 3);
        for pair in normalized.windows(2) {
            assert!(pair[0].stop <= pair[1].start);
        }
        assert_eq!(
            normalized[1].start,
            Utc.with_ymd_and_hms(2025, 12, 14, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_normalize_drops_swallowed_programmes() {
        // Second programme fully inside the first collapses to nothing
        let programmes = vec![programme(10, 16), programme(12, 14), programme(16, 18)];
        let normalized = normalize_non_overlapping(programmes);
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn test_normalize_preserves_clean_sequences() {
        let programmes = vec![programme(10, 12), programme(12, 14)];
        let normalized = normalize_non_overlapping(programmes.clone());
        assert_eq!(normalized, programmes);
    }
}
