//! Template variable registry
//!
//! Named extractors grouped by category. Each extractor is a pure
//! function over the context and an event slot; the slot is how
//! `.next`/`.last` suffixes resolve against neighbor events. Variables
//! that cannot be computed resolve to the empty string.

use std::collections::HashMap;

use super::context::{EventSlot, TemplateContext};
use crate::models::{Event, EventState};
use crate::utils::time::{
    format_date_long, format_date_short, format_time, today_tonight, to_local,
};
use crate::utils::to_pascal_case;

/// Variable category, used for registry organization and docs surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Team,
    Opponent,
    Event,
    Venue,
    DateTime,
    Score,
    Odds,
    Broadcast,
    Stream,
    Exception,
}

type Extractor = fn(&TemplateContext, EventSlot) -> String;

pub struct VariableDefinition {
    pub category: Category,
    pub extract: Extractor,
}

/// Per-sport regulation period counts. Periods beyond the threshold mean
/// overtime.
pub fn regulation_threshold(sport: &str) -> u32 {
    match sport.to_ascii_lowercase().as_str() {
        "basketball" => 4,
        "hockey" => 3,
        "football" => 4,
        "baseball" => 9,
        _ => 4,
    }
}

fn event_str<F>(ctx: &TemplateContext, slot: EventSlot, f: F) -> String
where
    F: Fn(&Event) -> String,
{
    ctx.event_for(slot).map(f).unwrap_or_default()
}

fn is_event_final(event: &Event) -> bool {
    event.status.state == EventState::Final
}

fn scores(event: &Event) -> (i32, i32) {
    (event.home_score.unwrap_or(0), event.away_score.unwrap_or(0))
}

fn winner_loser(event: &Event) -> Option<(String, String, String, String)> {
    if !is_event_final(event) {
        return None;
    }
    let (home, away) = scores(event);
    if home == 0 && away == 0 {
        return None;
    }
    if home > away {
        Some((
            event.home_team.name.clone(),
            event.home_team.abbreviation.clone(),
            event.away_team.name.clone(),
            event.away_team.abbreviation.clone(),
        ))
    } else if away > home {
        Some((
            event.away_team.name.clone(),
            event.away_team.abbreviation.clone(),
            event.home_team.name.clone(),
            event.home_team.abbreviation.clone(),
        ))
    } else {
        Some((
            "Tie".to_string(),
            "TIE".to_string(),
            "Tie".to_string(),
            "TIE".to_string(),
        ))
    }
}

/// "in overtime" when the final period count exceeds the sport's
/// regulation threshold, empty otherwise.
pub fn overtime_text(event: &Event) -> String {
    if !is_event_final(event) {
        return String::new();
    }
    let periods = event.status.period.unwrap_or(0);
    if periods > regulation_threshold(&event.sport) {
        "in overtime".to_string()
    } else {
        String::new()
    }
}

fn opponent_of<'e>(ctx: &TemplateContext, event: &'e Event) -> Option<&'e crate::models::Team> {
    match ctx.is_home(event)? {
        true => Some(&event.away_team),
        false => Some(&event.home_team),
    }
}

pub struct VariableRegistry {
    variables: HashMap<&'static str, VariableDefinition>,
}

impl VariableRegistry {
    pub fn get(&self, name: &str) -> Option<&VariableDefinition> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn names_in_category(&self, category: Category) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .variables
            .iter()
            .filter(|(_, def)| def.category == category)
            .map(|(name, _)| *name)
            .collect();
        names.sort();
        names
    }

    fn register(&mut self, name: &'static str, category: Category, extract: Extractor) {
        self.variables
            .insert(name, VariableDefinition { category, extract });
    }

    pub fn new() -> Self {
        let mut registry = Self {
            variables: HashMap::new(),
        };
        registry.install();
        registry
    }

    #[allow(clippy::too_many_lines)]
    fn install(&mut self) {
        // Event identification
        self.register("event_name", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| {
                if e.short_name.is_empty() {
                    e.name.clone()
                } else {
                    e.short_name.clone()
                }
            })
        });
        self.register("matchup", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| {
                format!("{} @ {}", e.away_team.name, e.home_team.name)
            })
        });
        self.register("matchup_abbrev", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| {
                format!("{} @ {}", e.away_team.abbreviation, e.home_team.abbreviation)
            })
        });
        self.register("league", Category::Event, |ctx, slot| {
            ctx.league_display.clone().unwrap_or_else(|| {
                event_str(ctx, slot, |e| e.league.to_uppercase())
            })
        });
        self.register("league_id", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.league.clone())
        });
        self.register("sport", Category::Event, |ctx, slot| {
            ctx.sport_display.clone().unwrap_or_else(|| {
                event_str(ctx, slot, |e| {
                    let mut chars = e.sport.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    }
                })
            })
        });
        self.register("status_detail", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.status.detail.clone().unwrap_or_default())
        });
        self.register("status_state", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.status.state.as_str().to_string())
        });
        self.register("is_final", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| {
                if is_event_final(e) { "true" } else { "false" }.to_string()
            })
        });
        self.register("channel_id", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| format!("teamarr-event-{}", e.id))
        });

        // Home team (positional)
        self.register("home_team", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.home_team.name.clone())
        });
        self.register("home_team_abbrev", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.home_team.abbreviation.clone())
        });
        self.register("home_team_abbrev_lower", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.home_team.abbreviation.to_lowercase())
        });
        self.register("home_team_pascal", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| to_pascal_case(&e.home_team.name))
        });
        self.register("home_team_logo", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.home_team.logo_url.clone().unwrap_or_default())
        });

        // Away team (positional)
        self.register("away_team", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.away_team.name.clone())
        });
        self.register("away_team_abbrev", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.away_team.abbreviation.clone())
        });
        self.register("away_team_abbrev_lower", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.away_team.abbreviation.to_lowercase())
        });
        self.register("away_team_pascal", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| to_pascal_case(&e.away_team.name))
        });
        self.register("away_team_logo", Category::Event, |ctx, slot| {
            event_str(ctx, slot, |e| e.away_team.logo_url.clone().unwrap_or_default())
        });

        // Team perspective (team channels)
        self.register("team_name", Category::Team, |ctx, _| {
            ctx.team.as_ref().map(|t| t.team_name.clone()).unwrap_or_default()
        });
        self.register("team_abbrev", Category::Team, |ctx, _| {
            ctx.team.as_ref().map(|t| t.team_abbrev.clone()).unwrap_or_default()
        });
        self.register("team_logo", Category::Team, |ctx, _| {
            ctx.team
                .as_ref()
                .and_then(|t| t.logo_url.clone())
                .unwrap_or_default()
        });
        self.register("team_record", Category::Team, |ctx, _| {
            ctx.team_stats.as_ref().map(|s| s.record.clone()).unwrap_or_default()
        });
        self.register("team_streak", Category::Team, |ctx, _| {
            ctx.team_stats
                .as_ref()
                .and_then(|s| s.streak.clone())
                .unwrap_or_default()
        });
        self.register("home_away", Category::Team, |ctx, slot| {
            ctx.event_for(slot)
                .and_then(|e| ctx.is_home(e))
                .map(|home| if home { "home" } else { "away" }.to_string())
                .unwrap_or_default()
        });

        // Opponent (team channels)
        self.register("opponent", Category::Opponent, |ctx, slot| {
            ctx.event_for(slot)
                .and_then(|e| opponent_of(ctx, e))
                .map(|t| t.name.clone())
                .unwrap_or_default()
        });
        self.register("opponent_abbrev", Category::Opponent, |ctx, slot| {
            ctx.event_for(slot)
                .and_then(|e| opponent_of(ctx, e))
                .map(|t| t.abbreviation.clone())
                .unwrap_or_default()
        });
        self.register("opponent_logo", Category::Opponent, |ctx, slot| {
            ctx.event_for(slot)
                .and_then(|e| opponent_of(ctx, e))
                .and_then(|t| t.logo_url.clone())
                .unwrap_or_default()
        });

        // Venue
        self.register("venue", Category::Venue, |ctx, slot| {
            event_str(ctx, slot, |e| {
                e.venue.as_ref().map(|v| v.name.clone()).unwrap_or_default()
            })
        });
        self.register("venue_city", Category::Venue, |ctx, slot| {
            event_str(ctx, slot, |e| {
                e.venue
                    .as_ref()
                    .and_then(|v| v.city.clone())
                    .unwrap_or_default()
            })
        });
        self.register("venue_state", Category::Venue, |ctx, slot| {
            event_str(ctx, slot, |e| {
                e.venue
                    .as_ref()
                    .and_then(|v| v.state.clone())
                    .unwrap_or_default()
            })
        });
        self.register("venue_full", Category::Venue, |ctx, slot| {
            event_str(ctx, slot, |e| {
                let Some(venue) = e.venue.as_ref() else {
                    return String::new();
                };
                match (&venue.city, &venue.state) {
                    (Some(city), Some(state)) => format!("{}, {}, {}", venue.name, city, state),
                    (Some(city), None) => format!("{}, {}", venue.name, city),
                    _ => venue.name.clone(),
                }
            })
        });

        // Date & time
        self.register("game_date", Category::DateTime, |ctx, slot| {
            event_str(ctx, slot, |e| {
                format_date_long(&to_local(e.start_time, ctx.timezone))
            })
        });
        self.register("game_date_short", Category::DateTime, |ctx, slot| {
            event_str(ctx, slot, |e| {
                format_date_short(&to_local(e.start_time, ctx.timezone))
            })
        });
        self.register("game_time", Category::DateTime, |ctx, slot| {
            event_str(ctx, slot, |e| {
                format_time(&to_local(e.start_time, ctx.timezone), ctx.time_format)
            })
        });
        self.register("game_day", Category::DateTime, |ctx, slot| {
            event_str(ctx, slot, |e| {
                to_local(e.start_time, ctx.timezone).format("%A").to_string()
            })
        });
        self.register("game_day_short", Category::DateTime, |ctx, slot| {
            event_str(ctx, slot, |e| {
                to_local(e.start_time, ctx.timezone).format("%a").to_string()
            })
        });
        self.register("today_tonight", Category::DateTime, |ctx, slot| {
            event_str(ctx, slot, |e| {
                today_tonight(&to_local(e.start_time, ctx.timezone)).to_string()
            })
        });
        self.register("today_tonight_title", Category::DateTime, |ctx, slot| {
            event_str(ctx, slot, |e| {
                let word = today_tonight(&to_local(e.start_time, ctx.timezone));
                let mut chars = word.chars();
                chars
                    .next()
                    .map(|c| c.to_uppercase().chain(chars).collect())
                    .unwrap_or_default()
            })
        });

        // Scores & results
        self.register("home_team_score", Category::Score, |ctx, slot| {
            event_str(ctx, slot, |e| scores(e).0.to_string())
        });
        self.register("away_team_score", Category::Score, |ctx, slot| {
            event_str(ctx, slot, |e| scores(e).1.to_string())
        });
        self.register("event_result", Category::Score, |ctx, slot| {
            event_str(ctx, slot, |e| {
                if winner_loser(e).is_none() {
                    return String::new();
                }
                let (home, away) = scores(e);
                format!(
                    "{} {} - {} {}",
                    e.home_team.name, home, e.away_team.name, away
                )
            })
        });
        self.register("event_result_abbrev", Category::Score, |ctx, slot| {
            event_str(ctx, slot, |e| {
                if winner_loser(e).is_none() {
                    return String::new();
                }
                let (home, away) = scores(e);
                format!(
                    "{} {} - {} {}",
                    e.home_team.abbreviation, home, e.away_team.abbreviation, away
                )
            })
        });
        self.register("winner", Category::Score, |ctx, slot| {
            event_str(ctx, slot, |e| {
                winner_loser(e).map(|(w, _, _, _)| w).unwrap_or_default()
            })
        });
        self.register("winner_abbrev", Category::Score, |ctx, slot| {
            event_str(ctx, slot, |e| {
                winner_loser(e).map(|(_, w, _, _)| w).unwrap_or_default()
            })
        });
        self.register("loser", Category::Score, |ctx, slot| {
            event_str(ctx, slot, |e| {
                winner_loser(e).map(|(_, _, l, _)| l).unwrap_or_default()
            })
        });
        self.register("loser_abbrev", Category::Score, |ctx, slot| {
            event_str(ctx, slot, |e| {
                winner_loser(e).map(|(_, _, _, l)| l).unwrap_or_default()
            })
        });
        self.register("final_score", Category::Score, |ctx, slot| {
            // Team-perspective result: "W 24-17" / "L 17-24"
            ctx.event_for(slot)
                .and_then(|e| {
                    let home = ctx.is_home(e)?;
                    if !is_event_final(e) {
                        return Some(String::new());
                    }
                    let (home_score, away_score) = scores(e);
                    let (ours, theirs) = if home {
                        (home_score, away_score)
                    } else {
                        (away_score, home_score)
                    };
                    let prefix = if ours > theirs {
                        "W"
                    } else if ours < theirs {
                        "L"
                    } else {
                        "T"
                    };
                    Some(format!("{prefix} {ours}-{theirs}"))
                })
                .unwrap_or_default()
        });
        self.register("overtime_text", Category::Score, |ctx, slot| {
            event_str(ctx, slot, overtime_text)
        });

        // Odds
        self.register("odds_spread", Category::Odds, |ctx, slot| {
            event_str(ctx, slot, |e| {
                e.odds
                    .as_ref()
                    .and_then(|o| o.spread.clone())
                    .unwrap_or_default()
            })
        });
        self.register("odds_over_under", Category::Odds, |ctx, slot| {
            event_str(ctx, slot, |e| {
                e.odds
                    .as_ref()
                    .and_then(|o| o.over_under.clone())
                    .unwrap_or_default()
            })
        });
        self.register("odds_provider", Category::Odds, |ctx, slot| {
            event_str(ctx, slot, |e| {
                e.odds
                    .as_ref()
                    .and_then(|o| o.provider.clone())
                    .unwrap_or_default()
            })
        });

        // Broadcast
        self.register("broadcast_simple", Category::Broadcast, |ctx, slot| {
            event_str(ctx, slot, |e| {
                e.broadcasts
                    .iter()
                    .take(3)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            })
        });
        self.register("broadcast_network", Category::Broadcast, |ctx, slot| {
            event_str(ctx, slot, |e| e.broadcasts.first().cloned().unwrap_or_default())
        });

        // Stream
        self.register("stream_name", Category::Stream, |ctx, _| {
            ctx.stream_name.clone().unwrap_or_default()
        });
        self.register("stream_id", Category::Stream, |ctx, _| {
            ctx.stream_id.clone().unwrap_or_default()
        });

        // Exception routing
        self.register("exception_keyword", Category::Exception, |ctx, _| {
            ctx.exception_keyword.clone().unwrap_or_default()
        });
        self.register("exception_keyword_title", Category::Exception, |ctx, _| {
            ctx.exception_keyword
                .as_deref()
                .map(title_case)
                .unwrap_or_default()
        });
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// "prime vision" -> "Prime Vision"
fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, Team};
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

    fn final_event(home_score: i32, away_score: i32, period: u32) -> crate::models::Event {
        crate::models::Event {
            id: "401547".to_string(),
            provider: "espn".to_string(),
            name: "New York Giants at Dallas Cowboys".to_string(),
            short_name: "NYG @ DAL".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 12, 14, 18, 0, 0).unwrap(),
            home_team: team("6", "Dallas Cowboys", "DAL"),
            away_team: team("19", "New York Giants", "NYG"),
            status: EventStatus {
                state: EventState::Final,
                detail: Some("Final".to_string()),
                period: Some(period),
                clock: None,
            },
            league: "nfl".to_string(),
            sport: "football".to_string(),
            home_score: Some(home_score),
            away_score: Some(away_score),
            venue: None,
            broadcasts: vec!["FOX".to_string(), "NFL+".to_string()],
            season_year: None,
            season_type: None,
            odds: None,
            main_card_start: None,
        }
    }

    #[test]
    fn test_winner_loser_variables() {
        let registry = VariableRegistry::new();
        let ctx = TemplateContext::for_event(
            final_event(24, 17, 4),
            crate::utils::time::parse_timezone("America/New_York"),
        );

        let winner = (registry.get("winner").unwrap().extract)(&ctx, EventSlot::Current);
        let loser = (registry.get("loser").unwrap().extract)(&ctx, EventSlot::Current);
        assert_eq!(winner, "Dallas Cowboys");
        assert_eq!(loser, "New York Giants");

        let result = (registry.get("event_result").unwrap().extract)(&ctx, EventSlot::Current);
        assert_eq!(result, "Dallas Cowboys 24 - New York Giants 17");
    }

    #[test]
    fn test_overtime_text_threshold() {
        // Regulation: 4 periods of football, no overtime text
        assert_eq!(overtime_text(&final_event(24, 17, 4)), "");
        // 5th period is overtime
        assert_eq!(overtime_text(&final_event(27, 24, 5)), "in overtime");
    }

    #[test]
    fn test_overtime_requires_final() {
        let mut event = final_event(10, 10, 5);
        event.status.state = EventState::Live;
        assert_eq!(overtime_text(&event), "");
    }

    #[test]
    fn test_broadcast_variables() {
        let registry = VariableRegistry::new();
        let ctx = TemplateContext::for_event(
            final_event(24, 17, 4),
            crate::utils::time::parse_timezone("America/New_York"),
        );
        let simple =
            (registry.get("broadcast_simple").unwrap().extract)(&ctx, EventSlot::Current);
        assert_eq!(simple, "FOX, NFL+");
        let network =
            (registry.get("broadcast_network").unwrap().extract)(&ctx, EventSlot::Current);
        assert_eq!(network, "FOX");
    }

    #[test]
    fn test_missing_slot_resolves_empty() {
        let registry = VariableRegistry::new();
        let ctx = TemplateContext::for_event(
            final_event(24, 17, 4),
            crate::utils::time::parse_timezone("America/New_York"),
        );
        let next = (registry.get("matchup").unwrap().extract)(&ctx, EventSlot::Next);
        assert_eq!(next, "");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("prime vision"), "Prime Vision");
        assert_eq!(title_case("spanish"), "Spanish");
    }

    #[test]
    fn test_category_listing() {
        let registry = VariableRegistry::new();
        let names = registry.names_in_category(Category::Exception);
        assert_eq!(names, vec!["exception_keyword", "exception_keyword_title"]);
    }
}
