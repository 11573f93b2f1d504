//! Template string resolution
//!
//! Substitution is a single pass over the pre-scanned template: values
//! substituted into the output are never re-expanded, so resolution is
//! deterministic for a given (template, context) pair.

use regex::Regex;
use std::sync::OnceLock;

use super::context::{EventSlot, TemplateContext};
use super::registry::VariableRegistry;
use crate::models::{ConditionalDescription, EventState, Template};

/// Variables that are gracefully removable: when empty, surrounding
/// decorators like `(...)`, `[...]`, or `- ...` are elided with them.
const OPTIONAL_VARS: &[&str] = &["exception_keyword", "exception_keyword_title"];

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([a-z_][a-z0-9_]*)(?:\.([a-z]+))?\}").expect("placeholder regex is valid")
    })
}

pub struct TemplateResolver {
    registry: VariableRegistry,
}

impl TemplateResolver {
    pub fn new() -> Self {
        Self {
            registry: VariableRegistry::new(),
        }
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// Resolve all `{variable}` placeholders in a template. Unknown
    /// variables and unsupported suffixes resolve to empty; doubled
    /// spaces left by empty substitutions are collapsed.
    pub fn resolve(&self, template: &str, context: &TemplateContext) -> String {
        if template.is_empty() {
            return String::new();
        }

        let mut working = template.to_string();

        // Pass 1: elide decorators around empty optional variables
        for var_name in OPTIONAL_VARS {
            let value = self.extract(var_name, None, context);
            if value.is_empty() {
                let bracketed =
                    Regex::new(&format!(r"\s*[\(\[]\s*\{{{var_name}\}}\s*[\)\]]\s*"))
                        .expect("optional var regex is valid");
                working = bracketed.replace_all(&working, " ").to_string();

                let dashed = Regex::new(&format!(r"\s*[-–—]\s*\{{{var_name}\}}"))
                    .expect("optional var regex is valid");
                working = dashed.replace_all(&working, "").to_string();
            }
        }

        // Pass 2: substitute every remaining placeholder (one pass only)
        let result = placeholder_regex().replace_all(&working, |caps: &regex::Captures| {
            let name = &caps[1];
            let suffix = caps.get(2).map(|m| m.as_str());
            self.extract(name, suffix, context)
        });

        // Collapse doubled spaces left behind by empty values
        let collapse = Regex::new(r"  +").expect("collapse regex is valid");
        collapse.replace_all(result.trim(), " ").trim().to_string()
    }

    fn extract(&self, name: &str, suffix: Option<&str>, context: &TemplateContext) -> String {
        let slot = match suffix {
            None => EventSlot::Current,
            Some("next") => EventSlot::Next,
            Some("last") => EventSlot::Last,
            // Unsupported suffixes resolve to empty
            Some(_) => return String::new(),
        };

        match self.registry.get(name) {
            Some(def) => (def.extract)(context, slot),
            None => String::new(),
        }
    }

    /// Pick the description template for a programme: the lowest-priority
    /// option whose condition holds. Options without a condition always
    /// hold.
    pub fn select_description(
        &self,
        options: &[ConditionalDescription],
        context: &TemplateContext,
    ) -> Option<String> {
        let mut candidates: Vec<&ConditionalDescription> = options
            .iter()
            .filter(|opt| !opt.template.is_empty())
            .collect();
        candidates.sort_by_key(|opt| opt.priority);

        candidates
            .iter()
            .find(|opt| match &opt.condition {
                Some(condition) => self.evaluate_condition(condition, context),
                None => true,
            })
            .map(|opt| opt.template.clone())
    }

    /// Evaluate a simple `lhs == rhs` / `lhs != rhs` condition over the
    /// context. The left side is a variable name; the right side is a
    /// literal, with `today` resolving to the local date.
    pub fn evaluate_condition(&self, condition: &str, context: &TemplateContext) -> bool {
        let (lhs, rhs, negate) = if let Some((l, r)) = condition.split_once("!=") {
            (l, r, true)
        } else if let Some((l, r)) = condition.split_once("==") {
            (l, r, false)
        } else {
            return false;
        };

        let lhs = lhs.trim();
        let rhs = rhs.trim().trim_matches(|c| c == '"' || c == '\'');

        let left_value = self.extract(lhs, None, context).to_lowercase();
        let right_value = if rhs.eq_ignore_ascii_case("today") && lhs.contains("date") {
            // Compare local event date against today's local date
            let event_date = context
                .event_for(EventSlot::Current)
                .map(|e| crate::utils::time::local_date(e.start_time, context.timezone));
            let today = crate::utils::time::today_local(context.timezone);
            return match event_date {
                Some(date) => (date == today) != negate,
                None => negate,
            };
        } else {
            rhs.to_lowercase()
        };

        (left_value == right_value) != negate
    }

    /// Postgame description with the conditional two-way switch: when
    /// enabled, the final/not-final variants override the standard
    /// postgame description.
    pub fn postgame_description(
        &self,
        template: &Template,
        context: &TemplateContext,
    ) -> Option<String> {
        if template.postgame_conditional_enabled {
            let is_final = context
                .event_for(EventSlot::Current)
                .map(|e| e.status.state == EventState::Final)
                .unwrap_or(false);
            let selected = if is_final {
                template.postgame_description_final.clone()
            } else {
                template.postgame_description_not_final.clone()
            };
            return selected.filter(|s| !s.is_empty());
        }
        template
            .postgame_description
            .clone()
            .filter(|s| !s.is_empty())
    }
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventStatus, Team};
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

    fn scheduled_event() -> Event {
        Event {
            id: "401547".to_string(),
            provider: "espn".to_string(),
            name: "New York Giants at Dallas Cowboys".to_string(),
            short_name: "NYG @ DAL".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 12, 15, 0, 0, 0).unwrap(),
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

    fn ctx() -> TemplateContext {
        TemplateContext::for_event(scheduled_event(), parse_timezone("America/New_York"))
    }

    #[test]
    fn test_basic_substitution() {
        let resolver = TemplateResolver::new();
        let result = resolver.resolve("{away_team} @ {home_team}", &ctx());
        assert_eq!(result, "New York Giants @ Dallas Cowboys");
    }

    #[test]
    fn test_unknown_variable_resolves_empty() {
        let resolver = TemplateResolver::new();
        let result = resolver.resolve("{matchup} {no_such_var} tonight", &ctx());
        assert_eq!(result, "New York Giants @ Dallas Cowboys tonight");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = TemplateResolver::new();
        let template = "{matchup_abbrev} | {game_date_short}";
        let context = ctx();
        let first = resolver.resolve(template, &context);
        let second = resolver.resolve(template, &context);
        assert_eq!(first, second);
    }

    #[test]
    fn test_substituted_values_are_not_reexpanded() {
        let resolver = TemplateResolver::new();
        let mut context = ctx();
        // Stream name contains placeholder syntax; it must survive verbatim
        context.stream_name = Some("{home_team} raw feed".to_string());
        let result = resolver.resolve("{stream_name}", &context);
        assert_eq!(result, "{home_team} raw feed");
    }

    #[test]
    fn test_suffix_resolution() {
        let resolver = TemplateResolver::new();
        let mut next = scheduled_event();
        next.id = "401999".to_string();
        next.home_team = team("8", "Detroit Lions", "DET");
        next.away_team = team("6", "Dallas Cowboys", "DAL");

        let mut context = ctx();
        context.next_event = Some(next);

        assert_eq!(
            resolver.resolve("{home_team.next}", &context),
            "Detroit Lions"
        );
        // Unsupported suffix resolves to empty
        assert_eq!(resolver.resolve("x {home_team.previous} y", &context), "x y");
        // No .last event in context
        assert_eq!(resolver.resolve("a {home_team.last} b", &context), "a b");
    }

    #[test]
    fn test_optional_variable_elision() {
        let resolver = TemplateResolver::new();

        let without = resolver.resolve("{matchup_abbrev} ({exception_keyword_title})", &ctx());
        assert_eq!(without, "NYG @ DAL");

        let with_kw = ctx().with_exception_keyword(Some("spanish"));
        let resolved = resolver.resolve("{matchup_abbrev} ({exception_keyword_title})", &with_kw);
        assert_eq!(resolved, "NYG @ DAL (Spanish)");

        let dashed = resolver.resolve("{matchup_abbrev} - {exception_keyword}", &ctx());
        assert_eq!(dashed, "NYG @ DAL");
    }

    #[test]
    fn test_conditional_description_priority() {
        let resolver = TemplateResolver::new();
        let options = vec![
            ConditionalDescription {
                condition: Some("is_final == true".to_string()),
                template: "Final: {event_result}".to_string(),
                priority: 10,
            },
            ConditionalDescription {
                condition: None,
                template: "{matchup} at {venue}".to_string(),
                priority: 50,
            },
        ];

        // Scheduled game: the is_final option does not hold
        let selected = resolver.select_description(&options, &ctx()).unwrap();
        assert_eq!(selected, "{matchup} at {venue}");

        // Final game: lowest priority matching option wins
        let mut context = ctx();
        if let Some(event) = context.event.as_mut() {
            event.status.state = EventState::Final;
            event.home_score = Some(24);
            event.away_score = Some(17);
        }
        let selected = resolver.select_description(&options, &context).unwrap();
        assert_eq!(selected, "Final: {event_result}");
    }

    #[test]
    fn test_condition_negation() {
        let resolver = TemplateResolver::new();
        assert!(resolver.evaluate_condition("is_final != true", &ctx()));
        assert!(!resolver.evaluate_condition("is_final == true", &ctx()));
        assert!(resolver.evaluate_condition("status_state == scheduled", &ctx()));
    }

    #[test]
    fn test_postgame_conditional_switch() {
        let resolver = TemplateResolver::new();
        let mut template = Template {
            postgame_conditional_enabled: true,
            postgame_description: Some("standard".to_string()),
            postgame_description_final: Some("final recap".to_string()),
            postgame_description_not_final: Some("still playing".to_string()),
            ..Template::default()
        };

        let not_final = resolver.postgame_description(&template, &ctx());
        assert_eq!(not_final.as_deref(), Some("still playing"));

        let mut context = ctx();
        if let Some(event) = context.event.as_mut() {
            event.status.state = EventState::Final;
        }
        let final_desc = resolver.postgame_description(&template, &context);
        assert_eq!(final_desc.as_deref(), Some("final recap"));

        template.postgame_conditional_enabled = false;
        let standard = resolver.postgame_description(&template, &ctx());
        assert_eq!(standard.as_deref(), Some("standard"));
    }
}
