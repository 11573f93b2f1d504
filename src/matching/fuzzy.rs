//! Fuzzy team/event name matching
//!
//! Generates search patterns from canonical team names and scans free-text
//! stream titles for them. Scores are 0-100: longer patterns score higher,
//! matches aligned on word boundaries score higher than mid-word hits.

use std::collections::HashSet;

use crate::models::Team;

/// Known short-form aliases keyed by lowercased full team name.
/// Stream titles frequently use these instead of the canonical name.
const ABBREVIATIONS: &[(&str, &[&str])] = &[
    ("new york giants", &["ny giants", "nyg"]),
    ("new york jets", &["ny jets", "nyj"]),
    ("new england patriots", &["ne patriots", "pats"]),
    ("green bay packers", &["gb packers"]),
    ("san francisco 49ers", &["sf 49ers", "niners"]),
    ("tampa bay buccaneers", &["tb buccaneers", "bucs"]),
    ("kansas city chiefs", &["kc chiefs"]),
    ("los angeles lakers", &["la lakers"]),
    ("los angeles clippers", &["la clippers"]),
    ("los angeles rams", &["la rams"]),
    ("los angeles chargers", &["la chargers"]),
    ("los angeles kings", &["la kings"]),
    ("los angeles dodgers", &["la dodgers"]),
    ("golden state warriors", &["gs warriors", "gsw"]),
    ("oklahoma city thunder", &["okc thunder", "okc"]),
    ("san antonio spurs", &["sa spurs"]),
    ("washington commanders", &["commanders"]),
    ("vegas golden knights", &["vgk"]),
];

/// Tokens that are safe to strip from a team name when only the city is
/// meaningful in a stream title. Two-word mascots are listed as a single
/// entry and checked against the trailing two tokens.
const MASCOT_WORDS: &[&str] = &[
    "lions", "bears", "packers", "vikings", "cowboys", "giants", "eagles", "commanders",
    "patriots", "bills", "dolphins", "jets", "steelers", "ravens", "browns", "bengals",
    "titans", "colts", "texans", "jaguars", "chiefs", "broncos", "raiders", "chargers",
    "rams", "49ers", "seahawks", "cardinals", "falcons", "panthers", "saints", "buccaneers",
    "lakers", "celtics", "warriors", "nets", "knicks", "bulls", "heat", "bucks", "suns",
    "mavericks", "nuggets", "clippers", "rockets", "spurs", "thunder", "jazz", "kings",
    "pelicans", "grizzlies", "timberwolves", "hawks", "hornets", "pistons", "pacers",
    "cavaliers", "raptors", "wizards", "magic", "seventysixers", "76ers",
    "bruins", "canadiens", "rangers", "islanders", "flyers", "penguins", "capitals",
    "hurricanes", "lightning", "sabres", "senators", "devils", "blackhawks", "avalanche",
    "wild", "blues", "stars", "predators", "jets", "flames", "oilers", "canucks",
    "sharks", "ducks", "kraken", "yankees", "mets", "dodgers", "padres", "angels",
    "astros", "mariners", "athletics", "rockies", "diamondbacks", "braves", "marlins",
    "phillies", "nationals", "cubs", "reds", "brewers", "pirates", "orioles", "guardians",
    "tigers", "royals", "twins",
    // Two-word mascots
    "red sox", "white sox", "blue jays", "maple leafs", "red wings", "golden knights",
    "trail blazers",
];

/// Result of a pattern scan.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// 0-100; 0 when unmatched.
    pub score: f64,
    /// The pattern that produced the best score.
    pub pattern: Option<String>,
}

impl MatchResult {
    fn unmatched() -> Self {
        Self {
            matched: false,
            score: 0.0,
            pattern: None,
        }
    }
}

/// Pattern generator and scorer. Pure and synchronous.
#[derive(Debug, Default, Clone)]
pub struct FuzzyMatcher;

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Generate a deduplicated, lowercased set of search patterns for a
    /// team: full name, short name, abbreviation, name minus mascot,
    /// mascot alone, and known aliases. Patterns shorter than two
    /// characters are dropped.
    pub fn generate_team_patterns(&self, team: &Team) -> Vec<String> {
        let mut candidates: Vec<String> = vec![
            team.name.clone(),
            team.short_name.clone(),
            team.abbreviation.clone(),
        ];

        let name_lower = team.name.to_lowercase();

        if let Some((city, mascot)) = split_mascot(&name_lower) {
            candidates.push(city);
            candidates.push(mascot);
        }

        for (full_name, aliases) in ABBREVIATIONS {
            if *full_name == name_lower {
                candidates.extend(aliases.iter().map(|a| a.to_string()));
            }
        }

        unique_patterns(&candidates)
    }

    /// Generate patterns for a free event name ("UFC Fight Night: Royval
    /// vs. Kape"). Names containing ":" also yield the prefix alone to
    /// support tier-2 matching.
    pub fn generate_event_patterns(&self, name: &str, short_name: &str) -> Vec<String> {
        unique_patterns(&[name.to_string(), short_name.to_string()])
    }

    /// Scan a haystack (already lowercased stream title) for any pattern.
    /// Returns the best-scoring hit.
    pub fn matches_any(&self, patterns: &[String], haystack: &str) -> MatchResult {
        let haystack = haystack.to_lowercase();
        let mut best = MatchResult::unmatched();

        for pattern in patterns {
            if let Some(score) = pattern_score(pattern, &haystack) {
                if score > best.score {
                    best = MatchResult {
                        matched: true,
                        score,
                        pattern: Some(pattern.clone()),
                    };
                }
            }
        }

        best
    }
}

/// Split a lowercased team name into (city, mascot) when the trailing
/// token(s) are a known mascot. Checks two-word mascots first.
fn split_mascot(name_lower: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = name_lower.split_whitespace().collect();
    if tokens.len() < 2 {
        return None;
    }

    if tokens.len() >= 3 {
        let last_two = format!("{} {}", tokens[tokens.len() - 2], tokens[tokens.len() - 1]);
        if MASCOT_WORDS.contains(&last_two.as_str()) {
            let city = tokens[..tokens.len() - 2].join(" ");
            return Some((city, last_two));
        }
    }

    let last = tokens[tokens.len() - 1];
    if MASCOT_WORDS.contains(&last) {
        let city = tokens[..tokens.len() - 1].join(" ");
        return Some((city, last.to_string()));
    }

    None
}

/// Normalize, dedupe, and length-filter pattern candidates. Adds the
/// colon prefix of any candidate containing ":".
fn unique_patterns(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for value in values {
        let lower = value.trim().to_lowercase();
        if lower.len() >= 2 && seen.insert(lower.clone()) {
            result.push(lower.clone());
        }

        if let Some(prefix) = lower.split(':').next() {
            let prefix = prefix.trim().to_string();
            if prefix != lower && prefix.len() >= 2 && seen.insert(prefix.clone()) {
                result.push(prefix);
            }
        }
    }

    result
}

/// Score a single pattern against the haystack, or None when absent.
///
/// Longer patterns carry more information and score higher; matches that
/// sit on word boundaries beat mid-word hits ("nyg" inside "anything").
fn pattern_score(pattern: &str, haystack: &str) -> Option<f64> {
    let start = haystack.find(pattern)?;
    let end = start + pattern.len();

    let boundary_start = start == 0
        || !haystack[..start]
            .chars()
            .next_back()
            .map(|c| c.is_alphanumeric())
            .unwrap_or(false);
    let boundary_end = end == haystack.len()
        || !haystack[end..]
            .chars()
            .next()
            .map(|c| c.is_alphanumeric())
            .unwrap_or(false);

    let length_bonus = (pattern.len() as f64 * 2.0).min(35.0);
    let mut score = 60.0 + length_bonus;
    if !boundary_start || !boundary_end {
        score -= 25.0;
    }

    Some(score.clamp(1.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(name: &str, short: &str, abbrev: &str) -> Team {
        Team {
            id: "1".to_string(),
            provider: "espn".to_string(),
            name: name.to_string(),
            short_name: short.to_string(),
            abbreviation: abbrev.to_string(),
            league: "nfl".to_string(),
            sport: "football".to_string(),
            logo_url: None,
            color: None,
        }
    }

    #[test]
    fn test_generate_team_patterns_includes_city_and_mascot() {
        let matcher = FuzzyMatcher::new();
        let patterns = matcher.generate_team_patterns(&team("Detroit Lions", "Lions", "DET"));

        assert!(patterns.contains(&"detroit lions".to_string()));
        assert!(patterns.contains(&"lions".to_string()));
        assert!(patterns.contains(&"detroit".to_string()));
        assert!(patterns.contains(&"det".to_string()));
    }

    #[test]
    fn test_generate_team_patterns_two_word_mascot() {
        let matcher = FuzzyMatcher::new();
        let patterns = matcher.generate_team_patterns(&team("Boston Red Sox", "Red Sox", "BOS"));

        assert!(patterns.contains(&"red sox".to_string()));
        assert!(patterns.contains(&"boston".to_string()));
    }

    #[test]
    fn test_generate_team_patterns_aliases() {
        let matcher = FuzzyMatcher::new();
        let patterns =
            matcher.generate_team_patterns(&team("New York Giants", "Giants", "NYG"));
        assert!(patterns.contains(&"ny giants".to_string()));
    }

    #[test]
    fn test_pattern_generation_is_idempotent() {
        let matcher = FuzzyMatcher::new();
        let team = team("Detroit Lions", "Lions", "DET");
        let once = matcher.generate_team_patterns(&team);
        let doubled: Vec<String> = once.iter().chain(once.iter()).cloned().collect();
        assert_eq!(unique_patterns(&doubled), once);
    }

    #[test]
    fn test_event_patterns_colon_prefix() {
        let matcher = FuzzyMatcher::new();
        let patterns = matcher
            .generate_event_patterns("UFC Fight Night: Royval vs. Kape", "Royval vs. Kape");
        assert!(patterns.contains(&"ufc fight night: royval vs. kape".to_string()));
        assert!(patterns.contains(&"ufc fight night".to_string()));
        assert!(patterns.contains(&"royval vs. kape".to_string()));
    }

    #[test]
    fn test_matches_any_boundary_beats_midword() {
        let matcher = FuzzyMatcher::new();
        let patterns = vec!["lions".to_string()];

        let clean = matcher.matches_any(&patterns, "lions vs bears");
        let midword = matcher.matches_any(&patterns, "stallions game");

        assert!(clean.matched);
        assert!(midword.matched);
        assert!(clean.score > midword.score);
    }

    #[test]
    fn test_matches_any_prefers_longer_pattern() {
        let matcher = FuzzyMatcher::new();
        let patterns = vec!["detroit".to_string(), "detroit lions".to_string()];
        let result = matcher.matches_any(&patterns, "NFL: Detroit Lions @ Chicago Bears");
        assert_eq!(result.pattern.as_deref(), Some("detroit lions"));
    }

    #[test]
    fn test_matches_any_unmatched() {
        let matcher = FuzzyMatcher::new();
        let result = matcher.matches_any(&["packers".to_string()], "cowboys vs giants");
        assert!(!result.matched);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_patterns_dedupe_and_length_filter() {
        let patterns = unique_patterns(&[
            "Lions".to_string(),
            "lions".to_string(),
            "a".to_string(),
            "".to_string(),
        ]);
        assert_eq!(patterns, vec!["lions".to_string()]);
    }
}
