//! Stream-to-event matching
//!
//! Events→streams approach: fetch the league's events for the target
//! date, generate search patterns from each event's team names, then scan
//! each stream title for those patterns. Exception keywords are checked
//! first and route the stream elsewhere - a hit is a distinct outcome,
//! not a failure.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::fuzzy::FuzzyMatcher;
use crate::errors::AppResult;
use crate::models::Event;
use crate::providers::SportsDataService;

/// Scores below this are rejected outright.
const MIN_MATCH_SCORE: f64 = 0.5;

/// Confidence assigned to single-event-league keyword matches.
const LEAGUE_KEYWORD_SCORE: f64 = 80.0;

/// Leagues that typically hold one event per day; a league keyword in the
/// stream title is enough to match when exactly one event is scheduled.
const SINGLE_EVENT_LEAGUES: &[(&str, &[&str])] = &[("ufc", &["ufc", "fight night", "mma"])];

/// How a match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionTier {
    /// Fingerprint cache hit; no fuzzy work performed.
    Cache,
    /// Both team patterns hit (strategy A).
    Teams,
    /// Event-name pattern hit (strategy B).
    EventName,
    /// Single-event-league keyword shortcut.
    LeagueKeyword,
}

/// Result of a stream-to-event match.
#[derive(Debug, Clone)]
pub struct StreamMatchResult {
    pub stream_id: String,
    pub stream_name: String,
    pub event: Option<Event>,
    pub league: String,
    pub matched: bool,
    pub match_score: f64,
    pub exception_keyword: Option<String>,
    pub detection_tier: Option<DetectionTier>,
    pub from_cache: bool,
}

impl StreamMatchResult {
    pub fn unmatched(stream_id: &str, stream_name: &str, league: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            stream_name: stream_name.to_string(),
            event: None,
            league: league.to_string(),
            matched: false,
            match_score: 0.0,
            exception_keyword: None,
            detection_tier: None,
            from_cache: false,
        }
    }

    pub fn exception(stream_id: &str, stream_name: &str, league: &str, keyword: &str) -> Self {
        Self {
            exception_keyword: Some(keyword.to_string()),
            ..Self::unmatched(stream_id, stream_name, league)
        }
    }

    /// True if the stream was routed away by an exception keyword.
    pub fn is_exception(&self) -> bool {
        self.exception_keyword.is_some()
    }
}

/// Result of matching a batch of streams.
#[derive(Debug, Clone)]
pub struct BatchMatchResult {
    pub results: Vec<StreamMatchResult>,
    pub events_found: usize,
    pub streams_matched: usize,
    pub exception_hits: usize,
    pub streams_total: usize,
}

impl BatchMatchResult {
    pub fn match_rate(&self) -> f64 {
        if self.streams_total == 0 {
            return 0.0;
        }
        self.streams_matched as f64 / self.streams_total as f64 * 100.0
    }
}

struct EventPatterns {
    home: Vec<String>,
    away: Vec<String>,
    event_name: Vec<String>,
}

/// Matches streams to events for a single known league.
///
/// Patterns are built once per target date and cached in-memory, so
/// batch matching fetches events exactly once.
pub struct SingleLeagueMatcher<'a> {
    service: &'a SportsDataService,
    league: String,
    exception_keywords: Vec<String>,
    fuzzy: FuzzyMatcher,
    events: Vec<Event>,
    patterns: Vec<EventPatterns>,
    cache_date: Option<NaiveDate>,
}

impl<'a> SingleLeagueMatcher<'a> {
    pub fn new(
        service: &'a SportsDataService,
        league: &str,
        exception_keywords: &[String],
    ) -> Self {
        Self {
            service,
            league: league.to_string(),
            exception_keywords: exception_keywords.iter().map(|k| k.to_lowercase()).collect(),
            fuzzy: FuzzyMatcher::new(),
            events: Vec::new(),
            patterns: Vec::new(),
            cache_date: None,
        }
    }

    /// Match a single stream name against the league's events.
    pub async fn match_stream(
        &mut self,
        stream_id: &str,
        stream_name: &str,
        target_date: NaiveDate,
    ) -> AppResult<StreamMatchResult> {
        let stream_lower = stream_name.to_lowercase();

        for keyword in &self.exception_keywords {
            if stream_lower.contains(keyword.as_str()) {
                return Ok(StreamMatchResult::exception(
                    stream_id,
                    stream_name,
                    &self.league,
                    keyword,
                ));
            }
        }

        self.build_patterns(target_date).await?;

        let Some((event_index, score, tier)) = self.find_matching_event(&stream_lower) else {
            return Ok(StreamMatchResult::unmatched(
                stream_id,
                stream_name,
                &self.league,
            ));
        };

        Ok(StreamMatchResult {
            stream_id: stream_id.to_string(),
            stream_name: stream_name.to_string(),
            event: Some(self.events[event_index].clone()),
            league: self.league.clone(),
            matched: true,
            match_score: score,
            exception_keyword: None,
            detection_tier: Some(tier),
            from_cache: false,
        })
    }

    /// Match multiple streams efficiently: patterns are built once, then
    /// every stream is scanned against them.
    pub async fn match_batch(
        &mut self,
        streams: &[(String, String)],
        target_date: NaiveDate,
    ) -> AppResult<BatchMatchResult> {
        self.build_patterns(target_date).await?;

        let mut results = Vec::with_capacity(streams.len());
        let mut matched_count = 0;
        let mut exception_hits = 0;

        for (stream_id, stream_name) in streams {
            let result = self.match_stream(stream_id, stream_name, target_date).await?;
            if result.matched {
                matched_count += 1;
            }
            if result.is_exception() {
                exception_hits += 1;
            }
            results.push(result);
        }

        Ok(BatchMatchResult {
            events_found: self.events.len(),
            streams_matched: matched_count,
            exception_hits,
            streams_total: streams.len(),
            results,
        })
    }

    /// Number of events scheduled for the cached date.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub async fn build_patterns(&mut self, target_date: NaiveDate) -> AppResult<()> {
        if self.cache_date == Some(target_date) {
            return Ok(());
        }

        self.events = self.service.get_events(&self.league, target_date).await?;
        self.patterns = self
            .events
            .iter()
            .map(|event| EventPatterns {
                home: self.fuzzy.generate_team_patterns(&event.home_team),
                away: self.fuzzy.generate_team_patterns(&event.away_team),
                event_name: self
                    .fuzzy
                    .generate_event_patterns(&event.name, &event.short_name),
            })
            .collect();
        self.cache_date = Some(target_date);

        debug!(
            "Built patterns for {} event(s) in {} on {}",
            self.events.len(),
            self.league,
            target_date
        );
        Ok(())
    }

    pub fn clear_cache(&mut self) {
        self.events.clear();
        self.patterns.clear();
        self.cache_date = None;
    }

    /// Strategy A first (both teams must hit; score is their mean), then
    /// strategy B (event name alone). Ties break to the smaller event id
    /// so batch output is deterministic.
    fn find_matching_event(&self, stream_lower: &str) -> Option<(usize, f64, DetectionTier)> {
        let mut best: Option<(usize, f64)> = None;

        for (i, patterns) in self.patterns.iter().enumerate() {
            let home = self.fuzzy.matches_any(&patterns.home, stream_lower);
            if !home.matched {
                continue;
            }
            let away = self.fuzzy.matches_any(&patterns.away, stream_lower);
            if !away.matched {
                continue;
            }

            let combined = (home.score + away.score) / 2.0;
            if combined < MIN_MATCH_SCORE {
                continue;
            }
            best = match best {
                Some((bi, bs)) if combined < bs => Some((bi, bs)),
                Some((bi, bs)) if combined == bs && self.events[bi].id <= self.events[i].id => {
                    Some((bi, bs))
                }
                _ => Some((i, combined)),
            };
        }

        if let Some((index, score)) = best {
            return Some((index, score, DetectionTier::Teams));
        }

        // Strategy B: event-name match (UFC, boxing, etc.)
        let mut best_name: Option<(usize, f64)> = None;
        for (i, patterns) in self.patterns.iter().enumerate() {
            let hit = self.fuzzy.matches_any(&patterns.event_name, stream_lower);
            if !hit.matched || hit.score < MIN_MATCH_SCORE {
                continue;
            }
            best_name = match best_name {
                Some((bi, bs)) if hit.score < bs => Some((bi, bs)),
                Some((bi, bs)) if hit.score == bs && self.events[bi].id <= self.events[i].id => {
                    Some((bi, bs))
                }
                _ => Some((i, hit.score)),
            };
        }

        best_name.map(|(index, score)| (index, score, DetectionTier::EventName))
    }
}

/// Matches streams to events across multiple leagues with include/exclude
/// narrowing and the single-event-league keyword shortcut.
pub struct MultiLeagueMatcher<'a> {
    service: &'a SportsDataService,
    search_leagues: Vec<String>,
    include_leagues: Option<HashSet<String>>,
    exception_keywords: Vec<String>,
    matchers: HashMap<String, SingleLeagueMatcher<'a>>,
}

impl<'a> MultiLeagueMatcher<'a> {
    pub fn new(
        service: &'a SportsDataService,
        search_leagues: &[String],
        include_leagues: Option<&[String]>,
        exception_keywords: &[String],
    ) -> Self {
        Self {
            service,
            search_leagues: search_leagues.to_vec(),
            include_leagues: include_leagues.map(|l| l.iter().cloned().collect()),
            exception_keywords: exception_keywords.iter().map(|k| k.to_lowercase()).collect(),
            matchers: HashMap::new(),
        }
    }

    fn should_include(&self, league: &str) -> bool {
        match &self.include_leagues {
            Some(included) => included.contains(league),
            None => true,
        }
    }

    async fn ensure_matchers(&mut self, target_date: NaiveDate) -> AppResult<usize> {
        let service = self.service;
        let mut total_events = 0;
        for league in self.search_leagues.clone() {
            let matcher = self
                .matchers
                .entry(league.clone())
                .or_insert_with(|| SingleLeagueMatcher::new(service, &league, &[]));
            matcher.build_patterns(target_date).await?;
            total_events += matcher.event_count();
        }
        Ok(total_events)
    }

    /// Match all streams against all configured leagues.
    pub async fn match_all(
        &mut self,
        streams: &[(String, String)],
        target_date: NaiveDate,
    ) -> AppResult<BatchMatchResult> {
        let total_events = self.ensure_matchers(target_date).await?;

        let mut results = Vec::with_capacity(streams.len());
        let mut matched_count = 0;
        let mut exception_hits = 0;

        for (stream_id, stream_name) in streams {
            let result = self.match_stream(stream_id, stream_name, target_date).await?;
            if result.matched {
                matched_count += 1;
            }
            if result.is_exception() {
                exception_hits += 1;
            }
            results.push(result);
        }

        Ok(BatchMatchResult {
            results,
            events_found: total_events,
            streams_matched: matched_count,
            exception_hits,
            streams_total: streams.len(),
        })
    }

    /// Match a single stream against every searched league, returning the
    /// highest-scoring result among included leagues.
    pub async fn match_stream(
        &mut self,
        stream_id: &str,
        stream_name: &str,
        target_date: NaiveDate,
    ) -> AppResult<StreamMatchResult> {
        let stream_lower = stream_name.to_lowercase();

        for keyword in &self.exception_keywords {
            if stream_lower.contains(keyword.as_str()) {
                return Ok(StreamMatchResult::exception(
                    stream_id,
                    stream_name,
                    "",
                    keyword,
                ));
            }
        }

        self.ensure_matchers(target_date).await?;

        // Single-event-league shortcut: a league keyword plus exactly one
        // scheduled event is an auto-match at reduced confidence.
        for (league, keywords) in SINGLE_EVENT_LEAGUES {
            if !self.search_leagues.iter().any(|l| l == league) {
                continue;
            }
            if !keywords.iter().any(|kw| stream_lower.contains(kw)) {
                continue;
            }
            if !self.should_include(league) {
                continue;
            }
            if let Some(matcher) = self.matchers.get(*league) {
                if matcher.event_count() == 1 {
                    return Ok(StreamMatchResult {
                        stream_id: stream_id.to_string(),
                        stream_name: stream_name.to_string(),
                        event: Some(matcher.events()[0].clone()),
                        league: league.to_string(),
                        matched: true,
                        match_score: LEAGUE_KEYWORD_SCORE,
                        exception_keyword: None,
                        detection_tier: Some(DetectionTier::LeagueKeyword),
                        from_cache: false,
                    });
                }
            }
        }

        let mut best: Option<StreamMatchResult> = None;
        for league in self.search_leagues.clone() {
            if !self.should_include(&league) {
                continue;
            }
            let matcher = self.matchers.get_mut(&league).expect("matcher built above");
            let result = matcher.match_stream(stream_id, stream_name, target_date).await?;
            if !result.matched {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => {
                    result.match_score > current.match_score
                        || (result.match_score == current.match_score
                            && tier_rank(result.detection_tier) > tier_rank(current.detection_tier))
                }
            };
            if better {
                best = Some(result);
            }
        }

        Ok(best.unwrap_or_else(|| StreamMatchResult::unmatched(stream_id, stream_name, "")))
    }
}

/// Strategy A beats strategy B on equal scores.
fn tier_rank(tier: Option<DetectionTier>) -> u8 {
    match tier {
        Some(DetectionTier::Cache) => 4,
        Some(DetectionTier::Teams) => 3,
        Some(DetectionTier::LeagueKeyword) => 2,
        Some(DetectionTier::EventName) => 1,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, Team};
    use crate::providers::SportsProvider;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn team(id: &str, name: &str, short: &str, abbrev: &str, league: &str) -> Team {
        Team {
            id: id.to_string(),
            provider: "espn".to_string(),
            name: name.to_string(),
            short_name: short.to_string(),
            abbreviation: abbrev.to_string(),
            league: league.to_string(),
            sport: "football".to_string(),
            logo_url: None,
            color: None,
        }
    }

    fn event(id: &str, name: &str, home: Team, away: Team, league: &str) -> Event {
        Event {
            id: id.to_string(),
            provider: "espn".to_string(),
            name: name.to_string(),
            short_name: name.to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 12, 14, 18, 0, 0).unwrap(),
            home_team: home,
            away_team: away,
            status: EventStatus::scheduled(),
            league: league.to_string(),
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

    struct StaticProvider {
        events: HashMap<String, Vec<Event>>,
    }

    #[async_trait]
    impl SportsProvider for StaticProvider {
        async fn get_events(&self, league: &str, _date: NaiveDate) -> AppResult<Vec<Event>> {
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
            _team_id: &str,
            league: &str,
            _days_ahead: i64,
        ) -> AppResult<Vec<Event>> {
            Ok(self.events.get(league).cloned().unwrap_or_default())
        }

        async fn get_team_stats(
            &self,
            _team_id: &str,
            _league: &str,
        ) -> AppResult<Option<crate::models::TeamStats>> {
            Ok(None)
        }

        fn provider_name(&self) -> &'static str {
            "static"
        }
    }

    fn nfl_service() -> SportsDataService {
        let cowboys = team("6", "Dallas Cowboys", "Cowboys", "DAL", "nfl");
        let giants = team("19", "New York Giants", "Giants", "NYG", "nfl");
        let lions = team("8", "Detroit Lions", "Lions", "DET", "nfl");
        let bears = team("3", "Chicago Bears", "Bears", "CHI", "nfl");

        let mut events = HashMap::new();
        events.insert(
            "nfl".to_string(),
            vec![
                event("401547", "New York Giants at Dallas Cowboys", cowboys, giants, "nfl"),
                event("401548", "Detroit Lions at Chicago Bears", bears, lions, "nfl"),
            ],
        );

        SportsDataService::new(Arc::new(StaticProvider { events }))
    }

    fn target_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 14).unwrap()
    }

    #[tokio::test]
    async fn test_single_league_team_match() {
        let service = nfl_service();
        let mut matcher = SingleLeagueMatcher::new(&service, "nfl", &[]);

        let result = matcher
            .match_stream("77", "Giants @ Cowboys", target_date())
            .await
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.event.as_ref().unwrap().id, "401547");
        assert_eq!(result.detection_tier, Some(DetectionTier::Teams));

        // Only one team present - no match
        let postgame = matcher
            .match_stream("78", "Cowboys Postgame", target_date())
            .await
            .unwrap();
        assert!(!postgame.matched);
        assert!(postgame.event.is_none());
    }

    #[tokio::test]
    async fn test_exception_keyword_routes_stream() {
        let service = nfl_service();
        let mut matcher =
            SingleLeagueMatcher::new(&service, "nfl", &["spanish".to_string()]);

        let result = matcher
            .match_stream("79", "Cowboys vs Giants (Spanish)", target_date())
            .await
            .unwrap();
        assert!(!result.matched);
        assert!(result.event.is_none());
        assert_eq!(result.exception_keyword.as_deref(), Some("spanish"));
        assert!(result.is_exception());
    }

    #[tokio::test]
    async fn test_batch_counts_exceptions_separately() {
        let service = nfl_service();
        let mut matcher =
            SingleLeagueMatcher::new(&service, "nfl", &["spanish".to_string()]);

        let streams = vec![
            ("1".to_string(), "Giants @ Cowboys".to_string()),
            ("2".to_string(), "Cowboys vs Giants (Spanish)".to_string()),
            ("3".to_string(), "Golf Highlights".to_string()),
        ];
        let batch = matcher.match_batch(&streams, target_date()).await.unwrap();

        assert_eq!(batch.streams_total, 3);
        assert_eq!(batch.streams_matched, 1);
        assert_eq!(batch.exception_hits, 1);
        assert_eq!(batch.events_found, 2);
    }

    fn ufc_service() -> SportsDataService {
        let fighter_a = team("1001", "Brandon Royval", "Royval", "ROY", "ufc");
        let fighter_b = team("1002", "Manel Kape", "Kape", "KAP", "ufc");
        let mut events = HashMap::new();
        events.insert(
            "ufc".to_string(),
            vec![event(
                "600100",
                "UFC Fight Night: Royval vs. Kape",
                fighter_a,
                fighter_b,
                "ufc",
            )],
        );
        SportsDataService::new(Arc::new(StaticProvider { events }))
    }

    #[tokio::test]
    async fn test_multi_league_single_event_shortcut() {
        let service = ufc_service();
        let leagues = vec!["ufc".to_string()];
        let mut matcher = MultiLeagueMatcher::new(&service, &leagues, None, &[]);

        let result = matcher
            .match_stream("90", "UFC Fight Night", target_date())
            .await
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.match_score, 80.0);
        assert_eq!(result.detection_tier, Some(DetectionTier::LeagueKeyword));
        assert_eq!(result.event.as_ref().unwrap().id, "600100");
    }

    #[tokio::test]
    async fn test_multi_league_include_filter() {
        let service = nfl_service();
        let leagues = vec!["nfl".to_string()];
        let include = vec!["nba".to_string()];
        let mut matcher = MultiLeagueMatcher::new(&service, &leagues, Some(&include), &[]);

        let result = matcher
            .match_stream("91", "Giants @ Cowboys", target_date())
            .await
            .unwrap();
        // NFL match exists but is excluded by the include list
        assert!(!result.matched);
    }

    #[tokio::test]
    async fn test_event_name_fallback_tier() {
        let service = ufc_service();
        let mut matcher = SingleLeagueMatcher::new(&service, "ufc", &[]);

        let result = matcher
            .match_stream("92", "UFC Fight Night: Royval vs. Kape LIVE", target_date())
            .await
            .unwrap();
        assert!(result.matched);
        // Fighter "team" names both hit, so strategy A wins here; the tier
        // is Teams, not EventName.
        assert_eq!(result.detection_tier, Some(DetectionTier::Teams));

        let name_only = matcher
            .match_stream("93", "ufc fight night main card", target_date())
            .await
            .unwrap();
        assert!(name_only.matched);
        assert_eq!(name_only.detection_tier, Some(DetectionTier::EventName));
    }
}
