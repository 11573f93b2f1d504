//! Cricket hybrid provider
//!
//! Combines two sources: team identity, logos, and stats come from one
//! provider (TheSportsDB), schedules and scores from another. The
//! service layer is unaware of the split - it just sees a
//! "cricket_hybrid" provider.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::SportsProvider;
use crate::errors::AppResult;
use crate::models::{Event, Team, TeamStats};

pub struct CricketHybridProvider {
    /// Source of team identity, logos, and stats.
    teams: Arc<dyn SportsProvider>,
    /// Source of event schedules and scores.
    schedules: Arc<dyn SportsProvider>,
    /// Team identity cache filled from previously seen events, used to
    /// graft logos onto schedule entries that carry bare names.
    team_cache: RwLock<HashMap<String, Team>>,
}

impl CricketHybridProvider {
    pub fn new(teams: Arc<dyn SportsProvider>, schedules: Arc<dyn SportsProvider>) -> Self {
        Self {
            teams,
            schedules,
            team_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn remember_teams(&self, events: &[Event]) {
        let mut cache = self.team_cache.write().await;
        for event in events {
            for team in [&event.home_team, &event.away_team] {
                if team.logo_url.is_some() && !team.id.is_empty() {
                    cache.insert(team.id.clone(), team.clone());
                }
            }
        }
    }

    async fn enrich_teams(&self, mut events: Vec<Event>) -> Vec<Event> {
        let cache = self.team_cache.read().await;
        for event in &mut events {
            for team in [&mut event.home_team, &mut event.away_team] {
                if team.logo_url.is_none() {
                    if let Some(known) = cache.get(&team.id) {
                        team.logo_url = known.logo_url.clone();
                        if team.abbreviation.is_empty() {
                            team.abbreviation = known.abbreviation.clone();
                        }
                    }
                }
            }
        }
        events
    }
}

#[async_trait]
impl SportsProvider for CricketHybridProvider {
    async fn get_events(&self, league: &str, date: NaiveDate) -> AppResult<Vec<Event>> {
        // Seed the identity cache from the team source's view of the day
        if let Ok(team_events) = self.teams.get_events(league, date).await {
            self.remember_teams(&team_events).await;
        }
        let events = self.schedules.get_events(league, date).await?;
        Ok(self.enrich_teams(events).await)
    }

    async fn get_event(&self, event_id: &str, league: &str) -> AppResult<Option<Event>> {
        let event = self.schedules.get_event(event_id, league).await?;
        match event {
            Some(e) => Ok(self.enrich_teams(vec![e]).await.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn get_team_schedule(
        &self,
        team_id: &str,
        league: &str,
        days_ahead: i64,
    ) -> AppResult<Vec<Event>> {
        let events = self
            .schedules
            .get_team_schedule(team_id, league, days_ahead)
            .await?;
        Ok(self.enrich_teams(events).await)
    }

    async fn get_team_stats(&self, team_id: &str, league: &str) -> AppResult<Option<TeamStats>> {
        self.teams.get_team_stats(team_id, league).await
    }

    fn provider_name(&self) -> &'static str {
        "cricket_hybrid"
    }
}
