//! Generation run coordination
//!
//! A full run: refresh upstream M3U accounts (parallel, skip-if-recent),
//! generate team EPG, then per event group fetch streams, match them
//! (fingerprint cache first, fuzzy tiers after), generate the group's
//! XMLTV fragment, drive channel lifecycle, and finally consolidate all
//! fragments into teamarr.xml.
//!
//! Generation is batch-tolerant: per-group and per-stream failures are
//! recorded in the run result without aborting siblings. Missing
//! settings or an unreachable database abort the whole run.

use chrono_tz::Tz;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::settings::Settings;
use crate::database::Database;
use crate::dispatcharr::{
    DispatcharrAuth, DispatcharrClient, M3uManager, RefreshOptions, TokenCache,
};
use crate::epg::{
    EpgConsolidator, EpgPaths, EventEpgGenerator, EventEpgOptions, TeamEpgGenerator,
    TeamEpgOptions,
};
use crate::errors::{AppError, AppResult};
use crate::lifecycle::reconciliation::{ChannelReconciler, ReconcilerSettings};
use crate::lifecycle::ChannelLifecycleManager;
use crate::matching::{MultiLeagueMatcher, SingleLeagueMatcher, StreamMatchCache, StreamMatchResult};
use crate::models::{EventGroup, MatchedStream, Programme, Template, XmltvChannel};
use crate::providers::SportsDataService;
use crate::utils::time::{parse_timezone, today_local, TimeFormatSettings};

/// History records older than this are swept at the end of a run.
const HISTORY_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Default)]
pub struct TeamPhaseStats {
    pub teams_processed: usize,
    pub programmes: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct EventPhaseStats {
    pub groups_processed: usize,
    pub groups_failed: usize,
    pub groups_skipped: usize,
    pub total_streams: usize,
    pub streams_matched: usize,
    pub exception_hits: usize,
    pub cache_hits: usize,
    pub programmes: usize,
}

#[derive(Debug, Default)]
pub struct LifecyclePhaseStats {
    pub channels_created: usize,
    pub channels_updated: usize,
    pub channels_deleted: usize,
}

/// Result record for a full generation run.
#[derive(Debug, Default)]
pub struct RunResult {
    pub success: bool,
    pub cancelled: bool,
    pub team_stats: TeamPhaseStats,
    pub event_stats: EventPhaseStats,
    pub lifecycle_stats: LifecyclePhaseStats,
    pub errors: Vec<String>,
    pub generation: i64,
    pub duration: Duration,
}

pub struct Orchestrator {
    config: Config,
    db: Database,
    service: SportsDataService,
    match_cache: StreamMatchCache,
    token_cache: std::sync::Arc<TokenCache>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: Config, db: Database, service: SportsDataService) -> Self {
        let match_cache = StreamMatchCache::new(db.clone());
        Self {
            config,
            db,
            service,
            match_cache,
            token_cache: TokenCache::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token for cooperative cancellation: polling loops and group
    /// boundaries check it; the in-progress group's fragment is discarded.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn dispatcharr_client(&self) -> Option<DispatcharrClient> {
        if !self.config.dispatcharr.enabled {
            return None;
        }
        let auth = DispatcharrAuth::new(
            &self.config.dispatcharr.url,
            &self.config.dispatcharr.username,
            &self.config.dispatcharr.password,
            self.token_cache.clone(),
        );
        Some(DispatcharrClient::new(auth))
    }

    fn m3u_manager(&self) -> Option<M3uManager> {
        if !self.config.dispatcharr.enabled {
            return None;
        }
        let auth = DispatcharrAuth::new(
            &self.config.dispatcharr.url,
            &self.config.dispatcharr.username,
            &self.config.dispatcharr.password,
            self.token_cache.clone(),
        );
        Some(M3uManager::new(auth))
    }

    fn sport_durations(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("football".to_string(), self.config.epg.duration_football),
            ("basketball".to_string(), self.config.epg.duration_basketball),
            ("hockey".to_string(), self.config.epg.duration_hockey),
            ("baseball".to_string(), self.config.epg.duration_baseball),
            ("soccer".to_string(), self.config.epg.duration_soccer),
            ("mma".to_string(), self.config.epg.duration_mma),
        ])
    }

    fn time_format(&self, settings: &Settings) -> TimeFormatSettings {
        TimeFormatSettings {
            use_24h: settings.use_24h_time,
            show_timezone: settings.show_timezone,
        }
    }

    /// Execute a full generation run.
    pub async fn run(&self) -> AppResult<RunResult> {
        let started = std::time::Instant::now();
        let mut result = RunResult::default();

        // Fatal-config failures abort the run
        let settings = self.db.get_settings().await?;
        let timezone = parse_timezone(&settings.default_timezone);
        let generation = self
            .db
            .next_generation()
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;
        result.generation = generation;

        info!("Starting generation run {}", generation);

        let consolidator = EpgConsolidator::new(
            EpgPaths::new(
                &self.config.storage.data_dir,
                settings.epg_output_path.as_deref(),
            ),
            timezone,
        );

        // Phase 0: refresh upstream M3U accounts
        if let Some(m3u) = self.m3u_manager() {
            self.refresh_accounts(&m3u, &mut result).await;
        }
        if self.cancel.is_cancelled() {
            result.cancelled = true;
            result.duration = started.elapsed();
            return Ok(result);
        }

        // Phase 1: team-based EPG
        self.generate_team_epg(&settings, timezone, &consolidator, &mut result)
            .await;

        // Phase 2+3: event groups (matching, fragments, lifecycle)
        self.generate_event_epg(&settings, timezone, &consolidator, generation, &mut result)
            .await;

        // Phase 4: scheduled deletions and stream-removal sweeps run in
        // generate_event_epg; here the global deletion sweep fires.
        if let Some(client) = self.dispatcharr_client() {
            let lifecycle = ChannelLifecycleManager::new(
                self.db.clone(),
                client,
                timezone,
                self.config.dispatcharr.epg_data_id,
            );
            let deletions = lifecycle.process_scheduled_deletions().await;
            result.lifecycle_stats.channels_deleted += deletions.deleted;
            result.errors.extend(deletions.errors);
        }

        // Phase 5: consolidation and housekeeping
        match consolidator.merge_all() {
            Ok(merge) => {
                debug!(
                    "Consolidated {} channels / {} programmes",
                    merge.channel_count, merge.programme_count
                );
            }
            Err(e) => result.errors.push(format!("consolidation failed: {e}")),
        }
        if let Err(e) = consolidator.finalize() {
            result.errors.push(format!("finalize failed: {e}"));
        }

        if let Err(e) = self
            .match_cache
            .evict_stale(generation, settings.cache_eviction_generations)
            .await
        {
            warn!("Cache eviction failed: {}", e);
        }
        if let Err(e) = self.db.cleanup_old_history(HISTORY_RETENTION_DAYS).await {
            warn!("History cleanup failed: {}", e);
        }

        // Nudge Dispatcharr to re-import the EPG source
        if let (Some(client), Some(epg_id)) =
            (self.dispatcharr_client(), self.config.dispatcharr.epg_data_id)
        {
            if let Err(e) = client.trigger_epg_import(epg_id).await {
                warn!("EPG import trigger failed: {}", e);
            }
        }

        result.success = result.event_stats.groups_failed == 0 && result.team_stats.failed == 0;
        result.cancelled = self.cancel.is_cancelled();
        result.duration = started.elapsed();

        info!(
            "Generation run {} finished in {:?}: {} team programmes, {} groups, {} matched streams, {} errors",
            generation,
            result.duration,
            result.team_stats.programmes,
            result.event_stats.groups_processed,
            result.event_stats.streams_matched,
            result.errors.len(),
        );

        Ok(result)
    }

    async fn refresh_accounts(&self, m3u: &M3uManager, result: &mut RunResult) {
        let accounts = match m3u.list_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                result.errors.push(format!("account listing failed: {e}"));
                return;
            }
        };
        let ids: Vec<i64> = accounts.iter().map(|a| a.id).collect();
        if ids.is_empty() {
            return;
        }

        let options = RefreshOptions {
            timeout: Duration::from_secs(self.config.dispatcharr.refresh_timeout_secs),
            poll_interval: Duration::from_secs(self.config.dispatcharr.refresh_poll_interval_secs),
            skip_if_recent_minutes: self.config.dispatcharr.refresh_skip_if_recent_minutes,
        };

        match m3u.refresh_multiple_accounts(&ids, options, &self.cancel).await {
            Ok(batch) => {
                for (account_id, outcome) in &batch.outcomes {
                    if !outcome.success {
                        result
                            .errors
                            .push(format!("account {account_id} refresh: {}", outcome.message));
                    }
                }
            }
            Err(e) => result.errors.push(format!("account refresh failed: {e}")),
        }
    }

    async fn generate_team_epg(
        &self,
        settings: &Settings,
        timezone: Tz,
        consolidator: &EpgConsolidator,
        result: &mut RunResult,
    ) {
        let teams = match self.db.list_active_teams().await {
            Ok(teams) => teams,
            Err(e) => {
                result.errors.push(format!("team listing failed: {e}"));
                return;
            }
        };
        if teams.is_empty() {
            return;
        }

        let generator = TeamEpgGenerator::new(&self.service);
        let options = TeamEpgOptions {
            schedule_days_ahead: self.config.epg.schedule_days_ahead,
            output_days_ahead: self.config.epg.output_days_ahead,
            pregame_minutes: self.config.epg.pregame_minutes,
            filler_enabled: self.config.epg.filler_enabled,
            timezone,
            time_format: self.time_format(settings),
            sport_durations: self.sport_durations(),
            default_duration_hours: self.config.epg.default_duration_hours,
        };

        let mut channels: Vec<XmltvChannel> = Vec::new();
        let mut programmes: Vec<Programme> = Vec::new();

        for team in &teams {
            if self.cancel.is_cancelled() {
                return;
            }

            let template = match team.template_id {
                Some(id) => self
                    .db
                    .get_template(id)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
                None => Template::default(),
            };

            let additional_leagues = self
                .db
                .get_team_leagues(&team.provider, &team.team_id)
                .await
                .unwrap_or_default();

            match generator
                .generate(team, &template, &options, &additional_leagues)
                .await
            {
                Ok((channel, team_programmes)) => {
                    result.team_stats.teams_processed += 1;
                    result.team_stats.programmes += team_programmes.len();
                    channels.push(channel);
                    programmes.extend(team_programmes);
                }
                Err(e) => {
                    warn!("Team EPG failed for '{}': {}", team.team_name, e);
                    result.team_stats.failed += 1;
                    result.errors.push(format!("team {}: {e}", team.team_name));
                }
            }
        }

        if !channels.is_empty() {
            if let Err(e) = consolidator.save_team_fragment(&channels, &programmes) {
                result.errors.push(format!("teams.xml save failed: {e}"));
            }
        }

        info!(
            "Team EPG: {} programmes from {} teams",
            result.team_stats.programmes, result.team_stats.teams_processed
        );
    }

    async fn generate_event_epg(
        &self,
        settings: &Settings,
        timezone: Tz,
        consolidator: &EpgConsolidator,
        generation: i64,
        result: &mut RunResult,
    ) {
        let groups = match self.db.list_event_groups(true).await {
            Ok(groups) => groups,
            Err(e) => {
                result.errors.push(format!("group listing failed: {e}"));
                return;
            }
        };

        let Some(client) = self.dispatcharr_client() else {
            if !groups.is_empty() {
                debug!("Dispatcharr disabled - skipping event groups");
                result.event_stats.groups_skipped = groups.len();
            }
            return;
        };
        let m3u = self.m3u_manager().expect("dispatcharr enabled");
        let lifecycle = ChannelLifecycleManager::new(
            self.db.clone(),
            client,
            timezone,
            self.config.dispatcharr.epg_data_id,
        );

        for group in &groups {
            if self.cancel.is_cancelled() {
                debug!("Run cancelled - discarding partial fragment for group {}", group.id);
                result.cancelled = true;
                return;
            }
            if group.event_template_id.is_none() {
                result.event_stats.groups_skipped += 1;
                continue;
            }

            match self
                .process_event_group(group, settings, timezone, &m3u, &lifecycle, generation, consolidator)
                .await
            {
                Ok(group_stats) => {
                    result.event_stats.groups_processed += 1;
                    result.event_stats.total_streams += group_stats.total_streams;
                    result.event_stats.streams_matched += group_stats.streams_matched;
                    result.event_stats.exception_hits += group_stats.exception_hits;
                    result.event_stats.cache_hits += group_stats.cache_hits;
                    result.event_stats.programmes += group_stats.programmes;
                    result.lifecycle_stats.channels_created += group_stats.channels_created;
                    result.lifecycle_stats.channels_updated += group_stats.channels_updated;
                    result.lifecycle_stats.channels_deleted += group_stats.channels_deleted;
                    result.errors.extend(group_stats.errors);
                }
                Err(e) => {
                    // Per-group failures do not abort other groups
                    warn!("Group '{}' failed: {}", group.name, e);
                    result.event_stats.groups_failed += 1;
                    result.errors.push(format!("group {}: {e}", group.name));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_event_group(
        &self,
        group: &EventGroup,
        settings: &Settings,
        timezone: Tz,
        m3u: &M3uManager,
        lifecycle: &ChannelLifecycleManager,
        generation: i64,
        consolidator: &EpgConsolidator,
    ) -> AppResult<GroupRunStats> {
        let mut stats = GroupRunStats::default();

        let Some(dispatcharr_group_id) = group.dispatcharr_group_id else {
            return Ok(stats);
        };

        let streams = m3u.list_group_streams(dispatcharr_group_id).await?;
        stats.total_streams = streams.len();
        if streams.is_empty() {
            return Ok(stats);
        }

        let template = match group.event_template_id {
            Some(id) => self
                .db
                .get_template(id)
                .await
                .map_err(|e| AppError::internal(e.to_string()))?
                .unwrap_or_default(),
            None => Template::default(),
        };

        let target_date = today_local(timezone);
        let match_results = self
            .match_group_streams(group, &streams, target_date, generation, &mut stats)
            .await?;

        // Per-stream failures are recorded; the group continues
        let matched_streams: Vec<MatchedStream> = match_results
            .into_iter()
            .filter_map(|r| {
                let event = r.event?;
                Some(MatchedStream {
                    channel_id: EventEpgGenerator::channel_id(&event),
                    stream_id: r.stream_id,
                    stream_name: r.stream_name,
                    event,
                    exception_keyword: r.exception_keyword,
                })
            })
            .collect();
        stats.streams_matched = matched_streams.len();

        if matched_streams.is_empty() {
            return Ok(stats);
        }

        // Generate the group's XMLTV fragment
        let mut epg_options = EventEpgOptions::new(timezone);
        epg_options.time_format = self.time_format(settings);
        epg_options.sport_durations = self.sport_durations();
        epg_options.default_duration_hours = self.config.epg.default_duration_hours;
        for league in self.service.known_leagues() {
            epg_options
                .league_names
                .insert(league.clone(), self.service.league_display_name(&league));
        }

        let generator = EventEpgGenerator::new(epg_options);
        let output = generator.generate(&matched_streams, group, &template);
        stats.programmes = output.programmes.len();

        if self.cancel.is_cancelled() {
            // Discard the partial fragment on cancellation
            return Ok(stats);
        }
        consolidator.save_event_fragment(group.id, &output.channels, &output.programmes)?;

        // Channel lifecycle for this group
        let created = lifecycle
            .process_matched_streams(
                &matched_streams,
                group,
                &template,
                settings.channel_create_timing,
                settings.channel_delete_timing,
            )
            .await;
        stats.channels_created = created.created;
        stats.errors.extend(created.errors);

        let updated = lifecycle
            .update_existing_channels(&matched_streams, group, settings.channel_delete_timing)
            .await;
        stats.channels_updated = updated.updated;
        stats.errors.extend(updated.errors);

        let synced = lifecycle
            .sync_group_settings(group, settings.channel_delete_timing)
            .await;
        stats.channels_updated += synced.updated;
        stats.errors.extend(synced.errors);

        let stream_ids: Vec<i64> = streams.iter().map(|s| s.id).collect();
        let removed = lifecycle
            .cleanup_removed_streams(group, &stream_ids, settings.channel_delete_timing)
            .await;
        stats.channels_deleted = removed.deleted;
        stats.errors.extend(removed.errors);

        Ok(stats)
    }

    /// Match a group's streams: fingerprint cache tier first, then the
    /// fuzzy matchers. Successful fuzzy matches are written back to the
    /// cache.
    async fn match_group_streams(
        &self,
        group: &EventGroup,
        streams: &[crate::dispatcharr::Stream],
        target_date: chrono::NaiveDate,
        generation: i64,
        stats: &mut GroupRunStats,
    ) -> AppResult<Vec<StreamMatchResult>> {
        let mut results = Vec::with_capacity(streams.len());
        let stream_pairs: Vec<(String, String)> = streams
            .iter()
            .map(|s| (s.id.to_string(), s.name.clone()))
            .collect();

        // Cache tier
        let mut pending: Vec<(String, String)> = Vec::new();
        for (stream_id, stream_name) in &stream_pairs {
            match self
                .match_cache
                .lookup(&self.service, group.id, stream_id, stream_name, generation)
                .await?
            {
                Some(hit) => {
                    stats.cache_hits += 1;
                    results.push(hit);
                }
                None => pending.push((stream_id.clone(), stream_name.clone())),
            }
        }

        // Fuzzy tiers
        if !pending.is_empty() {
            let batch = if group.is_multi_sport {
                let leagues = self.service.known_leagues();
                let mut matcher = MultiLeagueMatcher::new(
                    &self.service,
                    &leagues,
                    None,
                    &group.exception_keywords,
                );
                matcher.match_all(&pending, target_date).await?
            } else {
                let league = group.assigned_league.clone().ok_or_else(|| {
                    AppError::fatal_config(format!("group {} has no assigned league", group.id))
                })?;
                let mut matcher =
                    SingleLeagueMatcher::new(&self.service, &league, &group.exception_keywords);
                matcher.match_batch(&pending, target_date).await?
            };

            stats.exception_hits += batch.exception_hits;
            for result in batch.results {
                if result.matched {
                    self.match_cache.store(group.id, &result, generation).await;
                }
                results.push(result);
            }
        }

        Ok(results)
    }

    /// Run reconciliation with the settings-derived gates.
    pub async fn reconcile(&self, auto_fix: Option<bool>) -> AppResult<crate::lifecycle::ReconciliationResult> {
        let settings = self.db.get_settings().await?;
        let client = self
            .dispatcharr_client()
            .ok_or_else(|| AppError::fatal_config("Dispatcharr is not configured"))?;

        let reconciler = ChannelReconciler::new(
            self.db.clone(),
            client,
            ReconcilerSettings {
                auto_fix_enabled: settings.auto_fix_enabled,
                auto_fix_orphan_teamarr: settings.auto_fix_orphan_teamarr,
                auto_fix_orphan_dispatcharr: settings.auto_fix_orphan_dispatcharr,
                auto_fix_drift: settings.auto_fix_drift,
            },
        );
        Ok(reconciler.reconcile(auto_fix, None).await)
    }
}

#[derive(Debug, Default)]
struct GroupRunStats {
    total_streams: usize,
    streams_matched: usize,
    exception_hits: usize,
    cache_hits: usize,
    programmes: usize,
    channels_created: usize,
    channels_updated: usize,
    channels_deleted: usize,
    errors: Vec<String>,
}
