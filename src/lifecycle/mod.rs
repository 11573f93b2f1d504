//! Channel lifecycle management
//!
//! Creates, updates, and deletes Dispatcharr channels for matched
//! streams. Create timing is the earliest allowed instant; delete timing
//! is the latest, always 23:59:59 local on a day computed from the
//! event's end so late-night games defer deletion.

pub mod reconciliation;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::database::managed_channels::NewManagedChannel;
use crate::database::Database;
use crate::dispatcharr::{DispatcharrClient, NewChannel};
use crate::errors::AppError;
use crate::models::{
    CreateTiming, DeleteTiming, Event, EventGroup, MatchedStream, Template,
};
use crate::templates::{TemplateContext, TemplateResolver};
use crate::utils::time::{local_date, local_end_of_day_utc, today_local};

pub use reconciliation::{ChannelReconciler, ReconciliationIssue, ReconciliationResult};

/// Conservative per-sport durations for lifecycle math, padded for
/// overtime and extra innings.
pub fn sport_duration_hours(sport: &str) -> f64 {
    match sport.to_ascii_lowercase().as_str() {
        "football" => 4.0,
        "basketball" => 3.0,
        "hockey" => 3.0,
        "baseball" => 4.0,
        "soccer" => 2.5,
        "mma" => 6.0,
        _ => 3.5,
    }
}

/// Earliest-creation check: a channel is not created before the
/// threshold date even when its stream already exists.
pub fn should_create_channel(
    event_start: DateTime<Utc>,
    timing: CreateTiming,
    timezone: Tz,
    today: NaiveDate,
) -> bool {
    match timing {
        CreateTiming::Manual => false,
        CreateTiming::StreamAvailable => true,
        CreateTiming::SameDay | CreateTiming::DayBefore | CreateTiming::TwoDaysBefore => {
            let event_date = local_date(event_start, timezone);
            let threshold = match timing {
                CreateTiming::SameDay => event_date,
                CreateTiming::DayBefore => event_date - Duration::days(1),
                CreateTiming::TwoDaysBefore => event_date - Duration::days(2),
                _ => unreachable!(),
            };
            today >= threshold
        }
    }
}

/// Latest-deletion instant: 23:59:59 local on a day relative to the
/// event's END date. An event that crosses midnight defers deletion to
/// the day it actually ends. Returns None for manual/stream_removed.
pub fn calculate_delete_time(
    event_start: DateTime<Utc>,
    timing: DeleteTiming,
    timezone: Tz,
    duration_hours: f64,
) -> Option<DateTime<Utc>> {
    if matches!(timing, DeleteTiming::Manual | DeleteTiming::StreamRemoved) {
        return None;
    }

    let event_end = event_start + Duration::seconds((duration_hours * 3600.0) as i64);
    let end_date = local_date(event_end, timezone);

    let delete_date = match timing {
        DeleteTiming::SameDay => end_date,
        DeleteTiming::DayAfter => end_date + Duration::days(1),
        DeleteTiming::TwoDaysAfter => end_date + Duration::days(2),
        _ => return None,
    };

    Some(local_end_of_day_utc(delete_date, timezone))
}

/// Outcome counters for a lifecycle pass over one group.
#[derive(Debug, Default)]
pub struct LifecycleResult {
    pub created: usize,
    pub existing: usize,
    pub skipped: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
}

impl LifecycleResult {
    pub fn absorb(&mut self, other: LifecycleResult) {
        self.created += other.created;
        self.existing += other.existing;
        self.skipped += other.skipped;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.errors.extend(other.errors);
    }
}

pub struct ChannelLifecycleManager {
    db: Database,
    client: DispatcharrClient,
    timezone: Tz,
    epg_data_id: Option<i64>,
    resolver: TemplateResolver,
}

impl ChannelLifecycleManager {
    pub fn new(
        db: Database,
        client: DispatcharrClient,
        timezone: Tz,
        epg_data_id: Option<i64>,
    ) -> Self {
        Self {
            db,
            client,
            timezone,
            epg_data_id,
            resolver: TemplateResolver::new(),
        }
    }

    fn channel_name(&self, event: &Event, template: &Template) -> String {
        if let Some(format) = template.channel_name_format.as_deref() {
            let context = TemplateContext::for_event(event.clone(), self.timezone);
            let resolved = self.resolver.resolve(format, &context);
            if !resolved.is_empty() {
                return resolved;
            }
        }
        format!("{} @ {}", event.away_team.short_name, event.home_team.short_name)
    }

    /// Create channels for newly matched streams where timing allows.
    pub async fn process_matched_streams(
        &self,
        matched_streams: &[MatchedStream],
        group: &EventGroup,
        template: &Template,
        default_create_timing: CreateTiming,
        default_delete_timing: DeleteTiming,
    ) -> LifecycleResult {
        let mut result = LifecycleResult::default();

        let Some(channel_start) = group.channel_start else {
            debug!(
                "Group {} has no channel_start configured - skipping channel creation",
                group.id
            );
            result.skipped = matched_streams.len();
            return result;
        };

        let create_timing = group.create_timing.unwrap_or(default_create_timing);
        let delete_timing = group.delete_timing.unwrap_or(default_delete_timing);

        let today = today_local(self.timezone);

        for matched in matched_streams {
            let event = &matched.event;
            match self
                .create_channel_for_stream(
                    matched,
                    event,
                    group,
                    template,
                    channel_start,
                    create_timing,
                    delete_timing,
                    today,
                )
                .await
            {
                Ok(CreateOutcome::Created) => result.created += 1,
                Ok(CreateOutcome::Existing) => result.existing += 1,
                Ok(CreateOutcome::Skipped) => result.skipped += 1,
                Err(e) => {
                    warn!(
                        "Channel creation failed for stream '{}': {}",
                        matched.stream_name, e
                    );
                    result.errors.push(format!("{}: {}", matched.stream_name, e));
                }
            }
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_channel_for_stream(
        &self,
        matched: &MatchedStream,
        event: &Event,
        group: &EventGroup,
        template: &Template,
        channel_start: i64,
        create_timing: CreateTiming,
        delete_timing: DeleteTiming,
        today: NaiveDate,
    ) -> Result<CreateOutcome, AppError> {
        if self
            .db
            .get_managed_channel_by_event(&event.id, group.id)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?
            .is_some()
        {
            return Ok(CreateOutcome::Existing);
        }

        if !should_create_channel(event.start_time, create_timing, self.timezone, today) {
            debug!(
                "Too early to create channel for '{}' ({:?})",
                matched.stream_name, create_timing
            );
            return Ok(CreateOutcome::Skipped);
        }

        let channel_number = self
            .db
            .next_channel_number(group.id, channel_start)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;

        let channel_name = self.channel_name(event, template);

        // Logo upload is deduplicated upstream: an already-exists
        // collision resolves to the existing logo id.
        let mut logo_id = None;
        if let Some(format) = template.channel_logo_url.as_deref() {
            let context = TemplateContext::for_event(event.clone(), self.timezone);
            let logo_url = self.resolver.resolve(format, &context);
            if !logo_url.is_empty() {
                match self
                    .client
                    .upload_logo(&format!("{channel_name} Logo"), &logo_url)
                    .await
                {
                    Ok((id, status)) => {
                        debug!("Logo for '{}': {:?}", channel_name, status);
                        logo_id = Some(id);
                    }
                    Err(e) => warn!("Failed to upload logo for '{}': {}", channel_name, e),
                }
            }
        }

        let duration = sport_duration_hours(
            group
                .assigned_sport
                .as_deref()
                .unwrap_or(event.sport.as_str()),
        );
        let delete_at =
            calculate_delete_time(event.start_time, delete_timing, self.timezone, duration);

        let stream_id: i64 = matched.stream_id.parse().unwrap_or(0);
        let tvg_id = matched.channel_id.clone();

        let created = self
            .client
            .create_channel(NewChannel {
                name: &channel_name,
                channel_number,
                stream_ids: &[stream_id],
                tvg_id: Some(&tvg_id),
                channel_group_id: group.channel_group_id,
                logo_id,
            })
            .await?;

        if let Some(epg_data_id) = self.epg_data_id {
            if let Err(e) = self.client.set_channel_epg(created.id, epg_data_id).await {
                warn!("Failed to set EPG for channel {}: {}", created.id, e);
            }
        }

        let insert = self
            .db
            .insert_managed_channel(NewManagedChannel {
                event_group_id: group.id,
                dispatcharr_channel_id: created.id,
                dispatcharr_uuid: created.uuid.as_deref(),
                dispatcharr_stream_id: stream_id,
                channel_number,
                channel_name: &channel_name,
                espn_event_id: &event.id,
                event_date: Some(local_date(event.start_time, self.timezone)),
                scheduled_delete_at: delete_at,
                logo_id,
            })
            .await;

        match insert {
            Ok(managed_id) => {
                let _ = self
                    .db
                    .log_channel_history(managed_id, "created", Some("epg_generation"), None)
                    .await;
                info!(
                    "Created channel {} '{}' for stream '{}'",
                    channel_number, channel_name, matched.stream_name
                );
                Ok(CreateOutcome::Created)
            }
            Err(e) => {
                // Channel exists upstream but tracking failed: roll back
                // the Dispatcharr channel so state stays consistent.
                warn!(
                    "Tracking insert failed for channel {}, rolling back: {}",
                    created.id, e
                );
                if let Err(delete_err) = self.client.delete_channel(created.id).await {
                    warn!("Rollback delete failed: {}", delete_err);
                }
                Err(AppError::internal(format!("tracking insert failed: {e}")))
            }
        }
    }

    /// Recompute scheduled delete times for existing channels from fresh
    /// event data (events get rescheduled, settings change).
    pub async fn update_existing_channels(
        &self,
        matched_streams: &[MatchedStream],
        group: &EventGroup,
        default_delete_timing: DeleteTiming,
    ) -> LifecycleResult {
        let mut result = LifecycleResult::default();
        let delete_timing = group.delete_timing.unwrap_or(default_delete_timing);

        for matched in matched_streams {
            let event = &matched.event;
            let existing = match self.db.get_managed_channel_by_event(&event.id, group.id).await {
                Ok(Some(channel)) => channel,
                Ok(None) => continue,
                Err(e) => {
                    result.errors.push(e.to_string());
                    continue;
                }
            };

            let duration = sport_duration_hours(
                group
                    .assigned_sport
                    .as_deref()
                    .unwrap_or(event.sport.as_str()),
            );
            let new_delete_at =
                calculate_delete_time(event.start_time, delete_timing, self.timezone, duration);

            if existing.scheduled_delete_at != new_delete_at {
                match self
                    .db
                    .update_scheduled_delete_at(existing.id, new_delete_at)
                    .await
                {
                    Ok(()) => {
                        debug!(
                            "Updated delete time for '{}': {:?} -> {:?}",
                            existing.channel_name, existing.scheduled_delete_at, new_delete_at
                        );
                        result.updated += 1;
                    }
                    Err(e) => result.errors.push(e.to_string()),
                }
            }
        }

        result
    }

    /// Clear scheduled deletions for groups moved to manual or
    /// stream_removed timing.
    pub async fn sync_group_settings(
        &self,
        group: &EventGroup,
        default_delete_timing: DeleteTiming,
    ) -> LifecycleResult {
        let mut result = LifecycleResult::default();
        let delete_timing = group.delete_timing.unwrap_or(default_delete_timing);

        if !matches!(
            delete_timing,
            DeleteTiming::Manual | DeleteTiming::StreamRemoved
        ) {
            return result;
        }

        let channels = match self.db.list_managed_channels_for_group(group.id).await {
            Ok(channels) => channels,
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        };

        for channel in channels {
            if channel.scheduled_delete_at.is_some() {
                match self.db.update_scheduled_delete_at(channel.id, None).await {
                    Ok(()) => {
                        debug!(
                            "Cleared scheduled delete for '{}' (group timing is {})",
                            channel.channel_name,
                            delete_timing.as_str()
                        );
                        result.updated += 1;
                    }
                    Err(e) => result.errors.push(e.to_string()),
                }
            }
        }

        result
    }

    /// Delete channels past their scheduled deletion time. A 404 from
    /// Dispatcharr means the channel is already gone; the local row is
    /// soft-deleted either way.
    pub async fn process_scheduled_deletions(&self) -> LifecycleResult {
        let mut result = LifecycleResult::default();

        let pending = match self.db.list_channels_pending_deletion().await {
            Ok(pending) => pending,
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        };

        for channel in pending {
            match self.delete_channel(&channel, "scheduled deletion").await {
                Ok(()) => result.deleted += 1,
                Err(e) => result.errors.push(format!("{}: {}", channel.channel_name, e)),
            }
        }

        result
    }

    /// For groups with stream_removed timing, delete channels whose
    /// stream disappeared from the Dispatcharr group.
    pub async fn cleanup_removed_streams(
        &self,
        group: &EventGroup,
        current_stream_ids: &[i64],
        default_delete_timing: DeleteTiming,
    ) -> LifecycleResult {
        let mut result = LifecycleResult::default();
        let delete_timing = group.delete_timing.unwrap_or(default_delete_timing);

        if delete_timing != DeleteTiming::StreamRemoved {
            return result;
        }

        let channels = match self.db.list_managed_channels_for_group(group.id).await {
            Ok(channels) => channels,
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        };

        let current: std::collections::HashSet<i64> = current_stream_ids.iter().copied().collect();

        for channel in channels {
            if !current.contains(&channel.dispatcharr_stream_id) {
                match self.delete_channel(&channel, "stream removed").await {
                    Ok(()) => result.deleted += 1,
                    Err(e) => result.errors.push(format!("{}: {}", channel.channel_name, e)),
                }
            }
        }

        result
    }

    async fn delete_channel(
        &self,
        channel: &crate::models::ManagedChannel,
        reason: &str,
    ) -> Result<(), AppError> {
        match self.client.delete_channel(channel.dispatcharr_channel_id).await {
            Ok(()) => {}
            // Already gone upstream counts as deleted
            Err(AppError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        self.db
            .mark_managed_channel_deleted(channel.id)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;
        let _ = self
            .db
            .log_channel_history(channel.id, "deleted", Some("lifecycle"), Some(reason))
            .await;

        // Logo cleanup only when no remaining channel references it
        if let Some(logo_id) = channel.logo_id {
            let references = self
                .db
                .count_channels_with_logo(logo_id)
                .await
                .unwrap_or(1);
            if references == 0 {
                match self.client.delete_logo(logo_id).await {
                    Ok(true) => debug!("Deleted logo {} for '{}'", logo_id, channel.channel_name),
                    Ok(false) => debug!("Logo {} kept (in use or already gone)", logo_id),
                    Err(e) => warn!("Logo cleanup failed for {}: {}", logo_id, e),
                }
            }
        }

        info!(
            "Deleted channel {} '{}' - {}",
            channel.channel_number, channel.channel_name, reason
        );
        Ok(())
    }
}

enum CreateOutcome {
    Created,
    Existing,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_timezone;
    use chrono::TimeZone;

    fn eastern() -> Tz {
        parse_timezone("America/New_York")
    }

    // 2025-12-15 19:00 EST (2025-12-16 00:00 UTC)
    fn evening_game() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 16, 0, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_create_timing_stream_available() {
        assert!(should_create_channel(
            evening_game(),
            CreateTiming::StreamAvailable,
            eastern(),
            date(2025, 11, 1)
        ));
    }

    #[test]
    fn test_create_timing_day_before() {
        let event = evening_game(); // local date 2025-12-15
        assert!(!should_create_channel(
            event,
            CreateTiming::DayBefore,
            eastern(),
            date(2025, 12, 13)
        ));
        assert!(should_create_channel(
            event,
            CreateTiming::DayBefore,
            eastern(),
            date(2025, 12, 14)
        ));
        assert!(should_create_channel(
            event,
            CreateTiming::DayBefore,
            eastern(),
            date(2025, 12, 15)
        ));
    }

    #[test]
    fn test_create_timing_manual_never_creates() {
        assert!(!should_create_channel(
            evening_game(),
            CreateTiming::Manual,
            eastern(),
            date(2025, 12, 15)
        ));
    }

    #[test]
    fn test_delete_time_day_after() {
        // Event local date 2025-12-15, ends same local day (7pm + 4h = 11pm)
        let delete_at = calculate_delete_time(
            evening_game(),
            DeleteTiming::DayAfter,
            eastern(),
            4.0,
        )
        .unwrap();
        // 23:59:59 EST on 2025-12-16 == 04:59:59 UTC on the 17th
        assert_eq!(
            delete_at,
            Utc.with_ymd_and_hms(2025, 12, 17, 4, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_delete_time_uses_event_end_for_late_games() {
        // 10pm EST start + 4h crosses midnight into 2025-12-16
        let late_start = Utc.with_ymd_and_hms(2025, 12, 16, 3, 0, 0).unwrap();
        let same_day = calculate_delete_time(late_start, DeleteTiming::SameDay, eastern(), 4.0)
            .unwrap();
        // End date is the 16th, so same_day deletion is end of the 16th
        assert_eq!(
            same_day,
            Utc.with_ymd_and_hms(2025, 12, 17, 4, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_delete_time_manual_and_stream_removed_are_none() {
        assert!(calculate_delete_time(evening_game(), DeleteTiming::Manual, eastern(), 4.0)
            .is_none());
        assert!(calculate_delete_time(
            evening_game(),
            DeleteTiming::StreamRemoved,
            eastern(),
            4.0
        )
        .is_none());
    }

    #[test]
    fn test_sport_duration_defaults() {
        assert_eq!(sport_duration_hours("football"), 4.0);
        assert_eq!(sport_duration_hours("SOCCER"), 2.5);
        assert_eq!(sport_duration_hours("unknown"), 3.5);
    }
}
