//! Channel reconciliation
//!
//! Detects divergence between the managed_channels table and
//! Dispatcharr's actual state, then optionally fixes it. Identity uses
//! the immutable upstream UUID when present, falling back to the channel
//! id; missing UUIDs are backfilled during the scan.
//!
//! Issue kinds:
//! - orphan_teamarr: local row exists, upstream channel is gone
//! - orphan_dispatcharr: upstream channel has a teamarr-event-* tvg_id
//!   but no local row
//! - duplicate: multiple undeleted rows for one event in a group
//! - drift: upstream fields differ from the local expectation

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::dispatcharr::{DispatcharrChannel, DispatcharrClient};
use crate::models::SyncStatus;

const MANAGED_TVG_PREFIX: &str = "teamarr-event-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    OrphanTeamarr,
    OrphanDispatcharr,
    Duplicate,
    Drift,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrphanTeamarr => "orphan_teamarr",
            Self::OrphanDispatcharr => "orphan_dispatcharr",
            Self::Duplicate => "duplicate",
            Self::Drift => "drift",
        }
    }
}

/// One field-level divergence on a drifted channel.
#[derive(Debug, Clone)]
pub struct DriftField {
    pub field: &'static str,
    pub expected: Value,
    pub actual: Value,
}

#[derive(Debug, Clone)]
pub struct ReconciliationIssue {
    pub kind: IssueKind,
    pub managed_channel_id: Option<i64>,
    pub dispatcharr_channel_id: Option<i64>,
    pub dispatcharr_uuid: Option<String>,
    pub channel_name: Option<String>,
    pub espn_event_id: Option<String>,
    pub drift_fields: Vec<DriftField>,
    pub suggested_action: &'static str,
    pub auto_fixable: bool,
}

#[derive(Debug, Default)]
pub struct ReconciliationResult {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub issues_found: Vec<ReconciliationIssue>,
    pub issues_fixed: usize,
    pub issues_skipped: usize,
    pub errors: Vec<String>,
}

impl ReconciliationResult {
    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues_found.iter().filter(|i| i.kind == kind).count()
    }
}

/// Per-kind auto-fix gates. Drift fixes are safe and default on;
/// deleting upstream orphans defaults off; duplicates are never
/// auto-fixed.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub auto_fix_enabled: bool,
    pub auto_fix_orphan_teamarr: bool,
    pub auto_fix_orphan_dispatcharr: bool,
    pub auto_fix_drift: bool,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            auto_fix_enabled: false,
            auto_fix_orphan_teamarr: true,
            auto_fix_orphan_dispatcharr: false,
            auto_fix_drift: true,
        }
    }
}

pub struct ChannelReconciler {
    db: Database,
    client: DispatcharrClient,
    settings: ReconcilerSettings,
}

impl ChannelReconciler {
    pub fn new(db: Database, client: DispatcharrClient, settings: ReconcilerSettings) -> Self {
        Self {
            db,
            client,
            settings,
        }
    }

    /// Run a full reconciliation scan; `auto_fix` overrides the settings
    /// gate when provided. Detection itself is read-only apart from UUID
    /// backfill.
    pub async fn reconcile(
        &self,
        auto_fix: Option<bool>,
        group_ids: Option<&[i64]>,
    ) -> ReconciliationResult {
        let mut result = ReconciliationResult {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        let upstream = match self.client.get_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                result.errors.push(format!("failed to list channels: {e}"));
                result.completed_at = Some(Utc::now());
                return result;
            }
        };
        let upstream_by_id: HashMap<i64, &DispatcharrChannel> =
            upstream.iter().map(|c| (c.id, c)).collect();
        let upstream_by_uuid: HashMap<&str, &DispatcharrChannel> = upstream
            .iter()
            .filter_map(|c| c.uuid.as_deref().map(|u| (u, c)))
            .collect();

        let local = match self.db.list_managed_channels(group_ids).await {
            Ok(channels) => channels,
            Err(e) => {
                result.errors.push(format!("failed to list managed channels: {e}"));
                result.completed_at = Some(Utc::now());
                return result;
            }
        };

        let groups: HashMap<i64, crate::models::EventGroup> = match self
            .db
            .list_event_groups(false)
            .await
        {
            Ok(groups) => groups.into_iter().map(|g| (g.id, g)).collect(),
            Err(e) => {
                result.errors.push(format!("failed to list groups: {e}"));
                HashMap::new()
            }
        };

        let mut known_ids: HashSet<i64> = HashSet::new();
        let mut known_uuids: HashSet<String> = HashSet::new();

        // Pass 1: local rows vs upstream (orphan_teamarr, drift, backfill)
        for channel in &local {
            known_ids.insert(channel.dispatcharr_channel_id);
            if let Some(uuid) = &channel.dispatcharr_uuid {
                known_uuids.insert(uuid.clone());
            }

            // UUID-first identity, channel id fallback
            let found = channel
                .dispatcharr_uuid
                .as_deref()
                .and_then(|u| upstream_by_uuid.get(u).copied())
                .or_else(|| upstream_by_id.get(&channel.dispatcharr_channel_id).copied());

            let Some(remote) = found else {
                result.issues_found.push(ReconciliationIssue {
                    kind: IssueKind::OrphanTeamarr,
                    managed_channel_id: Some(channel.id),
                    dispatcharr_channel_id: Some(channel.dispatcharr_channel_id),
                    dispatcharr_uuid: channel.dispatcharr_uuid.clone(),
                    channel_name: Some(channel.channel_name.clone()),
                    espn_event_id: Some(channel.espn_event_id.clone()),
                    drift_fields: Vec::new(),
                    suggested_action: "mark_deleted",
                    auto_fixable: self.settings.auto_fix_orphan_teamarr,
                });
                continue;
            };

            // Backfill missing UUIDs while we are here
            if channel.dispatcharr_uuid.is_none() {
                if let Some(uuid) = &remote.uuid {
                    if let Err(e) = self.db.update_dispatcharr_uuid(channel.id, uuid).await {
                        warn!("Failed to backfill UUID for channel {}: {}", channel.id, e);
                    } else {
                        debug!(
                            "Backfilled UUID for channel '{}': {}",
                            channel.channel_name, uuid
                        );
                        known_uuids.insert(uuid.clone());
                    }
                }
            }

            let expected_group_id = groups
                .get(&channel.event_group_id)
                .and_then(|g| g.channel_group_id);
            let drift_fields = detect_drift(channel, remote, expected_group_id);
            if !drift_fields.is_empty() {
                result.issues_found.push(ReconciliationIssue {
                    kind: IssueKind::Drift,
                    managed_channel_id: Some(channel.id),
                    dispatcharr_channel_id: Some(remote.id),
                    dispatcharr_uuid: remote.uuid.clone(),
                    channel_name: Some(channel.channel_name.clone()),
                    espn_event_id: Some(channel.espn_event_id.clone()),
                    drift_fields,
                    suggested_action: "sync",
                    auto_fixable: self.settings.auto_fix_drift,
                });
            }
        }

        // Pass 2: upstream channels claiming our tvg_id prefix without a
        // local row (neither by UUID nor by channel id)
        for remote in &upstream {
            let is_ours_by_uuid = remote
                .uuid
                .as_deref()
                .map(|u| known_uuids.contains(u))
                .unwrap_or(false);
            let is_ours_by_id = known_ids.contains(&remote.id);
            if is_ours_by_uuid || is_ours_by_id {
                continue;
            }

            let tvg_id = remote.tvg_id.as_deref().unwrap_or("");
            if let Some(event_id) = tvg_id.strip_prefix(MANAGED_TVG_PREFIX) {
                result.issues_found.push(ReconciliationIssue {
                    kind: IssueKind::OrphanDispatcharr,
                    managed_channel_id: None,
                    dispatcharr_channel_id: Some(remote.id),
                    dispatcharr_uuid: remote.uuid.clone(),
                    channel_name: Some(remote.name.clone()),
                    espn_event_id: Some(event_id.to_string()),
                    drift_fields: Vec::new(),
                    suggested_action: "delete_or_adopt",
                    auto_fixable: self.settings.auto_fix_orphan_dispatcharr,
                });
            }
        }

        // Pass 3: duplicates (skipped for groups in "separate" mode)
        match self.db.list_duplicate_events(group_ids).await {
            Ok(duplicates) => {
                for (espn_event_id, group_id, count) in duplicates {
                    let separate_mode = match self.db.get_event_group(group_id).await {
                        Ok(Some(group)) => group.duplicate_event_handling == "separate",
                        _ => false,
                    };
                    if separate_mode {
                        continue;
                    }
                    result.issues_found.push(ReconciliationIssue {
                        kind: IssueKind::Duplicate,
                        managed_channel_id: None,
                        dispatcharr_channel_id: None,
                        dispatcharr_uuid: None,
                        channel_name: None,
                        espn_event_id: Some(espn_event_id),
                        drift_fields: Vec::new(),
                        suggested_action: "merge",
                        auto_fixable: false,
                    });
                    debug!(
                        "Duplicate: {} channel(s) for one event in group {}",
                        count, group_id
                    );
                }
            }
            Err(e) => result.errors.push(format!("duplicate scan failed: {e}")),
        }

        if !result.issues_found.is_empty() {
            info!(
                "Reconciliation found {} issue(s): {} orphan_teamarr, {} orphan_dispatcharr, {} duplicate, {} drift",
                result.issues_found.len(),
                result.count(IssueKind::OrphanTeamarr),
                result.count(IssueKind::OrphanDispatcharr),
                result.count(IssueKind::Duplicate),
                result.count(IssueKind::Drift),
            );
        }

        let should_fix = auto_fix.unwrap_or(self.settings.auto_fix_enabled);
        if should_fix {
            self.apply_fixes(&mut result).await;
        }

        result.completed_at = Some(Utc::now());
        result
    }

    async fn apply_fixes(&self, result: &mut ReconciliationResult) {
        let issues = result.issues_found.clone();
        for issue in &issues {
            if !issue.auto_fixable {
                result.issues_skipped += 1;
                continue;
            }

            let fixed = match issue.kind {
                IssueKind::OrphanTeamarr => self.fix_orphan_teamarr(issue).await,
                IssueKind::OrphanDispatcharr => self.fix_orphan_dispatcharr(issue).await,
                IssueKind::Drift => self.fix_drift(issue).await,
                // Duplicate resolution requires manual review
                IssueKind::Duplicate => {
                    result.issues_skipped += 1;
                    continue;
                }
            };

            match fixed {
                Ok(()) => result.issues_fixed += 1,
                Err(e) => result.errors.push(format!(
                    "fix {} for {:?} failed: {}",
                    issue.kind.as_str(),
                    issue.channel_name,
                    e
                )),
            }
        }
    }

    async fn fix_orphan_teamarr(&self, issue: &ReconciliationIssue) -> anyhow::Result<()> {
        let Some(id) = issue.managed_channel_id else {
            return Ok(());
        };
        self.db.mark_managed_channel_deleted(id).await?;
        self.db
            .update_sync_status(
                id,
                SyncStatus::Orphaned,
                Some("channel not found in Dispatcharr - marked deleted"),
            )
            .await?;
        self.db
            .log_channel_history(
                id,
                "deleted",
                Some("reconciliation"),
                Some("orphan detected - channel missing from Dispatcharr"),
            )
            .await?;
        info!("Fixed orphan: marked {:?} as deleted", issue.channel_name);
        Ok(())
    }

    async fn fix_orphan_dispatcharr(&self, issue: &ReconciliationIssue) -> anyhow::Result<()> {
        let Some(channel_id) = issue.dispatcharr_channel_id else {
            return Ok(());
        };
        self.client
            .delete_channel(channel_id)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        info!(
            "Fixed orphan: deleted {:?} from Dispatcharr",
            issue.channel_name
        );
        Ok(())
    }

    async fn fix_drift(&self, issue: &ReconciliationIssue) -> anyhow::Result<()> {
        let (Some(managed_id), Some(channel_id)) =
            (issue.managed_channel_id, issue.dispatcharr_channel_id)
        else {
            return Ok(());
        };

        let mut update = Map::new();
        for drift in &issue.drift_fields {
            update.insert(drift.field.to_string(), drift.expected.clone());
        }
        if update.is_empty() {
            return Ok(());
        }

        let fields: Vec<&str> = issue.drift_fields.iter().map(|d| d.field).collect();
        self.client
            .update_channel(channel_id, Value::Object(update))
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        self.db
            .update_sync_status(
                managed_id,
                SyncStatus::InSync,
                Some("drift corrected by reconciliation"),
            )
            .await?;
        self.db
            .log_channel_history(
                managed_id,
                "modified",
                Some("reconciliation"),
                Some(&format!("drift corrected: {}", fields.join(", "))),
            )
            .await?;
        info!(
            "Fixed drift: synced {:?} ({})",
            issue.channel_name,
            fields.join(", ")
        );
        Ok(())
    }

    /// Verify a single channel's sync status against Dispatcharr.
    pub async fn verify_channel(&self, managed_channel_id: i64) -> anyhow::Result<SyncStatus> {
        let Some(channel) = self.db.get_managed_channel(managed_channel_id).await? else {
            anyhow::bail!("managed channel {} not found", managed_channel_id);
        };

        let remote = self
            .client
            .get_channel(channel.dispatcharr_channel_id)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        let Some(remote) = remote else {
            self.db
                .update_sync_status(
                    managed_channel_id,
                    SyncStatus::Orphaned,
                    Some("channel missing from Dispatcharr"),
                )
                .await?;
            return Ok(SyncStatus::Orphaned);
        };

        let expected_group_id = self
            .db
            .get_event_group(channel.event_group_id)
            .await
            .ok()
            .flatten()
            .and_then(|g| g.channel_group_id);
        let drift = detect_drift(&channel, &remote, expected_group_id);
        if drift.is_empty() {
            self.db
                .update_sync_status(managed_channel_id, SyncStatus::InSync, None)
                .await?;
            self.db
                .log_channel_history(managed_channel_id, "verified", Some("reconciliation"), None)
                .await?;
            Ok(SyncStatus::InSync)
        } else {
            let detail = drift
                .iter()
                .map(|d| format!("{}: expected {}, got {}", d.field, d.expected, d.actual))
                .collect::<Vec<_>>()
                .join("; ");
            self.db
                .update_sync_status(managed_channel_id, SyncStatus::Drifted, Some(&detail))
                .await?;
            Ok(SyncStatus::Drifted)
        }
    }
}

/// Compare local expectations against the upstream channel. The expected
/// tvg_id derives from the event id; channel group comes from the row's
/// group assignment recorded at creation.
fn detect_drift(
    local: &crate::models::ManagedChannel,
    remote: &DispatcharrChannel,
    expected_group_id: Option<i64>,
) -> Vec<DriftField> {
    let mut drift = Vec::new();

    if let Some(actual_number) = remote.channel_number {
        if local.channel_number != actual_number {
            drift.push(DriftField {
                field: "channel_number",
                expected: json!(local.channel_number),
                actual: json!(actual_number),
            });
        }
    }

    let expected_tvg_id = format!("{}{}", MANAGED_TVG_PREFIX, local.espn_event_id);
    if remote.tvg_id.as_deref() != Some(expected_tvg_id.as_str()) {
        drift.push(DriftField {
            field: "tvg_id",
            expected: json!(expected_tvg_id),
            actual: json!(remote.tvg_id),
        });
    }

    if let Some(expected) = expected_group_id {
        if remote.channel_group_id != Some(expected) {
            drift.push(DriftField {
                field: "channel_group_id",
                expected: json!(expected),
                actual: json!(remote.channel_group_id),
            });
        }
    }

    drift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ManagedChannel;

    fn local_channel() -> ManagedChannel {
        ManagedChannel {
            id: 1,
            event_group_id: 1,
            dispatcharr_channel_id: 42,
            dispatcharr_uuid: Some("uuid-42".to_string()),
            dispatcharr_stream_id: 77,
            channel_number: 5001,
            channel_name: "Giants @ Cowboys".to_string(),
            espn_event_id: "401547".to_string(),
            event_date: None,
            scheduled_delete_at: None,
            logo_id: None,
            sync_status: SyncStatus::InSync,
            deleted_at: None,
        }
    }

    fn remote_channel(number: i64, tvg_id: &str) -> DispatcharrChannel {
        serde_json::from_value(json!({
            "id": 42,
            "uuid": "uuid-42",
            "name": "Giants @ Cowboys",
            "channel_number": number,
            "tvg_id": tvg_id,
        }))
        .unwrap()
    }

    #[test]
    fn test_no_drift_when_in_sync() {
        let drift = detect_drift(
            &local_channel(),
            &remote_channel(5001, "teamarr-event-401547"),
            None,
        );
        assert!(drift.is_empty());
    }

    #[test]
    fn test_channel_number_drift_detected() {
        let drift = detect_drift(
            &local_channel(),
            &remote_channel(5002, "teamarr-event-401547"),
            None,
        );
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].field, "channel_number");
        assert_eq!(drift[0].expected, json!(5001));
        assert_eq!(drift[0].actual, json!(5002));
    }

    #[test]
    fn test_tvg_id_drift_detected() {
        let drift = detect_drift(&local_channel(), &remote_channel(5001, "wrong-id"), None);
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].field, "tvg_id");
    }

    #[test]
    fn test_channel_group_drift_detected() {
        let drift = detect_drift(
            &local_channel(),
            &remote_channel(5001, "teamarr-event-401547"),
            Some(20),
        );
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].field, "channel_group_id");
    }

    #[test]
    fn test_default_settings_gates() {
        let settings = ReconcilerSettings::default();
        assert!(settings.auto_fix_drift);
        assert!(settings.auto_fix_orphan_teamarr);
        assert!(!settings.auto_fix_orphan_dispatcharr);
        assert!(!settings.auto_fix_enabled);
    }
}
