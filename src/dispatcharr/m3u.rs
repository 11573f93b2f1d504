//! M3U account refresh and stream listing
//!
//! Upstream refreshes are asynchronous on the Dispatcharr side: a trigger
//! returns 202 and completion is detected by polling each account's
//! `updated_at` timestamp and `status` until one of them moves or a
//! bounded deadline passes. Batch refreshes dispatch every trigger
//! concurrently, then drive a single polling loop over the pending set.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::auth::DispatcharrAuth;
use crate::errors::{AppError, AppResult};

/// Upstream refresh lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Idle,
    Fetching,
    Parsing,
    Error,
    Success,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct M3uAccount {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub status: AccountStatus,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message: Option<String>,
}

/// A stream as listed under a Dispatcharr channel group.
#[derive(Debug, Clone, Deserialize)]
pub struct Stream {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub tvg_id: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

/// Per-account outcome of a batch refresh.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub success: bool,
    pub skipped: bool,
    pub message: String,
    pub duration: Duration,
}

/// Aggregate result of a parallel refresh batch.
#[derive(Debug, Clone, Default)]
pub struct BatchRefreshResult {
    pub outcomes: HashMap<i64, RefreshOutcome>,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub duration: Duration,
}

impl BatchRefreshResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed_count == 0
    }

    fn tally(&mut self) {
        self.succeeded_count = self.outcomes.values().filter(|o| o.success).count();
        self.failed_count = self.outcomes.len() - self.succeeded_count;
        self.skipped_count = self.outcomes.values().filter(|o| o.skipped).count();
    }
}

/// Tuning for batch refresh polling.
#[derive(Debug, Clone, Copy)]
pub struct RefreshOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub skip_if_recent_minutes: i64,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            skip_if_recent_minutes: 60,
        }
    }
}

#[derive(Clone)]
pub struct M3uManager {
    auth: DispatcharrAuth,
}

impl M3uManager {
    pub fn new(auth: DispatcharrAuth) -> Self {
        Self { auth }
    }

    pub async fn list_accounts(&self) -> AppResult<Vec<M3uAccount>> {
        let items = self
            .auth
            .get_paginated("/api/m3u/accounts/?page_size=100")
            .await?;
        Ok(items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    pub async fn get_account(&self, account_id: i64) -> AppResult<Option<M3uAccount>> {
        let response = self
            .auth
            .get(&format!("/api/m3u/accounts/{account_id}/"))
            .await?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(AppError::upstream(
                "get m3u account",
                format!("HTTP {status}"),
            )),
        }
    }

    /// Trigger an asynchronous refresh (202 expected).
    pub async fn trigger_refresh(&self, account_id: i64) -> AppResult<()> {
        let response = self
            .auth
            .post(&format!("/api/m3u/refresh/{account_id}/"), &Value::Null)
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(()),
            status => Err(AppError::upstream(
                "trigger m3u refresh",
                format!("HTTP {status}"),
            )),
        }
    }

    /// Streams visible in a Dispatcharr channel group.
    pub async fn list_group_streams(&self, group_id: i64) -> AppResult<Vec<Stream>> {
        let items = self
            .auth
            .get_paginated(&format!(
                "/api/channels/streams/?channel_group={group_id}&page_size=500"
            ))
            .await?;
        Ok(items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    /// Refresh multiple accounts in parallel and wait for all to finish.
    ///
    /// Accounts refreshed within `skip_if_recent_minutes` are skipped
    /// entirely. Triggers are dispatched concurrently, then a single loop
    /// polls pending accounts until `updated_at` changes, `status` becomes
    /// `error`, the deadline passes, or the run is cancelled.
    pub async fn refresh_multiple_accounts(
        &self,
        account_ids: &[i64],
        options: RefreshOptions,
        cancel: &CancellationToken,
    ) -> AppResult<BatchRefreshResult> {
        let mut result = BatchRefreshResult::default();
        if account_ids.is_empty() {
            return Ok(result);
        }

        let started = Instant::now();
        let now = Utc::now();

        // Dedupe while preserving order
        let mut unique_ids: Vec<i64> = Vec::new();
        for id in account_ids {
            if !unique_ids.contains(id) {
                unique_ids.push(*id);
            }
        }

        // Record initial state; skip recently refreshed accounts
        let mut initial_updated: HashMap<i64, Option<DateTime<Utc>>> = HashMap::new();
        let mut to_refresh: Vec<i64> = Vec::new();

        for account_id in &unique_ids {
            let account = self.get_account(*account_id).await?;
            let Some(account) = account else {
                result.outcomes.insert(
                    *account_id,
                    RefreshOutcome {
                        success: false,
                        skipped: false,
                        message: "account not found".to_string(),
                        duration: Duration::ZERO,
                    },
                );
                continue;
            };

            if options.skip_if_recent_minutes > 0 {
                if let Some(updated_at) = account.updated_at {
                    let age_minutes = (now - updated_at).num_minutes();
                    if age_minutes < options.skip_if_recent_minutes {
                        info!(
                            "M3U account {} refreshed {}min ago, skipping",
                            account_id, age_minutes
                        );
                        result.outcomes.insert(
                            *account_id,
                            RefreshOutcome {
                                success: true,
                                skipped: true,
                                message: format!("skipped - refreshed {age_minutes} min ago"),
                                duration: Duration::ZERO,
                            },
                        );
                        continue;
                    }
                }
            }

            initial_updated.insert(*account_id, account.updated_at);
            to_refresh.push(*account_id);
        }

        if to_refresh.is_empty() {
            result.duration = started.elapsed();
            result.tally();
            return Ok(result);
        }

        // Dispatch all triggers concurrently
        let triggers = to_refresh.iter().map(|account_id| {
            let manager = self.clone();
            let account_id = *account_id;
            async move { (account_id, manager.trigger_refresh(account_id).await) }
        });

        let mut pending: Vec<i64> = Vec::new();
        for (account_id, trigger_result) in join_all(triggers).await {
            match trigger_result {
                Ok(()) => pending.push(account_id),
                Err(e) => {
                    warn!("Failed to trigger refresh for account {}: {}", account_id, e);
                    result.outcomes.insert(
                        account_id,
                        RefreshOutcome {
                            success: false,
                            skipped: false,
                            message: format!("trigger failed: {e}"),
                            duration: started.elapsed(),
                        },
                    );
                }
            }
        }

        // Poll until every pending account completes or the deadline hits
        let deadline = started + options.timeout;
        while !pending.is_empty() && Instant::now() < deadline {
            tokio::select! {
                _ = sleep(options.poll_interval) => {}
                _ = cancel.cancelled() => {
                    debug!("Refresh polling cancelled with {} account(s) pending", pending.len());
                    break;
                }
            }

            let mut still_pending = Vec::new();
            for account_id in pending.drain(..) {
                let current = match self.get_account(account_id).await {
                    Ok(Some(account)) => account,
                    Ok(None) | Err(_) => {
                        still_pending.push(account_id);
                        continue;
                    }
                };

                let changed = current.updated_at != initial_updated[&account_id];
                if changed {
                    let success = current.status != AccountStatus::Error;
                    result.outcomes.insert(
                        account_id,
                        RefreshOutcome {
                            success,
                            skipped: false,
                            message: current
                                .last_message
                                .unwrap_or_else(|| "refresh completed".to_string()),
                            duration: started.elapsed(),
                        },
                    );
                } else if current.status == AccountStatus::Error {
                    result.outcomes.insert(
                        account_id,
                        RefreshOutcome {
                            success: false,
                            skipped: false,
                            message: current
                                .last_message
                                .unwrap_or_else(|| "refresh failed".to_string()),
                            duration: started.elapsed(),
                        },
                    );
                } else {
                    still_pending.push(account_id);
                }
            }
            pending = still_pending;
        }

        // Whatever is left timed out (or was cancelled)
        for account_id in pending {
            result.outcomes.insert(
                account_id,
                RefreshOutcome {
                    success: false,
                    skipped: false,
                    message: format!("refresh timed out after {:?}", options.timeout),
                    duration: started.elapsed(),
                },
            );
        }

        result.duration = started.elapsed();
        result.tally();
        info!(
            "M3U batch refresh: {} succeeded, {} failed, {} skipped in {:?}",
            result.succeeded_count, result.failed_count, result.skipped_count, result.duration
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_status_parses_lowercase() {
        let account: M3uAccount = serde_json::from_value(json!({
            "id": 4,
            "status": "fetching",
            "updated_at": "2025-12-14T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(account.status, AccountStatus::Fetching);
        assert!(account.updated_at.is_some());
    }

    #[test]
    fn test_batch_result_tally() {
        let mut result = BatchRefreshResult::default();
        result.outcomes.insert(
            1,
            RefreshOutcome {
                success: true,
                skipped: true,
                message: "skipped".to_string(),
                duration: Duration::ZERO,
            },
        );
        result.outcomes.insert(
            2,
            RefreshOutcome {
                success: false,
                skipped: false,
                message: "timed out".to_string(),
                duration: Duration::from_secs(120),
            },
        );
        result.tally();
        assert_eq!(result.succeeded_count, 1);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert!(!result.all_succeeded());
    }
}
