//! Channel, logo, group, and EPG management against Dispatcharr

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::auth::{parse_api_error, DispatcharrAuth};
use crate::errors::{AppError, AppResult};

/// A channel as Dispatcharr reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcharrChannel {
    pub id: i64,
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_channel_number")]
    pub channel_number: Option<i64>,
    #[serde(default)]
    pub tvg_id: Option<String>,
    #[serde(default)]
    pub channel_group_id: Option<i64>,
    #[serde(default)]
    pub streams: Vec<i64>,
    #[serde(default)]
    pub logo_id: Option<i64>,
}

// Dispatcharr serializes channel numbers as strings on some endpoints.
fn deserialize_channel_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().map(|f| f as i64),
        Some(Value::String(s)) => s.parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelGroup {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logo {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Outcome of a logo upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoUploadStatus {
    Created,
    FoundExisting,
}

/// Fields for creating a channel upstream.
#[derive(Debug, Clone)]
pub struct NewChannel<'a> {
    pub name: &'a str,
    pub channel_number: i64,
    pub stream_ids: &'a [i64],
    pub tvg_id: Option<&'a str>,
    pub channel_group_id: Option<i64>,
    pub logo_id: Option<i64>,
}

/// High-level channel management interface for Dispatcharr.
#[derive(Clone)]
pub struct DispatcharrClient {
    auth: DispatcharrAuth,
}

impl DispatcharrClient {
    pub fn new(auth: DispatcharrAuth) -> Self {
        Self { auth }
    }

    pub fn auth(&self) -> &DispatcharrAuth {
        &self.auth
    }

    async fn error_from_response(&self, context: &str, response: reqwest::Response) -> AppError {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = parse_api_error(status, &body);
        if status.is_client_error() {
            AppError::validation(format!("{context}: {message}"))
        } else {
            AppError::upstream(context.to_string(), message)
        }
    }

    /// All channels, paginated.
    pub async fn get_channels(&self) -> AppResult<Vec<DispatcharrChannel>> {
        let items = self
            .auth
            .get_paginated("/api/channels/channels/?page_size=1000")
            .await?;
        Ok(items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    /// A single channel, or None on 404.
    pub async fn get_channel(&self, channel_id: i64) -> AppResult<Option<DispatcharrChannel>> {
        let response = self
            .auth
            .get(&format!("/api/channels/channels/{channel_id}/"))
            .await?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(self.error_from_response("get channel", response).await),
        }
    }

    pub async fn create_channel(&self, new: NewChannel<'_>) -> AppResult<DispatcharrChannel> {
        let mut payload = Map::new();
        payload.insert("name".to_string(), json!(new.name));
        // Dispatcharr expects channel_number as a string
        payload.insert(
            "channel_number".to_string(),
            json!(new.channel_number.to_string()),
        );
        payload.insert("streams".to_string(), json!(new.stream_ids));
        if let Some(tvg_id) = new.tvg_id {
            payload.insert("tvg_id".to_string(), json!(tvg_id));
        }
        if let Some(group_id) = new.channel_group_id {
            payload.insert("channel_group_id".to_string(), json!(group_id));
        }
        if let Some(logo_id) = new.logo_id {
            payload.insert("logo_id".to_string(), json!(logo_id));
        }

        let response = self
            .auth
            .post("/api/channels/channels/", &Value::Object(payload))
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
            _ => Err(self.error_from_response("create channel", response).await),
        }
    }

    pub async fn update_channel(&self, channel_id: i64, mut data: Value) -> AppResult<DispatcharrChannel> {
        if let Some(number) = data.get("channel_number").and_then(Value::as_i64) {
            data["channel_number"] = json!(number.to_string());
        }
        let response = self
            .auth
            .patch(&format!("/api/channels/channels/{channel_id}/"), &data)
            .await?;
        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            _ => Err(self.error_from_response("update channel", response).await),
        }
    }

    /// Delete a channel. A 404 maps to NotFound so callers can treat the
    /// channel as already gone.
    pub async fn delete_channel(&self, channel_id: i64) -> AppResult<()> {
        debug!("Deleting channel {} from Dispatcharr", channel_id);
        let response = self
            .auth
            .delete(&format!("/api/channels/channels/{channel_id}/"))
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(AppError::not_found("channel", channel_id.to_string())),
            _ => Err(self.error_from_response("delete channel", response).await),
        }
    }

    /// Link a channel to Teamarr's EPG source via set-epg.
    pub async fn set_channel_epg(&self, channel_id: i64, epg_data_id: i64) -> AppResult<()> {
        let response = self
            .auth
            .post(
                &format!("/api/channels/channels/{channel_id}/set-epg/"),
                &json!({ "epg_data_id": epg_data_id }),
            )
            .await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            _ => Err(self.error_from_response("set channel epg", response).await),
        }
    }

    pub async fn get_channel_groups(&self) -> AppResult<Vec<ChannelGroup>> {
        let response = self.auth.get("/api/channels/groups/").await?;
        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            _ => Err(self.error_from_response("get channel groups", response).await),
        }
    }

    pub async fn create_channel_group(&self, name: &str) -> AppResult<ChannelGroup> {
        let response = self
            .auth
            .post("/api/channels/groups/", &json!({ "name": name }))
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
            _ => Err(self.error_from_response("create channel group", response).await),
        }
    }

    /// Upload a logo. If the URL already exists upstream, the existing
    /// logo is located by URL search and returned instead.
    pub async fn upload_logo(&self, name: &str, url: &str) -> AppResult<(i64, LogoUploadStatus)> {
        if url.is_empty() {
            return Err(AppError::validation("no logo URL provided"));
        }

        let response = self
            .auth
            .post("/api/channels/logos/", &json!({ "name": name, "url": url }))
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let logo: Logo = response.json().await?;
                Ok((logo.id, LogoUploadStatus::Created))
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                let error_str = body.to_string().to_lowercase();
                if error_str.contains("already exists") || error_str.contains("unique") {
                    if let Some(existing) = self.find_logo_by_url(url).await? {
                        return Ok((existing.id, LogoUploadStatus::FoundExisting));
                    }
                }
                Err(AppError::upstream(
                    "upload logo",
                    parse_api_error(status, &body),
                ))
            }
        }
    }

    async fn find_logo_by_url(&self, url: &str) -> AppResult<Option<Logo>> {
        let items = self
            .auth
            .get_paginated("/api/channels/logos/?page_size=100")
            .await?;
        Ok(items
            .into_iter()
            .filter_map(|v| serde_json::from_value::<Logo>(v).ok())
            .find(|logo| logo.url.as_deref() == Some(url)))
    }

    /// Delete a logo unless other channels still reference it upstream.
    /// Returns true when the logo was actually deleted.
    pub async fn delete_logo(&self, logo_id: i64) -> AppResult<bool> {
        // In-use check first
        let response = self
            .auth
            .get(&format!("/api/channels/channels/?logo_id={logo_id}"))
            .await?;
        if response.status() == StatusCode::OK {
            let data: Value = response.json().await.unwrap_or(Value::Null);
            let channels = match &data {
                Value::Object(obj) => obj.get("results").and_then(Value::as_array).cloned(),
                Value::Array(list) => Some(list.clone()),
                _ => None,
            };
            if let Some(channels) = channels {
                if !channels.is_empty() {
                    debug!(
                        "Logo {} still in use by {} channel(s) - keeping",
                        logo_id,
                        channels.len()
                    );
                    return Ok(false);
                }
            }
        }

        let response = self
            .auth
            .delete(&format!("/api/channels/logos/{logo_id}/"))
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                info!("Deleted logo {}", logo_id);
                Ok(true)
            }
            StatusCode::NOT_FOUND => {
                debug!("Logo {} not found (already deleted?)", logo_id);
                Ok(false)
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                let error_str = body.to_string().to_lowercase();
                if error_str.contains("in use") || error_str.contains("referenced") {
                    return Ok(false);
                }
                Err(AppError::upstream(
                    "delete logo",
                    parse_api_error(status, &body),
                ))
            }
        }
    }

    /// Toggle a channel's membership in a channel profile.
    pub async fn set_profile_channel_enabled(
        &self,
        profile_id: i64,
        channel_id: i64,
        enabled: bool,
    ) -> AppResult<()> {
        let response = self
            .auth
            .request(
                Method::PATCH,
                &format!("/api/channels/profiles/{profile_id}/channels/{channel_id}/"),
                Some(&json!({ "enabled": enabled })),
            )
            .await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            _ => {
                Err(self
                    .error_from_response("set profile channel enabled", response)
                    .await)
            }
        }
    }

    /// Trigger an EPG source import upstream (202 expected).
    pub async fn trigger_epg_import(&self, epg_source_id: i64) -> AppResult<()> {
        let response = self
            .auth
            .post("/api/epg/import/", &json!({ "id": epg_source_id }))
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(()),
            _ => Err(self.error_from_response("trigger epg import", response).await),
        }
    }

    pub async fn test_connection(&self) -> AppResult<usize> {
        let channels = self.get_channels().await?;
        Ok(channels.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_number_deserializes_from_string_or_number() {
        let as_string: DispatcharrChannel =
            serde_json::from_value(json!({ "id": 1, "name": "A", "channel_number": "5001" }))
                .unwrap();
        assert_eq!(as_string.channel_number, Some(5001));

        let as_number: DispatcharrChannel =
            serde_json::from_value(json!({ "id": 2, "name": "B", "channel_number": 5002 }))
                .unwrap();
        assert_eq!(as_number.channel_number, Some(5002));

        let missing: DispatcharrChannel =
            serde_json::from_value(json!({ "id": 3, "name": "C" })).unwrap();
        assert_eq!(missing.channel_number, None);
    }

    #[test]
    fn test_channel_defaults() {
        let channel: DispatcharrChannel =
            serde_json::from_value(json!({ "id": 9, "name": "bare" })).unwrap();
        assert!(channel.uuid.is_none());
        assert!(channel.streams.is_empty());
        assert!(channel.tvg_id.is_none());
    }
}
