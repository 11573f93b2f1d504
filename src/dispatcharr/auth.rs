//! Just-in-time authentication for the Dispatcharr API
//!
//! Tokens are cached per (base_url, username) and treated as valid until
//! one minute before their five-minute expiry. A miss first attempts a
//! refresh-token exchange, then a full password exchange. Requests that
//! come back 401 clear the session exactly once and retry; a second 401
//! surfaces as an auth failure.

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::errors::{AppError, AppResult};

/// Dispatcharr access tokens live ~5 minutes.
const TOKEN_VALIDITY_MINUTES: i64 = 5;
/// Refresh this long before expiry.
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 1;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Clone)]
struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    fn token_valid(&self) -> bool {
        match (&self.access_token, &self.expires_at) {
            (Some(_), Some(expiry)) => Utc::now() < *expiry,
            _ => false,
        }
    }

    fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.expires_at = None;
    }
}

/// Shared token cache keyed by (base_url, username).
///
/// Owned by the orchestrator and passed into each client rather than
/// looked up globally. The per-key mutex guarantees concurrent callers
/// on the same key observe at most one in-flight refresh or password
/// exchange.
#[derive(Default)]
pub struct TokenCache {
    sessions: std::sync::Mutex<HashMap<(String, String), Arc<Mutex<Session>>>>,
}

impl TokenCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn session_for(&self, base_url: &str, username: &str) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().expect("token cache lock poisoned");
        sessions
            .entry((base_url.to_string(), username.to_string()))
            .or_default()
            .clone()
    }
}

/// Authenticated HTTP front for all outbound Dispatcharr calls.
#[derive(Clone)]
pub struct DispatcharrAuth {
    base_url: String,
    username: String,
    password: String,
    client: Client,
    cache: Arc<TokenCache>,
}

impl DispatcharrAuth {
    pub fn new(base_url: &str, username: &str, password: &str, cache: Arc<TokenCache>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("teamarr/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client,
            cache,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token_expiry() -> DateTime<Utc> {
        Utc::now() + Duration::minutes(TOKEN_VALIDITY_MINUTES - TOKEN_REFRESH_BUFFER_MINUTES)
    }

    /// Get a valid access token, refreshing or re-authenticating as needed.
    async fn get_token(&self) -> AppResult<String> {
        let session = self.cache.session_for(&self.base_url, &self.username);
        let mut session = session.lock().await;

        if session.token_valid() {
            return Ok(session.access_token.clone().expect("valid session has token"));
        }

        // Try refresh-token exchange first
        if let Some(refresh) = session.refresh_token.clone() {
            match self.refresh_access_token(&refresh).await {
                Ok(access) => {
                    session.access_token = Some(access.clone());
                    session.expires_at = Some(Self::token_expiry());
                    debug!("Dispatcharr token refreshed");
                    return Ok(access);
                }
                Err(e) => {
                    warn!("Token refresh failed, falling back to password auth: {}", e);
                    session.clear();
                }
            }
        }

        // Full password exchange
        let (access, refresh) = self.authenticate().await?;
        session.access_token = Some(access.clone());
        session.refresh_token = Some(refresh);
        session.expires_at = Some(Self::token_expiry());
        info!("Dispatcharr authentication successful for {}", self.username);
        Ok(access)
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<String> {
        let response = self
            .client
            .post(format!("{}/api/accounts/token/refresh/", self.base_url))
            .json(&json!({ "refresh": refresh_token }))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(AppError::auth(format!(
                "token refresh returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        body.get("access")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::parse("token refresh", "missing access token"))
    }

    async fn authenticate(&self) -> AppResult<(String, String)> {
        debug!("Authenticating to {} as {}", self.base_url, self.username);

        let response = self
            .client
            .post(format!("{}/api/accounts/token/", self.base_url))
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: Value = response.json().await?;
                let access = body
                    .get("access")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::parse("token exchange", "missing access token"))?;
                let refresh = body
                    .get("refresh")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::parse("token exchange", "missing refresh token"))?;
                Ok((access.to_string(), refresh.to_string()))
            }
            StatusCode::UNAUTHORIZED => {
                error!("Authentication failed: invalid credentials");
                Err(AppError::auth("invalid credentials"))
            }
            StatusCode::FORBIDDEN => Err(AppError::auth("forbidden")),
            status => Err(AppError::auth(format!("authentication returned {status}"))),
        }
    }

    async fn clear_session(&self) {
        let session = self.cache.session_for(&self.base_url, &self.username);
        session.lock().await.clear();
    }

    /// Make an authenticated request. On 401 the session is cleared
    /// exactly once and the call retried; a second 401 surfaces as an
    /// auth failure.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> AppResult<Response> {
        let response = self.send_once(method.clone(), endpoint, body).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            info!("Received 401, clearing session and retrying");
            self.clear_session().await;
            let retried = self.send_once(method, endpoint, body).await?;
            if retried.status() == StatusCode::UNAUTHORIZED {
                return Err(AppError::auth("request unauthorized after token refresh"));
            }
            return Ok(retried);
        }

        Ok(response)
    }

    async fn send_once(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> AppResult<Response> {
        let token = self.get_token().await?;
        let url = format!("{}{}", self.base_url, endpoint);

        let mut builder = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bearer {token}"));
        if let Some(body) = body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    pub async fn get(&self, endpoint: &str) -> AppResult<Response> {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> AppResult<Response> {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    pub async fn patch(&self, endpoint: &str, body: &Value) -> AppResult<Response> {
        self.request(Method::PATCH, endpoint, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> AppResult<Response> {
        self.request(Method::DELETE, endpoint, None).await
    }

    /// Fetch all items from a paginated endpoint, following `next` links
    /// (relative or absolute) until exhausted. Handles both paginated
    /// dict responses (`results` + `next`) and plain list responses.
    pub async fn get_paginated(&self, initial_endpoint: &str) -> AppResult<Vec<Value>> {
        let mut all_items = Vec::new();
        let mut next_page = Some(initial_endpoint.to_string());

        while let Some(endpoint) = next_page.take() {
            let response = self.get(&endpoint).await?;
            if response.status() != StatusCode::OK {
                return Err(AppError::upstream(
                    endpoint,
                    format!("pagination returned {}", response.status()),
                ));
            }

            let data: Value = response.json().await?;
            match data {
                Value::Object(ref obj) if obj.contains_key("results") => {
                    if let Some(results) = obj.get("results").and_then(Value::as_array) {
                        all_items.extend(results.iter().cloned());
                    }
                    next_page = obj
                        .get("next")
                        .and_then(Value::as_str)
                        .map(normalize_next_link);
                }
                Value::Array(items) => {
                    all_items.extend(items);
                }
                _ => {}
            }
        }

        Ok(all_items)
    }
}

/// Reduce an absolute `next` URL to path+query so it can be re-sent
/// through the authenticated base URL.
fn normalize_next_link(next: &str) -> String {
    if next.starts_with("http") {
        if let Ok(parsed) = url::Url::parse(next) {
            return match parsed.query() {
                Some(query) => format!("{}?{}", parsed.path(), query),
                None => parsed.path().to_string(),
            };
        }
    }
    next.to_string()
}

/// Flatten an API error body into a human-readable message. Field error
/// shapes like `{"name": ["This field is required"]}` become
/// `name: This field is required`.
pub fn parse_api_error(status: StatusCode, body: &Value) -> String {
    match body {
        Value::Object(obj) if !obj.is_empty() => {
            let mut parts = Vec::new();
            for (field, msgs) in obj {
                match msgs {
                    Value::Array(list) => {
                        let joined = list
                            .iter()
                            .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
                            .collect::<Vec<_>>()
                            .join(", ");
                        parts.push(format!("{field}: {joined}"));
                    }
                    Value::String(s) => parts.push(format!("{field}: {s}")),
                    other => parts.push(format!("{field}: {other}")),
                }
            }
            parts.join("; ")
        }
        Value::String(s) => s.clone(),
        _ => format!("HTTP {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_error_field_lists() {
        let body = json!({
            "name": ["This field is required"],
            "channel_number": ["must be unique", "must be positive"]
        });
        let msg = parse_api_error(StatusCode::BAD_REQUEST, &body);
        assert!(msg.contains("name: This field is required"));
        assert!(msg.contains("channel_number: must be unique, must be positive"));
    }

    #[test]
    fn test_parse_api_error_fallback() {
        let msg = parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, &Value::Null);
        assert_eq!(msg, "HTTP 500 Internal Server Error");
    }

    #[test]
    fn test_normalize_next_link_absolute() {
        assert_eq!(
            normalize_next_link("http://host:9191/api/channels/channels/?page=2&page_size=1000"),
            "/api/channels/channels/?page=2&page_size=1000"
        );
        assert_eq!(
            normalize_next_link("/api/channels/channels/?page=3"),
            "/api/channels/channels/?page=3"
        );
    }

    #[test]
    fn test_session_token_validity() {
        let mut session = Session::default();
        assert!(!session.token_valid());

        session.access_token = Some("tok".to_string());
        session.expires_at = Some(Utc::now() + Duration::minutes(2));
        assert!(session.token_valid());

        session.expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(!session.token_valid());

        session.clear();
        assert!(session.access_token.is_none());
    }
}
