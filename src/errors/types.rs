//! Error type definitions for Teamarr
//!
//! This module defines all error types used throughout the application.
//! The taxonomy mirrors how failures propagate: auth and fatal-config
//! errors abort the current operation or run, upstream-state and
//! not-found errors are per-record, cache contention is retried before
//! it surfaces.

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the
/// application. It uses `thiserror` to provide automatic error trait
/// implementations and proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication failures (401/403 after retry, bad credentials)
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Transient network failures (DNS, connect, TLS, read timeout)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 4xx responses with parsed field errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Upstream reported a failure state (refresh status=error, 409 on create)
    #[error("Upstream error: {context} - {message}")]
    UpstreamState { context: String, message: String },

    /// 404 on a tracked resource
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// SQLite lock contention that survived the retry policy
    #[error("Cache contention: {message}")]
    CacheContention { message: String },

    /// Missing settings row, unresolvable provider - aborts the run
    #[error("Configuration error: {message}")]
    FatalConfig { message: String },

    /// Response body could not be parsed into the expected shape
    #[error("Parse error: {context} - {message}")]
    Parse { context: String, message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Convenience alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// Convenience methods for creating common error types
impl AppError {
    /// Create an authentication error with a custom message
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an upstream-state error for a specific context
    pub fn upstream<C: Into<String>, M: Into<String>>(context: C, message: M) -> Self {
        Self::UpstreamState {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a cache contention error
    pub fn cache_contention<S: Into<String>>(message: S) -> Self {
        Self::CacheContention {
            message: message.into(),
        }
    }

    /// Create a fatal configuration error
    pub fn fatal_config<S: Into<String>>(message: S) -> Self {
        Self::FatalConfig {
            message: message.into(),
        }
    }

    /// Create a parse error for a specific payload
    pub fn parse<C: Into<String>, M: Into<String>>(context: C, message: M) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True if this error should abort the entire generation run
    /// rather than just the current record or group.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfig { .. } | Self::Database(_))
    }
}
