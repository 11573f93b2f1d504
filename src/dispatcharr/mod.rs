//! Dispatcharr API integration
//!
//! All outbound calls go through [`auth::DispatcharrAuth`], which fronts
//! them with JIT token caching, proactive refresh, and retry-on-401.

pub mod auth;
pub mod client;
pub mod m3u;

pub use auth::{DispatcharrAuth, TokenCache};
pub use client::{DispatcharrChannel, DispatcharrClient, LogoUploadStatus, NewChannel};
pub use m3u::{BatchRefreshResult, M3uManager, RefreshOptions, Stream};
