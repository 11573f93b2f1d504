//! Stream-to-event matching
//!
//! Three tiers: the persistent fingerprint cache, team-based fuzzy
//! matching (both teams must hit), and event-name matching. Exception
//! keywords short-circuit everything and route the stream to a
//! dedicated channel downstream.

pub mod cache;
pub mod fuzzy;
pub mod stream;

pub use cache::StreamMatchCache;
pub use fuzzy::{FuzzyMatcher, MatchResult};
pub use stream::{
    BatchMatchResult, DetectionTier, MultiLeagueMatcher, SingleLeagueMatcher, StreamMatchResult,
};
