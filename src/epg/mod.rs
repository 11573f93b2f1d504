//! EPG composition: programme generation, XMLTV emission, consolidation

pub mod consolidator;
pub mod event;
pub mod team;
pub mod xmltv;

pub use consolidator::{EpgConsolidator, EpgPaths, MergeResult};
pub use event::{EventEpgGenerator, EventEpgOptions, EventEpgOutput};
pub use team::{TeamEpgGenerator, TeamEpgOptions};
