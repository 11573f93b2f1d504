//! EPG file pipeline
//!
//! File layout in the data directory:
//!   teams.xml            team-based EPG (persists across cycles)
//!   event_epg_<id>.xml   per-group event EPG fragments
//!   teamarr.xml          final merged output
//!
//! Consolidation merges teams.xml plus every event fragment into the
//! final file, deduplicating channels by id (first wins) and
//! concatenating programmes. Event fragments are archived to `.bak`
//! once the full cycle completes; teams.xml is never archived between
//! cycles so event-only refreshes still include it.

use chrono::Utc;
use chrono_tz::Tz;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::xmltv::{parse_xmltv, write_xmltv};
use crate::errors::{AppError, AppResult};
use crate::models::{Programme, XmltvChannel};

pub struct EpgPaths {
    pub data_dir: PathBuf,
    pub teams: PathBuf,
    pub combined: PathBuf,
}

impl EpgPaths {
    pub fn new(data_dir: &Path, output_path: Option<&str>) -> Self {
        let combined = output_path
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("teamarr.xml"));
        Self {
            data_dir: data_dir.to_path_buf(),
            teams: data_dir.join("teams.xml"),
            combined,
        }
    }

    pub fn event_fragment(&self, group_id: i64) -> PathBuf {
        self.data_dir.join(format!("event_epg_{group_id}.xml"))
    }
}

/// Merge statistics reported back to the run result.
#[derive(Debug, Default)]
pub struct MergeResult {
    pub files_merged: usize,
    pub channel_count: usize,
    pub programme_count: usize,
}

pub struct EpgConsolidator {
    paths: EpgPaths,
    timezone: Tz,
}

impl EpgConsolidator {
    pub fn new(paths: EpgPaths, timezone: Tz) -> Self {
        Self { paths, timezone }
    }

    pub fn paths(&self) -> &EpgPaths {
        &self.paths
    }

    fn write_file(&self, path: &Path, content: &str) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::internal(format!("create {}: {e}", parent.display())))?;
        }
        std::fs::write(path, content)
            .map_err(|e| AppError::internal(format!("write {}: {e}", path.display())))
    }

    /// Save a fresh teams.xml, archiving the previous one to `.bak`.
    pub fn save_team_fragment(
        &self,
        channels: &[XmltvChannel],
        programmes: &[Programme],
    ) -> AppResult<()> {
        if self.paths.teams.exists() {
            archive_file(&self.paths.teams);
        }
        let xml = write_xmltv(channels, programmes, self.timezone, None)?;
        self.write_file(&self.paths.teams, &xml)?;
        info!("Saved team EPG to {}", self.paths.teams.display());
        Ok(())
    }

    /// Save a per-group event fragment.
    pub fn save_event_fragment(
        &self,
        group_id: i64,
        channels: &[XmltvChannel],
        programmes: &[Programme],
    ) -> AppResult<PathBuf> {
        let path = self.paths.event_fragment(group_id);
        let xml = write_xmltv(channels, programmes, self.timezone, None)?;
        self.write_file(&path, &xml)?;
        debug!("Saved event EPG fragment {}", path.display());
        Ok(path)
    }

    fn list_event_fragments(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.paths.data_dir) else {
            return Vec::new();
        };
        let mut fragments: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("event_epg_") && n.ends_with(".xml"))
                    .unwrap_or(false)
            })
            .collect();
        fragments.sort();
        fragments
    }

    /// Merge teams.xml and every event fragment into the final output.
    /// Channels deduplicate by id (first wins); programmes concatenate.
    pub fn merge_all(&self) -> AppResult<MergeResult> {
        let mut files: Vec<PathBuf> = Vec::new();
        if self.paths.teams.exists() {
            files.push(self.paths.teams.clone());
        }
        files.extend(self.list_event_fragments());

        let mut seen_channels: HashSet<String> = HashSet::new();
        let mut channels: Vec<XmltvChannel> = Vec::new();
        let mut programmes: Vec<Programme> = Vec::new();
        let mut merged = 0;

        for file in &files {
            let content = match std::fs::read_to_string(file) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping unreadable fragment {}: {}", file.display(), e);
                    continue;
                }
            };
            match parse_xmltv(&content) {
                Ok((file_channels, file_programmes)) => {
                    for channel in file_channels {
                        if seen_channels.insert(channel.id.clone()) {
                            channels.push(channel);
                        }
                    }
                    programmes.extend(file_programmes);
                    merged += 1;
                }
                Err(e) => {
                    warn!("Skipping unparsable fragment {}: {}", file.display(), e);
                }
            }
        }

        let banner = format!(
            " Generated with Teamarr v{} at {} ",
            env!("CARGO_PKG_VERSION"),
            Utc::now().to_rfc3339()
        );
        let xml = write_xmltv(&channels, &programmes, self.timezone, Some(&banner))?;
        self.write_file(&self.paths.combined, &xml)?;

        info!(
            "Merged {} file(s) -> {} ({} channels, {} programmes)",
            merged,
            self.paths.combined.display(),
            channels.len(),
            programmes.len()
        );

        Ok(MergeResult {
            files_merged: merged,
            channel_count: channels.len(),
            programme_count: programmes.len(),
        })
    }

    /// Finalize the cycle: sweep stale `.bak` archives (sparing
    /// teams.xml.bak), then archive every event fragment.
    pub fn finalize(&self) -> AppResult<usize> {
        let swept = self.sweep_old_archives();
        let mut archived = 0;
        for fragment in self.list_event_fragments() {
            if archive_file(&fragment) {
                archived += 1;
            }
        }
        info!(
            "Finalized EPG cycle: archived {} fragment(s), swept {} old archive(s)",
            archived, swept
        );
        Ok(archived)
    }

    /// Remove `.bak` files from previous cycles. teams.xml.bak is kept
    /// because teams.xml rotation is handled at save time.
    fn sweep_old_archives(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.paths.data_dir) else {
            return 0;
        };
        let mut swept = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with("event_epg_") && name.ends_with(".xml.bak") {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!("Removed old archive {}", name);
                        swept += 1;
                    }
                    Err(e) => warn!("Could not remove {}: {}", name, e),
                }
            }
        }
        swept
    }
}

/// Rename a file to `.bak`, replacing any previous archive.
fn archive_file(path: &Path) -> bool {
    let bak = PathBuf::from(format!("{}.bak", path.display()));
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }
    match std::fs::rename(path, &bak) {
        Ok(()) => {
            debug!("Archived {} -> {}", path.display(), bak.display());
            true
        }
        Err(e) => {
            warn!("Could not archive {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_timezone;
    use chrono::TimeZone;

    fn consolidator(dir: &Path) -> EpgConsolidator {
        EpgConsolidator::new(EpgPaths::new(dir, None), parse_timezone("America/New_York"))
    }

    fn sample(channel_id: &str, title: &str) -> (Vec<XmltvChannel>, Vec<Programme>) {
        let channels = vec![XmltvChannel {
            id: channel_id.to_string(),
            name: title.to_string(),
            icon: None,
        }];
        let programmes = vec![Programme::new(
            channel_id,
            title,
            Utc.with_ymd_and_hms(2025, 12, 14, 18, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 12, 14, 21, 0, 0).unwrap(),
        )];
        (channels, programmes)
    }

    #[test]
    fn test_merge_dedupes_channels_and_concatenates_programmes() {
        let dir = tempfile::tempdir().unwrap();
        let consolidator = consolidator(dir.path());

        let (teams_channels, teams_programmes) = sample("teamarr-team-8", "Lions");
        consolidator
            .save_team_fragment(&teams_channels, &teams_programmes)
            .unwrap();

        // Two groups that both carry the same event channel
        let (event_channels, event_programmes) = sample("teamarr-event-401547", "Giants @ Cowboys");
        consolidator
            .save_event_fragment(1, &event_channels, &event_programmes)
            .unwrap();
        consolidator
            .save_event_fragment(2, &event_channels, &event_programmes)
            .unwrap();

        let result = consolidator.merge_all().unwrap();
        assert_eq!(result.files_merged, 3);
        assert_eq!(result.channel_count, 2); // deduped by id
        assert_eq!(result.programme_count, 3); // concatenated

        let combined = std::fs::read_to_string(dir.path().join("teamarr.xml")).unwrap();
        assert!(combined.contains("<!DOCTYPE tv SYSTEM \"xmltv.dtd\">"));
        assert!(combined.contains("Generated with Teamarr"));
    }

    #[test]
    fn test_finalize_archives_event_fragments_but_not_teams() {
        let dir = tempfile::tempdir().unwrap();
        let consolidator = consolidator(dir.path());

        let (channels, programmes) = sample("teamarr-event-1", "A");
        consolidator.save_team_fragment(&channels, &programmes).unwrap();
        consolidator.save_event_fragment(1, &channels, &programmes).unwrap();

        consolidator.merge_all().unwrap();
        consolidator.finalize().unwrap();

        assert!(dir.path().join("teams.xml").exists());
        assert!(!dir.path().join("event_epg_1.xml").exists());
        assert!(dir.path().join("event_epg_1.xml.bak").exists());
    }

    #[test]
    fn test_sweep_spares_teams_backup() {
        let dir = tempfile::tempdir().unwrap();
        let consolidator = consolidator(dir.path());

        std::fs::write(dir.path().join("teams.xml.bak"), "old").unwrap();
        std::fs::write(dir.path().join("event_epg_9.xml.bak"), "old").unwrap();

        consolidator.finalize().unwrap();

        assert!(dir.path().join("teams.xml.bak").exists());
        assert!(!dir.path().join("event_epg_9.xml.bak").exists());
    }

    #[test]
    fn test_team_fragment_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let consolidator = consolidator(dir.path());

        let (channels, programmes) = sample("teamarr-team-8", "Lions");
        consolidator.save_team_fragment(&channels, &programmes).unwrap();
        consolidator.save_team_fragment(&channels, &programmes).unwrap();

        assert!(dir.path().join("teams.xml").exists());
        assert!(dir.path().join("teams.xml.bak").exists());
    }
}
