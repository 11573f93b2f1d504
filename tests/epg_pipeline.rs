//! Matched streams through the event generator, fragment files, and
//! consolidation into the final document

mod common;

use common::{lions_bears, nfl_event, team};
use tempfile::tempdir;

use teamarr::epg::xmltv::parse_xmltv;
use teamarr::epg::{EpgConsolidator, EpgPaths, EventEpgGenerator, EventEpgOptions};
use teamarr::models::{
    EventGroup, MatchedStream, Template, XmltvFlags,
};
use teamarr::utils::time::parse_timezone;

fn group(id: i64) -> EventGroup {
    EventGroup {
        id,
        name: format!("Group {id}"),
        enabled: true,
        assigned_league: Some("nfl".to_string()),
        assigned_sport: Some("football".to_string()),
        is_multi_sport: false,
        dispatcharr_group_id: Some(10),
        channel_group_id: Some(20),
        channel_start: Some(5000),
        create_timing: None,
        delete_timing: None,
        event_template_id: Some(1),
        exception_keywords: Vec::new(),
        duplicate_event_handling: "consolidate".to_string(),
        create_unmatched_channels: false,
        unmatched_channel_epg_source_id: None,
    }
}

fn template() -> Template {
    Template {
        title_format: "{away_team} @ {home_team}".to_string(),
        pregame_enabled: true,
        postgame_enabled: true,
        pregame_title: "Pregame Coverage".to_string(),
        postgame_title: "Postgame Recap".to_string(),
        xmltv_categories: vec!["Sports".to_string()],
        xmltv_flags: XmltvFlags { new: true, live: false },
        ..Template::default()
    }
}

fn matched(event: teamarr::models::Event, stream_id: &str, name: &str) -> MatchedStream {
    MatchedStream {
        stream_id: stream_id.to_string(),
        stream_name: name.to_string(),
        channel_id: EventEpgGenerator::channel_id(&event),
        event,
        exception_keyword: None,
    }
}

fn options() -> EventEpgOptions {
    let mut options = EventEpgOptions::new(parse_timezone("America/New_York"));
    options.sport_durations.insert("football".to_string(), 3.5);
    options
}

#[test]
fn test_generation_to_consolidation_invariants() {
    let dir = tempdir().unwrap();
    let timezone = parse_timezone("America/New_York");
    let consolidator = EpgConsolidator::new(EpgPaths::new(dir.path(), None), timezone);
    let generator = EventEpgGenerator::new(options());

    // Two groups, one shared event channel between them
    let shared = lions_bears();
    let other = nfl_event(
        "401600",
        "New York Giants at Dallas Cowboys",
        team("6", "Dallas Cowboys", "Cowboys", "DAL", "nfl", "football"),
        team("19", "New York Giants", "Giants", "NYG", "nfl", "football"),
    );

    let out1 = generator.generate(
        &[matched(shared.clone(), "77", "Lions vs Bears")],
        &group(1),
        &template(),
    );
    let out2 = generator.generate(
        &[
            matched(shared.clone(), "88", "DET/CHI alt feed"),
            matched(other, "89", "Giants @ Cowboys"),
        ],
        &group(2),
        &template(),
    );

    consolidator
        .save_event_fragment(1, &out1.channels, &out1.programmes)
        .unwrap();
    consolidator
        .save_event_fragment(2, &out2.channels, &out2.programmes)
        .unwrap();

    // Per-channel non-overlap holds within each generated fragment
    use std::collections::HashMap;
    for output in [&out1, &out2] {
        let mut by_channel: HashMap<&str, Vec<&teamarr::models::Programme>> = HashMap::new();
        for programme in &output.programmes {
            by_channel
                .entry(&programme.channel_id)
                .or_default()
                .push(programme);
        }
        for (_, list) in by_channel {
            for pair in list.windows(2) {
                assert!(pair[0].stop <= pair[1].start);
            }
        }
    }

    let merge = consolidator.merge_all().unwrap();
    assert_eq!(merge.files_merged, 2);
    // Shared channel deduplicated by id (first wins); programmes are
    // concatenated without dedup
    assert_eq!(merge.channel_count, 2);
    assert_eq!(
        merge.programme_count,
        out1.programmes.len() + out2.programmes.len()
    );

    let combined = std::fs::read_to_string(dir.path().join("teamarr.xml")).unwrap();
    let (channels, programmes) = parse_xmltv(&combined).unwrap();
    assert_eq!(channels.len(), 2);

    // Every programme well-formed, UTC, stop after start
    for programme in &programmes {
        assert!(programme.stop > programme.start);
    }

    // Element ordering: all channels precede all programmes
    let last_channel = combined.rfind("<channel").unwrap();
    let first_programme = combined.find("<programme").unwrap();
    assert!(last_channel < first_programme);
}

#[test]
fn test_repeated_merge_is_stable_apart_from_banner() {
    let dir = tempdir().unwrap();
    let timezone = parse_timezone("America/New_York");
    let consolidator = EpgConsolidator::new(EpgPaths::new(dir.path(), None), timezone);
    let generator = EventEpgGenerator::new(options());

    let out = generator.generate(
        &[matched(lions_bears(), "77", "Lions vs Bears")],
        &group(1),
        &template(),
    );
    consolidator
        .save_event_fragment(1, &out.channels, &out.programmes)
        .unwrap();

    consolidator.merge_all().unwrap();
    let first = std::fs::read_to_string(dir.path().join("teamarr.xml")).unwrap();
    consolidator.merge_all().unwrap();
    let second = std::fs::read_to_string(dir.path().join("teamarr.xml")).unwrap();

    let strip_banner = |s: &str| {
        s.lines()
            .filter(|line| !line.contains("Generated with Teamarr"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    assert_eq!(strip_banner(&first), strip_banner(&second));
}

#[test]
fn test_flags_come_from_template() {
    let generator = EventEpgGenerator::new(options());

    let mut with_flags = template();
    with_flags.xmltv_flags = XmltvFlags { new: true, live: true };
    let out = generator.generate(
        &[matched(lions_bears(), "77", "Lions vs Bears")],
        &group(1),
        &with_flags,
    );
    assert!(out.programmes.iter().all(|p| p.flag_new && p.flag_live));

    let mut without_flags = template();
    without_flags.xmltv_flags = XmltvFlags::default();
    let out = generator.generate(
        &[matched(lions_bears(), "77", "Lions vs Bears")],
        &group(1),
        &without_flags,
    );
    assert!(out.programmes.iter().all(|p| !p.flag_new && !p.flag_live));
}
