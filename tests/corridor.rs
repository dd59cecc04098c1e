//! Tests for the corridor interval index and crash matching

use roadmatch::{CorridorIntervalIndex, CrashMatcher, CrashRecord, SegmentRecord};

fn crash(corridor: &str, reference_point: &str) -> CrashRecord {
    CrashRecord {
        corridor: corridor.to_string(),
        reference_point: reference_point.to_string(),
    }
}

fn mt1_segments() -> Vec<SegmentRecord> {
    vec![
        SegmentRecord::new("MT-1", "000+0.0000", "010+0.0000", "N-1"),
        SegmentRecord::new("MT-1", "010+0.0000", "020+0.0000", "N-1"),
    ]
}

#[test]
fn test_match_inside_first_segment() {
    let index = CorridorIntervalIndex::build(&mt1_segments());
    let key = index.lookup("MT-1", "5+0.0").expect("should match");
    assert_eq!(key.start_mp, "000+0.0000");
}

#[test]
fn test_match_inside_second_segment() {
    let index = CorridorIntervalIndex::build(&mt1_segments());
    let key = index.lookup("MT-1", "15+0.0").expect("should match");
    assert_eq!(key.start_mp, "010+0.0000");
}

#[test]
fn test_beyond_last_segment_is_unmatched() {
    let index = CorridorIntervalIndex::build(&mt1_segments());
    assert!(index.lookup("MT-1", "25+0.0").is_none());
}

#[test]
fn test_shared_boundary_resolves_to_later_segment() {
    // 10.0 sits in both [0,10] and [10,20]; the last interval whose start
    // is at or before the point wins
    let index = CorridorIntervalIndex::build(&mt1_segments());
    let key = index.lookup("MT-1", "10+0.0").expect("should match");
    assert_eq!(key.start_mp, "010+0.0000");
}

#[test]
fn test_start_of_corridor_matches() {
    let index = CorridorIntervalIndex::build(&mt1_segments());
    let key = index.lookup("MT-1", "0+0.0").expect("should match");
    assert_eq!(key.start_mp, "000+0.0000");
}

#[test]
fn test_corridor_string_is_normalized() {
    let index = CorridorIntervalIndex::build(&mt1_segments());
    assert!(index.lookup("  mt-1 ", "5+0.0").is_some());
}

#[test]
fn test_unknown_corridor_is_unmatched() {
    let index = CorridorIntervalIndex::build(&mt1_segments());
    assert!(index.lookup("MT-99", "5+0.0").is_none());
}

#[test]
fn test_unparseable_reference_point_is_unmatched() {
    let index = CorridorIntervalIndex::build(&mt1_segments());
    assert!(index.lookup("MT-1", "not-a-milepost").is_none());
}

#[test]
fn test_build_sorts_unordered_input() {
    let mut segments = mt1_segments();
    segments.reverse();
    let index = CorridorIntervalIndex::build(&segments);
    let key = index.lookup("MT-1", "5+0.0").expect("should match");
    assert_eq!(key.start_mp, "000+0.0000");
}

#[test]
fn test_segments_with_unparseable_mileposts_are_skipped() {
    let mut segments = mt1_segments();
    segments.push(SegmentRecord::new("MT-1", "bogus", "030+0.0", "N-1"));
    let index = CorridorIntervalIndex::build(&segments);
    assert_eq!(index.interval_count(), 2);
}

#[test]
fn test_corridors_are_independent() {
    let mut segments = mt1_segments();
    segments.push(SegmentRecord::new("MT-2", "000+0.0000", "050+0.0000", "N-2"));
    let index = CorridorIntervalIndex::build(&segments);

    // MT-2 covers 25.0 but MT-1 does not
    assert!(index.lookup("MT-2", "25+0.0").is_some());
    assert!(index.lookup("MT-1", "25+0.0").is_none());
    assert_eq!(index.corridor_count(), 2);
}

#[test]
fn test_gap_between_segments_is_unmatched() {
    let segments = vec![
        SegmentRecord::new("MT-1", "000+0.0000", "008+0.0000", "N-1"),
        SegmentRecord::new("MT-1", "010+0.0000", "020+0.0000", "N-1"),
    ];
    let index = CorridorIntervalIndex::build(&segments);
    assert!(index.lookup("MT-1", "9+0.0").is_none());
}

#[test]
fn test_empty_build_matches_nothing() {
    let index = CorridorIntervalIndex::build(&[]);
    assert!(index.is_empty());
    assert!(index.lookup("MT-1", "5+0.0").is_none());
}

#[test]
fn test_count_crashes_aggregates_per_key() {
    let segments = mt1_segments();
    let index = CorridorIntervalIndex::build(&segments);
    let matcher = CrashMatcher::new(&index);

    let crashes = vec![
        crash("MT-1", "5+0.0"),
        crash("MT-1", "6+0.5"),
        crash("mt-1", "15+0.0"),
        crash("MT-1", "25+0.0"),   // beyond coverage
        crash("MT-99", "5+0.0"),   // unknown corridor
        crash("MT-1", "garbage"),  // unparseable reference point
    ];
    let counts = matcher.count_crashes(&crashes);

    let key_a = segments[0].key();
    let key_b = segments[1].key();
    assert_eq!(counts.get(&key_a), Some(&2));
    assert_eq!(counts.get(&key_b), Some(&1));
    // unmatched events are excluded, not counted under some sentinel
    assert_eq!(counts.values().sum::<u64>(), 3);
}

#[test]
fn test_match_event_normalizes_like_lookup() {
    let index = CorridorIntervalIndex::build(&mt1_segments());
    let matcher = CrashMatcher::new(&index);
    assert!(matcher.match_event(&crash(" mt-1 ", "5+0.0")).is_some());
    assert!(matcher.match_event(&crash("MT-1", "")).is_none());
}
