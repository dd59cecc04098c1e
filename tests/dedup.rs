//! Tests for the spatial grid index and line deduplication

use geojson::{Feature, Geometry, Value};
use serde_json::json;

use roadmatch::geo_utils::initial_bearing;
use roadmatch::{
    line_coords, DedupConfig, DedupDecision, GeoPoint, LineDeduplicator, SpatialGridIndex,
};

fn line_feature(id: &str, coords: &[(f64, f64)]) -> Feature {
    let positions = coords.iter().map(|(x, y)| vec![*x, *y]).collect();
    let mut properties = geojson::JsonObject::new();
    properties.insert("id".to_string(), json!(id));
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::LineString(positions))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn feature_id(feature: &Feature) -> &str {
    feature.property("id").and_then(|v| v.as_str()).unwrap()
}

fn points(coords: &[(f64, f64)]) -> Vec<GeoPoint> {
    coords.iter().map(|(x, y)| GeoPoint::new(*x, *y)).collect()
}

/// An east-west line at the given latitude, ~7.9 km long.
fn east_west(lat: f64) -> Vec<(f64, f64)> {
    vec![(-110.05, lat), (-110.0, lat), (-109.95, lat)]
}

#[test]
fn test_identical_line_is_removed_with_full_match() {
    let config = DedupConfig::default();
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    let result = deduplicator.classify(&points(&east_west(45.0)));
    assert_eq!(result.decision, DedupDecision::Remove);
    assert_eq!(result.match_fraction, 1.0);
    assert_eq!(result.samples_total, config.sample_count);
    assert_eq!(result.samples_matched, config.sample_count);
}

#[test]
fn test_distant_parallel_line_is_kept() {
    let config = DedupConfig::default();
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    // ~5.5 km north of the indexed line, far beyond the 50 m tolerance
    let result = deduplicator.classify(&points(&east_west(45.05)));
    assert_eq!(result.decision, DedupDecision::Keep);
    assert_eq!(result.match_fraction, 0.0);
}

#[test]
fn test_crossing_line_with_different_bearing_is_kept() {
    let config = DedupConfig::default();
    // north-south line
    let existing = line_feature("existing", &[(-110.0, 45.0), (-110.0, 45.1)]);
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    // east-west line crossing it at right angles
    let result = deduplicator.classify(&points(&east_west(45.05)));
    assert_eq!(result.decision, DedupDecision::Keep);
    assert_eq!(result.match_fraction, 0.0);
}

#[test]
fn test_empty_index_keeps_everything() {
    let config = DedupConfig::default();
    let index = SpatialGridIndex::from_features(&[], &config);
    assert!(index.is_empty());

    let deduplicator = LineDeduplicator::new(&index);
    let outcome = deduplicator.dedup_features(vec![line_feature("a", &east_west(45.0))]);
    assert_eq!(outcome.kept_count, 1);
    assert_eq!(outcome.removed_count, 0);
}

#[test]
fn test_non_linear_features_are_kept() {
    let config = DedupConfig::default();
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    let no_geometry = Feature {
        bbox: None,
        geometry: None,
        id: None,
        properties: None,
        foreign_members: None,
    };
    let point = Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![-110.0, 45.0]))),
        id: None,
        properties: None,
        foreign_members: None,
    };

    let outcome = deduplicator.dedup_features(vec![no_geometry, point]);
    assert_eq!(outcome.kept_count, 2);
    assert_eq!(outcome.removed_count, 0);
}

#[test]
fn test_multi_line_string_samples_longest_part() {
    let config = DedupConfig::default();
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    // short stub far away, long part identical to the indexed line
    let short: Vec<Vec<f64>> = vec![vec![-111.0, 46.0], vec![-111.0001, 46.0]];
    let long: Vec<Vec<f64>> = east_west(45.0).iter().map(|(x, y)| vec![*x, *y]).collect();
    let multi = Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::MultiLineString(vec![short, long]))),
        id: None,
        properties: None,
        foreign_members: None,
    };

    let outcome = deduplicator.dedup_features(vec![multi]);
    assert_eq!(outcome.removed_count, 1);
}

#[test]
fn test_dedup_preserves_input_order() {
    let config = DedupConfig::default();
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    let candidates = vec![
        line_feature("novel-1", &east_west(45.2)),
        line_feature("duplicate", &east_west(45.0)),
        line_feature("novel-2", &east_west(45.3)),
    ];
    let outcome = deduplicator.dedup_features(candidates);

    assert_eq!(outcome.removed_count, 1);
    let kept_ids: Vec<&str> = outcome.kept.iter().map(feature_id).collect();
    assert_eq!(kept_ids, vec!["novel-1", "novel-2"]);
}

#[test]
fn test_dedup_is_idempotent_on_kept_output() {
    let config = DedupConfig::default();
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    let candidates = vec![
        line_feature("duplicate", &east_west(45.0)),
        line_feature("novel", &east_west(45.2)),
    ];
    let first = deduplicator.dedup_features(candidates);
    assert_eq!(first.kept_count, 1);

    // bearing/position characteristics of the kept set are unchanged, so a
    // second pass against the same index removes nothing further
    let second = deduplicator.dedup_features(first.kept);
    assert_eq!(second.kept_count, 1);
    assert_eq!(second.removed_count, 0);
    assert_eq!(feature_id(&second.kept[0]), "novel");
}

#[test]
fn test_grid_bin_boundary_is_covered_by_neighbor_scan() {
    let config = DedupConfig::default();
    let mut index = SpatialGridIndex::new(&config);

    // indexed line starts exactly on a bin corner (multiples of 0.01)
    let a = GeoPoint::new(-110.0, 45.0);
    let b = GeoPoint::new(-109.999, 45.001);
    index.insert_line(&[a, b]);
    let bearing = initial_bearing(&a, &b);

    // queries from all four bins around the corner find the sample
    let offsets = [
        (1e-6, 1e-6),
        (-1e-6, 1e-6),
        (1e-6, -1e-6),
        (-1e-6, -1e-6),
    ];
    for (dx, dy) in offsets {
        let query = GeoPoint::new(-110.0 + dx, 45.0 + dy);
        assert!(
            index.matches(&query, bearing),
            "query at offset ({}, {}) missed the boundary sample",
            dx,
            dy
        );
    }
}

#[test]
fn test_grid_rejects_mismatched_bearing() {
    let config = DedupConfig::default();
    let mut index = SpatialGridIndex::new(&config);

    let a = GeoPoint::new(-110.0, 45.0);
    let b = GeoPoint::new(-110.0, 45.001); // due north
    index.insert_line(&[a, b]);

    assert!(index.matches(&a, 0.0));
    assert!(index.matches(&a, 25.0));
    assert!(!index.matches(&a, 90.0));
}

#[test]
fn test_grid_returns_nearest_candidate() {
    let config = DedupConfig::default();
    let mut index = SpatialGridIndex::new(&config);

    // two single-vertex lines index one sample each, bearing 0.0
    let near = GeoPoint::new(-110.0, 45.0001); // ~11 m north of the query
    let far = GeoPoint::new(-110.0, 45.0003); // ~33 m north of the query
    index.insert_line(&[far]);
    index.insert_line(&[near]);

    let query = GeoPoint::new(-110.0, 45.0);
    let matched = index.find_match(&query, 0.0).expect("both are in range");
    assert_eq!(matched.latitude, near.latitude);
}

#[test]
fn test_single_vertex_candidate_is_kept() {
    let config = DedupConfig::default();
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    // one sample, no pair to derive a bearing from: no evidence, keep
    let result = deduplicator.classify(&[GeoPoint::new(-110.0, 45.0)]);
    assert_eq!(result.decision, DedupDecision::Keep);
    assert_eq!(result.samples_total, 1);
}

#[test]
fn test_invalid_vertices_are_dropped_before_sampling() {
    let config = DedupConfig::default();
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    // identical line with a corrupt vertex spliced in; the remaining valid
    // vertices still classify as a duplicate
    let corrupted = line_feature(
        "corrupted",
        &[
            (-110.05, 45.0),
            (999.0, 120.0),
            (-110.0, 45.0),
            (-109.95, 45.0),
        ],
    );
    let outcome = deduplicator.dedup_features(vec![corrupted]);
    assert_eq!(outcome.removed_count, 1);
}

#[test]
fn test_line_of_only_invalid_vertices_is_kept() {
    let all_invalid = line_feature(
        "invalid",
        &[(999.0, 45.0), (f64::NAN, 45.0), (-110.0, 91.0)],
    );
    assert!(line_coords(&all_invalid).is_none());

    let config = DedupConfig::default();
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    let outcome = deduplicator.dedup_features(vec![all_invalid]);
    assert_eq!(outcome.kept_count, 1);
    assert_eq!(outcome.removed_count, 0);
}

#[test]
fn test_match_fraction_threshold_is_inclusive() {
    let config = DedupConfig {
        match_fraction: 1.0,
        ..DedupConfig::default()
    };
    let existing = line_feature("existing", &east_west(45.0));
    let index = SpatialGridIndex::from_features(&[existing], &config);
    let deduplicator = LineDeduplicator::new(&index);

    let result = deduplicator.classify(&points(&east_west(45.0)));
    assert_eq!(result.match_fraction, 1.0);
    assert_eq!(result.decision, DedupDecision::Remove);
}
