//! Geometric deduplication of candidate line features.
//!
//! A candidate simplified line is sampled the same way the index was built;
//! each directed sample is tested against the grid, and the fraction of
//! matching samples decides whether the candidate already exists in the
//! merged dataset (remove) or is novel (keep).

use geojson::{Feature, Value};
use log::{debug, info};

use crate::geo_utils::{initial_bearing, line_length_meters, sample_line};
use crate::{GeoPoint, SpatialGridIndex};

/// Classification of a candidate line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// Novel geometry, retained in the output
    Keep,
    /// Duplicate of an already-indexed line, dropped
    Remove,
}

/// Result of classifying one candidate line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupResult {
    pub decision: DedupDecision,
    /// Matched samples over total samples, both counted the same way
    pub match_fraction: f64,
    pub samples_matched: usize,
    pub samples_total: usize,
}

/// Outcome of deduplicating a feature collection.
#[derive(Debug)]
pub struct DedupOutcome {
    /// Non-duplicate features, in original input order
    pub kept: Vec<Feature>,
    pub kept_count: usize,
    pub removed_count: usize,
}

/// Classifies candidate lines against a built [`SpatialGridIndex`].
///
/// Sampling density and tolerances come from the index's own config, so the
/// build and query sides can never disagree on granularity.
#[derive(Debug, Clone, Copy)]
pub struct LineDeduplicator<'a> {
    index: &'a SpatialGridIndex,
}

impl<'a> LineDeduplicator<'a> {
    /// Create a deduplicator over a built index.
    pub fn new(index: &'a SpatialGridIndex) -> Self {
        Self { index }
    }

    /// Classify one candidate polyline.
    ///
    /// Samples the line, tests the first point of each consecutive sample
    /// pair with the pair's bearing, then the terminal vertex with the last
    /// pair's bearing. A line that yields no samples keeps by default:
    /// absence of evidence is not evidence of duplication.
    pub fn classify(&self, coords: &[GeoPoint]) -> DedupResult {
        let config = self.index.config();
        let samples = sample_line(coords, config.sample_count);
        if samples.is_empty() {
            return DedupResult {
                decision: DedupDecision::Keep,
                match_fraction: 0.0,
                samples_matched: 0,
                samples_total: 0,
            };
        }

        let mut hits = 0usize;
        for pair in samples.windows(2) {
            let bearing = initial_bearing(&pair[0], &pair[1]);
            if self.index.matches(&pair[0], bearing) {
                hits += 1;
            }
        }
        if samples.len() >= 2 {
            let bearing = initial_bearing(&samples[samples.len() - 2], &samples[samples.len() - 1]);
            if self.index.matches(&samples[samples.len() - 1], bearing) {
                hits += 1;
            }
        }

        let total = samples.len();
        let match_fraction = hits as f64 / total.max(1) as f64;
        let decision = if match_fraction >= config.match_fraction {
            DedupDecision::Remove
        } else {
            DedupDecision::Keep
        };

        DedupResult {
            decision,
            match_fraction,
            samples_matched: hits,
            samples_total: total,
        }
    }

    /// Deduplicate a feature collection, preserving input order.
    ///
    /// Features without a linear geometry (missing geometry, points,
    /// polygons, empty coordinate lists) are kept unchanged, properties
    /// passed through untouched.
    pub fn dedup_features(&self, features: Vec<Feature>) -> DedupOutcome {
        let total = features.len();
        let mut kept = Vec::with_capacity(total);
        let mut removed_count = 0usize;

        for feature in features {
            if self.keeps(&feature) {
                kept.push(feature);
            } else {
                removed_count += 1;
            }
        }

        info!(
            "dedup: {} candidates, kept {}, removed {}",
            total,
            kept.len(),
            removed_count
        );
        DedupOutcome {
            kept_count: kept.len(),
            removed_count,
            kept,
        }
    }

    /// Parallel variant of [`dedup_features`](Self::dedup_features).
    ///
    /// Classification is independent per candidate; decisions are collected
    /// in input order before filtering, so the kept list is identical to the
    /// sequential run.
    #[cfg(feature = "parallel")]
    pub fn dedup_features_parallel(&self, features: Vec<Feature>) -> DedupOutcome {
        use rayon::prelude::*;

        let total = features.len();
        let decisions: Vec<bool> = features.par_iter().map(|f| self.keeps(f)).collect();

        let mut kept = Vec::with_capacity(total);
        let mut removed_count = 0usize;
        for (feature, keep) in features.into_iter().zip(decisions) {
            if keep {
                kept.push(feature);
            } else {
                removed_count += 1;
            }
        }

        info!(
            "dedup (parallel): {} candidates, kept {}, removed {}",
            total,
            kept.len(),
            removed_count
        );
        DedupOutcome {
            kept_count: kept.len(),
            removed_count,
            kept,
        }
    }

    fn keeps(&self, feature: &Feature) -> bool {
        match line_coords(feature) {
            Some(coords) => {
                let result = self.classify(&coords);
                if result.decision == DedupDecision::Remove {
                    debug!(
                        "removing duplicate line: {}/{} samples matched ({:.2})",
                        result.samples_matched, result.samples_total, result.match_fraction
                    );
                }
                result.decision == DedupDecision::Keep
            }
            // keep non-lines by default
            None => true,
        }
    }
}

/// Extract the polyline of a GeoJSON feature, if it has one.
///
/// `LineString` geometries are taken as-is; a `MultiLineString` contributes
/// its longest constituent line (by arc length). Vertices with non-finite or
/// out-of-range coordinates are dropped. Anything else, including a missing
/// geometry or an empty coordinate list, yields `None`.
pub fn line_coords(feature: &Feature) -> Option<Vec<GeoPoint>> {
    let geometry = feature.geometry.as_ref()?;
    match &geometry.value {
        Value::LineString(positions) => positions_to_points(positions),
        Value::MultiLineString(parts) => parts
            .iter()
            .filter_map(|part| positions_to_points(part))
            .map(|points| (line_length_meters(&points), points))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, points)| points),
        _ => None,
    }
}

fn positions_to_points(positions: &[Vec<f64>]) -> Option<Vec<GeoPoint>> {
    let points: Vec<GeoPoint> = positions
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| GeoPoint::new(p[0], p[1]))
        .filter(GeoPoint::is_valid)
        .collect();
    (!points.is_empty()).then_some(points)
}
