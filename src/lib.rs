//! # Roadmatch
//!
//! Road-network segment matching library for crash-rate annotation pipelines.
//!
//! This library provides:
//! - Linear-referenced crash matching (corridor + milepost -> segment interval)
//! - Spatial/geometric deduplication of simplified highway lines
//! - Geometry sampling primitives (haversine distance, bearing, point-along-line)
//! - Traffic/crash aggregation helpers (multi-year AADT means, crash rates)
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel query-phase processing with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use roadmatch::{CorridorIntervalIndex, CrashMatcher, CrashRecord, SegmentRecord};
//!
//! // Two consecutive segments of corridor MT-1
//! let segments = vec![
//!     SegmentRecord::new("MT-1", "000+0.0000", "010+0.0000", "N-1"),
//!     SegmentRecord::new("MT-1", "010+0.0000", "020+0.0000", "N-1"),
//! ];
//!
//! let index = CorridorIntervalIndex::build(&segments);
//! let matcher = CrashMatcher::new(&index);
//!
//! let crash = CrashRecord {
//!     corridor: "mt-1".to_string(),
//!     reference_point: "5+0.0".to_string(),
//! };
//!
//! let key = matcher.match_event(&crash).expect("crash falls inside the first segment");
//! assert_eq!(key.start_mp, "000+0.0000");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, RoadMatchError};

// Geometry sampling primitives (distance, bearing, point-along-line)
pub mod geo_utils;

// Milepost parsing and identifier normalization
pub mod milepost;

// Linear referencing: per-corridor interval index and crash matching
pub mod corridor;
pub use corridor::{CorridorIntervalIndex, CrashMatcher};

// Spatial grid index over sampled (point, bearing) tuples
pub mod grid;
pub use grid::{BinKey, SpatialGridIndex, SpatialSample};

// Geometric deduplication of candidate line features
pub mod dedup;
pub use dedup::{line_coords, DedupDecision, DedupOutcome, DedupResult, LineDeduplicator};

// Traffic/crash aggregation helpers
pub mod aggregate;
pub use aggregate::{
    average_aadt, is_interstate, rank_county_rates, weighted_crash_rate, AadtAverage,
    CountyPopulations, CountyRate, DepartmentFilter, FieldPrecedence, RouteBundles,
    SegmentMetrics, SignedRouteMap, WeightedRate,
};

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate in degrees, longitude first to match GeoJSON
/// position order.
///
/// # Example
/// ```
/// use roadmatch::GeoPoint;
/// let point = GeoPoint::new(-110.45, 46.87); // central Montana
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// Create a new point from longitude and latitude in degrees.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && self.longitude >= -180.0
            && self.longitude <= 180.0
            && self.latitude >= -90.0
            && self.latitude <= 90.0
    }
}

/// Composite identifier uniquely naming one physical road segment.
///
/// Equality and hashing are structural over the four fields. The legacy
/// stringified form (`CORR_MP_ENDMP_DEPT`) is available through `Display`
/// for output compatibility, but is never used for comparison: department
/// ids containing underscores cannot collide with the field separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    /// Corridor id, trimmed and upper-cased
    pub corridor: String,
    /// Start milepost in `"major+minor"` textual form
    pub start_mp: String,
    /// End milepost in `"major+minor"` textual form
    pub end_mp: String,
    /// Department id, trimmed and upper-cased
    pub department: String,
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.corridor, self.start_mp, self.end_mp, self.department
        )
    }
}

/// One road segment definition as supplied by the I/O collaborator.
///
/// Mileposts stay in their textual `"major+minor"` form; parsing to floats
/// happens at index-build time so that unparseable records degrade to
/// "never matched" instead of failing the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub corridor: String,
    pub start_mp: String,
    pub end_mp: String,
    pub department: String,
    /// Annual average daily traffic, when the source row carried one
    pub aadt: Option<f64>,
    /// Official section length in miles, when the source row carried one
    pub length_miles: Option<f64>,
}

impl SegmentRecord {
    /// Create a segment record without traffic attributes.
    pub fn new(corridor: &str, start_mp: &str, end_mp: &str, department: &str) -> Self {
        Self {
            corridor: corridor.to_string(),
            start_mp: start_mp.to_string(),
            end_mp: end_mp.to_string(),
            department: department.to_string(),
            aadt: None,
            length_miles: None,
        }
    }

    /// The composite key identifying this segment.
    ///
    /// Corridor and department ids are normalized (trimmed, upper-cased);
    /// milepost strings are trimmed but otherwise kept verbatim so that the
    /// key round-trips with the source data.
    pub fn key(&self) -> SegmentKey {
        SegmentKey {
            corridor: milepost::normalize_id(&self.corridor),
            start_mp: self.start_mp.trim().to_string(),
            end_mp: self.end_mp.trim().to_string(),
            department: milepost::normalize_id(&self.department),
        }
    }
}

/// One crash event: a corridor name and a milepost reference point.
///
/// Read once from source records, matched to at most one segment, then
/// discarded; only the aggregate match count per key is retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub corridor: String,
    /// Milepost string in the same `"major+minor"` format as segment mileposts
    pub reference_point: String,
}

/// Configuration for spatial grid indexing and line deduplication.
///
/// One config governs both the index build and the query phase so the two
/// sides always sample at the same density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Number of points sampled along each line, evenly spaced by arc length.
    /// Trades recall against performance on large datasets. Default: 12
    pub sample_count: usize,

    /// Maximum great-circle distance in meters for a sample to match an
    /// indexed sample. Default: 50.0
    pub max_distance_m: f64,

    /// Maximum bearing difference in degrees (minimal circular difference).
    /// Default: 30.0
    pub max_bearing_diff_deg: f64,

    /// Fraction of a candidate's samples that must match for the candidate
    /// to classify as a duplicate. Default: 0.25
    pub match_fraction: f64,

    /// Grid bin size in degrees (~1.1 km of latitude at the default).
    /// Must stay large relative to `max_distance_m` for the 3x3 neighbor
    /// scan to be exhaustive. Default: 0.01
    pub bin_size_deg: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            sample_count: 12,
            max_distance_m: 50.0,
            max_bearing_diff_deg: 30.0,
            match_fraction: 0.25,
            bin_size_deg: 0.01,
        }
    }
}
