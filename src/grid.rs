//! Coarse spatial grid index over sampled (point, bearing) tuples.
//!
//! Existing merged line geometries are sampled at evenly spaced arc-length
//! fractions; each sample is stored in a fixed-size longitude/latitude bin
//! together with the bearing toward the next sample. A query scans the 3x3
//! block of bins around the query point, which bounds the candidate surface
//! per query while staying exhaustive as long as the bin size is large
//! relative to the maximum match distance.

use std::collections::HashMap;

use log::info;

use crate::geo_utils::{bearing_diff, haversine_meters, initial_bearing, sample_line};
use crate::{DedupConfig, GeoPoint};

/// Grid bin key: `(floor(lon / bin_size), floor(lat / bin_size))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinKey {
    pub x: i32,
    pub y: i32,
}

impl BinKey {
    /// The bin containing a point for a given bin size in degrees.
    pub fn for_point(longitude: f64, latitude: f64, bin_size_deg: f64) -> Self {
        Self {
            x: (longitude / bin_size_deg).floor() as i32,
            y: (latitude / bin_size_deg).floor() as i32,
        }
    }
}

/// A sampled point with its outgoing bearing, derived from a line geometry.
///
/// Samples are ephemeral and owned by the index that built them; no
/// back-reference to the originating feature is kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialSample {
    pub longitude: f64,
    pub latitude: f64,
    pub bearing_deg: f64,
}

impl SpatialSample {
    fn point(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

/// Coarse grid of spatial samples, built once and queried read-only.
pub struct SpatialGridIndex {
    bins: HashMap<BinKey, Vec<SpatialSample>>,
    config: DedupConfig,
    sample_count_total: usize,
}

impl SpatialGridIndex {
    /// Create an empty index. The config fixes the bin size, the sampling
    /// density, and the match tolerances for the index's whole lifetime.
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            bins: HashMap::new(),
            config: config.clone(),
            sample_count_total: 0,
        }
    }

    /// Build an index from existing GeoJSON line features.
    ///
    /// Features without a linear geometry contribute nothing; an empty
    /// collection produces an empty index that matches no query.
    pub fn from_features(features: &[geojson::Feature], config: &DedupConfig) -> Self {
        let mut index = Self::new(config);
        for feature in features {
            if let Some(coords) = crate::dedup::line_coords(feature) {
                index.insert_line(&coords);
            }
        }
        info!(
            "spatial grid built: {} samples in {} bins from {} features",
            index.len(),
            index.bin_count(),
            features.len()
        );
        index
    }

    /// Sample a line and insert its (point, bearing) tuples.
    ///
    /// Each consecutive sample pair contributes its first point with the
    /// pair's bearing; the terminal vertex is also indexed, carrying the
    /// last pair's bearing so line ends remain matchable.
    pub fn insert_line(&mut self, coords: &[GeoPoint]) {
        let samples = sample_line(coords, self.config.sample_count);
        if samples.is_empty() {
            return;
        }

        for pair in samples.windows(2) {
            let bearing = initial_bearing(&pair[0], &pair[1]);
            self.insert_sample(SpatialSample {
                longitude: pair[0].longitude,
                latitude: pair[0].latitude,
                bearing_deg: bearing,
            });
        }

        let last = samples[samples.len() - 1];
        let bearing = if samples.len() >= 2 {
            initial_bearing(&samples[samples.len() - 2], &last)
        } else {
            0.0
        };
        self.insert_sample(SpatialSample {
            longitude: last.longitude,
            latitude: last.latitude,
            bearing_deg: bearing,
        });
    }

    fn insert_sample(&mut self, sample: SpatialSample) {
        let key = BinKey::for_point(sample.longitude, sample.latitude, self.config.bin_size_deg);
        self.bins.entry(key).or_default().push(sample);
        self.sample_count_total += 1;
    }

    /// Find the indexed sample matching a query point and bearing.
    ///
    /// Scans the 3x3 block of bins centered on the query point. Among all
    /// samples within `max_distance_m` whose bearing differs by at most
    /// `max_bearing_diff_deg`, the nearest by great-circle distance wins.
    /// Nearest-candidate selection makes the result independent of bin and
    /// insertion order, so matching is deterministic.
    pub fn find_match(&self, point: &GeoPoint, bearing_deg: f64) -> Option<&SpatialSample> {
        let center = BinKey::for_point(point.longitude, point.latitude, self.config.bin_size_deg);
        let mut best: Option<(f64, &SpatialSample)> = None;

        for dx in -1..=1 {
            for dy in -1..=1 {
                let key = BinKey {
                    x: center.x + dx,
                    y: center.y + dy,
                };
                let Some(samples) = self.bins.get(&key) else {
                    continue;
                };
                for sample in samples {
                    let distance = haversine_meters(point, &sample.point());
                    if distance > self.config.max_distance_m {
                        continue;
                    }
                    if bearing_diff(bearing_deg, sample.bearing_deg)
                        > self.config.max_bearing_diff_deg
                    {
                        continue;
                    }
                    if best.map_or(true, |(best_distance, _)| distance < best_distance) {
                        best = Some((distance, sample));
                    }
                }
            }
        }

        best.map(|(_, sample)| sample)
    }

    /// Whether any indexed sample matches the query point and bearing.
    pub fn matches(&self, point: &GeoPoint, bearing_deg: f64) -> bool {
        self.find_match(point, bearing_deg).is_some()
    }

    /// The configuration this index was built with.
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Total number of indexed samples.
    pub fn len(&self) -> usize {
        self.sample_count_total
    }

    /// Check if the index holds no samples.
    pub fn is_empty(&self) -> bool {
        self.sample_count_total == 0
    }

    /// Number of occupied bins.
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }
}

impl std::fmt::Debug for SpatialGridIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialGridIndex")
            .field("samples", &self.sample_count_total)
            .field("bins", &self.bins.len())
            .field("bin_size_deg", &self.config.bin_size_deg)
            .finish()
    }
}
