//! Geometry sampling primitives (distance, bearing, point-along-line).
//!
//! Two Earth radius constants are in deliberate use: the spatial matcher
//! works in meters, the linear-referencing length calculations in miles.
//! They are kept separate rather than converted from one another so each
//! subsystem reproduces its source data exactly.

use crate::GeoPoint;

/// Earth radius in meters, used by the spatial matcher.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Earth radius in miles, used for segment length calculations.
pub const EARTH_RADIUS_MI: f64 = 3_958.8;

/// Central angle between two points in radians (haversine formula).
fn central_angle(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Great-circle distance between two points in meters.
pub fn haversine_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    EARTH_RADIUS_M * central_angle(a, b)
}

/// Great-circle distance between two points in miles.
pub fn haversine_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    EARTH_RADIUS_MI * central_angle(a, b)
}

/// Initial bearing from `a` to `b` in degrees, normalized to `[0, 360)`.
pub fn initial_bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let x = dlon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    x.atan2(y).to_degrees().rem_euclid(360.0)
}

/// Minimal circular difference between two bearings in degrees, in `[0, 180]`.
pub fn bearing_diff(a: f64, b: f64) -> f64 {
    ((a - b + 180.0).rem_euclid(360.0) - 180.0).abs()
}

/// Total polyline length in meters.
pub fn line_length_meters(coords: &[GeoPoint]) -> f64 {
    coords
        .windows(2)
        .map(|w| haversine_meters(&w[0], &w[1]))
        .sum()
}

/// Total polyline length in miles.
pub fn line_length_miles(coords: &[GeoPoint]) -> f64 {
    coords
        .windows(2)
        .map(|w| haversine_miles(&w[0], &w[1]))
        .sum()
}

/// The point at arc-length fraction `f` along a polyline.
///
/// Interpolates linearly within the bracketing segment. `f <= 0` returns the
/// first vertex, `f >= 1` the last, and a zero-length line returns the first
/// vertex. Returns `None` only for an empty polyline.
pub fn point_at_fraction(coords: &[GeoPoint], fraction: f64) -> Option<GeoPoint> {
    if coords.is_empty() {
        return None;
    }
    if fraction <= 0.0 {
        return Some(coords[0]);
    }
    if fraction >= 1.0 {
        return Some(*coords.last().unwrap());
    }

    let seg_lengths: Vec<f64> = coords
        .windows(2)
        .map(|w| haversine_meters(&w[0], &w[1]))
        .collect();
    let total: f64 = seg_lengths.iter().sum();
    if total == 0.0 {
        return Some(coords[0]);
    }

    let target = total * fraction;
    let mut accumulated = 0.0;
    for (i, seg) in seg_lengths.iter().enumerate() {
        if accumulated + seg >= target {
            let t = if *seg != 0.0 {
                (target - accumulated) / seg
            } else {
                0.0
            };
            let a = coords[i];
            let b = coords[i + 1];
            return Some(GeoPoint::new(
                a.longitude + (b.longitude - a.longitude) * t,
                a.latitude + (b.latitude - a.latitude) * t,
            ));
        }
        accumulated += seg;
    }

    Some(*coords.last().unwrap())
}

/// Sample `n` points along a polyline at fractions `i / (n - 1)`.
///
/// A single-vertex polyline (or `n <= 1`) yields just the first vertex;
/// an empty polyline yields nothing.
pub fn sample_line(coords: &[GeoPoint], n: usize) -> Vec<GeoPoint> {
    if coords.is_empty() {
        return Vec::new();
    }
    if coords.len() == 1 || n <= 1 {
        return vec![coords[0]];
    }

    (0..n)
        .filter_map(|i| point_at_fraction(coords, i as f64 / (n - 1) as f64))
        .collect()
}
