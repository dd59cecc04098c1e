//! Traffic/crash aggregation helpers.
//!
//! Consumes the core's match results (crash counts per segment key) together
//! with traffic attributes and produces the derived crash-rate metrics:
//! multi-year AADT means, annual vehicle-miles-traveled, crashes per 100M
//! VMT, and length-weighted rate summaries.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use geojson::{Feature, JsonObject};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::milepost::{normalize_id, strip_route_suffix};
use crate::SegmentKey;

/// Days per year used for annual VMT. The five-year span 2019-2023 contains
/// exactly one leap year, hence 365.20 rather than 365.25.
pub const DAYS_PER_YEAR: f64 = 365.20;

/// Crash rates are expressed per 100 million vehicle-miles traveled.
pub const VMT_RATE_SCALE: f64 = 100_000_000.0;

/// County crash rates are expressed per 100 thousand residents.
pub const RESIDENT_RATE_SCALE: f64 = 100_000.0;

// ============================================================================
// Multi-year AADT averaging
// ============================================================================

/// Mean AADT for one segment across the years that reported data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AadtAverage {
    /// Mean over reporting years; `None` when no year carried a value
    pub mean_aadt: Option<f64>,
    /// Number of years with data, at least 1
    pub years_with_data: u32,
}

/// Average AADT observations per segment key across years.
///
/// Observations with a missing AADT keep the key present but contribute
/// nothing to the mean.
pub fn average_aadt(
    observations: &[(SegmentKey, Option<f64>)],
) -> HashMap<SegmentKey, AadtAverage> {
    let mut sums: HashMap<SegmentKey, (f64, u32)> = HashMap::new();

    for (key, aadt) in observations {
        let entry = sums.entry(key.clone()).or_insert((0.0, 0));
        if let Some(value) = aadt {
            entry.0 += value;
            entry.1 += 1;
        }
    }

    sums.into_iter()
        .map(|(key, (sum, count))| {
            let average = AadtAverage {
                mean_aadt: (count > 0).then(|| sum / count as f64),
                years_with_data: count.max(1),
            };
            (key, average)
        })
        .collect()
}

// ============================================================================
// Per-segment crash-rate metrics
// ============================================================================

/// Derived crash-rate metrics for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentMetrics {
    pub total_crashes: u64,
    /// Total crashes divided by the number of observed years
    pub avg_crashes_per_year: f64,
    /// Section length times AADT, when both are known
    pub daily_vmt: Option<f64>,
    /// Daily VMT times [`DAYS_PER_YEAR`]
    pub annual_vmt: Option<f64>,
    /// Crashes per 100M VMT; `None` when annual VMT is missing or non-positive
    pub per_100m_vmt: Option<f64>,
}

impl SegmentMetrics {
    /// Compute metrics from a segment's match count and traffic attributes.
    pub fn compute(
        total_crashes: u64,
        years: u32,
        length_miles: Option<f64>,
        aadt: Option<f64>,
    ) -> Self {
        let avg_crashes_per_year = total_crashes as f64 / years.max(1) as f64;

        let daily_vmt = match (length_miles, aadt) {
            (Some(length), Some(aadt)) => Some(length * aadt),
            _ => None,
        };
        let annual_vmt = daily_vmt.map(|vmt| vmt * DAYS_PER_YEAR);
        let per_100m_vmt = annual_vmt
            .filter(|vmt| *vmt > 0.0)
            .map(|vmt| avg_crashes_per_year / vmt * VMT_RATE_SCALE);

        Self {
            total_crashes,
            avg_crashes_per_year,
            daily_vmt,
            annual_vmt,
            per_100m_vmt,
        }
    }
}

// ============================================================================
// Length-weighted rate summaries
// ============================================================================

/// Length-weighted crash-rate summary for a set of segments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedRate {
    /// Length-weighted mean crash rate per 100M VMT
    pub rate: f64,
    pub total_miles: f64,
    /// Expected miles between crashes; `None` when the rate is zero
    pub miles_per_crash: Option<f64>,
}

/// Length-weighted average of `(length_miles, rate)` pairs.
pub fn weighted_crash_rate(segments: &[(f64, f64)]) -> WeightedRate {
    let mut weighted_sum = 0.0;
    let mut total_miles = 0.0;

    for (length, rate) in segments {
        weighted_sum += rate * length;
        total_miles += length;
    }

    if total_miles == 0.0 {
        return WeightedRate {
            rate: 0.0,
            total_miles: 0.0,
            miles_per_crash: None,
        };
    }

    let rate = weighted_sum / total_miles;
    WeightedRate {
        rate,
        total_miles,
        miles_per_crash: (rate > 0.0).then(|| VMT_RATE_SCALE / rate),
    }
}

// ============================================================================
// Property access policies
// ============================================================================

/// Ordered list of candidate property names, evaluated in sequence.
///
/// Source files disagree on column naming, so lookups are a deliberate,
/// documented precedence policy: the first name whose value parses wins.
#[derive(Debug, Clone)]
pub struct FieldPrecedence {
    names: Vec<String>,
}

impl FieldPrecedence {
    /// Build a policy from names in priority order.
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Candidate names for AADT-like fields.
    pub fn aadt() -> Self {
        Self::new(&["TYC_AADT", "AADT", "AVG_AADT", "TYC_AADT_EST", "EST_AADT"])
    }

    /// Candidate names for crash-count fields.
    pub fn crash_counts() -> Self {
        Self::new(&["TOTAL_CRASHES", "TOTAL", "TOTAL_CRASHES_5YR", "TOTAL_CRASH"])
    }

    /// Resolve the first numeric value among the candidate names.
    pub fn resolve_f64(&self, properties: &JsonObject) -> Option<f64> {
        self.names
            .iter()
            .filter_map(|name| properties.get(name))
            .find_map(json_to_f64)
    }

    /// Resolve the first numeric value, truncated to an unsigned count.
    pub fn resolve_u64(&self, properties: &JsonObject) -> Option<u64> {
        self.resolve_f64(properties)
            .filter(|v| *v >= 0.0)
            .map(|v| v as u64)
    }
}

fn json_to_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

// ============================================================================
// Signed-route mapping
// ============================================================================

/// Departmental route (suffix-stripped) to signed route name.
///
/// When several departmental rows map to the same base route, the first
/// non-empty signed route wins.
#[derive(Debug, Clone, Default)]
pub struct SignedRouteMap {
    routes: HashMap<String, String>,
}

impl SignedRouteMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(departmental_route, signed_route)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut map = Self::new();
        for (departmental, signed) in pairs {
            map.insert(departmental, signed);
        }
        map
    }

    /// Register one departmental -> signed route mapping.
    pub fn insert(&mut self, departmental: &str, signed: &str) {
        let key = strip_route_suffix(&normalize_id(departmental));
        if key.is_empty() {
            return;
        }
        let signed = signed.trim();
        match self.routes.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(signed.to_string());
            }
            Entry::Occupied(mut entry) => {
                // prefer the first non-empty signed route
                if entry.get().is_empty() && !signed.is_empty() {
                    entry.insert(signed.to_string());
                }
            }
        }
    }

    /// Signed route for a departmental id, suffix-stripped before lookup.
    pub fn signed_route(&self, departmental: &str) -> Option<&str> {
        self.routes
            .get(&strip_route_suffix(&normalize_id(departmental)))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Whether a segment is an interstate, preferring the signed route when
/// present and falling back to the department id.
pub fn is_interstate(signed_route: Option<&str>, department: &str) -> bool {
    if let Some(signed) = signed_route {
        if signed.trim().starts_with("I-") {
            return true;
        }
    }
    normalize_id(department).starts_with("I-")
}

// ============================================================================
// Department filtering
// ============================================================================

/// Retains segments whose department id does not carry an excluded prefix.
///
/// Secondary and local route classes (defaults: `R`, `L`, `X`, `U`) are
/// dropped from the merged output, except for an explicit allow list of
/// individual routes that are wanted despite their class.
#[derive(Debug, Clone)]
pub struct DepartmentFilter {
    excluded_prefixes: Vec<String>,
    allowed: HashSet<String>,
}

impl Default for DepartmentFilter {
    fn default() -> Self {
        Self::new(
            &["R", "L", "X", "U"],
            &["U-5832", "U-8133", "U-1216", "U-602", "U-8135"],
        )
    }
}

impl DepartmentFilter {
    /// Build a filter from excluded prefixes and an allow list of full ids.
    pub fn new(excluded_prefixes: &[&str], allowed: &[&str]) -> Self {
        Self {
            excluded_prefixes: excluded_prefixes.iter().map(|p| normalize_id(p)).collect(),
            allowed: allowed.iter().map(|a| normalize_id(a)).collect(),
        }
    }

    /// Whether a segment with this department id stays in the output.
    pub fn retains(&self, department: &str) -> bool {
        let department = normalize_id(department);
        if self.allowed.contains(&department) {
            return true;
        }
        !self
            .excluded_prefixes
            .iter()
            .any(|prefix| department.starts_with(prefix.as_str()))
    }
}

// ============================================================================
// County crash ranking
// ============================================================================

/// County populations from census data, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct CountyPopulations {
    populations: HashMap<String, u64>,
}

impl CountyPopulations {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(county, population)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
        let mut map = Self::new();
        for (county, population) in pairs {
            map.insert(county, population);
        }
        map
    }

    /// Register one county. Blank names are ignored; a repeated county keeps
    /// the last population seen.
    pub fn insert(&mut self, county: &str, population: u64) {
        let key = county_key(county);
        if key.is_empty() {
            return;
        }
        self.populations.insert(key, population);
    }

    /// Population for a county, matched case-insensitively.
    pub fn population(&self, county: &str) -> Option<u64> {
        self.populations.get(&county_key(county)).copied()
    }

    pub fn len(&self) -> usize {
        self.populations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.populations.is_empty()
    }
}

/// Per-county crash total and rate per 100k residents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountyRate {
    /// Title-cased county name
    pub county: String,
    pub total_crashes: u64,
    /// `None` when the census population is missing or zero
    pub per_100k_residents: Option<f64>,
}

/// Count crash events per county and rank by crashes per 100k residents.
///
/// County names are matched case-insensitively with whitespace trimmed;
/// blank names are skipped. Census counties with no crash events still rank
/// (with a zero rate when their population is known). Rows sort descending
/// by rate, counties without a usable rate last, ties broken by name so the
/// ranking is deterministic.
pub fn rank_county_rates(
    crash_counties: &[String],
    populations: &CountyPopulations,
) -> Vec<CountyRate> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for county in crash_counties {
        let key = county_key(county);
        if key.is_empty() {
            continue;
        }
        *counts.entry(key).or_insert(0) += 1;
    }
    for key in populations.populations.keys() {
        counts.entry(key.clone()).or_insert(0);
    }

    let mut rows: Vec<CountyRate> = counts
        .into_iter()
        .map(|(key, total)| {
            let rate = populations
                .populations
                .get(&key)
                .filter(|population| **population > 0)
                .map(|population| total as f64 / *population as f64 * RESIDENT_RATE_SCALE);
            CountyRate {
                county: title_case(&key),
                total_crashes: total,
                per_100k_residents: rate,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        let ra = a.per_100k_residents.unwrap_or(f64::NEG_INFINITY);
        let rb = b.per_100k_residents.unwrap_or(f64::NEG_INFINITY);
        rb.total_cmp(&ra).then_with(|| a.county.cmp(&b.county))
    });
    rows
}

fn county_key(county: &str) -> String {
    county.trim().to_lowercase()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Route bundles
// ============================================================================

/// Named groups of signed routes, supplied as explicit configuration.
///
/// This is configuration data, not module state: callers construct the map
/// (from a config file or defaults they own) and pass it in.
#[derive(Debug, Clone, Default)]
pub struct RouteBundles {
    bundles: BTreeMap<String, Vec<String>>,
}

impl RouteBundles {
    /// Create an empty bundle map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(bundle_name, signed_routes)` pairs.
    pub fn from_groups<'a>(
        groups: impl IntoIterator<Item = (&'a str, Vec<String>)>,
    ) -> Self {
        let mut bundles = Self::new();
        for (name, routes) in groups {
            bundles.insert(name, routes);
        }
        bundles
    }

    /// Register one named bundle.
    pub fn insert(&mut self, name: &str, routes: Vec<String>) {
        self.bundles.insert(name.to_string(), routes);
    }

    /// Partition features by bundle, matching on the `SIGNED_ROUTE` property.
    ///
    /// A route appearing in several bundles contributes its features to each;
    /// iteration order is the bundle names' lexicographic order.
    pub fn partition(&self, features: &[Feature]) -> BTreeMap<String, Vec<Feature>> {
        let mut by_route: HashMap<&str, Vec<&Feature>> = HashMap::new();
        for feature in features {
            let signed = feature
                .property("SIGNED_ROUTE")
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .unwrap_or("");
            by_route.entry(signed).or_default().push(feature);
        }

        self.bundles
            .iter()
            .map(|(name, routes)| {
                let mut combined = Vec::new();
                for route in routes {
                    if let Some(matched) = by_route.get(route.trim()) {
                        combined.extend(matched.iter().map(|f| (*f).clone()));
                    }
                }
                (name.clone(), combined)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}
