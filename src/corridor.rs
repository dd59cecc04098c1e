//! Linear referencing: per-corridor milepost interval index and crash matching.
//!
//! The index is built once from segment records and then queried read-only,
//! one binary search per crash event. Within a corridor the intervals are
//! assumed non-overlapping; the data is not guaranteed clean, so the lookup
//! tolerates gaps and minor overlaps by always picking the last interval
//! whose start is at or before the reference point.

use std::collections::HashMap;

use log::{debug, info};

use crate::milepost::{normalize_id, parse_milepost};
use crate::{CrashRecord, SegmentKey, SegmentRecord};

/// Sorted, parallel-array interval set for one corridor.
#[derive(Debug, Clone)]
struct CorridorIntervals {
    starts: Vec<f64>,
    ends: Vec<f64>,
    keys: Vec<SegmentKey>,
}

/// Milepost interval index over all corridors.
///
/// # Example
/// ```
/// use roadmatch::{CorridorIntervalIndex, SegmentRecord};
///
/// let segments = vec![SegmentRecord::new("MT-1", "000+0.0", "010+0.0", "N-1")];
/// let index = CorridorIntervalIndex::build(&segments);
/// assert!(index.lookup("MT-1", "5+0.0").is_some());
/// assert!(index.lookup("MT-1", "25+0.0").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CorridorIntervalIndex {
    corridors: HashMap<String, CorridorIntervals>,
}

impl CorridorIntervalIndex {
    /// Build the index from segment records.
    ///
    /// Records whose mileposts fail to parse are skipped (they can never
    /// match anyway); an empty input produces an empty index that matches
    /// nothing, without aborting downstream processing.
    pub fn build(segments: &[SegmentRecord]) -> Self {
        let mut grouped: HashMap<String, Vec<(f64, f64, SegmentKey)>> = HashMap::new();

        for record in segments {
            let (Some(start), Some(end)) = (
                parse_milepost(&record.start_mp),
                parse_milepost(&record.end_mp),
            ) else {
                debug!(
                    "skipping segment with unparseable mileposts: {} [{} .. {}]",
                    record.corridor, record.start_mp, record.end_mp
                );
                continue;
            };
            grouped
                .entry(normalize_id(&record.corridor))
                .or_default()
                .push((start, end, record.key()));
        }

        let mut corridors = HashMap::with_capacity(grouped.len());
        for (corridor, mut intervals) in grouped {
            intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

            let starts = intervals.iter().map(|it| it.0).collect();
            let ends = intervals.iter().map(|it| it.1).collect();
            let keys = intervals.into_iter().map(|it| it.2).collect();
            corridors.insert(
                corridor,
                CorridorIntervals { starts, ends, keys },
            );
        }

        let index = Self { corridors };
        info!(
            "corridor index built: {} corridors, {} intervals",
            index.corridor_count(),
            index.interval_count()
        );
        index
    }

    /// Look up the segment containing `reference_point` on `corridor`.
    ///
    /// The corridor string is normalized (trimmed, upper-cased) and the
    /// reference point parsed as a milepost; either failing, or the point
    /// falling outside every interval, yields `None`. The search is a binary
    /// search for the last interval whose start is `<=` the reference point,
    /// O(log k) in the corridor's segment count.
    pub fn lookup(&self, corridor: &str, reference_point: &str) -> Option<&SegmentKey> {
        let intervals = self.corridors.get(&normalize_id(corridor))?;
        let reference = parse_milepost(reference_point)?;

        let idx = intervals.starts.partition_point(|&start| start <= reference);
        if idx == 0 {
            return None;
        }
        let i = idx - 1;
        (reference <= intervals.ends[i]).then(|| &intervals.keys[i])
    }

    /// Number of corridors in the index.
    pub fn corridor_count(&self) -> usize {
        self.corridors.len()
    }

    /// Total number of indexed intervals.
    pub fn interval_count(&self) -> usize {
        self.corridors.values().map(|c| c.keys.len()).sum()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.corridors.is_empty()
    }
}

/// Matches crash events against a [`CorridorIntervalIndex`].
///
/// Borrows the index read-only, so matching can be shared across threads
/// once the build phase is done.
#[derive(Debug, Clone, Copy)]
pub struct CrashMatcher<'a> {
    index: &'a CorridorIntervalIndex,
}

impl<'a> CrashMatcher<'a> {
    /// Create a matcher over a built index.
    pub fn new(index: &'a CorridorIntervalIndex) -> Self {
        Self { index }
    }

    /// Match one crash event to its segment key, or `None` if unmatched.
    ///
    /// Unknown corridors and unparseable reference points are unmatched,
    /// not errors: such events are silently excluded from the counts.
    pub fn match_event(&self, crash: &CrashRecord) -> Option<&'a SegmentKey> {
        self.index.lookup(&crash.corridor, &crash.reference_point)
    }

    /// Count matched crash events per segment key.
    ///
    /// The result feeds downstream crash-rate computation; this component
    /// performs no rate math itself.
    pub fn count_crashes(&self, crashes: &[CrashRecord]) -> HashMap<SegmentKey, u64> {
        let mut counts: HashMap<SegmentKey, u64> = HashMap::new();
        let mut unmatched = 0usize;

        for crash in crashes {
            match self.match_event(crash) {
                Some(key) => *counts.entry(key.clone()).or_insert(0) += 1,
                None => unmatched += 1,
            }
        }

        info!(
            "crash matching: {} events, {} matched to {} segments, {} unmatched",
            crashes.len(),
            crashes.len() - unmatched,
            counts.len(),
            unmatched
        );
        counts
    }

    /// Parallel variant of [`count_crashes`](Self::count_crashes).
    ///
    /// Matching is independent per event; partial counts merge by summation,
    /// so the result is identical regardless of partition.
    #[cfg(feature = "parallel")]
    pub fn count_crashes_parallel(&self, crashes: &[CrashRecord]) -> HashMap<SegmentKey, u64> {
        use rayon::prelude::*;

        crashes
            .par_iter()
            .filter_map(|crash| self.match_event(crash))
            .fold(HashMap::new, |mut counts: HashMap<SegmentKey, u64>, key| {
                *counts.entry(key.clone()).or_insert(0) += 1;
                counts
            })
            .reduce(HashMap::new, |mut a, b| {
                for (key, count) in b {
                    *a.entry(key).or_insert(0) += count;
                }
                a
            })
    }
}
