/*!
 * Outlier rejection and the piecewise-linear time mapping.
 */

use super::anchors::SyncAnchor;
use crate::errors::SyncError;
use crate::subtitle_processor::SubtitleEntry;

/// Outlier rejection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierFilter {
    /// Multiplier applied to the median absolute deviation
    pub factor: f64,
    /// Smallest threshold in ms, also used when all offsets agree exactly
    pub floor_ms: i64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self { factor: 3.0, floor_ms: 200 }
    }
}

fn median(sorted: &[i64]) -> i64 {
    sorted[sorted.len() / 2]
}

impl OutlierFilter {
    /// Drop anchors whose offset is further than `max(factor * MAD, floor)`
    /// from the median offset. With fewer than three anchors there is no
    /// majority to compare against, so nothing is dropped.
    pub fn apply(&self, anchors: Vec<SyncAnchor>) -> (Vec<SyncAnchor>, usize) {
        if anchors.len() < 3 {
            return (anchors, 0);
        }

        let mut offsets: Vec<i64> = anchors.iter().map(|a| a.offset_ms).collect();
        offsets.sort_unstable();
        let med = median(&offsets);

        let mut deviations: Vec<i64> = offsets.iter().map(|o| (o - med).abs()).collect();
        deviations.sort_unstable();
        let mad = median(&deviations);

        let threshold = ((mad as f64 * self.factor) as i64).max(self.floor_ms);
        let before = anchors.len();
        let kept: Vec<SyncAnchor> = anchors
            .into_iter()
            .filter(|a| (a.offset_ms - med).abs() <= threshold)
            .collect();
        let rejected = before - kept.len();
        (kept, rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    /// Target time where the segment starts
    start_ms: i64,
    scale: f64,
    offset: f64,
}

impl Segment {
    fn between(a: &SyncAnchor, b: &SyncAnchor) -> Self {
        let (t1, t2) = (a.target_ms as f64, b.target_ms as f64);
        let (r1, r2) = (a.reference_ms as f64, b.reference_ms as f64);
        let target_span = t2 - t1;
        let scale = if target_span <= 0.0 { 1.0 } else { (r2 - r1) / target_span };
        // a reversed pair would fold time back on itself
        let scale = if scale <= 0.0 { 1.0 } else { scale };
        Self {
            start_ms: a.target_ms as i64,
            scale,
            offset: r1 - scale * t1,
        }
    }

    fn shift(anchor: &SyncAnchor) -> Self {
        Self {
            start_ms: anchor.target_ms as i64,
            scale: 1.0,
            offset: anchor.offset_ms as f64,
        }
    }

    fn map(&self, t: i64) -> i64 {
        (self.scale * t as f64 + self.offset).round() as i64
    }
}

/// Piecewise-linear mapping from target time to reference time through a
/// sequence of anchors, extrapolated with the first and last segments
#[derive(Debug, Clone, PartialEq)]
pub struct TimeMapping {
    segments: Vec<Segment>,
}

impl TimeMapping {
    /// Fit through the anchors, ordered by target time. A single anchor
    /// shifts the whole track by its offset; no anchors is an error.
    pub fn fit(anchors: &[SyncAnchor]) -> Result<Self, SyncError> {
        let mut sorted = anchors.to_vec();
        sorted.sort_by_key(|a| (a.target_ms, a.reference_ms));
        sorted.dedup_by_key(|a| a.target_ms);

        let segments = match sorted.as_slice() {
            [] => return Err(SyncError::InsufficientAnchors { found: 0 }),
            [only] => vec![Segment::shift(only)],
            many => many.windows(2).map(|pair| Segment::between(&pair[0], &pair[1])).collect(),
        };
        Ok(Self { segments })
    }

    /// Reference time for a target time (may be negative before clamping)
    pub fn map(&self, t: u64) -> i64 {
        let t = t as i64;
        // segments is non-empty by construction
        let idx = self.segments.partition_point(|s| s.start_ms <= t).saturating_sub(1);
        self.segments[idx].map(t)
    }

    /// Re-time one entry. Times clamp at zero; an entry collapsed by the
    /// mapping keeps `max(original duration, min_duration_ms)`.
    pub fn apply(&self, entry: &SubtitleEntry, min_duration_ms: u64) -> SubtitleEntry {
        let start = self.map(entry.start_time_ms).max(0) as u64;
        let mut end = self.map(entry.end_time_ms).max(0) as u64;
        if end <= start {
            end = start + entry.duration_ms().max(min_duration_ms);
        }
        SubtitleEntry::new(entry.seq_num, start, end, entry.text.clone())
    }
}
