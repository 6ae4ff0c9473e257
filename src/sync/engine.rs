/*!
 * Anchor-based timing alignment of a target track against a reference track.
 */

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::anchors::{SampleGroup, SamplingPlan, SyncAnchor, lines_for};
use super::mapping::{OutlierFilter, TimeMapping};
use crate::app_config::SyncConfig;
use crate::errors::{ProviderError, SyncError};
use crate::providers::AnchorFinder;
use crate::subtitle_processor::SubtitleTrack;

/// Anchor groups queried at the same time
const GROUP_CONCURRENCY: usize = 3;

/// Tuning for one engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSettings {
    pub sampling: SamplingPlan,
    pub outliers: OutlierFilter,
    pub min_duration_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            sampling: SamplingPlan {
                anchor_groups: config.anchor_groups,
                entries_per_group: config.entries_per_group,
                search_window: config.search_window,
            },
            outliers: OutlierFilter {
                factor: config.outlier_factor,
                floor_ms: config.outlier_floor_ms,
            },
            min_duration_ms: config.min_duration_ms,
        }
    }
}

/// Operator-facing report of one sync run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStats {
    pub entries_synced: usize,
    pub reference_entries: usize,
    pub target_entries: usize,
    pub anchors_found: usize,
    pub anchors_rejected: usize,
    pub avg_offset_ms: i64,
    pub median_offset_ms: i64,
    pub min_offset_ms: i64,
    pub max_offset_ms: i64,
}

/// Cost preview of a sync run, computed without calling the finder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncEstimate {
    pub reference_entries: usize,
    pub target_entries: usize,
    pub estimated_api_calls: usize,
    pub method: String,
}

/// Re-times target tracks using anchors from an `AnchorFinder`
#[derive(Debug, Clone)]
pub struct SyncEngine {
    finder: Arc<dyn AnchorFinder>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(finder: Arc<dyn AnchorFinder>, settings: SyncSettings) -> Self {
        Self { finder, settings }
    }

    pub fn finder_name(&self) -> String {
        self.finder.name()
    }

    pub fn estimate(&self, reference: &SubtitleTrack, target: &SubtitleTrack) -> SyncEstimate {
        let estimated_api_calls = if reference.is_empty() || target.is_empty() {
            0
        } else {
            self.settings.sampling.group_count(target.len())
        };
        SyncEstimate {
            reference_entries: reference.len(),
            target_entries: target.len(),
            estimated_api_calls,
            method: self.finder.name(),
        }
    }

    /// Align `target` to `reference`. A single surviving anchor shifts the
    /// whole track by its offset. Fails on empty input and when no anchor
    /// survives; never returns an unchanged track as a success.
    pub async fn sync(&self, reference: &SubtitleTrack, target: &SubtitleTrack) -> Result<(SubtitleTrack, SyncStats), SyncError> {
        if reference.is_empty() {
            return Err(SyncError::EmptyTrack { track: "reference" });
        }
        if target.is_empty() {
            return Err(SyncError::EmptyTrack { track: "target" });
        }

        let anchors = self.discover_anchors(reference, target).await?;
        let found = anchors.len();
        let (anchors, rejected) = self.settings.outliers.apply(anchors);
        if rejected > 0 {
            info!("Rejected {} outlier anchor(s) of {}", rejected, found);
        }

        let mapping = TimeMapping::fit(&anchors)?;
        let entries = target
            .entries
            .iter()
            .map(|entry| mapping.apply(entry, self.settings.min_duration_ms))
            .collect::<Vec<_>>();

        let stats = build_stats(&anchors, rejected, reference.len(), target.len(), entries.len());
        info!(
            "Synced {} entries with {} anchors (avg offset {}ms, median {}ms)",
            stats.entries_synced, stats.anchors_found, stats.avg_offset_ms, stats.median_offset_ms
        );
        Ok((SubtitleTrack::new(entries), stats))
    }

    async fn discover_anchors(&self, reference: &SubtitleTrack, target: &SubtitleTrack) -> Result<Vec<SyncAnchor>, SyncError> {
        let groups = self.settings.sampling.groups(reference.len(), target.len());
        let total = groups.len();

        let results: Vec<(usize, Result<Vec<SyncAnchor>, ProviderError>)> = stream::iter(groups.into_iter().enumerate())
            .map(|(i, group)| async move {
                debug!("Anchor group {}/{}: target {:?}, reference {:?}", i + 1, total, group.target, group.reference);
                (i, self.find_group_anchors(reference, target, group).await)
            })
            .buffer_unordered(GROUP_CONCURRENCY)
            .collect()
            .await;

        let mut anchors = Vec::new();
        let mut seen_targets = HashSet::new();
        let mut last_error = None;
        let mut failed = 0;

        for (i, result) in results {
            match result {
                Ok(found) => {
                    debug!("Anchor group {}/{} found {} anchor(s)", i + 1, total, found.len());
                    for (target_ms, anchor) in found.into_iter().map(|a| (a.target_ms, a)) {
                        if seen_targets.insert(target_ms) {
                            anchors.push(anchor);
                        }
                    }
                }
                Err(e) => {
                    warn!("Anchor group {}/{} failed: {}", i + 1, total, e);
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if failed == total {
            if let Some(e) = last_error {
                return Err(SyncError::Provider(e));
            }
        }

        anchors.sort_by_key(|a| a.target_ms);
        Ok(anchors)
    }

    async fn find_group_anchors(
        &self,
        reference: &SubtitleTrack,
        target: &SubtitleTrack,
        group: SampleGroup,
    ) -> Result<Vec<SyncAnchor>, ProviderError> {
        let reference_lines = lines_for(reference, group.reference.clone());
        let target_lines = lines_for(target, group.target.clone());
        if reference_lines.is_empty() || target_lines.is_empty() {
            return Ok(Vec::new());
        }

        let matches = self.finder.find_anchors(&reference_lines, &target_lines).await?;
        Ok(matches
            .into_iter()
            .filter(|m| group.reference.contains(&m.reference_index) && group.target.contains(&m.target_index))
            .map(|m| {
                SyncAnchor::new(
                    reference.entries[m.reference_index].start_time_ms,
                    target.entries[m.target_index].start_time_ms,
                    m.confidence,
                )
            })
            .collect())
    }
}

fn build_stats(anchors: &[SyncAnchor], rejected: usize, reference_len: usize, target_len: usize, synced: usize) -> SyncStats {
    let mut offsets: Vec<i64> = anchors.iter().map(|a| a.offset_ms).collect();
    offsets.sort_unstable();
    let count = offsets.len().max(1) as i64;

    SyncStats {
        entries_synced: synced,
        reference_entries: reference_len,
        target_entries: target_len,
        anchors_found: anchors.len(),
        anchors_rejected: rejected,
        avg_offset_ms: offsets.iter().sum::<i64>() / count,
        median_offset_ms: offsets.get(offsets.len() / 2).copied().unwrap_or(0),
        min_offset_ms: offsets.first().copied().unwrap_or(0),
        max_offset_ms: offsets.last().copied().unwrap_or(0),
    }
}
