/*!
 * Tests for anchor sampling, outlier rejection and the sync engine
 */

use std::sync::Arc;

use subpilot::errors::SyncError;
use subpilot::providers::mock::{MockAnchorFinder, MockBehavior};
use subpilot::subtitle_processor::{SubtitleEntry, SubtitleTrack};
use subpilot::sync::{OutlierFilter, SamplingPlan, SyncAnchor, SyncEngine, SyncSettings, TimeMapping};
use crate::common;

fn engine(behavior: MockBehavior) -> SyncEngine {
    SyncEngine::new(Arc::new(MockAnchorFinder::new(behavior)), SyncSettings::default())
}

fn track(srt: &str) -> SubtitleTrack {
    SubtitleTrack::parse(srt).unwrap()
}

/// Two consistent anchors plus one wild one: the wild one is dropped and the
/// fit goes through the other two
#[test]
fn test_outlierFilter_withTwoConsistentAndOneWild_shouldFitConsistentPair() {
    let anchors = vec![
        SyncAnchor::new(10_100, 10_000, 1.0),
        SyncAnchor::new(30_110, 30_000, 1.0),
        SyncAnchor::new(55_000, 50_000, 1.0),
    ];
    let (kept, rejected) = OutlierFilter::default().apply(anchors);
    assert_eq!(rejected, 1);
    assert_eq!(kept.len(), 2);

    let mapping = TimeMapping::fit(&kept).unwrap();
    assert_eq!(mapping.map(10_000), 10_100);
    assert_eq!(mapping.map(30_000), 30_110);
    // extrapolated with the same segment, not pulled towards the outlier
    assert!((mapping.map(50_000) - 50_120).abs() <= 1);
}

#[test]
fn test_outlierFilter_withTwoAnchors_shouldKeepBoth() {
    let anchors = vec![SyncAnchor::new(1000, 0, 1.0), SyncAnchor::new(90_000, 10_000, 1.0)];
    let (kept, rejected) = OutlierFilter::default().apply(anchors);
    assert_eq!((kept.len(), rejected), (2, 0));
}

#[test]
fn test_timeMapping_withSingleAnchor_shouldApplyConstantShift() {
    let mapping = TimeMapping::fit(&[SyncAnchor::new(1000, 900, 1.0)]).unwrap();
    assert_eq!(mapping.map(0), 100);
    assert_eq!(mapping.map(60_000), 60_100);
}

#[test]
fn test_timeMapping_withoutAnchors_shouldFail() {
    assert!(matches!(TimeMapping::fit(&[]), Err(SyncError::InsufficientAnchors { found: 0 })));
}

#[test]
fn test_timeMapping_apply_shouldClampNegativeAndKeepMinimumDuration() {
    let mapping = TimeMapping::fit(&[SyncAnchor::new(0, 5000, 1.0), SyncAnchor::new(10_000, 15_000, 1.0)]).unwrap();
    let entry = SubtitleEntry::new(1, 1000, 1050, "Hi");
    let mapped = mapping.apply(&entry, 100);
    assert_eq!(mapped.start_time_ms, 0);
    assert_eq!(mapped.end_time_ms, 100);
}

#[test]
fn test_samplingPlan_groups_shouldCenterProportionally() {
    let plan = SamplingPlan { anchor_groups: 6, entries_per_group: 4, search_window: 40 };
    assert_eq!(plan.group_count(15), 2);
    assert_eq!(plan.group_count(1000), 6);

    let groups = plan.groups(200, 100);
    assert_eq!(groups.len(), 6);
    // first centre: floor(0.5 / 6 * 100) = 8
    assert_eq!(groups[0].target, 6..10);
    assert_eq!(groups[0].reference, 0..40);
}

#[tokio::test]
async fn test_sync_withIdenticalTracks_shouldKeepTiming() {
    let reference = track(&common::numbered_srt(40, 0));
    let (synced, stats) = engine(MockBehavior::Working).sync(&reference, &reference).await.unwrap();

    assert_eq!(synced.entries, reference.entries);
    assert_eq!(stats.avg_offset_ms, 0);
    assert_eq!(stats.entries_synced, 40);
    assert!(stats.anchors_found >= 2);
}

#[tokio::test]
async fn test_sync_withShiftedTarget_shouldRestoreReferenceTiming() {
    let reference = track(&common::numbered_srt(40, 0));
    let target = track(&common::numbered_srt(40, 2500));

    let (synced, stats) = engine(MockBehavior::Working).sync(&reference, &target).await.unwrap();

    assert_eq!(stats.median_offset_ms, -2500);
    assert_eq!(stats.min_offset_ms, -2500);
    assert_eq!(stats.max_offset_ms, -2500);
    for (synced, expected) in synced.entries.iter().zip(&reference.entries) {
        assert_eq!(synced.start_time_ms, expected.start_time_ms);
        assert_eq!(synced.end_time_ms, expected.end_time_ms);
        assert_eq!(synced.text, expected.text);
    }
}

/// Only one line is shared between the tracks, so the only anchor found
/// decides the shift for every entry
#[tokio::test]
async fn test_sync_withSingleSharedLine_shouldShiftWholeTrack() {
    let reference = track(&common::numbered_srt(10, 0));
    let target = SubtitleTrack::new(
        (0..10u64)
            .map(|i| {
                let start = i * 3000 + 2500;
                let text = if i == 2 { "Line number 2".to_string() } else { format!("Unrelated {}", i) };
                SubtitleEntry::new(i as usize + 1, start, start + 2000, text)
            })
            .collect(),
    );

    let (synced, stats) = engine(MockBehavior::Working).sync(&reference, &target).await.unwrap();

    assert_eq!(stats.anchors_found, 1);
    assert_eq!(stats.median_offset_ms, -1500);
    assert_eq!(synced.len(), 10);
    for (synced, original) in synced.entries.iter().zip(&target.entries) {
        assert_eq!(synced.start_time_ms, original.start_time_ms - 1500);
        assert_eq!(synced.end_time_ms, original.end_time_ms - 1500);
    }
}

#[tokio::test]
async fn test_sync_withEmptyTarget_shouldFail() {
    let reference = track(common::ENGLISH_SRT);
    let result = engine(MockBehavior::Working).sync(&reference, &SubtitleTrack::new(Vec::new())).await;
    assert!(matches!(result, Err(SyncError::EmptyTrack { track: "target" })));
}

#[tokio::test]
async fn test_sync_withNoMatchingLines_shouldReportInsufficientAnchors() {
    let reference = track(&common::numbered_srt(20, 0));
    let target = track(common::ENGLISH_SRT);
    let result = engine(MockBehavior::Working).sync(&reference, &target).await;
    assert!(matches!(result, Err(SyncError::InsufficientAnchors { .. })));
}

#[tokio::test]
async fn test_sync_withFailingFinder_shouldSurfaceProviderError() {
    let reference = track(&common::numbered_srt(20, 0));
    let result = engine(MockBehavior::Failing).sync(&reference, &reference).await;
    assert!(matches!(result, Err(SyncError::Provider(_))));
}

#[test]
fn test_estimate_shouldCountGroupsWithoutCallingFinder() {
    let finder = MockAnchorFinder::new(MockBehavior::Working);
    let engine = SyncEngine::new(Arc::new(finder.clone()), SyncSettings::default());
    let reference = track(&common::numbered_srt(80, 0));
    let target = track(&common::numbered_srt(30, 0));

    let estimate = engine.estimate(&reference, &target);
    assert_eq!(estimate.reference_entries, 80);
    assert_eq!(estimate.target_entries, 30);
    assert_eq!(estimate.estimated_api_calls, 3);
    assert_eq!(estimate.method, "mock-anchors");
    assert_eq!(finder.call_count(), 0);
}
