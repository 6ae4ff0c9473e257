/*!
 * End-to-end acquisition decisions through the controller
 */

use anyhow::Result;
use std::time::Duration;

use subpilot::acquisition::{ExistingSubtitle, FailureKind, Outcome, QualityThreshold, QualityTier, SkipReason};
use subpilot::providers::mock::{MockBehavior, MockMediaServer, MockNotifier, MockSubtitleProvider, MockTranslator};
use subpilot::subtitle_processor::SubtitleTrack;
use subpilot::translation::{RequestStatus, TranslationSource};
use crate::common;

/// Lets spawned notification tasks run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_process_withExistingTargetSubtitle_shouldSkipWithoutSearching() -> Result<()> {
    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("1", "vie", "srt")]);
    let provider = MockSubtitleProvider::new();
    let controller = common::mock_controller(common::test_config(), media.clone(), provider.clone(), MockTranslator::working(), None).await?;

    let outcome = controller.process("100", None).await?;

    match outcome {
        Outcome::Skipped(decision) => assert_eq!(decision.reason, SkipReason::HasSubtitle),
        other => panic!("unexpected outcome: {}", other),
    }
    assert_eq!(provider.search_count(), 0);
    assert_eq!(media.upload_count(), 0);
    assert_eq!(controller.stats().await?.total_skipped, 1);
    Ok(())
}

#[tokio::test]
async fn test_process_withRetailAndPopularAi_shouldDownloadRetail() -> Result<()> {
    let mut config = common::test_config();
    config.acquisition.min_quality_tier = QualityThreshold::Translated;

    let media = MockMediaServer::new().with_item(common::movie());
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("retail", "vi", QualityTier::Retail, 10.0), common::ENGLISH_SRT)
        .with_candidate(common::candidate("ai", "vi", QualityTier::AiGenerated, 99.0), "1\n00:00:01,000 --> 00:00:02,000\nwrong\n");
    let notifier = MockNotifier::new(MockBehavior::Working);
    let controller =
        common::mock_controller(config, media.clone(), provider.clone(), MockTranslator::working(), Some(notifier.clone())).await?;

    let outcome = controller.process("100", None).await?;

    match outcome {
        Outcome::Downloaded { candidate, synced } => {
            assert_eq!(candidate.id, "retail");
            assert!(synced.is_none());
        }
        other => panic!("unexpected outcome: {}", other),
    }
    assert_eq!(provider.download_count(), 1);

    let uploads = media.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].language, "vi");
    assert!(!uploads[0].replace_existing);
    let uploaded = SubtitleTrack::from_bytes(&uploads[0].content)?;
    assert_eq!(uploaded, SubtitleTrack::parse(common::ENGLISH_SRT)?);

    settle().await;
    let kinds = notifier.kinds();
    assert!(kinds.contains(&"subtitle_found"));
    assert!(kinds.contains(&"downloaded"));
    assert_eq!(controller.stats().await?.total_downloads, 1);
    Ok(())
}

#[tokio::test]
async fn test_process_withLocalEnglishStreamAndNoTarget_shouldQueueTranslation() -> Result<()> {
    let english = ExistingSubtitle::new("11", "eng", "srt");
    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![english.clone()])
        .with_stream_content("11", common::ENGLISH_SRT);
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("en-sub", "en", QualityTier::Retail, 80.0), common::ENGLISH_SRT);
    let translator = MockTranslator::working();
    let notifier = MockNotifier::new(MockBehavior::Working);
    let controller = common::mock_controller(
        common::test_config(),
        media.clone(),
        provider.clone(),
        translator.clone(),
        Some(notifier.clone()),
    )
    .await?;

    let outcome = controller.process("100", None).await?;

    let request = match outcome {
        Outcome::TranslationPending(request) => request,
        other => panic!("unexpected outcome: {}", other),
    };
    assert_eq!(request.from_lang, "en");
    assert_eq!(request.to_lang, "vi");
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.source, TranslationSource::MediaStream { stream: english });

    // the local stream wins, so only the target language was searched
    assert_eq!(provider.searched_languages(), vec!["vi".to_string()]);
    assert_eq!(translator.call_count(), 0);
    assert_eq!(media.upload_count(), 0);
    assert_eq!(controller.queue().len(), 1);

    settle().await;
    assert!(notifier.kinds().contains(&"translation_approval_required"));
    Ok(())
}

#[tokio::test]
async fn test_process_twiceWhilePending_shouldKeepOneQueueEntryAndNotifyOnce() -> Result<()> {
    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("11", "en", "subrip")])
        .with_stream_content("11", common::ENGLISH_SRT);
    let notifier = MockNotifier::new(MockBehavior::Working);
    let controller = common::mock_controller(
        common::test_config(),
        media,
        MockSubtitleProvider::new(),
        MockTranslator::working(),
        Some(notifier.clone()),
    )
    .await?;

    let first = controller.process("100", None).await?;
    let second = controller.process("100", None).await?;

    let (Outcome::TranslationPending(a), Outcome::TranslationPending(b)) = (first, second) else {
        panic!("expected two pending outcomes");
    };
    assert_eq!(a.id, b.id);
    assert_eq!(controller.queue().len(), 1);

    settle().await;
    let approvals = notifier.kinds().iter().filter(|k| **k == "translation_approval_required").count();
    assert_eq!(approvals, 1);
    Ok(())
}

#[tokio::test]
async fn test_process_withAutoApprovedTranslation_shouldExecuteImmediately() -> Result<()> {
    let mut config = common::test_config();
    config.acquisition.translation_requires_approval = false;

    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("11", "eng", "srt")])
        .with_stream_content("11", common::ENGLISH_SRT);
    let translator = MockTranslator::working();
    let controller = common::mock_controller(config, media.clone(), MockSubtitleProvider::new(), translator.clone(), None).await?;

    let outcome = controller.process("100", None).await?;

    match outcome {
        Outcome::TranslationExecuted(report) => {
            assert_eq!(report.lines, 3);
            assert_eq!(report.status, subpilot::database::HistoryStatus::AutoApproved);
        }
        other => panic!("unexpected outcome: {}", other),
    }
    let uploaded = SubtitleTrack::from_bytes(&media.uploads()[0].content)?;
    assert_eq!(uploaded.entries[0].text, "[vi] This is a test subtitle.");
    assert!(controller.queue().is_empty());
    assert_eq!(controller.history(5).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_process_withNothingAnywhere_shouldFailNotFound() -> Result<()> {
    let media = MockMediaServer::new().with_item(common::movie());
    let provider = MockSubtitleProvider::new();
    let notifier = MockNotifier::new(MockBehavior::Working);
    let controller =
        common::mock_controller(common::test_config(), media, provider.clone(), MockTranslator::working(), Some(notifier.clone())).await?;

    let outcome = controller.process("100", None).await?;

    match outcome {
        Outcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::NotFound),
        other => panic!("unexpected outcome: {}", other),
    }
    // target first, then every source language in fallback order
    let searched = provider.searched_languages();
    assert_eq!(searched[0], "vi");
    assert_eq!(searched[1], "en");
    assert_eq!(searched.len(), 1 + 1 + common::test_config().acquisition.known_source_languages.len());

    settle().await;
    assert!(notifier.kinds().contains(&"not_found"));
    assert_eq!(controller.stats().await?.total_failures, 1);
    Ok(())
}

#[tokio::test]
async fn test_process_withEveryDownloadFailing_shouldFailDownload() -> Result<()> {
    let media = MockMediaServer::new().with_item(common::movie());
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("a", "vi", QualityTier::Retail, 1.0), common::ENGLISH_SRT)
        .with_candidate(common::candidate("b", "vi", QualityTier::HumanTranslated, 1.0), common::ENGLISH_SRT)
        .with_failing_download("a")
        .with_failing_download("b");
    let controller =
        common::mock_controller(common::test_config(), media.clone(), provider.clone(), MockTranslator::working(), None).await?;

    let outcome = controller.process("100", None).await?;

    match outcome {
        Outcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::DownloadFailed),
        other => panic!("unexpected outcome: {}", other),
    }
    assert_eq!(provider.download_count(), 2);
    assert_eq!(media.upload_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_process_withUnparsableFirstCandidate_shouldUseNextOne() -> Result<()> {
    let media = MockMediaServer::new().with_item(common::movie());
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("broken", "vi", QualityTier::Retail, 1.0), "not a subtitle at all")
        .with_candidate(common::candidate("good", "vi", QualityTier::HumanTranslated, 1.0), common::ENGLISH_SRT);
    let controller = common::mock_controller(common::test_config(), media.clone(), provider, MockTranslator::working(), None).await?;

    let outcome = controller.process("100", None).await?;

    assert!(matches!(outcome, Outcome::Downloaded { ref candidate, .. } if candidate.id == "good"));
    assert_eq!(media.upload_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_process_withAutoSync_shouldRetimeAgainstLocalReference() -> Result<()> {
    let mut config = common::test_config();
    config.sync.auto_sync_after_download = true;

    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("11", "eng", "srt")])
        .with_stream_content("11", &common::numbered_srt(40, 0));
    // the same lines, 2.5s late
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("late", "vi", QualityTier::Retail, 1.0), &common::numbered_srt(40, 2500));
    let controller = common::mock_controller(config, media.clone(), provider, MockTranslator::working(), None).await?;

    let outcome = controller.process("100", None).await?;

    let stats = match outcome {
        Outcome::Downloaded { synced: Some(stats), .. } => stats,
        other => panic!("unexpected outcome: {}", other),
    };
    assert_eq!(stats.median_offset_ms, -2500);

    let uploaded = SubtitleTrack::from_bytes(&media.uploads()[0].content)?;
    let reference = SubtitleTrack::parse(&common::numbered_srt(40, 0))?;
    assert_eq!(uploaded.entries[0].start_time_ms, reference.entries[0].start_time_ms);
    assert_eq!(uploaded.entries[39].end_time_ms, reference.entries[39].end_time_ms);
    assert_eq!(controller.stats().await?.total_syncs, 1);
    Ok(())
}

#[tokio::test]
async fn test_process_twice_shouldServeSecondSearchFromCache() -> Result<()> {
    let media = MockMediaServer::new().with_item(common::movie());
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("r", "vi", QualityTier::Retail, 1.0), common::ENGLISH_SRT);
    let controller = common::mock_controller(common::test_config(), media.clone(), provider.clone(), MockTranslator::working(), None).await?;

    controller.process("100", None).await?;
    controller.process("100", None).await?;

    assert_eq!(provider.search_count(), 1);
    assert_eq!(provider.download_count(), 2);
    assert_eq!(controller.orchestrator().cache().stats().hits, 1);
    Ok(())
}

#[tokio::test]
async fn test_process_withExplicitLanguage_shouldOverrideDefault() -> Result<()> {
    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("1", "vie", "srt")]);
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("fr-1", "fr", QualityTier::HumanTranslated, 5.0), common::ENGLISH_SRT);
    let controller = common::mock_controller(common::test_config(), media.clone(), provider, MockTranslator::working(), None).await?;

    let outcome = controller.process("100", Some("fr")).await?;

    assert!(matches!(outcome, Outcome::Downloaded { .. }));
    assert_eq!(media.uploads()[0].language, "fr");
    Ok(())
}

#[tokio::test]
async fn test_process_withBetterCandidateAndReplaceEnabled_shouldReplaceExisting() -> Result<()> {
    let mut config = common::test_config();
    config.acquisition.replace_existing = true;

    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("1", "vie", "srt").with_title("Vietnamese [AI]")]);
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("retail", "vi", QualityTier::Retail, 5.0), common::ENGLISH_SRT);
    let controller = common::mock_controller(config, media.clone(), provider.clone(), MockTranslator::working(), None).await?;

    let outcome = controller.process("100", None).await?;

    match outcome {
        Outcome::Downloaded { candidate, .. } => assert_eq!(candidate.id, "retail"),
        other => panic!("unexpected outcome: {}", other),
    }
    let uploads = media.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].language, "vi");
    assert!(uploads[0].replace_existing);
    Ok(())
}

#[tokio::test]
async fn test_process_withEqualTierCandidate_shouldKeepExisting() -> Result<()> {
    let mut config = common::test_config();
    config.acquisition.replace_existing = true;

    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("1", "vie", "srt").with_title("Vietnamese Retail")]);
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("retail", "vi", QualityTier::Retail, 95.0), common::ENGLISH_SRT);
    let controller = common::mock_controller(config, media.clone(), provider.clone(), MockTranslator::working(), None).await?;

    let outcome = controller.process("100", None).await?;

    match outcome {
        Outcome::Skipped(decision) => assert_eq!(decision.reason, SkipReason::HasSubtitle),
        other => panic!("unexpected outcome: {}", other),
    }
    assert_eq!(provider.download_count(), 0);
    assert_eq!(media.upload_count(), 0);
    Ok(())
}
