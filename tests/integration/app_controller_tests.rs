/*!
 * Controller wiring: webhook intake, deduplication, file and media sync
 */

use anyhow::Result;
use std::sync::Arc;

use subpilot::acquisition::{ExistingSubtitle, MediaKind, MediaMetadata, Outcome, QualityTier};
use subpilot::app_controller::{Collaborators, Controller};
use subpilot::database::Repository;
use subpilot::errors::{AppError, EventError, SyncError};
use subpilot::events::{EventKind, EventSource, InboundEvent};
use subpilot::providers::mock::{MockMediaServer, MockSubtitleProvider, MockTranslator};
use subpilot::subtitle_processor::SubtitleTrack;
use crate::common;

const LIBRARY_NEW: &str = r#"{"event":"library.new","Metadata":{"ratingKey":"100","type":"movie"}}"#;

fn event(kind: EventKind, media_id: &str) -> InboundEvent {
    InboundEvent {
        source: EventSource::Plex,
        kind,
        media_id: media_id.to_string(),
        media_type: "movie".to_string(),
    }
}

async fn downloading_controller(media: MockMediaServer) -> Result<Controller> {
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("r", "vi", QualityTier::Retail, 1.0), common::ENGLISH_SRT);
    common::mock_controller(common::test_config(), media, provider, MockTranslator::working(), None).await
}

#[tokio::test]
async fn test_handleEvent_withDuplicate_shouldRunOnce() -> Result<()> {
    let media = MockMediaServer::new().with_item(common::movie());
    let controller = downloading_controller(media.clone()).await?;

    let first = controller.handle_event(event(EventKind::LibraryNew, "100"));
    let second = controller.handle_event(event(EventKind::LibraryNew, "100"));

    assert!(second.is_none());
    let outcome = first.expect("first event should be accepted").await??;
    assert!(matches!(outcome, Outcome::Downloaded { .. }));

    // still inside the cooldown after the task finished
    assert!(controller.handle_event(event(EventKind::LibraryOnDeck, "100")).is_none());
    assert_eq!(media.upload_count(), 1);
    assert_eq!(media.metadata_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_handleEvent_withDifferentMedia_shouldRunBoth() -> Result<()> {
    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_item(MediaMetadata::episode("200", "Dark", 1, 1));
    let controller = downloading_controller(media.clone()).await?;

    let a = controller.handle_event(event(EventKind::LibraryNew, "100"));
    let b = controller.handle_event(event(EventKind::LibraryNew, "200"));

    a.expect("accepted").await??;
    b.expect("accepted").await??;
    assert_eq!(media.upload_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_handleEvent_withPlayEventDisabled_shouldIgnore() -> Result<()> {
    let media = MockMediaServer::new().with_item(common::movie());
    let controller = downloading_controller(media.clone()).await?;

    assert!(controller.handle_event(event(EventKind::MediaPlay, "100")).is_none());
    assert_eq!(media.metadata_calls(), 0);

    // gating does not consume the dedup slot
    assert!(controller.handle_event(event(EventKind::LibraryNew, "100")).is_some());
    Ok(())
}

#[tokio::test]
async fn test_handleWebhook_withWrongSecret_shouldRejectBeforeParsing() -> Result<()> {
    let mut config = common::test_config();
    config.webhook_secret = "s3cret".to_string();
    let media = MockMediaServer::new().with_item(common::movie());
    let controller =
        common::mock_controller(config, media.clone(), MockSubtitleProvider::new(), MockTranslator::working(), None).await?;

    let result = controller.handle_webhook(EventSource::Plex, b"garbage", "application/json", Some("guess"));
    assert!(matches!(result, Err(AppError::Event(EventError::Unauthorized))));

    let result = controller.handle_webhook(EventSource::Plex, LIBRARY_NEW.as_bytes(), "application/json", None);
    assert!(matches!(result, Err(AppError::Event(EventError::Unauthorized))));

    let handle = controller.handle_webhook(EventSource::Plex, LIBRARY_NEW.as_bytes(), "application/json", Some("s3cret"))?;
    assert!(handle.is_some());
    Ok(())
}

#[tokio::test]
async fn test_handleWebhook_withMalformedBody_shouldReturnEventError() -> Result<()> {
    let controller = downloading_controller(MockMediaServer::new()).await?;

    let result = controller.handle_webhook(EventSource::Tautulli, b"{not json", "application/json", None);
    assert!(matches!(result, Err(AppError::Event(EventError::Malformed(_)))));

    let result = controller.handle_webhook(EventSource::Tautulli, br#"{"event":"stop","rating_key":"1"}"#, "application/json", None);
    assert!(matches!(result, Err(AppError::Event(EventError::Unsupported(_)))));
    Ok(())
}

#[tokio::test]
async fn test_process_withSeason_shouldReturnWrongMediaType() -> Result<()> {
    let mut season = MediaMetadata::movie("300", "Dark", None);
    season.kind = MediaKind::Season;
    let controller = downloading_controller(MockMediaServer::new().with_item(season)).await?;

    let result = controller.process("300", None).await;
    assert!(matches!(result, Err(AppError::WrongMediaType { .. })));
    assert!(matches!(controller.process("missing", None).await, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_syncFiles_shouldWriteRetimedTrack() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let reference = common::create_test_file(temp_dir.path(), "movie.en.srt", &common::numbered_srt(30, 0))?;
    let target = common::create_test_file(temp_dir.path(), "movie.vi.srt", &common::numbered_srt(30, 4000))?;
    let output = temp_dir.path().join("movie.vi.synced.srt");
    let controller = downloading_controller(MockMediaServer::new()).await?;

    let stats = controller.sync_files(&reference, &target, &output).await?;

    assert_eq!(stats.entries_synced, 30);
    assert_eq!(stats.avg_offset_ms, -4000);
    let written = SubtitleTrack::parse(&std::fs::read_to_string(&output)?)?;
    assert_eq!(written, SubtitleTrack::parse(&common::numbered_srt(30, 0))?);
    Ok(())
}

#[tokio::test]
async fn test_syncFiles_withEmptyTarget_shouldFailAndWriteNothing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let reference = common::create_test_file(temp_dir.path(), "ref.srt", common::ENGLISH_SRT)?;
    let target = common::create_test_file(temp_dir.path(), "target.srt", "")?;
    let output = temp_dir.path().join("out.srt");
    let controller = downloading_controller(MockMediaServer::new()).await?;

    let result = controller.sync_files(&reference, &target, &output).await;

    assert!(matches!(result, Err(AppError::Sync(SyncError::Subtitle(_)))));
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn test_estimateSync_shouldReportGroupsWithoutWriting() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let reference = common::create_test_file(temp_dir.path(), "ref.srt", &common::numbered_srt(120, 0))?;
    let target = common::create_test_file(temp_dir.path(), "target.srt", &common::numbered_srt(45, 0))?;
    let controller = downloading_controller(MockMediaServer::new()).await?;

    let estimate = controller.estimate_sync(&reference, &target).await?;

    assert_eq!(estimate.reference_entries, 120);
    assert_eq!(estimate.target_entries, 45);
    assert_eq!(estimate.estimated_api_calls, 4);
    assert_eq!(estimate.method, "mock-anchors");
    Ok(())
}

#[tokio::test]
async fn test_syncMedia_shouldUploadRetimedTargetWithReplace() -> Result<()> {
    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles(
            "100",
            vec![ExistingSubtitle::new("1", "vie", "srt"), ExistingSubtitle::new("2", "eng", "srt")],
        )
        .with_stream_content("1", &common::numbered_srt(40, 1500))
        .with_stream_content("2", &common::numbered_srt(40, 0));
    let controller = downloading_controller(media.clone()).await?;

    let report = controller.sync_media("100", None).await?;

    assert_eq!(report.reference_language, "en");
    assert_eq!(report.target_language, "vi");
    assert_eq!(report.method, "mock-anchors");
    assert_eq!(report.stats.median_offset_ms, -1500);

    let uploads = media.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].language, "vi");
    assert!(uploads[0].replace_existing);
    let uploaded = SubtitleTrack::from_bytes(&uploads[0].content)?;
    assert_eq!(uploaded.entries[0].start_time_ms, 1000);
    Ok(())
}

#[tokio::test]
async fn test_syncMedia_withoutTargetSubtitle_shouldBeNotFound() -> Result<()> {
    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("2", "eng", "srt")])
        .with_stream_content("2", common::ENGLISH_SRT);
    let controller =
        common::mock_controller(common::test_config(), media, MockSubtitleProvider::new(), MockTranslator::working(), None).await?;

    assert!(matches!(controller.sync_media("100", None).await, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_sync_withoutAnchorFinder_shouldReportConfigError() -> Result<()> {
    let collaborators = Collaborators {
        media_server: Arc::new(MockMediaServer::new().with_item(common::movie())),
        provider: Arc::new(MockSubtitleProvider::new()),
        translator: Arc::new(MockTranslator::working()),
        anchor_finder: None,
        notifier: None,
    };
    let controller = Controller::with_collaborators(common::test_config(), collaborators, Repository::new_in_memory()?).await?;

    assert!(matches!(controller.sync_media("100", None).await, Err(AppError::Config(_))));

    let temp_dir = common::create_temp_dir()?;
    let file = common::create_test_file(temp_dir.path(), "a.srt", common::ENGLISH_SRT)?;
    let result = controller.sync_files(&file, &file, &temp_dir.path().join("b.srt")).await;
    assert!(matches!(result, Err(AppError::Config(_))));
    Ok(())
}

#[tokio::test]
async fn test_statsAndHistory_onFreshController_shouldBeEmpty() -> Result<()> {
    let controller = downloading_controller(MockMediaServer::new()).await?;

    let stats = controller.stats().await?;
    assert_eq!(stats.total_downloads, 0);
    assert_eq!(stats.success_rate(), 0.0);
    assert!(controller.history(20).await?.is_empty());
    assert!(controller.queue().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_syncMedia_withExplicitKnownSourceLanguage_shouldSearchItOnce() -> Result<()> {
    let media = MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("1", "vie", "srt")])
        .with_stream_content("1", common::ENGLISH_SRT);
    let provider = MockSubtitleProvider::new();
    let controller =
        common::mock_controller(common::test_config(), media, provider.clone(), MockTranslator::working(), None).await?;

    let result = controller.sync_media("100", Some("fr")).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    let searched = provider.searched_languages();
    assert_eq!(searched.iter().filter(|l| l.as_str() == "fr").count(), 1);
    assert_eq!(searched[0], "fr");
    Ok(())
}
