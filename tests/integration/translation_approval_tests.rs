/*!
 * Approval, rejection and manual translation through the controller
 */

use anyhow::Result;
use std::sync::Arc;

use subpilot::acquisition::{ExistingSubtitle, Outcome, QualityTier};
use subpilot::app_controller::{Collaborators, Controller};
use subpilot::database::{HistoryStatus, Repository};
use subpilot::errors::AppError;
use subpilot::providers::mock::{MockAnchorFinder, MockBehavior, MockMediaServer, MockSubtitleProvider, MockTranslator};
use subpilot::providers::AnchorFinder;
use subpilot::subtitle_processor::SubtitleTrack;
use subpilot::translation::{PendingTranslationRequest, RequestStatus, TranslationSource};
use crate::common;

fn media_with_english_stream() -> MockMediaServer {
    MockMediaServer::new()
        .with_item(common::movie())
        .with_subtitles("100", vec![ExistingSubtitle::new("11", "eng", "srt")])
        .with_stream_content("11", common::ENGLISH_SRT)
}

/// Controller with one pending en -> vi request for media 100
async fn pending_controller(media: MockMediaServer, translator: MockTranslator) -> Result<Controller> {
    let controller = common::mock_controller(common::test_config(), media, MockSubtitleProvider::new(), translator, None).await?;
    let outcome = controller.process("100", None).await?;
    assert!(matches!(outcome, Outcome::TranslationPending(_)));
    Ok(controller)
}

#[tokio::test]
async fn test_approve_withoutPriorEstimate_shouldTranslateAndUpload() -> Result<()> {
    let media = media_with_english_stream();
    let translator = MockTranslator::working();
    let controller = pending_controller(media.clone(), translator.clone()).await?;

    let report = controller.approve("100").await?;

    assert_eq!(report.media_id, "100");
    assert_eq!(report.lines, 3);
    assert_eq!(report.from_lang, "en");
    assert_eq!(report.to_lang, "vi");
    assert_eq!(report.status, HistoryStatus::Approved);
    assert_eq!(report.model, "gpt-4o-mini");
    assert_eq!(translator.call_count(), 1);
    assert!(controller.queue().is_empty());

    let uploads = media.uploads();
    assert_eq!(uploads.len(), 1);
    let uploaded = SubtitleTrack::from_bytes(&uploads[0].content)?;
    let source = SubtitleTrack::parse(common::ENGLISH_SRT)?;
    for (out, original) in uploaded.entries.iter().zip(&source.entries) {
        assert_eq!(out.start_time_ms, original.start_time_ms);
        assert_eq!(out.end_time_ms, original.end_time_ms);
        assert_eq!(out.text, format!("[vi] {}", original.text));
    }

    let stats = controller.stats().await?;
    assert_eq!(stats.total_translations, 1);
    assert_eq!(stats.total_translation_lines, 3);
    assert_eq!(controller.history(10).await?[0].status, HistoryStatus::Approved);
    Ok(())
}

#[tokio::test]
async fn test_estimate_thenApprove_shouldNotChangeOutcome() -> Result<()> {
    let controller = pending_controller(media_with_english_stream(), MockTranslator::working()).await?;

    let estimate = controller.estimate("100").await?;
    assert_eq!(estimate.entries, 3);
    assert_eq!(estimate.estimated_batches, 1);
    assert_eq!(controller.queue().len(), 1);

    let report = controller.approve("100").await?;
    assert_eq!(report.lines, estimate.entries);
    Ok(())
}

#[tokio::test]
async fn test_approve_twice_shouldReportMissingRequestSecondTime() -> Result<()> {
    let media = media_with_english_stream();
    let controller = pending_controller(media.clone(), MockTranslator::working()).await?;

    controller.approve("100").await?;
    let second = controller.approve("100").await;

    assert!(matches!(second, Err(AppError::NotFound(_))));
    assert_eq!(media.upload_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_reject_shouldDropRequestAndRecordHistory() -> Result<()> {
    let media = media_with_english_stream();
    let translator = MockTranslator::working();
    let controller = pending_controller(media.clone(), translator.clone()).await?;

    let rejected = controller.reject("100").await?;

    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert!(controller.queue().is_empty());
    assert_eq!(translator.call_count(), 0);
    assert_eq!(media.upload_count(), 0);
    assert_eq!(controller.history(10).await?[0].status, HistoryStatus::Rejected);
    assert!(matches!(controller.approve("100").await, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_approveAndReject_withUnknownMedia_shouldBeNotFound() -> Result<()> {
    let controller =
        common::mock_controller(common::test_config(), MockMediaServer::new(), MockSubtitleProvider::new(), MockTranslator::working(), None)
            .await?;

    assert!(matches!(controller.approve("nope").await, Err(AppError::NotFound(_))));
    assert!(matches!(controller.reject("nope").await, Err(AppError::NotFound(_))));
    assert!(matches!(controller.estimate("nope").await, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_approve_withFailingTranslator_shouldFailWithoutPartialUpload() -> Result<()> {
    let media = media_with_english_stream();
    let controller = pending_controller(media.clone(), MockTranslator::failing()).await?;

    let err = controller.approve("100").await.unwrap_err();

    assert!(matches!(err, AppError::Translation(_)));
    assert_eq!(media.upload_count(), 0);
    assert!(controller.queue().is_empty());

    let history = controller.history(10).await?;
    assert_eq!(history[0].status, HistoryStatus::Failed);
    assert!(history[0].error.is_some());
    assert_eq!(controller.stats().await?.total_failures, 1);
    Ok(())
}

#[tokio::test]
async fn test_pendingRequest_afterRestart_shouldBeRestoredAndApprovable() -> Result<()> {
    let repository = Repository::new_in_memory()?;
    let media = media_with_english_stream();

    let build = |repository: Repository| {
        let collaborators = Collaborators {
            media_server: Arc::new(media.clone()),
            provider: Arc::new(MockSubtitleProvider::new()),
            translator: Arc::new(MockTranslator::working()),
            anchor_finder: Some(Arc::new(MockAnchorFinder::new(MockBehavior::Working)) as Arc<dyn AnchorFinder>),
            notifier: None,
        };
        Controller::with_collaborators(common::test_config(), collaborators, repository)
    };

    let first = build(repository.clone()).await?;
    let pending = match first.process("100", None).await? {
        Outcome::TranslationPending(request) => request,
        other => panic!("unexpected outcome: {}", other),
    };
    drop(first);

    let restarted = build(repository).await?;
    let queue = restarted.queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, pending.id);

    restarted.approve("100").await?;
    assert_eq!(media.upload_count(), 1);
    Ok(())
}

/// A crash between approval and upload leaves an approved row behind; the
/// next start must make that request actionable again
#[tokio::test]
async fn test_interruptedApproval_afterRestart_shouldBePendingAgain() -> Result<()> {
    let repository = Repository::new_in_memory()?;
    let media = media_with_english_stream();
    let stream = ExistingSubtitle::new("11", "eng", "srt");
    let mut interrupted =
        PendingTranslationRequest::new("100", "The Matrix (1999)", "en", "vi", TranslationSource::MediaStream { stream }, false);
    interrupted.status = RequestStatus::Approved;
    repository.upsert_pending(&interrupted).await?;

    let collaborators = Collaborators {
        media_server: Arc::new(media.clone()),
        provider: Arc::new(MockSubtitleProvider::new()),
        translator: Arc::new(MockTranslator::working()),
        anchor_finder: None,
        notifier: None,
    };
    let controller = Controller::with_collaborators(common::test_config(), collaborators, repository.clone()).await?;

    let queue = controller.queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].status, RequestStatus::Pending);
    assert_eq!(repository.load_pending().await?[0].status, RequestStatus::Pending);

    let report = controller.approve("100").await?;
    assert_eq!(report.request_id, interrupted.id);
    assert_eq!(media.upload_count(), 1);
    assert!(controller.queue().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_translate_withExplicitSource_shouldUseProviderAndBypassQueue() -> Result<()> {
    let media = MockMediaServer::new().with_item(common::movie());
    let provider = MockSubtitleProvider::new()
        .with_candidate(common::candidate("fr-best", "fr", QualityTier::Retail, 3.0), common::ENGLISH_SRT)
        .with_candidate(common::candidate("en-best", "en", QualityTier::Retail, 90.0), common::ENGLISH_SRT);
    let controller = common::mock_controller(common::test_config(), media.clone(), provider.clone(), MockTranslator::working(), None).await?;

    let report = controller.translate("100", Some("fr")).await?;

    assert_eq!(report.from_lang, "fr");
    assert_eq!(report.status, HistoryStatus::Approved);
    assert_eq!(provider.searched_languages(), vec!["fr".to_string()]);
    assert_eq!(media.upload_count(), 1);
    assert!(controller.queue().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_translate_withoutAnySource_shouldBeNotFound() -> Result<()> {
    let media = MockMediaServer::new().with_item(common::movie());
    let controller =
        common::mock_controller(common::test_config(), media.clone(), MockSubtitleProvider::new(), MockTranslator::working(), None).await?;

    let result = controller.translate("100", None).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(media.upload_count(), 0);
    Ok(())
}
