/*!
 * Tests for batch translation, retries and the approval queue
 */

use std::sync::Arc;

use subpilot::acquisition::{ExistingSubtitle, QualityTier};
use subpilot::errors::{AppError, TranslationError};
use subpilot::providers::mock::{MockBehavior, MockTranslator};
use subpilot::subtitle_processor::SubtitleTrack;
use subpilot::translation::batch::{decode_batch, encode_batch};
use subpilot::translation::{
    BatchPolicy, BatchTranslator, PendingQueue, PendingTranslationRequest, RequestStatus, TranslationEstimate,
    TranslationSource,
};
use crate::common;

fn policy(batch_size: usize, retry_count: u32) -> BatchPolicy {
    BatchPolicy { batch_size, retry_count, backoff_base_ms: 1 }
}

fn stream_request(media_id: &str, from: &str, to: &str) -> PendingTranslationRequest {
    let stream = ExistingSubtitle::new("5", from, "srt");
    PendingTranslationRequest::new(media_id, "The Matrix (1999)", from, to, TranslationSource::MediaStream { stream }, false)
}

#[tokio::test]
async fn test_translateTrack_shouldKeepTimingAndNumbering() {
    let track = SubtitleTrack::parse(&common::numbered_srt(25, 0)).unwrap();
    let translator = MockTranslator::working();
    let batcher = BatchTranslator::new(Arc::new(translator.clone()), policy(10, 0));

    let translated = batcher.translate_track(&track, "en", "vi").await.unwrap();

    assert_eq!(translator.call_count(), 3);
    assert_eq!(translated.len(), 25);
    for (out, original) in translated.entries.iter().zip(&track.entries) {
        assert_eq!(out.seq_num, original.seq_num);
        assert_eq!(out.start_time_ms, original.start_time_ms);
        assert_eq!(out.end_time_ms, original.end_time_ms);
        assert_eq!(out.text, format!("[vi] {}", original.text));
    }
}

#[tokio::test]
async fn test_translateTrack_withIntermittentFailure_shouldRetryAndSucceed() {
    let track = SubtitleTrack::parse(&common::numbered_srt(4, 0)).unwrap();
    // the first call succeeds, the second fails, the third succeeds
    let translator = MockTranslator::new(MockBehavior::Intermittent { fail_every: 2 });
    let batcher = BatchTranslator::new(Arc::new(translator.clone()), policy(2, 2));

    let translated = batcher.translate_track(&track, "en", "vi").await.unwrap();

    assert_eq!(translated.len(), 4);
    assert_eq!(translator.call_count(), 3);
}

#[tokio::test]
async fn test_translateTrack_withFailingTranslator_shouldAbortWholeTrack() {
    let track = SubtitleTrack::parse(common::ENGLISH_SRT).unwrap();
    let translator = MockTranslator::failing();
    let batcher = BatchTranslator::new(Arc::new(translator.clone()), policy(10, 2));

    let err = batcher.translate_track(&track, "en", "vi").await.unwrap_err();

    match err {
        TranslationError::Batch { batch, attempts, message } => {
            assert_eq!(batch, 0);
            assert_eq!(attempts, 3);
            assert!(message.contains("Simulated failure"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(translator.call_count(), 3);
}

#[tokio::test]
async fn test_translateTrack_afterBatchGivesUp_shouldNotSendRemainingBatches() {
    let track = SubtitleTrack::parse(&common::numbered_srt(50, 0)).unwrap();
    let translator = MockTranslator::failing();
    let batcher = BatchTranslator::new(Arc::new(translator.clone()), policy(5, 1));

    let err = batcher.translate_track(&track, "en", "vi").await.unwrap_err();

    assert!(matches!(err, TranslationError::Batch { batch: 0, attempts: 2, .. }));
    // ten batches of two attempts each; only the two in flight were tried
    assert!(translator.call_count() <= 4, "sent {} calls", translator.call_count());
}

#[tokio::test]
async fn test_translateTrack_withShortResponse_shouldTreatAsFailure() {
    let track = SubtitleTrack::parse(common::ENGLISH_SRT).unwrap();
    let batcher = BatchTranslator::new(Arc::new(MockTranslator::new(MockBehavior::Misaligned)), policy(10, 1));

    let err = batcher.translate_track(&track, "en", "vi").await.unwrap_err();
    assert!(err.to_string().contains("expected 3 lines, got 2"));
}

#[test]
fn test_batchCodec_withMultilineEntry_shouldKeepLineBreaks() {
    let lines = vec!["First line\nsecond line".to_string(), "Other".to_string()];
    let encoded = encode_batch(&lines);
    assert_eq!(decode_batch(&encoded, 2).unwrap(), lines);
}

#[test]
fn test_decodeBatch_withDuplicateMarker_shouldKeepFirst() {
    let response = "<<ENTRY_0>>\nA\n<<ENTRY_0>>\nB\n<<ENTRY_1>>\nC\n<<END>>";
    assert_eq!(decode_batch(response, 2).unwrap(), vec!["A".to_string(), "C".to_string()]);
}

#[test]
fn test_estimate_forSampleTrack_shouldCountEntriesAndBatches() {
    let track = SubtitleTrack::parse(common::ENGLISH_SRT).unwrap();
    let estimate = TranslationEstimate::for_track(&track, 2, "gpt-4o-mini");

    assert_eq!(estimate.entries, 3);
    assert_eq!(estimate.estimated_batches, 2);
    assert_eq!(estimate.characters, track.total_chars());
    assert_eq!(estimate.estimated_tokens, track.total_chars() / 4);
    assert_eq!(estimate.model, "gpt-4o-mini");
}

#[test]
fn test_pendingQueue_withDifferentLanguagePairs_shouldKeepSeparateEntries() {
    let queue = PendingQueue::new();
    queue.upsert(stream_request("1", "en", "vi"));
    queue.upsert(stream_request("1", "fr", "vi"));
    let (_, created) = queue.upsert(stream_request("1", "en", "vi"));

    assert!(!created);
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_pendingQueue_upsert_shouldRefreshSourceButKeepIdentity() {
    let queue = PendingQueue::new();
    let (first, _) = queue.upsert(stream_request("1", "en", "vi"));

    let candidate = common::candidate("sub-9", "en", QualityTier::Retail, 10.0);
    let replacement =
        PendingTranslationRequest::new("1", "The Matrix (1999)", "en", "vi", TranslationSource::Provider { candidate }, true);
    let (refreshed, created) = queue.upsert(replacement);

    assert!(!created);
    assert_eq!(refreshed.id, first.id);
    assert_eq!(refreshed.created_at, first.created_at);
    assert!(refreshed.replace_existing);
    assert!(matches!(refreshed.source, TranslationSource::Provider { .. }));
}

#[test]
fn test_pendingQueue_approveTwice_shouldConflictOnSecond() {
    let queue = PendingQueue::new();
    let (request, _) = queue.upsert(stream_request("7", "en", "vi"));

    let approved = queue.transition(&request.key(), RequestStatus::Pending, RequestStatus::Approved).unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);

    let second = queue.transition(&request.key(), RequestStatus::Pending, RequestStatus::Approved);
    match second {
        Err(AppError::QueueConflict { media_id, status }) => {
            assert_eq!(media_id, "7");
            assert_eq!(status, "approved");
        }
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[test]
fn test_pendingQueue_restore_shouldSkipTerminalRequests() {
    let queue = PendingQueue::new();
    let live = stream_request("1", "en", "vi");
    let mut done = stream_request("2", "en", "vi");
    done.status = RequestStatus::Executed;

    queue.restore(vec![live, done]);

    assert_eq!(queue.len(), 1);
    assert!(queue.latest_for_media("1").is_some());
    assert!(queue.latest_for_media("2").is_none());
}

#[test]
fn test_pendingQueue_restore_withInterruptedApproval_shouldResetToPending() {
    let queue = PendingQueue::new();
    let mut interrupted = stream_request("1", "en", "vi");
    interrupted.status = RequestStatus::Approved;

    let reset = queue.restore(vec![interrupted.clone(), stream_request("2", "en", "vi")]);

    assert_eq!(reset.len(), 1);
    assert_eq!(reset[0].id, interrupted.id);
    let restored = queue.latest_for_media("1").unwrap();
    assert_eq!(restored.status, RequestStatus::Pending);
    assert!(queue.transition(&restored.key(), RequestStatus::Pending, RequestStatus::Rejected).is_ok());
}
