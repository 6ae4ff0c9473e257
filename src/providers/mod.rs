/*!
 * External collaborators.
 *
 * The decision engine only talks to the outside world through the traits in
 * this module:
 * - `MediaServer`: metadata, existing subtitle streams, upload (Plex)
 * - `SubtitleProvider`: search and download (SubSource)
 * - `AnchorFinder` and `Translator`: the AI collaborator (OpenAI-compatible)
 * - `Notifier`: fire-and-forget operator messages (Telegram)
 *
 * Implementations own their network retry policy; see `retry`.
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use crate::acquisition::{ExistingSubtitle, MediaMetadata, SearchFingerprint, SubtitleCandidate};
use crate::errors::{AppError, ProviderError};
use crate::notifications::NotificationEvent;
use crate::sync::{AnchorLine, AnchorMatch};

/// Media library the subtitles are attached to
#[async_trait]
pub trait MediaServer: Send + Sync + Debug {
    /// Resolve an identifier; `ProviderError::NotFound` when it does not exist
    async fn fetch_metadata(&self, media_id: &str) -> Result<MediaMetadata, ProviderError>;

    /// Subtitle streams currently attached to the item
    async fn existing_subtitles(&self, media_id: &str) -> Result<Vec<ExistingSubtitle>, ProviderError>;

    /// Raw content of a text-based stream
    async fn download_subtitle(&self, media_id: &str, stream: &ExistingSubtitle) -> Result<Vec<u8>, ProviderError>;

    /// Attach an SRT file. With `replace_existing`, external subtitles of the
    /// same language are removed first.
    async fn upload_subtitle(
        &self,
        media_id: &str,
        language: &str,
        content: &[u8],
        replace_existing: bool,
    ) -> Result<(), ProviderError>;
}

/// Subtitle search and download service
#[async_trait]
pub trait SubtitleProvider: Send + Sync + Debug {
    async fn search(&self, fingerprint: &SearchFingerprint) -> Result<Vec<SubtitleCandidate>, ProviderError>;

    /// SRT bytes of a candidate (archives already unpacked)
    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>, ProviderError>;
}

/// Pairs lines of two tracks that carry the same utterance
#[async_trait]
pub trait AnchorFinder: Send + Sync + Debug {
    /// Returned indices refer to `AnchorLine::index` values of the inputs
    async fn find_anchors(&self, reference: &[AnchorLine], target: &[AnchorLine]) -> Result<Vec<AnchorMatch>, ProviderError>;

    /// Model or method name for reporting
    fn name(&self) -> String;
}

/// Machine translation of subtitle lines
#[async_trait]
pub trait Translator: Send + Sync + Debug {
    /// Translate `lines`; the output must be index-aligned with the input
    async fn translate_batch(&self, lines: &[String], from_lang: &str, to_lang: &str) -> Result<Vec<String>, ProviderError>;

    fn model(&self) -> String;
}

/// Operator notification channel
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), ProviderError>;
}

/// Run one external call under a time budget. Elapsed budgets become
/// `AppError::Timeout` naming the call.
pub async fn with_timeout<T, E, F>(budget: Duration, call: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AppError>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(AppError::Timeout(format!("{} exceeded {}s", call, budget.as_secs()))),
    }
}

pub mod retry;
pub mod plex;
pub mod subsource;
pub mod openai;
pub mod telegram;
pub mod mock;
