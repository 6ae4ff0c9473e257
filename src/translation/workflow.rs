/*!
 * Approval workflow for machine translation.
 *
 * `pending -> {approved, rejected}`, `approved -> {executed, failed}`. The
 * in-process `PendingQueue` decides every transition; the repository keeps a
 * write-through copy for restarts plus the history and counters.
 */

use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::batch::BatchTranslator;
use super::estimate::TranslationEstimate;
use super::queue::{PendingQueue, PendingTranslationRequest, RequestStatus, TranslationSource};
use crate::database::{HistoryRecord, HistoryStatus, Repository, StatCounter};
use crate::errors::AppError;
use crate::notifications::{NotificationDispatcher, NotificationEvent};
use crate::providers::{with_timeout, MediaServer, SubtitleProvider};
use crate::subtitle_processor::SubtitleTrack;

/// Result of one executed translation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationReport {
    pub request_id: String,
    pub media_id: String,
    pub title: String,
    pub from_lang: String,
    pub to_lang: String,
    pub lines: usize,
    pub cost_usd: f64,
    pub model: String,
    pub status: HistoryStatus,
}

#[derive(Debug, Clone)]
pub struct TranslationWorkflow {
    queue: PendingQueue,
    media_server: Arc<dyn MediaServer>,
    provider: Arc<dyn SubtitleProvider>,
    translator: BatchTranslator,
    repository: Option<Repository>,
    notifier: NotificationDispatcher,
    batch_size: usize,
    call_timeout: Duration,
}

impl TranslationWorkflow {
    pub fn new(
        media_server: Arc<dyn MediaServer>,
        provider: Arc<dyn SubtitleProvider>,
        translator: BatchTranslator,
        batch_size: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            queue: PendingQueue::new(),
            media_server,
            provider,
            translator,
            repository: None,
            notifier: NotificationDispatcher::disabled(),
            batch_size,
            call_timeout,
        }
    }

    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_notifier(mut self, notifier: NotificationDispatcher) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    /// Live requests, oldest first
    pub fn list(&self) -> Vec<PendingTranslationRequest> {
        self.queue.list()
    }

    /// Reload requests persisted by a previous run
    pub async fn restore_from_repository(&self) -> anyhow::Result<usize> {
        let Some(repo) = &self.repository else {
            return Ok(0);
        };
        let requests = repo.load_pending().await?;
        let reset = self.queue.restore(requests);
        for request in &reset {
            warn!("Translation {} for {} was interrupted; back to pending", request.id, request.title);
            self.persist(request).await;
        }
        let count = self.queue.len();
        if count > 0 {
            info!("Restored {} pending translation request(s)", count);
        }
        Ok(count)
    }

    /// Create or refresh the pending entry for the request's language pair.
    /// The operator is notified only when a new entry appears.
    pub async fn enqueue(&self, request: PendingTranslationRequest) -> PendingTranslationRequest {
        let (stored, created) = self.queue.upsert(request);
        self.persist(&stored).await;

        if created {
            info!(
                "Translation {} -> {} for {} awaits approval",
                stored.from_lang, stored.to_lang, stored.title
            );
            self.notifier.notify(NotificationEvent::TranslationApprovalRequired {
                title: stored.title.clone(),
                media_id: stored.media_id.clone(),
                from_lang: stored.from_lang.clone(),
                to_lang: stored.to_lang.clone(),
            });
        }
        stored
    }

    /// Cost projection for the live request of a media item. Read only.
    pub async fn estimate(&self, media_id: &str) -> Result<TranslationEstimate, AppError> {
        let request = self.live_request(media_id)?;
        let track = self.load_source(&request).await?;
        Ok(TranslationEstimate::for_track(&track, self.batch_size, &self.translator.model()))
    }

    /// Approve the pending request and execute it before returning
    pub async fn approve(&self, media_id: &str) -> Result<TranslationReport, AppError> {
        let request = self.live_request(media_id)?;
        let key = request.key();
        let approved = self.queue.transition(&key, RequestStatus::Pending, RequestStatus::Approved)?;
        self.persist(&approved).await;
        info!("Approved translation {} for {}", approved.id, approved.title);

        let result = self.execute(&approved, HistoryStatus::Approved).await;
        let next = if result.is_ok() { RequestStatus::Executed } else { RequestStatus::Failed };
        if let Err(e) = self.queue.transition(&key, RequestStatus::Approved, next) {
            warn!("Could not close translation {}: {}", approved.id, e);
        }
        self.forget(&approved.id).await;
        result
    }

    /// Drop the pending request without translating anything
    pub async fn reject(&self, media_id: &str) -> Result<PendingTranslationRequest, AppError> {
        let request = self.live_request(media_id)?;
        let rejected = self.queue.transition(&request.key(), RequestStatus::Pending, RequestStatus::Rejected)?;
        self.forget(&rejected.id).await;
        self.record_history(&rejected, HistoryStatus::Rejected, 0, 0.0, None).await;
        info!("Rejected translation {} for {}", rejected.id, rejected.title);
        Ok(rejected)
    }

    /// Execute without going through the queue; recorded with `status`
    /// (auto_approved from the pipeline, approved for manual runs)
    pub async fn execute_now(&self, request: &PendingTranslationRequest, status: HistoryStatus) -> Result<TranslationReport, AppError> {
        self.execute(request, status).await
    }

    /// Download, translate, upload. Every outcome lands in the history.
    async fn execute(&self, request: &PendingTranslationRequest, status: HistoryStatus) -> Result<TranslationReport, AppError> {
        match self.run(request, status).await {
            Ok(report) => {
                self.record_history(request, status, report.lines, report.cost_usd, None).await;
                self.bump(StatCounter::Translations, 1).await;
                self.bump(StatCounter::TranslationLines, report.lines as i64).await;
                self.notifier.notify(NotificationEvent::TranslationCompleted {
                    title: request.title.clone(),
                    lines: report.lines,
                    cost_usd: report.cost_usd,
                });
                Ok(report)
            }
            Err(e) => {
                error!("Translation {} for {} failed: {}", request.id, request.title, e);
                self.record_history(request, HistoryStatus::Failed, 0, 0.0, Some(e.to_string())).await;
                self.bump(StatCounter::Failures, 1).await;
                self.notifier.notify(NotificationEvent::Error {
                    title: request.title.clone(),
                    message: format!("Translation failed: {}", e),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, request: &PendingTranslationRequest, status: HistoryStatus) -> Result<TranslationReport, AppError> {
        let source = self.load_source(request).await?;
        info!(
            "Translating {} ({} lines, {} -> {}) from {}",
            request.title,
            source.len(),
            request.from_lang,
            request.to_lang,
            request.source.describe()
        );
        self.notifier.notify(NotificationEvent::TranslationStarted {
            title: request.title.clone(),
            from_lang: request.from_lang.clone(),
            to_lang: request.to_lang.clone(),
        });

        let translated = self
            .translator
            .translate_track(&source, &request.from_lang, &request.to_lang)
            .await?;

        with_timeout(
            self.call_timeout,
            "subtitle upload",
            self.media_server.upload_subtitle(
                &request.media_id,
                &request.to_lang,
                &translated.to_bytes(),
                request.replace_existing,
            ),
        )
        .await?;

        let model = self.translator.model();
        let cost_usd = TranslationEstimate::for_track(&source, self.batch_size, &model).estimated_cost_usd;

        Ok(TranslationReport {
            request_id: request.id.clone(),
            media_id: request.media_id.clone(),
            title: request.title.clone(),
            from_lang: request.from_lang.clone(),
            to_lang: request.to_lang.clone(),
            lines: translated.len(),
            cost_usd,
            model,
            status,
        })
    }

    async fn load_source(&self, request: &PendingTranslationRequest) -> Result<SubtitleTrack, AppError> {
        let bytes = match &request.source {
            TranslationSource::MediaStream { stream } => {
                with_timeout(
                    self.call_timeout,
                    "source stream download",
                    self.media_server.download_subtitle(&request.media_id, stream),
                )
                .await?
            }
            TranslationSource::Provider { candidate } => {
                with_timeout(self.call_timeout, "source subtitle download", self.provider.download(candidate)).await?
            }
        };
        Ok(SubtitleTrack::from_bytes(&bytes)?)
    }

    fn live_request(&self, media_id: &str) -> Result<PendingTranslationRequest, AppError> {
        self.queue
            .latest_for_media(media_id)
            .ok_or_else(|| AppError::NotFound(format!("No translation request for media {}", media_id)))
    }

    async fn persist(&self, request: &PendingTranslationRequest) {
        if let Some(repo) = &self.repository {
            if let Err(e) = repo.upsert_pending(request).await {
                warn!("Failed to persist translation request {}: {}", request.id, e);
            }
        }
    }

    async fn forget(&self, request_id: &str) {
        if let Some(repo) = &self.repository {
            if let Err(e) = repo.delete_pending(request_id).await {
                warn!("Failed to remove persisted translation request {}: {}", request_id, e);
            }
        }
    }

    async fn record_history(
        &self,
        request: &PendingTranslationRequest,
        status: HistoryStatus,
        lines: usize,
        cost_usd: f64,
        error: Option<String>,
    ) {
        let Some(repo) = &self.repository else {
            return;
        };
        let record = HistoryRecord {
            request_id: request.id.clone(),
            media_id: request.media_id.clone(),
            title: request.title.clone(),
            from_lang: request.from_lang.clone(),
            to_lang: request.to_lang.clone(),
            status,
            lines_translated: lines as i64,
            cost_usd,
            model: self.translator.model(),
            error,
            created_at: Utc::now().to_rfc3339(),
        };
        if let Err(e) = repo.add_history(&record).await {
            warn!("Failed to record translation history: {}", e);
        }
    }

    async fn bump(&self, counter: StatCounter, amount: i64) {
        if let Some(repo) = &self.repository {
            if let Err(e) = repo.increment_stat(counter, amount).await {
                warn!("Failed to update {} counter: {}", counter.as_str(), e);
            }
        }
    }
}
