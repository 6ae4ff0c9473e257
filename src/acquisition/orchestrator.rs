/*!
 * Acquisition pipeline for one media item and one target language.
 *
 * `process` resolves the item, then walks the decision steps in order and
 * always ends in exactly one `Outcome`:
 *
 * 1. resolve metadata (errors before this point are returned, not wrapped)
 * 2. inspect existing subtitle streams
 * 3. skip checks
 * 4. cache-first search, ranking, quality threshold
 * 5. replacement rule, download (with optional sync), single upload
 * 6. translation fallback from a local or provider source
 * 7. not found / below threshold
 */

use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::decision::{self, AcquisitionOptions, SkipDecision, SkipReason};
use super::models::{ExistingSubtitle, MediaMetadata, SubtitleCandidate};
use super::ranker;
use super::search_cache::{SearchCache, SearchFingerprint};
use crate::database::{HistoryStatus, Repository, StatCounter};
use crate::errors::{AppError, ProviderError, SyncError};
use crate::language_utils;
use crate::notifications::{NotificationDispatcher, NotificationEvent};
use crate::providers::{with_timeout, MediaServer, SubtitleProvider};
use crate::subtitle_processor::SubtitleTrack;
use crate::sync::{SyncEngine, SyncStats};
use crate::translation::{PendingTranslationRequest, TranslationReport, TranslationSource, TranslationWorkflow};

/// Why a run ended in `Outcome::Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    NotFound,
    DownloadFailed,
    ParseError,
    Timeout,
    Provider,
    Translation,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::NotFound => "not-found",
            Self::DownloadFailed => "download-failed",
            Self::ParseError => "parse-error",
            Self::Timeout => "timeout",
            Self::Provider => "provider-error",
            Self::Translation => "translation-failed",
            Self::Other => "error",
        };
        write!(f, "{}", code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ProcessFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl From<&AppError> for ProcessFailure {
    fn from(error: &AppError) -> Self {
        let kind = match error {
            AppError::NotFound(_) | AppError::Provider(ProviderError::NotFound(_)) => FailureKind::NotFound,
            AppError::Timeout(_) => FailureKind::Timeout,
            AppError::Subtitle(_) => FailureKind::ParseError,
            AppError::Provider(_) => FailureKind::Provider,
            AppError::Translation(_) => FailureKind::Translation,
            _ => FailureKind::Other,
        };
        Self::new(kind, error.to_string())
    }
}

impl fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Terminal result of one `process` call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Skipped(SkipDecision),
    Downloaded {
        candidate: SubtitleCandidate,
        /// Present when the track was re-timed before upload
        synced: Option<SyncStats>,
    },
    TranslationPending(PendingTranslationRequest),
    TranslationExecuted(TranslationReport),
    Failed(ProcessFailure),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Skipped(decision) => write!(f, "skipped ({})", decision),
            Outcome::Downloaded { candidate, synced } => {
                write!(f, "downloaded {} [{}]", candidate.name, candidate.tier)?;
                if let Some(stats) = synced {
                    write!(f, ", synced with {} anchors", stats.anchors_found)?;
                }
                Ok(())
            }
            Outcome::TranslationPending(request) => write!(
                f,
                "translation {} -> {} pending approval ({})",
                request.from_lang, request.to_lang, request.id
            ),
            Outcome::TranslationExecuted(report) => {
                write!(f, "translated {} lines (~${:.4})", report.lines, report.cost_usd)
            }
            Outcome::Failed(failure) => write!(f, "failed ({})", failure),
        }
    }
}

/// Result of a manual sync
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub media_id: String,
    pub title: String,
    pub reference_language: String,
    pub target_language: String,
    pub method: String,
    pub stats: SyncStats,
}

/// A subtitle to be fetched, from the media item or from the provider
#[derive(Debug, Clone)]
enum TrackSource {
    Local(ExistingSubtitle),
    Remote(SubtitleCandidate),
}

impl TrackSource {
    fn describe(&self) -> String {
        match self {
            TrackSource::Local(stream) => format!("stream {} ({})", stream.stream_id, stream.language),
            TrackSource::Remote(candidate) => format!("{} ({})", candidate.name, candidate.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    media_server: Arc<dyn MediaServer>,
    provider: Arc<dyn SubtitleProvider>,
    cache: SearchCache,
    workflow: TranslationWorkflow,
    sync_engine: Option<SyncEngine>,
    repository: Option<Repository>,
    notifier: NotificationDispatcher,
    source_priority: Vec<String>,
    known_languages: Vec<String>,
    call_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        media_server: Arc<dyn MediaServer>,
        provider: Arc<dyn SubtitleProvider>,
        cache: SearchCache,
        workflow: TranslationWorkflow,
        call_timeout: Duration,
    ) -> Self {
        Self {
            media_server,
            provider,
            cache,
            workflow,
            sync_engine: None,
            repository: None,
            notifier: NotificationDispatcher::disabled(),
            source_priority: vec!["en".to_string()],
            known_languages: Vec::new(),
            call_timeout,
        }
    }

    pub fn with_sync_engine(mut self, engine: SyncEngine) -> Self {
        self.sync_engine = Some(engine);
        self
    }

    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_notifier(mut self, notifier: NotificationDispatcher) -> Self {
        self.notifier = notifier;
        self
    }

    /// Source languages for translation and sync references: `priority`
    /// first, then `known` alphabetically
    pub fn with_source_languages(mut self, priority: Vec<String>, known: Vec<String>) -> Self {
        self.source_priority = priority;
        self.known_languages = known;
        self
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    pub fn workflow(&self) -> &TranslationWorkflow {
        &self.workflow
    }

    /// Run the acquisition pipeline. Unknown ids and container items are
    /// errors; everything after metadata resolution is an `Outcome`.
    pub async fn process(&self, media_id: &str, target_lang: &str, options: &AcquisitionOptions) -> Result<Outcome, AppError> {
        info!("[Step 1/7] Resolving media {}", media_id);
        let metadata = self.resolve_media(media_id).await?;
        let title = metadata.display_title();
        self.notifier.notify(NotificationEvent::ProcessingStarted {
            title: title.clone(),
            language: target_lang.to_string(),
        });

        let outcome = match self.run(&metadata, target_lang, options).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed(ProcessFailure::from(&e)),
        };

        self.report(&title, target_lang, &outcome).await;
        Ok(outcome)
    }

    async fn run(&self, metadata: &MediaMetadata, target_lang: &str, options: &AcquisitionOptions) -> Result<Outcome, AppError> {
        info!("[Step 2/7] Inspecting existing subtitles for {}", metadata.display_title());
        let existing = with_timeout(
            self.call_timeout,
            "existing subtitle lookup",
            self.media_server.existing_subtitles(&metadata.id),
        )
        .await?;
        debug!("{} existing subtitle stream(s)", existing.len());

        info!("[Step 3/7] Checking skip rules");
        let skip = decision::evaluate_skip(&existing, target_lang, options);
        if skip.should_skip() {
            info!("Skipping {}: {}", metadata.display_title(), skip);
            return Ok(Outcome::Skipped(skip));
        }

        info!("[Step 4/7] Searching {} subtitles", target_lang);
        let candidates = ranker::rank(self.search(metadata, target_lang).await?);
        let total = candidates.len();
        let surviving: Vec<SubtitleCandidate> = candidates
            .into_iter()
            .filter(|c| language_utils::language_codes_match(&c.language, target_lang))
            .filter(|c| options.min_quality_tier.accepts(c.tier))
            .collect();
        debug!("{} of {} candidate(s) pass the {:?} threshold", surviving.len(), total, options.min_quality_tier);

        let existing_tier = decision::existing_target_tier(&existing, target_lang);

        if let Some(best) = surviving.first() {
            info!("[Step 5/7] Best candidate: {} [{}]", best.name, best.tier);
            if let Err(detail) = decision::check_replacement(existing_tier, best, options) {
                info!("Keeping existing subtitle: {}", detail);
                return Ok(Outcome::Skipped(SkipDecision::skip(SkipReason::HasSubtitle, detail)));
            }
            return self.download_and_upload(metadata, &surviving, &existing, target_lang, options).await;
        }

        if existing_tier.is_some() {
            return Ok(Outcome::Skipped(SkipDecision::skip(
                SkipReason::HasSubtitle,
                "no candidate found to replace the existing subtitle",
            )));
        }

        if options.translation_enabled {
            info!("[Step 6/7] Looking for a translation source");
            if let Some(outcome) = self.try_translation(metadata, &existing, target_lang, options).await? {
                return Ok(outcome);
            }
        }

        info!("[Step 7/7] Nothing usable for {}", metadata.display_title());
        if total > 0 {
            return Ok(Outcome::Skipped(SkipDecision::skip(
                SkipReason::BelowQualityThreshold,
                format!("all {} candidate(s) below the {:?} threshold", total, options.min_quality_tier),
            )));
        }
        Ok(Outcome::Failed(ProcessFailure::new(
            FailureKind::NotFound,
            format!("no {} subtitle found", target_lang),
        )))
    }

    /// Try candidates in rank order until one downloads and parses, then
    /// optionally sync it and upload once
    async fn download_and_upload(
        &self,
        metadata: &MediaMetadata,
        surviving: &[SubtitleCandidate],
        existing: &[ExistingSubtitle],
        target_lang: &str,
        options: &AcquisitionOptions,
    ) -> Result<Outcome, AppError> {
        let mut downloaded = None;
        for candidate in surviving {
            match self.fetch_track(&metadata.id, &TrackSource::Remote(candidate.clone())).await {
                Ok(track) => {
                    downloaded = Some((candidate.clone(), track));
                    break;
                }
                Err(e) => warn!("Candidate {} unusable: {}", candidate.id, e),
            }
        }

        let Some((candidate, mut track)) = downloaded else {
            return Ok(Outcome::Failed(ProcessFailure::new(
                FailureKind::DownloadFailed,
                format!("all {} candidate(s) failed to download", surviving.len()),
            )));
        };

        self.notifier.notify(NotificationEvent::SubtitleFound {
            title: metadata.display_title(),
            name: candidate.name.clone(),
            tier: candidate.tier.to_string(),
        });

        let mut synced = None;
        if options.auto_sync {
            match self.auto_sync(metadata, existing, target_lang, &track).await {
                Ok(Some((adjusted, stats))) => {
                    track = adjusted;
                    synced = Some(stats);
                }
                Ok(None) => debug!("No local reference track, uploading without sync"),
                Err(e) => {
                    warn!("Auto-sync failed for {}, uploading unsynced: {}", metadata.display_title(), e);
                    self.notifier.notify(NotificationEvent::Error {
                        title: metadata.display_title(),
                        message: format!("Sync failed: {}", e),
                    });
                }
            }
        }

        with_timeout(
            self.call_timeout,
            "subtitle upload",
            self.media_server
                .upload_subtitle(&metadata.id, target_lang, &track.to_bytes(), options.replace_existing),
        )
        .await?;

        info!("Uploaded {} subtitle {} for {}", target_lang, candidate.name, metadata.display_title());
        Ok(Outcome::Downloaded { candidate, synced })
    }

    /// Re-time `track` against a text subtitle already on the item
    async fn auto_sync(
        &self,
        metadata: &MediaMetadata,
        existing: &[ExistingSubtitle],
        target_lang: &str,
        track: &SubtitleTrack,
    ) -> Result<Option<(SubtitleTrack, SyncStats)>, AppError> {
        let Some(engine) = &self.sync_engine else {
            return Ok(None);
        };
        let Some(reference_stream) = self
            .source_languages(target_lang)
            .iter()
            .find_map(|lang| local_text_stream(existing, lang))
        else {
            return Ok(None);
        };

        let reference = self.fetch_track(&metadata.id, &TrackSource::Local(reference_stream)).await?;
        let (adjusted, stats) = self.run_sync(engine, &metadata.display_title(), &reference, track).await?;
        Ok(Some((adjusted, stats)))
    }

    /// Step 6. A source already on the item wins over any provider search.
    async fn try_translation(
        &self,
        metadata: &MediaMetadata,
        existing: &[ExistingSubtitle],
        target_lang: &str,
        options: &AcquisitionOptions,
    ) -> Result<Option<Outcome>, AppError> {
        let Some((from_lang, source)) = self.find_translation_source(metadata, existing, target_lang).await else {
            info!("No source subtitle available for translation");
            return Ok(None);
        };
        info!("Translation source: {} ({})", source.describe(), from_lang);

        let request = PendingTranslationRequest::new(
            &metadata.id,
            &metadata.display_title(),
            &from_lang,
            target_lang,
            source,
            options.replace_existing,
        );

        if options.translation_requires_approval {
            let stored = self.workflow.enqueue(request).await;
            return Ok(Some(Outcome::TranslationPending(stored)));
        }

        match self.workflow.execute_now(&request, HistoryStatus::AutoApproved).await {
            Ok(report) => Ok(Some(Outcome::TranslationExecuted(report))),
            Err(e) => Ok(Some(Outcome::Failed(ProcessFailure::from(&e)))),
        }
    }

    /// First local text stream in fallback order, else the best provider
    /// result in fallback order
    pub async fn find_translation_source(
        &self,
        metadata: &MediaMetadata,
        existing: &[ExistingSubtitle],
        target_lang: &str,
    ) -> Option<(String, TranslationSource)> {
        let languages = self.source_languages(target_lang);
        self.translation_source_in(metadata, existing, &languages).await
    }

    async fn translation_source_in(
        &self,
        metadata: &MediaMetadata,
        existing: &[ExistingSubtitle],
        languages: &[String],
    ) -> Option<(String, TranslationSource)> {
        for lang in languages {
            if let Some(stream) = local_text_stream(existing, lang) {
                return Some((lang.clone(), TranslationSource::MediaStream { stream }));
            }
        }

        for lang in languages {
            match self.search(metadata, lang).await {
                Ok(candidates) => {
                    if let Some(candidate) = ranker::rank(candidates).into_iter().next() {
                        return Some((lang.clone(), TranslationSource::Provider { candidate }));
                    }
                }
                Err(e) => warn!("Source search in {} failed: {}", lang, e),
            }
        }
        None
    }

    /// Translate an item on demand, bypassing the approval queue. With
    /// `from_lang` only that source language is considered.
    pub async fn translate_media(
        &self,
        media_id: &str,
        target_lang: &str,
        from_lang: Option<&str>,
        replace_existing: bool,
    ) -> Result<TranslationReport, AppError> {
        let metadata = self.resolve_media(media_id).await?;
        let existing = with_timeout(
            self.call_timeout,
            "existing subtitle lookup",
            self.media_server.existing_subtitles(&metadata.id),
        )
        .await?;

        let languages = match from_lang {
            Some(lang) => vec![lang.to_string()],
            None => self.source_languages(target_lang),
        };
        let (source_lang, source) = self
            .translation_source_in(&metadata, &existing, &languages)
            .await
            .ok_or_else(|| AppError::NotFound(format!("no source subtitle for {}", metadata.display_title())))?;

        let request = PendingTranslationRequest::new(
            &metadata.id,
            &metadata.display_title(),
            &source_lang,
            target_lang,
            source,
            replace_existing,
        );
        self.workflow.execute_now(&request, HistoryStatus::Approved).await
    }

    /// Re-time the target-language subtitle of an item against a
    /// reference-language one, then upload the result
    pub async fn sync_media(&self, media_id: &str, target_lang: &str, source_lang: Option<&str>) -> Result<SyncReport, AppError> {
        let engine = self
            .sync_engine
            .as_ref()
            .ok_or_else(|| AppError::Config("sync is disabled or no anchor finder is configured".to_string()))?;

        let metadata = self.resolve_media(media_id).await?;
        let title = metadata.display_title();
        let existing = with_timeout(
            self.call_timeout,
            "existing subtitle lookup",
            self.media_server.existing_subtitles(&metadata.id),
        )
        .await?;

        let mut reference_langs: Vec<String> = source_lang.map(|l| vec![l.to_string()]).unwrap_or_default();
        for lang in self.source_languages(target_lang) {
            if !reference_langs.iter().any(|l| *l == lang || language_utils::language_codes_match(l, &lang)) {
                reference_langs.push(lang);
            }
        }

        let (reference_lang, reference_source) = self
            .locate_track(&metadata, &existing, &reference_langs)
            .await
            .ok_or_else(|| AppError::NotFound(format!("no reference subtitle for {}", title)))?;
        let (_, target_source) = self
            .locate_track(&metadata, &existing, &[target_lang.to_string()])
            .await
            .ok_or_else(|| AppError::NotFound(format!("no {} subtitle for {}", target_lang, title)))?;

        info!(
            "Syncing {} subtitle {} against {} reference {}",
            target_lang,
            target_source.describe(),
            reference_lang,
            reference_source.describe()
        );
        let reference = self.fetch_track(&metadata.id, &reference_source).await?;
        let target = self.fetch_track(&metadata.id, &target_source).await?;

        let (adjusted, stats) = self.run_sync(engine, &title, &reference, &target).await?;

        with_timeout(
            self.call_timeout,
            "subtitle upload",
            self.media_server.upload_subtitle(&metadata.id, target_lang, &adjusted.to_bytes(), true),
        )
        .await?;

        Ok(SyncReport {
            media_id: metadata.id.clone(),
            title,
            reference_language: reference_lang,
            target_language: target_lang.to_string(),
            method: engine.finder_name(),
            stats,
        })
    }

    async fn run_sync(
        &self,
        engine: &SyncEngine,
        title: &str,
        reference: &SubtitleTrack,
        target: &SubtitleTrack,
    ) -> Result<(SubtitleTrack, SyncStats), SyncError> {
        self.notifier.notify(NotificationEvent::SyncStarted { title: title.to_string() });
        let (adjusted, stats) = engine.sync(reference, target).await?;
        self.bump(StatCounter::Syncs).await;
        self.notifier.notify(NotificationEvent::SyncCompleted {
            title: title.to_string(),
            anchors: stats.anchors_found,
            avg_offset_ms: stats.avg_offset_ms,
        });
        Ok((adjusted, stats))
    }

    /// Local text stream in the first language that has one, else the best
    /// provider result in the first language that has one
    async fn locate_track(
        &self,
        metadata: &MediaMetadata,
        existing: &[ExistingSubtitle],
        languages: &[String],
    ) -> Option<(String, TrackSource)> {
        for lang in languages {
            if let Some(stream) = local_text_stream(existing, lang) {
                return Some((lang.clone(), TrackSource::Local(stream)));
            }
        }
        for lang in languages {
            if let Ok(candidates) = self.search(metadata, lang).await {
                if let Some(best) = ranker::rank(candidates).into_iter().next() {
                    return Some((lang.clone(), TrackSource::Remote(best)));
                }
            }
        }
        None
    }

    /// Fetch metadata and insist on a playable item
    pub async fn resolve_media(&self, media_id: &str) -> Result<MediaMetadata, AppError> {
        let metadata = with_timeout(self.call_timeout, "metadata fetch", self.media_server.fetch_metadata(media_id))
            .await
            .map_err(|e| match e {
                AppError::Provider(ProviderError::NotFound(_)) => AppError::NotFound(format!("media {}", media_id)),
                other => other,
            })?;

        if !metadata.kind.is_leaf() {
            return Err(AppError::WrongMediaType {
                media_id: media_id.to_string(),
                kind: metadata.kind.to_string(),
            });
        }
        Ok(metadata)
    }

    /// Cache-first provider search. Only non-empty results are cached.
    async fn search(&self, metadata: &MediaMetadata, language: &str) -> Result<Vec<SubtitleCandidate>, AppError> {
        let fingerprint = SearchFingerprint::new(metadata, language);
        if let Some(cached) = self.cache.get(&fingerprint) {
            debug!("Search cache hit for {}", fingerprint);
            return Ok(cached);
        }

        let results = with_timeout(self.call_timeout, "subtitle search", self.provider.search(&fingerprint)).await?;
        if !results.is_empty() {
            self.cache.put(&fingerprint, results.clone(), self.cache.default_ttl());
        }
        Ok(results)
    }

    async fn fetch_track(&self, media_id: &str, source: &TrackSource) -> Result<SubtitleTrack, AppError> {
        let bytes = match source {
            TrackSource::Local(stream) => {
                with_timeout(
                    self.call_timeout,
                    "stream download",
                    self.media_server.download_subtitle(media_id, stream),
                )
                .await?
            }
            TrackSource::Remote(candidate) => {
                with_timeout(self.call_timeout, "subtitle download", self.provider.download(candidate)).await?
            }
        };
        Ok(SubtitleTrack::from_bytes(&bytes)?)
    }

    fn source_languages(&self, target_lang: &str) -> Vec<String> {
        decision::source_fallback_order(&self.source_priority, &self.known_languages, target_lang)
    }

    async fn report(&self, title: &str, target_lang: &str, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped(_) => self.bump(StatCounter::Skipped).await,
            Outcome::Downloaded { candidate, synced } => {
                self.bump(StatCounter::Downloads).await;
                self.notifier.notify(NotificationEvent::Downloaded {
                    title: title.to_string(),
                    name: candidate.name.clone(),
                    language: target_lang.to_string(),
                    synced: synced.is_some(),
                });
            }
            Outcome::Failed(failure) if failure.kind == FailureKind::NotFound => {
                self.bump(StatCounter::Failures).await;
                self.notifier.notify(NotificationEvent::NotFound {
                    title: title.to_string(),
                    language: target_lang.to_string(),
                });
            }
            Outcome::Failed(failure) => {
                error!("Processing {} failed: {}", title, failure);
                self.bump(StatCounter::Failures).await;
                self.notifier.notify(NotificationEvent::Error {
                    title: title.to_string(),
                    message: failure.to_string(),
                });
            }
            Outcome::TranslationPending(_) | Outcome::TranslationExecuted(_) => {}
        }
    }

    async fn bump(&self, counter: StatCounter) {
        if let Some(repo) = &self.repository {
            if let Err(e) = repo.increment_stat(counter, 1).await {
                warn!("Failed to update {} counter: {}", counter.as_str(), e);
            }
        }
    }
}

fn local_text_stream(existing: &[ExistingSubtitle], language: &str) -> Option<ExistingSubtitle> {
    existing
        .iter()
        .find(|s| s.is_language(language) && s.is_text_based())
        .cloned()
}
