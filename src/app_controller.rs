use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::acquisition::{InFlightRegistry, Orchestrator, Outcome, SearchCache, SyncReport};
use crate::app_config::Config;
use crate::database::{DatabaseConnection, HistoryRecord, Repository, ServiceStats};
use crate::errors::{AppError, SyncError};
use crate::events::{self, EventSource, InboundEvent};
use crate::notifications::NotificationDispatcher;
use crate::providers::openai::OpenAiClient;
use crate::providers::plex::PlexClient;
use crate::providers::retry::RetryPolicy;
use crate::providers::subsource::SubSourceClient;
use crate::providers::telegram::TelegramNotifier;
use crate::providers::{AnchorFinder, MediaServer, Notifier, SubtitleProvider, Translator};
use crate::subtitle_processor::SubtitleTrack;
use crate::sync::{SimilarityAnchorFinder, SyncEngine, SyncEstimate, SyncSettings, SyncStats};
use crate::translation::{BatchPolicy, BatchTranslator, PendingTranslationRequest, TranslationEstimate, TranslationReport, TranslationWorkflow};

// @module: Application controller wiring configuration to the pipeline

/// External collaborators the controller runs against
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub media_server: Arc<dyn MediaServer>,
    pub provider: Arc<dyn SubtitleProvider>,
    pub translator: Arc<dyn Translator>,
    /// `None` disables sync
    pub anchor_finder: Option<Arc<dyn AnchorFinder>>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl Collaborators {
    /// Real network clients for the configured services
    pub fn from_config(config: &Config) -> Self {
        let ai = Arc::new(OpenAiClient::new(&config.ai));
        let anchor_finder: Option<Arc<dyn AnchorFinder>> = if !config.sync.enabled {
            None
        } else if config.ai.is_configured() {
            Some(ai.clone() as Arc<dyn AnchorFinder>)
        } else {
            info!("No AI key configured, sync uses local text similarity");
            Some(Arc::new(SimilarityAnchorFinder::new(config.sync.similarity_threshold)) as Arc<dyn AnchorFinder>)
        };
        let notifier: Option<Arc<dyn Notifier>> = config
            .notifications
            .enabled
            .then(|| Arc::new(TelegramNotifier::new(&config.notifications)) as Arc<dyn Notifier>);

        Self {
            media_server: Arc::new(PlexClient::new(&config.media_server, RetryPolicy::default())),
            provider: Arc::new(SubSourceClient::new(&config.subtitle_provider)),
            translator: ai,
            anchor_finder,
            notifier,
        }
    }
}

/// Main application controller
#[derive(Debug, Clone)]
pub struct Controller {
    // @field: App configuration
    config: Config,
    orchestrator: Orchestrator,
    repository: Repository,
    in_flight: InFlightRegistry,
    sync_engine: Option<SyncEngine>,
}

impl Controller {
    /// Controller with network collaborators and the on-disk database
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = match config.database_path() {
            Some(path) => DatabaseConnection::new(&path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?,
            None => DatabaseConnection::new_default()?,
        };
        let collaborators = Collaborators::from_config(&config);
        Self::with_collaborators(config, collaborators, Repository::new(db)).await
    }

    // @method: Wire the pipeline from explicit collaborators
    pub async fn with_collaborators(config: Config, collaborators: Collaborators, repository: Repository) -> Result<Self> {
        let call_timeout = Duration::from_secs(config.acquisition.call_timeout_secs);
        let notifier = match collaborators.notifier {
            Some(notifier) => NotificationDispatcher::new(notifier),
            None => NotificationDispatcher::disabled(),
        };

        let translator = BatchTranslator::new(collaborators.translator, BatchPolicy::from(&config.translation));
        let workflow = TranslationWorkflow::new(
            collaborators.media_server.clone(),
            collaborators.provider.clone(),
            translator,
            config.translation.batch_size,
            call_timeout,
        )
        .with_repository(repository.clone())
        .with_notifier(notifier.clone());

        let restored = workflow.restore_from_repository().await?;
        if restored > 0 {
            info!("Restored {} pending translation request(s)", restored);
        }

        let cache = SearchCache::new(Duration::from_secs(config.cache.ttl_seconds), config.cache.enabled);
        let sync_engine = collaborators
            .anchor_finder
            .map(|finder| SyncEngine::new(finder, SyncSettings::from(&config.sync)));

        let mut orchestrator = Orchestrator::new(
            collaborators.media_server,
            collaborators.provider,
            cache,
            workflow,
            call_timeout,
        )
        .with_repository(repository.clone())
        .with_notifier(notifier)
        .with_source_languages(
            config.acquisition.source_language_priority.clone(),
            config.acquisition.known_source_languages.clone(),
        );
        if let Some(engine) = &sync_engine {
            orchestrator = orchestrator.with_sync_engine(engine.clone());
        }

        Ok(Self {
            in_flight: InFlightRegistry::new(Duration::from_secs(config.dedup.cooldown_secs)),
            config,
            orchestrator,
            repository,
            sync_engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn target_language<'a>(&'a self, language: Option<&'a str>) -> &'a str {
        language.unwrap_or(&self.config.acquisition.default_language)
    }

    /// Verify, parse and dispatch one webhook body
    pub fn handle_webhook(
        &self,
        source: EventSource,
        body: &[u8],
        content_type: &str,
        secret: Option<&str>,
    ) -> Result<Option<JoinHandle<Result<Outcome, AppError>>>, AppError> {
        events::verify_secret(&self.config.webhook_secret, secret)?;
        let event = events::parse(source, body, content_type)?;
        Ok(self.handle_event(event))
    }

    /// Spawn a pipeline task for an accepted event. Returns `None` when the
    /// event is gated off or a task for the same media is already running.
    pub fn handle_event(&self, event: InboundEvent) -> Option<JoinHandle<Result<Outcome, AppError>>> {
        if !event.should_process(&self.config.acquisition) {
            debug!("Ignoring {} event for {} (disabled in config)", event.kind, event.media_id);
            return None;
        }
        let guard = self.in_flight.try_acquire(&event.media_id)?;

        info!("Accepted {} event from {} for media {}", event.kind, event.source, event.media_id);
        let orchestrator = self.orchestrator.clone();
        let target_lang = self.config.acquisition.default_language.clone();
        let options = self.config.acquisition_options();

        Some(tokio::spawn(async move {
            let _guard = guard;
            let result = orchestrator.process(&event.media_id, &target_lang, &options).await;
            match &result {
                Ok(outcome) => info!("Media {}: {}", event.media_id, outcome),
                Err(e) => error!("Media {}: {}", event.media_id, e),
            }
            result
        }))
    }

    /// Run the acquisition pipeline in the foreground
    pub async fn process(&self, media_id: &str, language: Option<&str>) -> Result<Outcome, AppError> {
        let options = self.config.acquisition_options();
        self.orchestrator
            .process(media_id, self.target_language(language), &options)
            .await
    }

    pub async fn sync_media(&self, media_id: &str, source_language: Option<&str>) -> Result<SyncReport, AppError> {
        self.orchestrator
            .sync_media(media_id, &self.config.acquisition.default_language, source_language)
            .await
    }

    fn engine(&self) -> Result<&SyncEngine, AppError> {
        self.sync_engine
            .as_ref()
            .ok_or_else(|| AppError::Config("sync is disabled".to_string()))
    }

    /// Re-time a local SRT file against another and write the result
    pub async fn sync_files(&self, reference: &Path, target: &Path, output: &Path) -> Result<SyncStats, AppError> {
        let engine = self.engine()?;
        let reference = read_track(reference).await?;
        let target = read_track(target).await?;

        let (adjusted, stats) = engine.sync(&reference, &target).await?;
        tokio::fs::write(output, adjusted.to_bytes()).await?;
        info!("Wrote synced subtitle to {}", output.display());
        Ok(stats)
    }

    pub async fn estimate_sync(&self, reference: &Path, target: &Path) -> Result<SyncEstimate, AppError> {
        let engine = self.engine()?;
        let reference = read_track(reference).await?;
        let target = read_track(target).await?;
        Ok(engine.estimate(&reference, &target))
    }

    pub fn queue(&self) -> Vec<PendingTranslationRequest> {
        self.orchestrator.workflow().list()
    }

    pub async fn estimate(&self, media_id: &str) -> Result<TranslationEstimate, AppError> {
        self.orchestrator.workflow().estimate(media_id).await
    }

    pub async fn approve(&self, media_id: &str) -> Result<TranslationReport, AppError> {
        self.orchestrator.workflow().approve(media_id).await
    }

    pub async fn reject(&self, media_id: &str) -> Result<PendingTranslationRequest, AppError> {
        self.orchestrator.workflow().reject(media_id).await
    }

    /// Translate immediately into the default language
    pub async fn translate(&self, media_id: &str, from_lang: Option<&str>) -> Result<TranslationReport, AppError> {
        self.orchestrator
            .translate_media(
                media_id,
                &self.config.acquisition.default_language,
                from_lang,
                self.config.acquisition.replace_existing,
            )
            .await
    }

    pub async fn stats(&self) -> Result<ServiceStats> {
        self.repository.get_stats().await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        self.repository.history(limit).await
    }
}

async fn read_track(path: &Path) -> Result<SubtitleTrack, AppError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::File(format!("{}: {}", path.display(), e)))?;
    SubtitleTrack::from_bytes(&bytes).map_err(|e| {
        warn!("Could not parse {}: {}", path.display(), e);
        AppError::Sync(SyncError::Subtitle(e))
    })
}
