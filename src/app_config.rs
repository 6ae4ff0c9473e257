use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::PathBuf;
use url::Url;

use crate::acquisition::{AcquisitionOptions, QualityThreshold};
use crate::language_utils;

/// Application configuration module
/// This module handles loading, validating and saving the service settings.
/// Every field has a default so partial files load.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Media server connection
    #[serde(default)]
    pub media_server: MediaServerConfig,

    /// Subtitle search/download provider
    #[serde(default)]
    pub subtitle_provider: SubtitleProviderConfig,

    /// OpenAI-compatible endpoint used for anchors and translation
    #[serde(default)]
    pub ai: AiConfig,

    /// Notification channel
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Skip/replace/translate policy
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Timing alignment tuning
    #[serde(default)]
    pub sync: SyncConfig,

    /// Batch translation tuning
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Search cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-media event deduplication
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Shared secret expected in the X-Webhook-Secret header (empty disables the check)
    #[serde(default)]
    pub webhook_secret: String,

    /// SQLite file for stats, history and the pending queue. Empty uses the
    /// platform data directory.
    #[serde(default)]
    pub database_path: String,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MediaServerConfig {
    // @field: Base URL, e.g. http://localhost:32400
    #[serde(default = "default_media_server_url")]
    pub url: String,

    // @field: X-Plex-Token
    #[serde(default)]
    pub token: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubtitleProviderConfig {
    // @field: API base URL
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    // @field: API key
    #[serde(default)]
    pub api_key: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Retries for transient failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    // @field: Base backoff, doubled each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AiConfig {
    // @field: Chat completions base URL
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,

    // @field: API key
    #[serde(default)]
    pub api_key: String,

    // @field: Model name
    #[serde(default = "default_ai_model")]
    pub model: String,

    // @field: Sampling temperature for translation
    #[serde(default = "default_translation_temperature")]
    pub temperature: f32,

    // @field: Timeout seconds
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Retries for transient failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    // @field: Base backoff, doubled each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl AiConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub telegram_bot_token: String,

    #[serde(default)]
    pub telegram_chat_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AcquisitionConfig {
    /// Target language (ISO 639-1)
    #[serde(default = "default_language")]
    pub default_language: String,

    #[serde(default = "default_true")]
    pub skip_if_has_subtitle: bool,

    #[serde(default = "default_true")]
    pub skip_forced: bool,

    #[serde(default)]
    pub skip_embedded: bool,

    #[serde(default)]
    pub min_quality_tier: QualityThreshold,

    #[serde(default)]
    pub replace_existing: bool,

    #[serde(default = "default_true")]
    pub replace_only_if_better: bool,

    #[serde(default)]
    pub translation_enabled: bool,

    #[serde(default = "default_true")]
    pub translation_requires_approval: bool,

    /// Process library.new events
    #[serde(default = "default_true")]
    pub auto_download_on_add: bool,

    /// Process media.play events
    #[serde(default)]
    pub auto_download_on_play: bool,

    /// Source languages tried first, in order
    #[serde(default = "default_source_priority")]
    pub source_language_priority: Vec<String>,

    /// Remaining source languages, tried alphabetically after the priority list
    #[serde(default = "default_known_languages")]
    pub known_source_languages: Vec<String>,

    /// Per external call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub auto_sync_after_download: bool,

    #[serde(default = "default_anchor_groups")]
    pub anchor_groups: usize,

    #[serde(default = "default_entries_per_group")]
    pub entries_per_group: usize,

    #[serde(default = "default_search_window")]
    pub search_window: usize,

    /// Anchors further than `outlier_factor * MAD` from the median are dropped
    #[serde(default = "default_outlier_factor")]
    pub outlier_factor: f64,

    /// Lower bound of the outlier threshold in ms
    #[serde(default = "default_outlier_floor_ms")]
    pub outlier_floor_ms: i64,

    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,

    /// Similarity needed by the local anchor finder
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DedupConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Log level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(anyhow!("Invalid log level: {}", s)),
        }
    }
}

/// Smallest accepted cache TTL
pub const MIN_CACHE_TTL_SECS: u64 = 60;

fn default_true() -> bool {
    true
}

fn default_media_server_url() -> String {
    "http://localhost:32400".to_string()
}

fn default_provider_url() -> String {
    "https://api.subsource.net/api".to_string()
}

fn default_ai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_translation_temperature() -> f32 {
    0.3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_ai_timeout_secs() -> u64 {
    120
}

fn default_call_timeout_secs() -> u64 {
    180
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_language() -> String {
    "vi".to_string()
}

fn default_source_priority() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_known_languages() -> Vec<String> {
    ["ko", "ja", "zh", "fr", "es", "de", "pt", "ru", "it", "ar"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_anchor_groups() -> usize {
    6
}

fn default_entries_per_group() -> usize {
    4
}

fn default_search_window() -> usize {
    40
}

fn default_outlier_factor() -> f64 {
    3.0
}

fn default_outlier_floor_ms() -> i64 {
    200
}

fn default_min_duration_ms() -> u64 {
    100
}

fn default_similarity_threshold() -> f64 {
    0.8
}

fn default_batch_size() -> usize {
    10
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cooldown_secs() -> u64 {
    30
}

impl Default for MediaServerConfig {
    fn default() -> Self {
        Self {
            url: default_media_server_url(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SubtitleProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ai_endpoint(),
            api_key: String::new(),
            model: default_ai_model(),
            temperature: default_translation_temperature(),
            timeout_secs: default_ai_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            skip_if_has_subtitle: true,
            skip_forced: true,
            skip_embedded: false,
            min_quality_tier: QualityThreshold::default(),
            replace_existing: false,
            replace_only_if_better: true,
            translation_enabled: false,
            translation_requires_approval: true,
            auto_download_on_add: true,
            auto_download_on_play: false,
            source_language_priority: default_source_priority(),
            known_source_languages: default_known_languages(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_sync_after_download: true,
            anchor_groups: default_anchor_groups(),
            entries_per_group: default_entries_per_group(),
            search_window: default_search_window(),
            outlier_factor: default_outlier_factor(),
            outlier_floor_ms: default_outlier_floor_ms(),
            min_duration_ms: default_min_duration_ms(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl_secs(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            media_server: MediaServerConfig::default(),
            subtitle_provider: SubtitleProviderConfig::default(),
            ai: AiConfig::default(),
            notifications: NotificationConfig::default(),
            acquisition: AcquisitionConfig::default(),
            sync: SyncConfig::default(),
            translation: TranslationConfig::default(),
            cache: CacheConfig::default(),
            dedup: DedupConfig::default(),
            webhook_secret: String::new(),
            database_path: String::new(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let acquisition = &self.acquisition;
        if !language_utils::is_valid_language_code(&acquisition.default_language) {
            return Err(anyhow!("Invalid default language: {}", acquisition.default_language));
        }
        for code in acquisition
            .source_language_priority
            .iter()
            .chain(acquisition.known_source_languages.iter())
        {
            if !language_utils::is_valid_language_code(code) {
                return Err(anyhow!("Invalid source language: {}", code));
            }
        }

        for (name, value) in [
            ("media_server.url", &self.media_server.url),
            ("subtitle_provider.base_url", &self.subtitle_provider.base_url),
            ("ai.endpoint", &self.ai.endpoint),
        ] {
            Url::parse(value).map_err(|e| anyhow!("Invalid {} '{}': {}", name, value, e))?;
        }

        if self.cache.ttl_seconds < MIN_CACHE_TTL_SECS {
            return Err(anyhow!(
                "Cache TTL must be at least {} seconds, got {}",
                MIN_CACHE_TTL_SECS,
                self.cache.ttl_seconds
            ));
        }
        if self.translation.batch_size == 0 {
            return Err(anyhow!("Translation batch size must be greater than zero"));
        }
        if self.sync.anchor_groups == 0 || self.sync.entries_per_group == 0 || self.sync.search_window == 0 {
            return Err(anyhow!("Sync sampling sizes must be greater than zero"));
        }
        if self.sync.outlier_factor <= 0.0 {
            return Err(anyhow!("Sync outlier factor must be positive"));
        }
        if acquisition.translation_enabled && !self.ai.is_configured() {
            return Err(anyhow!("Translation is enabled but no AI API key is configured"));
        }
        if self.notifications.enabled
            && (self.notifications.telegram_bot_token.is_empty() || self.notifications.telegram_chat_id.is_empty())
        {
            return Err(anyhow!("Notifications are enabled but the Telegram bot token or chat id is missing"));
        }

        Ok(())
    }

    /// Options bundle for one acquisition run
    pub fn acquisition_options(&self) -> AcquisitionOptions {
        let acquisition = &self.acquisition;
        AcquisitionOptions {
            skip_if_has_subtitle: acquisition.skip_if_has_subtitle,
            skip_forced: acquisition.skip_forced,
            skip_embedded: acquisition.skip_embedded,
            min_quality_tier: acquisition.min_quality_tier,
            replace_existing: acquisition.replace_existing,
            replace_only_if_better: acquisition.replace_only_if_better,
            translation_enabled: acquisition.translation_enabled,
            translation_requires_approval: acquisition.translation_requires_approval,
            auto_sync: self.sync.enabled && acquisition_sync_possible(self),
        }
    }

    /// Resolved SQLite location
    pub fn database_path(&self) -> Option<PathBuf> {
        if self.database_path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.database_path))
        }
    }
}

fn acquisition_sync_possible(config: &Config) -> bool {
    config.sync.auto_sync_after_download && config.ai.is_configured()
}
