/*!
 * Common test utilities for the subpilot test suite
 */

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use subpilot::acquisition::{MediaMetadata, QualityTier, SubtitleCandidate};
use subpilot::app_config::Config;
use subpilot::app_controller::{Collaborators, Controller};
use subpilot::database::Repository;
use subpilot::providers::mock::{MockAnchorFinder, MockBehavior, MockMediaServer, MockNotifier, MockSubtitleProvider, MockTranslator};
use subpilot::providers::{AnchorFinder, Notifier};

/// Three-entry English track
pub const ENGLISH_SRT: &str = "1
00:00:01,000 --> 00:00:04,000
This is a test subtitle.

2
00:00:05,000 --> 00:00:09,000
It contains multiple entries.

3
00:00:10,000 --> 00:00:14,000
For testing purposes.
";

/// Route `log` output through the test harness; safe to call repeatedly
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::Debug).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// SRT with `count` entries three seconds apart, shifted by `offset_ms`
pub fn numbered_srt(count: usize, offset_ms: u64) -> String {
    let mut out = String::new();
    for i in 0..count {
        let start = i as u64 * 3000 + 1000 + offset_ms;
        let end = start + 2000;
        out.push_str(&format!(
            "{}\n{} --> {}\nLine number {}\n\n",
            i + 1,
            subpilot::SubtitleEntry::format_timestamp(start),
            subpilot::SubtitleEntry::format_timestamp(end),
            i
        ));
    }
    out
}

pub fn movie() -> MediaMetadata {
    MediaMetadata::movie("100", "The Matrix", Some(1999)).with_imdb("tt0133093")
}

pub fn candidate(id: &str, language: &str, tier: QualityTier, popularity: f64) -> SubtitleCandidate {
    SubtitleCandidate::new(id, &format!("{}.srt", id), language, tier, popularity)
}

/// Default config with fast retries and translation switched on
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.acquisition.default_language = "vi".to_string();
    config.acquisition.translation_enabled = true;
    config.ai.api_key = "sk-test".to_string();
    config.translation.retry_backoff_ms = 1;
    config.sync.auto_sync_after_download = false;
    config.dedup.cooldown_secs = 60;
    config
}

/// Controller over mocks and an in-memory database
pub async fn mock_controller(
    config: Config,
    media: MockMediaServer,
    provider: MockSubtitleProvider,
    translator: MockTranslator,
    notifier: Option<MockNotifier>,
) -> Result<Controller> {
    init_test_logging();
    let collaborators = Collaborators {
        media_server: Arc::new(media),
        provider: Arc::new(provider),
        translator: Arc::new(translator),
        anchor_finder: Some(Arc::new(MockAnchorFinder::new(MockBehavior::Working)) as Arc<dyn AnchorFinder>),
        notifier: notifier.map(|n| Arc::new(n) as Arc<dyn Notifier>),
    };
    Controller::with_collaborators(config, collaborators, Repository::new_in_memory()?).await
}
