/*!
 * Mock collaborator implementations for testing.
 *
 * Each mock is configured up front and counts its calls, so tests can assert
 * both outcomes and the traffic that produced them:
 * - `MockMediaServer`: in-memory library with recorded uploads
 * - `MockSubtitleProvider`: canned search results per language
 * - `MockAnchorFinder` / `MockTranslator`: AI stand-ins driven by `MockBehavior`
 * - `MockNotifier`: collects delivered events
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::acquisition::{ExistingSubtitle, MediaMetadata, SearchFingerprint, SubtitleCandidate};
use crate::errors::ProviderError;
use crate::notifications::NotificationEvent;
use crate::providers::{AnchorFinder, MediaServer, Notifier, SubtitleProvider, Translator};
use crate::sync::{AnchorLine, AnchorMatch};

/// Behavior mode for the AI and notifier mocks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails every Nth call (1-based)
    Intermittent { fail_every: usize },
    /// Always fails with a server error
    Failing,
    /// Succeeds but returns fewer lines than requested
    Misaligned,
    /// Sleeps before answering
    Slow { delay_ms: u64 },
}

impl MockBehavior {
    /// Apply the behavior for call number `count` (0-based)
    async fn gate(&self, count: usize) -> Result<(), ProviderError> {
        match *self {
            MockBehavior::Failing => Err(server_error("Simulated failure")),
            MockBehavior::Intermittent { fail_every } if fail_every > 0 && count % fail_every == fail_every - 1 => {
                Err(server_error("Simulated intermittent failure"))
            }
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn server_error(message: &str) -> ProviderError {
    ProviderError::ApiError {
        status_code: 500,
        message: message.to_string(),
    }
}

/// One recorded upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub media_id: String,
    pub language: String,
    pub content: Vec<u8>,
    pub replace_existing: bool,
}

/// In-memory media library
#[derive(Debug, Clone)]
pub struct MockMediaServer {
    items: HashMap<String, MediaMetadata>,
    subtitles: HashMap<String, Vec<ExistingSubtitle>>,
    stream_content: HashMap<String, Vec<u8>>,
    fail_uploads: bool,
    uploads: Arc<Mutex<Vec<UploadRecord>>>,
    metadata_calls: Arc<AtomicUsize>,
}

impl MockMediaServer {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            subtitles: HashMap::new(),
            stream_content: HashMap::new(),
            fail_uploads: false,
            uploads: Arc::new(Mutex::new(Vec::new())),
            metadata_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_item(mut self, metadata: MediaMetadata) -> Self {
        self.items.insert(metadata.id.clone(), metadata);
        self
    }

    pub fn with_subtitles(mut self, media_id: &str, subtitles: Vec<ExistingSubtitle>) -> Self {
        self.subtitles.insert(media_id.to_string(), subtitles);
        self
    }

    /// Content served for a stream id
    pub fn with_stream_content(mut self, stream_id: &str, srt: &str) -> Self {
        self.stream_content.insert(stream_id.to_string(), srt.as_bytes().to_vec());
        self
    }

    pub fn with_failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.uploads.lock().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockMediaServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaServer for MockMediaServer {
    async fn fetch_metadata(&self, media_id: &str) -> Result<MediaMetadata, ProviderError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.items
            .get(media_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("media {}", media_id)))
    }

    async fn existing_subtitles(&self, media_id: &str) -> Result<Vec<ExistingSubtitle>, ProviderError> {
        Ok(self.subtitles.get(media_id).cloned().unwrap_or_default())
    }

    async fn download_subtitle(&self, _media_id: &str, stream: &ExistingSubtitle) -> Result<Vec<u8>, ProviderError> {
        self.stream_content
            .get(&stream.stream_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("stream {}", stream.stream_id)))
    }

    async fn upload_subtitle(
        &self,
        media_id: &str,
        language: &str,
        content: &[u8],
        replace_existing: bool,
    ) -> Result<(), ProviderError> {
        if self.fail_uploads {
            return Err(server_error("Simulated upload failure"));
        }
        self.uploads.lock().push(UploadRecord {
            media_id: media_id.to_string(),
            language: language.to_string(),
            content: content.to_vec(),
            replace_existing,
        });
        Ok(())
    }
}

/// Canned subtitle search service
#[derive(Debug, Clone)]
pub struct MockSubtitleProvider {
    results: HashMap<String, Vec<SubtitleCandidate>>,
    contents: HashMap<String, Vec<u8>>,
    failing_downloads: HashSet<String>,
    failing_search: bool,
    searched: Arc<Mutex<Vec<String>>>,
    download_calls: Arc<AtomicUsize>,
}

impl MockSubtitleProvider {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            contents: HashMap::new(),
            failing_downloads: HashSet::new(),
            failing_search: false,
            searched: Arc::new(Mutex::new(Vec::new())),
            download_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make `candidate` a search result for its language, serving `srt` on download
    pub fn with_candidate(mut self, candidate: SubtitleCandidate, srt: &str) -> Self {
        self.contents.insert(candidate.id.clone(), srt.as_bytes().to_vec());
        self.results.entry(candidate.language.clone()).or_default().push(candidate);
        self
    }

    pub fn with_failing_download(mut self, candidate_id: &str) -> Self {
        self.failing_downloads.insert(candidate_id.to_string());
        self
    }

    pub fn with_failing_search(mut self) -> Self {
        self.failing_search = true;
        self
    }

    pub fn search_count(&self) -> usize {
        self.searched.lock().len()
    }

    /// Languages searched, in call order
    pub fn searched_languages(&self) -> Vec<String> {
        self.searched.lock().clone()
    }

    pub fn download_count(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSubtitleProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubtitleProvider for MockSubtitleProvider {
    async fn search(&self, fingerprint: &SearchFingerprint) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        self.searched.lock().push(fingerprint.language.clone());
        if self.failing_search {
            return Err(ProviderError::ConnectionError("Simulated search outage".to_string()));
        }
        Ok(self.results.get(&fingerprint.language).cloned().unwrap_or_default())
    }

    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>, ProviderError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_downloads.contains(&candidate.id) {
            return Err(server_error("Simulated download failure"));
        }
        self.contents
            .get(&candidate.id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("candidate {}", candidate.id)))
    }
}

/// Anchor finder that pairs lines with identical text
#[derive(Debug, Clone)]
pub struct MockAnchorFinder {
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockAnchorFinder {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnchorFinder for MockAnchorFinder {
    async fn find_anchors(&self, reference: &[AnchorLine], target: &[AnchorLine]) -> Result<Vec<AnchorMatch>, ProviderError> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst);
        self.behavior.gate(count).await?;

        let mut matches: Vec<AnchorMatch> = target
            .iter()
            .filter_map(|t| {
                reference.iter().find(|r| r.text == t.text).map(|r| AnchorMatch {
                    reference_index: r.index,
                    target_index: t.index,
                    confidence: 1.0,
                })
            })
            .collect();

        if self.behavior == MockBehavior::Misaligned {
            matches.truncate(1);
        }
        Ok(matches)
    }

    fn name(&self) -> String {
        "mock-anchors".to_string()
    }
}

/// Translator that prefixes each line with the target language
#[derive(Debug, Clone)]
pub struct MockTranslator {
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockTranslator {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate_batch(&self, lines: &[String], _from_lang: &str, to_lang: &str) -> Result<Vec<String>, ProviderError> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst);
        self.behavior.gate(count).await?;

        let mut out: Vec<String> = lines.iter().map(|l| format!("[{}] {}", to_lang, l)).collect();
        if self.behavior == MockBehavior::Misaligned {
            out.pop();
        }
        Ok(out)
    }

    fn model(&self) -> String {
        "gpt-4o-mini".to_string()
    }
}

/// Notifier that keeps what it was sent
#[derive(Debug, Clone)]
pub struct MockNotifier {
    behavior: MockBehavior,
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl MockNotifier {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }

    /// Event kinds received so far
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind()).collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), ProviderError> {
        let count = self.events.lock().len();
        self.behavior.gate(count).await?;
        self.events.lock().push(event.clone());
        Ok(())
    }
}
