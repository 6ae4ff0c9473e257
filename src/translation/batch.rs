/*!
 * Batch translation of subtitle tracks.
 *
 * Entries are grouped into fixed-size batches. Each batch travels as one
 * marker-tagged text (`<<ENTRY_n>>` ... `<<END>>`) so every output line maps
 * back to its input line even when the model reorders or merges text. A batch
 * is retried with exponential backoff; if it still fails the whole track
 * fails, so a half-translated track is never produced.
 */

use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::TranslationConfig;
use crate::errors::{ProviderError, TranslationError};
use crate::providers::Translator;
use crate::subtitle_processor::{SubtitleEntry, SubtitleTrack};

static MARKER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<ENTRY_(\d+)>>").unwrap());

const END_MARKER: &str = "<<END>>";

/// Batches translated at the same time
const BATCH_CONCURRENCY: usize = 2;

/// Join lines into one marker-tagged text
pub fn encode_batch(lines: &[String]) -> String {
    let mut combined = String::new();
    for (idx, line) in lines.iter().enumerate() {
        combined.push_str(&format!("<<ENTRY_{}>>\n{}\n", idx, line));
    }
    combined.push_str(END_MARKER);
    combined
}

/// Split a marker-tagged response back into `expected` lines.
///
/// Markers may appear in any order; the text after each marker runs to the
/// next marker or `<<END>>`. Every index in `0..expected` must be present.
pub fn decode_batch(response: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let body = match response.find(END_MARKER) {
        Some(pos) => &response[..pos],
        None => response,
    };

    let markers: Vec<(usize, usize, usize)> = MARKER_REGEX
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let idx = caps.get(1)?.as_str().parse().ok()?;
            Some((idx, whole.start(), whole.end()))
        })
        .collect();

    let mut found: BTreeMap<usize, String> = BTreeMap::new();
    for (i, (idx, _, text_start)) in markers.iter().enumerate() {
        let text_end = markers.get(i + 1).map_or(body.len(), |(_, start, _)| *start);
        let text = body[*text_start..text_end].trim().to_string();
        if *idx < expected {
            found.entry(*idx).or_insert(text);
        }
    }

    if found.len() != expected {
        let missing: Vec<String> = (0..expected)
            .filter(|i| !found.contains_key(i))
            .map(|i| i.to_string())
            .collect();
        return Err(ProviderError::ParseError(format!(
            "Response is missing entries [{}] of {}",
            missing.join(", "),
            expected
        )));
    }

    Ok(found.into_values().collect())
}

/// Retry policy for one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchPolicy {
    pub batch_size: usize,
    pub retry_count: u32,
    pub backoff_base_ms: u64,
}

impl From<&TranslationConfig> for BatchPolicy {
    fn from(config: &TranslationConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            retry_count: config.retry_count,
            backoff_base_ms: config.retry_backoff_ms,
        }
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self::from(&TranslationConfig::default())
    }
}

/// Translates whole tracks batch by batch, preserving timing
#[derive(Debug, Clone)]
pub struct BatchTranslator {
    translator: Arc<dyn Translator>,
    policy: BatchPolicy,
}

impl BatchTranslator {
    pub fn new(translator: Arc<dyn Translator>, policy: BatchPolicy) -> Self {
        Self { translator, policy }
    }

    pub fn model(&self) -> String {
        self.translator.model()
    }

    pub fn batch_count(&self, entries: usize) -> usize {
        entries.div_ceil(self.policy.batch_size.max(1))
    }

    /// Translate every entry of `track`. Timestamps and numbering are kept;
    /// only the text changes. The first batch that exhausts its retries
    /// aborts the track and no further batches are sent.
    pub async fn translate_track(&self, track: &SubtitleTrack, from_lang: &str, to_lang: &str) -> Result<SubtitleTrack, TranslationError> {
        let batches: Vec<Vec<String>> = track
            .entries
            .chunks(self.policy.batch_size.max(1))
            .map(|chunk| chunk.iter().map(|e| e.text.clone()).collect())
            .collect();
        let total = batches.len();
        info!("Translating {} entries in {} batch(es) ({} -> {})", track.len(), total, from_lang, to_lang);

        // ordered, so the earliest failing batch is the one reported
        let translated: Vec<Vec<String>> = stream::iter(batches.into_iter().enumerate())
            .map(|(batch_index, lines)| async move {
                debug!("Translating batch {}/{} ({} entries)", batch_index + 1, total, lines.len());
                self.translate_with_retry(batch_index, &lines, from_lang, to_lang).await
            })
            .buffered(BATCH_CONCURRENCY)
            .try_collect()
            .await?;

        let entries = track
            .entries
            .iter()
            .zip(translated.into_iter().flatten())
            .map(|(entry, text)| SubtitleEntry::new(entry.seq_num, entry.start_time_ms, entry.end_time_ms, text))
            .collect();

        Ok(SubtitleTrack::new(entries))
    }

    async fn translate_with_retry(
        &self,
        batch_index: usize,
        lines: &[String],
        from_lang: &str,
        to_lang: &str,
    ) -> Result<Vec<String>, TranslationError> {
        let max_retries = self.policy.retry_count;
        let mut attempt = 0;
        let mut last_error = String::new();

        while attempt <= max_retries {
            if attempt > 0 {
                let backoff_ms = self.policy.backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(16));
                warn!(
                    "Retrying batch {} (attempt {}/{}) after {}ms",
                    batch_index + 1,
                    attempt + 1,
                    max_retries + 1,
                    backoff_ms
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }

            match self.translator.translate_batch(lines, from_lang, to_lang).await {
                Ok(translated) if translated.len() == lines.len() => return Ok(translated),
                Ok(translated) => {
                    last_error = format!("expected {} lines, got {}", lines.len(), translated.len());
                }
                Err(ProviderError::AuthenticationError(message)) => {
                    error!("Batch {} rejected by provider: {}", batch_index + 1, message);
                    return Err(TranslationError::Provider(ProviderError::AuthenticationError(message)));
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
            attempt += 1;
        }

        error!("Batch {} failed after {} attempts: {}", batch_index + 1, attempt, last_error);
        Err(TranslationError::Batch {
            batch: batch_index,
            attempts: attempt,
            message: last_error,
        })
    }
}
