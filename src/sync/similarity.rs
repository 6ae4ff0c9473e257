/*!
 * Text similarity anchor finder.
 *
 * Levenshtein-based matching of subtitle lines. Only useful when both tracks
 * are in the same language (re-timing a release against another cut), but
 * it needs no AI key and no network.
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::anchors::{AnchorLine, AnchorMatch};
use crate::errors::ProviderError;
use crate::providers::AnchorFinder;

static MARKUP_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>|\{[^}]*\}").unwrap());

/// Anchor finder matching lines by normalized edit distance
#[derive(Debug, Clone)]
pub struct SimilarityAnchorFinder {
    /// Minimum similarity (0.0-1.0, higher = stricter)
    threshold: f64,
}

impl Default for SimilarityAnchorFinder {
    fn default() -> Self {
        Self { threshold: 0.8 }
    }
}

impl SimilarityAnchorFinder {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Best reference line for `line`, if any reaches the threshold
    fn best_match(&self, line: &AnchorLine, reference: &[AnchorLine]) -> Option<AnchorMatch> {
        let needle = normalize_line(&line.text);
        if needle.is_empty() {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        for candidate in reference {
            let sim = similarity(&needle, &normalize_line(&candidate.text));
            if sim >= self.threshold && best.is_none_or(|(_, best_sim)| sim > best_sim) {
                best = Some((candidate.index, sim));
            }
        }

        best.map(|(reference_index, confidence)| AnchorMatch {
            reference_index,
            target_index: line.index,
            confidence,
        })
    }
}

#[async_trait]
impl AnchorFinder for SimilarityAnchorFinder {
    async fn find_anchors(&self, reference: &[AnchorLine], target: &[AnchorLine]) -> Result<Vec<AnchorMatch>, ProviderError> {
        Ok(target.iter().filter_map(|line| self.best_match(line, reference)).collect())
    }

    fn name(&self) -> String {
        "text-similarity".to_string()
    }
}

/// Strip formatting tags and collapse whitespace, lowercased
pub fn normalize_line(text: &str) -> String {
    MARKUP_REGEX
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Similarity between two strings (0.0-1.0) from normalized Levenshtein distance
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}
