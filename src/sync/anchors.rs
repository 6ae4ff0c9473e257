/*!
 * Anchor discovery inputs and outputs.
 *
 * A long track is not sent whole to the anchor finder. A few small groups of
 * target entries are sampled evenly across the track, and each is paired with
 * a wider window of reference entries around the proportional position.
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Range;

use crate::errors::ProviderError;
use crate::subtitle_processor::SubtitleTrack;

/// Max characters of a line shown to the anchor finder
const PROMPT_TEXT_LIMIT: usize = 80;

/// One subtitle line handed to an anchor finder, with its absolute index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorLine {
    pub index: usize,
    pub start_ms: u64,
    pub text: String,
}

/// A pair of lines the finder believes are the same utterance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorMatch {
    pub reference_index: usize,
    pub target_index: usize,
    pub confidence: f64,
}

/// Matched timestamps across the two tracks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncAnchor {
    pub reference_ms: u64,
    pub target_ms: u64,
    /// reference - target
    pub offset_ms: i64,
    pub confidence: f64,
}

impl SyncAnchor {
    pub fn new(reference_ms: u64, target_ms: u64, confidence: f64) -> Self {
        Self {
            reference_ms,
            target_ms,
            offset_ms: reference_ms as i64 - target_ms as i64,
            confidence,
        }
    }
}

/// Sampling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    pub anchor_groups: usize,
    pub entries_per_group: usize,
    pub search_window: usize,
}

/// Index ranges for one anchor group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGroup {
    pub target: Range<usize>,
    pub reference: Range<usize>,
}

impl SamplingPlan {
    /// Number of groups for a target track: one per ten entries, at least
    /// two, at most `anchor_groups`
    pub fn group_count(&self, target_len: usize) -> usize {
        self.anchor_groups.min((target_len / 10).max(2))
    }

    pub fn groups(&self, reference_len: usize, target_len: usize) -> Vec<SampleGroup> {
        if reference_len == 0 || target_len == 0 {
            return Vec::new();
        }
        let count = self.group_count(target_len);
        (0..count)
            .map(|g| {
                let center = ((g as f64 + 0.5) / count as f64 * target_len as f64) as usize;
                let start = center.saturating_sub(self.entries_per_group / 2);
                let end = (start + self.entries_per_group).min(target_len);

                let ref_center = (center as f64 / target_len as f64 * reference_len as f64) as usize;
                let ref_start = ref_center.saturating_sub(self.search_window / 2);
                let ref_end = (ref_start + self.search_window).min(reference_len);

                SampleGroup {
                    target: start.min(end)..end,
                    reference: ref_start.min(ref_end)..ref_end,
                }
            })
            .collect()
    }
}

/// Lines of `track` within `range`, tagged with absolute indices
pub fn lines_for(track: &SubtitleTrack, range: Range<usize>) -> Vec<AnchorLine> {
    track.entries[range.clone()]
        .iter()
        .zip(range)
        .map(|(entry, index)| AnchorLine {
            index,
            start_ms: entry.start_time_ms,
            text: entry.text.replace('\n', " "),
        })
        .collect()
}

fn clip(text: &str) -> String {
    text.chars().take(PROMPT_TEXT_LIMIT).collect()
}

/// Prompt asking a chat model to pair reference and target lines
pub fn build_anchor_prompt(reference: &[AnchorLine], target: &[AnchorLine]) -> String {
    let mut prompt = String::from(
        "Match subtitle lines that express the same utterance. The two lists may be in different \
         languages and timed differently. Return JSON: {\"matches\": [{\"target\": <TGT number>, \
         \"reference\": <REF number>, \"confidence\": <0.0-1.0>}]}. Only include confident matches.\n\nREFERENCE:\n",
    );
    for line in reference {
        prompt.push_str(&format!(
            "[REF-{}] ({}) {}\n",
            line.index,
            crate::subtitle_processor::SubtitleEntry::format_timestamp(line.start_ms),
            clip(&line.text)
        ));
    }
    prompt.push_str("\nTARGET:\n");
    for line in target {
        prompt.push_str(&format!("[TGT-{}] {}\n", line.index, clip(&line.text)));
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    #[serde(alias = "tgt")]
    target: usize,
    #[serde(alias = "ref")]
    reference: usize,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// Parse the finder's JSON answer: either a bare array of matches, or an
/// object holding the array under `matches`, `results`, or its first array value
pub fn parse_anchor_response(content: &str) -> Result<Vec<AnchorMatch>, ProviderError> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ProviderError::ParseError(format!("Anchor response is not JSON: {}", e)))?;

    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let key = ["matches", "results"]
                .iter()
                .find(|k| map.get(**k).is_some_and(Value::is_array))
                .map(|k| k.to_string())
                .or_else(|| map.iter().find(|(_, v)| v.is_array()).map(|(k, _)| k.clone()));
            match key.and_then(|k| map.remove(&k)) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        _ => return Err(ProviderError::ParseError("Anchor response has no match list".to_string())),
    };

    Ok(list
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawMatch>(item).ok())
        .map(|m| AnchorMatch {
            reference_index: m.reference,
            target_index: m.target,
            confidence: m.confidence.clamp(0.0, 1.0),
        })
        .collect())
}
