/*!
 * Pure decision rules of the acquisition pipeline: skip checks, the
 * replacement rule, and the source-language fallback order.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use super::models::{ExistingSubtitle, QualityThreshold, QualityTier, SubtitleCandidate};
use crate::language_utils;

/// Options bundle for one `process` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionOptions {
    pub skip_if_has_subtitle: bool,
    pub skip_forced: bool,
    pub skip_embedded: bool,
    pub min_quality_tier: QualityThreshold,
    pub replace_existing: bool,
    pub replace_only_if_better: bool,
    pub translation_enabled: bool,
    pub translation_requires_approval: bool,
    /// Re-time a downloaded subtitle against a local reference before upload
    pub auto_sync: bool,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            skip_if_has_subtitle: true,
            skip_forced: true,
            skip_embedded: false,
            min_quality_tier: QualityThreshold::Any,
            replace_existing: false,
            replace_only_if_better: true,
            translation_enabled: false,
            translation_requires_approval: true,
            auto_sync: false,
        }
    }
}

/// Why a run stopped without acquiring anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    HasSubtitle,
    HasForcedSubtitle,
    HasEmbeddedSubtitle,
    BelowQualityThreshold,
    /// Nothing blocks acquisition
    Proceed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::HasSubtitle => "has-subtitle",
            Self::HasForcedSubtitle => "has-forced-subtitle",
            Self::HasEmbeddedSubtitle => "has-embedded-subtitle",
            Self::BelowQualityThreshold => "below-quality-threshold",
            Self::Proceed => "none",
        };
        write!(f, "{}", code)
    }
}

/// Skip outcome plus a human readable explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipDecision {
    pub reason: SkipReason,
    pub detail: String,
}

impl SkipDecision {
    pub fn proceed() -> Self {
        Self { reason: SkipReason::Proceed, detail: String::new() }
    }

    pub fn skip(reason: SkipReason, detail: impl Into<String>) -> Self {
        Self { reason, detail: detail.into() }
    }

    pub fn should_skip(&self) -> bool {
        self.reason != SkipReason::Proceed
    }
}

impl fmt::Display for SkipDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.reason, self.detail)
        }
    }
}

/// Steps 1 to 3 of the pipeline. First match wins.
pub fn evaluate_skip(existing: &[ExistingSubtitle], target_lang: &str, options: &AcquisitionOptions) -> SkipDecision {
    let has_target = existing.iter().any(|s| s.is_language(target_lang));
    if has_target && options.skip_if_has_subtitle && !options.replace_existing {
        return SkipDecision::skip(
            SkipReason::HasSubtitle,
            format!("a {} subtitle is already present", target_lang),
        );
    }

    if options.skip_forced {
        if let Some(forced) = existing.iter().find(|s| s.forced) {
            return SkipDecision::skip(
                SkipReason::HasForcedSubtitle,
                format!("forced {} subtitle present", forced.language),
            );
        }
    }

    if options.skip_embedded {
        if let Some(embedded) = existing.iter().find(|s| s.is_embedded()) {
            return SkipDecision::skip(
                SkipReason::HasEmbeddedSubtitle,
                format!("embedded {} track ({}) present", embedded.language, embedded.codec),
            );
        }
    }

    SkipDecision::proceed()
}

/// Best tier among the existing subtitles in the target language, if any
pub fn existing_target_tier(existing: &[ExistingSubtitle], target_lang: &str) -> Option<QualityTier> {
    existing
        .iter()
        .filter(|s| s.is_language(target_lang))
        .map(|s| s.tier())
        .max()
}

/// Step 5 replacement rule. `Err` carries the reason the candidate may not
/// replace what is already there. Tier alone decides "better".
pub fn check_replacement(
    existing_tier: Option<QualityTier>,
    candidate: &SubtitleCandidate,
    options: &AcquisitionOptions,
) -> Result<(), String> {
    let Some(existing_tier) = existing_tier else {
        return Ok(());
    };
    if !options.replace_existing {
        return Err("replacing existing subtitles is disabled".to_string());
    }
    if options.replace_only_if_better && candidate.tier <= existing_tier {
        return Err(format!(
            "best candidate tier {} is not better than existing tier {}",
            candidate.tier, existing_tier
        ));
    }
    Ok(())
}

/// Source languages to try for translation: the priority list in order, then
/// the remaining known languages alphabetically. The target is never a source.
pub fn source_fallback_order(priority: &[String], known: &[String], target_lang: &str) -> Vec<String> {
    let normalize = |code: &String| language_utils::normalize_to_part1(code).unwrap_or_else(|_| code.to_lowercase());

    let mut order: Vec<String> = Vec::new();
    for code in priority.iter().map(normalize) {
        if !order.contains(&code) && !language_utils::language_codes_match(&code, target_lang) {
            order.push(code);
        }
    }

    let mut remaining: Vec<String> = known
        .iter()
        .map(normalize)
        .filter(|code| !order.contains(code) && !language_utils::language_codes_match(code, target_lang))
        .collect();
    remaining.sort();
    remaining.dedup();

    order.extend(remaining);
    order
}
