/*!
 * Token and cost projection for a translation request.
 */

use serde::Serialize;

use crate::subtitle_processor::SubtitleTrack;

/// Rough characters per token
const CHARS_PER_TOKEN: usize = 4;

/// USD per million tokens (input, output)
const PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-3.5-turbo", 0.50, 1.50),
    ("gpt-4", 30.00, 60.00),
];

/// Price per million tokens for a model; unknown models are priced as the
/// first (cheapest default) entry
pub fn model_pricing(model: &str) -> (f64, f64) {
    PRICING
        .iter()
        .find(|(name, _, _)| *name == model)
        .or_else(|| PRICING.first())
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or((0.0, 0.0))
}

/// Advisory projection; never a precondition for approval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationEstimate {
    pub entries: usize,
    pub characters: usize,
    pub estimated_tokens: usize,
    pub estimated_batches: usize,
    pub estimated_cost_usd: f64,
    pub model: String,
}

impl TranslationEstimate {
    /// Output is assumed to be about as long as the input
    pub fn for_track(track: &SubtitleTrack, batch_size: usize, model: &str) -> Self {
        let characters = track.total_chars();
        let estimated_tokens = characters / CHARS_PER_TOKEN;
        let (input_price, output_price) = model_pricing(model);
        let millions = estimated_tokens as f64 / 1_000_000.0;
        let cost = millions * input_price + millions * output_price;

        Self {
            entries: track.len(),
            characters,
            estimated_tokens,
            estimated_batches: track.len().div_ceil(batch_size.max(1)),
            estimated_cost_usd: (cost * 10_000.0).round() / 10_000.0,
            model: model.to_string(),
        }
    }
}
