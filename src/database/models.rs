/*!
 * Database entity models.
 *
 * These structures map directly to database tables.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome recorded in the translation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    /// Executed after an operator approved it
    Approved,
    /// Executed without approval
    AutoApproved,
    Rejected,
    Failed,
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryStatus::Approved => write!(f, "approved"),
            HistoryStatus::AutoApproved => write!(f, "auto_approved"),
            HistoryStatus::Rejected => write!(f, "rejected"),
            HistoryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for HistoryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approved" => Ok(HistoryStatus::Approved),
            "auto_approved" => Ok(HistoryStatus::AutoApproved),
            "rejected" => Ok(HistoryStatus::Rejected),
            "failed" => Ok(HistoryStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid history status: {}", s)),
        }
    }
}

/// Service counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatCounter {
    Downloads,
    Skipped,
    Translations,
    TranslationLines,
    Syncs,
    Failures,
}

impl StatCounter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatCounter::Downloads => "total_downloads",
            StatCounter::Skipped => "total_skipped",
            StatCounter::Translations => "total_translations",
            StatCounter::TranslationLines => "total_translation_lines",
            StatCounter::Syncs => "total_syncs",
            StatCounter::Failures => "total_failures",
        }
    }
}

/// One terminal translation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub request_id: String,
    pub media_id: String,
    pub title: String,
    pub from_lang: String,
    pub to_lang: String,
    pub status: HistoryStatus,
    pub lines_translated: i64,
    pub cost_usd: f64,
    pub model: String,
    pub error: Option<String>,
    pub created_at: String,
}

/// Snapshot of all counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceStats {
    pub total_downloads: i64,
    pub total_skipped: i64,
    pub total_translations: i64,
    pub total_translation_lines: i64,
    pub total_syncs: i64,
    pub total_failures: i64,
}

impl ServiceStats {
    /// Downloads over downloads plus skips, as a percentage rounded to one decimal
    pub fn success_rate(&self) -> f64 {
        let attempts = self.total_downloads + self.total_skipped;
        if attempts == 0 {
            return 0.0;
        }
        (self.total_downloads as f64 / attempts as f64 * 1000.0).round() / 10.0
    }
}

impl fmt::Display for ServiceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Downloads:          {}", self.total_downloads)?;
        writeln!(f, "Skipped:            {}", self.total_skipped)?;
        writeln!(f, "Translations:       {}", self.total_translations)?;
        writeln!(f, "Translated lines:   {}", self.total_translation_lines)?;
        writeln!(f, "Syncs:              {}", self.total_syncs)?;
        writeln!(f, "Failures:           {}", self.total_failures)?;
        write!(f, "Success rate:       {:.1}%", self.success_rate())
    }
}
