/*!
 * Subtitle acquisition: the decision engine that turns "this item needs a
 * subtitle in language X" into exactly one outcome.
 *
 * - `models`: media, candidate and existing-stream types, quality tiers
 * - `ranker`: deterministic candidate ordering
 * - `search_cache`: TTL cache of provider searches
 * - `decision`: skip and replacement rules, source-language fallback order
 * - `cooldown`: per-media deduplication of concurrent tasks
 * - `orchestrator`: the pipeline itself
 */

pub mod cooldown;
pub mod decision;
pub mod models;
pub mod orchestrator;
pub mod ranker;
pub mod search_cache;

pub use cooldown::{InFlightGuard, InFlightRegistry};
pub use decision::{AcquisitionOptions, SkipDecision, SkipReason};
pub use models::{
    ExistingSubtitle, MediaKind, MediaMetadata, QualityThreshold, QualityTier, SubtitleCandidate,
};
pub use orchestrator::{FailureKind, Orchestrator, Outcome, ProcessFailure, SyncReport};
pub use search_cache::{CacheStats, SearchCache, SearchFingerprint};
