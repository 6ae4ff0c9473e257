/*!
 * # subpilot - subtitle autopilot for a Plex library
 *
 * Finds, ranks, downloads, re-times and (with approval) translates
 * subtitles for media items as they show up on a media server.
 *
 * ## Features
 *
 * - Event-driven acquisition from Plex and Tautulli webhooks
 * - Ranked subtitle search with a TTL search cache
 * - Skip, threshold and replace-only-if-better rules
 * - Anchor-based timing sync (AI or local text similarity)
 * - Translation fallback behind an approval queue, with cost estimates
 * - Persistent stats, history and pending queue (SQLite)
 * - Telegram notifications
 *
 * ## Architecture
 *
 * - `acquisition`: the decision pipeline (`Orchestrator`), ranking, cache,
 *   dedup registry
 * - `sync`: anchor sampling, outlier rejection, time mapping
 * - `translation`: batch codec, cost estimate, approval queue and workflow
 * - `providers`: collaborator traits plus Plex, SubSource, OpenAI, Telegram
 *   and mock implementations
 * - `events`: inbound webhook parsing
 * - `database`: SQLite persistence
 * - `app_controller`: wires configuration to the pipeline
 * - `app_config`, `errors`, `language_utils`, `subtitle_processor`,
 *   `notifications`: shared plumbing
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod acquisition;
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod errors;
pub mod events;
pub mod language_utils;
pub mod notifications;
pub mod providers;
pub mod subtitle_processor;
pub mod sync;
pub mod translation;

// Re-export main types for easier usage
pub use acquisition::{AcquisitionOptions, Orchestrator, Outcome, SkipReason};
pub use app_config::Config;
pub use app_controller::{Collaborators, Controller};
pub use errors::{AppError, EventError, ProviderError, SubtitleError, SyncError, TranslationError};
pub use events::{EventKind, EventSource, InboundEvent};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part1, normalize_to_part2t};
pub use subtitle_processor::{SubtitleEntry, SubtitleTrack};
pub use sync::{SyncEngine, SyncStats};
pub use translation::{TranslationWorkflow, TranslationReport};
