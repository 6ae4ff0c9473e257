/*!
 * Operator notifications.
 *
 * Events are handed to a `Notifier` on a spawned task. Delivery failures are
 * logged and dropped; they never affect the pipeline that raised them.
 */

use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::providers::Notifier;

/// Something worth telling the operator about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    ProcessingStarted { title: String, language: String },
    SubtitleFound { title: String, name: String, tier: String },
    Downloaded { title: String, name: String, language: String, synced: bool },
    NotFound { title: String, language: String },
    Error { title: String, message: String },
    TranslationApprovalRequired { title: String, media_id: String, from_lang: String, to_lang: String },
    TranslationStarted { title: String, from_lang: String, to_lang: String },
    TranslationCompleted { title: String, lines: usize, cost_usd: f64 },
    SyncStarted { title: String },
    SyncCompleted { title: String, anchors: usize, avg_offset_ms: i64 },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProcessingStarted { .. } => "processing_started",
            Self::SubtitleFound { .. } => "subtitle_found",
            Self::Downloaded { .. } => "downloaded",
            Self::NotFound { .. } => "not_found",
            Self::Error { .. } => "error",
            Self::TranslationApprovalRequired { .. } => "translation_approval_required",
            Self::TranslationStarted { .. } => "translation_started",
            Self::TranslationCompleted { .. } => "translation_completed",
            Self::SyncStarted { .. } => "sync_started",
            Self::SyncCompleted { .. } => "sync_completed",
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessingStarted { title, language } => {
                write!(f, "🔍 *Processing* {}\nLooking for `{}` subtitles", title, language)
            }
            Self::SubtitleFound { title, name, tier } => {
                write!(f, "📄 *Subtitle found* for {}\n{} ({})", title, name, tier)
            }
            Self::Downloaded { title, name, language, synced } => {
                let sync_note = if *synced { ", synced" } else { "" };
                write!(f, "✅ *Downloaded* `{}` subtitle for {}\n{}{}", language, title, name, sync_note)
            }
            Self::NotFound { title, language } => {
                write!(f, "❌ *No subtitle* found for {} (`{}`)", title, language)
            }
            Self::Error { title, message } => write!(f, "⚠️ *Error* processing {}\n{}", title, message),
            Self::TranslationApprovalRequired { title, media_id, from_lang, to_lang } => write!(
                f,
                "🌐 *Translation approval required* for {}\n`{}` -> `{}` (media {})",
                title, from_lang, to_lang, media_id
            ),
            Self::TranslationStarted { title, from_lang, to_lang } => {
                write!(f, "🌐 *Translating* {} (`{}` -> `{}`)", title, from_lang, to_lang)
            }
            Self::TranslationCompleted { title, lines, cost_usd } => {
                write!(f, "✅ *Translation completed* for {}\n{} lines, ~${:.4}", title, lines, cost_usd)
            }
            Self::SyncStarted { title } => write!(f, "⏱️ *Syncing* subtitle timing for {}", title),
            Self::SyncCompleted { title, anchors, avg_offset_ms } => write!(
                f,
                "⏱️ *Sync completed* for {}\n{} anchors, average offset {}ms",
                title, anchors, avg_offset_ms
            ),
        }
    }
}

/// Fire-and-forget front of an optional `Notifier`
#[derive(Debug, Clone, Default)]
pub struct NotificationDispatcher {
    notifier: Option<Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier: Some(notifier) }
    }

    /// Dispatcher that drops every event
    pub fn disabled() -> Self {
        Self { notifier: None }
    }

    pub fn notify(&self, event: NotificationEvent) {
        let Some(notifier) = self.notifier.clone() else {
            debug!("Notifications disabled, dropping {}", event.kind());
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                warn!("Failed to send {} notification: {}", event.kind(), e);
            }
        });
    }
}
