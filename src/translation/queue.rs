/*!
 * In-process pending translation queue.
 *
 * One live request per (media, source language, target language). Entries are
 * replaced whole under the write lock, never mutated field by field, so a
 * status check and its transition happen atomically.
 */

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use log::debug;

use crate::acquisition::{ExistingSubtitle, SubtitleCandidate};
use crate::errors::AppError;

/// Lifecycle of a translation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
}

impl RequestStatus {
    /// Pending and approved requests stay in the queue
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Executed => write!(f, "executed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "executed" => Ok(Self::Executed),
            "failed" => Ok(Self::Failed),
            _ => Err(anyhow::anyhow!("Invalid request status: {}", s)),
        }
    }
}

/// Where the source-language track comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranslationSource {
    /// A text stream already attached to the media item
    MediaStream { stream: ExistingSubtitle },
    /// A provider search result
    Provider { candidate: SubtitleCandidate },
}

impl TranslationSource {
    pub fn describe(&self) -> String {
        match self {
            Self::MediaStream { stream } => format!("media stream {} ({})", stream.stream_id, stream.language),
            Self::Provider { candidate } => format!("provider subtitle {} ({})", candidate.name, candidate.id),
        }
    }
}

/// Queue identity of a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub media_id: String,
    pub from_lang: String,
    pub to_lang: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTranslationRequest {
    pub id: String,
    pub media_id: String,
    pub title: String,
    pub from_lang: String,
    pub to_lang: String,
    pub source: TranslationSource,
    /// Remove existing target-language subtitles when uploading
    pub replace_existing: bool,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingTranslationRequest {
    pub fn new(media_id: &str, title: &str, from_lang: &str, to_lang: &str, source: TranslationSource, replace_existing: bool) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            media_id: media_id.to_string(),
            title: title.to_string(),
            from_lang: from_lang.to_string(),
            to_lang: to_lang.to_string(),
            source,
            replace_existing,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> QueueKey {
        QueueKey {
            media_id: self.media_id.clone(),
            from_lang: self.from_lang.clone(),
            to_lang: self.to_lang.clone(),
        }
    }

    fn with_status(&self, status: RequestStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Shared store of live requests
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    entries: Arc<RwLock<HashMap<QueueKey, PendingTranslationRequest>>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending request, or refresh the live one with the same
    /// key. Returns the stored request and whether it was newly created.
    /// An approved (executing) request is left untouched.
    pub fn upsert(&self, request: PendingTranslationRequest) -> (PendingTranslationRequest, bool) {
        let key = request.key();
        let mut entries = self.entries.write();
        match entries.get(&key).cloned() {
            Some(existing) if existing.status == RequestStatus::Approved => (existing, false),
            Some(existing) => {
                let refreshed = PendingTranslationRequest {
                    id: existing.id,
                    created_at: existing.created_at,
                    status: RequestStatus::Pending,
                    updated_at: Utc::now(),
                    ..request
                };
                entries.insert(key, refreshed.clone());
                debug!("Refreshed pending translation {} for media {}", refreshed.id, refreshed.media_id);
                (refreshed, false)
            }
            None => {
                entries.insert(key, request.clone());
                debug!("Queued translation {} for media {}", request.id, request.media_id);
                (request, true)
            }
        }
    }

    /// Most recent live request for a media item, any language pair
    pub fn latest_for_media(&self, media_id: &str) -> Option<PendingTranslationRequest> {
        self.entries
            .read()
            .values()
            .filter(|r| r.media_id == media_id)
            .max_by_key(|r| r.created_at)
            .cloned()
    }

    /// Atomically move a request from `expected` to `next`. Terminal states
    /// remove the request from the queue.
    pub fn transition(&self, key: &QueueKey, expected: RequestStatus, next: RequestStatus) -> Result<PendingTranslationRequest, AppError> {
        let mut entries = self.entries.write();
        let current = entries
            .get(key)
            .ok_or_else(|| AppError::NotFound(format!("No translation request for media {}", key.media_id)))?;

        if current.status != expected {
            return Err(AppError::QueueConflict {
                media_id: key.media_id.clone(),
                status: current.status.to_string(),
            });
        }

        let updated = current.with_status(next);
        if next.is_live() {
            entries.insert(key.clone(), updated.clone());
        } else {
            entries.remove(key);
        }
        Ok(updated)
    }

    /// Put back requests loaded from persistent storage. A request stored as
    /// approved was interrupted mid-execution; it goes back to pending so it
    /// can be approved or rejected again. Returns the requests reset that way.
    pub fn restore(&self, requests: Vec<PendingTranslationRequest>) -> Vec<PendingTranslationRequest> {
        let mut entries = self.entries.write();
        let mut reset = Vec::new();
        for request in requests.into_iter().filter(|r| r.status.is_live()) {
            let request = if request.status == RequestStatus::Approved {
                let pending = request.with_status(RequestStatus::Pending);
                reset.push(pending.clone());
                pending
            } else {
                request
            };
            entries.insert(request.key(), request);
        }
        reset
    }

    /// Live requests, oldest first
    pub fn list(&self) -> Vec<PendingTranslationRequest> {
        let mut list: Vec<_> = self.entries.read().values().cloned().collect();
        list.sort_by_key(|r| r.created_at);
        list
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
