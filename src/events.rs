/*!
 * Inbound media-server events.
 *
 * Webhook bodies are parsed into a closed `InboundEvent` here so nothing past
 * this module ever sees raw JSON. Plex posts `multipart/form-data` with the
 * JSON in a `payload` field; Tautulli posts plain JSON.
 */

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::app_config::AcquisitionConfig;
use crate::errors::EventError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Plex,
    Tautulli,
}

impl FromStr for EventSource {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plex" => Ok(Self::Plex),
            "tautulli" => Ok(Self::Tautulli),
            other => Err(EventError::Unsupported(format!("source {}", other))),
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plex => write!(f, "plex"),
            Self::Tautulli => write!(f, "tautulli"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    LibraryNew,
    LibraryOnDeck,
    MediaPlay,
}

impl EventKind {
    /// Map a webhook event name; both Plex (`library.new`) and Tautulli
    /// (`created`, `playback.start`) spellings are accepted
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "library.new" | "created" | "recently_added" => Some(Self::LibraryNew),
            "library.on.deck" => Some(Self::LibraryOnDeck),
            "media.play" | "play" | "playback.start" => Some(Self::MediaPlay),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LibraryNew => write!(f, "library.new"),
            Self::LibraryOnDeck => write!(f, "library.on.deck"),
            Self::MediaPlay => write!(f, "media.play"),
        }
    }
}

/// Validated event, ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundEvent {
    pub source: EventSource,
    pub kind: EventKind,
    pub media_id: String,
    /// Media type as reported (`movie`, `episode`, ...), empty when absent
    pub media_type: String,
}

impl InboundEvent {
    /// Event toggles from the configuration
    pub fn should_process(&self, config: &AcquisitionConfig) -> bool {
        match self.kind {
            EventKind::LibraryNew => config.auto_download_on_add,
            EventKind::MediaPlay => config.auto_download_on_play,
            EventKind::LibraryOnDeck => true,
        }
    }
}

/// Shared-secret check; an empty configured secret accepts everything
pub fn verify_secret(configured: &str, provided: Option<&str>) -> Result<(), EventError> {
    if configured.is_empty() {
        return Ok(());
    }
    match provided {
        Some(value) if value == configured => Ok(()),
        _ => Err(EventError::Unauthorized),
    }
}

/// Parse a body from either source
pub fn parse(source: EventSource, body: &[u8], content_type: &str) -> Result<InboundEvent, EventError> {
    match source {
        EventSource::Plex => parse_plex(body, content_type),
        EventSource::Tautulli => parse_tautulli(body),
    }
}

/// Plex webhook: multipart with a `payload` field, or the bare JSON
pub fn parse_plex(body: &[u8], content_type: &str) -> Result<InboundEvent, EventError> {
    let json = match multipart_boundary(content_type) {
        Some(boundary) => multipart_field(body, &boundary, "payload")
            .ok_or_else(|| EventError::Malformed("multipart body has no payload field".to_string()))?,
        None => String::from_utf8_lossy(body).into_owned(),
    };
    let value: Value = serde_json::from_str(&json).map_err(|e| EventError::Malformed(e.to_string()))?;

    let name = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| EventError::Malformed("missing event name".to_string()))?;
    let kind = EventKind::from_event_name(name).ok_or_else(|| EventError::Unsupported(name.to_string()))?;

    let metadata = value.get("Metadata").ok_or(EventError::MissingRatingKey)?;
    let media_id = id_field(metadata, &["ratingKey"]).ok_or(EventError::MissingRatingKey)?;
    let media_type = metadata.get("type").and_then(Value::as_str).unwrap_or_default().to_string();

    debug!("Parsed Plex event {} for {}", kind, media_id);
    Ok(InboundEvent { source: EventSource::Plex, kind, media_id, media_type })
}

/// Tautulli notification agent JSON
pub fn parse_tautulli(body: &[u8]) -> Result<InboundEvent, EventError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| EventError::Malformed(e.to_string()))?;

    let name = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| EventError::Malformed("missing event name".to_string()))?;
    let kind = EventKind::from_event_name(name).ok_or_else(|| EventError::Unsupported(name.to_string()))?;
    let media_id = id_field(&value, &["rating_key", "ratingKey"]).ok_or(EventError::MissingRatingKey)?;
    let media_type = value.get("media_type").and_then(Value::as_str).unwrap_or_default().to_string();

    debug!("Parsed Tautulli event {} for {}", kind, media_id);
    Ok(InboundEvent { source: EventSource::Tautulli, kind, media_id, media_type })
}

/// Rating keys arrive as strings or numbers depending on the sender
fn id_field(value: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match value.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    if !content_type.to_lowercase().starts_with("multipart/") {
        return None;
    }
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
}

/// Text value of a named form field.
///
/// The whole body is decoded lossily before splitting, so binary parts such
/// as the thumbnail Plex attaches come out garbled. Only text fields can be
/// read this way; that covers the `payload` field.
fn multipart_field(body: &[u8], boundary: &str, field: &str) -> Option<String> {
    let body = String::from_utf8_lossy(body);
    let delimiter = format!("--{}", boundary);
    let wanted = format!("name=\"{}\"", field);

    body.split(delimiter.as_str()).find_map(|part| {
        let (headers, content) = part
            .split_once("\r\n\r\n")
            .or_else(|| part.split_once("\n\n"))?;
        if !headers.contains(&wanted) {
            return None;
        }
        Some(content.trim_end_matches("\r\n").trim_end_matches('\n').to_string())
    })
}
