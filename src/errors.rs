/*!
 * Error types for the subpilot application.
 *
 * Each stage of the pipeline has its own error enum, built with the
 * thiserror crate. `AppError` is what the externally callable operations
 * return; everything below it converts into it with `?`.
 */

use thiserror::Error;

/// Errors reported by external collaborators (media server, subtitle
/// provider, AI endpoint, notifier)
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Deterministic "no such resource" answer
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Deterministic answers (not found, bad credentials, malformed
    /// responses, 4xx) are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::ConnectionError(_) | Self::RateLimitExceeded(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::ParseError(_) | Self::AuthenticationError(_) | Self::NotFound(_) => false,
        }
    }

    /// Map a non-success HTTP status to the matching variant
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(status.as_u16(), error.to_string());
        }
        if error.is_decode() {
            Self::ParseError(error.to_string())
        } else if error.is_connect() || error.is_timeout() {
            Self::ConnectionError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubtitleError {
    /// Content could not be read as SRT
    #[error("Failed to parse subtitle: {0}")]
    ParseError(String),

    /// Parsing succeeded but produced no usable entries
    #[error("Subtitle track has no entries")]
    EmptyTrack,

    /// Downloaded archive held no subtitle file
    #[error("Archive contains no subtitle file: {0}")]
    EmptyArchive(String),
}

/// Errors that can occur while re-timing one track against another
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// One of the two tracks has no entries
    #[error("{track} track is empty")]
    EmptyTrack {
        /// Which side was empty ("reference" or "target")
        track: &'static str,
    },

    /// A track failed to parse
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Not enough consistent anchors to build a time mapping
    #[error("Insufficient anchors: found {found}, need at least 1")]
    InsufficientAnchors {
        /// Anchors that survived outlier rejection
        found: usize,
    },

    /// The anchor finder failed outright
    #[error("Anchor finder error: {0}")]
    Provider(#[from] ProviderError),
}

/// Errors that can occur during translation
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// One batch kept failing after all retries; the request is aborted
    #[error("Batch {batch} failed after {attempts} attempts: {message}")]
    Batch {
        /// Zero-based batch index
        batch: usize,
        /// Attempts made, including the first
        attempts: u32,
        /// Last error seen
        message: String,
    },

    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error with subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),
}

/// Inbound webhook payloads rejected at the boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    /// Body is not valid JSON or lacks the expected fields
    #[error("Malformed event payload: {0}")]
    Malformed(String),

    /// Event name outside the handled set
    #[error("Unsupported event: {0}")]
    Unsupported(String),

    /// No media identifier in the payload
    #[error("Event has no rating key")]
    MissingRatingKey,

    /// Shared secret missing or wrong
    #[error("Webhook secret mismatch")]
    Unauthorized,
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Media item or queue entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The identifier resolved to a show or season instead of a playable item
    #[error("Media {media_id} is a {kind}, not a movie or episode")]
    WrongMediaType {
        /// Requested identifier
        media_id: String,
        /// Container kind reported by the media server
        kind: String,
    },

    /// Approve or reject on a request that is no longer pending
    #[error("Translation request for {media_id} is {status}, expected pending")]
    QueueConflict {
        /// Media identifier of the request
        media_id: String,
        /// Current status
        status: String,
    },

    /// An external call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Error from synchronization
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Rejected inbound event
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::Timeout(error.to_string())
    }
}
