/*!
 * Value types shared by the acquisition pipeline.
 *
 * `MediaMetadata` and `ExistingSubtitle` are snapshots produced by the media
 * server, `SubtitleCandidate` comes from the subtitle provider. None of them
 * is mutated once built.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::language_utils;

/// Kind of entity a media identifier resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
    Show,
    Season,
    Other(String),
}

impl MediaKind {
    pub fn from_type_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "movie" => Self::Movie,
            "episode" => Self::Episode,
            "show" => Self::Show,
            "season" => Self::Season,
            other => Self::Other(other.to_string()),
        }
    }

    /// Only movies and episodes carry subtitle streams
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Movie | Self::Episode)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => write!(f, "movie"),
            Self::Episode => write!(f, "episode"),
            Self::Show => write!(f, "show"),
            Self::Season => write!(f, "season"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Snapshot of a media item for one processing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    pub kind: MediaKind,
    /// Movie title, or the show title for episodes
    pub title: String,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<String>,
}

impl MediaMetadata {
    pub fn movie(id: &str, title: &str, year: Option<u32>) -> Self {
        Self {
            id: id.to_string(),
            kind: MediaKind::Movie,
            title: title.to_string(),
            year,
            season: None,
            episode: None,
            imdb_id: None,
            tmdb_id: None,
        }
    }

    pub fn episode(id: &str, show_title: &str, season: u32, episode: u32) -> Self {
        Self {
            kind: MediaKind::Episode,
            season: Some(season),
            episode: Some(episode),
            ..Self::movie(id, show_title, None)
        }
    }

    pub fn with_imdb(mut self, imdb_id: &str) -> Self {
        self.imdb_id = Some(imdb_id.to_string());
        self
    }

    /// Human readable label used in logs and notifications
    pub fn display_title(&self) -> String {
        match (self.season, self.episode) {
            (Some(s), Some(e)) => format!("{} S{:02}E{:02}", self.title, s, e),
            _ => match self.year {
                Some(year) => format!("{} ({})", self.title, year),
                None => self.title.clone(),
            },
        }
    }
}

/// Ordinal rank of subtitle provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    #[default]
    Unknown,
    AiGenerated,
    HumanTranslated,
    Retail,
}

const RETAIL_KEYWORDS: &[&str] = &["bluray", "retail", "official", "web-dl"];
const AI_KEYWORDS: &[&str] = &["ai", "auto", "machine"];

impl QualityTier {
    /// Classify a release from its display name and release notes.
    ///
    /// Retail keywords are matched as substrings, AI keywords as whole words
    /// so that "trailer" or "autumn" stay human-translated.
    pub fn detect(name: &str, release_info: &str) -> Self {
        let text = format!("{} {}", name, release_info).to_lowercase();
        if text.trim().is_empty() {
            return Self::Unknown;
        }
        if RETAIL_KEYWORDS.iter().any(|k| text.contains(k)) {
            return Self::Retail;
        }
        let is_ai = text
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| AI_KEYWORDS.contains(&word));
        if is_ai {
            Self::AiGenerated
        } else {
            Self::HumanTranslated
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::AiGenerated => write!(f, "ai"),
            Self::HumanTranslated => write!(f, "translated"),
            Self::Retail => write!(f, "retail"),
        }
    }
}

/// Minimum tier a candidate needs to be considered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityThreshold {
    #[default]
    Any,
    Translated,
    Retail,
}

impl QualityThreshold {
    pub fn accepts(&self, tier: QualityTier) -> bool {
        match self {
            Self::Any => true,
            Self::Translated => tier >= QualityTier::HumanTranslated,
            Self::Retail => tier >= QualityTier::Retail,
        }
    }
}

/// Codecs of image-based tracks
const IMAGE_CODECS: &[&str] = &["pgs", "vobsub", "dvdsub", "hdmv_pgs_subtitle", "dvd_subtitle"];

/// Codecs whose content can be downloaded and used as text
const TEXT_CODECS: &[&str] = &["srt", "ass", "ssa", "subrip", "text", "mov_text", "webvtt"];

/// A subtitle stream already attached to a media item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingSubtitle {
    /// Stream identifier on the media server
    pub stream_id: String,
    /// Language code as reported (normalised on comparison)
    pub language: String,
    pub codec: String,
    pub forced: bool,
    /// Sidecar file rather than a stream inside the container
    pub external: bool,
    pub title: Option<String>,
}

impl ExistingSubtitle {
    pub fn new(stream_id: &str, language: &str, codec: &str) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            language: language.to_string(),
            codec: codec.to_lowercase(),
            forced: false,
            external: true,
            title: None,
        }
    }

    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    pub fn internal(mut self) -> Self {
        self.external = false;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn is_language(&self, code: &str) -> bool {
        language_utils::language_codes_match(&self.language, code)
    }

    /// Image-based track baked into the container
    pub fn is_embedded(&self) -> bool {
        IMAGE_CODECS.contains(&self.codec.as_str())
    }

    pub fn is_text_based(&self) -> bool {
        TEXT_CODECS.contains(&self.codec.as_str())
    }

    pub fn tier(&self) -> QualityTier {
        match &self.title {
            Some(title) if !title.trim().is_empty() => QualityTier::detect(title, ""),
            _ => QualityTier::Unknown,
        }
    }
}

/// One search result from the subtitle provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCandidate {
    pub id: String,
    pub name: String,
    pub language: String,
    pub tier: QualityTier,
    pub downloads: u64,
    pub rating: f64,
    /// Combined popularity from downloads and rating
    pub popularity: f64,
    /// Provider-declared match confidence, 0.0 to 1.0
    pub match_confidence: f64,
    pub release_info: String,
    pub download_url: Option<String>,
}

impl SubtitleCandidate {
    pub fn new(id: &str, name: &str, language: &str, tier: QualityTier, popularity: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            language: language.to_string(),
            tier,
            downloads: 0,
            rating: 0.0,
            popularity,
            match_confidence: 0.0,
            release_info: String::new(),
            download_url: None,
        }
    }

    /// Popularity score from provider statistics: `rating * 10 + log10(downloads) * 20`
    pub fn popularity_from(downloads: u64, rating: f64) -> f64 {
        let rating = if rating.is_finite() { rating.clamp(0.0, 10.0) } else { 0.0 };
        rating * 10.0 + (downloads.max(1) as f64).log10() * 20.0
    }
}
