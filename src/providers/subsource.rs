/*!
 * SubSource subtitle provider client.
 *
 * Searches by catalog id first and falls back to title/year. Downloads may be
 * a bare `.srt` or a ZIP archive; archives are unpacked in memory.
 */

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use std::io::{Cursor, Read};
use std::time::Duration;

use crate::acquisition::{QualityTier, SearchFingerprint, SubtitleCandidate};
use crate::app_config::SubtitleProviderConfig;
use crate::errors::{ProviderError, SubtitleError};
use crate::language_utils;
use crate::providers::SubtitleProvider;
use crate::providers::retry::{with_retry, RetryPolicy};

/// Confidence assigned to results of a catalog-id search
const ID_MATCH_CONFIDENCE: f64 = 1.0;
/// Confidence assigned to results of a title search
const TITLE_MATCH_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct SubSourceClient {
    base_url: String,
    api_key: String,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: serde_json::Value,
    name: String,
    language: String,
    download_url: Option<String>,
    release_info: Option<String>,
    rating: Option<f64>,
    downloads: Option<u64>,
}

impl SearchItem {
    fn into_candidate(self, match_confidence: f64) -> SubtitleCandidate {
        let id = match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let release_info = self.release_info.unwrap_or_default();
        let downloads = self.downloads.unwrap_or(0);
        let rating = self.rating.unwrap_or(0.0);
        let language = language_utils::normalize_to_part1(&self.language).unwrap_or_else(|_| self.language.to_lowercase());

        SubtitleCandidate {
            tier: QualityTier::detect(&self.name, &release_info),
            popularity: SubtitleCandidate::popularity_from(downloads, rating),
            id,
            name: self.name,
            language,
            downloads,
            rating,
            match_confidence,
            release_info,
            download_url: self.download_url,
        }
    }
}

/// First `.srt` member of a ZIP archive
pub fn extract_first_srt(archive: &[u8]) -> Result<Vec<u8>, SubtitleError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| SubtitleError::ParseError(format!("Failed to read zip: {}", e)))?;

    for i in 0..zip.len() {
        let mut file = zip
            .by_index(i)
            .map_err(|e| SubtitleError::ParseError(format!("Failed to read zip entry: {}", e)))?;
        if !file.name().to_lowercase().ends_with(".srt") {
            continue;
        }
        debug!("Extracting {} from archive", file.name());
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| SubtitleError::ParseError(format!("Failed to read from archive: {}", e)))?;
        return Ok(contents);
    }

    Err(SubtitleError::EmptyArchive(format!("{} entries, none .srt", zip.len())))
}

fn looks_like_zip(content_type: &str, name: &str, bytes: &[u8]) -> bool {
    content_type.contains("zip") || name.to_lowercase().ends_with(".zip") || bytes.starts_with(b"PK\x03\x04")
}

impl SubSourceClient {
    pub fn new(config: &SubtitleProviderConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .user_agent(concat!("subpilot/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            retry: RetryPolicy::new(config.retry_count, config.retry_backoff_ms),
        }
    }

    async fn query(&self, params: &[(String, String)]) -> Result<Vec<SearchItem>, ProviderError> {
        let mut request = self
            .client
            .get(format!("{}/subtitles/search", self.base_url))
            .query(params);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), format!("SubSource: {}", body.trim())));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("SubSource search response: {}", e)))?;
        Ok(parsed.results)
    }

    fn episode_params(fingerprint: &SearchFingerprint, params: &mut Vec<(String, String)>) {
        if let Some(season) = fingerprint.season {
            params.push(("season".to_string(), season.to_string()));
        }
        if let Some(episode) = fingerprint.episode {
            params.push(("episode".to_string(), episode.to_string()));
        }
    }

    fn id_params(fingerprint: &SearchFingerprint) -> Option<Vec<(String, String)>> {
        let mut params = vec![("language".to_string(), fingerprint.language.clone())];
        match (&fingerprint.imdb_id, &fingerprint.tmdb_id) {
            (Some(imdb), _) => params.push(("imdb_id".to_string(), imdb.clone())),
            (None, Some(tmdb)) => params.push(("tmdb_id".to_string(), tmdb.clone())),
            (None, None) => return None,
        }
        Self::episode_params(fingerprint, &mut params);
        Some(params)
    }

    fn title_params(fingerprint: &SearchFingerprint) -> Option<Vec<(String, String)>> {
        if fingerprint.title.is_empty() {
            return None;
        }
        let mut params = vec![
            ("query".to_string(), fingerprint.title.clone()),
            ("language".to_string(), fingerprint.language.clone()),
        ];
        if let Some(year) = fingerprint.year {
            params.push(("year".to_string(), year.to_string()));
        }
        Self::episode_params(fingerprint, &mut params);
        Some(params)
    }

    async fn search_with(&self, params: &[(String, String)], confidence: f64, language: &str) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        let items = with_retry(&self.retry, "SubSource search", || self.query(params)).await?;
        Ok(items
            .into_iter()
            .map(|item| item.into_candidate(confidence))
            .filter(|c| language_utils::language_codes_match(&c.language, language))
            .collect())
    }
}

#[async_trait]
impl SubtitleProvider for SubSourceClient {
    async fn search(&self, fingerprint: &SearchFingerprint) -> Result<Vec<SubtitleCandidate>, ProviderError> {
        if let Some(params) = Self::id_params(fingerprint) {
            let results = self.search_with(&params, ID_MATCH_CONFIDENCE, &fingerprint.language).await?;
            if !results.is_empty() {
                info!("Found {} subtitle(s) via id search for {}", results.len(), fingerprint);
                return Ok(results);
            }
        }

        let Some(params) = Self::title_params(fingerprint) else {
            return Ok(Vec::new());
        };
        let results = self.search_with(&params, TITLE_MATCH_CONFIDENCE, &fingerprint.language).await?;
        info!("Found {} subtitle(s) via title search for {}", results.len(), fingerprint);
        Ok(results)
    }

    async fn download(&self, candidate: &SubtitleCandidate) -> Result<Vec<u8>, ProviderError> {
        let url = candidate
            .download_url
            .clone()
            .unwrap_or_else(|| format!("{}/subtitles/{}/download", self.base_url, candidate.id));
        let url = url.as_str();

        let (content_type, bytes) = with_retry(&self.retry, "SubSource download", move || async move {
            let mut request = self.client.get(url);
            if !self.api_key.is_empty() {
                request = request.bearer_auth(&self.api_key);
            }
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ProviderError::from_status(status.as_u16(), format!("SubSource download of {}", url)));
            }
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Ok((content_type, response.bytes().await?))
        })
        .await?;

        debug!("Downloaded {} bytes for {}", bytes.len(), candidate.name);
        if looks_like_zip(&content_type, &candidate.name, &bytes) {
            return extract_first_srt(&bytes).map_err(|e| ProviderError::ParseError(e.to_string()));
        }
        Ok(bytes.to_vec())
    }
}
