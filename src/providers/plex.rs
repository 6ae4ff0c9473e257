/*!
 * Plex Media Server client.
 *
 * Talks to the Plex HTTP API directly: `X-Plex-Token` auth, JSON responses
 * (`Accept: application/json`), subtitle streams are `streamType == 3`.
 */

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::acquisition::{ExistingSubtitle, MediaKind, MediaMetadata};
use crate::app_config::MediaServerConfig;
use crate::errors::ProviderError;
use crate::providers::MediaServer;
use crate::providers::retry::{with_retry, RetryPolicy};

/// Plex stream type for subtitles
const SUBTITLE_STREAM_TYPE: u32 = 3;

/// Plex client
#[derive(Debug, Clone)]
pub struct PlexClient {
    /// Server base URL without trailing slash
    base_url: String,
    token: String,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(rename = "MediaContainer")]
    media_container: MediaContainer,
}

#[derive(Debug, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexItem>,
}

#[derive(Debug, Deserialize)]
struct PlexItem {
    #[serde(rename = "ratingKey")]
    rating_key: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    #[serde(rename = "grandparentTitle")]
    grandparent_title: Option<String>,
    year: Option<u32>,
    #[serde(rename = "parentIndex")]
    parent_index: Option<u32>,
    index: Option<u32>,
    #[serde(rename = "Guid", default)]
    guids: Vec<PlexGuid>,
    #[serde(rename = "Media", default)]
    media: Vec<PlexMedia>,
}

#[derive(Debug, Deserialize)]
struct PlexGuid {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlexMedia {
    #[serde(rename = "Part", default)]
    parts: Vec<PlexPart>,
}

#[derive(Debug, Deserialize)]
struct PlexPart {
    #[serde(rename = "Stream", default)]
    streams: Vec<PlexStream>,
}

#[derive(Debug, Deserialize)]
struct PlexStream {
    id: u64,
    #[serde(rename = "streamType")]
    stream_type: u32,
    #[serde(rename = "languageTag")]
    language_tag: Option<String>,
    #[serde(rename = "languageCode")]
    language_code: Option<String>,
    codec: Option<String>,
    #[serde(default)]
    forced: bool,
    title: Option<String>,
    /// Only sidecar (external) streams carry a key
    key: Option<String>,
}

impl PlexItem {
    fn to_metadata(&self) -> MediaMetadata {
        let kind = MediaKind::from_type_name(&self.kind);
        let title = match kind {
            MediaKind::Episode => self.grandparent_title.clone().unwrap_or_else(|| self.title.clone()),
            _ => self.title.clone(),
        };
        let guid = |scheme: &str| {
            self.guids
                .iter()
                .find_map(|g| g.id.strip_prefix(scheme).map(str::to_string))
        };

        MediaMetadata {
            id: self.rating_key.clone(),
            kind,
            title,
            year: self.year,
            season: self.parent_index.filter(|_| self.kind == "episode"),
            episode: self.index.filter(|_| self.kind == "episode"),
            imdb_id: guid("imdb://"),
            tmdb_id: guid("tmdb://"),
        }
    }

    fn subtitle_streams(&self) -> Vec<ExistingSubtitle> {
        self.media
            .iter()
            .flat_map(|m| m.parts.iter())
            .flat_map(|p| p.streams.iter())
            .filter(|s| s.stream_type == SUBTITLE_STREAM_TYPE)
            .map(|s| ExistingSubtitle {
                stream_id: s.id.to_string(),
                language: s
                    .language_tag
                    .clone()
                    .or_else(|| s.language_code.clone())
                    .unwrap_or_else(|| "und".to_string()),
                codec: s.codec.clone().unwrap_or_default().to_lowercase(),
                forced: s.forced,
                external: s.key.is_some(),
                title: s.title.clone(),
            })
            .collect()
    }
}

impl PlexClient {
    pub fn new(config: &MediaServerConfig, retry: RetryPolicy) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            retry,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/json")
    }

    async fn send(builder: RequestBuilder) -> Result<Response, ProviderError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status.as_u16(), format!("Plex: {}", body.trim())))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let response = Self::send(self.request(Method::GET, path)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Plex response for {}: {}", path, e)))
    }

    async fn fetch_item(&self, media_id: &str) -> Result<PlexItem, ProviderError> {
        let path = format!("/library/metadata/{}", media_id);
        let response: MetadataResponse = with_retry(&self.retry, "Plex metadata", || self.get_json(&path)).await?;
        response
            .media_container
            .metadata
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("Plex item {}", media_id)))
    }

    async fn delete_stream(&self, stream_id: &str) -> Result<(), ProviderError> {
        let path = format!("/library/streams/{}", stream_id);
        Self::send(self.request(Method::DELETE, &path)).await?;
        debug!("Deleted Plex subtitle stream {}", stream_id);
        Ok(())
    }

    async fn refresh(&self, media_id: &str) -> Result<(), ProviderError> {
        let path = format!("/library/metadata/{}/refresh", media_id);
        Self::send(self.request(Method::PUT, &path)).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaServer for PlexClient {
    async fn fetch_metadata(&self, media_id: &str) -> Result<MediaMetadata, ProviderError> {
        Ok(self.fetch_item(media_id).await?.to_metadata())
    }

    async fn existing_subtitles(&self, media_id: &str) -> Result<Vec<ExistingSubtitle>, ProviderError> {
        Ok(self.fetch_item(media_id).await?.subtitle_streams())
    }

    async fn download_subtitle(&self, _media_id: &str, stream: &ExistingSubtitle) -> Result<Vec<u8>, ProviderError> {
        let path = format!("/library/streams/{}", stream.stream_id);
        let path = path.as_str();
        let bytes = with_retry(&self.retry, "Plex stream download", move || async move {
            let response = Self::send(self.request(Method::GET, path)).await?;
            Ok(response.bytes().await?)
        })
        .await?;
        Ok(bytes.to_vec())
    }

    /// Upload first, then remove the external streams of the same language
    /// that existed before. An interrupted call can leave a duplicate behind,
    /// never an item without the subtitle.
    async fn upload_subtitle(
        &self,
        media_id: &str,
        language: &str,
        content: &[u8],
        replace_existing: bool,
    ) -> Result<(), ProviderError> {
        let superseded: Vec<ExistingSubtitle> = if replace_existing {
            self.existing_subtitles(media_id)
                .await?
                .into_iter()
                .filter(|s| s.external && s.is_language(language))
                .collect()
        } else {
            Vec::new()
        };

        let filename = format!("subpilot.{}.srt", language);
        let path = format!("/library/metadata/{}/subtitles", media_id);
        let body = content.to_vec();
        Self::send(
            self.request(Method::POST, &path)
                .query(&[("title", filename.as_str()), ("format", "srt"), ("language", language)])
                .header("Content-Type", "text/plain")
                .body(body),
        )
        .await?;
        info!("Uploaded {} subtitle to Plex item {}", language, media_id);

        for stream in &superseded {
            if let Err(e) = self.delete_stream(&stream.stream_id).await {
                warn!("Could not remove old {} subtitle {} from Plex item {}: {}", language, stream.stream_id, media_id, e);
            }
        }

        if let Err(e) = self.refresh(media_id).await {
            debug!("Plex refresh for {} failed: {}", media_id, e);
        }
        Ok(())
    }
}
