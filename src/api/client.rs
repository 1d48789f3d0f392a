// HTTP client for the player backend
//
// Thin, stateless wrapper over the backend's REST API: history, favorites,
// the downloaded-audio library and the download endpoints. Nothing here
// retries; callers log or surface failures and move on.

use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::api::models::{
    ApiError, ApiMessage, DownloadRequest, DownloadedAudio, FavoriteEntry, HistoryEntry,
    LibraryTrack, NewPlaylist, PlayRecord, PlaylistCreated, PlaylistDownload, SavedPlaylist,
};
use crate::error::{Error, Result};

// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("youtube-background-player/", env!("CARGO_PKG_VERSION"));

const FALLBACK_FILENAME: &str = "audio.mp3";

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    // Create a client for the backend at `base_url` (e.g. `http://127.0.0.1:5000`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Self::with_client(http, base_url)
    }

    // Create a client sharing an existing connection pool
    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("Backend URL cannot be a base: {}", base_url)));
        }
        Ok(Self { http, base })
    }

    pub fn http_client(&self) -> &Client {
        &self.http
    }

    // Each segment is percent-encoded, so filenames with spaces or slashes stay one segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    // ==========================================
    // HISTORY
    // ==========================================

    pub async fn record_history(&self, record: &PlayRecord) -> Result<()> {
        let url = self.endpoint(&["api", "history"]);
        tracing::debug!("Recording history: {}", record.youtube_url);
        let response = self.http.post(url).json(record).send().await?;
        check(response).await?;
        Ok(())
    }

    pub async fn history(&self, limit: Option<u32>) -> Result<Vec<HistoryEntry>> {
        let mut url = self.endpoint(&["api", "history"]);
        if let Some(limit) = limit {
            url.query_pairs_mut().append_pair("limit", &limit.to_string());
        }
        self.get_json(url).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        let url = self.endpoint(&["api", "history"]);
        let response = self.http.delete(url).send().await?;
        check(response).await?;
        Ok(())
    }

    // ==========================================
    // FAVORITES
    // ==========================================

    pub async fn add_favorite(&self, record: &PlayRecord) -> Result<ApiMessage> {
        let url = self.endpoint(&["api", "favorites"]);
        tracing::debug!("Adding favorite: {}", record.youtube_url);
        let response = self.http.post(url).json(record).send().await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn favorites(&self) -> Result<Vec<FavoriteEntry>> {
        self.get_json(self.endpoint(&["api", "favorites"])).await
    }

    pub async fn remove_favorite(&self, id: i64) -> Result<()> {
        let url = self.endpoint(&["api", "favorites", &id.to_string()]);
        let response = self.http.delete(url).send().await?;
        check(response).await?;
        Ok(())
    }

    // ==========================================
    // SAVED PLAYLISTS
    // ==========================================

    pub async fn playlists(&self) -> Result<Vec<SavedPlaylist>> {
        self.get_json(self.endpoint(&["api", "playlists"])).await
    }

    // Saves what `record` points at under `name`; the backend requires both
    pub async fn create_playlist(&self, name: &str, record: &PlayRecord) -> Result<PlaylistCreated> {
        if name.trim().is_empty() {
            return Err(Error::Backend("A playlist needs a name".to_string()));
        }
        let url = self.endpoint(&["api", "playlists"]);
        tracing::debug!(name, "Saving playlist: {}", record.youtube_url);
        let body = NewPlaylist {
            name: name.trim(),
            youtube_url: &record.youtube_url,
            video_id: record.video_id.as_deref(),
            playlist_id: record.playlist_id.as_deref(),
            thumbnail: record.thumbnail.as_deref(),
        };
        let response = self.http.post(url).json(&body).send().await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn delete_playlist(&self, id: i64) -> Result<()> {
        let url = self.endpoint(&["api", "playlists", &id.to_string()]);
        let response = self.http.delete(url).send().await?;
        check(response).await?;
        Ok(())
    }

    // ==========================================
    // LIBRARY
    // ==========================================

    pub async fn library(&self) -> Result<Vec<LibraryTrack>> {
        self.get_json(self.endpoint(&["api", "library"])).await
    }

    // Address the library player streams `filename` from
    pub fn stream_url(&self, filename: &str) -> Url {
        self.endpoint(&["api", "library", "stream", filename])
    }

    pub async fn delete_track(&self, filename: &str) -> Result<()> {
        let url = self.endpoint(&["api", "library", filename]);
        let response = self.http.delete(url).send().await?;
        check(response).await?;
        Ok(())
    }

    // ==========================================
    // DOWNLOADS
    // ==========================================

    // Ask the backend to extract audio for `youtube_url` and return it
    pub async fn download_audio(&self, youtube_url: &str) -> Result<DownloadedAudio> {
        let url = self.endpoint(&["api", "download-audio"]);
        tracing::info!("Downloading audio: {}", youtube_url);
        let response = self
            .http
            .post(url)
            .json(&DownloadRequest { youtube_url })
            .send()
            .await?;
        let response = check(response).await?;

        // A 200 can still carry a JSON error instead of audio
        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        let filename = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition);

        let bytes = response.bytes().await?;
        if is_json {
            if let Ok(err) = serde_json::from_slice::<ApiError>(&bytes) {
                return Err(Error::Backend(err.error));
            }
        }

        Ok(DownloadedAudio {
            filename: filename.unwrap_or_else(|| FALLBACK_FILENAME.to_string()),
            bytes,
        })
    }

    pub async fn download_playlist(&self, youtube_url: &str) -> Result<PlaylistDownload> {
        let url = self.endpoint(&["api", "download-playlist"]);
        tracing::info!("Downloading playlist: {}", youtube_url);
        let response = self
            .http
            .post(url)
            .json(&DownloadRequest { youtube_url })
            .send()
            .await?;
        let body: serde_json::Value = check(response).await?.json().await?;
        if let Ok(err) = serde_json::from_value::<ApiError>(body.clone()) {
            return Err(Error::Backend(err.error));
        }
        Ok(serde_json::from_value(body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.http.get(url).send().await?;
        Ok(check(response).await?.json().await?)
    }
}

// Turns a non-2xx answer into Backend(message) when it carries {error}, Status otherwise
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.unwrap_or_default();
    match serde_json::from_slice::<ApiError>(&body) {
        Ok(err) => Err(Error::Backend(err.error)),
        Err(_) => Err(Error::Status(status)),
    }
}

// Extracts the filename from a Content-Disposition header.
//
// `filename*=UTF-8''...` (RFC 5987) wins over a plain `filename=`.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';').map(str::trim) {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw
                    .trim()
                    .split_once("''")
                    .map(|(_, rest)| rest)
                    .unwrap_or(raw.trim());
                let decoded = percent_decode(encoded.trim_matches('"'));
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
            "filename" => {
                let name = raw.trim().trim_matches('"');
                if !name.is_empty() {
                    plain = Some(name.to_string());
                }
            }
            _ => {}
        }
    }
    plain
}

fn percent_decode(input: &str) -> String {
    url::form_urlencoded::parse(format!("n={}", input.replace('+', "%2B")).as_bytes())
        .find(|(key, _)| key == "n")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}
