// Wire types for the backend REST API

use serde::{Deserialize, Serialize};

// Body of `POST /api/history` and `POST /api/favorites`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub title: String,
    pub youtube_url: String,
    pub video_id: Option<String>,
    pub playlist_id: Option<String>,
    pub thumbnail: Option<String>,
}

// A favorite as listed by `GET /api/favorites`.
//
// `id` belongs to the backend; we only ever send it back for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub id: i64,
    pub title: String,
    pub youtube_url: String,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub playlist_id: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, alias = "added_at")]
    pub timestamp: Option<String>,
}

// A play event as listed by `GET /api/history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub title: String,
    pub youtube_url: String,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub playlist_id: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, alias = "played_at")]
    pub timestamp: Option<String>,
}

// A downloaded track as listed by `GET /api/library`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryTrack {
    pub filename: String,
    pub title: String,
    #[serde(default)]
    pub downloaded_at: Option<String>,
}

// A saved playlist as listed by `GET /api/playlists`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPlaylist {
    pub id: i64,
    pub name: String,
    pub youtube_url: String,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub playlist_id: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, alias = "created_at")]
    pub timestamp: Option<String>,
}

// Body of `POST /api/playlists`: a name plus what to play
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewPlaylist<'a> {
    pub name: &'a str,
    pub youtube_url: &'a str,
    pub video_id: Option<&'a str>,
    pub playlist_id: Option<&'a str>,
    pub thumbnail: Option<&'a str>,
}

// Answer to `POST /api/playlists`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistCreated {
    pub id: i64,
    #[serde(default)]
    pub message: String,
}

// `{success, message}` answer to writes that carry user-facing feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

// `{error}` body the backend uses for business failures
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DownloadRequest<'a> {
    pub youtube_url: &'a str,
}

// Result of `POST /api/download-playlist`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistDownload {
    pub total: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// Audio returned by `POST /api/download-audio`
#[derive(Debug, Clone)]
pub struct DownloadedAudio {
    pub filename: String,
    pub bytes: bytes::Bytes,
}

impl DownloadedAudio {
    // Writes the audio into `dir` and returns the full path.
    //
    // Only the final path component of the server-provided name is used.
    pub async fn save_into(&self, dir: &std::path::Path) -> crate::error::Result<std::path::PathBuf> {
        let name = sanitize_filename(&self.filename);
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(name);
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}

fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "audio.mp3".to_string()
    } else {
        cleaned
    }
}

// Formats a backend timestamp as `dd/mm/yyyy hh:mm`.
//
// The backend stores SQLite `CURRENT_TIMESTAMP` values or ISO-8601 strings;
// anything else is shown as-is.
pub fn format_timestamp(raw: &str) -> String {
    use chrono::{DateTime, NaiveDateTime};

    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];
    const DISPLAY: &str = "%d/%m/%Y %H:%M";

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.format(DISPLAY).to_string();
    }
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|parsed| parsed.format(DISPLAY).to_string())
        .unwrap_or_else(|| raw.to_string())
}
