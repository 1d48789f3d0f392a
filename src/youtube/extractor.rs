// YouTube source extractor
// Uses a yt-dlp subprocess to resolve videos, playlists and audio stream URLs.
// Every call runs in a blocking task so the UI loop never waits on a process.

use serde::{Deserialize, Serialize};
use std::process::Command;

use crate::error::{Error, Result};
use crate::youtube::url::{playlist_url, watch_url, PlaybackSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub duration: f64,
    pub uploader: String,
    pub thumbnail: Option<String>,
    pub url: String,
}

impl VideoInfo {
    // yt-dlp gives floats for flat playlist entries and ints for full dumps
    fn from_json(json: &serde_json::Value) -> Option<Self> {
        let id = json["id"].as_str()?.to_string();
        if id.is_empty() {
            return None;
        }

        Some(VideoInfo {
            title: json["title"].as_str().unwrap_or("Unknown").to_string(),
            duration: json["duration"].as_f64().unwrap_or(0.0),
            uploader: json["uploader"]
                .as_str()
                .or_else(|| json["channel"].as_str())
                .unwrap_or("Unknown")
                .to_string(),
            thumbnail: json["thumbnail"].as_str().map(|s| s.to_string()),
            url: watch_url(&id),
            id,
        })
    }
}

// Pull the entries out of a `yt-dlp -J --flat-playlist` dump, skipping
// private/deleted placeholders that come back without an id
fn playlist_entries_from_json(json: &serde_json::Value) -> Vec<VideoInfo> {
    json["entries"]
        .as_array()
        .map(|entries| entries.iter().filter_map(VideoInfo::from_json).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct YouTubeExtractor {
    binary: String,
}

impl YouTubeExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        YouTubeExtractor {
            binary: binary.into(),
        }
    }

    pub async fn get_audio_url(&self, video_url: &str) -> Result<String> {
        let stdout = self
            .run(vec![
                "--get-url".into(),
                "-f".into(),
                "bestaudio/best".into(),
                "--no-playlist".into(),
                video_url.to_string(),
            ])
            .await?;

        // Some formats print more than one URL; the first one is the audio
        let url = stdout.lines().next().unwrap_or("").trim().to_string();
        if url.is_empty() {
            return Err(Error::Extractor("returned empty URL".to_string()));
        }

        Ok(url)
    }

    pub async fn get_video_info(&self, video_url: &str) -> Result<VideoInfo> {
        let stdout = self
            .run(vec!["-j".into(), "--no-playlist".into(), video_url.to_string()])
            .await?;

        let json: serde_json::Value = serde_json::from_str(stdout.trim())?;
        VideoInfo::from_json(&json)
            .ok_or_else(|| Error::Extractor(format!("no video id in metadata for {}", video_url)))
    }

    pub async fn get_playlist_entries(&self, playlist_id: &str) -> Result<Vec<VideoInfo>> {
        let stdout = self
            .run(vec![
                "-J".into(),
                "--flat-playlist".into(),
                playlist_url(playlist_id),
            ])
            .await?;

        let json: serde_json::Value = serde_json::from_str(stdout.trim())?;
        let entries = playlist_entries_from_json(&json);
        if entries.is_empty() {
            return Err(Error::Extractor(format!("playlist {} has no playable entries", playlist_id)));
        }

        Ok(entries)
    }

    // Whatever the widget was configured with, as an ordered list of videos
    pub async fn resolve(&self, source: &PlaybackSource) -> Result<Vec<VideoInfo>> {
        match source {
            PlaybackSource::Video(id) => Ok(vec![self.get_video_info(&watch_url(id)).await?]),
            PlaybackSource::Playlist(id) => self.get_playlist_entries(id).await,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<String> {
        let binary = self.binary.clone();
        tracing::debug!(binary = %binary, ?args, "running extractor");

        tokio::task::spawn_blocking(move || {
            let output = Command::new(&binary)
                .args(&args)
                .output()
                .map_err(|e| Error::Extractor(format!("failed to run {}: {}. Is it installed?", binary, e)))?;

            if !output.status.success() {
                let error = String::from_utf8_lossy(&output.stderr);
                return Err(Error::Extractor(error.trim().to_string()));
            }

            String::from_utf8(output.stdout)
                .map_err(|e| Error::Extractor(format!("invalid UTF-8: {}", e)))
        })
        .await
        .map_err(|e| Error::Extractor(format!("task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_playlist_entries_are_parsed_in_order() {
        let dump = json!({
            "id": "PL123",
            "title": "Road trip",
            "entries": [
                { "id": "aaa", "title": "First", "duration": 201.0, "channel": "Band" },
                { "id": "bbb", "title": "Second", "duration": null, "uploader": "Other" },
                { "title": "[Private video]" },
                { "id": "ccc" }
            ]
        });

        let entries = playlist_entries_from_json(&dump);
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["aaa", "bbb", "ccc"]);
        assert_eq!(entries[0].uploader, "Band");
        assert_eq!(entries[0].duration, 201.0);
        assert_eq!(entries[1].duration, 0.0);
        assert_eq!(entries[2].title, "Unknown");
        assert_eq!(entries[0].url, "https://www.youtube.com/watch?v=aaa");
    }

    #[test]
    fn dump_without_entries_is_empty() {
        assert!(playlist_entries_from_json(&json!({ "id": "x" })).is_empty());
    }

    #[tokio::test]
    async fn missing_binary_is_an_extractor_error() {
        let extractor = YouTubeExtractor::new("definitely-not-yt-dlp-on-this-machine");
        let err = extractor.get_audio_url("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, Error::Extractor(_)));
    }
}
