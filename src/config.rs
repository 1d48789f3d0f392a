// Application configuration
// Loaded from <config_dir>/youtube-background-player/config.json, then
// overridden from the environment. A missing file just means defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const APP_DIR: &str = "youtube-background-player";
const CONFIG_FILE: &str = "config.json";

const ENV_BACKEND_URL: &str = "YTBG_BACKEND_URL";
const ENV_DOWNLOAD_DIR: &str = "YTBG_DOWNLOAD_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    // Wait after the widget is ready before reading its metadata
    pub settle_delay_ms: u64,
    // Wait after next/previous before re-reading the widget
    pub refresh_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub visibility_recovery_delay_ms: u64,
    pub notification_ms: u64,
    pub history_limit: u32,
    pub download_dir: Option<PathBuf>,
    pub initial_volume: u8,
    pub ytdlp_binary: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_secs: 30,
            settle_delay_ms: 2000,
            refresh_delay_ms: 500,
            poll_interval_ms: 2000,
            visibility_recovery_delay_ms: 100,
            notification_ms: 3000,
            history_limit: 50,
            download_dir: None,
            initial_volume: 100,
            ytdlp_binary: "yt-dlp".to_string(),
        }
    }
}

impl Config {
    // Load from the default location and apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let data = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    // Log file lives next to other app data so it never touches the terminal
    pub fn log_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
            .join("player.log")
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.trim().is_empty()) {
            self.backend_url = url.trim().to_string();
        }
        if let Some(dir) = lookup(ENV_DOWNLOAD_DIR).filter(|v| !v.trim().is_empty()) {
            self.download_dir = Some(PathBuf::from(dir.trim()));
        }
        self.initial_volume = self.initial_volume.min(100);
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_recovery_delay(&self) -> Duration {
        Duration::from_millis(self.visibility_recovery_delay_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }
}
