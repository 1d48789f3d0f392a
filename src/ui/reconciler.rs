// Keeps the "now playing" panel in step with the remote widget.
// The widget fills in its metadata lazily, so each field is only
// overwritten once the widget actually has a value for it.

use std::time::{Duration, Instant};

use crate::player::widget::WidgetSnapshot;

pub const SINGLE_VIDEO: &str = "Single video";
pub const NOTHING_PLAYING: &str = "Nothing playing";

// `m:ss`, seconds zero-padded. Negative or non-finite input reads as 0:00.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingView {
    pub title: String,
    pub playlist_position: String,
    pub duration: String,
    pub is_playing: bool,
}

impl Default for NowPlayingView {
    fn default() -> Self {
        NowPlayingView {
            title: NOTHING_PLAYING.to_string(),
            playlist_position: String::new(),
            duration: format_duration(0.0),
            is_playing: false,
        }
    }
}

impl NowPlayingView {
    pub fn apply(&mut self, snapshot: &WidgetSnapshot, is_playing: bool) {
        if !snapshot.title.is_empty() {
            self.title = snapshot.title.clone();
        }

        self.playlist_position = match snapshot.playlist_index {
            Some(index) if snapshot.playlist_len > 0 => {
                format!("Video {} of {}", index + 1, snapshot.playlist_len)
            }
            _ => SINGLE_VIDEO.to_string(),
        };

        if snapshot.duration > 0.0 {
            self.duration = format_duration(snapshot.duration);
        }

        self.is_playing = is_playing;
    }

    // A new source was loaded; forget what the old one looked like
    pub fn reset(&mut self) {
        *self = NowPlayingView::default();
    }
}

// Re-reads the widget every `interval` while it's playing
#[derive(Debug)]
pub struct RefreshPoller {
    interval: Duration,
    last: Option<Instant>,
}

impl RefreshPoller {
    pub fn new(interval: Duration) -> Self {
        RefreshPoller {
            interval,
            last: None,
        }
    }

    pub fn due(&mut self, now: Instant, is_playing: bool) -> bool {
        if !is_playing {
            self.last = None;
            return false;
        }
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
