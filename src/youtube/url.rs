// YouTube URL parsing
// Pulls a playlist id and/or a video id out of whatever the user pasted.
// An input with neither is not an error here: the empty result is the signal
// and the caller decides how to reject it.

use regex::Regex;
use std::sync::OnceLock;

const THUMBNAIL_BASE: &str = "https://img.youtube.com/vi";

// What the widget should be configured with. Exactly one id, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    Video(String),
    Playlist(String),
}

impl PlaybackSource {
    pub fn is_playlist(&self) -> bool {
        matches!(self, PlaybackSource::Playlist(_))
    }

    pub fn id(&self) -> &str {
        match self {
            PlaybackSource::Video(id) | PlaybackSource::Playlist(id) => id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUrl {
    pub playlist_id: Option<String>,
    pub video_id: Option<String>,
}

impl ParsedUrl {
    // Playlist wins when both are present: the widget plays the whole list
    pub fn source(&self) -> Option<PlaybackSource> {
        if let Some(list) = &self.playlist_id {
            return Some(PlaybackSource::Playlist(list.clone()));
        }
        self.video_id.clone().map(PlaybackSource::Video)
    }

    pub fn is_empty(&self) -> bool {
        self.playlist_id.is_none() && self.video_id.is_none()
    }

    pub fn thumbnail_url(&self) -> Option<String> {
        self.video_id.as_deref().map(thumbnail_url)
    }
}

fn playlist_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[?&]list=([^&]+)").expect("valid playlist regex"))
}

// Tried in order: watch?v=, youtu.be/<id>, /embed/<id>
fn video_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"[?&]v=([^&]+)").expect("valid v= regex"),
            Regex::new(r"youtu\.be/([^?&]+)").expect("valid short-link regex"),
            Regex::new(r"youtube\.com/embed/([^?&]+)").expect("valid embed regex"),
        ]
    })
}

fn first_capture(pattern: &Regex, input: &str) -> Option<String> {
    pattern
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_playlist_id(url: &str) -> Option<String> {
    first_capture(playlist_pattern(), url)
}

pub fn extract_video_id(url: &str) -> Option<String> {
    video_patterns()
        .iter()
        .find_map(|pattern| first_capture(pattern, url))
}

pub fn parse(raw: &str) -> ParsedUrl {
    let url = raw.trim();
    ParsedUrl {
        playlist_id: extract_playlist_id(url),
        video_id: extract_video_id(url),
    }
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("{}/{}/mqdefault.jpg", THUMBNAIL_BASE, video_id)
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

pub fn playlist_url(playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={}", playlist_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_id_ignores_surrounding_params() {
        let urls = [
            "https://www.youtube.com/playlist?list=PL123",
            "https://www.youtube.com/playlist?list=PL123&si=abc",
            "https://www.youtube.com/watch?v=xyz&list=PL123",
            "https://www.youtube.com/watch?v=xyz&list=PL123&index=4&t=10s",
        ];
        for url in urls {
            assert_eq!(extract_playlist_id(url).as_deref(), Some("PL123"), "{url}");
        }
    }

    #[test]
    fn video_id_shapes_agree() {
        let urls = [
            "https://www.youtube.com/watch?v=abc123",
            "https://www.youtube.com/watch?v=abc123&t=42s",
            "https://www.youtube.com/watch?feature=share&v=abc123",
            "https://youtu.be/abc123",
            "https://youtu.be/abc123?si=tracking",
            "https://www.youtube.com/embed/abc123",
            "https://www.youtube.com/embed/abc123?autoplay=1",
        ];
        for url in urls {
            assert_eq!(extract_video_id(url).as_deref(), Some("abc123"), "{url}");
        }
    }

    #[test]
    fn playlist_url_becomes_playlist_source() {
        let parsed = parse("https://www.youtube.com/playlist?list=PL123&si=x");
        assert_eq!(parsed.playlist_id.as_deref(), Some("PL123"));
        assert_eq!(parsed.video_id, None);
        assert_eq!(parsed.source(), Some(PlaybackSource::Playlist("PL123".into())));
        assert_eq!(parsed.thumbnail_url(), None);
    }

    #[test]
    fn short_link_gives_video_and_thumbnail() {
        let parsed = parse("  https://youtu.be/abc123  ");
        assert_eq!(parsed.source(), Some(PlaybackSource::Video("abc123".into())));
        assert_eq!(
            parsed.thumbnail_url().as_deref(),
            Some("https://img.youtube.com/vi/abc123/mqdefault.jpg")
        );
    }

    #[test]
    fn watch_url_with_list_prefers_playlist() {
        let parsed = parse("https://www.youtube.com/watch?v=abc123&list=PL9");
        assert_eq!(parsed.video_id.as_deref(), Some("abc123"));
        assert!(parsed.source().map(|s| s.is_playlist()).unwrap_or(false));
    }

    #[test]
    fn unrecognised_input_is_empty() {
        for input in ["", "hello", "https://vimeo.com/12345", "https://www.youtube.com/"] {
            let parsed = parse(input);
            assert!(parsed.is_empty(), "{input}");
            assert_eq!(parsed.source(), None);
        }
    }

    #[test]
    fn canonical_urls() {
        assert_eq!(watch_url("abc"), "https://www.youtube.com/watch?v=abc");
        assert_eq!(playlist_url("PL1"), "https://www.youtube.com/playlist?list=PL1");
    }
}
