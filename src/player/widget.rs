// ==========================================
// STREAMING WIDGET INTERFACE
// ==========================================
// The remote player never talks to a concrete engine. It creates widgets
// through a WidgetFactory and drives them through MediaWidget, and the
// widget reports back asynchronously through an EventSink.
//
// The real engine (yt-dlp + rodio) initialises asynchronously and only
// fills in its metadata some time after it says "ready". Tests swap in a
// fake widget and fire events by hand.
//
// Every event is tagged with the generation of the load that created the
// widget, so events from a destroyed widget can be told apart and dropped.

use tokio::sync::mpsc;

use crate::youtube::url::PlaybackSource;

// Mirrors the states an embedded player reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Unstarted,
    Buffering,
    Cued,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    Ready,
    StateChange(WidgetState),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: WidgetEvent,
}

// Configuration handed to a new widget. The source is either a video id or a
// playlist, never both; the remaining flags describe a hidden player.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetConfig {
    pub source: PlaybackSource,
    pub autoplay: bool,
    pub controls: bool,
    pub related: bool,
}

impl WidgetConfig {
    pub fn hidden(source: PlaybackSource) -> Self {
        WidgetConfig {
            source,
            autoplay: true,
            controls: false,
            related: false,
        }
    }

    // Same names the embed parameters use
    pub fn list_type(&self) -> Option<&'static str> {
        self.source.is_playlist().then_some("playlist")
    }

    pub fn video_id(&self) -> Option<&str> {
        match &self.source {
            PlaybackSource::Video(id) => Some(id),
            PlaybackSource::Playlist(_) => None,
        }
    }

    pub fn list(&self) -> Option<&str> {
        match &self.source {
            PlaybackSource::Playlist(id) => Some(id),
            PlaybackSource::Video(_) => None,
        }
    }
}

// Metadata a widget exposes. Anything may still be empty right after ready.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetSnapshot {
    pub title: String,
    pub video_id: Option<String>,
    pub duration: f64,
    pub playlist_index: Option<usize>,
    pub playlist_len: usize,
}

#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        EventSink { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: WidgetEvent) {
        // The receiver only goes away when the app is shutting down
        let _ = self.tx.send(TaggedEvent {
            generation: self.generation,
            event,
        });
    }
}

pub trait MediaWidget {
    fn play(&mut self);
    fn pause(&mut self);
    fn next(&mut self);
    fn previous(&mut self);
    fn seek_to(&mut self, seconds: f64);
    fn set_shuffle(&mut self, shuffle: bool);
    fn set_loop(&mut self, repeat: bool);
    fn set_volume(&mut self, volume: u8);
    fn state(&self) -> WidgetState;
    fn snapshot(&self) -> WidgetSnapshot;
    // Must be safe to call more than once
    fn destroy(&mut self);
}

pub trait WidgetFactory {
    fn create(&mut self, config: WidgetConfig, events: EventSink) -> Box<dyn MediaWidget>;
}
