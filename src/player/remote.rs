// ==========================================
// REMOTE PLAYER ADAPTER
// ==========================================
// Owns the one live streaming widget and mirrors its state for the UI.
//
// The adapter never performs side effects outside the widget itself.
// Every command and every widget event returns a list of RemoteEffect
// values that the UI loop carries out: refresh the view, schedule a timer,
// write history, register the media session, show a notification.
//
// Lifecycle:
//   Unloaded → Loading → Ready → Playing ⇄ Paused → Ended → (Playing | next)
//
// Generations:
// - Each load() bumps `generation` and tags the new widget's events with it
// - Every timer carries the generation it was scheduled for
// - Anything arriving with an older generation is ignored, so a callback
//   queued for a replaced source can never act on the new one

use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::models::PlayRecord;
use crate::error::{Error, Result};
use crate::player::widget::{
    EventSink, MediaWidget, TaggedEvent, WidgetConfig, WidgetEvent, WidgetFactory, WidgetSnapshot,
    WidgetState,
};
use crate::youtube::url;

const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePhase {
    Unloaded,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteTimer {
    // Widget metadata should be populated by now: write history, set up media keys
    Settle { generation: u64 },
    // Track change after next/previous isn't observable synchronously
    Refresh { generation: u64 },
    // Backgrounded hosts may suspend playback; check and nudge
    VisibilityCheck { generation: u64 },
}

impl RemoteTimer {
    pub fn generation(&self) -> u64 {
        match self {
            RemoteTimer::Settle { generation }
            | RemoteTimer::Refresh { generation }
            | RemoteTimer::VisibilityCheck { generation } => *generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEffect {
    RefreshUi,
    Schedule { after: Duration, timer: RemoteTimer },
    // Pending timers from older generations can be dropped
    CancelStale { generation: u64 },
    RecordHistory(PlayRecord),
    RegisterMediaSession { title: String },
    Notify(String),
}

// The source currently loaded, recreated on every load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSource {
    pub url: String,
    pub video_id: Option<String>,
    pub playlist_id: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RemoteDelays {
    pub settle: Duration,
    pub refresh: Duration,
    pub visibility: Duration,
}

impl Default for RemoteDelays {
    fn default() -> Self {
        RemoteDelays {
            settle: Duration::from_millis(2000),
            refresh: Duration::from_millis(500),
            visibility: Duration::from_millis(100),
        }
    }
}

pub struct RemotePlayer {
    factory: Box<dyn WidgetFactory>,
    widget: Option<Box<dyn MediaWidget>>,
    source: Option<LoadedSource>,
    phase: RemotePhase,
    generation: u64,
    is_playing: bool,
    // Session-wide preferences, pushed into every new widget once it is ready
    is_shuffle: bool,
    is_repeat: bool,
    volume: u8,
    delays: RemoteDelays,
    events: mpsc::UnboundedSender<TaggedEvent>,
}

impl RemotePlayer {
    pub fn new(
        factory: Box<dyn WidgetFactory>,
        events: mpsc::UnboundedSender<TaggedEvent>,
        delays: RemoteDelays,
        volume: u8,
    ) -> Self {
        RemotePlayer {
            factory,
            widget: None,
            source: None,
            phase: RemotePhase::Unloaded,
            generation: 0,
            is_playing: false,
            is_shuffle: false,
            is_repeat: false,
            volume: volume.min(100),
            delays,
            events,
        }
    }

    // ==========================================
    // LOADING: load()
    // ==========================================
    // Validation happens before anything else: empty or unrecognisable
    // input never touches the widget. Then the old widget goes away, and
    // only then is a new one created, so at most one is ever live.
    pub fn load(&mut self, raw_url: &str) -> Result<Vec<RemoteEffect>> {
        let raw_url = raw_url.trim();
        if raw_url.is_empty() {
            return Err(Error::EmptyUrl);
        }

        let parsed = url::parse(raw_url);
        let source = parsed.source().ok_or(Error::InvalidUrl)?;

        self.teardown();
        self.generation += 1;
        tracing::info!(generation = self.generation, ?source, "loading");

        self.source = Some(LoadedSource {
            url: raw_url.to_string(),
            thumbnail_url: parsed.thumbnail_url(),
            video_id: parsed.video_id,
            playlist_id: parsed.playlist_id,
        });
        self.is_playing = false;
        self.phase = RemotePhase::Loading;

        let sink = EventSink::new(self.generation, self.events.clone());
        self.widget = Some(self.factory.create(WidgetConfig::hidden(source), sink));

        Ok(vec![
            RemoteEffect::CancelStale {
                generation: self.generation,
            },
            RemoteEffect::RefreshUi,
        ])
    }

    fn teardown(&mut self) {
        if let Some(mut widget) = self.widget.take() {
            widget.destroy();
        }
    }

    // ==========================================
    // WIDGET EVENTS
    // ==========================================
    pub fn handle_event(&mut self, tagged: TaggedEvent) -> Vec<RemoteEffect> {
        if tagged.generation != self.generation || self.widget.is_none() {
            tracing::debug!(
                stale = tagged.generation,
                current = self.generation,
                "dropping event from a replaced widget"
            );
            return Vec::new();
        }

        match tagged.event {
            WidgetEvent::Ready => self.on_ready(),
            WidgetEvent::StateChange(state) => self.on_state_change(state),
            WidgetEvent::Error(message) => {
                tracing::warn!(generation = self.generation, "widget error: {}", message);
                vec![RemoteEffect::Notify(message)]
            }
        }
    }

    fn on_ready(&mut self) -> Vec<RemoteEffect> {
        self.phase = RemotePhase::Ready;
        self.is_playing = true;

        let is_playlist = self
            .source
            .as_ref()
            .map(|s| s.playlist_id.is_some())
            .unwrap_or(false);
        if let Some(widget) = self.widget.as_mut() {
            widget.play();
            widget.set_volume(self.volume);
            if is_playlist {
                widget.set_shuffle(self.is_shuffle);
            }
            widget.set_loop(self.is_repeat);
        }

        vec![
            RemoteEffect::RefreshUi,
            RemoteEffect::Schedule {
                after: self.delays.settle,
                timer: RemoteTimer::Settle {
                    generation: self.generation,
                },
            },
        ]
    }

    fn on_state_change(&mut self, state: WidgetState) -> Vec<RemoteEffect> {
        match state {
            WidgetState::Playing => {
                self.phase = RemotePhase::Playing;
                self.is_playing = true;
                vec![RemoteEffect::RefreshUi]
            }
            WidgetState::Paused => {
                self.phase = RemotePhase::Paused;
                self.is_playing = false;
                vec![RemoteEffect::RefreshUi]
            }
            WidgetState::Ended => {
                self.phase = RemotePhase::Ended;
                if self.is_repeat {
                    if let Some(widget) = self.widget.as_mut() {
                        widget.seek_to(0.0);
                        widget.play();
                    }
                    Vec::new()
                } else {
                    self.next()
                }
            }
            WidgetState::Unstarted | WidgetState::Buffering | WidgetState::Cued => Vec::new(),
        }
    }

    // ==========================================
    // TIMERS
    // ==========================================
    pub fn handle_timer(&mut self, timer: RemoteTimer) -> Vec<RemoteEffect> {
        if timer.generation() != self.generation || self.widget.is_none() {
            return Vec::new();
        }

        match timer {
            RemoteTimer::Settle { .. } => {
                let Some(record) = self.play_record() else {
                    return Vec::new();
                };
                vec![
                    RemoteEffect::RegisterMediaSession {
                        title: record.title.clone(),
                    },
                    RemoteEffect::RecordHistory(record),
                ]
            }
            RemoteTimer::Refresh { .. } => vec![RemoteEffect::RefreshUi],
            RemoteTimer::VisibilityCheck { .. } => {
                if let Some(widget) = self.widget.as_mut() {
                    if widget.state() != WidgetState::Playing {
                        tracing::debug!("playback suspended while hidden, resuming");
                        widget.play();
                    }
                }
                Vec::new()
            }
        }
    }

    // Host went to the background while we were playing
    pub fn page_hidden(&mut self) -> Vec<RemoteEffect> {
        if self.widget.is_none() || !self.is_playing {
            return Vec::new();
        }
        vec![RemoteEffect::Schedule {
            after: self.delays.visibility,
            timer: RemoteTimer::VisibilityCheck {
                generation: self.generation,
            },
        }]
    }

    // ==========================================
    // COMMANDS
    // ==========================================
    pub fn toggle_play_pause(&mut self) -> Vec<RemoteEffect> {
        if let Some(widget) = self.widget.as_mut() {
            if self.is_playing {
                widget.pause();
            } else {
                widget.play();
            }
        }
        Vec::new()
    }

    pub fn play(&mut self) {
        if let Some(widget) = self.widget.as_mut() {
            widget.play();
        }
    }

    pub fn pause(&mut self) {
        if let Some(widget) = self.widget.as_mut() {
            widget.pause();
        }
    }

    pub fn next(&mut self) -> Vec<RemoteEffect> {
        match self.widget.as_mut() {
            Some(widget) => {
                widget.next();
                self.delayed_refresh()
            }
            None => Vec::new(),
        }
    }

    pub fn previous(&mut self) -> Vec<RemoteEffect> {
        match self.widget.as_mut() {
            Some(widget) => {
                widget.previous();
                self.delayed_refresh()
            }
            None => Vec::new(),
        }
    }

    fn delayed_refresh(&self) -> Vec<RemoteEffect> {
        vec![RemoteEffect::Schedule {
            after: self.delays.refresh,
            timer: RemoteTimer::Refresh {
                generation: self.generation,
            },
        }]
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.is_shuffle = shuffle;
        if let Some(widget) = self.widget.as_mut() {
            widget.set_shuffle(shuffle);
        }
    }

    // Only meaningful for playlists, but harmless on a single video
    pub fn set_repeat(&mut self, repeat: bool) {
        self.is_repeat = repeat;
        if let Some(widget) = self.widget.as_mut() {
            widget.set_loop(repeat);
        }
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.set_shuffle(!self.is_shuffle);
        self.is_shuffle
    }

    pub fn toggle_repeat(&mut self) -> bool {
        self.set_repeat(!self.is_repeat);
        self.is_repeat
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        if let Some(widget) = self.widget.as_mut() {
            widget.set_volume(self.volume);
        }
    }

    // ==========================================
    // READ SIDE
    // ==========================================

    // What history/favorites get: widget metadata first, parsed URL as fallback
    fn play_record(&self) -> Option<PlayRecord> {
        let source = self.source.as_ref()?;
        let snapshot = self.snapshot().unwrap_or_default();

        let title = if snapshot.title.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            snapshot.title
        };
        let video_id = snapshot.video_id.or_else(|| source.video_id.clone());
        let thumbnail = video_id
            .as_deref()
            .map(url::thumbnail_url)
            .or_else(|| source.thumbnail_url.clone());

        Some(PlayRecord {
            title,
            youtube_url: source.url.clone(),
            video_id,
            playlist_id: source.playlist_id.clone(),
            thumbnail,
        })
    }

    // None when nothing is loaded
    pub fn favorite_record(&self) -> Option<PlayRecord> {
        self.widget.as_ref()?;
        self.play_record()
    }

    pub fn snapshot(&self) -> Option<WidgetSnapshot> {
        self.widget.as_ref().map(|widget| widget.snapshot())
    }

    pub fn source(&self) -> Option<&LoadedSource> {
        self.source.as_ref()
    }

    pub fn phase(&self) -> RemotePhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loaded(&self) -> bool {
        self.widget.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_shuffle(&self) -> bool {
        self.is_shuffle
    }

    pub fn is_repeat(&self) -> bool {
        self.is_repeat
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }
}

impl Drop for RemotePlayer {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::widget::fake::{Call, FakeFactory};

    fn player() -> (RemotePlayer, FakeFactory, mpsc::UnboundedReceiver<TaggedEvent>) {
        let factory = FakeFactory::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let player = RemotePlayer::new(Box::new(factory.clone()), tx, RemoteDelays::default(), 80);
        (player, factory, rx)
    }

    fn event(player: &RemotePlayer, event: WidgetEvent) -> TaggedEvent {
        TaggedEvent {
            generation: player.generation(),
            event,
        }
    }

    #[test]
    fn rejects_empty_and_unparseable_input_without_creating_a_widget() {
        let (mut player, factory, _rx) = player();

        assert!(matches!(player.load("   "), Err(Error::EmptyUrl)));
        assert!(matches!(player.load("https://example.com/video"), Err(Error::InvalidUrl)));
        assert_eq!(factory.live(), 0);
        assert!(factory.last_config().is_none());
        assert_eq!(player.phase(), RemotePhase::Unloaded);
    }

    #[test]
    fn playlist_url_configures_list_type() {
        let (mut player, factory, _rx) = player();
        player.load("https://www.youtube.com/playlist?list=PL123&si=x").unwrap();

        let config = factory.last_config().unwrap();
        assert_eq!(config.list_type(), Some("playlist"));
        assert_eq!(config.list(), Some("PL123"));
        assert_eq!(config.video_id(), None);

        let source = player.source().unwrap();
        assert_eq!(source.playlist_id.as_deref(), Some("PL123"));
        assert_eq!(source.video_id, None);
        assert_eq!(player.phase(), RemotePhase::Loading);
    }

    #[test]
    fn short_link_sets_thumbnail() {
        let (mut player, factory, _rx) = player();
        player.load("https://youtu.be/abc123").unwrap();

        assert_eq!(factory.last_config().unwrap().video_id(), Some("abc123"));
        assert_eq!(
            player.source().unwrap().thumbnail_url.as_deref(),
            Some("https://img.youtube.com/vi/abc123/mqdefault.jpg")
        );
    }

    #[test]
    fn second_load_leaves_exactly_one_widget() {
        let (mut player, factory, _rx) = player();
        player.load("https://youtu.be/first").unwrap();
        player.load("https://youtu.be/second").unwrap();
        player.load("https://www.youtube.com/playlist?list=PL3").unwrap();

        assert_eq!(factory.live(), 1);
        assert_eq!(
            factory.calls().iter().filter(|c| **c == Call::Destroy).count(),
            2
        );
        assert_eq!(player.generation(), 3);
    }

    #[test]
    fn ready_plays_and_schedules_settle() {
        let (mut player, factory, _rx) = player();
        player.load("https://www.youtube.com/playlist?list=PL1").unwrap();
        player.set_repeat(true);
        factory.clear_calls();

        let effects = player.handle_event(event(&player, WidgetEvent::Ready));

        assert!(player.is_playing());
        assert_eq!(player.phase(), RemotePhase::Ready);
        assert_eq!(
            factory.calls(),
            vec![Call::Play, Call::Volume(80), Call::Shuffle(false), Call::Loop(true)]
        );
        assert_eq!(
            effects,
            vec![
                RemoteEffect::RefreshUi,
                RemoteEffect::Schedule {
                    after: Duration::from_millis(2000),
                    timer: RemoteTimer::Settle { generation: 1 },
                },
            ]
        );
    }

    #[test]
    fn settle_writes_history_with_metadata() {
        let (mut player, factory, _rx) = player();
        player.load("https://www.youtube.com/watch?v=abc123&list=PL1").unwrap();
        factory.set_snapshot(WidgetSnapshot {
            title: "Song".into(),
            video_id: Some("def456".into()),
            ..WidgetSnapshot::default()
        });

        let effects = player.handle_timer(RemoteTimer::Settle { generation: 1 });

        let expected = PlayRecord {
            title: "Song".into(),
            youtube_url: "https://www.youtube.com/watch?v=abc123&list=PL1".into(),
            video_id: Some("def456".into()),
            playlist_id: Some("PL1".into()),
            thumbnail: Some("https://img.youtube.com/vi/def456/mqdefault.jpg".into()),
        };
        assert_eq!(
            effects,
            vec![
                RemoteEffect::RegisterMediaSession { title: "Song".into() },
                RemoteEffect::RecordHistory(expected),
            ]
        );
    }

    #[test]
    fn settle_with_empty_metadata_uses_fallbacks() {
        let (mut player, _factory, _rx) = player();
        player.load("https://youtu.be/abc123").unwrap();

        let effects = player.handle_timer(RemoteTimer::Settle { generation: 1 });
        let RemoteEffect::RecordHistory(record) = &effects[1] else {
            panic!("expected a history write, got {:?}", effects);
        };
        assert_eq!(record.title, "Untitled");
        assert_eq!(record.video_id.as_deref(), Some("abc123"));
        assert_eq!(record.playlist_id, None);
    }

    #[test]
    fn stale_settle_timer_is_a_no_op() {
        let (mut player, _factory, _rx) = player();
        player.load("https://youtu.be/first").unwrap();
        player.load("https://youtu.be/second").unwrap();

        assert!(player.handle_timer(RemoteTimer::Settle { generation: 1 }).is_empty());
        assert!(player.handle_timer(RemoteTimer::Refresh { generation: 1 }).is_empty());
        assert!(!player.handle_timer(RemoteTimer::Settle { generation: 2 }).is_empty());
    }

    #[test]
    fn events_from_replaced_widget_are_ignored() {
        let (mut player, _factory, _rx) = player();
        player.load("https://youtu.be/first").unwrap();
        let stale = event(&player, WidgetEvent::Ready);
        player.load("https://youtu.be/second").unwrap();

        assert!(player.handle_event(stale).is_empty());
        assert!(!player.is_playing());
    }

    #[test]
    fn load_cancels_older_timers() {
        let (mut player, _factory, _rx) = player();
        player.load("https://youtu.be/first").unwrap();
        let effects = player.load("https://youtu.be/second").unwrap();
        assert_eq!(effects[0], RemoteEffect::CancelStale { generation: 2 });
    }

    #[test]
    fn state_changes_track_playing_flag() {
        let (mut player, _factory, _rx) = player();
        player.load("https://youtu.be/abc").unwrap();

        let effects = player.handle_event(event(&player, WidgetEvent::StateChange(WidgetState::Playing)));
        assert!(player.is_playing());
        assert_eq!(effects, vec![RemoteEffect::RefreshUi]);

        player.handle_event(event(&player, WidgetEvent::StateChange(WidgetState::Paused)));
        assert!(!player.is_playing());
        assert_eq!(player.phase(), RemotePhase::Paused);

        assert!(player
            .handle_event(event(&player, WidgetEvent::StateChange(WidgetState::Buffering)))
            .is_empty());
    }

    #[test]
    fn ended_with_repeat_restarts_same_source() {
        let (mut player, factory, _rx) = player();
        player.load("https://youtu.be/abc").unwrap();
        player.set_repeat(true);
        factory.clear_calls();

        let effects = player.handle_event(event(&player, WidgetEvent::StateChange(WidgetState::Ended)));

        assert_eq!(factory.calls(), vec![Call::SeekTo(0.0), Call::Play]);
        assert!(effects.is_empty());
    }

    #[test]
    fn ended_without_repeat_advances() {
        let (mut player, factory, _rx) = player();
        player.load("https://www.youtube.com/playlist?list=PL1").unwrap();
        factory.clear_calls();

        let effects = player.handle_event(event(&player, WidgetEvent::StateChange(WidgetState::Ended)));

        assert_eq!(factory.calls(), vec![Call::Next]);
        assert_eq!(
            effects,
            vec![RemoteEffect::Schedule {
                after: Duration::from_millis(500),
                timer: RemoteTimer::Refresh { generation: 1 },
            }]
        );
    }

    #[test]
    fn commands_without_widget_are_no_ops() {
        let (mut player, factory, _rx) = player();
        assert!(player.toggle_play_pause().is_empty());
        assert!(player.next().is_empty());
        assert!(player.previous().is_empty());
        assert!(player.favorite_record().is_none());
        assert!(factory.calls().is_empty());
    }

    #[test]
    fn toggle_follows_local_flag() {
        let (mut player, factory, _rx) = player();
        player.load("https://youtu.be/abc").unwrap();
        factory.clear_calls();

        player.toggle_play_pause();
        player.handle_event(event(&player, WidgetEvent::StateChange(WidgetState::Playing)));
        player.toggle_play_pause();

        assert_eq!(factory.calls(), vec![Call::Play, Call::Pause]);
    }

    #[test]
    fn shuffle_and_repeat_are_forwarded() {
        let (mut player, factory, _rx) = player();
        assert!(player.toggle_repeat());
        player.load("https://www.youtube.com/playlist?list=PL1").unwrap();
        factory.clear_calls();

        assert!(player.toggle_shuffle());
        assert!(!player.toggle_repeat());
        player.set_volume(140);

        assert_eq!(
            factory.calls(),
            vec![Call::Shuffle(true), Call::Loop(false), Call::Volume(100)]
        );
    }

    #[test]
    fn hidden_page_nudges_suspended_playback() {
        let (mut player, factory, _rx) = player();
        player.load("https://youtu.be/abc").unwrap();
        assert!(player.page_hidden().is_empty());

        player.handle_event(event(&player, WidgetEvent::StateChange(WidgetState::Playing)));
        let effects = player.page_hidden();
        assert_eq!(
            effects,
            vec![RemoteEffect::Schedule {
                after: Duration::from_millis(100),
                timer: RemoteTimer::VisibilityCheck { generation: 1 },
            }]
        );

        factory.clear_calls();
        factory.set_state(WidgetState::Paused);
        player.handle_timer(RemoteTimer::VisibilityCheck { generation: 1 });
        assert_eq!(factory.calls(), vec![Call::Play]);

        factory.clear_calls();
        factory.set_state(WidgetState::Playing);
        player.handle_timer(RemoteTimer::VisibilityCheck { generation: 1 });
        assert!(factory.calls().is_empty());
    }

    #[test]
    fn widget_errors_become_notifications() {
        let (mut player, _factory, _rx) = player();
        player.load("https://youtu.be/abc").unwrap();
        let effects = player.handle_event(event(&player, WidgetEvent::Error("Video unavailable".into())));
        assert_eq!(effects, vec![RemoteEffect::Notify("Video unavailable".into())]);
    }
}
