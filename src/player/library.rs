// ==========================================
// LOCAL LIBRARY PLAYER
// ==========================================
// Plays the downloaded tracks the backend serves under
// /api/library/stream/<filename>. Completely independent of the remote
// player: its own track list, its own shuffle/repeat, its own element.
//
// Phase (derived, never stored):
//   Empty → Stopped → Playing ⇄ Paused → (Ended → next | repeat-seek)
//
// Invariant: whenever is_playing is true, current_index points into tracks.
//
// The element is anything implementing MediaElement. In the app it's a
// rodio-backed StreamedElement; tests use a fake that records calls.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::api::models::LibraryTrack;
use crate::error::Result;
use crate::ui::reconciler::format_duration;

// Events an audio element reports while playing
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    LoadedMetadata,
    TimeUpdate,
    Ended,
    Error(String),
}

pub trait MediaElement {
    // Points the element at a new source; loading happens in the background
    fn set_source(&mut self, src: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, seconds: f64);
    // 0.0 - 1.0
    fn set_volume(&mut self, gain: f32);
    fn current_time(&self) -> f64;
    // None until the metadata is known
    fn duration(&self) -> Option<f64>;
    fn poll_events(&mut self) -> Vec<ElementEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryPhase {
    Empty,
    Stopped,
    Playing,
    Paused,
}

pub type StreamUrl = Box<dyn Fn(&str) -> Result<String>>;

pub struct LibraryPlayer<E: MediaElement> {
    element: E,
    stream_url: StreamUrl,
    tracks: Vec<LibraryTrack>,
    current_index: Option<usize>,
    is_playing: bool,
    is_shuffle: bool,
    is_repeat: bool,
    progress: f64,
    duration_label: String,
    volume: u8,
    rng: StdRng,
}

impl<E: MediaElement> LibraryPlayer<E> {
    pub fn new(element: E, stream_url: StreamUrl) -> Self {
        Self::with_rng(element, stream_url, StdRng::from_entropy())
    }

    pub fn with_rng(element: E, stream_url: StreamUrl, rng: StdRng) -> Self {
        LibraryPlayer {
            element,
            stream_url,
            tracks: Vec::new(),
            current_index: None,
            is_playing: false,
            is_shuffle: false,
            is_repeat: false,
            progress: 0.0,
            duration_label: format_duration(0.0),
            volume: 100,
            rng,
        }
    }

    // ==========================================
    // TRACK LIST: set_tracks()
    // ==========================================
    // The list is replaced wholesale on every refresh. If the track that
    // was loaded is still there (matched by filename) we keep playing it and
    // just re-point the index. If it vanished, stop and forget it.
    pub fn set_tracks(&mut self, tracks: Vec<LibraryTrack>) {
        let current_filename = self.current_track().map(|t| t.filename.clone());
        self.tracks = tracks;

        let Some(filename) = current_filename else {
            self.current_index = None;
            self.is_playing = false;
            return;
        };

        match self.tracks.iter().position(|t| t.filename == filename) {
            Some(index) => self.current_index = Some(index),
            None => {
                tracing::info!(%filename, "playing track left the library, stopping");
                self.element.pause();
                self.current_index = None;
                self.is_playing = false;
                self.progress = 0.0;
                self.duration_label = format_duration(0.0);
            }
        }
    }

    // ==========================================
    // PLAYBACK: play_track()
    // ==========================================
    // Out-of-range indexes are ignored. Returns whether anything happened.
    pub fn play_track(&mut self, index: usize) -> bool {
        let Some(track) = self.tracks.get(index) else {
            return false;
        };

        let src = match (self.stream_url)(&track.filename) {
            Ok(src) => src,
            Err(e) => {
                tracing::warn!(filename = %track.filename, "no stream URL: {}", e);
                return false;
            }
        };

        tracing::info!(index, title = %track.title, "library: playing");
        self.element.set_source(&src);
        self.element.play();
        self.current_index = Some(index);
        self.is_playing = true;
        self.progress = 0.0;
        true
    }

    pub fn toggle_play(&mut self) {
        match self.current_index {
            None => {
                if !self.tracks.is_empty() {
                    self.play_track(0);
                }
            }
            Some(_) if self.is_playing => {
                self.element.pause();
                self.is_playing = false;
            }
            Some(_) => {
                self.element.play();
                self.is_playing = true;
            }
        }
    }

    pub fn next(&mut self) {
        if let Some(index) = self.neighbour(1) {
            self.play_track(index);
        }
    }

    pub fn previous(&mut self) {
        if let Some(index) = self.neighbour(-1) {
            self.play_track(index);
        }
    }

    // Shuffle: any index, the current one included. Otherwise ±1, wrapping.
    // With nothing loaded yet, "next" is the first track and "previous" the last.
    fn neighbour(&mut self, delta: isize) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        if self.is_shuffle {
            return Some(self.rng.gen_range(0..len));
        }

        let current = match self.current_index {
            Some(index) => index as isize,
            None if delta > 0 => -1,
            None => 0,
        };
        Some((current + delta).rem_euclid(len as isize) as usize)
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.is_shuffle = shuffle;
    }

    pub fn set_repeat(&mut self, repeat: bool) {
        self.is_repeat = repeat;
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.is_shuffle = !self.is_shuffle;
        self.is_shuffle
    }

    pub fn toggle_repeat(&mut self) -> bool {
        self.is_repeat = !self.is_repeat;
        self.is_repeat
    }

    // ==========================================
    // ELEMENT EVENTS
    // ==========================================
    // Drains the element; anything worth telling the user comes back as a message
    pub fn poll(&mut self) -> Vec<String> {
        let events = self.element.poll_events();
        events
            .into_iter()
            .filter_map(|event| self.handle_element_event(event))
            .collect()
    }

    pub fn handle_element_event(&mut self, event: ElementEvent) -> Option<String> {
        match event {
            ElementEvent::LoadedMetadata | ElementEvent::TimeUpdate => {
                self.update_progress();
                None
            }
            ElementEvent::Ended => {
                if self.current_index.is_none() {
                    return None;
                }
                if self.is_repeat {
                    self.element.seek(0.0);
                    self.element.play();
                    self.is_playing = true;
                } else {
                    self.next();
                }
                None
            }
            ElementEvent::Error(message) => {
                self.is_playing = false;
                let title = self.current_track().map(|t| t.title.clone()).unwrap_or_default();
                Some(format!("Could not play {}: {}", title, message))
            }
        }
    }

    fn update_progress(&mut self) {
        let Some(duration) = self.known_duration() else {
            return;
        };
        self.progress = (self.element.current_time() / duration * 100.0).clamp(0.0, 100.0);
        self.duration_label = format_duration(duration);
    }

    fn known_duration(&self) -> Option<f64> {
        self.element
            .duration()
            .filter(|d| d.is_finite() && *d > 0.0)
    }

    // 0-100 slider position mapped onto the track
    pub fn scrub(&mut self, value: f64) {
        let Some(duration) = self.known_duration() else {
            return;
        };
        let position = value.clamp(0.0, 100.0) / 100.0 * duration;
        self.element.seek(position);
        self.progress = value.clamp(0.0, 100.0);
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        self.element.set_volume(f32::from(self.volume) / 100.0);
    }

    // ==========================================
    // READ SIDE
    // ==========================================
    pub fn tracks(&self) -> &[LibraryTrack] {
        &self.tracks
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_track(&self) -> Option<&LibraryTrack> {
        self.current_index.and_then(|index| self.tracks.get(index))
    }

    // Exactly one row is marked while something is loaded
    pub fn is_current(&self, index: usize) -> bool {
        self.current_index == Some(index)
    }

    pub fn phase(&self) -> LibraryPhase {
        match (self.tracks.is_empty(), self.current_index, self.is_playing) {
            (true, _, _) => LibraryPhase::Empty,
            (false, None, _) => LibraryPhase::Stopped,
            (false, Some(_), true) => LibraryPhase::Playing,
            (false, Some(_), false) => LibraryPhase::Paused,
        }
    }

    pub fn can_navigate(&self) -> bool {
        !self.tracks.is_empty()
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

    pub fn progress_percent(&self) -> f64 {
        self.progress
    }

    pub fn duration_label(&self) -> &str {
        &self.duration_label
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn element(&self) -> &E {
        &self.element
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum ElementCall {
        Source(String),
        Play,
        Pause,
        Seek(f64),
        Volume(f32),
    }

    #[derive(Debug, Default)]
    pub struct FakeElement {
        pub calls: Vec<ElementCall>,
        pub time: f64,
        pub duration: Option<f64>,
        pub pending: Vec<ElementEvent>,
    }

    impl MediaElement for FakeElement {
        fn set_source(&mut self, src: &str) {
            self.calls.push(ElementCall::Source(src.to_string()));
        }
        fn play(&mut self) {
            self.calls.push(ElementCall::Play);
        }
        fn pause(&mut self) {
            self.calls.push(ElementCall::Pause);
        }
        fn seek(&mut self, seconds: f64) {
            self.calls.push(ElementCall::Seek(seconds));
        }
        fn set_volume(&mut self, gain: f32) {
            self.calls.push(ElementCall::Volume(gain));
        }
        fn current_time(&self) -> f64 {
            self.time
        }
        fn duration(&self) -> Option<f64> {
            self.duration
        }
        fn poll_events(&mut self) -> Vec<ElementEvent> {
            std::mem::take(&mut self.pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{ElementCall, FakeElement};
    use super::*;

    fn track(name: &str) -> LibraryTrack {
        LibraryTrack {
            filename: format!("{}.mp3", name),
            title: name.to_string(),
            downloaded_at: None,
        }
    }

    fn library(names: &[&str]) -> LibraryPlayer<FakeElement> {
        let mut player = LibraryPlayer::with_rng(
            FakeElement::default(),
            Box::new(|filename: &str| -> Result<String> {
                Ok(format!("http://backend/api/library/stream/{}", filename))
            }),
            StdRng::seed_from_u64(7),
        );
        player.set_tracks(names.iter().map(|n| track(n)).collect());
        player
    }

    fn calls(player: &mut LibraryPlayer<FakeElement>) -> Vec<ElementCall> {
        std::mem::take(&mut player.element.calls)
    }

    #[test]
    fn play_track_out_of_range_is_a_no_op() {
        let mut player = library(&["a", "b"]);
        assert!(!player.play_track(2));
        assert!(!player.play_track(usize::MAX));
        assert_eq!(player.current_index(), None);
        assert!(!player.is_playing());
        assert!(calls(&mut player).is_empty());
    }

    #[test]
    fn play_track_points_element_at_stream_endpoint() {
        let mut player = library(&["a", "b"]);
        assert!(player.play_track(1));

        assert_eq!(
            calls(&mut player),
            vec![
                ElementCall::Source("http://backend/api/library/stream/b.mp3".into()),
                ElementCall::Play,
            ]
        );
        assert!(player.is_current(1));
        assert!(!player.is_current(0));
        assert_eq!(player.phase(), LibraryPhase::Playing);
    }

    #[test]
    fn toggle_starts_first_track_then_pauses_and_resumes() {
        let mut player = library(&["a", "b", "c"]);
        assert_eq!(player.phase(), LibraryPhase::Stopped);

        player.toggle_play();
        assert_eq!(player.current_index(), Some(0));
        assert!(player.is_playing());

        player.toggle_play();
        assert_eq!(player.phase(), LibraryPhase::Paused);
        player.toggle_play();
        assert!(player.is_playing());

        let all = calls(&mut player);
        assert_eq!(&all[all.len() - 2..], &[ElementCall::Pause, ElementCall::Play]);
    }

    #[test]
    fn sequential_navigation_wraps_both_ways() {
        let mut player = library(&["a", "b", "c"]);
        player.play_track(2);
        player.next();
        assert_eq!(player.current_index(), Some(0));
        player.previous();
        assert_eq!(player.current_index(), Some(2));
        player.previous();
        assert_eq!(player.current_index(), Some(1));
    }

    #[test]
    fn shuffle_stays_in_range() {
        let mut player = library(&["a", "b", "c", "d"]);
        player.set_shuffle(true);
        player.play_track(0);
        for _ in 0..50 {
            player.next();
            let index = player.current_index().unwrap();
            assert!(index < 4);
        }
    }

    #[test]
    fn empty_library_disables_navigation() {
        let mut player = library(&[]);
        assert_eq!(player.phase(), LibraryPhase::Empty);
        assert!(!player.can_navigate());

        player.toggle_play();
        player.next();
        player.previous();
        assert_eq!(player.current_index(), None);
        assert!(calls(&mut player).is_empty());
    }

    #[test]
    fn ended_with_repeat_restarts_same_track() {
        let mut player = library(&["a", "b"]);
        player.play_track(0);
        player.set_repeat(true);
        calls(&mut player);

        player.handle_element_event(ElementEvent::Ended);

        assert_eq!(player.current_index(), Some(0));
        assert_eq!(calls(&mut player), vec![ElementCall::Seek(0.0), ElementCall::Play]);
    }

    #[test]
    fn ended_without_repeat_advances() {
        let mut player = library(&["a", "b"]);
        player.play_track(0);
        player.element.pending.push(ElementEvent::Ended);

        assert!(player.poll().is_empty());
        assert_eq!(player.current_index(), Some(1));
    }

    #[test]
    fn time_update_sets_progress_and_label() {
        let mut player = library(&["a"]);
        player.play_track(0);
        player.element.duration = Some(125.0);
        player.element.time = 25.0;

        player.handle_element_event(ElementEvent::TimeUpdate);

        assert!((player.progress_percent() - 20.0).abs() < 1e-9);
        assert_eq!(player.duration_label(), "2:05");
    }

    #[test]
    fn scrub_needs_a_known_duration() {
        let mut player = library(&["a"]);
        player.play_track(0);
        calls(&mut player);

        player.scrub(50.0);
        assert!(calls(&mut player).is_empty());

        player.element.duration = Some(f64::INFINITY);
        player.scrub(50.0);
        assert!(calls(&mut player).is_empty());

        player.element.duration = Some(200.0);
        player.scrub(25.0);
        assert_eq!(calls(&mut player), vec![ElementCall::Seek(50.0)]);
    }

    #[test]
    fn volume_is_linear_gain() {
        let mut player = library(&["a"]);
        player.set_volume(40);
        player.set_volume(255);
        assert_eq!(
            calls(&mut player),
            vec![ElementCall::Volume(0.4), ElementCall::Volume(1.0)]
        );
        assert_eq!(player.volume(), 100);
    }

    #[test]
    fn refresh_keeps_playing_track_by_filename() {
        let mut player = library(&["a", "b", "c"]);
        player.play_track(1);

        player.set_tracks(vec![track("new"), track("a"), track("b")]);

        assert_eq!(player.current_index(), Some(2));
        assert!(player.is_playing());
        assert_eq!(player.current_track().unwrap().filename, "b.mp3");
    }

    #[test]
    fn refresh_without_playing_track_resets() {
        let mut player = library(&["a", "b", "c"]);
        player.play_track(2);
        calls(&mut player);

        player.set_tracks(vec![track("a")]);

        assert_eq!(player.current_index(), None);
        assert!(!player.is_playing());
        assert_eq!(calls(&mut player), vec![ElementCall::Pause]);
        assert_eq!(player.phase(), LibraryPhase::Stopped);
    }

    #[test]
    fn element_error_stops_and_reports() {
        let mut player = library(&["a"]);
        player.play_track(0);
        let message = player.handle_element_event(ElementEvent::Error("404".into()));
        assert_eq!(message.as_deref(), Some("Could not play a: 404"));
        assert!(!player.is_playing());
    }
}
