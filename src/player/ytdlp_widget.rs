// ==========================================
// YT-DLP STREAMING WIDGET
// ==========================================
// The real MediaWidget. It behaves like an embedded player: it is created
// for one source, initialises in the background, says Ready once it knows
// what it is going to play, and reports state changes as they happen.
//
// How it works:
// 1. create() spawns a worker task and returns immediately
// 2. The worker asks yt-dlp for the video (or the flat playlist) and
//    publishes the entries into shared metadata, then emits Ready
// 3. Commands (play, next, ...) travel to the worker over a channel
// 4. Playing an entry = resolve its audio URL, download it, hand it to
//    an AudioOutput
// 5. A 250ms ticker notices when the output runs dry and emits Ended
//
// destroy() drops the command channel; the worker stops its output and exits.

use rand::seq::SliceRandom;
use rodio::OutputStreamHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::player::audio::{AudioOutput, PlayerState};
use crate::player::widget::{
    EventSink, MediaWidget, WidgetConfig, WidgetEvent, WidgetFactory, WidgetSnapshot, WidgetState,
};
use crate::youtube::extractor::{VideoInfo, YouTubeExtractor};

const END_CHECK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug)]
enum Command {
    Play,
    Pause,
    Next,
    Previous,
    SeekTo(f64),
    Shuffle(bool),
    Loop(bool),
    Volume(u8),
}

// What the UI thread can read without asking the worker.
// `order` is the play order (shuffled or not), `cursor` indexes into it.
#[derive(Debug)]
struct Shared {
    state: WidgetState,
    entries: Vec<VideoInfo>,
    order: Vec<usize>,
    cursor: usize,
    is_playlist: bool,
    duration: f64,
}

impl Shared {
    fn new(is_playlist: bool) -> Self {
        Shared {
            state: WidgetState::Unstarted,
            entries: Vec::new(),
            order: Vec::new(),
            cursor: 0,
            is_playlist,
            duration: 0.0,
        }
    }

    fn current(&self) -> Option<&VideoInfo> {
        self.order
            .get(self.cursor)
            .and_then(|index| self.entries.get(*index))
    }

    fn snapshot(&self) -> WidgetSnapshot {
        let current = self.current();
        WidgetSnapshot {
            title: current.map(|v| v.title.clone()).unwrap_or_default(),
            video_id: current.map(|v| v.id.clone()),
            duration: if self.duration > 0.0 {
                self.duration
            } else {
                current.map(|v| v.duration).unwrap_or(0.0)
            },
            playlist_index: (self.is_playlist && current.is_some()).then_some(self.cursor),
            playlist_len: if self.is_playlist { self.entries.len() } else { 0 },
        }
    }

    // Current entry first, the rest in random order; turning shuffle off
    // restores playlist order without changing what is playing
    fn reorder(&mut self, shuffle: bool) {
        let current = self.order.get(self.cursor).copied();
        if shuffle {
            let mut rest: Vec<usize> = (0..self.entries.len())
                .filter(|index| Some(*index) != current)
                .collect();
            rest.shuffle(&mut rand::thread_rng());
            self.order = current.into_iter().chain(rest).collect();
            self.cursor = 0;
        } else {
            self.order = (0..self.entries.len()).collect();
            self.cursor = current.unwrap_or(0);
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> std::sync::MutexGuard<'_, Shared> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct YtDlpWidget {
    commands: Option<mpsc::UnboundedSender<Command>>,
    shared: Arc<Mutex<Shared>>,
    destroyed: Arc<AtomicBool>,
}

impl YtDlpWidget {
    fn send(&self, command: Command) {
        if let Some(tx) = &self.commands {
            if tx.send(command).is_err() {
                tracing::debug!("widget worker already gone");
            }
        }
    }
}

impl MediaWidget for YtDlpWidget {
    fn play(&mut self) {
        self.send(Command::Play);
    }

    fn pause(&mut self) {
        self.send(Command::Pause);
    }

    fn next(&mut self) {
        self.send(Command::Next);
    }

    fn previous(&mut self) {
        self.send(Command::Previous);
    }

    fn seek_to(&mut self, seconds: f64) {
        self.send(Command::SeekTo(seconds));
    }

    fn set_shuffle(&mut self, shuffle: bool) {
        self.send(Command::Shuffle(shuffle));
    }

    fn set_loop(&mut self, repeat: bool) {
        self.send(Command::Loop(repeat));
    }

    fn set_volume(&mut self, volume: u8) {
        self.send(Command::Volume(volume));
    }

    fn state(&self) -> WidgetState {
        lock(&self.shared).state
    }

    fn snapshot(&self) -> WidgetSnapshot {
        lock(&self.shared).snapshot()
    }

    fn destroy(&mut self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.commands = None;
    }
}

impl Drop for YtDlpWidget {
    fn drop(&mut self) {
        self.destroy();
    }
}

struct Worker {
    extractor: YouTubeExtractor,
    http: reqwest::Client,
    audio: AudioOutput,
    shared: Arc<Mutex<Shared>>,
    destroyed: Arc<AtomicBool>,
    events: EventSink,
    commands: mpsc::UnboundedReceiver<Command>,
    repeat: bool,
    // Pause arrived while buffering: load the entry but don't start it
    hold: bool,
}

// What woke the worker up
enum Wake {
    Command(Option<Command>),
    Tick,
}

// What happened while an entry was downloading
enum Buffering {
    Fetched(Result<bytes::Bytes>),
    Command(Option<Command>),
}

impl Worker {
    async fn run(mut self, config: WidgetConfig) {
        let generation = self.events.generation();

        let entries = match self.extractor.resolve(&config.source).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(generation, "failed to resolve {:?}: {}", config.source, e);
                self.events.emit(WidgetEvent::Error(e.to_string()));
                return;
            }
        };
        if self.is_destroyed() {
            return;
        }

        tracing::debug!(generation, entries = entries.len(), "widget ready");
        {
            let mut shared = lock(&self.shared);
            shared.order = (0..entries.len()).collect();
            shared.entries = entries;
            shared.cursor = 0;
            shared.state = WidgetState::Cued;
        }
        self.events.emit(WidgetEvent::Ready);

        if config.autoplay {
            self.start_current().await;
        }

        let mut ticker = tokio::time::interval(END_CHECK_INTERVAL);
        while !self.is_destroyed() {
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                _ = ticker.tick() => Wake::Tick,
            };
            match wake {
                Wake::Command(Some(command)) => self.handle(command).await,
                Wake::Command(None) => break,
                Wake::Tick => self.check_ended(),
            }
        }

        self.audio.stop();
        tracing::debug!(generation, "widget worker exited");
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: WidgetState) {
        let changed = {
            let mut shared = lock(&self.shared);
            let changed = shared.state != state;
            shared.state = state;
            changed
        };
        if changed {
            self.events.emit(WidgetEvent::StateChange(state));
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Play => match self.audio.state() {
                PlayerState::Playing | PlayerState::Loading => {}
                _ if self.audio.has_source() => match self.audio.resume() {
                    Ok(()) => self.set_state(WidgetState::Playing),
                    Err(e) => self.events.emit(WidgetEvent::Error(e.to_string())),
                },
                _ => self.start_current().await,
            },
            Command::Pause => {
                if self.audio.state() == PlayerState::Playing {
                    self.audio.pause();
                    self.set_state(WidgetState::Paused);
                } else if lock(&self.shared).state == WidgetState::Ended {
                    // Nothing to pause, but the owner should stop treating
                    // us as playing so its next toggle sends Play
                    self.set_state(WidgetState::Paused);
                }
            }
            Command::Next => {
                if self.step(1) {
                    self.start_current().await;
                }
            }
            Command::Previous => {
                if self.step(-1) {
                    self.start_current().await;
                }
            }
            Command::SeekTo(seconds) => {
                if let Err(e) = self.audio.seek(seconds) {
                    tracing::warn!("seek failed: {}", e);
                }
            }
            Command::Shuffle(shuffle) => lock(&self.shared).reorder(shuffle),
            Command::Loop(repeat) => self.repeat = repeat,
            Command::Volume(volume) => self.audio.set_volume(volume),
        }
    }

    // Moves the cursor; false when there is nowhere to go. Looping wraps
    // around the ends of the list, otherwise the ends are hard stops.
    fn step(&self, delta: isize) -> bool {
        let mut shared = lock(&self.shared);
        let len = shared.order.len();
        if len == 0 {
            return false;
        }

        let target = shared.cursor as isize + delta;
        let next = if (0..len as isize).contains(&target) {
            target as usize
        } else if self.repeat {
            target.rem_euclid(len as isize) as usize
        } else if delta < 0 {
            // previous() on the first entry restarts it
            0
        } else {
            return false;
        };

        shared.cursor = next;
        shared.duration = 0.0;
        true
    }

    // ==========================================
    // STARTING AN ENTRY: start_current()
    // ==========================================
    // The download races incoming commands. Next/Previous abandon it and
    // start over on the new cursor, Pause lets it finish without playing,
    // and a dropped channel (destroy) abandons it for good.
    async fn start_current(&mut self) {
        self.hold = false;

        loop {
            let Some(entry) = lock(&self.shared).current().cloned() else {
                return;
            };

            self.audio.unload();
            self.set_state(if self.hold {
                WidgetState::Paused
            } else {
                WidgetState::Buffering
            });

            let fetch = Self::fetch(self.extractor.clone(), self.http.clone(), entry.url.clone());
            tokio::pin!(fetch);

            let fetched = loop {
                let wake = tokio::select! {
                    fetched = &mut fetch => Buffering::Fetched(fetched),
                    command = self.commands.recv() => Buffering::Command(command),
                };
                match wake {
                    Buffering::Fetched(fetched) => break Some(fetched),
                    Buffering::Command(None) => {
                        tracing::debug!(video_id = %entry.id, "download abandoned");
                        return;
                    }
                    Buffering::Command(Some(command)) => match command {
                        Command::Next if self.step(1) => break None,
                        Command::Previous if self.step(-1) => break None,
                        Command::Next | Command::Previous | Command::SeekTo(_) => {}
                        Command::Pause => {
                            self.hold = true;
                            self.set_state(WidgetState::Paused);
                        }
                        Command::Play => {
                            self.hold = false;
                            self.set_state(WidgetState::Buffering);
                        }
                        Command::Shuffle(shuffle) => lock(&self.shared).reorder(shuffle),
                        Command::Loop(repeat) => self.repeat = repeat,
                        Command::Volume(volume) => self.audio.set_volume(volume),
                    },
                }
            };

            // Superseded by Next/Previous
            let Some(fetched) = fetched else {
                continue;
            };
            if self.is_destroyed() {
                return;
            }

            self.begin(&entry, fetched);
            return;
        }
    }

    fn begin(&mut self, entry: &VideoInfo, fetched: Result<bytes::Bytes>) {
        let hold = self.hold;
        let started = fetched.and_then(|bytes| {
            self.audio.load(bytes)?;
            if hold {
                Ok(())
            } else {
                self.audio.play_from(0.0)
            }
        });

        match started {
            Ok(()) => {
                if let Some(duration) = self.audio.duration() {
                    lock(&self.shared).duration = duration;
                }
                tracing::info!(video_id = %entry.id, title = %entry.title, hold, "now playing");
                self.set_state(if hold {
                    WidgetState::Paused
                } else {
                    WidgetState::Playing
                });
            }
            Err(e) => {
                tracing::warn!(video_id = %entry.id, "failed to start: {}", e);
                self.set_state(WidgetState::Unstarted);
                self.events.emit(WidgetEvent::Error(format!("{}: {}", entry.title, e)));
            }
        }
    }

    async fn fetch(extractor: YouTubeExtractor, http: reqwest::Client, url: String) -> Result<bytes::Bytes> {
        let audio_url = extractor.get_audio_url(&url).await?;
        let response = http.get(&audio_url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Status(response.status()));
        }
        Ok(response.bytes().await?)
    }

    fn check_ended(&mut self) {
        if self.audio.poll_ended() {
            self.set_state(WidgetState::Ended);
        }
    }
}

pub struct YtDlpFactory {
    extractor: YouTubeExtractor,
    http: reqwest::Client,
    output: Option<OutputStreamHandle>,
}

impl YtDlpFactory {
    pub fn new(extractor: YouTubeExtractor, http: reqwest::Client, output: Option<OutputStreamHandle>) -> Self {
        YtDlpFactory {
            extractor,
            http,
            output,
        }
    }
}

impl WidgetFactory for YtDlpFactory {
    fn create(&mut self, config: WidgetConfig, events: EventSink) -> Box<dyn MediaWidget> {
        tracing::debug!(
            generation = events.generation(),
            list_type = ?config.list_type(),
            id = config.source.id(),
            "creating widget"
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::new(config.source.is_playlist())));
        let destroyed = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            extractor: self.extractor.clone(),
            http: self.http.clone(),
            audio: AudioOutput::new(self.output.as_ref()),
            shared: Arc::clone(&shared),
            destroyed: Arc::clone(&destroyed),
            events,
            commands: rx,
            repeat: false,
            hold: false,
        };
        tokio::spawn(worker.run(config));

        Box::new(YtDlpWidget {
            commands: Some(tx),
            shared,
            destroyed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::widget::TaggedEvent;
    use crate::youtube::url::PlaybackSource;

    fn entry(id: &str, duration: f64) -> VideoInfo {
        VideoInfo {
            id: id.to_string(),
            title: format!("Title {}", id),
            duration,
            uploader: "Someone".to_string(),
            thumbnail: None,
            url: crate::youtube::url::watch_url(id),
        }
    }

    fn playlist(ids: &[&str]) -> Shared {
        let mut shared = Shared::new(true);
        shared.entries = ids.iter().map(|id| entry(id, 60.0)).collect();
        shared.order = (0..ids.len()).collect();
        shared
    }

    #[test]
    fn empty_widget_snapshot_is_blank() {
        let shared = Shared::new(false);
        assert_eq!(shared.snapshot(), WidgetSnapshot::default());
    }

    #[test]
    fn playlist_snapshot_reports_position() {
        let mut shared = playlist(&["a", "b", "c"]);
        shared.cursor = 1;
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.title, "Title b");
        assert_eq!(snapshot.video_id.as_deref(), Some("b"));
        assert_eq!(snapshot.playlist_index, Some(1));
        assert_eq!(snapshot.playlist_len, 3);
        assert_eq!(snapshot.duration, 60.0);
    }

    #[test]
    fn single_video_has_no_playlist_position() {
        let mut shared = Shared::new(false);
        shared.entries = vec![entry("solo", 125.0)];
        shared.order = vec![0];
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.playlist_index, None);
        assert_eq!(snapshot.playlist_len, 0);
    }

    #[test]
    fn shuffle_keeps_current_entry_and_unshuffle_restores_order() {
        let mut shared = playlist(&["a", "b", "c", "d", "e"]);
        shared.cursor = 2;

        shared.reorder(true);
        assert_eq!(shared.current().map(|v| v.id.as_str()), Some("c"));
        let mut sorted = shared.order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);

        shared.reorder(false);
        assert_eq!(shared.order, vec![0, 1, 2, 3, 4]);
        assert_eq!(shared.current().map(|v| v.id.as_str()), Some("c"));
    }

    fn idle_worker(shared: Shared) -> (Worker, mpsc::UnboundedReceiver<TaggedEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (_commands_tx, commands_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            extractor: YouTubeExtractor::new("yt-dlp"),
            http: reqwest::Client::new(),
            audio: AudioOutput::new(None),
            shared: Arc::new(Mutex::new(shared)),
            destroyed: Arc::new(AtomicBool::new(false)),
            events: EventSink::new(3, events_tx),
            commands: commands_rx,
            repeat: false,
            hold: false,
        };
        (worker, events_rx)
    }

    #[tokio::test]
    async fn pause_after_the_end_reports_paused() {
        let mut shared = playlist(&["a", "b"]);
        shared.cursor = 1;
        shared.state = WidgetState::Ended;
        let (mut worker, mut events) = idle_worker(shared);

        worker.handle(Command::Pause).await;

        assert_eq!(lock(&worker.shared).state, WidgetState::Paused);
        assert_eq!(
            events.try_recv().unwrap(),
            TaggedEvent {
                generation: 3,
                event: WidgetEvent::StateChange(WidgetState::Paused)
            }
        );
    }

    #[tokio::test]
    async fn pause_with_nothing_playing_is_ignored() {
        let mut shared = playlist(&["a"]);
        shared.state = WidgetState::Cued;
        let (mut worker, mut events) = idle_worker(shared);

        worker.handle(Command::Pause).await;

        assert_eq!(lock(&worker.shared).state, WidgetState::Cued);
        assert!(events.try_recv().is_err());
    }

    // A yt-dlp stand-in: instant playlist dump, slow audio URL lookup
    #[cfg(unix)]
    fn slow_extractor(dir: &tempfile::TempDir) -> YouTubeExtractor {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("yt-dlp");
        let script = r#"#!/bin/sh
case "$1" in
  -J) echo '{"entries":[{"id":"aaa","title":"A"},{"id":"bbb","title":"B"},{"id":"ccc","title":"C"}]}' ;;
  --get-url) sleep 2; echo "http://127.0.0.1:9/audio" ;;
  *) exit 1 ;;
esac
"#;
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        YouTubeExtractor::new(path.to_string_lossy().into_owned())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn commands_are_handled_while_downloading() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = YtDlpFactory::new(slow_extractor(&dir), reqwest::Client::new(), None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut widget = factory.create(
            WidgetConfig::hidden(PlaybackSource::Playlist("PLslow".into())),
            EventSink::new(1, tx),
        );

        let ready = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(tagged) = rx.recv().await {
                if tagged.event == WidgetEvent::Ready {
                    return true;
                }
            }
            false
        })
        .await;
        assert!(matches!(ready, Ok(true)));

        // Well inside the first download, which takes two seconds
        widget.next();
        widget.next();
        let mut index = None;
        for _ in 0..100 {
            index = widget.snapshot().playlist_index;
            if index == Some(2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(index, Some(2));
        assert_eq!(widget.state(), WidgetState::Buffering);

        widget.pause();
        for _ in 0..100 {
            if widget.state() == WidgetState::Paused {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(widget.state(), WidgetState::Paused);

        widget.destroy();
    }
}
