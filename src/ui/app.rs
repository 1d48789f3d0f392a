// Main TUI application using ratatui
// Owns both players, runs their effects, and talks to the backend on
// background tasks. Everything the players ask for (timers, history writes,
// media keys, notifications) is carried out here.

use anyhow::Context;
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use rodio::OutputStreamHandle;
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::api::models::{format_timestamp, FavoriteEntry, HistoryEntry, LibraryTrack, SavedPlaylist};
use crate::api::ApiClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::player::audio::AudioOutput;
use crate::player::element::StreamedElement;
use crate::player::library::{LibraryPhase, LibraryPlayer};
use crate::player::remote::{RemoteDelays, RemoteEffect, RemotePhase, RemotePlayer, RemoteTimer};
use crate::player::session::{MediaSession, SessionAction};
use crate::player::timers::TimerQueue;
use crate::player::widget::{TaggedEvent, WidgetFactory};
use crate::player::ytdlp_widget::YtDlpFactory;
use crate::ui::input::{map_key, Focus, Shortcut};
use crate::ui::reconciler::{NowPlayingView, RefreshPoller};
use crate::ui::tabs::{ListRefresh, Tab, TabController};
use crate::youtube::extractor::YouTubeExtractor;
use crate::youtube::url;

const VOLUME_STEP: u8 = 5;
const SCRUB_STEP: f64 = 5.0;
const INPUT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppMode {
    Normal,
    UrlInput,
    ConfirmClearHistory,
}

// Results of background backend calls
#[derive(Debug)]
enum ApiResponse {
    Favorites(Vec<FavoriteEntry>),
    History(Vec<HistoryEntry>),
    Library(Vec<LibraryTrack>),
    Playlists(Vec<SavedPlaylist>),
    Reload(ListRefresh),
    Notify(String),
}

pub struct MusicPlayerApp {
    config: Config,
    api: ApiClient,
    remote: RemotePlayer,
    library: LibraryPlayer<StreamedElement>,
    timers: TimerQueue<RemoteTimer>,
    session: MediaSession,
    session_playing: Option<bool>,
    tabs: TabController,
    now_playing: NowPlayingView,
    poller: RefreshPoller,
    favorites: Vec<FavoriteEntry>,
    history: Vec<HistoryEntry>,
    playlists: Vec<SavedPlaylist>,
    selected_favorite: usize,
    selected_history: usize,
    selected_track: usize,
    selected_playlist: usize,
    url_input: String,
    mode: AppMode,
    should_quit: bool,
    // Blocking message, stays until the next key press
    status_message: String,
    toast: Option<(String, Instant)>,
    widget_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    api_rx: mpsc::UnboundedReceiver<ApiResponse>,
    api_tx: mpsc::UnboundedSender<ApiResponse>,
}

impl MusicPlayerApp {
    pub fn new(config: Config, output: Option<OutputStreamHandle>) -> Result<Self> {
        let api = ApiClient::new(&config.backend_url, config.request_timeout())?;
        let extractor = YouTubeExtractor::new(config.ytdlp_binary.clone());
        let factory = YtDlpFactory::new(extractor, api.http_client().clone(), output.clone());
        Self::with_factory(config, api, Box::new(factory), output)
    }

    pub fn with_factory(
        config: Config,
        api: ApiClient,
        factory: Box<dyn WidgetFactory>,
        output: Option<OutputStreamHandle>,
    ) -> Result<Self> {
        let (widget_tx, widget_rx) = mpsc::unbounded_channel();
        let (api_tx, api_rx) = mpsc::unbounded_channel();

        let delays = RemoteDelays {
            settle: config.settle_delay(),
            refresh: config.refresh_delay(),
            visibility: config.visibility_recovery_delay(),
        };
        let remote = RemotePlayer::new(factory, widget_tx, delays, config.initial_volume);

        let element = StreamedElement::new(
            api.http_client().clone(),
            AudioOutput::new(output.as_ref()),
        );
        let stream_api = api.clone();
        let mut library = LibraryPlayer::new(
            element,
            Box::new(move |filename: &str| -> Result<String> {
                Ok(stream_api.stream_url(filename).to_string())
            }),
        );
        library.set_volume(config.initial_volume);

        Ok(MusicPlayerApp {
            poller: RefreshPoller::new(config.poll_interval()),
            config,
            api,
            remote,
            library,
            timers: TimerQueue::new(),
            session: MediaSession::new(),
            session_playing: None,
            tabs: TabController::default(),
            now_playing: NowPlayingView::default(),
            favorites: Vec::new(),
            history: Vec::new(),
            playlists: Vec::new(),
            selected_favorite: 0,
            selected_history: 0,
            selected_track: 0,
            selected_playlist: 0,
            url_input: String::new(),
            mode: AppMode::Normal,
            should_quit: false,
            status_message: String::new(),
            toast: None,
            widget_rx,
            api_rx,
            api_tx,
        })
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        self.reload(ListRefresh::Favorites);
        self.reload(ListRefresh::History);
        self.reload(ListRefresh::Library);
        self.reload(ListRefresh::Playlists);

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableFocusChange)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> anyhow::Result<()> {
        loop {
            terminal.draw(|f| self.draw_ui(f))?;

            let now = Instant::now();
            self.tick(now);

            // Wake early when a timer is due sooner than the next input tick
            let timeout = self
                .timers
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(now))
                .map_or(INPUT_POLL, |until| until.min(INPUT_POLL));
            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key.code),
                    Event::FocusLost => {
                        let effects = self.remote.page_hidden();
                        self.apply_effects(effects);
                    }
                    _ => {}
                }
            }

            if self.should_quit {
                return Ok(());
            }
        }
    }

    // One pass over everything that can change without user input
    fn tick(&mut self, now: Instant) {
        while let Ok(tagged) = self.widget_rx.try_recv() {
            let effects = self.remote.handle_event(tagged);
            self.apply_effects(effects);
        }

        while let Ok(response) = self.api_rx.try_recv() {
            self.handle_api_response(response);
        }

        for timer in self.timers.take_due(now) {
            let effects = self.remote.handle_timer(timer);
            self.apply_effects(effects);
        }

        if self.poller.due(now, self.remote.is_playing()) {
            self.refresh_now_playing();
        }

        for message in self.library.poll() {
            self.notify(message);
        }

        for action in self.session.poll_actions() {
            self.handle_session_action(action);
        }

        if matches!(self.toast, Some((_, expires)) if expires <= now) {
            self.toast = None;
        }
    }

    // ==========================================
    // EFFECTS
    // ==========================================
    fn apply_effects(&mut self, effects: Vec<RemoteEffect>) {
        for effect in effects {
            match effect {
                RemoteEffect::RefreshUi => self.refresh_now_playing(),
                RemoteEffect::Schedule { after, timer } => {
                    self.timers.schedule(Instant::now(), after, timer);
                }
                RemoteEffect::CancelStale { generation } => {
                    self.timers.cancel_where(|timer| timer.generation() < generation);
                }
                RemoteEffect::RecordHistory(record) => {
                    let api = self.api.clone();
                    let tx = self.api_tx.clone();
                    tokio::spawn(async move {
                        match api.record_history(&record).await {
                            Ok(()) => {
                                let _ = tx.send(ApiResponse::Reload(ListRefresh::History));
                            }
                            Err(e) => tracing::warn!("Failed to record history: {}", e),
                        }
                    });
                }
                RemoteEffect::RegisterMediaSession { title } => {
                    self.session.register(&title);
                    self.session_playing = Some(true);
                }
                RemoteEffect::Notify(message) => self.notify(message),
            }
        }
    }

    fn refresh_now_playing(&mut self) {
        let is_playing = self.remote.is_playing();
        if let Some(snapshot) = self.remote.snapshot() {
            self.now_playing.apply(&snapshot, is_playing);
        }
        if self.session.is_registered() && self.session_playing != Some(is_playing) {
            self.session.set_playing(is_playing);
            self.session_playing = Some(is_playing);
        }
    }

    fn notify(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("notification: {}", message);
        self.toast = Some((message, Instant::now() + self.config.notification_duration()));
    }

    fn handle_session_action(&mut self, action: SessionAction) {
        let effects = match action {
            SessionAction::Play => {
                self.remote.play();
                Vec::new()
            }
            SessionAction::Pause => {
                self.remote.pause();
                Vec::new()
            }
            SessionAction::Toggle => self.remote.toggle_play_pause(),
            SessionAction::Next => self.remote.next(),
            SessionAction::Previous => self.remote.previous(),
        };
        self.apply_effects(effects);
    }

    // ==========================================
    // BACKEND CALLS
    // ==========================================
    fn reload(&self, list: ListRefresh) {
        let api = self.api.clone();
        let tx = self.api_tx.clone();
        let limit = self.config.history_limit;
        tokio::spawn(async move {
            let response = match list {
                ListRefresh::Favorites => api.favorites().await.map(ApiResponse::Favorites),
                ListRefresh::History => api.history(Some(limit)).await.map(ApiResponse::History),
                ListRefresh::Library => api.library().await.map(ApiResponse::Library),
                ListRefresh::Playlists => api.playlists().await.map(ApiResponse::Playlists),
            };
            match response {
                Ok(response) => {
                    let _ = tx.send(response);
                }
                Err(e) => tracing::warn!(?list, "Failed to load list: {}", e),
            }
        });
    }

    // Runs a backend write; on success shows `done` and reloads `list`
    fn spawn_write<F, Fut>(&self, list: ListRefresh, done: &'static str, call: F)
    where
        F: FnOnce(ApiClient) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let api = self.api.clone();
        let tx = self.api_tx.clone();
        tokio::spawn(async move {
            match call(api).await {
                Ok(()) => {
                    let _ = tx.send(ApiResponse::Notify(done.to_string()));
                    let _ = tx.send(ApiResponse::Reload(list));
                }
                Err(e) => {
                    tracing::warn!(?list, "Backend write failed: {}", e);
                    let _ = tx.send(ApiResponse::Notify(e.to_string()));
                }
            }
        });
    }

    fn handle_api_response(&mut self, response: ApiResponse) {
        match response {
            ApiResponse::Favorites(favorites) => {
                self.favorites = favorites;
                self.selected_favorite = clamp_selection(self.selected_favorite, self.favorites.len());
            }
            ApiResponse::History(history) => {
                self.history = history;
                self.selected_history = clamp_selection(self.selected_history, self.history.len());
            }
            ApiResponse::Library(tracks) => {
                self.library.set_tracks(tracks);
                self.selected_track = clamp_selection(self.selected_track, self.library.tracks().len());
            }
            ApiResponse::Playlists(playlists) => {
                self.playlists = playlists;
                self.selected_playlist = clamp_selection(self.selected_playlist, self.playlists.len());
            }
            ApiResponse::Reload(list) => self.reload(list),
            ApiResponse::Notify(message) => self.notify(message),
        }
    }

    fn add_favorite(&mut self) {
        let Some(record) = self.remote.favorite_record() else {
            self.notify("Nothing loaded to add to favorites");
            return;
        };
        let api = self.api.clone();
        let tx = self.api_tx.clone();
        tokio::spawn(async move {
            match api.add_favorite(&record).await {
                Ok(reply) => {
                    let message = if reply.message.is_empty() {
                        "Added to favorites".to_string()
                    } else {
                        reply.message
                    };
                    let _ = tx.send(ApiResponse::Notify(message));
                    let _ = tx.send(ApiResponse::Reload(ListRefresh::Favorites));
                }
                Err(e) => {
                    tracing::warn!("Failed to add favorite: {}", e);
                    let _ = tx.send(ApiResponse::Notify(e.to_string()));
                }
            }
        });
    }

    fn remove_selected_favorite(&mut self) {
        let Some(id) = self.favorites.get(self.selected_favorite).map(|f| f.id) else {
            return;
        };
        self.spawn_write(ListRefresh::Favorites, "Removed from favorites", move |api| async move {
            api.remove_favorite(id).await
        });
    }

    // Saves the loaded source as a named playlist, named after what is playing
    fn save_playlist(&mut self) {
        let Some(record) = self.remote.favorite_record() else {
            self.notify("Nothing loaded to save as a playlist");
            return;
        };
        let name = record.title.clone();
        let api = self.api.clone();
        let tx = self.api_tx.clone();
        tokio::spawn(async move {
            match api.create_playlist(&name, &record).await {
                Ok(created) => {
                    tracing::info!(id = created.id, %name, "Saved playlist");
                    let _ = tx.send(ApiResponse::Notify(format!("Saved playlist \"{}\"", name)));
                    let _ = tx.send(ApiResponse::Reload(ListRefresh::Playlists));
                }
                Err(e) => {
                    tracing::warn!("Failed to save playlist: {}", e);
                    let _ = tx.send(ApiResponse::Notify(e.to_string()));
                }
            }
        });
    }

    fn delete_selected_playlist(&mut self) {
        let Some(id) = self.playlists.get(self.selected_playlist).map(|p| p.id) else {
            return;
        };
        self.spawn_write(ListRefresh::Playlists, "Playlist removed", move |api| async move {
            api.delete_playlist(id).await
        });
    }

    fn clear_history(&mut self) {
        self.spawn_write(ListRefresh::History, "History cleared", |api| async move {
            api.clear_history().await
        });
    }

    fn delete_selected_track(&mut self) {
        let Some(filename) = self
            .library
            .tracks()
            .get(self.selected_track)
            .map(|t| t.filename.clone())
        else {
            return;
        };
        self.spawn_write(ListRefresh::Library, "Track deleted", move |api| async move {
            api.delete_track(&filename).await
        });
    }

    // Typed URL wins over the loaded one
    fn download_target(&self) -> Result<String> {
        let typed = self.url_input.trim();
        if !typed.is_empty() {
            return Ok(typed.to_string());
        }
        self.remote
            .source()
            .map(|s| s.url.clone())
            .ok_or(Error::EmptyUrl)
    }

    fn download_audio(&mut self) {
        let target = match self.download_target() {
            Ok(target) => target,
            Err(e) => {
                self.status_message = e.to_string();
                return;
            }
        };
        if url::parse(&target).is_empty() {
            self.status_message = Error::InvalidUrl.to_string();
            return;
        }

        self.notify("Downloading audio...");
        let api = self.api.clone();
        let tx = self.api_tx.clone();
        let dir = self.config.download_dir();
        tokio::spawn(async move {
            let saved = match api.download_audio(&target).await {
                Ok(audio) => audio.save_into(&dir).await,
                Err(e) => Err(e),
            };
            match saved {
                Ok(path) => {
                    tracing::info!("Saved audio to {}", path.display());
                    let _ = tx.send(ApiResponse::Notify(format!("Saved {}", path.display())));
                    let _ = tx.send(ApiResponse::Reload(ListRefresh::Library));
                }
                Err(e) => {
                    tracing::warn!("Audio download failed: {}", e);
                    let _ = tx.send(ApiResponse::Notify(e.to_string()));
                }
            }
        });
    }

    fn download_playlist(&mut self) {
        let target = match self.download_target() {
            Ok(target) => target,
            Err(e) => {
                self.status_message = e.to_string();
                return;
            }
        };
        if url::parse(&target).playlist_id.is_none() {
            self.status_message = "Not a playlist URL".to_string();
            return;
        }

        self.notify("Downloading playlist...");
        let api = self.api.clone();
        let tx = self.api_tx.clone();
        tokio::spawn(async move {
            match api.download_playlist(&target).await {
                Ok(result) => {
                    let _ = tx.send(ApiResponse::Notify(format!(
                        "Downloaded {} tracks to the library",
                        result.total
                    )));
                    let _ = tx.send(ApiResponse::Reload(ListRefresh::Library));
                }
                Err(e) => {
                    tracing::warn!("Playlist download failed: {}", e);
                    let _ = tx.send(ApiResponse::Notify(e.to_string()));
                }
            }
        });
    }

    // ==========================================
    // INPUT
    // ==========================================
    fn handle_key(&mut self, key: KeyCode) {
        // Clear status message on any key press (except when typing)
        if self.mode != AppMode::UrlInput {
            self.status_message.clear();
        }

        match self.mode {
            AppMode::UrlInput => self.handle_url_input(key),
            AppMode::ConfirmClearHistory => {
                if matches!(key, KeyCode::Char('y') | KeyCode::Char('Y')) {
                    self.clear_history();
                }
                self.mode = AppMode::Normal;
            }
            AppMode::Normal => {
                if let Some(shortcut) = map_key(key, Focus::Normal) {
                    self.handle_shortcut(shortcut);
                    return;
                }
                self.handle_normal_key(key);
            }
        }
    }

    fn handle_url_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char(c) => self.url_input.push(c),
            KeyCode::Backspace => {
                self.url_input.pop();
            }
            KeyCode::Enter => {
                let url = self.url_input.clone();
                self.mode = AppMode::Normal;
                self.load_url(&url);
            }
            KeyCode::Esc => self.mode = AppMode::Normal,
            _ => {}
        }
    }

    fn handle_normal_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Tab => {
                let refresh = self.tabs.cycle();
                self.after_tab_switch(refresh);
            }
            KeyCode::Char(c @ '1'..='5') => {
                if let Some(tab) = Tab::from_digit(c) {
                    let refresh = self.tabs.switch_to(tab);
                    self.after_tab_switch(refresh);
                }
            }
            KeyCode::Char('/') | KeyCode::Char('i') => self.mode = AppMode::UrlInput,
            KeyCode::Char('f') => self.add_favorite(),
            KeyCode::Char('S') => self.save_playlist(),
            KeyCode::Char('s') => self.toggle_shuffle(),
            KeyCode::Char('r') => self.toggle_repeat(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.volume_up(),
            KeyCode::Char('-') => self.volume_down(),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Enter => self.activate_selection(),
            KeyCode::Char('d') => match self.tabs.active() {
                Tab::Favorites => self.remove_selected_favorite(),
                Tab::Library => self.delete_selected_track(),
                Tab::Playlists => self.delete_selected_playlist(),
                _ => {}
            },
            KeyCode::Char('c') if self.tabs.active() == Tab::History => {
                self.mode = AppMode::ConfirmClearHistory;
            }
            KeyCode::Char('D') => self.download_audio(),
            KeyCode::Char('P') => self.download_playlist(),
            KeyCode::Char(',') => self.scrub(-SCRUB_STEP),
            KeyCode::Char('.') => self.scrub(SCRUB_STEP),
            _ => {}
        }
    }

    fn after_tab_switch(&mut self, refresh: Option<ListRefresh>) {
        if let Some(list) = refresh {
            self.reload(list);
        }
    }

    fn library_active(&self) -> bool {
        self.tabs.active() == Tab::Library
    }

    fn handle_shortcut(&mut self, shortcut: Shortcut) {
        if self.library_active() {
            if !self.library.can_navigate() {
                self.notify("Library is empty");
                return;
            }
            match shortcut {
                Shortcut::TogglePlay => self.library.toggle_play(),
                Shortcut::Next => self.library.next(),
                Shortcut::Previous => self.library.previous(),
            }
            return;
        }

        let effects = match shortcut {
            Shortcut::TogglePlay => self.remote.toggle_play_pause(),
            Shortcut::Next => self.remote.next(),
            Shortcut::Previous => self.remote.previous(),
        };
        self.apply_effects(effects);
    }

    fn load_url(&mut self, raw: &str) {
        match self.remote.load(raw) {
            Ok(effects) => {
                tracing::info!("Loaded {}", raw.trim());
                self.now_playing.reset();
                self.session_playing = None;
                self.apply_effects(effects);
                let refresh = self.tabs.switch_to(Tab::Player);
                self.after_tab_switch(refresh);
                self.notify("Loading...");
            }
            Err(e) => {
                tracing::debug!("Rejected URL {:?}: {}", raw, e);
                self.status_message = e.to_string();
            }
        }
    }

    fn toggle_shuffle(&mut self) {
        let on = if self.library_active() {
            self.library.toggle_shuffle()
        } else {
            self.remote.toggle_shuffle()
        };
        self.notify(format!("Shuffle {}", on_off(on)));
    }

    fn toggle_repeat(&mut self) {
        let on = if self.library_active() {
            self.library.toggle_repeat()
        } else {
            self.remote.toggle_repeat()
        };
        self.notify(format!("Repeat {}", on_off(on)));
    }

    fn volume_up(&mut self) {
        if self.library_active() {
            let current = self.library.volume();
            self.library.set_volume(current.saturating_add(VOLUME_STEP).min(100));
        } else {
            let current = self.remote.volume();
            self.remote.set_volume(current.saturating_add(VOLUME_STEP).min(100));
        }
    }

    fn volume_down(&mut self) {
        if self.library_active() {
            let current = self.library.volume();
            self.library.set_volume(current.saturating_sub(VOLUME_STEP));
        } else {
            let current = self.remote.volume();
            self.remote.set_volume(current.saturating_sub(VOLUME_STEP));
        }
    }

    fn scrub(&mut self, delta: f64) {
        if self.library_active() {
            let target = self.library.progress_percent() + delta;
            self.library.scrub(target);
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let (selected, len) = match self.tabs.active() {
            Tab::Player => return,
            Tab::Favorites => (&mut self.selected_favorite, self.favorites.len()),
            Tab::History => (&mut self.selected_history, self.history.len()),
            Tab::Library => (&mut self.selected_track, self.library.tracks().len()),
            Tab::Playlists => (&mut self.selected_playlist, self.playlists.len()),
        };
        if len == 0 {
            return;
        }
        *selected = (*selected as isize + delta).rem_euclid(len as isize) as usize;
    }

    fn activate_selection(&mut self) {
        match self.tabs.active() {
            Tab::Player => self.mode = AppMode::UrlInput,
            Tab::Favorites => {
                if let Some(url) = self.favorites.get(self.selected_favorite).map(|f| f.youtube_url.clone()) {
                    self.url_input = url.clone();
                    self.load_url(&url);
                }
            }
            Tab::History => {
                if let Some(url) = self.history.get(self.selected_history).map(|h| h.youtube_url.clone()) {
                    self.url_input = url.clone();
                    self.load_url(&url);
                }
            }
            Tab::Library => {
                self.library.play_track(self.selected_track);
            }
            Tab::Playlists => {
                if let Some(url) = self.playlists.get(self.selected_playlist).map(|p| p.youtube_url.clone()) {
                    self.url_input = url.clone();
                    self.load_url(&url);
                }
            }
        }
    }

    // ==========================================
    // DRAWING
    // ==========================================
    fn draw_ui(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(3),
                Constraint::Length(3),
            ])
            .split(frame.size());

        let titles: Vec<Line> = Tab::ALL.iter().map(|t| Line::from(t.title())).collect();
        let tabs = Tabs::new(titles)
            .select(self.tabs.active().index())
            .block(Block::default().borders(Borders::ALL).title("YouTube Background Player"))
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        frame.render_widget(tabs, chunks[0]);

        match self.tabs.active() {
            Tab::Player => self.draw_player(frame, chunks[1]),
            Tab::Favorites => self.draw_favorites(frame, chunks[1]),
            Tab::History => self.draw_history(frame, chunks[1]),
            Tab::Library => self.draw_library(frame, chunks[1]),
            Tab::Playlists => self.draw_playlists(frame, chunks[1]),
        }

        let input_style = if self.mode == AppMode::UrlInput {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let cursor = if self.mode == AppMode::UrlInput { "_" } else { "" };
        let input = Paragraph::new(format!("{}{}", self.url_input, cursor))
            .style(input_style)
            .block(Block::default().borders(Borders::ALL).title("YouTube URL [/]"));
        frame.render_widget(input, chunks[2]);

        let status = if self.mode == AppMode::ConfirmClearHistory {
            "Clear all history? [y] Yes  [any other key] No".to_string()
        } else if !self.status_message.is_empty() {
            self.status_message.clone()
        } else if let Some((toast, _)) = &self.toast {
            toast.clone()
        } else {
            self.help_text().to_string()
        };
        let status_style = if self.status_message.is_empty() {
            Style::default()
        } else {
            Style::default().fg(Color::Red)
        };
        let status = Paragraph::new(status)
            .style(status_style)
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(status, chunks[3]);
    }

    fn help_text(&self) -> &'static str {
        match (self.mode, self.tabs.active()) {
            (AppMode::UrlInput, _) => "[Enter]Load [Esc]Cancel",
            (_, Tab::Player) => "[/]URL [Space]Play/Pause [←/→]Prev/Next [s]Shuffle [r]Repeat [+/-]Volume [f]Favorite [S]Save playlist [D]Download [P]Playlist [Tab]Tabs [q]Quit",
            (_, Tab::Favorites) => "[j/k]Navigate [Enter]Play [d]Remove [Tab]Tabs [q]Quit",
            (_, Tab::History) => "[j/k]Navigate [Enter]Play [c]Clear [Tab]Tabs [q]Quit",
            (_, Tab::Playlists) => "[j/k]Navigate [Enter]Play [d]Remove [Tab]Tabs [q]Quit",
            (_, Tab::Library) => "[j/k]Navigate [Enter]Play [Space]Play/Pause [←/→]Prev/Next [,/.]Seek [s]Shuffle [r]Repeat [d]Delete [q]Quit",
        }
    }

    fn draw_player(&self, frame: &mut Frame, area: Rect) {
        let state = match self.remote.phase() {
            RemotePhase::Unloaded => "⏹ Nothing loaded",
            RemotePhase::Loading => "… Loading",
            RemotePhase::Ready => "● Ready",
            RemotePhase::Playing => "▶ Playing",
            RemotePhase::Paused => "⏸ Paused",
            RemotePhase::Ended => "⏹ Ended",
        };

        let mut lines = vec![
            Line::from(format!("Now Playing: {}", self.now_playing.title)),
            Line::from(format!("State: {}", state)),
        ];
        if self.remote.is_loaded() {
            lines.push(Line::from(self.now_playing.playlist_position.clone()));
            lines.push(Line::from(format!("Duration: {}", self.now_playing.duration)));
        }
        lines.push(Line::from(format!(
            "Shuffle: {} | Repeat: {} | Volume: {}%",
            on_off(self.remote.is_shuffle()),
            on_off(self.remote.is_repeat()),
            self.remote.volume()
        )));
        if let Some(source) = self.remote.source() {
            lines.push(Line::from(""));
            lines.push(Line::from(format!("URL: {}", source.url)));
            if let Some(thumbnail) = &source.thumbnail_url {
                lines.push(Line::from(format!("Thumbnail: {}", thumbnail)));
            }
        }

        let player = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Player"));
        frame.render_widget(player, area);
    }

    fn draw_favorites(&self, frame: &mut Frame, area: Rect) {
        let items = self
            .favorites
            .iter()
            .map(|f| (f.title.as_str(), f.timestamp.as_deref(), f.playlist_id.is_some()));
        self.draw_entries(frame, area, "Favorites", items, self.selected_favorite, "No favorites yet");
    }

    fn draw_history(&self, frame: &mut Frame, area: Rect) {
        let items = self
            .history
            .iter()
            .map(|h| (h.title.as_str(), h.timestamp.as_deref(), h.playlist_id.is_some()));
        self.draw_entries(frame, area, "History", items, self.selected_history, "Nothing played yet");
    }

    fn draw_playlists(&self, frame: &mut Frame, area: Rect) {
        let items = self
            .playlists
            .iter()
            .map(|p| (p.name.as_str(), p.timestamp.as_deref(), p.playlist_id.is_some()));
        self.draw_entries(
            frame,
            area,
            "Playlists",
            items,
            self.selected_playlist,
            "No saved playlists. Press [S] while something is loaded to save it.",
        );
    }

    fn draw_entries<'a>(
        &self,
        frame: &mut Frame,
        area: Rect,
        title: &str,
        entries: impl Iterator<Item = (&'a str, Option<&'a str>, bool)>,
        selected: usize,
        placeholder: &str,
    ) {
        let items: Vec<ListItem> = entries
            .enumerate()
            .map(|(i, (name, timestamp, is_playlist))| {
                let kind = if is_playlist { "[playlist] " } else { "" };
                let when = timestamp.map(format_timestamp).unwrap_or_default();
                let style = if i == selected {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                ListItem::new(format!("{}{}  {}", kind, name, when)).style(style)
            })
            .collect();

        if items.is_empty() {
            let empty = Paragraph::new(placeholder.to_string())
                .block(Block::default().borders(Borders::ALL).title(title.to_string()));
            frame.render_widget(empty, area);
            return;
        }

        let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title.to_string()));
        frame.render_widget(list, area);
    }

    fn draw_library(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(3)])
            .split(area);

        if self.library.phase() == LibraryPhase::Empty {
            let empty = Paragraph::new("No downloaded tracks yet. Press [D] on the Player tab to download one.")
                .block(Block::default().borders(Borders::ALL).title("Library"));
            frame.render_widget(empty, area);
            return;
        }

        let items: Vec<ListItem> = self
            .library
            .tracks()
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let marker = if self.library.is_current(i) { "▶ " } else { "  " };
                let mut style = Style::default();
                if self.library.is_current(i) {
                    style = style.fg(Color::Green);
                }
                if i == self.selected_track {
                    style = style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
                }
                ListItem::new(format!("{}{}", marker, track.title)).style(style)
            })
            .collect();
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title(format!(
            "Library | Shuffle: {} | Repeat: {} | Volume: {}%",
            on_off(self.library.is_shuffle()),
            on_off(self.library.is_repeat()),
            self.library.volume()
        )));
        frame.render_widget(list, chunks[0]);

        let title = self
            .library
            .current_track()
            .map(|t| t.title.clone())
            .unwrap_or_else(|| "Stopped".to_string());
        let state = match self.library.phase() {
            _ if self.library.element().is_loading() => "…",
            LibraryPhase::Playing => "▶",
            LibraryPhase::Paused => "⏸",
            LibraryPhase::Stopped | LibraryPhase::Empty => "⏹",
        };
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title(format!("{} {}", state, title)))
            .gauge_style(Style::default().fg(Color::Cyan))
            .percent(self.library.progress_percent().round().clamp(0.0, 100.0) as u16)
            .label(self.library.duration_label().to_string());
        frame.render_widget(gauge, chunks[1]);
    }
}

fn clamp_selection(selected: usize, len: usize) -> usize {
    selected.min(len.saturating_sub(1))
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::widget::fake::{Call, FakeFactory};
    use crate::player::widget::{WidgetEvent, WidgetSnapshot};
    use ratatui::backend::TestBackend;

    fn rendered(app: &MusicPlayerApp) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 24)).unwrap();
        terminal.draw(|frame| app.draw_ui(frame)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    // Nothing listens on the discard port, so background reloads fail fast
    fn app() -> (MusicPlayerApp, FakeFactory) {
        let config = Config {
            backend_url: "http://127.0.0.1:9".to_string(),
            ..Config::default()
        };
        let api = ApiClient::new(&config.backend_url, Duration::from_secs(1)).unwrap();
        let factory = FakeFactory::default();
        let app = MusicPlayerApp::with_factory(config, api, Box::new(factory.clone()), None).unwrap();
        (app, factory)
    }

    fn type_url(app: &mut MusicPlayerApp, url: &str) {
        app.url_input.clear();
        app.handle_key(KeyCode::Char('/'));
        for c in url.chars() {
            app.handle_key(KeyCode::Char(c));
        }
        app.handle_key(KeyCode::Enter);
    }

    #[tokio::test]
    async fn invalid_url_is_reported_without_a_widget() {
        let (mut app, factory) = app();
        type_url(&mut app, "https://example.com/watch");

        assert_eq!(app.status_message, Error::InvalidUrl.to_string());
        assert_eq!(factory.live(), 0);

        // Next key press dismisses it
        app.handle_key(KeyCode::Char('x'));
        assert!(app.status_message.is_empty());
    }

    #[tokio::test]
    async fn typing_a_space_does_not_toggle_playback() {
        let (mut app, factory) = app();
        type_url(&mut app, "https://youtu.be/abc123");
        factory.clear_calls();

        app.handle_key(KeyCode::Char('/'));
        app.handle_key(KeyCode::Char(' '));
        assert!(factory.calls().is_empty());
        assert!(app.url_input.ends_with(' '));
    }

    #[tokio::test]
    async fn space_drives_remote_player_outside_library() {
        let (mut app, factory) = app();
        type_url(&mut app, "https://youtu.be/abc123");
        assert_eq!(factory.live(), 1);
        assert_eq!(app.tabs.active(), Tab::Player);
        factory.clear_calls();

        app.handle_key(KeyCode::Char(' '));
        assert_eq!(factory.calls(), vec![Call::Play]);
    }

    #[tokio::test]
    async fn library_tab_takes_over_shortcuts() {
        let (mut app, factory) = app();
        type_url(&mut app, "https://youtu.be/abc123");
        factory.clear_calls();

        app.handle_key(KeyCode::Char('4'));
        app.handle_key(KeyCode::Char(' '));
        app.handle_key(KeyCode::Right);
        app.handle_key(KeyCode::Char('s'));

        assert!(factory.calls().is_empty());
        assert!(app.library.is_shuffle());
        assert!(!app.remote.is_shuffle());
    }

    #[tokio::test]
    async fn clearing_history_needs_confirmation() {
        let (mut app, _factory) = app();
        app.handle_key(KeyCode::Char('3'));
        app.handle_key(KeyCode::Char('c'));
        assert_eq!(app.mode, AppMode::ConfirmClearHistory);

        app.handle_key(KeyCode::Char('n'));
        assert_eq!(app.mode, AppMode::Normal);
    }

    #[tokio::test]
    async fn activating_favorite_loads_it_on_player_tab() {
        let (mut app, factory) = app();
        app.handle_api_response(ApiResponse::Favorites(vec![FavoriteEntry {
            id: 1,
            title: "Mix".to_string(),
            youtube_url: "https://www.youtube.com/playlist?list=PL9".to_string(),
            video_id: None,
            playlist_id: Some("PL9".to_string()),
            thumbnail: None,
            timestamp: None,
        }]));

        app.handle_key(KeyCode::Char('2'));
        app.handle_key(KeyCode::Enter);

        assert_eq!(app.tabs.active(), Tab::Player);
        assert_eq!(factory.last_config().unwrap().list(), Some("PL9"));
    }

    #[tokio::test]
    async fn ready_event_updates_now_playing_and_schedules_settle() {
        let (mut app, factory) = app();
        type_url(&mut app, "https://youtu.be/abc123");
        factory.set_snapshot(WidgetSnapshot {
            title: "Song".to_string(),
            duration: 125.0,
            ..Default::default()
        });

        let generation = app.remote.generation();
        let sink = factory.shared.borrow().sinks.last().cloned().unwrap();
        assert_eq!(sink.generation(), generation);
        sink.emit(WidgetEvent::Ready);
        app.tick(Instant::now());

        assert_eq!(app.now_playing.title, "Song");
        assert_eq!(app.now_playing.duration, "2:05");
        assert_eq!(app.timers.len(), 1);
    }

    #[tokio::test]
    async fn new_load_drops_timers_from_previous_source() {
        let (mut app, factory) = app();
        type_url(&mut app, "https://youtu.be/first");
        let sink = factory.shared.borrow().sinks.last().cloned().unwrap();
        sink.emit(WidgetEvent::Ready);
        app.tick(Instant::now());
        assert_eq!(app.timers.len(), 1);

        type_url(&mut app, "https://youtu.be/second");
        assert!(app.timers.is_empty());
    }

    #[test]
    fn selection_is_clamped_to_list() {
        assert_eq!(clamp_selection(5, 3), 2);
        assert_eq!(clamp_selection(1, 3), 1);
        assert_eq!(clamp_selection(4, 0), 0);
    }

    #[tokio::test]
    async fn empty_library_shows_placeholder() {
        let (mut app, _factory) = app();
        app.handle_api_response(ApiResponse::Library(Vec::new()));
        app.handle_key(KeyCode::Char('4'));

        let screen = rendered(&app);
        assert!(screen.contains("No downloaded tracks yet"));

        app.handle_key(KeyCode::Char(' '));
        assert_eq!(app.toast.as_ref().map(|(t, _)| t.as_str()), Some("Library is empty"));
    }

    #[tokio::test]
    async fn library_lists_tracks_once_loaded() {
        let (mut app, _factory) = app();
        app.handle_api_response(ApiResponse::Library(vec![LibraryTrack {
            filename: "song.mp3".to_string(),
            title: "Some Song".to_string(),
            downloaded_at: None,
        }]));
        app.handle_key(KeyCode::Char('4'));

        let screen = rendered(&app);
        assert!(screen.contains("Some Song"));
        assert!(!screen.contains("No downloaded tracks yet"));
    }

    #[tokio::test]
    async fn activating_saved_playlist_loads_it() {
        let (mut app, factory) = app();
        app.handle_api_response(ApiResponse::Playlists(vec![SavedPlaylist {
            id: 5,
            name: "Evening".to_string(),
            youtube_url: "https://www.youtube.com/playlist?list=PLeve".to_string(),
            video_id: None,
            playlist_id: Some("PLeve".to_string()),
            thumbnail: None,
            timestamp: None,
        }]));

        app.handle_key(KeyCode::Char('5'));
        assert_eq!(app.tabs.active(), Tab::Playlists);
        assert!(rendered(&app).contains("Evening"));

        app.handle_key(KeyCode::Enter);
        assert_eq!(app.tabs.active(), Tab::Player);
        assert_eq!(factory.last_config().unwrap().list(), Some("PLeve"));
    }

    #[tokio::test]
    async fn saving_playlist_needs_a_loaded_source() {
        let (mut app, _factory) = app();
        app.handle_key(KeyCode::Char('S'));
        assert_eq!(
            app.toast.as_ref().map(|(t, _)| t.as_str()),
            Some("Nothing loaded to save as a playlist")
        );
    }
}
