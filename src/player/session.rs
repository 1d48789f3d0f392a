// OS media session (MPRIS on Linux, Now Playing on macOS)
// Registered lazily once the remote player has something with a title.
// Where the platform has no backend we simply carry on without media keys.

use souvlaki::{MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, PlatformConfig};
use std::sync::mpsc;

const DISPLAY_NAME: &str = "YouTube Background Player";
const DBUS_NAME: &str = "youtube_background_player";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Play,
    Pause,
    Toggle,
    Next,
    Previous,
}

fn map_event(event: MediaControlEvent) -> Option<SessionAction> {
    match event {
        MediaControlEvent::Play => Some(SessionAction::Play),
        MediaControlEvent::Pause => Some(SessionAction::Pause),
        MediaControlEvent::Toggle => Some(SessionAction::Toggle),
        MediaControlEvent::Next => Some(SessionAction::Next),
        MediaControlEvent::Previous => Some(SessionAction::Previous),
        _ => None,
    }
}

pub struct MediaSession {
    controls: Option<MediaControls>,
    unsupported: bool,
    actions_tx: mpsc::Sender<SessionAction>,
    actions_rx: mpsc::Receiver<SessionAction>,
}

impl Default for MediaSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSession {
    pub fn new() -> Self {
        let (actions_tx, actions_rx) = mpsc::channel();
        MediaSession {
            controls: None,
            unsupported: false,
            actions_tx,
            actions_rx,
        }
    }

    pub fn register(&mut self, title: &str) {
        if self.controls.is_none() && !self.unsupported {
            self.controls = self.create_controls();
            self.unsupported = self.controls.is_none();
        }

        let Some(controls) = self.controls.as_mut() else {
            return;
        };
        let metadata = MediaMetadata {
            title: Some(title),
            artist: Some("YouTube"),
            album: Some("Playlist"),
            ..Default::default()
        };
        if let Err(e) = controls.set_metadata(metadata) {
            tracing::warn!("media session: failed to set metadata: {:?}", e);
        }
        self.set_playing(true);
    }

    #[cfg(not(target_os = "windows"))]
    fn create_controls(&self) -> Option<MediaControls> {
        let mut controls = match MediaControls::new(PlatformConfig {
            display_name: DISPLAY_NAME,
            dbus_name: DBUS_NAME,
            hwnd: None,
        }) {
            Ok(controls) => controls,
            Err(e) => {
                tracing::warn!("media session unavailable: {:?}", e);
                return None;
            }
        };

        let tx = self.actions_tx.clone();
        if let Err(e) = controls.attach(move |event| {
            if let Some(action) = map_event(event) {
                let _ = tx.send(action);
            }
        }) {
            tracing::warn!("media session: failed to attach handler: {:?}", e);
            return None;
        }

        tracing::debug!("media session registered");
        Some(controls)
    }

    // Needs a window handle on Windows, and a terminal app doesn't own one
    #[cfg(target_os = "windows")]
    fn create_controls(&self) -> Option<MediaControls> {
        tracing::debug!("media session disabled on Windows");
        None
    }

    pub fn set_playing(&mut self, playing: bool) {
        let Some(controls) = self.controls.as_mut() else {
            return;
        };
        let playback = if playing {
            MediaPlayback::Playing { progress: None }
        } else {
            MediaPlayback::Paused { progress: None }
        };
        if let Err(e) = controls.set_playback(playback) {
            tracing::warn!("media session: failed to set playback: {:?}", e);
        }
    }

    pub fn is_registered(&self) -> bool {
        self.controls.is_some()
    }

    pub fn poll_actions(&mut self) -> Vec<SessionAction> {
        self.actions_rx.try_iter().collect()
    }
}
