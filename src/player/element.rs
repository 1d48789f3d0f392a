// Audio element for the library player
// Fetches a track from the backend's stream endpoint in the background, then
// plays it through an AudioOutput. Behaves like an <audio> element: play()
// before the data arrives just means "start as soon as it's loaded".

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::player::audio::{AudioOutput, PlayerState};
use crate::player::library::{ElementEvent, MediaElement};

type Loaded = (u64, Result<Bytes>);

pub struct StreamedElement {
    http: reqwest::Client,
    audio: AudioOutput,
    // Bumped per source so a slow download for an old track is thrown away
    generation: u64,
    loading: bool,
    wants_play: bool,
    loaded_tx: mpsc::UnboundedSender<Loaded>,
    loaded_rx: mpsc::UnboundedReceiver<Loaded>,
}

impl StreamedElement {
    pub fn new(http: reqwest::Client, audio: AudioOutput) -> Self {
        let (loaded_tx, loaded_rx) = mpsc::unbounded_channel();
        StreamedElement {
            http,
            audio,
            generation: 0,
            loading: false,
            wants_play: false,
            loaded_tx,
            loaded_rx,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    async fn fetch(http: reqwest::Client, src: String) -> Result<Bytes> {
        let response = http.get(&src).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }

    fn on_loaded(&mut self, result: Result<Bytes>, events: &mut Vec<ElementEvent>) {
        self.loading = false;
        let loaded = result.and_then(|bytes| self.audio.load(bytes));
        if let Err(e) = loaded {
            events.push(ElementEvent::Error(e.to_string()));
            return;
        }

        events.push(ElementEvent::LoadedMetadata);
        if self.wants_play {
            if let Err(e) = self.audio.play_from(0.0) {
                events.push(ElementEvent::Error(e.to_string()));
            }
        }
    }
}

impl MediaElement for StreamedElement {
    fn set_source(&mut self, src: &str) {
        self.generation += 1;
        // The old track must not answer seek/duration while the new one loads
        self.audio.unload();
        self.loading = true;
        self.wants_play = false;

        let generation = self.generation;
        let http = self.http.clone();
        let tx = self.loaded_tx.clone();
        let src = src.to_string();
        tracing::debug!(generation, %src, "library element loading");
        tokio::spawn(async move {
            let result = Self::fetch(http, src).await;
            let _ = tx.send((generation, result));
        });
    }

    fn play(&mut self) {
        self.wants_play = true;
        if self.loading {
            return;
        }
        if let Err(e) = self.audio.resume() {
            tracing::warn!("library element failed to resume: {}", e);
        }
    }

    fn pause(&mut self) {
        self.wants_play = false;
        self.audio.pause();
    }

    fn seek(&mut self, seconds: f64) {
        if let Err(e) = self.audio.seek(seconds) {
            tracing::warn!("library element failed to seek: {}", e);
        }
    }

    fn set_volume(&mut self, gain: f32) {
        self.audio.set_gain(gain);
    }

    fn current_time(&self) -> f64 {
        self.audio.position()
    }

    fn duration(&self) -> Option<f64> {
        if self.loading {
            return None;
        }
        self.audio.duration()
    }

    fn poll_events(&mut self) -> Vec<ElementEvent> {
        let mut events = Vec::new();

        while let Ok((generation, result)) = self.loaded_rx.try_recv() {
            if generation == self.generation {
                self.on_loaded(result, &mut events);
            }
        }

        if self.audio.poll_ended() {
            events.push(ElementEvent::Ended);
        } else if self.audio.state() == PlayerState::Playing {
            events.push(ElementEvent::TimeUpdate);
        }

        events
    }
}
