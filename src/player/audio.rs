// ==========================================
// AUDIO OUTPUT
// ==========================================
// This module plays fully downloaded audio through rodio.
// It handles:
// - Decoding an in-memory audio file (MP3, M4A, WebM/Opus, WAV, ...)
// - Playing, pausing, resuming, stopping
// - Seeking by re-decoding and skipping ahead
// - Volume control
// - Tracking position and noticing when a track has ended
//
// Both engines use it: the yt-dlp widget plays resolved YouTube audio with
// it, and the library element plays tracks streamed from the backend.
//
// Key Concept: a rodio Sink is a queue of sources feeding one output.
// Rodio does not report position or "finished" itself, so we track both.

use bytes::Bytes;
use rodio::{Decoder, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

// ==========================================
// PLAYER STATE ENUM
// ==========================================
// Ended is separate from Stopped: the track is still loaded and can be
// restarted from zero without fetching it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Loading,
    Playing,
    Paused,
    Ended,
}

// ==========================================
// AUDIO OUTPUT STRUCT
// ==========================================
// sink: None when no output device exists (headless machine). Everything
//   still works as bookkeeping, nothing is heard.
// source: the encoded bytes of the loaded track, kept for seeking.
// start_offset: where in the track playback (re)started, in seconds.
pub struct AudioOutput {
    sink: Option<Sink>,
    state: PlayerState,
    gain: f32,
    source: Option<Bytes>,
    duration: Option<f64>,
    start_time: Option<Instant>,
    pause_time: Option<Instant>,
    total_paused_duration: Duration,
    start_offset: f64,
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        self.sink = None;
    }
}

impl AudioOutput {
    // The OutputStream itself is owned by main() and must outlive every
    // output; we only need the handle to open a sink on it.
    pub fn new(handle: Option<&OutputStreamHandle>) -> Self {
        let sink = handle.and_then(|handle| match Sink::try_new(handle) {
            Ok(sink) => Some(sink),
            Err(e) => {
                tracing::warn!("Failed to open audio sink: {}", e);
                None
            }
        });

        AudioOutput {
            sink,
            state: PlayerState::Stopped,
            gain: 1.0,
            source: None,
            duration: None,
            start_time: None,
            pause_time: None,
            total_paused_duration: Duration::ZERO,
            start_offset: 0.0,
        }
    }

    fn decode(bytes: &Bytes) -> Result<Decoder<Cursor<Bytes>>> {
        Decoder::new(Cursor::new(bytes.clone()))
            .map_err(|e| Error::Audio(format!("decode failed: {}", e)))
    }

    // ==========================================
    // LOADING: load()
    // ==========================================
    // Replaces the current track without starting it. The decoder is built
    // once here to validate the data and read the duration. MP3 containers
    // never report one, so then we decode the whole track and count samples.
    pub fn load(&mut self, bytes: Bytes) -> Result<()> {
        self.unload();
        let decoder = Self::decode(&bytes)?;
        self.duration = match decoder.total_duration() {
            Some(total) => Some(total.as_secs_f64()),
            None => Self::measure(decoder),
        }
        .filter(|d| d.is_finite() && *d > 0.0);
        self.source = Some(bytes);
        Ok(())
    }

    fn measure(decoder: Decoder<Cursor<Bytes>>) -> Option<f64> {
        let per_second = f64::from(decoder.sample_rate()) * f64::from(decoder.channels());
        if per_second <= 0.0 {
            return None;
        }
        let samples = decoder.count();
        Some(samples as f64 / per_second)
    }

    // Forgets the loaded track entirely; seek/resume become no-ops until
    // the next load()
    pub fn unload(&mut self) {
        self.stop();
        self.source = None;
        self.duration = None;
    }

    pub fn play_from(&mut self, seconds: f64) -> Result<()> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| Error::Audio("nothing loaded".to_string()))?;
        let position = seconds.max(0.0);

        // Loading while we swap sources, so nobody mistakes the briefly
        // empty sink for a finished track
        self.state = PlayerState::Loading;
        if let Some(sink) = &self.sink {
            sink.stop();
            let decoder = Self::decode(&source)?;
            sink.append(decoder.skip_duration(Duration::from_secs_f64(position)));
            sink.set_volume(self.gain);
            sink.play();
        }

        self.state = PlayerState::Playing;
        self.start_time = Some(Instant::now());
        self.pause_time = None;
        self.total_paused_duration = Duration::ZERO;
        self.start_offset = position;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        self.pause_time = Some(Instant::now());
        self.state = PlayerState::Paused;
    }

    // Resuming an ended or stopped track starts it again from the top
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Paused => {
                if let Some(sink) = &self.sink {
                    sink.play();
                }
                if let Some(pause_time) = self.pause_time.take() {
                    self.total_paused_duration += Instant::now().duration_since(pause_time);
                }
                self.state = PlayerState::Playing;
                Ok(())
            }
            PlayerState::Ended | PlayerState::Stopped if self.source.is_some() => self.play_from(0.0),
            _ => Ok(()),
        }
    }

    pub fn stop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        self.start_time = None;
        self.pause_time = None;
        self.total_paused_duration = Duration::ZERO;
        self.start_offset = 0.0;
        self.state = PlayerState::Stopped;
    }

    // ==========================================
    // SEEKING: seek()
    // ==========================================
    // Rodio 0.17 sinks can't seek, so we rebuild the source and skip to the
    // target. The data is already in memory, so this is quick. A paused
    // track stays paused at the new position.
    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        if self.source.is_none() {
            return Ok(());
        }

        let target = match self.duration {
            Some(duration) => seconds.clamp(0.0, duration),
            None => seconds.max(0.0),
        };
        let was_playing = self.state == PlayerState::Playing;

        self.play_from(target)?;
        if !was_playing {
            self.pause();
        }
        Ok(())
    }

    // 0-100 the way users think about it, 0.0-1.0 the way rodio wants it
    pub fn set_volume(&mut self, volume: u8) {
        self.set_gain(f32::from(volume.min(100)) / 100.0);
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.gain);
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    // Seconds into the track, not counting time spent paused
    pub fn position(&self) -> f64 {
        if self.state == PlayerState::Ended {
            return self.duration.unwrap_or(self.start_offset);
        }

        let Some(start) = self.start_time else {
            return 0.0;
        };
        let until = self.pause_time.unwrap_or_else(Instant::now);
        let elapsed = until
            .duration_since(start)
            .saturating_sub(self.total_paused_duration)
            .as_secs_f64();
        let position = self.start_offset + elapsed;

        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    // ==========================================
    // END DETECTION: poll_ended()
    // ==========================================
    // True exactly once per natural end: the sink ran dry while we believed
    // we were playing. Loading/Paused/Stopped never count, which keeps a
    // source swap from looking like the end of a track.
    pub fn poll_ended(&mut self) -> bool {
        let Some(sink) = &self.sink else {
            return false;
        };
        if self.state != PlayerState::Playing || self.start_time.is_none() || !sink.empty() {
            return false;
        }

        self.state = PlayerState::Ended;
        true
    }
}
