//! Playback engine
//!
//! Owns the decoded buffer and the output primitive. Playback always loops:
//! the output voice wraps at the end of the buffer on its own, and the engine
//! only tracks *where* in the loop we are, from the clock.
//!
//! Position while playing is `(start_offset + elapsed) % duration`, where
//! `start_offset` is the position playback was (re)started from. Pausing
//! freezes the position and the next `play` continues from it.

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::decode::DecodedAudio;
use super::loader::fetch_and_decode;
use super::output::OutputSink;
use super::source::AudioSource;
use super::LoadError;
use crate::clock::Clock;
use crate::observer::{Observers, SubscriptionId};

/// Default cadence of [`EngineEvent::TimeUpdate`]
pub const DEFAULT_TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Default timeout for remote sources
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Notifications from the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// Transport state changed
    StateChanged(TransportState),
    /// Periodic position report while playing, in seconds
    TimeUpdate(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub time_update_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_update_interval: DEFAULT_TIME_UPDATE_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Gapless looping player for a single buffer
///
/// The application creates one of these in its composition root and keeps
/// it for the lifetime of the process; [`PlaybackEngine::dispose`] is for
/// final teardown.
pub struct PlaybackEngine {
    output: Box<dyn OutputSink>,
    clock: Rc<dyn Clock>,
    config: EngineConfig,
    audio: Option<Arc<DecodedAudio>>,
    state: TransportState,
    /// When the current play run began
    started_at: Instant,
    /// Loop position at `started_at`
    start_offset: f64,
    /// Position while paused or stopped
    frozen: f64,
    volume: f32,
    next_time_update: Option<Instant>,
    observers: Observers<EngineEvent>,
}

impl PlaybackEngine {
    pub fn new(output: Box<dyn OutputSink>, clock: Rc<dyn Clock>) -> Self {
        Self::with_config(output, clock, EngineConfig::default())
    }

    pub fn with_config(
        mut output: Box<dyn OutputSink>,
        clock: Rc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        output.set_volume(1.0);
        let started_at = clock.now();
        Self {
            output,
            clock,
            config,
            audio: None,
            state: TransportState::Stopped,
            started_at,
            start_offset: 0.0,
            frozen: 0.0,
            volume: 1.0,
            next_time_update: None,
            observers: Observers::new(),
        }
    }

    /// Fetch and decode `source`, then replace the current buffer with it
    ///
    /// Blocks until done. On error nothing changes: the previous buffer (if
    /// any) stays loaded and the transport is untouched.
    pub fn load(&mut self, source: &AudioSource) -> Result<(), LoadError> {
        let audio = fetch_and_decode(source, self.config.fetch_timeout)?;
        self.install(audio);
        Ok(())
    }

    /// Replace the current buffer with already-decoded audio
    ///
    /// Stops playback and rewinds to 0.
    pub fn install(&mut self, audio: DecodedAudio) {
        self.output.halt();
        log::info!("Loaded {:.2}s loop", audio.duration());
        self.audio = Some(Arc::new(audio));
        self.frozen = 0.0;
        self.start_offset = 0.0;
        self.next_time_update = None;
        self.set_state(TransportState::Stopped);
    }

    /// Start or resume looping playback. No-op when nothing is loaded.
    pub fn play(&mut self) {
        let Some(audio) = self.audio.clone() else {
            log::debug!("play() ignored: nothing loaded");
            return;
        };
        if self.state == TransportState::Playing {
            return;
        }

        let offset = self.frozen % audio.duration();
        let frame = (offset * audio.sample_rate() as f64).round() as usize;
        if let Err(e) = self.output.start(audio, frame) {
            // Keep the transport running on the clock so timing still works
            log::warn!("Audio output unavailable: {}", e);
        }

        let now = self.clock.now();
        self.started_at = now;
        self.start_offset = offset;
        self.next_time_update = Some(now + self.config.time_update_interval);
        self.set_state(TransportState::Playing);
    }

    /// Freeze at the current position
    pub fn pause(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        self.frozen = self.current_time();
        self.output.halt();
        self.next_time_update = None;
        self.set_state(TransportState::Paused);
    }

    /// Pause at the loop seam: the next `play` starts from the top
    ///
    /// For callers that pause at the end of a pass but may get here a little
    /// late, after the output has already wrapped.
    pub fn pause_at_loop_start(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        self.frozen = 0.0;
        self.output.halt();
        self.next_time_update = None;
        self.set_state(TransportState::Paused);
    }

    /// Silence and rewind to 0
    pub fn stop(&mut self) {
        self.output.halt();
        self.frozen = 0.0;
        self.start_offset = 0.0;
        self.next_time_update = None;
        self.set_state(TransportState::Stopped);
    }

    pub fn toggle(&mut self) {
        if self.state == TransportState::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Position within the loop in seconds, in `[0, duration)`
    pub fn current_time(&self) -> f64 {
        let Some(audio) = self.audio.as_ref() else {
            return 0.0;
        };
        match self.state {
            TransportState::Playing => {
                let elapsed = self
                    .clock
                    .now()
                    .saturating_duration_since(self.started_at)
                    .as_secs_f64();
                (self.start_offset + elapsed) % audio.duration()
            }
            TransportState::Paused | TransportState::Stopped => self.frozen,
        }
    }

    /// Length of the loaded loop in seconds, 0 when nothing is loaded
    pub fn duration(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, |a| a.duration())
    }

    /// Set the output gain, clamped to `[0, 1]`. NaN is ignored.
    pub fn set_volume(&mut self, level: f32) {
        if level.is_nan() {
            return;
        }
        self.volume = level.clamp(0.0, 1.0);
        self.output.set_volume(self.volume);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_loaded(&self) -> bool {
        self.audio.is_some()
    }

    pub fn audio(&self) -> Option<&DecodedAudio> {
        self.audio.as_deref()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EngineEvent) + 'static) -> SubscriptionId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Fire the periodic time update if it is due. Call from the host loop.
    pub fn pump(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        let now = self.clock.now();
        if let Some(due) = self.next_time_update {
            if now >= due {
                let position = self.current_time();
                self.observers.notify(&EngineEvent::TimeUpdate(position));
                self.next_time_update = Some(now + self.config.time_update_interval);
            }
        }
    }

    /// Release the output device and all listeners
    pub fn dispose(mut self) {
        self.stop();
        self.output.close();
        self.observers.clear();
        self.audio = None;
        log::info!("Playback engine disposed");
    }

    fn set_state(&mut self, state: TransportState) {
        if self.state == state {
            return;
        }
        log::debug!("Transport {:?} -> {:?}", self.state, state);
        self.state = state;
        self.observers.notify(&EngineEvent::StateChanged(state));
    }
}
