//! Spaced repetition on top of the playback engine
//!
//! A session alternates between playing the loop once and a silent wait of
//! `interval` seconds, counting down in whole seconds. An interval of 0 means
//! continuous playback with no pauses.
//!
//! The decisions live in [`machine`]; [`RepetitionScheduler`] carries out the
//! effects against a [`Transport`], its own timers and its listeners. Timers
//! only fire from [`RepetitionScheduler::pump`], so the host must call it
//! regularly (every frame is fine).

pub mod machine;

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::audio::PlaybackEngine;
use crate::clock::Clock;
use crate::observer::{Observers, SubscriptionId};
use crate::timer::TimerQueue;
use machine::{Effect, Input, Session};

pub use machine::{Phase, MAX_INTERVAL_SECONDS};

/// Wait used for the cycle timer when the transport reports no duration
pub const FALLBACK_CYCLE: Duration = Duration::from_secs(5);

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// What the scheduler needs from a player
pub trait Transport {
    fn play(&mut self);
    fn pause(&mut self);
    /// Pause at the end of a pass so the next `play` starts from the top.
    /// Transports without a notion of position can just pause.
    fn pause_at_loop_start(&mut self) {
        self.pause()
    }
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
    /// Loop length in seconds, 0 when unknown
    fn duration(&self) -> f64;
    /// Position within the loop in seconds
    fn current_time(&self) -> f64;
    /// Give the transport a chance to run its own periodic work
    fn pump(&mut self) {}
}

impl Transport for PlaybackEngine {
    fn play(&mut self) {
        PlaybackEngine::play(self)
    }

    fn pause(&mut self) {
        PlaybackEngine::pause(self)
    }

    fn pause_at_loop_start(&mut self) {
        PlaybackEngine::pause_at_loop_start(self)
    }

    fn stop(&mut self) {
        PlaybackEngine::stop(self)
    }

    fn is_playing(&self) -> bool {
        PlaybackEngine::is_playing(self)
    }

    fn duration(&self) -> f64 {
        PlaybackEngine::duration(self)
    }

    fn current_time(&self) -> f64 {
        PlaybackEngine::current_time(self)
    }

    fn pump(&mut self) {
        PlaybackEngine::pump(self)
    }
}

/// Combined session state as broadcast to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub is_active: bool,
    pub is_playing: bool,
    /// Seconds until the next cycle; `None` unless waiting
    pub remaining_seconds: Option<u32>,
    pub cycle_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    StateChanged(SessionSnapshot),
    CycleStarted(u32),
    IntervalStarted(u32),
    IntervalTick(u32),
    IntervalEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    CycleEnd,
    Countdown,
}

/// Drives a [`Transport`] through play/wait cycles
pub struct RepetitionScheduler<T: Transport> {
    transport: T,
    clock: Rc<dyn Clock>,
    session: Session,
    timers: TimerQueue<TimerKind>,
    /// Deadline of the timer being handled, so re-armed timers don't drift
    firing_at: Option<Instant>,
    observers: Observers<SchedulerEvent>,
}

impl<T: Transport> RepetitionScheduler<T> {
    /// `interval_seconds` is clamped to `0..=MAX_INTERVAL_SECONDS`
    pub fn new(transport: T, clock: Rc<dyn Clock>, interval_seconds: u32) -> Self {
        Self {
            transport,
            clock,
            session: Session::new(interval_seconds),
            timers: TimerQueue::new(),
            firing_at: None,
            observers: Observers::new(),
        }
    }

    /// Begin a session from cycle 1. Ignored while a session is active.
    pub fn start(&mut self) {
        self.dispatch(Input::Start);
    }

    /// End the session and rewind the transport
    pub fn stop(&mut self) {
        self.dispatch(Input::Stop);
    }

    pub fn pause(&mut self) {
        self.dispatch(Input::Pause);
    }

    pub fn resume(&mut self) {
        self.dispatch(Input::Resume);
    }

    /// Start when idle, otherwise pause while a cycle is playing and resume
    /// in every other case
    ///
    /// "Playing" is the session's phase, not the transport's, so a session
    /// running without audio can still be paused.
    pub fn toggle(&mut self) {
        match self.session.phase() {
            Phase::Idle => self.start(),
            Phase::Playing { paused: false } => self.pause(),
            _ => self.resume(),
        }
    }

    /// Change the wait between cycles
    ///
    /// A wait in progress restarts at the new value, or ends immediately when
    /// the new value is 0. While playing, the value applies at the next wait.
    pub fn set_interval(&mut self, seconds: u32) {
        self.dispatch(Input::SetInterval(seconds));
    }

    pub fn interval(&self) -> u32 {
        self.session.interval()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        self.session.remaining_seconds()
    }

    pub fn cycle_count(&self) -> u32 {
        self.session.cycle_count()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            is_active: self.session.is_active(),
            is_playing: self.transport.is_playing(),
            remaining_seconds: self.session.remaining_seconds(),
            cycle_count: self.session.cycle_count(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Direct access for loading and volume. Transport changes made here
    /// bypass the session.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&SchedulerEvent) + 'static,
    ) -> SubscriptionId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// When the next timer is due, for hosts that sleep between pumps
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Fire every timer that is due, in deadline order, then let the
    /// transport do its own periodic work
    pub fn pump(&mut self) {
        let now = self.clock.now();
        while let Some((kind, deadline)) = self.timers.pop_due(now) {
            self.firing_at = Some(deadline);
            let input = match kind {
                TimerKind::CycleEnd => Input::CycleElapsed,
                TimerKind::Countdown => Input::CountdownTick,
            };
            self.dispatch(input);
            self.firing_at = None;
        }
        self.transport.pump();
    }

    /// End the session, drop all listeners and hand back the transport
    pub fn dispose(mut self) -> T {
        self.stop();
        self.observers.clear();
        self.transport
    }

    fn dispatch(&mut self, input: Input) {
        let before = self.session.phase();
        let effects = self.session.handle(input);
        if effects.is_empty() {
            return;
        }
        log::debug!("{:?}: {:?} -> {:?}", input, before, self.session.phase());
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::CancelTimers => self.timers.cancel_all(),
            Effect::PlayEngine => self.transport.play(),
            Effect::PauseEngine => self.transport.pause(),
            Effect::PauseAtLoopStart => self.transport.pause_at_loop_start(),
            Effect::StopEngine => self.transport.stop(),
            Effect::ArmCycleTimer => {
                let deadline = self.clock.now() + self.time_to_loop_boundary();
                self.timers.arm(TimerKind::CycleEnd, deadline);
            }
            Effect::ArmCountdown => {
                let base = self.firing_at.unwrap_or_else(|| self.clock.now());
                self.timers.arm(TimerKind::Countdown, base + COUNTDOWN_STEP);
            }
            Effect::CycleStarted(n) => self.observers.notify(&SchedulerEvent::CycleStarted(n)),
            Effect::IntervalStarted(s) => {
                self.observers.notify(&SchedulerEvent::IntervalStarted(s))
            }
            Effect::IntervalTick(s) => self.observers.notify(&SchedulerEvent::IntervalTick(s)),
            Effect::IntervalEnded => self.observers.notify(&SchedulerEvent::IntervalEnded),
            Effect::Broadcast => {
                let snapshot = self.snapshot();
                self.observers.notify(&SchedulerEvent::StateChanged(snapshot));
            }
        }
    }

    /// Time until the transport wraps, so the wait starts at the seam
    fn time_to_loop_boundary(&self) -> Duration {
        let duration = self.transport.duration();
        if !duration.is_finite() || duration <= 0.0 {
            return FALLBACK_CYCLE;
        }
        let position = self.transport.current_time().clamp(0.0, duration);
        Duration::from_secs_f64(duration - position)
    }
}
