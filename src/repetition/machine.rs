//! Repetition state machine
//!
//! Pure: [`Session::handle`] takes an input and returns the effects the
//! scheduler must carry out, in order. Every transition that leaves a timed
//! phase starts with [`Effect::CancelTimers`], and timer inputs arriving in a
//! phase that did not arm them are ignored.

/// Longest allowed wait between cycles
pub const MAX_INTERVAL_SECONDS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Audio is (or, if paused, will be) sounding
    Playing { paused: bool },
    /// Silent gap before the next cycle
    Waiting { remaining: u32, paused: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Start,
    Stop,
    Pause,
    Resume,
    SetInterval(u32),
    /// One loop's worth of playback has elapsed
    CycleElapsed,
    /// One second of the wait has elapsed
    CountdownTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    CancelTimers,
    PlayEngine,
    PauseEngine,
    /// Pause with the position rewound to the seam
    PauseAtLoopStart,
    StopEngine,
    /// Fire `CycleElapsed` at the next loop boundary
    ArmCycleTimer,
    /// Fire `CountdownTick` in one second
    ArmCountdown,
    CycleStarted(u32),
    IntervalStarted(u32),
    IntervalTick(u32),
    IntervalEnded,
    /// Publish the combined session state
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    interval: u32,
    phase: Phase,
    cycle_count: u32,
}

impl Session {
    pub fn new(interval_seconds: u32) -> Self {
        Self {
            interval: interval_seconds.min(MAX_INTERVAL_SECONDS),
            phase: Phase::Idle,
            cycle_count: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn is_paused(&self) -> bool {
        matches!(
            self.phase,
            Phase::Playing { paused: true } | Phase::Waiting { paused: true, .. }
        )
    }

    /// Seconds left in the current wait; `None` outside the waiting phase
    pub fn remaining_seconds(&self) -> Option<u32> {
        match self.phase {
            Phase::Waiting { remaining, .. } => Some(remaining),
            _ => None,
        }
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        use Effect::*;

        match (self.phase, input) {
            (Phase::Idle, Input::Start) => {
                self.cycle_count = 0;
                self.begin_cycle(Vec::new())
            }
            (_, Input::Start) => Vec::new(),

            (Phase::Idle, Input::Stop) => Vec::new(),
            (_, Input::Stop) => {
                self.phase = Phase::Idle;
                vec![CancelTimers, StopEngine, Broadcast]
            }

            (Phase::Playing { paused: false }, Input::Pause) => {
                self.phase = Phase::Playing { paused: true };
                vec![CancelTimers, PauseEngine, Broadcast]
            }
            (Phase::Waiting { remaining, paused: false }, Input::Pause) => {
                self.phase = Phase::Waiting {
                    remaining,
                    paused: true,
                };
                vec![CancelTimers, Broadcast]
            }
            (_, Input::Pause) => Vec::new(),

            (Phase::Playing { paused: true }, Input::Resume) => {
                self.phase = Phase::Playing { paused: false };
                let mut effects = vec![PlayEngine];
                if self.interval > 0 {
                    effects.push(ArmCycleTimer);
                }
                effects.push(Broadcast);
                effects
            }
            (Phase::Waiting { remaining, paused: true }, Input::Resume) => {
                self.phase = Phase::Waiting {
                    remaining,
                    paused: false,
                };
                vec![ArmCountdown, Broadcast]
            }
            (_, Input::Resume) => Vec::new(),

            (_, Input::SetInterval(seconds)) => self.set_interval(seconds),

            (Phase::Playing { paused: false }, Input::CycleElapsed) => {
                if self.interval == 0 {
                    // Switched to continuous mode mid-cycle; keep looping
                    return Vec::new();
                }
                self.phase = Phase::Waiting {
                    remaining: self.interval,
                    paused: false,
                };
                vec![
                    PauseAtLoopStart,
                    IntervalStarted(self.interval),
                    ArmCountdown,
                    Broadcast,
                ]
            }
            (_, Input::CycleElapsed) => Vec::new(),

            (Phase::Waiting { remaining, paused: false }, Input::CountdownTick) => {
                let left = remaining.saturating_sub(1);
                if left == 0 {
                    self.begin_cycle(vec![IntervalTick(0), IntervalEnded])
                } else {
                    self.phase = Phase::Waiting {
                        remaining: left,
                        paused: false,
                    };
                    vec![IntervalTick(left), ArmCountdown, Broadcast]
                }
            }
            (_, Input::CountdownTick) => Vec::new(),
        }
    }

    fn set_interval(&mut self, seconds: u32) -> Vec<Effect> {
        use Effect::*;

        let seconds = seconds.min(MAX_INTERVAL_SECONDS);
        let previous = self.interval;
        self.interval = seconds;

        match self.phase {
            // A running or paused wait restarts at the new value
            Phase::Waiting { .. } => {
                if seconds == 0 {
                    self.begin_cycle(vec![CancelTimers, IntervalEnded])
                } else {
                    self.phase = Phase::Waiting {
                        remaining: seconds,
                        paused: false,
                    };
                    vec![CancelTimers, IntervalStarted(seconds), ArmCountdown, Broadcast]
                }
            }
            // Leaving continuous mode: wait after the loop currently playing
            Phase::Playing { paused: false } if previous == 0 && seconds > 0 => {
                vec![ArmCycleTimer]
            }
            _ => Vec::new(),
        }
    }

    fn begin_cycle(&mut self, mut effects: Vec<Effect>) -> Vec<Effect> {
        use Effect::*;

        self.phase = Phase::Playing { paused: false };
        self.cycle_count += 1;
        effects.extend([CancelTimers, PlayEngine, CycleStarted(self.cycle_count)]);
        if self.interval > 0 {
            effects.push(ArmCycleTimer);
        }
        effects.push(Broadcast);
        effects
    }
}
