//! What the UI shows, folded from engine and scheduler events

use std::cell::RefCell;
use std::rc::Rc;

use crate::audio::{EngineEvent, PlaybackEngine, TransportState};
use crate::repetition::{RepetitionScheduler, SchedulerEvent, SessionSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerStatus {
    pub transport: TransportState,
    /// Seconds into the loop, as of the last time update
    pub position: f64,
    pub duration: f64,
    pub session: SessionSnapshot,
}

impl PlayerStatus {
    /// Current state read straight from the components
    pub fn read(scheduler: &RepetitionScheduler<PlaybackEngine>) -> Self {
        let engine = scheduler.transport();
        Self {
            transport: engine.state(),
            position: engine.current_time(),
            duration: engine.duration(),
            session: scheduler.snapshot(),
        }
    }

    /// Subscribe a shared status to both event streams
    ///
    /// The returned cell is kept current for as long as the scheduler and
    /// its engine live.
    pub fn attach(scheduler: &mut RepetitionScheduler<PlaybackEngine>) -> Rc<RefCell<Self>> {
        let status = Rc::new(RefCell::new(Self::read(scheduler)));

        let engine_status = Rc::clone(&status);
        scheduler
            .transport_mut()
            .subscribe(move |event| engine_status.borrow_mut().apply_engine(event));

        let session_status = Rc::clone(&status);
        scheduler.subscribe(move |event| session_status.borrow_mut().apply_scheduler(event));

        status
    }

    pub fn apply_engine(&mut self, event: &EngineEvent) {
        match *event {
            EngineEvent::StateChanged(state) => {
                self.transport = state;
                if state == TransportState::Stopped {
                    self.position = 0.0;
                }
            }
            EngineEvent::TimeUpdate(position) => self.position = position,
        }
    }

    pub fn apply_scheduler(&mut self, event: &SchedulerEvent) {
        if let SchedulerEvent::StateChanged(snapshot) = *event {
            self.session = snapshot;
        }
    }

    /// Fraction of the loop played, in `[0, 1]`
    pub fn progress(&self) -> f32 {
        if self.duration > 0.0 {
            (self.position / self.duration).clamp(0.0, 1.0) as f32
        } else {
            0.0
        }
    }

    pub fn label(&self) -> String {
        if let Some(remaining) = self.session.remaining_seconds {
            return format!("Waiting, next in {}s", remaining);
        }
        match self.transport {
            TransportState::Stopped => "Stopped".to_string(),
            TransportState::Playing => "Playing".to_string(),
            TransportState::Paused => "Paused".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::test_support::{wav_source, RecordingOutput};
    use std::time::Duration;

    #[test]
    fn test_labels() {
        let mut status = PlayerStatus::default();
        assert_eq!(status.label(), "Stopped");

        status.apply_engine(&EngineEvent::StateChanged(TransportState::Playing));
        assert_eq!(status.label(), "Playing");

        status.apply_engine(&EngineEvent::StateChanged(TransportState::Paused));
        assert_eq!(status.label(), "Paused");

        status.apply_scheduler(&SchedulerEvent::StateChanged(SessionSnapshot {
            is_active: true,
            is_playing: false,
            remaining_seconds: Some(7),
            cycle_count: 1,
        }));
        assert_eq!(status.label(), "Waiting, next in 7s");
    }

    #[test]
    fn test_progress_handles_empty_loop() {
        let mut status = PlayerStatus::default();
        status.position = 3.0;
        assert_eq!(status.progress(), 0.0);

        status.duration = 4.0;
        assert_eq!(status.progress(), 0.75);
    }

    #[test]
    fn test_attached_status_follows_a_session() {
        let clock = Rc::new(ManualClock::new());
        let mut engine = PlaybackEngine::new(Box::new(RecordingOutput::new()), clock.clone());
        engine.load(&wav_source(1.0)).unwrap();
        let mut scheduler = RepetitionScheduler::new(engine, clock.clone(), 3);

        let status = PlayerStatus::attach(&mut scheduler);
        assert_eq!(status.borrow().label(), "Stopped");
        assert_eq!(status.borrow().duration, 1.0);

        scheduler.start();
        assert_eq!(status.borrow().label(), "Playing");
        assert_eq!(status.borrow().session.cycle_count, 1);

        for _ in 0..5 {
            clock.advance(Duration::from_millis(100));
            scheduler.pump();
        }
        assert!((status.borrow().position - 0.5).abs() < 1e-6);

        for _ in 0..15 {
            clock.advance(Duration::from_millis(100));
            scheduler.pump();
        }
        assert_eq!(status.borrow().label(), "Waiting, next in 2s");
        assert_eq!(status.borrow().transport, TransportState::Paused);

        scheduler.stop();
        assert_eq!(status.borrow().label(), "Stopped");
        assert_eq!(status.borrow().position, 0.0);
        assert!(!status.borrow().session.is_active);
    }
}
