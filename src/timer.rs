//! Cooperative one-shot timers
//!
//! There is no timer thread. A component arms deadlines here and its host
//! calls `pump()` regularly; `pop_due` hands back whatever has expired, in
//! deadline order. Cancelling removes the entry, so a cancelled timer can
//! never fire later.

use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer<K> {
    kind: K,
    deadline: Instant,
}

/// At most one pending timer per kind
#[derive(Debug)]
pub struct TimerQueue<K> {
    timers: Vec<Timer<K>>,
}

impl<K: Copy + Eq> TimerQueue<K> {
    pub fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Arm (or re-arm) the timer of this kind
    pub fn arm(&mut self, kind: K, deadline: Instant) {
        self.cancel(kind);
        self.timers.push(Timer { kind, deadline });
    }

    pub fn cancel(&mut self, kind: K) {
        self.timers.retain(|t| t.kind != kind);
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_armed(&self, kind: K) -> bool {
        self.timers.iter().any(|t| t.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    /// Remove and return the earliest timer whose deadline is not after `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<(K, Instant)> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| t.deadline)
            .map(|(i, _)| i)?;
        let timer = self.timers.swap_remove(index);
        Some((timer.kind, timer.deadline))
    }
}

impl<K: Copy + Eq> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
