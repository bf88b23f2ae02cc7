//! Fetch and decode off the UI thread
//!
//! `load` on the engine blocks for as long as the fetch and decode take. The
//! front end instead spawns a [`PendingLoad`], keeps rendering, and installs
//! the result when `poll` yields it. Dropping a pending load abandons it: the
//! worker finishes but its result goes nowhere.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use super::decode::{decode, DecodedAudio};
use super::source::AudioSource;
use super::LoadError;

/// Fetch and decode in one step
pub fn fetch_and_decode(source: &AudioSource, timeout: Duration) -> Result<DecodedAudio, LoadError> {
    let fetched = source.fetch(timeout)?;
    let audio = decode(fetched.bytes, fetched.hint.as_deref())?;
    Ok(audio)
}

/// A load running on a worker thread
#[derive(Debug)]
pub struct PendingLoad {
    label: String,
    receiver: Receiver<Result<DecodedAudio, LoadError>>,
}

impl PendingLoad {
    /// What is being loaded
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Non-blocking check for the result. Yields it at most once.
    pub fn poll(&self) -> Option<Result<DecodedAudio, LoadError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(LoadError::Cancelled)),
        }
    }

    /// Block until the worker is done
    pub fn wait(self) -> Result<DecodedAudio, LoadError> {
        self.receiver.recv().unwrap_or(Err(LoadError::Cancelled))
    }
}

/// Start loading `source` on a new thread
pub fn spawn_load(source: AudioSource, timeout: Duration) -> PendingLoad {
    let label = source.label();
    let (sender, receiver) = mpsc::channel();

    let worker_label = label.clone();
    thread::spawn(move || {
        let result = fetch_and_decode(&source, timeout);
        if let Err(e) = &result {
            log::error!("Loading {} failed: {}", worker_label, e);
        }
        // Receiver gone means the load was superseded
        let _ = sender.send(result);
    });

    PendingLoad { label, receiver }
}
