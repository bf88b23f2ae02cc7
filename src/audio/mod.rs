//! Audio module - loading, decoding and gapless loop playback
//!
//! This module provides:
//! - Audio sources (remote, file, inline data URI)
//! - Decoding to an in-memory sample buffer
//! - Sample-level looping output
//! - The playback engine that ties them together

mod decode;
mod engine;
mod loader;
mod output;
mod source;

use thiserror::Error;

pub use decode::{decode, DecodeError, DecodedAudio};
pub use engine::{
    EngineConfig, EngineEvent, PlaybackEngine, TransportState, DEFAULT_FETCH_TIMEOUT,
    DEFAULT_TIME_UPDATE_INTERVAL,
};
pub use loader::{fetch_and_decode, spawn_load, PendingLoad};
pub use output::{CpalOutput, LoopVoice, NullOutput, OutputCommand, OutputError, OutputSink};
pub use source::{hint_from_mime, AudioSource, FetchedBytes, SourceFetchError};

/// Why a load did not produce a buffer
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] SourceFetchError),

    #[error("Failed to decode audio: {0}. The audio format may not be supported.")]
    Decode(#[from] DecodeError),

    #[error("Load was abandoned before it finished")]
    Cancelled,
}
