//! Render module - UI components for the loop display

mod waveform;

pub use waveform::LoopProgress;
