//! memloop - loop a short recording with timed pauses for memorization
//!
//! [`audio::PlaybackEngine`] plays one decoded buffer as a gapless loop.
//! [`repetition::RepetitionScheduler`] drives it through play/wait cycles.
//! Both are single-threaded and advance when the host calls `pump()`.

pub mod audio;
pub mod clock;
pub mod library;
pub mod observer;
pub mod repetition;
pub mod settings;
pub mod status;
pub mod timer;

pub use audio::{AudioSource, LoadError, PlaybackEngine, TransportState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use repetition::{RepetitionScheduler, SchedulerEvent, SessionSnapshot, Transport};
pub use status::PlayerStatus;

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::f32::consts::TAU;
    use std::io::Cursor;
    use std::rc::Rc;
    use std::sync::Arc;

    use crate::audio::{AudioSource, DecodedAudio, OutputError, OutputSink};

    /// 16-bit PCM WAV holding a 440 Hz tone
    pub fn wav_bytes(secs: f64, rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let frames = (secs * rate as f64).round() as usize;

        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for i in 0..frames {
                let t = i as f32 / rate as f32;
                let value = ((TAU * 440.0 * t).sin() * 0.5 * i16::MAX as f32) as i16;
                for _ in 0..channels {
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        bytes
    }

    /// Mono 8 kHz inline WAV of the given length
    pub fn wav_source(secs: f64) -> AudioSource {
        AudioSource::Inline {
            bytes: wav_bytes(secs, 8000, 1),
            mime: Some("audio/wav".to_string()),
        }
    }

    #[derive(Debug, Default)]
    pub struct OutputLog {
        /// Start frame of every `start`
        pub starts: Vec<usize>,
        pub halts: usize,
        pub volume: f32,
        pub closed: bool,
    }

    /// Output that records what the engine asked of it
    #[derive(Debug, Default)]
    pub struct RecordingOutput {
        log: Rc<RefCell<OutputLog>>,
    }

    impl RecordingOutput {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn log(&self) -> Rc<RefCell<OutputLog>> {
            Rc::clone(&self.log)
        }
    }

    impl OutputSink for RecordingOutput {
        fn start(&mut self, _audio: Arc<DecodedAudio>, frame: usize) -> Result<(), OutputError> {
            self.log.borrow_mut().starts.push(frame);
            Ok(())
        }

        fn halt(&mut self) {
            self.log.borrow_mut().halts += 1;
        }

        fn set_volume(&mut self, volume: f32) {
            self.log.borrow_mut().volume = volume;
        }

        fn close(&mut self) {
            self.log.borrow_mut().closed = true;
        }
    }

    /// Output with no device behind it
    pub struct FailingOutput;

    impl OutputSink for FailingOutput {
        fn start(&mut self, _audio: Arc<DecodedAudio>, _frame: usize) -> Result<(), OutputError> {
            Err(OutputError::NoDevice)
        }

        fn halt(&mut self) {}

        fn set_volume(&mut self, _volume: f32) {}
    }
}
