//! Sound output
//!
//! The looping itself happens here, at the sample level: the audio callback
//! owns a [`LoopVoice`] that walks the decoded buffer and wraps its cursor back
//! to the start without ever leaving the callback. Nothing on the UI side
//! re-triggers playback at the loop point, so the seam is sample accurate.
//!
//! The engine talks to the callback through a lock-free ring buffer of
//! [`OutputCommand`]s; volume goes through an atomic. Buffers the voice lets
//! go of travel back on a second ring and are freed on the engine side, never
//! in the callback.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use thiserror::Error;

use super::decode::DecodedAudio;

const COMMAND_CAPACITY: usize = 16;

/// Errors opening or starting the output device
#[derive(Error, Debug, Clone)]
pub enum OutputError {
    #[error("No output device available")]
    NoDevice,

    #[error("Failed to get output config: {0}")]
    Config(String),

    #[error("Failed to build output stream: {0}")]
    Build(String),

    #[error("Failed to start output stream: {0}")]
    Play(String),
}

/// The sound-output primitive the engine drives
pub trait OutputSink {
    /// Begin looping `audio` from `frame`, replacing whatever was playing
    fn start(&mut self, audio: Arc<DecodedAudio>, frame: usize) -> Result<(), OutputError>;

    /// Silence output. The voice forgets its buffer.
    fn halt(&mut self);

    /// Apply a gain in `[0, 1]`, effective immediately
    fn set_volume(&mut self, volume: f32);

    /// Release the device
    fn close(&mut self) {}
}

/// Messages from the engine to the audio callback
pub enum OutputCommand {
    Start {
        audio: Arc<DecodedAudio>,
        frame: usize,
    },
    Halt,
}

/// Sample-level looping playback of one buffer
///
/// `cursor` is a fractional frame index into the source; it advances by
/// `source_rate / device_rate` per output frame and wraps at the end of the
/// buffer. Interpolation also wraps, so the last frame blends into the first.
pub struct LoopVoice {
    audio: Option<Arc<DecodedAudio>>,
    cursor: f64,
    step: f64,
    device_rate: u32,
    out_channels: usize,
}

impl LoopVoice {
    pub fn new(device_rate: u32, out_channels: usize) -> Self {
        Self {
            audio: None,
            cursor: 0.0,
            step: 1.0,
            device_rate: device_rate.max(1),
            out_channels: out_channels.max(1),
        }
    }

    /// Apply a command and hand back the buffer it replaced, if any
    pub fn apply(&mut self, command: OutputCommand) -> Option<Arc<DecodedAudio>> {
        match command {
            OutputCommand::Start { audio, frame } => {
                self.step = audio.sample_rate() as f64 / self.device_rate as f64;
                self.cursor = (frame % audio.frames()) as f64;
                self.audio.replace(audio)
            }
            OutputCommand::Halt => {
                self.cursor = 0.0;
                self.audio.take()
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.audio.is_some()
    }

    /// Current source frame position
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Fill an interleaved device buffer
    pub fn render<T>(&mut self, data: &mut [T], volume: f32)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let Some(audio) = self.audio.as_ref() else {
            for sample in data.iter_mut() {
                *sample = T::EQUILIBRIUM;
            }
            return;
        };

        let frames = audio.frames();
        let src_channels = audio.channels();
        let len = frames as f64;

        for out_frame in data.chunks_mut(self.out_channels) {
            let index = self.cursor as usize;
            let frac = (self.cursor - index as f64) as f32;
            let current = audio.frame(index);
            let next = audio.frame((index + 1) % frames);

            for (ch, out) in out_frame.iter_mut().enumerate() {
                let value = if self.out_channels == 1 && src_channels > 1 {
                    // Fold to mono
                    let a: f32 = current.iter().sum::<f32>() / src_channels as f32;
                    let b: f32 = next.iter().sum::<f32>() / src_channels as f32;
                    a + (b - a) * frac
                } else {
                    let src = ch % src_channels;
                    current[src] + (next[src] - current[src]) * frac
                };
                *out = (value * volume).to_sample::<T>();
            }

            self.cursor += self.step;
            if self.cursor >= len {
                self.cursor -= len;
                // Guard against steps larger than the whole buffer
                if self.cursor >= len {
                    self.cursor %= len;
                }
            }
        }
    }
}

/// Ring buffer ends and shared gain owned by the audio callback
struct CallbackChannels {
    commands: ringbuf::HeapCons<OutputCommand>,
    retired: ringbuf::HeapProd<Arc<DecodedAudio>>,
    volume: Arc<AtomicU32>,
}

/// Output through the default cpal device
///
/// The stream is opened lazily on the first `start` and kept until `close`.
pub struct CpalOutput {
    stream: Option<cpal::Stream>,
    commands: Option<ringbuf::HeapProd<OutputCommand>>,
    /// Buffers released by the callback, dropped here
    retired: Option<ringbuf::HeapCons<Arc<DecodedAudio>>>,
    volume: Arc<AtomicU32>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self {
            stream: None,
            commands: None,
            retired: None,
            volume: Arc::new(AtomicU32::new(1.0_f32.to_bits())),
        }
    }

    fn ensure_stream(&mut self) -> Result<(), OutputError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| OutputError::Config(e.to_string()))?;

        log::info!(
            "Opening output device {} ({:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config
        );

        let rb = HeapRb::<OutputCommand>::new(COMMAND_CAPACITY);
        let (prod, cons) = rb.split();
        // Every command retires at most one buffer
        let retired_rb = HeapRb::<Arc<DecodedAudio>>::new(COMMAND_CAPACITY);
        let (retired_prod, retired_cons) = retired_rb.split();

        let voice = LoopVoice::new(config.sample_rate().0, config.channels() as usize);
        let volume = Arc::clone(&self.volume);

        let channels = CallbackChannels {
            commands: cons,
            retired: retired_prod,
            volume,
        };
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), voice, channels)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), voice, channels)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), voice, channels)?
            }
            format => {
                return Err(OutputError::Build(format!(
                    "Unsupported sample format {:?}",
                    format
                )))
            }
        };

        stream.play().map_err(|e| OutputError::Play(e.to_string()))?;

        self.stream = Some(stream);
        self.commands = Some(prod);
        self.retired = Some(retired_cons);
        Ok(())
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut voice: LoopVoice,
        mut channels: CallbackChannels,
    ) -> Result<cpal::Stream, OutputError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    while let Some(command) = channels.commands.try_pop() {
                        if let Some(old) = voice.apply(command) {
                            // Only drops here if the engine stopped draining
                            let _ = channels.retired.try_push(old);
                        }
                    }
                    let gain = f32::from_bits(channels.volume.load(Ordering::Relaxed));
                    voice.render(data, gain);
                },
                |err| log::error!("Audio output error: {}", err),
                None,
            )
            .map_err(|e| OutputError::Build(e.to_string()))
    }

    fn collect_retired(&mut self) {
        if let Some(retired) = self.retired.as_mut() {
            while retired.try_pop().is_some() {}
        }
    }

    fn send(&mut self, command: OutputCommand) {
        self.collect_retired();
        if let Some(prod) = self.commands.as_mut() {
            if prod.try_push(command).is_err() {
                log::warn!("Output command queue full, dropping command");
            }
        }
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for CpalOutput {
    fn start(&mut self, audio: Arc<DecodedAudio>, frame: usize) -> Result<(), OutputError> {
        self.ensure_stream()?;
        self.send(OutputCommand::Start { audio, frame });
        Ok(())
    }

    fn halt(&mut self) {
        self.send(OutputCommand::Halt);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn close(&mut self) {
        self.commands = None;
        if self.stream.take().is_some() {
            log::info!("Output device closed");
        }
        self.collect_retired();
        self.retired = None;
    }
}

/// Output that discards everything; for hosts without a sound device
#[derive(Debug, Default)]
pub struct NullOutput;

impl OutputSink for NullOutput {
    fn start(&mut self, _audio: Arc<DecodedAudio>, _frame: usize) -> Result<(), OutputError> {
        Ok(())
    }

    fn halt(&mut self) {}

    fn set_volume(&mut self, _volume: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, rate: u32) -> Arc<DecodedAudio> {
        let samples = (0..frames).map(|i| (i + 1) as f32 / frames as f32).collect();
        Arc::new(DecodedAudio::from_interleaved(samples, 1, rate).unwrap())
    }

    #[test]
    fn test_idle_voice_renders_silence() {
        let mut voice = LoopVoice::new(48000, 2);
        let mut out = [1.0f32; 8];
        voice.render(&mut out, 1.0);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_loop_wraps_without_gap() {
        // 4 frames at the device rate; render 3 full loops
        let audio = ramp(4, 100);
        let mut voice = LoopVoice::new(100, 1);
        voice.apply(OutputCommand::Start { audio, frame: 0 });

        let mut out = [0.0f32; 12];
        voice.render(&mut out, 1.0);

        let expected = [0.25, 0.5, 0.75, 1.0];
        for (i, sample) in out.iter().enumerate() {
            assert!((sample - expected[i % 4]).abs() < 1e-6, "frame {i}");
        }
        // No silent frame anywhere across the seams
        assert!(out.iter().all(|s| *s > 0.0));
    }

    #[test]
    fn test_start_frame_offsets_playback() {
        let audio = ramp(4, 100);
        let mut voice = LoopVoice::new(100, 1);
        voice.apply(OutputCommand::Start { audio, frame: 6 });

        let mut out = [0.0f32; 2];
        voice.render(&mut out, 1.0);
        assert!((out[0] - 0.75).abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resampled_seam_interpolates_into_first_frame() {
        // Device runs at twice the source rate
        let audio = ramp(2, 50);
        let mut voice = LoopVoice::new(100, 1);
        voice.apply(OutputCommand::Start { audio, frame: 1 });

        let mut out = [0.0f32; 3];
        voice.render(&mut out, 1.0);
        assert!((out[0] - 1.0).abs() < 1e-6);
        // Halfway between the last frame (1.0) and the first (0.5)
        assert!((out[1] - 0.75).abs() < 1e-6);
        assert!((out[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_volume_and_stereo_mapping() {
        let audio = Arc::new(DecodedAudio::from_interleaved(vec![0.5, -0.5], 2, 10).unwrap());
        let mut voice = LoopVoice::new(10, 2);
        voice.apply(OutputCommand::Start { audio: Arc::clone(&audio), frame: 0 });

        let mut out = [0.0f32; 2];
        voice.render(&mut out, 0.5);
        assert_eq!(out, [0.25, -0.25]);

        let mut mono = LoopVoice::new(10, 1);
        mono.apply(OutputCommand::Start { audio, frame: 0 });
        let mut out = [1.0f32; 1];
        mono.render(&mut out, 1.0);
        assert_eq!(out, [0.0]);
    }

    #[test]
    fn test_replaced_buffers_are_handed_back() {
        let first = ramp(4, 100);
        let second = ramp(2, 100);
        let mut voice = LoopVoice::new(100, 1);

        assert!(voice
            .apply(OutputCommand::Start { audio: Arc::clone(&first), frame: 0 })
            .is_none());

        let released = voice.apply(OutputCommand::Start { audio: Arc::clone(&second), frame: 0 });
        assert!(Arc::ptr_eq(&released.unwrap(), &first));

        let released = voice.apply(OutputCommand::Halt).unwrap();
        assert!(Arc::ptr_eq(&released, &second));
        // The voice keeps no reference of its own
        assert_eq!(Arc::strong_count(&second), 2);
        drop(released);
        assert_eq!(Arc::strong_count(&second), 1);

        assert!(voice.apply(OutputCommand::Halt).is_none());
    }

    #[test]
    fn test_halt_silences_voice() {
        let mut voice = LoopVoice::new(100, 1);
        voice.apply(OutputCommand::Start { audio: ramp(4, 100), frame: 0 });
        assert!(voice.is_active());

        voice.apply(OutputCommand::Halt);
        let mut out = [1.0f32; 4];
        voice.render(&mut out, 1.0);
        assert!(!voice.is_active());
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
