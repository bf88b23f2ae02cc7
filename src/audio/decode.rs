//! Decoding an encoded payload into an in-memory sample buffer
//!
//! The whole payload is decoded once with symphonia. The result is immutable
//! and shared with the audio callback through an `Arc`.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors that can occur while decoding audio bytes
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to probe audio format: {0}")]
    Probe(String),

    #[error("No audio tracks found")]
    NoTrack,

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Failed to read audio stream: {0}")]
    Stream(String),

    #[error("Audio contained no decodable frames")]
    Empty,
}

/// Decoded PCM audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved samples
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl DecodedAudio {
    /// Build from interleaved samples. `channels` and `sample_rate` must be non-zero.
    pub fn from_interleaved(
        samples: Vec<f32>,
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self, DecodeError> {
        if channels == 0 || sample_rate == 0 {
            return Err(DecodeError::Stream(format!(
                "invalid layout: {} channels at {} Hz",
                channels, sample_rate
            )));
        }
        let whole = samples.len() - samples.len() % channels;
        let mut samples = samples;
        samples.truncate(whole);
        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// One frame's samples, one per channel
    #[inline]
    pub fn frame(&self, index: usize) -> &[f32] {
        let start = index * self.channels;
        &self.samples[start..start + self.channels]
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Peak amplitude per bucket, `points` buckets across the whole buffer
    pub fn waveform(&self, points: usize) -> Vec<f32> {
        let frames = self.frames();
        if points == 0 || frames == 0 {
            return Vec::new();
        }
        let step = frames.div_ceil(points).max(1);
        (0..frames)
            .step_by(step)
            .map(|start| {
                let end = (start + step).min(frames);
                (start..end)
                    .flat_map(|i| self.frame(i).iter())
                    .fold(0.0f32, |peak, s| peak.max(s.abs()))
            })
            .collect()
    }
}

/// Interleaved samples collected packet by packet
///
/// The first packet fixes the layout. Later packets with a different channel
/// count or rate are dropped, since appending them would scramble the
/// interleaving.
#[derive(Debug, Default)]
struct PcmAccumulator {
    samples: Vec<f32>,
    layout: Option<(usize, u32)>,
    mismatched: usize,
}

impl PcmAccumulator {
    /// Append one packet. Returns false if it was dropped.
    fn push(&mut self, channels: usize, sample_rate: u32, interleaved: &[f32]) -> bool {
        if channels == 0 || interleaved.is_empty() {
            return false;
        }
        match self.layout {
            None => self.layout = Some((channels, sample_rate)),
            Some(layout) if layout != (channels, sample_rate) => {
                self.mismatched += 1;
                return false;
            }
            Some(_) => {}
        }
        self.samples.extend_from_slice(interleaved);
        true
    }
}

/// Decode a complete encoded payload
///
/// `hint` is a file extension such as `"mp3"`; probing still works without
/// it, it just tries fewer formats first.
pub fn decode(bytes: Vec<u8>, hint: Option<&str>) -> Result<DecodedAudio, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut probe_hint = Hint::new();
    if let Some(ext) = hint {
        probe_hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &probe_hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Probe(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedCodec(e.to_string()))?;

    let mut pcm = PcmAccumulator::default();
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => {
                // A broken tail after good audio is still usable
                if pcm.samples.is_empty() {
                    return Err(DecodeError::Stream(e.to_string()));
                }
                log::warn!("Stopping decode at stream error: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if decoded.frames() == 0 {
                    continue;
                }
                let spec = *decoded.spec();
                let capacity = decoded.capacity() as u64;
                let mut buf = SampleBuffer::<f32>::new(capacity, spec);
                buf.copy_interleaved_ref(decoded);
                pcm.push(spec.channels.count(), spec.rate, buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                skipped += 1;
                log::debug!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(DecodeError::Stream(e.to_string())),
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} undecodable packets", skipped);
    }
    if pcm.mismatched > 0 {
        log::warn!(
            "Dropped {} packets whose channel layout or rate changed mid-stream",
            pcm.mismatched
        );
    }

    let Some((channels, sample_rate)) = pcm.layout else {
        return Err(DecodeError::Empty);
    };
    let audio = DecodedAudio::from_interleaved(pcm.samples, channels, sample_rate)?;
    log::info!(
        "Decoded {:.2}s of audio ({} ch @ {} Hz)",
        audio.duration(),
        audio.channels(),
        audio.sample_rate()
    );
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::wav_bytes;

    #[test]
    fn test_decode_wav_reports_exact_duration() {
        let bytes = wav_bytes(4.0, 8000, 1);
        let audio = decode(bytes, Some("wav")).unwrap();

        assert_eq!(audio.sample_rate(), 8000);
        assert_eq!(audio.channels(), 1);
        assert_eq!(audio.frames(), 32000);
        assert!((audio.duration() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_stereo_without_hint() {
        let bytes = wav_bytes(0.5, 22050, 2);
        let audio = decode(bytes, None).unwrap();

        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frame(10).len(), 2);
        assert!((audio.duration() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_corrupted_bytes_fail_to_decode() {
        let garbage = b"this is definitely not an audio container".to_vec();
        let result = decode(garbage, Some("mp3"));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_payload_fails() {
        assert!(decode(Vec::new(), None).is_err());
    }

    #[test]
    fn test_from_interleaved_drops_partial_frame() {
        let audio = DecodedAudio::from_interleaved(vec![0.1, 0.2, 0.3], 2, 100).unwrap();
        assert_eq!(audio.frames(), 1);
        assert_eq!(audio.frame(0), &[0.1, 0.2]);
    }

    #[test]
    fn test_from_interleaved_rejects_bad_layout() {
        assert!(DecodedAudio::from_interleaved(vec![0.0; 4], 0, 100).is_err());
        assert!(DecodedAudio::from_interleaved(vec![0.0; 4], 1, 0).is_err());
        assert!(matches!(
            DecodedAudio::from_interleaved(Vec::new(), 1, 100),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn test_packets_with_changed_layout_are_dropped() {
        let mut pcm = PcmAccumulator::default();
        assert!(pcm.push(1, 44100, &[0.1, 0.2]));
        assert!(!pcm.push(2, 44100, &[0.3, 0.4, 0.5, 0.6]));
        assert!(!pcm.push(1, 48000, &[0.7]));
        assert!(pcm.push(1, 44100, &[0.8]));

        assert_eq!(pcm.layout, Some((1, 44100)));
        assert_eq!(pcm.samples, vec![0.1, 0.2, 0.8]);
        assert_eq!(pcm.mismatched, 2);
    }

    #[test]
    fn test_empty_packets_do_not_fix_layout() {
        let mut pcm = PcmAccumulator::default();
        assert!(!pcm.push(2, 22050, &[]));
        assert!(pcm.push(1, 8000, &[0.5]));
        assert_eq!(pcm.layout, Some((1, 8000)));
    }

    #[test]
    fn test_waveform_peaks() {
        let samples = vec![0.1, -0.9, 0.2, 0.3, -0.4, 0.0];
        let audio = DecodedAudio::from_interleaved(samples, 1, 6).unwrap();

        let overview = audio.waveform(3);
        assert_eq!(overview.len(), 3);
        assert!((overview[0] - 0.9).abs() < 1e-6);
        assert!((overview[1] - 0.3).abs() < 1e-6);
        assert!((overview[2] - 0.4).abs() < 1e-6);

        assert!(audio.waveform(0).is_empty());
    }
}
