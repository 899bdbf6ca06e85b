//! Audio output: sink abstraction, shared gain and tone synthesis.
//!
//! Acquiring a hardware device is outside this crate. Everything here talks
//! to an [`AudioSink`], a line that accepts signed 16-bit little-endian mono
//! PCM and exposes a settable output level in dB.

pub mod sink;
pub mod synth;

pub use sink::{NullSink, PcmFileSink, Recording, RecordingSink};
pub use synth::{ToneSynthesizer, BUFFER_THRESHOLD};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// PCM layout of a sink line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: f64,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub signed: bool,
    pub big_endian: bool,
}

impl AudioFormat {
    /// Signed 16-bit little-endian mono.
    pub fn pcm16_mono(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
            signed: true,
            big_endian: false,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8) * usize::from(self.channels)
    }

    /// Playback time of `bytes` at this format's rate.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frame = self.bytes_per_sample();
        if frame == 0 || self.sample_rate <= 0.0 {
            return Duration::ZERO;
        }
        let frames = (bytes / frame) as f64;
        Duration::try_from_secs_f64(frames / self.sample_rate).unwrap_or(Duration::MAX)
    }
}

/// Audio errors.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio line is not open")]
    NotOpen,
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("audio device error: {0}")]
    Device(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An output line.
pub trait AudioSink: Send {
    fn open(&mut self, format: AudioFormat) -> Result<(), AudioError>;

    fn start(&mut self) -> Result<(), AudioError>;

    /// Write PCM bytes; returns the number of bytes accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, AudioError>;

    /// Block until queued data has been played.
    fn drain(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    /// Set the output level in dB.
    fn set_level(&mut self, db: f32);

    /// Lowest settable output level in dB.
    fn level_floor(&self) -> f32;
}

/// Creates a fresh sink for each playback.
pub trait SinkFactory: Send + Sync {
    fn create(&self) -> Box<dyn AudioSink>;
}

impl<F> SinkFactory for F
where
    F: Fn() -> Box<dyn AudioSink> + Send + Sync,
{
    fn create(&self) -> Box<dyn AudioSink> {
        self()
    }
}

/// Output level for a gain in [0, 1]: `floor * (1 - gain)`.
///
/// Gain 0 leaves the line at its floor (muted), gain 1 brings it to 0 dB.
pub fn effective_level(floor_db: f32, gain: f32) -> f32 {
    floor_db * (1.0 - gain.clamp(0.0, 1.0))
}

/// Gain shared between feedback tasks.
///
/// Only the feedback domain holds handles to it; the tracking loop never
/// sees one.
#[derive(Debug, Clone, Default)]
pub struct Gain(Arc<AtomicU32>);

impl Gain {
    pub fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_level() {
        assert_eq!(effective_level(-80.0, 0.0), -80.0);
        assert_eq!(effective_level(-80.0, 1.0), 0.0);
        assert!((effective_level(-80.0, 0.6) - -32.0).abs() < 1e-4);
        assert_eq!(effective_level(-80.0, 3.0), 0.0);
    }

    #[test]
    fn test_gain_is_shared_between_clones() {
        let gain = Gain::default();
        assert_eq!(gain.get(), 0.0);
        let handle = gain.clone();
        handle.set(0.8);
        assert_eq!(gain.get(), 0.8);
    }

    #[test]
    fn test_pcm16_format() {
        let format = AudioFormat::pcm16_mono(44_100.0);
        assert_eq!(format.bytes_per_sample(), 2);
        assert!(format.signed);
        assert!(!format.big_endian);
    }

    #[test]
    fn test_duration_of_bytes() {
        let format = AudioFormat::pcm16_mono(8_000.0);
        assert_eq!(format.duration_of(16_000), Duration::from_secs(1));
        assert_eq!(format.duration_of(1_600), Duration::from_millis(100));
        // A trailing half frame plays nothing
        assert_eq!(format.duration_of(1), Duration::ZERO);
    }
}
