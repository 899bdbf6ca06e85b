//! Sine tone synthesis and buffered playback onto an [`AudioSink`].

use super::{effective_level, AudioError, AudioFormat, AudioSink, Gain};
use std::f64::consts::PI;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bytes collected before a flush to the sink: a third of a 4096-sample
/// 16-bit line buffer.
pub const BUFFER_THRESHOLD: usize = 4096 * 2 / 3;

/// Full-scale value of a signed 16-bit sample.
const FULL_SCALE: f64 = 32767.0;

/// Outcome of one playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackReport {
    pub samples: usize,
    pub bytes: usize,
    pub cancelled: bool,
}

/// Lazily generated sine samples.
#[derive(Debug, Clone)]
pub struct SineWave {
    amplitude: f64,
    frequency: f64,
    sample_rate: f64,
    index: usize,
    len: usize,
}

impl Iterator for SineWave {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.index >= self.len {
            return None;
        }
        let i = self.index as f64;
        self.index += 1;
        Some(self.amplitude * (2.0 * PI * i * self.frequency / self.sample_rate).sin())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SineWave {}

/// Tone generator for one session: sample rate and amplitude are fixed,
/// frequency and duration vary per tone.
#[derive(Debug, Clone, Copy)]
pub struct ToneSynthesizer {
    sample_rate: f64,
    amplitude: f64,
}

impl ToneSynthesizer {
    pub fn new(sample_rate: f64, amplitude: f64) -> Self {
        Self {
            sample_rate,
            amplitude,
        }
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::pcm16_mono(self.sample_rate)
    }

    /// Number of samples in a tone: `round(sample_rate * duration) + 1`.
    pub fn sample_count(&self, duration_secs: f64) -> usize {
        (self.sample_rate * duration_secs).round().max(0.0) as usize + 1
    }

    pub fn tone(&self, frequency: f64, duration_secs: f64) -> SineWave {
        SineWave {
            amplitude: self.amplitude,
            frequency,
            sample_rate: self.sample_rate,
            index: 0,
            len: self.sample_count(duration_secs),
        }
    }

    pub fn sine_wave(&self, frequency: f64, duration_secs: f64) -> Vec<f64> {
        self.tone(frequency, duration_secs).collect()
    }

    /// Play a tone on `sink`, taking it through open, start, write, drain
    /// and stop.
    ///
    /// The line level follows `gain` and is re-read at every buffer flush.
    /// Cancellation is checked after each flush; a cancelled playback skips
    /// the remaining samples but still drains and stops the line.
    pub fn play(
        &self,
        sink: &mut dyn AudioSink,
        frequency: f64,
        duration_secs: f64,
        gain: &Gain,
        cancel: &CancellationToken,
    ) -> Result<PlaybackReport, AudioError> {
        sink.open(self.format())?;
        let floor = sink.level_floor();
        let mut level = effective_level(floor, gain.get());
        sink.set_level(level);
        sink.start()?;

        let streamed = self.stream(sink, frequency, duration_secs, gain, cancel, floor, &mut level);
        let drained = sink.drain();
        let stopped = sink.stop();

        let report = streamed?;
        drained?;
        stopped?;
        debug!(
            frequency,
            samples = report.samples,
            cancelled = report.cancelled,
            "Tone played"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn stream(
        &self,
        sink: &mut dyn AudioSink,
        frequency: f64,
        duration_secs: f64,
        gain: &Gain,
        cancel: &CancellationToken,
        floor: f32,
        level: &mut f32,
    ) -> Result<PlaybackReport, AudioError> {
        let mut report = PlaybackReport::default();
        let mut buffer = Vec::with_capacity(BUFFER_THRESHOLD + 2);

        for sample in self.tone(frequency, duration_secs) {
            buffer.extend_from_slice(&quantize(sample));
            report.samples += 1;
            if buffer.len() >= BUFFER_THRESHOLD {
                let next = effective_level(floor, gain.get());
                if next != *level {
                    sink.set_level(next);
                    *level = next;
                }
                write_all(sink, &buffer)?;
                report.bytes += buffer.len();
                buffer.clear();
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    return Ok(report);
                }
            }
        }

        if !buffer.is_empty() {
            write_all(sink, &buffer)?;
            report.bytes += buffer.len();
        }
        Ok(report)
    }
}

/// Clip to [-1, 1] and pack as a signed 16-bit little-endian sample.
pub fn quantize(sample: f64) -> [u8; 2] {
    let clipped = sample.clamp(-1.0, 1.0);
    ((FULL_SCALE * clipped) as i16).to_le_bytes()
}

fn write_all(sink: &mut dyn AudioSink, mut bytes: &[u8]) -> Result<(), AudioError> {
    while !bytes.is_empty() {
        let written = sink.write(bytes)?;
        if written == 0 {
            return Err(AudioError::Device("sink accepted no data".into()));
        }
        bytes = &bytes[written..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::RecordingSink;

    #[test]
    fn test_sample_count_includes_endpoint() {
        let synth = ToneSynthesizer::new(44_100.0, 0.8);
        assert_eq!(synth.sample_count(1.0), 44_101);
        assert_eq!(synth.sine_wave(450.0, 0.5).len(), 22_051);
        assert_eq!(synth.sample_count(0.0), 1);
    }

    #[test]
    fn test_sine_values() {
        let synth = ToneSynthesizer::new(8_000.0, 0.5);
        // Quarter-period steps at fs / 4
        let wave = synth.sine_wave(2_000.0, 0.001);
        assert_eq!(wave.len(), 9);
        assert_eq!(wave[0], 0.0);
        assert!((wave[1] - 0.5).abs() < 1e-12);
        assert!(wave[2].abs() < 1e-12);
        assert!((wave[3] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_quantize_clips_and_packs_little_endian() {
        assert_eq!(quantize(0.0), [0x00, 0x00]);
        assert_eq!(quantize(1.5), [0xFF, 0x7F]);
        assert_eq!(quantize(-1.0), [0x01, 0x80]);
        assert_eq!(quantize(-7.0), [0x01, 0x80]);
        assert_eq!(quantize(0.5), [0xFF, 0x3F]);
    }

    #[test]
    fn test_play_flushes_in_threshold_chunks() {
        let synth = ToneSynthesizer::new(44_100.0, 1.0);
        let sink = RecordingSink::new(-80.0);
        let mut line = sink.clone();
        let report = synth
            .play(&mut line, 450.0, 0.1, &Gain::new(0.8), &CancellationToken::new())
            .unwrap();

        let recording = sink.recording();
        assert_eq!(report.samples, 4_411);
        assert_eq!(recording.bytes.len(), 4_411 * 2);
        let (last, full) = recording.writes.split_last().unwrap();
        assert!(full.iter().all(|w| *w == BUFFER_THRESHOLD));
        assert!(*last <= BUFFER_THRESHOLD);
        assert_eq!(recording.events.first(), Some(&"open"));
        assert_eq!(recording.events[1..3], ["set_level", "start"]);
        assert_eq!(recording.events[recording.events.len() - 2..], ["drain", "stop"]);
        assert!((recording.levels[0] - -16.0).abs() < 1e-4);
    }

    #[test]
    fn test_level_follows_shared_gain() {
        let synth = ToneSynthesizer::new(44_100.0, 1.0);
        let sink = RecordingSink::new(-80.0);
        let mut line = sink.clone();
        let gain = Gain::new(0.6);
        gain.set(0.0);
        synth
            .play(&mut line, 450.0, 0.1, &gain, &CancellationToken::new())
            .unwrap();
        assert_eq!(sink.recording().levels, vec![-80.0]);
    }

    #[test]
    fn test_cancelled_playback_stops_after_one_flush() {
        let synth = ToneSynthesizer::new(44_100.0, 1.0);
        let sink = RecordingSink::new(-80.0);
        let mut line = sink.clone();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = synth
            .play(&mut line, 450.0, 60.0, &Gain::new(0.0), &cancel)
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.bytes, BUFFER_THRESHOLD);
        assert_eq!(sink.recording().events.last(), Some(&"stop"));
    }
}
