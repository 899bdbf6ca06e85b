//! Sink implementations that need no audio hardware.
//!
//! [`NullSink`] and [`PcmFileSink`] block in `write` for the playback time of
//! the bytes written, as a hardware line does, so callers keep real-time
//! pacing. [`RecordingSink`] returns immediately.

use super::{AudioError, AudioFormat, AudioSink};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use tracing::debug;

/// Discards everything written to it.
#[derive(Debug, Clone)]
pub struct NullSink {
    format: Option<AudioFormat>,
    floor: f32,
    level: f32,
}

impl NullSink {
    pub fn new(floor_db: f32) -> Self {
        Self {
            format: None,
            floor: floor_db,
            level: floor_db,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}

impl AudioSink for NullSink {
    fn open(&mut self, format: AudioFormat) -> Result<(), AudioError> {
        self.format = Some(format);
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.format.map(|_| ()).ok_or(AudioError::NotOpen)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, AudioError> {
        let format = self.format.ok_or(AudioError::NotOpen)?;
        thread::sleep(format.duration_of(bytes.len()));
        Ok(bytes.len())
    }

    fn drain(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.format = None;
        Ok(())
    }

    fn set_level(&mut self, db: f32) {
        self.level = db;
    }

    fn level_floor(&self) -> f32 {
        self.floor
    }
}

/// Everything a [`RecordingSink`] has seen.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub format: Option<AudioFormat>,
    pub bytes: Vec<u8>,
    /// Size of each write call
    pub writes: Vec<usize>,
    /// Every level applied, in order
    pub levels: Vec<f32>,
    /// Lifecycle calls, in order
    pub events: Vec<&'static str>,
    /// Number of times the line was opened
    pub opens: usize,
}

/// Captures bytes, levels and lifecycle calls in memory. Clones share the
/// same recording, so one clone can be handed to a [`super::SinkFactory`]
/// while the other is inspected.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    shared: Arc<Mutex<Recording>>,
    floor: f32,
    open: bool,
}

impl RecordingSink {
    pub fn new(floor_db: f32) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Recording::default())),
            floor: floor_db,
            open: false,
        }
    }

    fn guard(&self) -> MutexGuard<'_, Recording> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the recording so far.
    pub fn recording(&self) -> Recording {
        self.guard().clone()
    }
}

impl AudioSink for RecordingSink {
    fn open(&mut self, format: AudioFormat) -> Result<(), AudioError> {
        let mut rec = self.guard();
        rec.format = Some(format);
        rec.opens += 1;
        rec.events.push("open");
        drop(rec);
        self.open = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        if !self.open {
            return Err(AudioError::NotOpen);
        }
        self.guard().events.push("start");
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, AudioError> {
        if !self.open {
            return Err(AudioError::NotOpen);
        }
        let mut rec = self.guard();
        rec.bytes.extend_from_slice(bytes);
        rec.writes.push(bytes.len());
        rec.events.push("write");
        Ok(bytes.len())
    }

    fn drain(&mut self) -> Result<(), AudioError> {
        self.guard().events.push("drain");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.guard().events.push("stop");
        self.open = false;
        Ok(())
    }

    fn set_level(&mut self, db: f32) {
        let mut rec = self.guard();
        rec.levels.push(db);
        rec.events.push("set_level");
    }

    fn level_floor(&self) -> f32 {
        self.floor
    }
}

/// Appends raw PCM to a file for offline inspection. Levels are not applied
/// to the samples; they are only logged.
#[derive(Debug)]
pub struct PcmFileSink {
    path: PathBuf,
    file: Option<File>,
    format: Option<AudioFormat>,
    floor: f32,
}

impl PcmFileSink {
    pub fn new(path: impl Into<PathBuf>, floor_db: f32) -> Self {
        Self {
            path: path.into(),
            file: None,
            format: None,
            floor: floor_db,
        }
    }
}

impl AudioSink for PcmFileSink {
    fn open(&mut self, format: AudioFormat) -> Result<(), AudioError> {
        if format.bits_per_sample != 16 || !format.signed || format.big_endian {
            return Err(AudioError::UnsupportedFormat(format!("{format:?}")));
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.file = Some(file);
        self.format = Some(format);
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.file.as_ref().map(|_| ()).ok_or(AudioError::NotOpen)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, AudioError> {
        let file = self.file.as_mut().ok_or(AudioError::NotOpen)?;
        file.write_all(bytes)?;
        if let Some(format) = self.format {
            thread::sleep(format.duration_of(bytes.len()));
        }
        Ok(bytes.len())
    }

    fn drain(&mut self) -> Result<(), AudioError> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.file = None;
        self.format = None;
        Ok(())
    }

    fn set_level(&mut self, db: f32) {
        debug!(path = %self.path.display(), level_db = db, "PCM line level");
    }

    fn level_floor(&self) -> f32 {
        self.floor
    }
}
