//! Session channel: the append-only record store shared by the tracking and
//! feedback domains.
//!
//! The tracking loop appends one [`TrackingRecord`] per sample and the
//! feedback tasks read back only the last line. Each record is a single line
//! of space-delimited numbers, and readers pick fields by their offset from
//! the END of the line:
//!
//! ```text
//! x y smoothed_x smoothed_y heading pressure pointer_id event_code cumulative speed rel_dist elapsed_ns
//!                                                                              -3      -2        -1
//! ```
//!
//! A second channel receives one [`TriggerRecord`] per feedback decision.
//! The storage medium sits behind [`AppendLog`], so files and in-memory
//! buffers are interchangeable.

pub mod file;
pub mod memory;

pub use file::FileLog;
pub use memory::MemoryLog;

use crate::config::SessionParams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Number of fields in a tracking record.
pub const TRACKING_FIELDS: usize = 12;

/// Append-only, line-oriented store.
pub trait AppendLog: Send + Sync {
    /// Discard all existing lines.
    fn reset(&self) -> io::Result<()>;

    /// Append one line. `line` must not contain a newline.
    fn append(&self, line: &str) -> io::Result<()>;

    /// Last complete, non-empty line, or `None` when nothing has been
    /// written yet.
    fn last_line(&self) -> io::Result<Option<String>>;
}

/// Session identity: `(subject, protocol, session)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub subject: u32,
    pub protocol: u32,
    pub session: u32,
}

impl SessionKey {
    pub fn from_params(params: &SessionParams) -> Self {
        Self {
            subject: params.subject,
            protocol: params.protocol,
            session: params.session,
        }
    }

    /// File name of the tracking channel.
    pub fn tracking_file_name(&self) -> String {
        format!("session_{self}.txt")
    }

    /// File name of the trigger channel.
    pub fn trigger_file_name(&self) -> String {
        format!("audio_{self}.txt")
    }

    /// File name of the end-of-session statistics.
    pub fn stats_file_name(&self) -> String {
        format!("stats_{self}.json")
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}P{}S{}", self.subject, self.protocol, self.session)
    }
}

/// One persisted tracking sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub x: f64,
    pub y: f64,
    pub smoothed_x: f64,
    pub smoothed_y: f64,
    pub heading: f64,
    pub pressure: i32,
    pub pointer_id: u32,
    /// Driver event code, or 0 for a stationary sample
    pub event_code: i32,
    pub cumulative_distance: f64,
    pub speed: f64,
    pub relative_distance: f64,
    pub elapsed_ns: u64,
}

impl TrackingRecord {
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {} {} {} {} {} {}",
            self.x,
            self.y,
            self.smoothed_x,
            self.smoothed_y,
            self.heading,
            self.pressure,
            self.pointer_id,
            self.event_code,
            self.cumulative_distance,
            self.speed,
            self.relative_distance,
            self.elapsed_ns,
        )
    }

    /// Parse a full record. Returns `None` for lines with the wrong field
    /// count or non-numeric fields.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != TRACKING_FIELDS {
            return None;
        }
        let f = |i: usize| fields[i].parse::<f64>().ok();
        Some(Self {
            x: f(0)?,
            y: f(1)?,
            smoothed_x: f(2)?,
            smoothed_y: f(3)?,
            heading: f(4)?,
            pressure: fields[5].parse().ok()?,
            pointer_id: fields[6].parse().ok()?,
            event_code: fields[7].parse().ok()?,
            cumulative_distance: f(8)?,
            speed: f(9)?,
            relative_distance: f(10)?,
            elapsed_ns: fields[11].parse().ok()?,
        })
    }
}

/// One persisted feedback decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub relative_distance: f64,
    pub elapsed_ns: u64,
}

impl TriggerRecord {
    pub fn to_line(&self) -> String {
        format!("{} {}", self.relative_distance, self.elapsed_ns)
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let relative_distance = fields.next()?.parse().ok()?;
        let elapsed_ns = fields.next()?.parse().ok()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            relative_distance,
            elapsed_ns,
        })
    }
}

/// The fields the feedback domain reads from the last tracking record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatestSample {
    pub elapsed_ns: u64,
    pub relative_distance: f64,
    pub speed: f64,
}

impl LatestSample {
    /// Parse by offset from the end of the line: last field is the elapsed
    /// time, second to last the relative distance, third to last the speed.
    /// Lines shorter than a full record are rejected as torn.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < TRACKING_FIELDS {
            return None;
        }
        let from_end = |offset: usize| fields[fields.len() - offset];
        Some(Self {
            elapsed_ns: from_end(1).parse().ok()?,
            relative_distance: from_end(2).parse().ok()?,
            speed: from_end(3).parse().ok()?,
        })
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_ns as f64 / 1e9
    }
}

/// Writer and reader handle over the two per-session logs.
#[derive(Clone)]
pub struct SessionChannel {
    tracking: Arc<dyn AppendLog>,
    triggers: Arc<dyn AppendLog>,
}

impl SessionChannel {
    pub fn new(tracking: Arc<dyn AppendLog>, triggers: Arc<dyn AppendLog>) -> Self {
        Self { tracking, triggers }
    }

    /// File-backed channel under `dir`, named after the session key.
    pub fn open_files(dir: &Path, key: &SessionKey) -> Self {
        Self::new(
            Arc::new(FileLog::new(dir.join(key.tracking_file_name()))),
            Arc::new(FileLog::new(dir.join(key.trigger_file_name()))),
        )
    }

    /// Channel kept entirely in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLog::new()), Arc::new(MemoryLog::new()))
    }

    /// Truncate both logs at session start.
    pub fn start(&self) -> io::Result<()> {
        self.tracking.reset()?;
        self.triggers.reset()
    }

    pub fn append_sample(&self, record: &TrackingRecord) -> io::Result<()> {
        self.tracking.append(&record.to_line())
    }

    pub fn append_trigger(&self, record: &TriggerRecord) -> io::Result<()> {
        self.triggers.append(&record.to_line())
    }

    /// Latest tracking sample. Absent, empty or unreadable channels and torn
    /// lines all yield `None`.
    pub fn latest_sample(&self) -> Option<LatestSample> {
        let line = match self.tracking.last_line() {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, "Tracking channel not readable yet");
                return None;
            }
        };
        let sample = LatestSample::parse(&line);
        if sample.is_none() {
            debug!(line = %line, "Ignoring malformed tracking record");
        }
        sample
    }

    /// Last raw tracking line, for display.
    pub fn latest_line(&self) -> io::Result<Option<String>> {
        self.tracking.last_line()
    }

    pub fn latest_trigger(&self) -> Option<TriggerRecord> {
        self.triggers
            .last_line()
            .ok()
            .flatten()
            .and_then(|line| TriggerRecord::parse(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TrackingRecord {
        TrackingRecord {
            x: 100.0,
            y: 120.5,
            smoothed_x: 98.25,
            smoothed_y: 119.0,
            heading: 45.0,
            pressure: 512,
            pointer_id: 3,
            event_code: 1,
            cumulative_distance: 12.5,
            speed: 2.25,
            relative_distance: 4.75,
            elapsed_ns: 1_500_000_000,
        }
    }

    #[test]
    fn test_session_key_file_names() {
        let key = SessionKey {
            subject: 7,
            protocol: 2,
            session: 3,
        };
        assert_eq!(key.tracking_file_name(), "session_A7P2S3.txt");
        assert_eq!(key.trigger_file_name(), "audio_A7P2S3.txt");
        assert_eq!(key.stats_file_name(), "stats_A7P2S3.json");
    }

    #[test]
    fn test_tracking_record_field_order() {
        let line = record().to_line();
        assert_eq!(
            line,
            "100 120.5 98.25 119 45 512 3 1 12.5 2.25 4.75 1500000000"
        );
        assert_eq!(TrackingRecord::parse(&line), Some(record()));
    }

    #[test]
    fn test_latest_sample_reads_from_end() {
        let sample = LatestSample::parse(&record().to_line()).unwrap();
        assert_eq!(sample.elapsed_ns, 1_500_000_000);
        assert_eq!(sample.relative_distance, 4.75);
        assert_eq!(sample.speed, 2.25);
        assert_eq!(sample.elapsed_secs(), 1.5);
    }

    #[test]
    fn test_latest_sample_rejects_torn_lines() {
        assert_eq!(LatestSample::parse(""), None);
        assert_eq!(LatestSample::parse("100 120.5 98.25 119 45"), None);
        assert_eq!(
            LatestSample::parse("1 2 3 4 5 6 7 8 9 10 abc 12"),
            None
        );
    }

    #[test]
    fn test_trigger_record_line() {
        let trigger = TriggerRecord {
            relative_distance: 3.5,
            elapsed_ns: 42,
        };
        assert_eq!(trigger.to_line(), "3.5 42");
        assert_eq!(TriggerRecord::parse("3.5 42"), Some(trigger));
        assert_eq!(TriggerRecord::parse("3.5"), None);
    }

    #[test]
    fn test_empty_channel_has_no_data() {
        let channel = SessionChannel::in_memory();
        assert_eq!(channel.latest_sample(), None);
        assert_eq!(channel.latest_trigger(), None);
    }

    #[test]
    fn test_channel_reads_last_sample() {
        let channel = SessionChannel::in_memory();
        channel.append_sample(&record()).unwrap();
        let mut later = record();
        later.elapsed_ns = 2_000_000_000;
        later.relative_distance = 9.0;
        channel.append_sample(&later).unwrap();

        let latest = channel.latest_sample().unwrap();
        assert_eq!(latest.elapsed_ns, 2_000_000_000);
        assert_eq!(latest.relative_distance, 9.0);

        channel.start().unwrap();
        assert_eq!(channel.latest_sample(), None);
    }
}
