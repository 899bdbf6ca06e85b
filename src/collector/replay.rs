//! Replay collector: feeds recorded driver callbacks into the tracking loop.
//!
//! The physical pointer driver is outside this crate. A recording is a
//! newline-delimited JSON stream of [`RecordedEvent`]s, read from a file or
//! stdin on a background thread.

use crate::collector::types::{ContactEvent, RecordedEvent};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest uninterrupted sleep while pacing.
const PACE_SLICE: Duration = Duration::from_millis(50);

/// Where the recording comes from.
#[derive(Debug, Clone)]
pub enum ReplaySource {
    Stdin,
    File(PathBuf),
}

impl ReplaySource {
    /// `-` selects stdin, anything else is a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            ReplaySource::Stdin
        } else {
            ReplaySource::File(PathBuf::from(arg))
        }
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + Send>> {
        match self {
            ReplaySource::Stdin => Ok(Box::new(std::io::stdin())),
            ReplaySource::File(path) => Ok(Box::new(std::fs::File::open(path)?)),
        }
    }
}

/// Configuration for the replay collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub source: ReplaySource,
    /// Honour `at_ms` offsets instead of replaying as fast as possible
    pub pace: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            source: ReplaySource::Stdin,
            pace: false,
        }
    }
}

/// Errors that can occur during event collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Collector is already running")]
    AlreadyRunning,
    #[error("Could not open event source: {0}")]
    Source(#[from] std::io::Error),
}

/// Collector that replays a recorded callback stream.
pub struct ReplayCollector {
    config: CollectorConfig,
    receiver: Receiver<ContactEvent>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ReplayCollector {
    /// Create a new replay collector.
    pub fn new(config: CollectorConfig) -> Self {
        // Replaced on start; until then the receiver reports a disconnect.
        let (_, receiver) = bounded(0);
        Self {
            config,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start replaying events in a background thread.
    ///
    /// The channel disconnects once the recording is exhausted or the
    /// collector is stopped.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        let reader = self.config.source.open()?;
        self.running.store(true, Ordering::SeqCst);

        // The thread owns the only sender, so the receiver sees a disconnect
        // when the recording ends.
        let (sender, receiver) = bounded(10_000);
        self.receiver = receiver;
        let running = self.running.clone();
        let pace = self.config.pace;

        let handle = thread::spawn(move || {
            let sent = replay(reader, &sender, &running, pace);
            info!(events = sent, "Replay finished");
            running.store(false, Ordering::SeqCst);
        });
        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop replaying.
    ///
    /// A thread blocked reading stdin cannot be interrupted, so it is
    /// detached and exits on its own at end of input.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the live receiver wakes a sender blocked on a full channel.
        let (_, idle) = bounded(0);
        self.receiver = idle;
        if let Some(handle) = self.thread_handle.take() {
            match self.config.source {
                ReplaySource::File(_) => {
                    let _ = handle.join();
                }
                ReplaySource::Stdin => drop(handle),
            }
        }
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for contact events.
    pub fn receiver(&self) -> &Receiver<ContactEvent> {
        &self.receiver
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<ContactEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for ReplayCollector {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn replay(
    reader: Box<dyn Read + Send>,
    sender: &Sender<ContactEvent>,
    running: &AtomicBool,
    pace: bool,
) -> u64 {
    let started = Instant::now();
    let mut sent = 0u64;

    for (line_no, line) in BufReader::new(reader).lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Event source read failed");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let recorded: RecordedEvent = match serde_json::from_str(trimmed) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "Skipping malformed event");
                continue;
            }
        };

        if pace {
            if let Some(at_ms) = recorded.at_ms {
                let due = Duration::from_millis(at_ms);
                loop {
                    let elapsed = started.elapsed();
                    if due <= elapsed || !running.load(Ordering::SeqCst) {
                        break;
                    }
                    thread::sleep((due - elapsed).min(PACE_SLICE));
                }
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
        }

        if sender.send(recorded.event).is_err() {
            debug!("Event receiver dropped; ending replay");
            break;
        }
        sent += 1;
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::EventKind;
    use std::io::Write;

    #[test]
    fn test_replay_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"callback":"move","device_type":2,"pointer_id":3,"event_type":3,"x":100,"y":100}}"#
        )
        .unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"callback":"range_or_release","device_type":2,"pointer_id":3,"event_type":4}}"#
        )
        .unwrap();

        let mut collector = ReplayCollector::new(CollectorConfig {
            source: ReplaySource::File(file.path().to_path_buf()),
            pace: false,
        });
        collector.start().unwrap();

        let events: Vec<ContactEvent> = collector.receiver().iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), EventKind::Down);
        assert_eq!(events[1].kind(), EventKind::Up);
        collector.stop();
        assert!(!collector.is_running());
    }

    #[test]
    fn test_paced_replay_honours_offsets() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"at_ms":0,"callback":"move","device_type":2,"pointer_id":3,"event_type":3,"x":1,"y":1}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"at_ms":40,"callback":"button","device_type":2,"pointer_id":3,"event_type":6}}"#
        )
        .unwrap();

        let mut collector = ReplayCollector::new(CollectorConfig {
            source: ReplaySource::File(file.path().to_path_buf()),
            pace: true,
        });
        let started = Instant::now();
        collector.start().unwrap();
        let events: Vec<ContactEvent> = collector.receiver().iter().collect();
        assert_eq!(events.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(events[1].kind(), EventKind::ButtonUp);
    }

    #[test]
    fn test_missing_file_fails_to_start() {
        let mut collector = ReplayCollector::new(CollectorConfig {
            source: ReplaySource::File(PathBuf::from("/nonexistent/recording.jsonl")),
            pace: false,
        });
        assert!(matches!(collector.start(), Err(CollectorError::Source(_))));
        assert!(!collector.is_running());
    }

    #[test]
    fn test_source_from_arg() {
        assert!(matches!(ReplaySource::from_arg("-"), ReplaySource::Stdin));
        assert!(matches!(
            ReplaySource::from_arg("events.jsonl"),
            ReplaySource::File(_)
        ));
    }
}
