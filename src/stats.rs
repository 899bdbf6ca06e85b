//! Per-session run statistics.
//!
//! Counters are updated from both timing domains, so they are atomics behind
//! a shared handle. At session end the snapshot is written as JSON next to
//! the session channels.

use crate::channel::SessionKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Statistics for the current session.
#[derive(Debug)]
pub struct SessionStats {
    /// Driver callbacks handled by the tracking loop
    contact_events: AtomicU64,
    /// Tracking records appended to the channel
    samples_persisted: AtomicU64,
    /// Tracking records lost to I/O errors
    persist_failures: AtomicU64,
    /// Trigger records appended
    triggers_recorded: AtomicU64,
    /// Trigger records lost to I/O errors
    trigger_failures: AtomicU64,
    tones_played: AtomicU64,
    tone_failures: AtomicU64,
    run_id: Uuid,
    key: SessionKey,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new(key: SessionKey) -> Self {
        Self {
            contact_events: AtomicU64::new(0),
            samples_persisted: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            triggers_recorded: AtomicU64::new(0),
            trigger_failures: AtomicU64::new(0),
            tones_played: AtomicU64::new(0),
            tone_failures: AtomicU64::new(0),
            run_id: Uuid::new_v4(),
            key,
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Stats that [`save`](Self::save) writes to `path`.
    pub fn with_persistence(key: SessionKey, path: PathBuf) -> Self {
        let mut stats = Self::new(key);
        stats.persist_path = Some(path);
        stats
    }

    pub fn record_contact_event(&self) {
        self.contact_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_persisted(&self) {
        self.samples_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trigger(&self) {
        self.triggers_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trigger_failure(&self) {
        self.trigger_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tone_played(&self) {
        self.tones_played.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tone_failure(&self) {
        self.tone_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            run_id: self.run_id,
            key: self.key,
            contact_events: self.contact_events.load(Ordering::Relaxed),
            samples_persisted: self.samples_persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            triggers_recorded: self.triggers_recorded.load(Ordering::Relaxed),
            trigger_failures: self.trigger_failures.load(Ordering::Relaxed),
            tones_played: self.tones_played.load(Ordering::Relaxed),
            tone_failures: self.tone_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session {} (run {}):\n\
             - Contact events handled: {}\n\
             - Samples persisted: {} ({} failed)\n\
             - Feedback triggers recorded: {} ({} failed)\n\
             - Tones played: {} ({} failed)\n\
             - Session duration: {} seconds",
            stats.key,
            stats.run_id,
            stats.contact_events,
            stats.samples_persisted,
            stats.persist_failures,
            stats.triggers_recorded,
            stats.trigger_failures,
            stats.tones_played,
            stats.tone_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to the persistence path, if one is set.
    pub fn save(&self) -> Result<(), std::io::Error> {
        match self.persist_path {
            Some(ref path) => self.save_to(path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot()).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Snapshot of session statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub run_id: Uuid,
    pub key: SessionKey,
    pub contact_events: u64,
    pub samples_persisted: u64,
    pub persist_failures: u64,
    pub triggers_recorded: u64,
    pub trigger_failures: u64,
    pub tones_played: u64,
    pub tone_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared stats.
pub type SharedStats = Arc<SessionStats>;
