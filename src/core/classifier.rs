//! Behavioral state classification and the run-length compressed state log.

use crate::collector::types::EventKind;
use crate::core::kinematics::KinematicState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Speed (cm/s) separating moving from immobile.
pub const MOVING_SPEED_THRESHOLD: f64 = 1.0;

/// Default number of distinct entries retained by [`StateLog`].
pub const DEFAULT_LOG_CAPACITY: usize = 10;

/// Behavioral label for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BehaviorLabel {
    Moving,
    Immobile,
    OnTheGround,
    OffTheGround,
    AnimalDetected,
    AnimalNotDetected,
    Unknown,
}

impl BehaviorLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            BehaviorLabel::Moving => "Moving",
            BehaviorLabel::Immobile => "Immobile",
            BehaviorLabel::OnTheGround => "On the ground",
            BehaviorLabel::OffTheGround => "Off the ground",
            BehaviorLabel::AnimalDetected => "Animal detected",
            BehaviorLabel::AnimalNotDetected => "Animal not detected",
            BehaviorLabel::Unknown => "?",
        }
    }
}

impl fmt::Display for BehaviorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an event kind and the current speed to a label.
pub fn classify(kind: EventKind, speed: f64) -> BehaviorLabel {
    match kind {
        EventKind::Drag | EventKind::Hover => {
            if speed > MOVING_SPEED_THRESHOLD {
                BehaviorLabel::Moving
            } else {
                BehaviorLabel::Immobile
            }
        }
        EventKind::Down | EventKind::ButtonDown => BehaviorLabel::OnTheGround,
        EventKind::Up | EventKind::ButtonUp => BehaviorLabel::OffTheGround,
        EventKind::InRange => BehaviorLabel::AnimalDetected,
        EventKind::OutOfRange => BehaviorLabel::AnimalNotDetected,
        EventKind::Unknown(_) => BehaviorLabel::Unknown,
    }
}

/// Summary prefix for a log line: elapsed time, walked distance, speed and
/// signed distance to the zone edge, each rounded to two decimals.
pub fn summary_line(state: &KinematicState, zone_radius: f64) -> String {
    format!(
        "time: {:.2} s - walked: {:.2} cm - speed: {:.2} cm/s - dist to T: {:.2} cm",
        state.elapsed.as_secs_f64(),
        state.cumulative_distance,
        state.speed,
        state.relative_distance - zone_radius,
    )
}

/// One run of identical labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub label: BehaviorLabel,
    /// Summary of the most recent event in the run
    pub summary: String,
    pub count: u32,
}

impl fmt::Display for StateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.summary, self.label)?;
        if self.count > 1 {
            write!(f, "(x{})", self.count)?;
        }
        Ok(())
    }
}

/// Bounded log of recent behavioral states.
///
/// Consecutive identical labels collapse into one entry with a repeat
/// counter; once more than `capacity` distinct entries exist the oldest is
/// evicted.
#[derive(Debug, Clone)]
pub struct StateLog {
    entries: VecDeque<StateEntry>,
    capacity: usize,
}

impl StateLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, label: BehaviorLabel, summary: String) {
        if let Some(last) = self.entries.back_mut() {
            if last.label == label {
                last.count += 1;
                last.summary = summary;
                return;
            }
        }
        self.entries.push_back(StateEntry {
            label,
            summary,
            count: 1,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &StateEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&StateEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StateLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_classify_event_kinds() {
        assert_eq!(classify(EventKind::Drag, 2.5), BehaviorLabel::Moving);
        assert_eq!(classify(EventKind::Hover, 0.4), BehaviorLabel::Immobile);
        assert_eq!(classify(EventKind::Drag, 1.0), BehaviorLabel::Immobile);
        assert_eq!(classify(EventKind::Down, 50.0), BehaviorLabel::OnTheGround);
        assert_eq!(classify(EventKind::ButtonUp, 0.0), BehaviorLabel::OffTheGround);
        assert_eq!(classify(EventKind::InRange, 0.0), BehaviorLabel::AnimalDetected);
        assert_eq!(
            classify(EventKind::OutOfRange, 0.0),
            BehaviorLabel::AnimalNotDetected
        );
        assert_eq!(classify(EventKind::Unknown(12), 0.0), BehaviorLabel::Unknown);
        assert_eq!(BehaviorLabel::Unknown.to_string(), "?");
    }

    #[test]
    fn test_repeated_label_is_compressed() {
        let mut log = StateLog::default();
        log.record(classify(EventKind::Drag, 0.2), "a".into());
        log.record(classify(EventKind::Drag, 0.3), "b".into());
        assert_eq!(log.len(), 1);
        let entry = log.latest().unwrap();
        assert_eq!(entry.count, 2);
        assert_eq!(entry.summary, "b");
        assert_eq!(entry.to_string(), "b - Immobile(x2)");
    }

    #[test]
    fn test_oldest_entries_evicted() {
        let mut log = StateLog::new(3);
        let labels = [
            BehaviorLabel::OnTheGround,
            BehaviorLabel::Moving,
            BehaviorLabel::Immobile,
            BehaviorLabel::Moving,
            BehaviorLabel::OffTheGround,
        ];
        for label in labels {
            log.record(label, String::new());
        }
        let kept: Vec<BehaviorLabel> = log.entries().map(|e| e.label).collect();
        assert_eq!(
            kept,
            vec![
                BehaviorLabel::Immobile,
                BehaviorLabel::Moving,
                BehaviorLabel::OffTheGround
            ]
        );
    }

    #[test]
    fn test_summary_line_rounding() {
        let state = KinematicState {
            elapsed: Duration::from_millis(12_346),
            cumulative_distance: 3.14159,
            speed: 0.005,
            relative_distance: 7.5,
            ..Default::default()
        };
        assert_eq!(
            summary_line(&state, 5.0),
            "time: 12.35 s - walked: 3.14 cm - speed: 0.01 cm/s - dist to T: 2.50 cm"
        );
    }
}
