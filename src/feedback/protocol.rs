//! Stimulus protocol selection and the distance-to-stimulus mappings.

use crate::channel::LatestSample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gain of the discrete in-zone pulse.
pub const PULSE_GAIN: f32 = 0.6;

/// Gain of continuous-protocol tones.
pub const CONTINUOUS_GAIN: f32 = 0.8;

/// Outer radii (cm) of the four inner concentric zones. Anything beyond the
/// last one falls in the fifth zone.
pub const ZONE_THRESHOLDS: [f64; 4] = [5.0, 10.0, 15.0, 20.0];

/// Tone frequencies (Hz) from low to high.
pub const ZONE_FREQUENCIES: [f64; 5] = [150.0, 300.0, 450.0, 600.0, 760.0];

/// Direction of the continuous distance-to-frequency mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneMapping {
    /// Close to the target sounds low, far away sounds high.
    Ascending,
    /// Close to the target sounds high, far away sounds low.
    Descending,
}

impl ToneMapping {
    pub fn frequency_for(self, relative_distance: f64) -> f64 {
        let zone = zone_index(relative_distance);
        match self {
            ToneMapping::Ascending => ZONE_FREQUENCIES[zone],
            ToneMapping::Descending => ZONE_FREQUENCIES[ZONE_FREQUENCIES.len() - 1 - zone],
        }
    }
}

/// Index of the concentric zone containing `relative_distance`, 0 being
/// the innermost. Boundary values belong to the outer zone; NaN lands in
/// the outermost one.
pub fn zone_index(relative_distance: f64) -> usize {
    ZONE_THRESHOLDS
        .iter()
        .position(|t| relative_distance < *t)
        .unwrap_or(ZONE_THRESHOLDS.len())
}

/// Gain chosen by the discrete protocol for one sample: the pulse gain when
/// the sample lies inside the target zone after tracking started, else zero.
pub fn pulse_gain(sample: &LatestSample, zone_radius: f64) -> f32 {
    if sample.relative_distance < zone_radius && sample.elapsed_ns > 0 {
        PULSE_GAIN
    } else {
        0.0
    }
}

/// Feedback protocol in force for a session. Fixed for the session's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "mapping", rename_all = "snake_case")]
pub enum FeedbackProtocol {
    /// Baseline: tracking only
    None,
    /// In-zone pulse gating a continuous base tone
    DiscretePulse,
    /// Nine randomized presentations at three gain tiers
    Randomized,
    /// Zone-dependent tone frequency
    Continuous(ToneMapping),
}

impl FeedbackProtocol {
    /// Protocol for a `(protocol, session)` pair. Session 1 is always a
    /// baseline, as is any combination without a defined stimulus.
    pub fn select(protocol: u32, session: u32) -> Self {
        match (protocol, session) {
            (1, 2..=4) => FeedbackProtocol::DiscretePulse,
            (1, 5) => FeedbackProtocol::Randomized,
            (2, 2) => FeedbackProtocol::Continuous(ToneMapping::Ascending),
            (2, 3) => FeedbackProtocol::Continuous(ToneMapping::Descending),
            _ => FeedbackProtocol::None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, FeedbackProtocol::None)
    }
}

impl fmt::Display for FeedbackProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackProtocol::None => f.write_str("none (baseline)"),
            FeedbackProtocol::DiscretePulse => f.write_str("discrete pulse"),
            FeedbackProtocol::Randomized => f.write_str("randomized intensity"),
            FeedbackProtocol::Continuous(ToneMapping::Ascending) => {
                f.write_str("continuous, low-to-high")
            }
            FeedbackProtocol::Continuous(ToneMapping::Descending) => {
                f.write_str("continuous, high-to-low")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(relative_distance: f64, elapsed_ns: u64) -> LatestSample {
        LatestSample {
            elapsed_ns,
            relative_distance,
            speed: 0.0,
        }
    }

    #[test]
    fn test_protocol_selection() {
        assert_eq!(FeedbackProtocol::select(1, 1), FeedbackProtocol::None);
        assert_eq!(FeedbackProtocol::select(2, 1), FeedbackProtocol::None);
        for session in 2..=4 {
            assert_eq!(
                FeedbackProtocol::select(1, session),
                FeedbackProtocol::DiscretePulse
            );
        }
        assert_eq!(FeedbackProtocol::select(1, 5), FeedbackProtocol::Randomized);
        assert_eq!(
            FeedbackProtocol::select(2, 2),
            FeedbackProtocol::Continuous(ToneMapping::Ascending)
        );
        assert_eq!(
            FeedbackProtocol::select(2, 3),
            FeedbackProtocol::Continuous(ToneMapping::Descending)
        );
        assert_eq!(FeedbackProtocol::select(3, 2), FeedbackProtocol::None);
        assert!(!FeedbackProtocol::select(1, 6).is_active());
    }

    #[test]
    fn test_zone_boundaries() {
        assert_eq!(zone_index(0.0), 0);
        assert_eq!(zone_index(4.99), 0);
        assert_eq!(zone_index(5.0), 1);
        assert_eq!(zone_index(19.99), 3);
        assert_eq!(zone_index(20.0), 4);
        assert_eq!(zone_index(f64::NAN), 4);
    }

    #[test]
    fn test_mappings_are_mirrored() {
        let distances = [3.0, 8.0, 13.0, 18.0, 25.0];
        let up: Vec<f64> = distances
            .iter()
            .map(|d| ToneMapping::Ascending.frequency_for(*d))
            .collect();
        let down: Vec<f64> = distances
            .iter()
            .map(|d| ToneMapping::Descending.frequency_for(*d))
            .collect();
        assert_eq!(up, ZONE_FREQUENCIES.to_vec());
        let mut reversed = ZONE_FREQUENCIES.to_vec();
        reversed.reverse();
        assert_eq!(down, reversed);
    }

    #[test]
    fn test_pulse_gain() {
        assert_eq!(pulse_gain(&sample(2.0, 10), 5.0), PULSE_GAIN);
        assert_eq!(pulse_gain(&sample(2.0, 0), 5.0), 0.0);
        assert_eq!(pulse_gain(&sample(5.0, 10), 5.0), 0.0);
        assert_eq!(pulse_gain(&sample(9.0, 10), 5.0), 0.0);
    }
}
