//! Core tracking pipeline.
//!
//! This module contains:
//! - The registry of active contacts
//! - Rolling smoothing windows
//! - Kinematic estimation (centroid, speed, heading, distances)
//! - Behavioral state classification and the compressed state log

pub mod classifier;
pub mod kinematics;
pub mod registry;
pub mod window;

// Re-export commonly used types
pub use classifier::{classify, summary_line, BehaviorLabel, StateEntry, StateLog};
pub use kinematics::{KinematicEstimator, KinematicState, TargetZone, TickOutcome};
pub use registry::{Contact, ContactRegistry};
pub use window::{RollingWindow, CENTROID_WINDOW, HEADING_WINDOW};
