//! Closed-loop audio feedback.
//!
//! This module contains:
//! - Protocol selection and the distance-to-stimulus mappings
//! - The randomized stimulus schedule
//! - The controller running the protocol's scheduled tasks

pub mod controller;
pub mod protocol;
pub mod schedule;

pub use controller::{FeedbackController, FeedbackDecision, FeedbackReport, FeedbackSettings};
pub use protocol::{FeedbackProtocol, ToneMapping};
pub use schedule::{GainTier, StimulusSchedule};
