//! PolyTouch - multi-contact motion tracking with closed-loop audio feedback.
//!
//! This library tracks simultaneous contact points on a touch surface (an
//! animal's paws and body), fuses them into one smoothed centroid, derives
//! kinematic features and behavioral state, and drives an audio stimulus
//! from the animal's position relative to a target zone.
//!
//! # Timing domains
//!
//! - **Tracking**: driven by incoming contact events. One estimator tick and
//!   at most one persisted sample per event.
//! - **Feedback**: fixed-interval and fixed-delay schedulers on a tokio
//!   runtime, reading only the last persisted sample.
//!
//! The domains share no memory. The session channel is their only data path
//! and the session's cancellation token their only control path.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             PolyTouch                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌────────────┐   ┌───────────┐  │
//! │  │ Collector │──▶│ Registry  │──▶│ Kinematics │──▶│Classifier │  │
//! │  │ (replay)  │   │ (contacts)│   │ (centroid) │   │(state log)│  │
//! │  └───────────┘   └───────────┘   └────────────┘   └───────────┘  │
//! │                                        │                         │
//! │                                        ▼                         │
//! │                              ┌──────────────────┐                │
//! │                              │  Session channel │                │
//! │                              │  (append-only)   │                │
//! │                              └──────────────────┘                │
//! │                                        │ last line               │
//! │                                        ▼                         │
//! │  ┌───────────┐   ┌───────────┐   ┌────────────┐                  │
//! │  │ AudioSink │◀──│   Synth   │◀──│  Feedback  │                  │
//! │  │           │   │  (tones)  │   │ controller │                  │
//! │  └───────────┘   └───────────┘   └────────────┘                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use polytouch::{collector, session, channel, stats, config};
//! use std::sync::Arc;
//!
//! let params = config::SessionParams::load("session_params.txt".as_ref()).unwrap();
//! let ctx = session::SessionContext::new(params);
//! let channel = channel::SessionChannel::in_memory();
//! let stats = Arc::new(stats::SessionStats::new(ctx.key()));
//!
//! let mut collector = collector::Collector::new(collector::CollectorConfig::default());
//! collector.start().expect("Failed to start collector");
//!
//! let mut tracker =
//!     session::Tracker::new(ctx, channel, stats, session::TrackerSettings::default());
//! session::run_tracking(&mut tracker, collector.receiver());
//! ```

pub mod audio;
pub mod channel;
pub mod collector;
pub mod config;
pub mod core;
pub mod feedback;
pub mod session;
pub mod stats;

// Re-export key types at crate root for convenience
pub use audio::{AudioSink, Gain, SinkFactory, ToneSynthesizer};
pub use channel::{AppendLog, SessionChannel, SessionKey, TrackingRecord, TriggerRecord};
pub use collector::{Collector, CollectorConfig, CollectorError, ContactEvent, EventKind};
pub use config::{Config, ParamsError, SessionParams};
pub use core::{BehaviorLabel, ContactRegistry, KinematicEstimator, KinematicState, StateLog};
pub use feedback::{FeedbackController, FeedbackProtocol, FeedbackSettings};
pub use session::{run_tracking, SessionContext, Tracker, TrackerSettings, TrackingExit};
pub use stats::{SessionStats, SharedStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
