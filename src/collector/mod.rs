//! Event collection for PolyTouch.
//!
//! The pointer driver itself is an external collaborator; this module defines
//! the callback types it produces and a replay collector that delivers a
//! recorded callback stream over a crossbeam channel.

pub mod replay;
pub mod types;

// Re-export commonly used types
pub use replay::{CollectorConfig, CollectorError, ReplayCollector, ReplaySource};
pub use types::{ContactEvent, EventKind, PointerSample, PointerSignal, RecordedEvent};

/// Collector used by the binary.
pub type Collector = ReplayCollector;
