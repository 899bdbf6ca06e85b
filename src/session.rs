//! Session context and the tracking domain.
//!
//! [`SessionContext`] carries what used to be process-wide state: the
//! parameters, the monotonic session clock and the termination signal. The
//! [`Tracker`] turns driver callbacks into registry updates, estimator
//! ticks, state-log entries and persisted tracking records.

use crate::channel::{SessionChannel, SessionKey, TrackingRecord};
use crate::collector::types::{ContactEvent, EventKind, PointerSample};
use crate::config::{Config, SessionParams, SurfaceOffset, WarmUp};
use crate::core::classifier::{
    classify, summary_line, StateLog, DEFAULT_LOG_CAPACITY, MOVING_SPEED_THRESHOLD,
};
use crate::core::kinematics::{KinematicEstimator, KinematicState, TickOutcome};
use crate::core::registry::ContactRegistry;
use crate::stats::SharedStats;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long the tracking loop waits for an event before checking the
/// session clock.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Shared per-session state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    params: SessionParams,
    key: SessionKey,
    started: Instant,
    token: CancellationToken,
}

impl SessionContext {
    pub fn new(params: SessionParams) -> Self {
        Self::with_token(params, CancellationToken::new())
    }

    /// Context ending when `token` is cancelled, e.g. by an operator abort.
    pub fn with_token(params: SessionParams, token: CancellationToken) -> Self {
        let key = SessionKey::from_params(&params);
        Self {
            inner: Arc::new(ContextInner {
                params,
                key,
                started: Instant::now(),
                token,
            }),
        }
    }

    pub fn params(&self) -> &SessionParams {
        &self.inner.params
    }

    pub fn key(&self) -> SessionKey {
        self.inner.key
    }

    /// Monotonic time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// Signal the end of the session to both domains.
    pub fn end_session(&self) {
        if !self.inner.token.is_cancelled() {
            info!(session = %self.inner.key, "Ending session");
        }
        self.inner.token.cancel();
    }

    pub fn is_ended(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Resolves once the session has ended.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }
}

/// Tracking-side settings taken from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    pub host_pointer_id: u32,
    pub state_log_capacity: usize,
    pub warmup: WarmUp,
    pub surface_offset: SurfaceOffset,
}

impl TrackerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host_pointer_id: config.host_pointer_id,
            state_log_capacity: config.state_log_capacity,
            warmup: config.smoothing_warmup,
            surface_offset: config.surface_offset,
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            host_pointer_id: 1,
            state_log_capacity: DEFAULT_LOG_CAPACITY,
            warmup: WarmUp::ZeroFilled,
            surface_offset: SurfaceOffset::default(),
        }
    }
}

/// The tracking domain. Runs on its own thread and shares nothing with the
/// feedback domain except the session channel and the context's token.
pub struct Tracker {
    ctx: SessionContext,
    registry: ContactRegistry,
    estimator: KinematicEstimator,
    log: StateLog,
    channel: SessionChannel,
    stats: SharedStats,
    offset: SurfaceOffset,
}

impl Tracker {
    pub fn new(
        ctx: SessionContext,
        channel: SessionChannel,
        stats: SharedStats,
        settings: TrackerSettings,
    ) -> Self {
        let estimator = KinematicEstimator::from_params(ctx.params(), settings.warmup);
        Self {
            registry: ContactRegistry::new(settings.host_pointer_id),
            estimator,
            log: StateLog::new(settings.state_log_capacity),
            channel,
            stats,
            offset: settings.surface_offset,
            ctx,
        }
    }

    /// Handle one driver callback at session time `now`. Every callback
    /// produces exactly one estimator tick.
    pub fn handle(&mut self, event: &ContactEvent, now: Duration) -> TickOutcome {
        self.stats.record_contact_event();
        match event {
            ContactEvent::Move(sample) => {
                let (x, y) = self.offset.apply(sample.x, sample.y);
                self.registry.upsert(
                    sample.device_type,
                    sample.pointer_id,
                    sample.inverted,
                    x,
                    y,
                    sample.pressure,
                );
                let outcome = self.estimator.tick(&self.registry, now);
                self.record_label(sample.kind);
                if outcome == TickOutcome::Updated && !self.registry.is_host(sample.pointer_id) {
                    self.persist(sample, x, y);
                }
                outcome
            }
            ContactEvent::Button(signal) => {
                self.record_label(signal.kind);
                self.estimator.tick(&self.registry, now)
            }
            ContactEvent::RangeOrRelease(signal) => {
                self.record_label(signal.kind);
                self.registry.remove(signal.device_type, signal.pointer_id);
                self.estimator.tick(&self.registry, now)
            }
        }
    }

    /// Idle check of the session clock.
    pub fn expire(&mut self, now: Duration) -> bool {
        self.estimator.expire(now)
    }

    fn record_label(&mut self, kind: EventKind) {
        let state = self.estimator.state();
        let label = classify(kind, state.speed);
        let summary = summary_line(state, self.estimator.zone().radius);
        debug!(label = %label, summary = %summary, "Behavioral state");
        self.log.record(label, summary);
    }

    fn persist(&self, sample: &PointerSample, x: f64, y: f64) {
        let state = self.estimator.state();
        // Stationary samples carry event code 0.
        let event_code = if state.speed < MOVING_SPEED_THRESHOLD {
            0
        } else {
            sample.kind.code()
        };
        let record = TrackingRecord {
            x,
            y,
            smoothed_x: state.smoothed_x,
            smoothed_y: state.smoothed_y,
            heading: state.heading,
            pressure: sample.pressure,
            pointer_id: sample.pointer_id,
            event_code,
            cumulative_distance: state.cumulative_distance,
            speed: state.speed,
            relative_distance: state.relative_distance,
            elapsed_ns: u64::try_from(state.elapsed.as_nanos()).unwrap_or(u64::MAX),
        };
        match self.channel.append_sample(&record) {
            Ok(()) => self.stats.record_sample_persisted(),
            Err(e) => {
                warn!(session = %self.ctx.key(), error = %e, "Failed to persist tracking sample");
                self.stats.record_persist_failure();
            }
        }
    }

    pub fn state(&self) -> &KinematicState {
        self.estimator.state()
    }

    pub fn state_log(&self) -> &StateLog {
        &self.log
    }

    pub fn registry(&self) -> &ContactRegistry {
        &self.registry
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }
}

/// Why the tracking loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingExit {
    /// The session duration elapsed.
    SessionEnded,
    /// The session was ended from outside (operator abort, feedback
    /// schedule exhausted).
    Cancelled,
    /// The event source closed.
    SourceClosed,
}

/// Drain `receiver` into `tracker` until the session ends.
///
/// Whatever the reason for stopping, the session is ended on return so the
/// feedback domain stops scheduling too.
pub fn run_tracking(tracker: &mut Tracker, receiver: &Receiver<ContactEvent>) -> TrackingExit {
    let ctx = tracker.context().clone();
    info!(session = %ctx.key(), "Tracking started");

    let exit = loop {
        if ctx.is_ended() {
            break TrackingExit::Cancelled;
        }
        match receiver.recv_timeout(IDLE_POLL) {
            Ok(event) => {
                if tracker.handle(&event, ctx.elapsed()) == TickOutcome::SessionEnded {
                    break TrackingExit::SessionEnded;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if tracker.expire(ctx.elapsed()) {
                    break TrackingExit::SessionEnded;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("Event source closed");
                break TrackingExit::SourceClosed;
            }
        }
    };

    ctx.end_session();
    info!(session = %ctx.key(), exit = ?exit, "Tracking stopped");
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{AppendLog, MemoryLog};
    use crate::config::tests::SAMPLE_PARAMS;
    use crate::core::classifier::BehaviorLabel;
    use crate::stats::SessionStats;

    fn params() -> SessionParams {
        SessionParams::parse(SAMPLE_PARAMS).unwrap()
    }

    fn tracker_with_log() -> (Tracker, Arc<MemoryLog>) {
        let ctx = SessionContext::new(params());
        let tracking = Arc::new(MemoryLog::new());
        let channel = SessionChannel::new(tracking.clone(), Arc::new(MemoryLog::new()));
        let stats = Arc::new(SessionStats::new(ctx.key()));
        let settings = TrackerSettings {
            warmup: WarmUp::SeedWithFirst,
            ..Default::default()
        };
        (Tracker::new(ctx, channel, stats, settings), tracking)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// Channel whose writes always fail, as on a full or revoked disk.
    struct FailingLog;

    impl AppendLog for FailingLog {
        fn reset(&self) -> std::io::Result<()> {
            Ok(())
        }

        fn append(&self, _line: &str) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }

        fn last_line(&self) -> std::io::Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn test_context_end_is_shared() {
        let ctx = SessionContext::new(params());
        let other = ctx.clone();
        assert!(!other.is_ended());
        ctx.end_session();
        assert!(other.is_ended());
        assert_eq!(ctx.key().to_string(), "A7P2S3");
    }

    #[test]
    fn test_move_persists_stationary_sample_with_code_zero() {
        let (mut tracker, log) = tracker_with_log();
        tracker.handle(&ContactEvent::moved(2, 5, EventKind::Down, 256.0, 256.0), ms(0));
        tracker.handle(&ContactEvent::moved(2, 5, EventKind::Drag, 256.0, 256.0), ms(20));

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        let record = TrackingRecord::parse(&lines[1]).unwrap();
        assert_eq!(record.event_code, 0);
        assert_eq!(record.pointer_id, 5);
        assert_eq!(record.relative_distance, 0.0);
        assert_eq!(record.elapsed_ns, 20_000_000);
    }

    #[test]
    fn test_persist_failure_does_not_stop_tracking() {
        let ctx = SessionContext::new(params());
        let channel = SessionChannel::new(Arc::new(FailingLog), Arc::new(MemoryLog::new()));
        let stats = Arc::new(SessionStats::new(ctx.key()));
        let settings = TrackerSettings {
            warmup: WarmUp::SeedWithFirst,
            ..Default::default()
        };
        let mut tracker = Tracker::new(ctx, channel, stats.clone(), settings);

        for (i, x) in [100.0, 110.0, 120.0].into_iter().enumerate() {
            let kind = if i == 0 { EventKind::Down } else { EventKind::Drag };
            let event = ContactEvent::moved(2, 5, kind, x, 100.0);
            let outcome = tracker.handle(&event, ms(i as u64 * 20));
            assert_eq!(outcome, TickOutcome::Updated);
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.persist_failures, 3);
        assert_eq!(snapshot.samples_persisted, 0);
        assert_eq!(snapshot.contact_events, 3);
        assert_eq!(tracker.state().elapsed, ms(40));
        assert!(tracker.state().cumulative_distance > 0.0);
        assert_eq!(tracker.state_log().len(), 2);
    }

    #[test]
    fn test_host_pointer_is_not_persisted() {
        let (mut tracker, log) = tracker_with_log();
        tracker.handle(&ContactEvent::moved(0, 1, EventKind::Hover, 10.0, 10.0), ms(0));
        assert!(log.is_empty());
        assert_eq!(tracker.registry().len(), 1);
        assert_eq!(
            tracker.state_log().latest().map(|e| e.label),
            Some(BehaviorLabel::Immobile)
        );
    }

    #[test]
    fn test_release_removes_contact() {
        let (mut tracker, _) = tracker_with_log();
        tracker.handle(&ContactEvent::moved(2, 5, EventKind::Down, 100.0, 100.0), ms(0));
        let outcome = tracker.handle(&ContactEvent::released(2, 5, EventKind::Up), ms(10));
        assert_eq!(outcome, TickOutcome::NoContacts);
        assert!(tracker.registry().is_empty());
        assert_eq!(
            tracker.state_log().latest().map(|e| e.label),
            Some(BehaviorLabel::OffTheGround)
        );
    }

    #[test]
    fn test_run_tracking_ends_session_when_source_closes() {
        let (mut tracker, log) = tracker_with_log();
        let ctx = tracker.context().clone();
        let (tx, rx) = crossbeam_channel::bounded(16);
        tx.send(ContactEvent::moved(2, 5, EventKind::Down, 100.0, 100.0))
            .unwrap();
        tx.send(ContactEvent::moved(2, 5, EventKind::Drag, 101.0, 100.0))
            .unwrap();
        drop(tx);

        assert_eq!(run_tracking(&mut tracker, &rx), TrackingExit::SourceClosed);
        assert!(ctx.is_ended());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_run_tracking_stops_on_cancel() {
        let (mut tracker, _) = tracker_with_log();
        let (_tx, rx) = crossbeam_channel::bounded::<ContactEvent>(1);
        tracker.context().end_session();
        assert_eq!(run_tracking(&mut tracker, &rx), TrackingExit::Cancelled);
    }
}
