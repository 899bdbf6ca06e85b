//! Kinematic estimation from the active contact set.
//!
//! Each tick reduces the tracked contacts to a centroid, smooths it over a
//! short rolling window, and derives travelled distance, distance to the
//! target zone, speed and heading. Distances are converted to physical
//! units with the session's pixel-to-cm factor.

use crate::config::{SessionParams, WarmUp};
use crate::core::registry::ContactRegistry;
use crate::core::window::{RollingWindow, CENTROID_WINDOW, HEADING_WINDOW};
use std::time::Duration;
use tracing::info;

/// Speeds above this value (cm/s) are treated as registry glitches and
/// reported as zero.
pub const SPEED_CEILING: f64 = 100.0;

/// Circular target region, fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetZone {
    /// Center in surface pixels
    pub center_x: f64,
    pub center_y: f64,
    /// Radius in physical units (cm)
    pub radius: f64,
    /// Centimeters per surface pixel
    pub pixel_to_cm: f64,
}

impl TargetZone {
    pub fn from_params(params: &SessionParams) -> Self {
        Self {
            center_x: params.target_x,
            center_y: params.target_y,
            radius: params.target_radius,
            pixel_to_cm: params.pixel_to_cm,
        }
    }

    /// Physical distance from a surface point to the zone center.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (x - self.center_x).hypot(y - self.center_y) * self.pixel_to_cm
    }

    pub fn contains(&self, distance: f64) -> bool {
        distance < self.radius
    }
}

/// Derived motion state after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KinematicState {
    /// Raw centroid of the tracked contacts (pixels)
    pub centroid_x: f64,
    pub centroid_y: f64,
    /// Centroid averaged over the last [`CENTROID_WINDOW`] ticks (pixels)
    pub smoothed_x: f64,
    pub smoothed_y: f64,
    /// Instantaneous speed (cm/s)
    pub speed: f64,
    /// Smoothed heading in degrees, within [0, 360)
    pub heading: f64,
    /// Distance from smoothed centroid to the target center (cm)
    pub relative_distance: f64,
    /// Path length travelled this tick (cm)
    pub step_distance: f64,
    /// Total path length since the first touch (cm)
    pub cumulative_distance: f64,
    /// Time since the first tracked touch of the session
    pub elapsed: Duration,
    /// Tracked contacts that contributed to this state
    pub contacts: usize,
}

/// Result of a single estimator tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// State was updated from at least one tracked contact.
    Updated,
    /// Nothing to aggregate; the previous state stands.
    NoContacts,
    /// The session duration has elapsed. Terminal.
    SessionEnded,
}

pub struct KinematicEstimator {
    zone: TargetZone,
    session_length: Duration,
    xs: RollingWindow<CENTROID_WINDOW>,
    ys: RollingWindow<CENTROID_WINDOW>,
    headings: RollingWindow<HEADING_WINDOW>,
    state: KinematicState,
    first_touch: Option<Duration>,
    last_update: Option<Duration>,
    ended: bool,
}

impl KinematicEstimator {
    pub fn new(zone: TargetZone, session_length: Duration, warmup: WarmUp) -> Self {
        Self {
            zone,
            session_length,
            xs: RollingWindow::new(warmup),
            ys: RollingWindow::new(warmup),
            headings: RollingWindow::new(warmup),
            state: KinematicState::default(),
            first_touch: None,
            last_update: None,
            ended: false,
        }
    }

    pub fn from_params(params: &SessionParams, warmup: WarmUp) -> Self {
        Self::new(
            TargetZone::from_params(params),
            params.session_length(),
            warmup,
        )
    }

    /// Run one tick against the current registry.
    ///
    /// `now` is monotonic time since the session context started; the
    /// reported `elapsed` is measured from the first tick that saw a tracked
    /// contact.
    pub fn tick(&mut self, registry: &ContactRegistry, now: Duration) -> TickOutcome {
        if self.ended {
            return TickOutcome::SessionEnded;
        }

        let (sum_x, sum_y, n) = registry
            .tracked()
            .fold((0.0, 0.0, 0usize), |(sx, sy, n), c| (sx + c.x, sy + c.y, n + 1));
        if n == 0 {
            return TickOutcome::NoContacts;
        }

        let first_touch = *self.first_touch.get_or_insert(now);
        let elapsed = now.saturating_sub(first_touch);

        let centroid_x = sum_x / n as f64;
        let centroid_y = sum_y / n as f64;
        self.xs.push(centroid_x);
        self.ys.push(centroid_y);
        let smoothed_x = self.xs.mean();
        let smoothed_y = self.ys.mean();

        let prev = self.state;
        // The first tick has no predecessor to travel from.
        let (dx, dy) = if self.last_update.is_some() {
            (smoothed_x - prev.smoothed_x, smoothed_y - prev.smoothed_y)
        } else {
            (0.0, 0.0)
        };
        let step_distance = dx.hypot(dy) * self.zone.pixel_to_cm;

        let dt = self
            .last_update
            .map(|t| elapsed.saturating_sub(t))
            .unwrap_or_default()
            .as_secs_f64();
        let speed = instantaneous_speed(prev.step_distance, step_distance, dt);

        self.headings.push(heading_degrees(dx, dy));
        let heading = normalize_degrees(self.headings.mean());

        self.state = KinematicState {
            centroid_x,
            centroid_y,
            smoothed_x,
            smoothed_y,
            speed,
            heading,
            relative_distance: self.zone.distance_to(smoothed_x, smoothed_y),
            step_distance,
            cumulative_distance: prev.cumulative_distance + step_distance,
            elapsed,
            contacts: n,
        };
        self.last_update = Some(elapsed);

        if elapsed > self.session_length {
            info!(
                elapsed_secs = elapsed.as_secs_f64(),
                "Session duration reached; tracking terminated"
            );
            self.ended = true;
            return TickOutcome::SessionEnded;
        }
        TickOutcome::Updated
    }

    /// Check the session clock without touching the kinematic state, for
    /// idle periods with no events. Returns true once the session has ended.
    pub fn expire(&mut self, now: Duration) -> bool {
        if !self.ended {
            if let Some(first_touch) = self.first_touch {
                let elapsed = now.saturating_sub(first_touch);
                if elapsed > self.session_length {
                    info!(
                        elapsed_secs = elapsed.as_secs_f64(),
                        "Session duration reached while idle; tracking terminated"
                    );
                    self.ended = true;
                }
            }
        }
        self.ended
    }

    /// State after the most recent update.
    pub fn state(&self) -> &KinematicState {
        &self.state
    }

    pub fn zone(&self) -> &TargetZone {
        &self.zone
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }
}

/// Speed from the change in per-tick travelled distance over the tick
/// interval. Non-positive intervals and values above [`SPEED_CEILING`]
/// yield zero.
pub fn instantaneous_speed(previous_step: f64, step: f64, dt_secs: f64) -> f64 {
    if dt_secs <= 0.0 {
        return 0.0;
    }
    let speed = (previous_step - step).abs() / dt_secs;
    if !speed.is_finite() || speed > SPEED_CEILING {
        0.0
    } else {
        speed
    }
}

/// Direction of a displacement in degrees, within [0, 360).
pub fn heading_degrees(dx: f64, dy: f64) -> f64 {
    normalize_degrees(dy.atan2(dx).to_degrees())
}

fn normalize_degrees(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs;
    // adding 0.0 folds -0.0 into 0.0.
    if d >= 360.0 {
        0.0
    } else {
        d + 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> TargetZone {
        TargetZone {
            center_x: 0.0,
            center_y: 0.0,
            radius: 5.0,
            pixel_to_cm: 0.1,
        }
    }

    fn estimator(warmup: WarmUp) -> KinematicEstimator {
        KinematicEstimator::new(zone(), Duration::from_secs(60), warmup)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_zero_contacts_reuses_previous_state() {
        let mut est = estimator(WarmUp::ZeroFilled);
        let mut registry = ContactRegistry::new(1);
        registry.upsert(2, 5, false, 40.0, 30.0, 0);
        assert_eq!(est.tick(&registry, ms(0)), TickOutcome::Updated);
        registry.upsert(2, 5, false, 80.0, 60.0, 0);
        assert_eq!(est.tick(&registry, ms(100)), TickOutcome::Updated);
        let before = *est.state();

        registry.remove(2, 5);
        assert_eq!(est.tick(&registry, ms(200)), TickOutcome::NoContacts);
        assert_eq!(*est.state(), before);
    }

    #[test]
    fn test_host_pointer_excluded_from_centroid() {
        let mut est = estimator(WarmUp::SeedWithFirst);
        let mut registry = ContactRegistry::new(1);
        registry.upsert(0, 1, false, 500.0, 500.0, 0);
        assert_eq!(est.tick(&registry, ms(0)), TickOutcome::NoContacts);

        registry.upsert(2, 4, false, 10.0, 20.0, 0);
        registry.upsert(2, 6, false, 30.0, 40.0, 0);
        est.tick(&registry, ms(10));
        let state = est.state();
        assert_eq!(state.contacts, 2);
        assert_eq!((state.centroid_x, state.centroid_y), (20.0, 30.0));
    }

    #[test]
    fn test_cumulative_distance_sums_smoothed_steps() {
        let mut est = estimator(WarmUp::ZeroFilled);
        let mut registry = ContactRegistry::new(1);
        let path = [(10.0, 0.0), (20.0, 5.0), (35.0, 5.0), (35.0, 40.0), (0.0, 0.0), (12.0, 9.0)];

        let mut expected = 0.0;
        let mut prev: Option<(f64, f64)> = None;
        for (i, (x, y)) in path.iter().enumerate() {
            registry.upsert(2, 9, false, *x, *y, 0);
            est.tick(&registry, ms(i as u64 * 50));
            let s = est.state();
            if let Some((px, py)) = prev {
                expected += (s.smoothed_x - px).hypot(s.smoothed_y - py) * 0.1;
            }
            prev = Some((s.smoothed_x, s.smoothed_y));
        }
        assert!((est.state().cumulative_distance - expected).abs() < 1e-9);
    }

    #[test]
    fn test_relative_distance_in_physical_units() {
        let mut est = estimator(WarmUp::SeedWithFirst);
        let mut registry = ContactRegistry::new(1);
        registry.upsert(2, 3, false, 30.0, 40.0, 0);
        est.tick(&registry, ms(0));
        assert!((est.state().relative_distance - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_headings_stay_in_range() {
        let mut est = estimator(WarmUp::ZeroFilled);
        let mut registry = ContactRegistry::new(1);
        let mut angle: f64 = 0.0;
        for i in 0..200u64 {
            angle += 0.7;
            let x = 200.0 + 150.0 * angle.cos() * (i % 7) as f64;
            let y = 200.0 - 150.0 * angle.sin();
            registry.upsert(2, 3, false, x, y, 0);
            est.tick(&registry, ms(i * 16));
            let heading = est.state().heading;
            assert!((0.0..360.0).contains(&heading), "heading {heading}");
        }
    }

    #[test]
    fn test_heading_degrees_quadrants() {
        assert_eq!(heading_degrees(1.0, 0.0), 0.0);
        assert!((heading_degrees(0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((heading_degrees(-1.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((heading_degrees(0.0, -1.0) - 270.0).abs() < 1e-9);
        assert_eq!(heading_degrees(1.0, -1e-300), 0.0);
        assert_eq!(heading_degrees(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_speed_guards() {
        assert_eq!(instantaneous_speed(1.0, 2.0, 0.0), 0.0);
        assert!((instantaneous_speed(1.0, 2.0, 0.5) - 2.0).abs() < 1e-12);
        assert_eq!(instantaneous_speed(0.0, 60.0, 0.5), 0.0);
    }

    #[test]
    fn test_elapsed_measured_from_first_touch() {
        let mut est = estimator(WarmUp::ZeroFilled);
        let mut registry = ContactRegistry::new(1);
        registry.upsert(2, 3, false, 1.0, 1.0, 0);
        est.tick(&registry, Duration::from_secs(5));
        assert_eq!(est.state().elapsed, Duration::ZERO);
        est.tick(&registry, Duration::from_secs(7));
        assert_eq!(est.state().elapsed, Duration::from_secs(2));
    }

    #[test]
    fn test_session_end_is_terminal() {
        let mut est = KinematicEstimator::new(zone(), Duration::from_secs(2), WarmUp::ZeroFilled);
        let mut registry = ContactRegistry::new(1);
        registry.upsert(2, 3, false, 1.0, 1.0, 0);
        assert_eq!(est.tick(&registry, Duration::from_secs(1)), TickOutcome::Updated);
        assert_eq!(est.tick(&registry, Duration::from_secs(3)), TickOutcome::Updated);
        assert_eq!(
            est.tick(&registry, Duration::from_millis(3100)),
            TickOutcome::SessionEnded
        );
        assert!(est.has_ended());
        registry.remove(2, 3);
        assert_eq!(est.tick(&registry, Duration::from_secs(4)), TickOutcome::SessionEnded);
    }

    #[test]
    fn test_idle_expiry_needs_a_first_touch() {
        let mut est = KinematicEstimator::new(zone(), Duration::from_secs(2), WarmUp::ZeroFilled);
        assert!(!est.expire(Duration::from_secs(10)));

        let mut registry = ContactRegistry::new(1);
        registry.upsert(2, 3, false, 1.0, 1.0, 0);
        est.tick(&registry, Duration::from_secs(10));
        let before = *est.state();
        assert!(!est.expire(Duration::from_secs(11)));
        assert!(est.expire(Duration::from_millis(12_500)));
        assert_eq!(*est.state(), before);
        assert_eq!(est.tick(&registry, Duration::from_secs(13)), TickOutcome::SessionEnded);
    }
}
