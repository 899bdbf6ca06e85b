//! Fixed-capacity rolling windows used for temporal smoothing.

use crate::config::WarmUp;
use statrs::statistics::Statistics;

/// Window length for centroid smoothing.
pub const CENTROID_WINDOW: usize = 4;

/// Window length for heading smoothing.
pub const HEADING_WINDOW: usize = 8;

/// Circular buffer holding the last `N` samples.
///
/// The mean is always taken over all `N` slots. Under
/// [`WarmUp::ZeroFilled`] slots that have not been written yet hold zero,
/// so the mean is biased toward zero until the window has seen `N` samples.
#[derive(Debug, Clone)]
pub struct RollingWindow<const N: usize> {
    slots: [f64; N],
    /// Next slot to overwrite
    head: usize,
    filled: usize,
    warmup: WarmUp,
}

impl<const N: usize> RollingWindow<N> {
    pub fn new(warmup: WarmUp) -> Self {
        Self {
            slots: [0.0; N],
            head: 0,
            filled: 0,
            warmup,
        }
    }

    /// Push a sample, dropping the oldest once full.
    pub fn push(&mut self, value: f64) {
        if self.filled == 0 && self.warmup == WarmUp::SeedWithFirst {
            self.slots = [value; N];
        }
        self.slots[self.head] = value;
        self.head = (self.head + 1) % N;
        self.filled = (self.filled + 1).min(N);
    }

    /// Arithmetic mean over all slots.
    pub fn mean(&self) -> f64 {
        self.slots.iter().mean()
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<f64> {
        if self.filled == 0 {
            None
        } else {
            Some(self.slots[(self.head + N - 1) % N])
        }
    }

    /// Number of real samples seen, capped at `N`.
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_full(&self) -> bool {
        self.filled == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}
