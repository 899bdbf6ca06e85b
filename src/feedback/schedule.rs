//! Randomized-protocol stimulus schedule.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of presentations in a randomized session.
pub const PRESENTATIONS: usize = 9;

/// Shortest delay between a scheduling tick and its tone.
pub const MIN_RANDOM_DELAY: Duration = Duration::from_secs(30);

/// Stimulus intensity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GainTier {
    Low,
    Medium,
    High,
}

impl GainTier {
    /// Tier of a schedule token; tokens cycle through the tiers.
    pub fn from_token(token: u8) -> Self {
        match token % 3 {
            0 => GainTier::Low,
            1 => GainTier::Medium,
            _ => GainTier::High,
        }
    }

    pub fn gain(self) -> f32 {
        match self {
            GainTier::Low => 0.6,
            GainTier::Medium => 0.8,
            GainTier::High => 1.0,
        }
    }
}

/// A fixed permutation of the tokens `0..9`, consumed one per scheduling
/// tick. Exhaustion ends the session.
#[derive(Debug, Clone)]
pub struct StimulusSchedule {
    tokens: Vec<u8>,
    cursor: usize,
}

impl StimulusSchedule {
    /// Uniformly shuffled schedule.
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut tokens: Vec<u8> = (0..PRESENTATIONS as u8).collect();
        tokens.shuffle(rng);
        Self { tokens, cursor: 0 }
    }

    /// Schedule with a fixed token order.
    pub fn from_tokens(tokens: Vec<u8>) -> Self {
        Self { tokens, cursor: 0 }
    }

    /// Pop the next presentation.
    pub fn next_tier(&mut self) -> Option<GainTier> {
        let token = *self.tokens.get(self.cursor)?;
        self.cursor += 1;
        Some(GainTier::from_token(token))
    }

    pub fn presented(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Tiers of the whole schedule, in presentation order.
    pub fn tiers(&self) -> impl Iterator<Item = GainTier> + '_ {
        self.tokens.iter().map(|t| GainTier::from_token(*t))
    }
}

/// Delay bounds for randomized presentations: `[min_delay, period - tone]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayWindow {
    pub min: Duration,
    pub max: Duration,
}

impl DelayWindow {
    pub fn new(min: Duration, period: Duration, tone_duration: Duration) -> Self {
        Self {
            min,
            max: period.saturating_sub(tone_duration),
        }
    }

    /// Uniform draw from the window. A window whose upper bound does not
    /// exceed the lower one always yields the lower bound.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}
