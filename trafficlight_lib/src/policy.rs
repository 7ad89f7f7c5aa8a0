//! Cycle strategies: how long a phase lasts and which phase follows it.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::phase::Phase;

/// Decides the length of each cycle and the phase that follows it.
///
/// The toggler calls `next_duration` once at the start of every cycle and
/// polls elapsed time against that fixed value.
pub trait CyclePolicy: Send + 'static {
    /// Duration of the cycle that is starting now.
    fn next_duration(&mut self) -> Duration;

    /// The phase to switch to once the current cycle elapses.
    fn next_phase(&self, current: Phase) -> Phase {
        current.toggled()
    }
}

/// Draws every cycle uniformly from the closed interval `[min, max]`.
#[derive(Debug, Clone)]
pub struct RandomCycle {
    min: Duration,
    max: Duration,
    rng: StdRng,
}

impl RandomCycle {
    /// Creates a policy seeded from the operating system.
    ///
    /// `min` and `max` are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    /// Creates a reproducible policy.
    pub fn seeded(min: Duration, max: Duration, seed: u64) -> Self {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min: Duration, max: Duration, rng: StdRng) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        RandomCycle { min, max, rng }
    }

    /// The shortest possible cycle.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// The longest possible cycle.
    pub fn max(&self) -> Duration {
        self.max
    }
}

impl CyclePolicy for RandomCycle {
    fn next_duration(&mut self) -> Duration {
        self.rng.gen_range(self.min..=self.max)
    }
}

/// Every cycle lasts exactly the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCycle(pub Duration);

impl CyclePolicy for FixedCycle {
    fn next_duration(&mut self) -> Duration {
        self.0
    }
}
