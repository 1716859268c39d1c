//! Seeded noise for the synthetic scene
//!
//! Detector confidences wobble frame to frame the way a real model's do.

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;

/// Noise generator with configurable seed for reproducibility
#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// Seed 0 draws from OS entropy; anything else is reproducible
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_os_rng()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Gaussian noise with given standard deviation
    #[inline]
    pub fn gaussian(&mut self, stddev: f32) -> f32 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// `value` plus gaussian noise, clamped to [0, 1]
    #[inline]
    pub fn jitter_unit(&mut self, value: f32, stddev: f32) -> f32 {
        (value + self.gaussian(stddev)).clamp(0.0, 1.0)
    }
}
