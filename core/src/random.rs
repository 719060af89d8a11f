//! Entropy source abstraction shared by every stochastic phase of the filter.
//!
//! Initialization, prediction and resampling all draw from a [`RandomSource`] handed to them by the
//! caller instead of constructing a generator internally. Any [`rand::Rng`] is a [`RandomSource`], so
//! a seeded [`rand::rngs::StdRng`] gives reproducible runs.

use rand::Rng;
use rand_distr::StandardNormal;

pub trait RandomSource {
    /// Sample from a Gaussian with the given mean and (non-negative) standard deviation
    fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64;
    /// Sample uniformly from [0, upper)
    fn uniform(&mut self, upper: f64) -> f64;
    /// Sample an index uniformly from [0, n). `n` must be positive.
    fn index(&mut self, n: usize) -> usize;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn gaussian(&mut self, mean: f64, std_dev: f64) -> f64 {
        let z: f64 = self.sample(StandardNormal);
        mean + std_dev * z
    }
    fn uniform(&mut self, upper: f64) -> f64 {
        self.random::<f64>() * upper
    }
    fn index(&mut self, n: usize) -> usize {
        self.random_range(0..n)
    }
}
