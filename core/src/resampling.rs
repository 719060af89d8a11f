//! Resampling: draw a new population of the same size, with replacement, in proportion to weight.
//!
//! The default is the resampling wheel. The wheel starts at a uniformly random index and, for each of
//! the N draws, advances a threshold `beta` by a uniform draw from [0, 2 w_max); while `beta` exceeds
//! the weight under the pointer it is reduced by that weight and the pointer moves on (wrapping). The
//! particle under the pointer is copied into the new population.
//!
//! Weights only need to be non-negative; they do not have to sum to one. A population whose weights
//! are all zero carries no information to discriminate on, and is handled by a [`ZeroWeightPolicy`].
use crate::error::{FilterError, Result};
use crate::particle::FilterState;
use crate::random::RandomSource;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResamplingStrategy {
    /// Resampling wheel
    #[default]
    Wheel,
    /// One uniform offset, N evenly spaced pointers over the cumulative weights
    Systematic,
    /// N independent draws from the categorical distribution
    Multinomial,
}

/// What to do when every weight is zero
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZeroWeightPolicy {
    /// Treat every particle as equally likely and resample anyway
    #[default]
    Uniform,
    /// Refuse with [`FilterError::DegenerateWeights`]
    Fail,
}

impl ResamplingStrategy {
    /// Indices of the particles to copy into the next generation.
    ///
    /// `weights` must be non-empty, finite, non-negative and contain at least one positive entry.
    pub fn draw_indices<R: RandomSource + ?Sized>(&self, weights: &[f64], rng: &mut R) -> Vec<usize> {
        match self {
            ResamplingStrategy::Wheel => wheel_indices(weights, rng),
            ResamplingStrategy::Systematic => systematic_indices(weights, rng),
            ResamplingStrategy::Multinomial => multinomial_indices(weights, rng),
        }
    }
}

/// Spin the resampling wheel `weights.len()` times.
///
/// The wheel runs on the weights divided by their maximum, so `2 * w_max` stays finite for any
/// finite input.
pub fn wheel_indices<R: RandomSource + ?Sized>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    let max_weight = weights.iter().copied().fold(0.0, f64::max);
    let scaled: Vec<f64> = if max_weight > 0.0 {
        weights.iter().map(|w| w / max_weight).collect()
    } else {
        weights.to_vec()
    };
    let max_scaled = if max_weight > 0.0 { 1.0 } else { 0.0 };
    let mut index = rng.index(n);
    let mut beta = 0.0;
    let mut indices = Vec::with_capacity(n);
    for _ in 0..n {
        beta += rng.uniform(2.0 * max_scaled);
        while beta > scaled[index] {
            beta -= scaled[index];
            index = (index + 1) % n;
        }
        indices.push(index);
    }
    indices
}

fn cumulative(weights: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .scan(0.0, |acc, &w| {
            *acc += w;
            Some(*acc)
        })
        .collect()
}

/// First index whose cumulative weight is at least `target`, skipping zero-weight particles.
fn search(cumsum: &[f64], target: f64) -> usize {
    let i = cumsum.partition_point(|&c| c < target);
    let last = cumsum.len() - 1;
    let mut i = i.min(last);
    // a zero-width bucket can only be hit by a target landing exactly on its boundary
    while i < last && ((i == 0 && cumsum[0] == 0.0) || (i > 0 && cumsum[i] == cumsum[i - 1])) {
        i += 1;
    }
    i
}

pub fn systematic_indices<R: RandomSource + ?Sized>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    let cumsum = cumulative(weights);
    let total = cumsum[n - 1];
    let step = total / n as f64;
    let start = rng.uniform(step);
    (0..n)
        .map(|i| search(&cumsum, start + i as f64 * step))
        .collect()
}

pub fn multinomial_indices<R: RandomSource + ?Sized>(weights: &[f64], rng: &mut R) -> Vec<usize> {
    let n = weights.len();
    let cumsum = cumulative(weights);
    let total = cumsum[n - 1];
    (0..n)
        .map(|_| search(&cumsum, rng.uniform(total)))
        .collect()
}

/// Replace the population with a weighted draw of itself.
///
/// Every new particle is a full copy of its source (id, pose and weight), so ids repeat after
/// resampling. Association diagnostics are cleared unless `retain_associations` is set.
///
/// # Errors
/// Negative or non-finite weights, or all-zero weights under [`ZeroWeightPolicy::Fail`].
pub fn resample<R: RandomSource + ?Sized>(
    mut state: FilterState,
    strategy: ResamplingStrategy,
    zero_weight_policy: ZeroWeightPolicy,
    retain_associations: bool,
    rng: &mut R,
) -> Result<FilterState> {
    resample_in_place(
        &mut state,
        strategy,
        zero_weight_policy,
        retain_associations,
        rng,
    )?;
    Ok(state)
}

/// [`resample`] on a borrowed population. Nothing is touched when an error is returned.
pub(crate) fn resample_in_place<R: RandomSource + ?Sized>(
    state: &mut FilterState,
    strategy: ResamplingStrategy,
    zero_weight_policy: ZeroWeightPolicy,
    retain_associations: bool,
    rng: &mut R,
) -> Result<()> {
    let n = state.num_particles();
    if n == 0 {
        return Err(FilterError::InvalidParticleCount(n));
    }
    let mut weights = state.weights();
    if let Some(&bad) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
        return Err(FilterError::InvalidParameter {
            name: "weight",
            value: bad,
        });
    }
    if state.all_weights_zero() {
        match zero_weight_policy {
            ZeroWeightPolicy::Fail => {
                return Err(FilterError::DegenerateWeights { num_particles: n });
            }
            ZeroWeightPolicy::Uniform => {
                log::warn!("all weights are zero, resampling {} particles uniformly", n);
                weights = vec![1.0; n];
            }
        }
    }

    let indices = strategy.draw_indices(&weights, rng);
    let particles = state.particles();
    let resampled = indices
        .into_iter()
        .map(|i| {
            let mut particle = particles[i].clone();
            if !retain_associations {
                particle.clear_associations();
            }
            particle
        })
        .collect();
    *state = FilterState::from_particles(resampled);
    log::debug!("resampled {} particles with {:?}", n, strategy);
    Ok(())
}
