//! Particles, the filter state, initialization, and population estimates.
use crate::error::{FilterError, Result, check_finite, check_std_dev};
use crate::random::RandomSource;
use crate::{Pose, wrap_to_pi};

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

/// One hypothesis of the vehicle pose with its importance weight.
///
/// The association fields are diagnostics only: they record which landmark each observation was
/// matched to and where that observation landed in the map frame, for visualization and logging.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particle {
    pub id: usize,
    pub pose: Pose,
    pub weight: f64,
    pub associations: Vec<i32>,
    pub sense_x: Vec<f64>,
    pub sense_y: Vec<f64>,
}
impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.pose.x)
            .field("y", &self.pose.y)
            .field("theta", &self.pose.theta)
            .field("weight", &self.weight)
            .field("associations", &self.associations.len())
            .finish()
    }
}
impl Particle {
    pub fn new(id: usize, pose: Pose, weight: f64) -> Particle {
        Particle {
            id,
            pose,
            weight,
            associations: Vec::new(),
            sense_x: Vec::new(),
            sense_y: Vec::new(),
        }
    }
    /// Store the association diagnostics for this particle.
    ///
    /// # Arguments
    /// * `associations` - landmark id matched to each associated observation
    /// * `sense_x` - map-frame x of each associated observation
    /// * `sense_y` - map-frame y of each associated observation
    pub fn set_associations(&mut self, associations: Vec<i32>, sense_x: Vec<f64>, sense_y: Vec<f64>) {
        self.associations = associations;
        self.sense_x = sense_x;
        self.sense_y = sense_y;
    }
    pub fn clear_associations(&mut self) {
        self.associations.clear();
        self.sense_x.clear();
        self.sense_y.clear();
    }
    /// Associated landmark ids as a space separated string, e.g. `"1 2 3"`
    pub fn associations_string(&self) -> String {
        format_sequence(&self.associations)
    }
    pub fn sense_x_string(&self) -> String {
        format_sequence(&self.sense_x)
    }
    pub fn sense_y_string(&self) -> String {
        format_sequence(&self.sense_y)
    }
}

/// Join values with single spaces, without a trailing separator.
pub fn format_sequence<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The particle population. Its size is fixed at initialization.
#[derive(Clone, Default, PartialEq)]
pub struct FilterState {
    particles: Vec<Particle>,
}
impl Debug for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::INFINITY, f64::min);
        let max_weight = self.max_weight();
        f.debug_struct("FilterState")
            .field("num_particles", &self.particles.len())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .finish()
    }
}
impl FilterState {
    pub fn from_particles(particles: Vec<Particle>) -> Self {
        FilterState { particles }
    }
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }
    pub fn into_particles(self) -> Vec<Particle> {
        self.particles
    }
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }
    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(|p| p.weight).collect()
    }
    pub fn max_weight(&self) -> f64 {
        self.particles.iter().map(|p| p.weight).fold(0.0, f64::max)
    }
    pub fn all_weights_zero(&self) -> bool {
        self.particles.iter().all(|p| p.weight == 0.0)
    }
    /// Highest-weight particle. The first one wins ties.
    pub fn best_particle(&self) -> Option<&Particle> {
        best_of(&self.particles)
    }
    /// Scale the weights to sum to one without changing their ratios.
    ///
    /// A zero or non-finite sum resets every weight to 1/N.
    pub fn normalize_weights(&mut self) {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        if sum > 0.0 && sum.is_finite() {
            for particle in &mut self.particles {
                particle.weight /= sum;
            }
        } else {
            let uniform = 1.0 / self.particles.len() as f64;
            for particle in &mut self.particles {
                particle.weight = uniform;
            }
        }
    }
    /// N_eff = (sum w)^2 / sum(w^2), valid for unnormalized weights
    pub fn effective_sample_size(&self) -> f64 {
        let sum: f64 = self.particles.iter().map(|p| p.weight).sum();
        let sum_of_squares: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_of_squares > 0.0 {
            sum * sum / sum_of_squares
        } else {
            0.0
        }
    }
}

/// Seed the particle population around a prior pose.
///
/// Each coordinate is drawn independently from a Gaussian centred on the prior. Every particle starts
/// with weight 1.0 and ids are assigned `0..num_particles`.
///
/// # Arguments
/// * `prior` - prior pose estimate (e.g. from GPS)
/// * `std_dev` - standard deviations of x, y and heading; zero replicates the prior exactly
/// * `num_particles` - population size, fixed for the lifetime of the filter
/// * `rng` - entropy source
pub fn initialize<R: RandomSource + ?Sized>(
    prior: Pose,
    std_dev: [f64; 3],
    num_particles: usize,
    rng: &mut R,
) -> Result<FilterState> {
    if num_particles == 0 {
        return Err(FilterError::InvalidParticleCount(num_particles));
    }
    check_finite("prior x", prior.x)?;
    check_finite("prior y", prior.y)?;
    check_finite("prior theta", prior.theta)?;
    check_std_dev("initial x", std_dev[0])?;
    check_std_dev("initial y", std_dev[1])?;
    check_std_dev("initial theta", std_dev[2])?;

    let particles = (0..num_particles)
        .map(|id| {
            let pose = Pose::new(
                rng.gaussian(prior.x, std_dev[0]),
                rng.gaussian(prior.y, std_dev[1]),
                rng.gaussian(prior.theta, std_dev[2]),
            );
            Particle::new(id, pose, 1.0)
        })
        .collect();
    log::debug!(
        "initialized {} particles around {} with std {:?}",
        num_particles,
        prior,
        std_dev
    );
    Ok(FilterState { particles })
}

/// How to collapse the particle population into a single pose estimate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleAveragingStrategy {
    #[default]
    WeightedAverage,
    UnweightedAverage,
    HighestWeight,
}
impl ParticleAveragingStrategy {
    /// Pose estimate and its 3x3 covariance (x, y, theta).
    ///
    /// Headings are averaged on the circle and heading residuals are wrapped before entering the
    /// covariance. Returns `None` for an empty population.
    pub fn estimate(&self, particles: &[Particle]) -> Option<(Pose, Matrix3<f64>)> {
        if particles.is_empty() {
            return None;
        }
        match self {
            ParticleAveragingStrategy::WeightedAverage => {
                let sum: f64 = particles.iter().map(|p| p.weight).sum();
                if sum > 0.0 && sum.is_finite() {
                    let weights: Vec<f64> = particles.iter().map(|p| p.weight / sum).collect();
                    Some(weighted_mean_and_covariance(particles, &weights))
                } else {
                    ParticleAveragingStrategy::UnweightedAverage.estimate(particles)
                }
            }
            ParticleAveragingStrategy::UnweightedAverage => {
                let weights = vec![1.0 / particles.len() as f64; particles.len()];
                Some(weighted_mean_and_covariance(particles, &weights))
            }
            ParticleAveragingStrategy::HighestWeight => {
                let best = best_of(particles)?;
                Some((best.pose, Matrix3::zeros()))
            }
        }
    }
}
fn best_of(particles: &[Particle]) -> Option<&Particle> {
    particles
        .iter()
        .fold(None, |best: Option<&Particle>, p| match best {
            Some(b) if b.weight >= p.weight => Some(b),
            _ => Some(p),
        })
}

fn weighted_mean_and_covariance(particles: &[Particle], weights: &[f64]) -> (Pose, Matrix3<f64>) {
    let mut x = 0.0;
    let mut y = 0.0;
    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    for (particle, w) in particles.iter().zip(weights) {
        x += w * particle.pose.x;
        y += w * particle.pose.y;
        sin_sum += w * particle.pose.theta.sin();
        cos_sum += w * particle.pose.theta.cos();
    }
    let mean = Pose::new(x, y, sin_sum.atan2(cos_sum));
    let mut cov = Matrix3::<f64>::zeros();
    for (particle, w) in particles.iter().zip(weights) {
        let diff = Vector3::new(
            particle.pose.x - mean.x,
            particle.pose.y - mean.y,
            wrap_to_pi(particle.pose.theta - mean.theta),
        );
        cov += *w * diff * diff.transpose();
    }
    (mean, cov)
}
