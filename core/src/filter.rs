//! Tick-driven particle filter.
//!
//! [`ParticleFilter`] owns the configuration, a single seeded random source, and the particle
//! population. Each phase runs the borrowed counterpart of a free function
//! ([`crate::motion::predict`], [`crate::measurement::update_weights`],
//! [`crate::resampling::resample`]) on the population it holds. Inputs are validated before any
//! particle is touched, so a failed phase leaves the population as it was.
//!
//! # Example
//!
//! ```
//! use landmark_pf::config::FilterConfig;
//! use landmark_pf::{Landmark, Map, Observation, ParticleFilter, Pose};
//!
//! let map = Map::new(vec![Landmark::new(1, 5.0, 0.0), Landmark::new(2, 0.0, 5.0)]);
//! let mut pf = ParticleFilter::new(FilterConfig { num_particles: 50, ..Default::default() });
//! pf.init(Pose::new(0.0, 0.0, 0.0), [0.3, 0.3, 0.01]).unwrap();
//!
//! let observations = vec![Observation::new(4.0, 0.0), Observation::new(-1.0, 5.0)];
//! let report = pf
//!     .step(0.1, [0.3, 0.3, 0.01], 10.0, 0.0, 50.0, [0.3, 0.3], &observations, &map)
//!     .unwrap();
//! assert_eq!(report.update.num_particles, 50);
//! assert_eq!(pf.num_particles(), 50);
//! ```
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::map::Map;
use crate::measurement::{self, UpdateReport};
use crate::particle::{self, FilterState, Particle, ParticleAveragingStrategy};
use crate::{Observation, Pose, motion, resampling};

use nalgebra::Matrix3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt::{self, Debug};

/// Diagnostics of one full predict/update/resample tick
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    pub update: UpdateReport,
    /// Effective sample size of the weights right before resampling
    pub effective_sample_size: f64,
}

pub struct ParticleFilter {
    config: FilterConfig,
    rng: StdRng,
    state: Option<FilterState>,
}
impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleFilter")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

impl ParticleFilter {
    /// Create an uninitialized filter. The random source is seeded from `config.seed`.
    pub fn new(config: FilterConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        ParticleFilter {
            config,
            rng,
            state: None,
        }
    }
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }
    /// Particle count, or zero before initialization
    pub fn num_particles(&self) -> usize {
        self.state.as_ref().map_or(0, FilterState::num_particles)
    }
    pub fn particles(&self) -> &[Particle] {
        self.state
            .as_ref()
            .map(FilterState::particles)
            .unwrap_or_default()
    }
    pub fn state(&self) -> Option<&FilterState> {
        self.state.as_ref()
    }

    /// Seed `config.num_particles` particles around `prior`.
    ///
    /// Re-initializing discards the current population.
    pub fn init(&mut self, prior: Pose, std_dev: [f64; 3]) -> Result<()> {
        let state = particle::initialize(prior, std_dev, self.config.num_particles, &mut self.rng)?;
        log::info!(
            "particle filter initialized with {} particles at {}",
            state.num_particles(),
            prior
        );
        self.state = Some(state);
        Ok(())
    }

    /// Motion update of every particle (see [`motion::predict`]).
    pub fn predict(&mut self, delta_t: f64, std_dev: [f64; 3], velocity: f64, yaw_rate: f64) -> Result<()> {
        let state = self.state.as_mut().ok_or(FilterError::NotInitialized)?;
        motion::predict_in_place(state, delta_t, std_dev, velocity, yaw_rate, &mut self.rng)
    }

    /// Reweight every particle against the map (see [`measurement::update_weights`]).
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        std_dev: [f64; 2],
        observations: &[Observation],
        map: &Map,
    ) -> Result<UpdateReport> {
        let record_associations = self.config.record_associations;
        measurement::update_in_place(
            self.state_mut()?,
            sensor_range,
            std_dev,
            observations,
            map,
            record_associations,
        )
    }

    /// Draw the next generation (see [`resampling::resample`]).
    pub fn resample(&mut self) -> Result<()> {
        let state = self.state.as_mut().ok_or(FilterError::NotInitialized)?;
        resampling::resample_in_place(
            state,
            self.config.resampling,
            self.config.zero_weight_policy,
            self.config.retain_associations,
            &mut self.rng,
        )
    }

    /// Run one full tick: predict, update weights, resample.
    ///
    /// # Arguments
    /// * `delta_t` - elapsed time since the previous tick (s)
    /// * `process_std` - process noise standard deviations (x, y, theta)
    /// * `velocity` - commanded velocity (m/s)
    /// * `yaw_rate` - commanded yaw rate (rad/s)
    /// * `sensor_range` - landmark gate half-width (m)
    /// * `landmark_std` - measurement noise standard deviations (x, y)
    /// * `observations` - landmark observations in the vehicle frame
    /// * `map` - static landmark map
    ///
    /// # Errors
    /// Any phase error. With [`crate::resampling::ZeroWeightPolicy::Fail`], a population whose
    /// weights all collapsed to zero surfaces as [`FilterError::DegenerateWeights`] and the
    /// reweighted (not resampled) population is kept.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        delta_t: f64,
        process_std: [f64; 3],
        velocity: f64,
        yaw_rate: f64,
        sensor_range: f64,
        landmark_std: [f64; 2],
        observations: &[Observation],
        map: &Map,
    ) -> Result<TickReport> {
        self.predict(delta_t, process_std, velocity, yaw_rate)?;
        let update = self.update_weights(sensor_range, landmark_std, observations, map)?;
        let effective_sample_size = self.effective_sample_size();
        self.resample()?;
        Ok(TickReport {
            update,
            effective_sample_size,
        })
    }

    /// Rescale the weights to sum to one without changing their ratios.
    pub fn normalize_weights(&mut self) -> Result<()> {
        self.state_mut()?.normalize_weights();
        Ok(())
    }
    pub fn effective_sample_size(&self) -> f64 {
        self.state
            .as_ref()
            .map_or(0.0, FilterState::effective_sample_size)
    }
    pub fn best_particle(&self) -> Option<&Particle> {
        self.state.as_ref()?.best_particle()
    }
    /// Pose estimate and covariance of the current population
    pub fn estimate(&self, strategy: ParticleAveragingStrategy) -> Option<(Pose, Matrix3<f64>)> {
        strategy.estimate(self.particles())
    }

    fn state_mut(&mut self) -> Result<&mut FilterState> {
        self.state.as_mut().ok_or(FilterError::NotInitialized)
    }
}
