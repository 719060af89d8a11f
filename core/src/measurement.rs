//! Landmark measurement model and importance weighting.
//!
//! For every particle the update runs four steps:
//!
//! 1. Gate the map with an axis-aligned square of half-width `sensor_range` around the particle.
//! 2. Transform the observations from the vehicle frame into the map frame using the particle's pose:
//!
//! $$
//! \begin{bmatrix} x_m \\\\ y_m \end{bmatrix} =
//! \begin{bmatrix} \cos\theta & -\sin\theta \\\\ \sin\theta & \cos\theta \end{bmatrix}
//! \begin{bmatrix} x_v \\\\ y_v \end{bmatrix} + \begin{bmatrix} x_p \\\\ y_p \end{bmatrix}
//! $$
//!
//! 3. Associate each transformed observation with its nearest gated landmark.
//! 4. Reset the weight to one and multiply in an axis-independent bivariate Gaussian for every
//!    associated observation:
//!
//! $$
//! p = \frac{1}{2 \pi \sigma_x \sigma_y} \exp\left( -\left( \frac{\Delta x^2}{2 \sigma_x^2} + \frac{\Delta y^2}{2 \sigma_y^2} \right) \right)
//! $$
//!
//! The product is accumulated as a sum of log-likelihoods. When the largest log-weight exceeds
//! [`LOG_WEIGHT_CEILING`] every weight is divided by the largest one, so many sharp matches cannot
//! overflow to infinity. Otherwise weights are left unnormalized.
use crate::association::associate;
use crate::error::{FilterError, Result, check_finite, check_positive_std_dev};
use crate::map::{Landmark, Map};
use crate::particle::{FilterState, Particle};
use crate::{Observation, Pose};

use nalgebra::{Isometry2, Point2, Vector2};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::f64::consts::PI;

/// Log-weights above this are shifted down so the heaviest particle weighs exactly 1.0.
pub const LOG_WEIGHT_CEILING: f64 = 300.0;

/// Summary of one weight update across the whole population
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UpdateReport {
    pub num_particles: usize,
    /// Particles whose gate held no landmark; their weight is 1.0 unless the update was rescaled
    pub empty_gates: usize,
    /// Observations (summed over particles) that could not be associated
    pub unassigned_observations: usize,
    pub max_weight: f64,
    /// Every weight underflowed or collapsed to zero
    pub all_weights_zero: bool,
    /// The weights were divided by a common factor to stay finite
    pub rescaled: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct ParticleUpdate {
    gated: usize,
    unassigned: usize,
    log_weight: f64,
}

/// Inputs shared by every particle in one update
#[derive(Clone, Copy)]
struct UpdateContext<'a> {
    sensor_range: f64,
    std_dev: [f64; 2],
    observations: &'a [Observation],
    map: &'a Map,
    record_associations: bool,
}

/// Transform vehicle-frame observations into the map frame as seen from `pose`.
pub fn to_map_frame(pose: &Pose, observations: &[Observation]) -> Vec<Observation> {
    let transform = Isometry2::new(Vector2::new(pose.x, pose.y), pose.theta);
    observations
        .iter()
        .map(|obs| {
            let point = transform * Point2::new(obs.x, obs.y);
            Observation {
                id: obs.id,
                x: point.x,
                y: point.y,
            }
        })
        .collect()
}

/// Bivariate Gaussian density with zero covariance, evaluated at the offset (`dx`, `dy`).
pub fn gaussian_likelihood(dx: f64, dy: f64, std_dev: [f64; 2]) -> f64 {
    log_likelihood(dx, dy, std_dev).exp()
}

/// Natural log of [`gaussian_likelihood`].
pub fn log_likelihood(dx: f64, dy: f64, std_dev: [f64; 2]) -> f64 {
    let (sigma_x, sigma_y) = (std_dev[0], std_dev[1]);
    let exponent = dx.powi(2) / (2.0 * sigma_x.powi(2)) + dy.powi(2) / (2.0 * sigma_y.powi(2));
    -(2.0 * PI * sigma_x * sigma_y).ln() - exponent
}

fn weigh_particle(particle: &mut Particle, ctx: UpdateContext<'_>) -> ParticleUpdate {
    let gated: Vec<Landmark> = ctx
        .map
        .gate(particle.pose.x, particle.pose.y, ctx.sensor_range);
    let mut transformed = to_map_frame(&particle.pose, ctx.observations);
    associate(&gated, &mut transformed);

    let mut log_weight = 0.0;
    let mut unassigned = 0;
    let mut associations = Vec::with_capacity(transformed.len());
    let mut sense_x = Vec::with_capacity(transformed.len());
    let mut sense_y = Vec::with_capacity(transformed.len());
    for obs in &transformed {
        match gated.iter().find(|l| l.id == obs.id) {
            Some(landmark) => {
                log_weight += log_likelihood(landmark.x - obs.x, landmark.y - obs.y, ctx.std_dev);
                associations.push(obs.id);
                sense_x.push(obs.x);
                sense_y.push(obs.y);
            }
            None => unassigned += 1,
        }
    }
    if ctx.record_associations {
        particle.set_associations(associations, sense_x, sense_y);
    }
    ParticleUpdate {
        gated: gated.len(),
        unassigned,
        log_weight,
    }
}

#[cfg(feature = "parallel")]
fn weigh_population(
    particles: &mut [Particle],
    ctx: UpdateContext<'_>,
    parallel: bool,
) -> Vec<ParticleUpdate> {
    if parallel {
        particles
            .par_iter_mut()
            .map(|p| weigh_particle(p, ctx))
            .collect()
    } else {
        particles.iter_mut().map(|p| weigh_particle(p, ctx)).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn weigh_population(
    particles: &mut [Particle],
    ctx: UpdateContext<'_>,
    _parallel: bool,
) -> Vec<ParticleUpdate> {
    particles.iter_mut().map(|p| weigh_particle(p, ctx)).collect()
}

/// Recompute every particle's importance weight from the latest observations.
///
/// # Arguments
/// * `state` - particle population, consumed and handed back reweighted
/// * `sensor_range` - half-width of the square gate (m)
/// * `std_dev` - measurement noise standard deviations in x and y (m), strictly positive
/// * `observations` - landmark observations in the vehicle frame
/// * `map` - the static landmark map
/// * `record_associations` - store association diagnostics on each particle
///
/// # Errors
/// Invalid range, noise or observation coordinates, or an empty map.
pub fn update_weights(
    mut state: FilterState,
    sensor_range: f64,
    std_dev: [f64; 2],
    observations: &[Observation],
    map: &Map,
    record_associations: bool,
) -> Result<(FilterState, UpdateReport)> {
    let report = update_in_place(
        &mut state,
        sensor_range,
        std_dev,
        observations,
        map,
        record_associations,
    )?;
    Ok((state, report))
}

/// [`update_weights`] on a borrowed population. Nothing is touched when an error is returned.
pub(crate) fn update_in_place(
    state: &mut FilterState,
    sensor_range: f64,
    std_dev: [f64; 2],
    observations: &[Observation],
    map: &Map,
    record_associations: bool,
) -> Result<UpdateReport> {
    let ctx = validate(sensor_range, std_dev, observations, map, record_associations)?;
    Ok(apply_update(state, ctx, cfg!(feature = "parallel")))
}

fn validate<'a>(
    sensor_range: f64,
    std_dev: [f64; 2],
    observations: &'a [Observation],
    map: &'a Map,
    record_associations: bool,
) -> Result<UpdateContext<'a>> {
    if !(sensor_range.is_finite() && sensor_range >= 0.0) {
        return Err(FilterError::InvalidParameter {
            name: "sensor_range",
            value: sensor_range,
        });
    }
    check_positive_std_dev("landmark x", std_dev[0])?;
    check_positive_std_dev("landmark y", std_dev[1])?;
    for obs in observations {
        check_finite("observation x", obs.x)?;
        check_finite("observation y", obs.y)?;
    }
    if map.is_empty() {
        return Err(FilterError::EmptyMap);
    }
    Ok(UpdateContext {
        sensor_range,
        std_dev,
        observations,
        map,
        record_associations,
    })
}

fn apply_update(state: &mut FilterState, ctx: UpdateContext<'_>, parallel: bool) -> UpdateReport {
    let updates = weigh_population(state.particles_mut(), ctx, parallel);

    let max_log_weight = updates
        .iter()
        .map(|u| u.log_weight)
        .fold(f64::NEG_INFINITY, f64::max);
    let rescaled = max_log_weight > LOG_WEIGHT_CEILING;
    let shift = if rescaled { max_log_weight } else { 0.0 };
    for (particle, update) in state.particles_mut().iter_mut().zip(&updates) {
        particle.weight = (update.log_weight - shift).exp();
    }

    let report = UpdateReport {
        num_particles: state.num_particles(),
        empty_gates: updates.iter().filter(|u| u.gated == 0).count(),
        unassigned_observations: updates.iter().map(|u| u.unassigned).sum(),
        max_weight: state.max_weight(),
        all_weights_zero: state.all_weights_zero(),
        rescaled,
    };
    if report.empty_gates > 0 {
        log::warn!(
            "{} of {} particles have no landmark within {} m; their weight stays 1.0",
            report.empty_gates,
            report.num_particles,
            ctx.sensor_range
        );
    }
    if rescaled {
        log::debug!(
            "log weights peaked at {:.1}, rescaled so the best particle weighs 1.0",
            max_log_weight
        );
    }
    if report.all_weights_zero {
        log::warn!("all {} particle weights are zero after update", report.num_particles);
    }
    log::debug!(
        "updated weights with {} observations: max weight {:.4e}",
        ctx.observations.len(),
        report.max_weight
    );
    report
}
