//! Landmark-based particle filter localization toolbox
//!
//! This crate estimates the planar pose (x, y, heading) of a moving vehicle by sequential Monte Carlo
//! estimation. A population of particles (pose hypotheses) is propagated with a noisy kinematic motion
//! model, weighted by how well the vehicle's landmark observations line up with a known, static map, and
//! resampled in proportion to those weights. The map is assumed to be known a priori; this crate does not
//! build maps.
//!
//! This crate is primarily built off of three additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the rigid-body transforms and the population statistics.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides random number generation for initialization, process noise, and resampling.
//! - [`serde`](https://crates.io/crates/serde): Provides (de)serialization of configuration and simulation records.
//!
//! ## Crate overview
//!
//! - [particle]: The particle type, the filter state, initialization, and population estimates.
//! - [motion]: The constant turn-rate and velocity (CTRV) motion model with process noise.
//! - [association]: Nearest-neighbor data association between observations and map landmarks.
//! - [measurement]: Map gating, frame transformation, and Gaussian importance weighting.
//! - [resampling]: The resampling wheel and alternative resampling strategies.
//! - [filter]: [`filter::ParticleFilter`], which owns the random source and runs one tick at a time.
//! - [map]: The static landmark map.
//! - [config]: Serializable filter and simulation configuration.
//! - [sim]: Simulation records, CSV I/O, and the closed-loop localization driver.
//!
//! ## The filter cycle
//!
//! A single tick runs three phases, each of which consumes the [`particle::FilterState`] and hands a new
//! one to the next phase:
//!
//! 1. **Prediction**: every particle is advanced with the commanded velocity $v$ and yaw rate $\omega$
//!    over $\Delta t$. For $|\omega| \geq \epsilon$
//!
//! $$
//! x' = x + \frac{v}{\omega} \left( \sin(\theta + \omega \Delta t) - \sin\theta \right), \quad
//! y' = y + \frac{v}{\omega} \left( \cos\theta - \cos(\theta + \omega \Delta t) \right), \quad
//! \theta' = \theta + \omega \Delta t
//! $$
//!
//!    and the straight-line limit otherwise. Zero-mean Gaussian process noise is then added per axis.
//! 2. **Weight update**: observations (given in the vehicle frame) are transformed into the map frame
//!    using each particle's pose, associated with the nearest landmark inside a square gate of side
//!    $2 r$ around the particle, and scored with a product of axis-independent bivariate Gaussians.
//! 3. **Resampling**: a new population of the same size is drawn with replacement, proportional to weight.
//!
//! Weights are never required to sum to one; only their ratios matter.
//!
//! ## Randomness
//!
//! Every stochastic operation takes its entropy from a caller-supplied [`random::RandomSource`]. The
//! [`filter::ParticleFilter`] owns a single seeded [`rand::rngs::StdRng`] and threads it through every
//! phase, so a run with a given seed is exactly reproducible.
pub mod association;
pub mod config;
pub mod error;
pub mod filter;
pub mod map;
pub mod measurement;
pub mod motion;
pub mod particle;
pub mod random;
pub mod resampling;
pub mod sim;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

pub use error::{FilterError, Result};
pub use filter::{ParticleFilter, TickReport};
pub use map::{Landmark, Map};
pub use particle::{FilterState, Particle};
pub use random::RandomSource;

/// Sentinel landmark id carried by an observation that has not been associated.
pub const UNASSIGNED: i32 = -1;

/// Planar pose of the vehicle (or of a particle) in the map frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position along the map x-axis (m)
    pub x: f64,
    /// Position along the map y-axis (m)
    pub y: f64,
    /// Heading, counter-clockwise from the map x-axis (rad)
    pub theta: f64,
}
impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }
}
impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4} rad)", self.x, self.y, self.theta)
    }
}
impl From<(f64, f64, f64)> for Pose {
    fn from(tuple: (f64, f64, f64)) -> Self {
        Pose::new(tuple.0, tuple.1, tuple.2)
    }
}

/// A single landmark observation.
///
/// The coordinates are expressed in the vehicle frame as received from the sensor and in the map frame
/// after [`measurement::to_map_frame`]. The frame is implied by the stage of the pipeline the value is
/// in; it is not stored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    /// Associated landmark id, or [`UNASSIGNED`]
    pub id: i32,
    pub x: f64,
    pub y: f64,
}
impl Observation {
    /// Creates an unassociated observation
    pub fn new(x: f64, y: f64) -> Self {
        Observation {
            id: UNASSIGNED,
            x,
            y,
        }
    }
    pub fn is_assigned(&self) -> bool {
        self.id != UNASSIGNED
    }
}

/// Wrap an angle to the interval [-pi, pi].
pub fn wrap_to_pi(angle: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let wrapped = (angle + std::f64::consts::PI).rem_euclid(two_pi) - std::f64::consts::PI;
    if wrapped == -std::f64::consts::PI && angle > 0.0 {
        std::f64::consts::PI
    } else {
        wrapped
    }
}
