//! Constant turn-rate and velocity (CTRV) motion model.
//!
//! Each particle is advanced independently of all the others. Process noise is drawn from the caller's
//! random source in particle order (x, y, theta for particle 0, then particle 1, ...) so the stream is
//! consumed in a fixed order.
use crate::Pose;
use crate::error::{FilterError, Result, check_finite, check_std_dev};
use crate::particle::FilterState;
use crate::random::RandomSource;

/// Below this yaw rate (rad/s) the straight-line model is used to avoid dividing by ~0.
pub const YAW_RATE_EPSILON: f64 = 1e-5;

/// Deterministic part of the motion update.
///
/// For `|yaw_rate| < YAW_RATE_EPSILON` the vehicle moves along its heading, which is the limit of the
/// arc solution as the yaw rate goes to zero.
pub fn predict_pose(pose: Pose, delta_t: f64, velocity: f64, yaw_rate: f64) -> Pose {
    if yaw_rate.abs() < YAW_RATE_EPSILON {
        Pose::new(
            pose.x + velocity * delta_t * pose.theta.cos(),
            pose.y + velocity * delta_t * pose.theta.sin(),
            pose.theta,
        )
    } else {
        let theta = pose.theta + yaw_rate * delta_t;
        let radius = velocity / yaw_rate;
        Pose::new(
            pose.x + radius * (theta.sin() - pose.theta.sin()),
            pose.y + radius * (pose.theta.cos() - theta.cos()),
            theta,
        )
    }
}

/// Advance every particle and add zero-mean Gaussian process noise.
///
/// # Arguments
/// * `state` - particle population, consumed and handed back advanced
/// * `delta_t` - elapsed time (s), finite and non-negative
/// * `std_dev` - process noise standard deviations for x, y and heading
/// * `velocity` - commanded velocity (m/s)
/// * `yaw_rate` - commanded yaw rate (rad/s)
/// * `rng` - entropy source
pub fn predict<R: RandomSource + ?Sized>(
    mut state: FilterState,
    delta_t: f64,
    std_dev: [f64; 3],
    velocity: f64,
    yaw_rate: f64,
    rng: &mut R,
) -> Result<FilterState> {
    predict_in_place(&mut state, delta_t, std_dev, velocity, yaw_rate, rng)?;
    Ok(state)
}

/// [`predict`] on a borrowed population. Inputs are checked before any particle moves.
pub(crate) fn predict_in_place<R: RandomSource + ?Sized>(
    state: &mut FilterState,
    delta_t: f64,
    std_dev: [f64; 3],
    velocity: f64,
    yaw_rate: f64,
    rng: &mut R,
) -> Result<()> {
    if !(delta_t.is_finite() && delta_t >= 0.0) {
        return Err(FilterError::InvalidParameter {
            name: "delta_t",
            value: delta_t,
        });
    }
    check_finite("velocity", velocity)?;
    check_finite("yaw_rate", yaw_rate)?;
    check_std_dev("process x", std_dev[0])?;
    check_std_dev("process y", std_dev[1])?;
    check_std_dev("process theta", std_dev[2])?;

    for particle in state.particles_mut() {
        let pose = predict_pose(particle.pose, delta_t, velocity, yaw_rate);
        particle.pose = Pose::new(
            rng.gaussian(pose.x, std_dev[0]),
            rng.gaussian(pose.y, std_dev[1]),
            rng.gaussian(pose.theta, std_dev[2]),
        );
    }
    log::debug!(
        "predicted {} particles: dt={}, v={}, yaw_rate={}",
        state.num_particles(),
        delta_t,
        velocity,
        yaw_rate
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Particle, ParticleAveragingStrategy, initialize};
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_zero_yaw_rate_is_straight_line() {
        let start = Pose::new(1.0, 2.0, FRAC_PI_4);
        let end = predict_pose(start, 0.1, 10.0, 0.0);
        assert_eq!(end.x, 1.0 + 10.0 * 0.1 * FRAC_PI_4.cos());
        assert_eq!(end.y, 2.0 + 10.0 * 0.1 * FRAC_PI_4.sin());
        assert_eq!(end.theta, FRAC_PI_4);
    }

    #[test]
    fn test_quarter_circle_arc() {
        let end = predict_pose(Pose::new(0.0, 0.0, 0.0), 1.0, FRAC_PI_2, FRAC_PI_2);
        assert_approx_eq!(end.x, 1.0, 1e-12);
        assert_approx_eq!(end.y, 1.0, 1e-12);
        assert_approx_eq!(end.theta, FRAC_PI_2, 1e-12);
    }

    #[test]
    fn test_branches_agree_near_epsilon() {
        let start = Pose::new(3.0, -4.0, 0.7);
        for sign in [1.0, -1.0] {
            let below = predict_pose(start, 0.1, 10.0, sign * YAW_RATE_EPSILON * (1.0 - 1e-6));
            let above = predict_pose(start, 0.1, 10.0, sign * YAW_RATE_EPSILON * (1.0 + 1e-6));
            assert_approx_eq!(below.x, above.x, 1e-6);
            assert_approx_eq!(below.y, above.y, 1e-6);
            assert_approx_eq!(below.theta, above.theta, 1e-5);
        }
    }

    #[test]
    fn test_predict_without_noise_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        let state = FilterState::from_particles(vec![
            Particle::new(0, Pose::new(0.0, 0.0, 0.0), 1.0),
            Particle::new(1, Pose::new(1.0, 0.0, FRAC_PI_2), 0.5),
        ]);
        let state = predict(state, 0.5, [0.0; 3], 2.0, 0.0, &mut rng).unwrap();
        let particles = state.particles();
        assert_approx_eq!(particles[0].pose.x, 1.0, 1e-12);
        assert_approx_eq!(particles[0].pose.y, 0.0, 1e-12);
        assert_approx_eq!(particles[1].pose.x, 1.0, 1e-12);
        assert_approx_eq!(particles[1].pose.y, 1.0, 1e-12);
        // prediction never touches weights or ids
        assert_eq!(particles[1].weight, 0.5);
        assert_eq!(particles[1].id, 1);
    }

    #[test]
    fn test_process_noise_has_requested_spread() {
        let mut rng = StdRng::seed_from_u64(11);
        let state = initialize(Pose::default(), [0.0; 3], 20_000, &mut rng).unwrap();
        let state = predict(state, 0.1, [0.3, 0.3, 0.01], 0.0, 0.0, &mut rng).unwrap();
        let (mean, cov) = ParticleAveragingStrategy::UnweightedAverage
            .estimate(state.particles())
            .unwrap();
        assert_approx_eq!(mean.x, 0.0, 0.01);
        assert_approx_eq!(mean.y, 0.0, 0.01);
        assert_approx_eq!(cov[(0, 0)].sqrt(), 0.3, 0.01);
        assert_approx_eq!(cov[(1, 1)].sqrt(), 0.3, 0.01);
        assert_approx_eq!(cov[(2, 2)].sqrt(), 0.01, 0.0005);
    }

    #[test]
    fn test_predict_rejects_invalid_inputs() {
        let mut rng = StdRng::seed_from_u64(0);
        let state = FilterState::from_particles(vec![Particle::new(0, Pose::default(), 1.0)]);
        assert!(matches!(
            predict(state.clone(), -0.1, [0.3; 3], 1.0, 0.0, &mut rng),
            Err(FilterError::InvalidParameter { name: "delta_t", .. })
        ));
        assert!(predict(state.clone(), 0.1, [0.3, f64::NAN, 0.3], 1.0, 0.0, &mut rng).is_err());
        assert!(predict(state.clone(), 0.1, [0.3; 3], f64::INFINITY, 0.0, &mut rng).is_err());
        assert!(predict(state, 0.1, [0.3; 3], 1.0, f64::NAN, &mut rng).is_err());
    }
}
