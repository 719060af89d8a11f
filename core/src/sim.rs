//! Simulation utilities and CSV data loading for landmark localization.
//!
//! This module provides:
//! - Serde record types for the per-tick inputs of a run (controls, observations, ground truth)
//! - Generic CSV import/export for those records and for per-tick results
//! - Synthetic data helpers ([`simulate_trajectory`], [`observe_landmarks`])
//! - The closed-loop driver [`run_localization`] and its accuracy [`LocalizationSummary`]
use crate::config::SimulationConfig;
use crate::error::{FilterError, Result, check_std_dev};
use crate::filter::ParticleFilter;
use crate::map::Map;
use crate::measurement::UpdateReport;
use crate::motion::predict_pose;
use crate::particle::{Particle, ParticleAveragingStrategy};
use crate::random::RandomSource;
use crate::{Observation, Pose, wrap_to_pi};

use nalgebra::{Isometry2, Point2, Vector2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Commanded motion applied between two ticks
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Velocity in m/s
    pub velocity: f64,
    /// Yaw rate in rad/s
    pub yaw_rate: f64,
}

/// One landmark observation in the vehicle frame, tagged with the tick it belongs to
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub tick: usize,
    pub x: f64,
    pub y: f64,
}

/// Ground truth rows share the `x,y,theta` layout of [`Pose`].
pub type GroundTruthRecord = Pose;

/// Reads every row of a headed CSV file into `T`.
///
/// # Example
///
/// ```no_run
/// use landmark_pf::sim::{ControlRecord, read_csv};
///
/// let controls: Vec<ControlRecord> = read_csv("./data/control.csv").expect("Failed to read controls");
/// println!("Read {} controls", controls.len());
/// ```
pub fn read_csv<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> std::result::Result<Vec<T>, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result?;
        records.push(record);
    }
    Ok(records)
}

/// Writes records to a CSV file with a header row derived from the field names.
pub fn write_csv<T: Serialize, P: AsRef<Path>>(records: &[T], path: P) -> io::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Split flat observation records into one list per tick.
///
/// Ticks without observations get an empty list. Records whose tick is outside `0..num_ticks` are
/// dropped with a warning.
pub fn group_observations(records: &[ObservationRecord], num_ticks: usize) -> Vec<Vec<Observation>> {
    let mut grouped = vec![Vec::new(); num_ticks];
    for record in records {
        match grouped.get_mut(record.tick) {
            Some(tick) => tick.push(Observation::new(record.x, record.y)),
            None => log::warn!(
                "dropping observation ({}, {}) for tick {} beyond the last tick {}",
                record.x,
                record.y,
                record.tick,
                num_ticks.saturating_sub(1)
            ),
        }
    }
    grouped
}

/// Inverse of [`group_observations`].
pub fn flatten_observations(observations: &[Vec<Observation>]) -> Vec<ObservationRecord> {
    observations
        .iter()
        .enumerate()
        .flat_map(|(tick, list)| {
            list.iter().map(move |o| ObservationRecord {
                tick,
                x: o.x,
                y: o.y,
            })
        })
        .collect()
}

/// Noise-free poses visited from `start` under `controls`.
///
/// The returned trajectory has one pose per tick: `controls.len() + 1` entries, with control `i` moving
/// the vehicle from tick `i` to tick `i + 1`.
pub fn simulate_trajectory(start: Pose, controls: &[ControlRecord], delta_t: f64) -> Vec<Pose> {
    let mut poses = Vec::with_capacity(controls.len() + 1);
    poses.push(start);
    let mut pose = start;
    for control in controls {
        pose = predict_pose(pose, delta_t, control.velocity, control.yaw_rate);
        pose.theta = wrap_to_pi(pose.theta);
        poses.push(pose);
    }
    poses
}

/// Synthesize vehicle-frame observations of every landmark within Euclidean `range` of `truth`.
///
/// Zero-mean Gaussian noise with `noise_std` (x, y) is added to each observation; zero noise gives the
/// exact relative positions. Observations follow map order and carry no association.
pub fn observe_landmarks<R: RandomSource + ?Sized>(
    truth: &Pose,
    map: &Map,
    range: f64,
    noise_std: [f64; 2],
    rng: &mut R,
) -> Result<Vec<Observation>> {
    check_std_dev("x", noise_std[0])?;
    check_std_dev("y", noise_std[1])?;
    if !(range.is_finite() && range >= 0.0) {
        return Err(FilterError::InvalidParameter {
            name: "sensor_range",
            value: range,
        });
    }
    let vehicle = Isometry2::new(Vector2::new(truth.x, truth.y), truth.theta);
    let mut observations = Vec::new();
    for landmark in map.landmarks() {
        if (landmark.x - truth.x).hypot(landmark.y - truth.y) > range {
            continue;
        }
        let local = vehicle.inverse_transform_point(&Point2::new(landmark.x, landmark.y));
        observations.push(Observation::new(
            rng.gaussian(local.x, noise_std[0]),
            rng.gaussian(local.y, noise_std[1]),
        ));
    }
    Ok(observations)
}

/// Signed per-axis difference between an estimate and the truth
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseError {
    pub x: f64,
    pub y: f64,
    /// Heading difference wrapped to [-pi, pi]
    pub theta: f64,
}
impl PoseError {
    pub fn translation(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

pub fn pose_error(estimate: &Pose, truth: &Pose) -> PoseError {
    PoseError {
        x: estimate.x - truth.x,
        y: estimate.y - truth.y,
        theta: wrap_to_pi(estimate.theta - truth.theta),
    }
}

/// Per-tick record of a localization run.
///
/// The error columns are empty when the run has no ground truth.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalizationResult {
    pub tick: usize,
    pub best_x: f64,
    pub best_y: f64,
    pub best_theta: f64,
    pub best_weight: f64,
    /// Weighted mean of the population
    pub mean_x: f64,
    pub mean_y: f64,
    pub mean_theta: f64,
    pub error_x: Option<f64>,
    pub error_y: Option<f64>,
    pub error_theta: Option<f64>,
    pub effective_sample_size: f64,
    pub empty_gates: usize,
    pub unassigned_observations: usize,
    /// Best particle's associated landmark ids, space separated
    pub associations: String,
    pub sense_x: String,
    pub sense_y: String,
}
impl LocalizationResult {
    fn new(
        tick: usize,
        best: &Particle,
        mean: Pose,
        error: Option<PoseError>,
        update: &UpdateReport,
        effective_sample_size: f64,
    ) -> Self {
        LocalizationResult {
            tick,
            best_x: best.pose.x,
            best_y: best.pose.y,
            best_theta: best.pose.theta,
            best_weight: best.weight,
            mean_x: mean.x,
            mean_y: mean.y,
            mean_theta: mean.theta,
            error_x: error.map(|e| e.x),
            error_y: error.map(|e| e.y),
            error_theta: error.map(|e| e.theta),
            effective_sample_size,
            empty_gates: update.empty_gates,
            unassigned_observations: update.unassigned_observations,
            associations: best.associations_string(),
            sense_x: best.sense_x_string(),
            sense_y: best.sense_y_string(),
        }
    }
    pub fn best_pose(&self) -> Pose {
        Pose::new(self.best_x, self.best_y, self.best_theta)
    }
    pub fn error(&self) -> Option<PoseError> {
        Some(PoseError {
            x: self.error_x?,
            y: self.error_y?,
            theta: self.error_theta?,
        })
    }
}

/// Run the filter over a recorded or synthetic dataset.
///
/// The run has one tick per entry of `observations`. Tick 0 initializes the filter around a GPS-like
/// fix: the first ground truth pose perturbed by `config.gps_std`, or `config.initial_pose` (origin if
/// unset) when `ground_truth` is empty. Every later tick `i` first predicts with `controls[i - 1]`.
/// Every tick then updates the weights and resamples; the result row is taken from the weighted
/// population before resampling.
///
/// # Errors
/// [`FilterError::LengthMismatch`] when `controls` or a non-empty `ground_truth` cannot cover every
/// tick, and any phase error of the filter.
pub fn run_localization(
    map: &Map,
    controls: &[ControlRecord],
    observations: &[Vec<Observation>],
    ground_truth: &[GroundTruthRecord],
    config: &SimulationConfig,
) -> Result<Vec<LocalizationResult>> {
    let num_ticks = observations.len();
    if controls.len() < num_ticks.saturating_sub(1) {
        return Err(FilterError::LengthMismatch {
            name: "controls",
            expected: num_ticks.saturating_sub(1),
            found: controls.len(),
        });
    }
    if !ground_truth.is_empty() && ground_truth.len() < num_ticks {
        return Err(FilterError::LengthMismatch {
            name: "ground truth",
            expected: num_ticks,
            found: ground_truth.len(),
        });
    }
    if map.is_empty() {
        return Err(FilterError::EmptyMap);
    }

    let mut pf = ParticleFilter::new(config.filter.clone());
    // separate stream so the simulated fix does not shift the filter's draws
    let mut gps = StdRng::seed_from_u64(config.filter.seed.wrapping_add(1));
    let mut results = Vec::with_capacity(num_ticks);
    for (tick, tick_observations) in observations.iter().enumerate() {
        if tick == 0 {
            let prior = match ground_truth.first() {
                Some(truth) => Pose::new(
                    gps.gaussian(truth.x, config.gps_std[0]),
                    gps.gaussian(truth.y, config.gps_std[1]),
                    gps.gaussian(truth.theta, config.gps_std[2]),
                ),
                None => config.initial_pose.unwrap_or_default(),
            };
            pf.init(prior, config.gps_std)?;
        } else {
            let control = controls[tick - 1];
            pf.predict(
                config.delta_t,
                config.process_std,
                control.velocity,
                control.yaw_rate,
            )?;
        }
        let update = pf.update_weights(
            config.sensor_range,
            config.landmark_std,
            tick_observations,
            map,
        )?;
        let effective_sample_size = pf.effective_sample_size();
        let best = pf.best_particle().cloned().ok_or(FilterError::NotInitialized)?;
        let (mean, _) = pf
            .estimate(ParticleAveragingStrategy::WeightedAverage)
            .ok_or(FilterError::NotInitialized)?;
        let error = ground_truth.get(tick).map(|truth| pose_error(&best.pose, truth));
        log::debug!(
            "tick {}: best {} weight {:.3e}, ess {:.1}, {} empty gates",
            tick,
            best.pose,
            best.weight,
            effective_sample_size,
            update.empty_gates
        );
        results.push(LocalizationResult::new(
            tick,
            &best,
            mean,
            error,
            &update,
            effective_sample_size,
        ));
        pf.resample()?;
    }
    if let Some(summary) = LocalizationSummary::evaluate(&results, config) {
        log::info!("{}", summary);
    }
    Ok(results)
}

/// Accuracy of the best particle over a run with ground truth
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalizationSummary {
    pub num_ticks: usize,
    /// Largest absolute error along either axis (m)
    pub max_translation_error: f64,
    /// Largest absolute heading error (rad)
    pub max_yaw_error: f64,
    /// Mean Euclidean position error (m)
    pub mean_translation_error: f64,
    /// First tick at which a threshold was exceeded
    pub first_failure: Option<usize>,
}
impl LocalizationSummary {
    /// Summarize the error columns of `results` against the thresholds of `config`.
    ///
    /// Returns `None` when no result carries an error (no ground truth).
    pub fn evaluate(results: &[LocalizationResult], config: &SimulationConfig) -> Option<Self> {
        let errors: Vec<(usize, PoseError)> = results
            .iter()
            .filter_map(|r| r.error().map(|e| (r.tick, e)))
            .collect();
        if errors.is_empty() {
            return None;
        }
        let mut summary = LocalizationSummary {
            num_ticks: errors.len(),
            max_translation_error: 0.0,
            max_yaw_error: 0.0,
            mean_translation_error: 0.0,
            first_failure: None,
        };
        for (tick, error) in &errors {
            let translation = error.x.abs().max(error.y.abs());
            let yaw = error.theta.abs();
            summary.max_translation_error = summary.max_translation_error.max(translation);
            summary.max_yaw_error = summary.max_yaw_error.max(yaw);
            summary.mean_translation_error += error.translation();
            if summary.first_failure.is_none()
                && (translation > config.max_translation_error || yaw > config.max_yaw_error)
            {
                summary.first_failure = Some(*tick);
            }
        }
        summary.mean_translation_error /= errors.len() as f64;
        Some(summary)
    }
    pub fn passed(&self) -> bool {
        self.first_failure.is_none()
    }
}
impl std::fmt::Display for LocalizationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ticks, max translation error {:.4} m, max yaw error {:.4} rad, mean position error {:.4} m: ",
            self.num_ticks, self.max_translation_error, self.max_yaw_error, self.mean_translation_error
        )?;
        match self.first_failure {
            None => write!(f, "passed"),
            Some(tick) => write!(f, "failed at tick {}", tick),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Landmark;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::FRAC_PI_2;
    use tempfile::NamedTempFile;

    fn map() -> Map {
        Map::new(vec![
            Landmark::new(1, 5.0, 0.0),
            Landmark::new(2, 0.0, 5.0),
            Landmark::new(3, 20.0, 20.0),
        ])
    }

    #[test]
    fn test_control_records_csv_roundtrip() {
        let controls = vec![
            ControlRecord {
                velocity: 4.5,
                yaw_rate: 0.0,
            },
            ControlRecord {
                velocity: 5.25,
                yaw_rate: -0.125,
            },
        ];
        let f = NamedTempFile::new().unwrap();
        write_csv(&controls, f.path()).unwrap();
        let read: Vec<ControlRecord> = read_csv(f.path()).unwrap();
        assert_eq!(read, controls);
    }

    #[test]
    fn test_read_csv_trims_whitespace() {
        let f = NamedTempFile::new().unwrap();
        std::fs::write(f.path(), "tick, x, y\n0, 1.5, -2.0\n2, 3.0, 4.0\n").unwrap();
        let records: Vec<ObservationRecord> = read_csv(f.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].tick, 2);
        assert_eq!(records[0].y, -2.0);
    }

    #[test]
    fn test_read_csv_invalid_path() {
        let result: std::result::Result<Vec<ControlRecord>, _> = read_csv("nonexistent.csv");
        assert!(result.is_err());
    }

    #[test]
    fn test_observations_group_by_tick() {
        let records = vec![
            ObservationRecord { tick: 0, x: 1.0, y: 0.0 },
            ObservationRecord { tick: 2, x: 2.0, y: 0.0 },
            ObservationRecord { tick: 0, x: 3.0, y: 0.0 },
            ObservationRecord { tick: 7, x: 4.0, y: 0.0 },
        ];
        let grouped = group_observations(&records, 3);
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[0].len(), 2);
        assert!(grouped[1].is_empty());
        assert_eq!(grouped[2][0].x, 2.0);
        assert!(grouped.iter().flatten().all(|o| !o.is_assigned()));
        let flat = flatten_observations(&grouped);
        assert_eq!(flat, vec![records[0], records[2], records[1]]);
    }

    #[test]
    fn test_trajectory_follows_controls() {
        let controls = vec![
            ControlRecord {
                velocity: 10.0,
                yaw_rate: 0.0,
            };
            5
        ];
        let poses = simulate_trajectory(Pose::new(1.0, 2.0, 0.0), &controls, 0.1);
        assert_eq!(poses.len(), 6);
        assert_approx_eq!(poses[5].x, 6.0, 1e-12);
        assert_approx_eq!(poses[5].y, 2.0, 1e-12);

        let turn = vec![ControlRecord {
            velocity: 1.0,
            yaw_rate: FRAC_PI_2,
        }];
        let poses = simulate_trajectory(Pose::default(), &turn, 1.0);
        assert_approx_eq!(poses[1].x, 2.0 / std::f64::consts::PI, 1e-12);
        assert_approx_eq!(poses[1].y, 2.0 / std::f64::consts::PI, 1e-12);
        assert_approx_eq!(poses[1].theta, FRAC_PI_2, 1e-12);
    }

    #[test]
    fn test_observe_landmarks_in_vehicle_frame() {
        let mut rng = StdRng::seed_from_u64(0);
        let truth = Pose::new(0.0, 0.0, FRAC_PI_2);
        let observations = observe_landmarks(&truth, &map(), 10.0, [0.0, 0.0], &mut rng).unwrap();
        // landmark 3 is out of Euclidean range
        assert_eq!(observations.len(), 2);
        // (5, 0) is to the right of a vehicle facing +y
        assert_approx_eq!(observations[0].x, 0.0, 1e-12);
        assert_approx_eq!(observations[0].y, -5.0, 1e-12);
        assert_approx_eq!(observations[1].x, 5.0, 1e-12);
        assert_approx_eq!(observations[1].y, 0.0, 1e-12);
    }

    #[test]
    fn test_observe_landmarks_uses_euclidean_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let corner = Map::new(vec![Landmark::new(1, 4.0, 4.0)]);
        // inside the square gate of half-width 5 but sqrt(32) away
        let observations = observe_landmarks(&Pose::default(), &corner, 5.0, [0.0, 0.0], &mut rng).unwrap();
        assert!(observations.is_empty());
        assert!(observe_landmarks(&Pose::default(), &corner, 5.0, [-1.0, 0.0], &mut rng).is_err());
    }

    #[test]
    fn test_pose_error_wraps_heading() {
        let error = pose_error(&Pose::new(1.0, 2.0, 3.1), &Pose::new(0.5, 2.5, -3.1));
        assert_approx_eq!(error.x, 0.5, 1e-12);
        assert_approx_eq!(error.y, -0.5, 1e-12);
        assert_approx_eq!(error.theta, 6.2 - 2.0 * std::f64::consts::PI, 1e-12);
        assert_approx_eq!(error.translation(), 0.5f64.hypot(0.5), 1e-12);
    }

    #[test]
    fn test_length_mismatches_are_rejected() {
        let config = SimulationConfig::default();
        let observations = vec![Vec::new(); 3];
        let controls = vec![ControlRecord::default(); 1];
        assert_eq!(
            run_localization(&map(), &controls, &observations, &[], &config),
            Err(FilterError::LengthMismatch {
                name: "controls",
                expected: 2,
                found: 1
            })
        );
        let controls = vec![ControlRecord::default(); 2];
        assert!(matches!(
            run_localization(&map(), &controls, &observations, &[Pose::default()], &config),
            Err(FilterError::LengthMismatch { name: "ground truth", .. })
        ));
        assert_eq!(
            run_localization(&Map::default(), &controls, &observations, &[], &config),
            Err(FilterError::EmptyMap)
        );
    }

    #[test]
    fn test_run_without_ground_truth_uses_initial_pose() {
        let config = SimulationConfig {
            initial_pose: Some(Pose::new(1.0, 1.0, 0.0)),
            gps_std: [0.0, 0.0, 0.0],
            filter: crate::config::FilterConfig {
                num_particles: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        let observations = vec![vec![Observation::new(4.0, -1.0)]];
        let results = run_localization(&map(), &[], &observations, &[], &config).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].best_pose(), Pose::new(1.0, 1.0, 0.0));
        assert!(results[0].error().is_none());
        assert_eq!(results[0].associations, "1");
        assert!(LocalizationSummary::evaluate(&results, &config).is_none());
    }

    #[test]
    fn test_results_csv_roundtrip() {
        let results = vec![
            LocalizationResult {
                tick: 0,
                best_x: 1.0,
                best_weight: 0.5,
                error_x: Some(0.25),
                error_y: Some(-0.5),
                error_theta: Some(0.01),
                associations: "1 2".to_string(),
                sense_x: "4.5 0.25".to_string(),
                sense_y: "0 5".to_string(),
                ..Default::default()
            },
            LocalizationResult {
                tick: 1,
                ..Default::default()
            },
        ];
        let f = NamedTempFile::new().unwrap();
        write_csv(&results, f.path()).unwrap();
        let read: Vec<LocalizationResult> = read_csv(f.path()).unwrap();
        assert_eq!(read, results);
        assert!(read[1].error().is_none());
    }

    #[test]
    fn test_summary_flags_first_threshold_violation() {
        let config = SimulationConfig::default();
        let row = |tick, x, theta| LocalizationResult {
            tick,
            error_x: Some(x),
            error_y: Some(0.0),
            error_theta: Some(theta),
            ..Default::default()
        };
        let results = vec![row(0, 0.5, 0.01), row(1, -0.9, -0.02), row(2, 0.1, 0.08), row(3, 1.5, 0.0)];
        let summary = LocalizationSummary::evaluate(&results, &config).unwrap();
        assert_eq!(summary.num_ticks, 4);
        assert_eq!(summary.first_failure, Some(2));
        assert!(!summary.passed());
        assert_approx_eq!(summary.max_translation_error, 1.5, 1e-12);
        assert_approx_eq!(summary.max_yaw_error, 0.08, 1e-12);
        assert_approx_eq!(summary.mean_translation_error, 0.75, 1e-12);

        let summary = LocalizationSummary::evaluate(&results[..2], &config).unwrap();
        assert!(summary.passed());
        assert!(summary.to_string().ends_with("passed"));
    }
}
