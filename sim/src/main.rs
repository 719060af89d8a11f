//! PF SIM: A simulation and analysis tool for landmark-based particle filter localization.
//!
//! The program has three commands:
//!
//! - `run`: Localize a vehicle over one or more recorded datasets. A dataset is a directory holding
//!   `map.csv` (`id,x,y`), `control.csv` (`velocity,yaw_rate`, one row per tick), `observations.csv`
//!   (`tick,x,y` in the vehicle frame) and optionally `gt.csv` (`x,y,theta`). Per-tick results are
//!   written to `results.csv`.
//! - `generate`: Write a synthetic dataset (landmark grid, constant-turn trajectory, noisy
//!   observations) in the same layout.
//! - `config`: Write a template configuration file.
//!
//! Filter and simulation parameters come from the defaults, overridden by a configuration file
//! (`--config`, TOML/JSON/YAML), overridden in turn by command-line flags.

mod common;

use clap::{Args, Parser, Subcommand, ValueEnum};
use common::{
    CONTROL_FILE, DatasetPaths, GROUND_TRUTH_FILE, MAP_FILE, OBSERVATION_FILE, RESULT_FILE,
    find_datasets, init_logger, validate_input_path, validate_output_path,
};
use landmark_pf::config::SimulationConfig;
use landmark_pf::resampling::ResamplingStrategy;
use landmark_pf::sim::{
    ControlRecord, GroundTruthRecord, LocalizationSummary, ObservationRecord, flatten_observations,
    group_observations, observe_landmarks, read_csv, run_localization, simulate_trajectory,
    write_csv,
};
use landmark_pf::{Landmark, Map, Pose};
use log::{error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::error::Error;
use std::path::{Path, PathBuf};

const LONG_ABOUT: &str =
    "PF SIM: A simulation and analysis tool for landmark-based particle filter localization.

A vehicle with a known motion command and a range-limited landmark sensor is localized against a
static landmark map with a particle filter (CTRV motion model, nearest-neighbor association,
Gaussian landmark likelihood, resampling wheel).

You can configure runs either by:
  1. Loading parameters from a configuration file (TOML/JSON/YAML) with --config
  2. Specifying parameters via command-line flags, which take precedence over the file";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "A simulation and analysis tool for landmark-based particle filter localization.", long_about = LONG_ABOUT)]
struct Cli {
    /// Configuration file (TOML/JSON/YAML) providing the simulation and filter parameters
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Process multiple datasets in parallel
    #[arg(long, global = true)]
    parallel: bool,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(
        name = "run",
        about = "Run the particle filter over datasets",
        long_about = "Run the particle filter over a dataset directory, or over every dataset directory found directly inside the input directory. Results are written to <output>/results.csv for a single dataset and to <output>/<dataset>/results.csv otherwise. When ground truth is available, the accuracy of the best particle is checked against the configured thresholds."
    )]
    Run(RunArgs),
    #[command(
        name = "generate",
        about = "Generate a synthetic dataset",
        long_about = "Generate a synthetic dataset: a regular landmark grid covering a constant velocity, constant turn rate trajectory, with noisy landmark observations within the sensor range of each ground truth pose."
    )]
    Generate(GenerateArgs),
    #[command(name = "config", about = "Write a template configuration file")]
    Config(ConfigArgs),
}

/// Resampling strategy selectable from the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Resampler {
    Wheel,
    Systematic,
    Multinomial,
}
impl From<Resampler> for ResamplingStrategy {
    fn from(resampler: Resampler) -> Self {
        match resampler {
            Resampler::Wheel => ResamplingStrategy::Wheel,
            Resampler::Systematic => ResamplingStrategy::Systematic,
            Resampler::Multinomial => ResamplingStrategy::Multinomial,
        }
    }
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Dataset directory, or a directory containing dataset directories
    #[arg(short, long, value_parser)]
    input: PathBuf,

    /// Output directory
    #[arg(short, long, value_parser)]
    output: PathBuf,

    /// Number of particles
    #[arg(short = 'n', long)]
    num_particles: Option<usize>,

    /// Seed of the filter's random source
    #[arg(long)]
    seed: Option<u64>,

    /// Resampling strategy
    #[arg(long, value_enum)]
    resampling: Option<Resampler>,
}

#[derive(Args, Clone, Debug)]
struct GenerateArgs {
    /// Output dataset directory
    #[arg(short, long, value_parser)]
    output: PathBuf,

    /// Number of ticks
    #[arg(long, default_value_t = 200)]
    ticks: usize,

    /// Commanded velocity (m/s)
    #[arg(long, default_value_t = 5.0)]
    velocity: f64,

    /// Commanded yaw rate (rad/s)
    #[arg(long, default_value_t = 0.1)]
    yaw_rate: f64,

    /// Distance between neighboring landmarks of the grid (m)
    #[arg(long, default_value_t = 10.0)]
    spacing: f64,

    /// Seed for the observation noise
    #[arg(long, default_value_t = 1234)]
    seed: u64,
}

#[derive(Args, Clone, Debug)]
struct ConfigArgs {
    /// Output configuration file; the extension selects the format (.toml, .json, .yaml, .yml)
    #[arg(short, long, value_parser)]
    output: PathBuf,
}

/// Load the configuration file if given, defaults otherwise.
fn load_config(path: Option<&PathBuf>) -> Result<SimulationConfig, Box<dyn Error>> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            Ok(SimulationConfig::from_file(path)?)
        }
        None => Ok(SimulationConfig::default()),
    }
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_overrides(mut config: SimulationConfig, args: &RunArgs) -> SimulationConfig {
    if let Some(num_particles) = args.num_particles {
        config.filter.num_particles = num_particles;
    }
    if let Some(seed) = args.seed {
        config.filter.seed = seed;
    }
    if let Some(resampling) = args.resampling {
        config.filter.resampling = resampling.into();
    }
    config
}

/// Load one dataset, run the filter over it and write the results.
fn process_dataset(
    dataset: &DatasetPaths,
    output_dir: &Path,
    config: &SimulationConfig,
) -> Result<Option<LocalizationSummary>, Box<dyn Error>> {
    info!("Processing dataset: {}", dataset.name);
    let map = Map::from_csv(&dataset.map)?;
    let controls: Vec<ControlRecord> = read_csv(&dataset.control)?;
    let records: Vec<ObservationRecord> = read_csv(&dataset.observations)?;
    let ground_truth: Vec<GroundTruthRecord> = match &dataset.ground_truth {
        Some(path) => read_csv(path)?,
        None => Vec::new(),
    };
    let observations = group_observations(&records, controls.len());
    info!(
        "Read {} landmarks, {} ticks, {} observations, {} ground truth poses",
        map.len(),
        controls.len(),
        records.len(),
        ground_truth.len()
    );

    let results = run_localization(&map, &controls, &observations, &ground_truth, config)?;

    validate_output_path(output_dir)?;
    let output_file = output_dir.join(RESULT_FILE);
    write_csv(&results, &output_file)?;
    info!("Results written to {}", output_file.display());
    Ok(LocalizationSummary::evaluate(&results, config))
}

/// Execute the `run` command
fn run_datasets(args: &RunArgs, config: &SimulationConfig, parallel: bool) -> Result<(), Box<dyn Error>> {
    validate_input_path(&args.input)?;
    validate_output_path(&args.output)?;

    let datasets = find_datasets(&args.input)?;
    let is_multiple = datasets.len() > 1;
    if is_multiple {
        info!("Processing {} datasets from directory", datasets.len());
    }
    let output_dir = |dataset: &DatasetPaths| {
        if is_multiple {
            args.output.join(&dataset.name)
        } else {
            args.output.clone()
        }
    };
    // boxed errors are not Send, so failures cross the thread boundary as strings
    let run_one = |dataset: &DatasetPaths| {
        process_dataset(dataset, &output_dir(dataset), config)
            .map_err(|e| format!("{}: {}", dataset.name, e))
    };
    let outcomes: Vec<Result<Option<LocalizationSummary>, String>> = if parallel && is_multiple {
        datasets.par_iter().map(run_one).collect()
    } else {
        datasets.iter().map(run_one).collect()
    };

    let mut failures = 0;
    for (dataset, outcome) in datasets.iter().zip(&outcomes) {
        match outcome {
            Ok(Some(summary)) if summary.passed() => info!("{}: {}", dataset.name, summary),
            Ok(Some(summary)) => warn!("{}: {}", dataset.name, summary),
            Ok(None) => info!("{}: no ground truth, accuracy not checked", dataset.name),
            Err(e) => {
                error!("{}", e);
                failures += 1;
            }
        }
    }
    if failures > 0 {
        return Err(format!("{} of {} datasets failed", failures, datasets.len()).into());
    }
    Ok(())
}

/// Landmarks every `spacing` meters over the bounding box of `poses`, padded by `padding`
fn landmark_grid(poses: &[Pose], spacing: f64, padding: f64) -> Map {
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for pose in poses {
        min_x = min_x.min(pose.x);
        max_x = max_x.max(pose.x);
        min_y = min_y.min(pose.y);
        max_y = max_y.max(pose.y);
    }
    let cells = |min: f64, max: f64| {
        let start = ((min - padding) / spacing).floor() as i64;
        let end = ((max + padding) / spacing).ceil() as i64;
        start..=end
    };
    let mut landmarks = Vec::new();
    for iy in cells(min_y, max_y) {
        for ix in cells(min_x, max_x) {
            let id = landmarks.len() as i32 + 1;
            landmarks.push(Landmark::new(id, ix as f64 * spacing, iy as f64 * spacing));
        }
    }
    Map::new(landmarks)
}

/// Execute the `generate` command
fn generate_dataset(args: &GenerateArgs, config: &SimulationConfig) -> Result<(), Box<dyn Error>> {
    if args.ticks == 0 {
        return Err("A dataset needs at least one tick.".into());
    }
    if !(args.spacing.is_finite() && args.spacing > 0.0) {
        return Err(format!("Landmark spacing must be positive, got {}.", args.spacing).into());
    }
    validate_output_path(&args.output)?;

    let controls = vec![
        ControlRecord {
            velocity: args.velocity,
            yaw_rate: args.yaw_rate,
        };
        args.ticks
    ];
    // the last control is never applied, the trajectory has one pose per tick
    let ground_truth = simulate_trajectory(
        config.initial_pose.unwrap_or_default(),
        &controls[..args.ticks - 1],
        config.delta_t,
    );
    let map = landmark_grid(&ground_truth, args.spacing, config.sensor_range);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let observations = ground_truth
        .iter()
        .map(|truth| observe_landmarks(truth, &map, config.sensor_range, config.landmark_std, &mut rng))
        .collect::<Result<Vec<_>, _>>()?;

    map.to_csv(args.output.join(MAP_FILE))?;
    write_csv(&controls, args.output.join(CONTROL_FILE))?;
    write_csv(&ground_truth, args.output.join(GROUND_TRUTH_FILE))?;
    write_csv(&flatten_observations(&observations), args.output.join(OBSERVATION_FILE))?;
    info!(
        "Generated {} ticks with {} landmarks in {}",
        args.ticks,
        map.len(),
        args.output.display()
    );
    Ok(())
}

/// Execute the `config` command
fn write_config(args: &ConfigArgs, config: &SimulationConfig) -> Result<(), Box<dyn Error>> {
    config.to_file(&args.output)?;
    info!("Configuration written to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;
    let config = load_config(cli.config.as_ref())?;

    match &cli.command {
        Command::Run(args) => {
            let config = apply_overrides(config, args);
            info!(
                "Running particle filter with {} particles (seed {}) on {}",
                config.filter.num_particles,
                config.filter.seed,
                args.input.display()
            );
            run_datasets(args, &config, cli.parallel)
        }
        Command::Generate(args) => generate_dataset(args, &config),
        Command::Config(args) => write_config(args, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landmark_pf::sim::LocalizationResult;
    use tempfile::tempdir;

    fn generate_args(output: PathBuf, ticks: usize) -> GenerateArgs {
        GenerateArgs {
            output,
            ticks,
            velocity: 5.0,
            yaw_rate: 0.1,
            spacing: 10.0,
            seed: 1234,
        }
    }

    fn run_args(input: PathBuf, output: PathBuf) -> RunArgs {
        RunArgs {
            input,
            output,
            num_particles: None,
            seed: None,
            resampling: None,
        }
    }

    #[test]
    fn test_cli_parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "pf-sim",
            "run",
            "-i",
            "data",
            "-o",
            "out",
            "-n",
            "250",
            "--resampling",
            "systematic",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        let Command::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        let config = apply_overrides(SimulationConfig::default(), &args);
        assert_eq!(config.filter.num_particles, 250);
        assert_eq!(config.filter.seed, 42);
        assert_eq!(config.filter.resampling, ResamplingStrategy::Systematic);
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["pf-sim"]).is_err());
        assert!(Cli::try_parse_from(["pf-sim", "run", "-i", "data"]).is_err());
    }

    #[test]
    fn test_landmark_grid_covers_trajectory() {
        let poses = vec![Pose::new(0.0, 0.0, 0.0), Pose::new(12.0, 3.0, 0.0)];
        let map = landmark_grid(&poses, 10.0, 10.0);
        // x from -10 to 30, y from -10 to 20
        assert_eq!(map.len(), 5 * 4);
        assert_eq!(map.landmarks()[0], Landmark::new(1, -10.0, -10.0));
        assert_eq!(map.landmarks()[19], Landmark::new(20, 30.0, 20.0));
    }

    #[test]
    fn test_generate_then_run() {
        let dir = tempdir().unwrap();
        let dataset = dir.path().join("circle");
        let output = dir.path().join("out");
        let config = SimulationConfig::default();
        generate_dataset(&generate_args(dataset.clone(), 20), &config).unwrap();
        for file in [MAP_FILE, CONTROL_FILE, OBSERVATION_FILE, GROUND_TRUTH_FILE] {
            assert!(dataset.join(file).is_file(), "missing {}", file);
        }

        run_datasets(&run_args(dataset, output.clone()), &config, false).unwrap();
        let results: Vec<LocalizationResult> = read_csv(output.join(RESULT_FILE)).unwrap();
        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|r| r.error().is_some()));
    }

    #[test]
    fn test_run_multiple_datasets_in_parallel() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("datasets");
        let output = dir.path().join("out");
        let config = SimulationConfig::default();
        generate_dataset(&generate_args(input.join("a"), 5), &config).unwrap();
        generate_dataset(&generate_args(input.join("b"), 8), &config).unwrap();
        std::fs::remove_file(input.join("b").join(GROUND_TRUTH_FILE)).unwrap();

        run_datasets(&run_args(input, output.clone()), &config, true).unwrap();
        let a: Vec<LocalizationResult> = read_csv(output.join("a").join(RESULT_FILE)).unwrap();
        let b: Vec<LocalizationResult> = read_csv(output.join("b").join(RESULT_FILE)).unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(b.len(), 8);
        assert!(b.iter().all(|r| r.error().is_none()));
    }

    #[test]
    fn test_generate_rejects_empty_dataset() {
        let dir = tempdir().unwrap();
        let config = SimulationConfig::default();
        assert!(generate_dataset(&generate_args(dir.path().join("x"), 0), &config).is_err());
    }

    #[test]
    fn test_write_config_template() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pf.toml");
        let config = SimulationConfig::default();
        write_config(&ConfigArgs { output: path.clone() }, &config).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), config);
    }
}
