//! Common utility functions for the simulation binary.
//!
//! This module contains:
//! - Logger initialization
//! - Path validation and dataset discovery

use std::error::Error;
use std::path::{Path, PathBuf};

/// File name of the landmark map inside a dataset directory
pub const MAP_FILE: &str = "map.csv";
/// File name of the per-tick controls inside a dataset directory
pub const CONTROL_FILE: &str = "control.csv";
/// File name of the tick-tagged observations inside a dataset directory
pub const OBSERVATION_FILE: &str = "observations.csv";
/// Optional ground truth poses
pub const GROUND_TRUTH_FILE: &str = "gt.csv";
/// Per-tick results written by `run`
pub const RESULT_FILE: &str = "results.csv";

/// Initialize the logger with the specified configuration.
///
/// # Arguments
/// * `log_level` - Log level string (off, error, warn, info, debug, trace)
/// * `log_file` - Optional path to log file (logs to stderr if None)
///
/// # Errors
/// Returns an error if the log file cannot be opened or logger initialization fails.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

/// Validate that the input path exists and is a directory.
pub fn validate_input_path(input: &Path) -> Result<(), Box<dyn Error>> {
    if !input.exists() {
        return Err(format!("Input path '{}' does not exist.", input.display()).into());
    }
    if !input.is_dir() {
        return Err(format!("Input path '{}' is not a dataset directory.", input.display()).into());
    }
    Ok(())
}

/// Create the output directory if it does not exist yet.
pub fn validate_output_path(output: &Path) -> Result<(), Box<dyn Error>> {
    if !output.exists() {
        std::fs::create_dir_all(output)?;
    }
    Ok(())
}

/// Files making up one localization dataset
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetPaths {
    /// Dataset directory name, used to name per-dataset outputs
    pub name: String,
    pub map: PathBuf,
    pub control: PathBuf,
    pub observations: PathBuf,
    /// `None` when the dataset has no ground truth file
    pub ground_truth: Option<PathBuf>,
}

impl DatasetPaths {
    /// Resolve the dataset files inside `dir`.
    ///
    /// # Errors
    /// Returns an error if the map, control, or observation file is missing.
    pub fn from_dir(dir: &Path) -> Result<Self, Box<dyn Error>> {
        let required = |file: &str| -> Result<PathBuf, Box<dyn Error>> {
            let path = dir.join(file);
            if path.is_file() {
                Ok(path)
            } else {
                Err(format!("Dataset '{}' has no {}.", dir.display(), file).into())
            }
        };
        let ground_truth = dir.join(GROUND_TRUTH_FILE);
        Ok(DatasetPaths {
            name: dir
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("dataset")
                .to_string(),
            map: required(MAP_FILE)?,
            control: required(CONTROL_FILE)?,
            observations: required(OBSERVATION_FILE)?,
            ground_truth: ground_truth.is_file().then_some(ground_truth),
        })
    }
}

fn is_dataset_dir(path: &Path) -> bool {
    path.is_dir() && path.join(MAP_FILE).is_file()
}

/// Get every dataset under `input`.
///
/// `input` is either a dataset directory itself or a directory whose subdirectories are datasets.
///
/// # Returns
/// Datasets sorted by directory name.
///
/// # Errors
/// Returns an error if no dataset is found or a dataset is missing a required file.
pub fn find_datasets(input: &Path) -> Result<Vec<DatasetPaths>, Box<dyn Error>> {
    if is_dataset_dir(input) {
        return Ok(vec![DatasetPaths::from_dir(input)?]);
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_dataset_dir(path))
        .collect();
    if dirs.is_empty() {
        return Err(format!(
            "No dataset (directory containing {}) found in '{}'.",
            MAP_FILE,
            input.display()
        )
        .into());
    }
    dirs.sort();
    dirs.iter().map(|dir| DatasetPaths::from_dir(dir)).collect()
}
