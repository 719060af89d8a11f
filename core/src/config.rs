//! Filter and simulation configuration.
//!
//! Both structures are plain serde types. [`SimulationConfig`] can be written to and read from JSON,
//! YAML, or TOML, either explicitly or by dispatching on the file extension.
//!
//! ## Example
//!
//! ```
//! use landmark_pf::config::{FilterConfig, SimulationConfig};
//! use landmark_pf::resampling::{ResamplingStrategy, ZeroWeightPolicy};
//!
//! let cfg = SimulationConfig {
//!     sensor_range: 30.0,
//!     filter: FilterConfig {
//!         num_particles: 500,
//!         resampling: ResamplingStrategy::Systematic,
//!         zero_weight_policy: ZeroWeightPolicy::Fail,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! assert_eq!(cfg.delta_t, 0.1);
//! ```
use crate::Pose;
use crate::resampling::{ResamplingStrategy, ZeroWeightPolicy};

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Default seed value for reproducible runs
fn default_seed() -> u64 {
    42
}

/// Settings owned by [`crate::filter::ParticleFilter`] for its whole lifetime
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of particles, fixed once the filter is initialized
    pub num_particles: usize,
    /// Seed for the filter's single random source
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub resampling: ResamplingStrategy,
    pub zero_weight_policy: ZeroWeightPolicy,
    /// Store landmark associations and map-frame observations on each particle during the update
    pub record_associations: bool,
    /// Carry association diagnostics over to resampled copies
    pub retain_associations: bool,
}
impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: 100,
            seed: default_seed(),
            resampling: ResamplingStrategy::Wheel,
            zero_weight_policy: ZeroWeightPolicy::Uniform,
            record_associations: true,
            retain_associations: false,
        }
    }
}

/// Parameters of a closed-loop localization run (see [`crate::sim::run_localization`])
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time between ticks (s)
    pub delta_t: f64,
    /// Half-width of the square landmark gate (m)
    pub sensor_range: f64,
    /// Standard deviations (x m, y m, theta rad) of the GPS-like fix used to initialize the filter
    pub gps_std: [f64; 3],
    /// Process noise standard deviations (x m, y m, theta rad)
    pub process_std: [f64; 3],
    /// Landmark measurement noise standard deviations (x m, y m)
    pub landmark_std: [f64; 2],
    /// Largest acceptable translation error of the best particle (m)
    pub max_translation_error: f64,
    /// Largest acceptable heading error of the best particle (rad)
    pub max_yaw_error: f64,
    /// Prior used when no ground truth is available for the initial fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_pose: Option<Pose>,
    pub filter: FilterConfig,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            delta_t: 0.1,
            sensor_range: 50.0,
            gps_std: [0.3, 0.3, 0.01],
            process_std: [0.3, 0.3, 0.01],
            landmark_std: [0.3, 0.3],
            max_translation_error: 1.0,
            max_yaw_error: 0.05,
            initial_pose: None,
            filter: FilterConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }
    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }
    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }
    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }
    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_cfg() -> SimulationConfig {
        SimulationConfig {
            delta_t: 0.05,
            sensor_range: 25.0,
            initial_pose: Some(Pose::new(6.3, 1.9, 0.0)),
            filter: FilterConfig {
                num_particles: 250,
                seed: 7,
                resampling: ResamplingStrategy::Systematic,
                zero_weight_policy: ZeroWeightPolicy::Fail,
                record_associations: false,
                retain_associations: true,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("json");
        cfg.to_json(&path).unwrap();
        assert_eq!(SimulationConfig::from_json(&path).unwrap(), cfg);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("yaml");
        cfg.to_yaml(&path).unwrap();
        assert_eq!(SimulationConfig::from_yaml(&path).unwrap(), cfg);
    }

    #[test]
    fn test_toml_roundtrip() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("toml");
        cfg.to_toml(&path).unwrap();
        assert_eq!(SimulationConfig::from_toml(&path).unwrap(), cfg);
    }

    #[test]
    fn test_default_config_roundtrip() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.filter.seed, 42);
        assert_eq!(cfg.filter.resampling, ResamplingStrategy::Wheel);
        assert_eq!(cfg.filter.zero_weight_policy, ZeroWeightPolicy::Uniform);
        for ext in ["json", "yaml", "yml", "toml"] {
            let f = NamedTempFile::new().unwrap();
            let path = f.path().with_extension(ext);
            cfg.to_file(&path).unwrap();
            assert_eq!(SimulationConfig::from_file(&path).unwrap(), cfg);
        }
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let cfg: SimulationConfig = toml::from_str("sensor_range = 12.5\n[filter]\nnum_particles = 3\n").unwrap();
        assert_eq!(cfg.sensor_range, 12.5);
        assert_eq!(cfg.delta_t, 0.1);
        assert_eq!(cfg.filter.num_particles, 3);
        assert_eq!(cfg.filter.seed, 42);
        assert!(cfg.filter.record_associations);
    }

    #[test]
    fn test_unsupported_extension_error() {
        let cfg = sample_cfg();
        let f = NamedTempFile::new().unwrap();
        let path = f.path().with_extension("txt");
        let result = cfg.to_file(&path);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidInput);
        let result = SimulationConfig::from_file(&path);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidInput);
    }
}
