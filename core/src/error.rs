//! Error types for the particle filter

use thiserror::Error;

/// Errors surfaced at the boundary of a filter phase
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// A standard deviation was negative, non-finite, or zero where a strictly positive value is needed
    #[error("invalid standard deviation for {name}: {value}")]
    InvalidStdDev { name: &'static str, value: f64 },

    /// A scalar input (time step, velocity, range, ...) was outside its valid domain
    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("particle count must be positive, got {0}")]
    InvalidParticleCount(usize),

    #[error("filter has not been initialized")]
    NotInitialized,

    /// The map holds no landmarks, so no observation can ever be associated
    #[error("map contains no landmarks")]
    EmptyMap,

    /// Every particle weight collapsed to zero and the zero-weight policy forbids a fallback
    #[error("all {num_particles} particle weights are zero")]
    DegenerateWeights { num_particles: usize },

    /// A per-tick input sequence is shorter than the run it has to cover
    #[error("{name} has {found} entries, expected at least {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, FilterError>;

/// Check that a standard deviation is finite and non-negative.
pub(crate) fn check_std_dev(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FilterError::InvalidStdDev { name, value })
    }
}

/// Check that a standard deviation is finite and strictly positive.
pub(crate) fn check_positive_std_dev(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FilterError::InvalidStdDev { name, value })
    }
}

pub(crate) fn check_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FilterError::InvalidParameter { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_std_dev_is_accepted_for_sampling() {
        assert!(check_std_dev("x", 0.0).is_ok());
        assert!(check_std_dev("x", 0.3).is_ok());
    }

    #[test]
    fn test_invalid_std_devs_are_rejected() {
        assert_eq!(
            check_std_dev("theta", -0.1),
            Err(FilterError::InvalidStdDev {
                name: "theta",
                value: -0.1
            })
        );
        assert!(check_std_dev("x", f64::INFINITY).is_err());
        assert!(check_std_dev("x", f64::NAN).is_err());
        assert!(check_positive_std_dev("x", 0.0).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = FilterError::DegenerateWeights { num_particles: 3 };
        assert_eq!(err.to_string(), "all 3 particle weights are zero");
        assert_eq!(
            FilterError::NotInitialized.to_string(),
            "filter has not been initialized"
        );
    }
}
