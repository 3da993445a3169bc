//! Bracketing bisection root finder.

use thiserror::Error;

/// Errors returned by [`bisect`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BisectError {
    #[error("Invalid interval [{lower}, {upper}]")]
    InvalidInterval { lower: f64, upper: f64 },
    #[error("Function has the same sign at both ends of [{lower}, {upper}]")]
    NoSignChange { lower: f64, upper: f64 },
    #[error("Bisection did not converge after {iterations} iterations (last estimate {estimate})")]
    NotConverged { estimate: f64, iterations: usize },
}

/// Stopping criteria for [`bisect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BisectConfig {
    /// Accept a point once `|f(x)|` is at most this value.
    pub tolerance: f64,
    /// Give up after this many halvings.
    pub max_iterations: usize,
}

impl Default for BisectConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            max_iterations: 200,
        }
    }
}

/// Finds `x` in `[lower, upper]` with `|f(x)| <= tolerance`.
///
/// The endpoints are tested first. Otherwise `f` must change sign across the
/// interval, and the bracket is halved until the midpoint satisfies the
/// tolerance or the iteration budget runs out.
///
/// # Examples
///
/// ```rust
/// use survey_math::{bisect, BisectConfig};
///
/// let cfg = BisectConfig { tolerance: 1e-9, max_iterations: 200 };
/// let root = bisect(|x| x * x - 2.0, 0.0, 2.0, cfg).unwrap();
/// assert!((root - 2.0_f64.sqrt()).abs() < 1e-8);
/// ```
pub fn bisect<F>(f: F, lower: f64, upper: f64, config: BisectConfig) -> Result<f64, BisectError>
where
    F: Fn(f64) -> f64,
{
    if !lower.is_finite() || !upper.is_finite() || lower > upper {
        return Err(BisectError::InvalidInterval { lower, upper });
    }

    let mut lo = lower;
    let mut hi = upper;
    let mut f_lo = f(lo);
    let f_hi = f(hi);

    if f_lo.abs() <= config.tolerance {
        return Ok(lo);
    }
    if f_hi.abs() <= config.tolerance {
        return Ok(hi);
    }
    if f_lo.signum() == f_hi.signum() || f_lo.is_nan() || f_hi.is_nan() {
        return Err(BisectError::NoSignChange { lower, upper });
    }

    let mut mid = 0.5 * (lo + hi);
    for _ in 0..config.max_iterations {
        mid = 0.5 * (lo + hi);
        let f_mid = f(mid);

        if f_mid.abs() <= config.tolerance {
            return Ok(mid);
        }

        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(BisectError::NotConverged {
        estimate: mid,
        iterations: config.max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_root() {
        let cfg = BisectConfig {
            tolerance: 1e-10,
            max_iterations: 200,
        };
        let root = bisect(|x| 3.0 * x - 1.0, -5.0, 5.0, cfg).unwrap();
        assert_relative_eq!(root, 1.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_endpoint_root_returned_directly() {
        let cfg = BisectConfig::default();
        assert_eq!(bisect(|x| x, 0.0, 4.0, cfg), Ok(0.0));
        assert_eq!(bisect(|x| x - 4.0, 0.0, 4.0, cfg), Ok(4.0));
    }

    #[test]
    fn test_no_sign_change() {
        let result = bisect(|x| x * x + 1.0, -1.0, 1.0, BisectConfig::default());
        assert!(matches!(result, Err(BisectError::NoSignChange { .. })));
    }

    #[test]
    fn test_invalid_interval() {
        let result = bisect(|x| x, 2.0, 1.0, BisectConfig::default());
        assert!(matches!(result, Err(BisectError::InvalidInterval { .. })));
    }

    #[test]
    fn test_step_function_never_converges() {
        // Jumps from -1 to +1 at x = 0.3 and never gets within tolerance
        let step = |x: f64| if x < 0.3 { -1.0 } else { 1.0 };
        let cfg = BisectConfig {
            tolerance: 0.01,
            max_iterations: 60,
        };
        match bisect(step, 0.0, 1.0, cfg) {
            Err(BisectError::NotConverged {
                estimate,
                iterations,
            }) => {
                assert_eq!(iterations, 60);
                assert_relative_eq!(estimate, 0.3, epsilon = 1e-9);
            }
            other => panic!("expected NotConverged, got {other:?}"),
        }
    }
}
