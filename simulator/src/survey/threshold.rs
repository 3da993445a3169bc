//! Days on which a light curve crosses the survey's limiting magnitude.
//!
//! Magnitudes grow fainter with increasing value, so an object is detectable
//! while `curve(t) < limit`. The rise is searched on `[explosion, 0]` and the
//! fade on `[0, end]`.

use log::warn;
use survey_math::{bisect, BisectConfig, BisectError, Polynomial};

/// Magnitude tolerance of the crossing search.
pub const CROSSING_TOLERANCE_MAG: f64 = 0.01;

/// Maximum number of bisection halvings.
pub const CROSSING_MAX_ITERATIONS: usize = 100;

/// Result of a threshold search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Crossing {
    /// The curve crosses the limit on this day
    At(f64),
    /// The curve does not cross within the interval
    NotReached,
    /// Bisection ran out of iterations; the estimate is unreliable
    Indeterminate { estimate: f64 },
}

fn crossing_config() -> BisectConfig {
    BisectConfig {
        tolerance: CROSSING_TOLERANCE_MAG,
        max_iterations: CROSSING_MAX_ITERATIONS,
    }
}

fn solve(curve: &Polynomial, limit: f64, lower: f64, upper: f64) -> Crossing {
    match bisect(|t| curve.evaluate(t) - limit, lower, upper, crossing_config()) {
        Ok(day) => Crossing::At(day),
        Err(BisectError::NotConverged { estimate, iterations }) => {
            warn!(
                "Threshold search on [{:.2}, {:.2}] did not converge in {} iterations",
                lower, upper, iterations
            );
            Crossing::Indeterminate { estimate }
        }
        Err(BisectError::NoSignChange { .. }) | Err(BisectError::InvalidInterval { .. }) => {
            Crossing::NotReached
        }
    }
}

/// Day the curve first becomes brighter than `limit` ("ripe day").
///
/// Returns the explosion day when the curve is already brighter there, and
/// [`Crossing::NotReached`] when the peak is not strictly brighter than the limit.
pub fn ripe_day(curve: &Polynomial, limit: f64, explosion_day: f64) -> Crossing {
    if curve.evaluate(0.0) >= limit {
        return Crossing::NotReached;
    }
    if curve.evaluate(explosion_day) < limit {
        return Crossing::At(explosion_day);
    }
    solve(curve, limit, explosion_day, 0.0)
}

/// Day after peak on which the curve fades past `limit`.
///
/// [`Crossing::NotReached`] means the object is still brighter than the
/// limit at the end of the curve, or was never brighter than it at peak.
pub fn fade_day(curve: &Polynomial, limit: f64, end_day: f64) -> Crossing {
    if curve.evaluate(0.0) >= limit || curve.evaluate(end_day) < limit {
        return Crossing::NotReached;
    }
    solve(curve, limit, 0.0, end_day)
}
