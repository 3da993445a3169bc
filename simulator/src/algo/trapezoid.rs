//! Trapezoidal integration utility

use thiserror::Error;

/// Errors that can occur during trapezoidal integration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrapezoidError {
    #[error("Insufficient points for integration, need at least 2 points")]
    InsufficientPoints,

    #[error("Points must be in ascending order")]
    NotAscending,
}

/// Performs trapezoidal integration of a function over a set of points.
///
/// # Arguments
///
/// * `corners` - The x coordinates of the trapezoid corners in ascending order
/// * `to_integrate` - The function to integrate
pub fn trap_integrate<F>(corners: &[f64], to_integrate: F) -> Result<f64, TrapezoidError>
where
    F: Fn(f64) -> f64,
{
    if corners.len() < 2 {
        return Err(TrapezoidError::InsufficientPoints);
    }

    if corners.windows(2).any(|w| w[1] <= w[0]) {
        return Err(TrapezoidError::NotAscending);
    }

    let mut integral_sum = 0.0;
    let mut y_left = to_integrate(corners[0]);
    for pair in corners.windows(2) {
        let y_right = to_integrate(pair[1]);
        integral_sum += (pair[1] - pair[0]) * (y_left + y_right) / 2.0;
        y_left = y_right;
    }

    Ok(integral_sum)
}

/// Evenly spaced integration corners covering `[start, end]` with `intervals` steps.
pub fn uniform_corners(start: f64, end: f64, intervals: usize) -> Vec<f64> {
    let step = (end - start) / intervals as f64;
    (0..=intervals).map(|i| start + step * i as f64).collect()
}
