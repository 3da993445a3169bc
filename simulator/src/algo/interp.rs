//! One-dimensional linear interpolation over tabulated data.
//!
//! Used to invert monotonic tables such as luminosity distance versus
//! redshift, where the forward direction is cheap to integrate but the
//! inverse has no closed form.

use thiserror::Error;

/// Errors that can occur during interpolation operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
    #[error("X values must be strictly ascending")]
    UnsortedData,
}

/// A validated table of `(x, y)` pairs with strictly ascending `x`.
///
/// Validation happens once on construction, so repeated lookups only pay
/// for the binary search.
#[derive(Debug, Clone)]
pub struct Interpolator {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Interpolator {
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, InterpError> {
        if xs.len() != ys.len() {
            return Err(InterpError::MismatchedLengths);
        }
        if xs.len() < 2 {
            return Err(InterpError::InsufficientData);
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(InterpError::UnsortedData);
        }
        Ok(Self { xs, ys })
    }

    /// Smallest and largest tabulated `x`.
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Linear interpolation at `x`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use simulator::algo::interp::Interpolator;
    ///
    /// let table = Interpolator::new(vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 4.0]).unwrap();
    /// assert_eq!(table.evaluate(1.5).unwrap(), 2.5);
    /// ```
    pub fn evaluate(&self, x: f64) -> Result<f64, InterpError> {
        let (min_x, max_x) = self.domain();
        if !(min_x..=max_x).contains(&x) {
            return Err(InterpError::OutOfBounds(x, min_x, max_x));
        }

        let idx = match self.xs.binary_search_by(|probe| probe.total_cmp(&x)) {
            Ok(exact_idx) => return Ok(self.ys[exact_idx]),
            Err(insert_idx) => insert_idx,
        };

        let (x1, x2) = (self.xs[idx - 1], self.xs[idx]);
        let (y1, y2) = (self.ys[idx - 1], self.ys[idx]);
        let t = (x - x1) / (x2 - x1);
        Ok(y1 + t * (y2 - y1))
    }

    /// Like [`evaluate`](Self::evaluate) but clamps `x` into the table domain first.
    pub fn evaluate_clamped(&self, x: f64) -> f64 {
        let (min_x, max_x) = self.domain();
        let clamped = if x.is_nan() { min_x } else { x.clamp(min_x, max_x) };
        // In-domain lookups cannot fail
        self.evaluate(clamped).unwrap_or(self.ys[0])
    }
}
