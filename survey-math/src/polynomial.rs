//! Dense univariate polynomials in the monomial basis.
//!
//! Coefficients are stored in ascending order of power, so `coefficients()[k]`
//! multiplies `x^k`. Light-curve templates, K-corrections and fitted observer
//! frame curves are all represented this way.

use std::ops::{Add, Sub};

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Errors that can occur while fitting a polynomial to samples.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Need at least {needed} points to fit order {order}, got {got}")]
    InsufficientPoints {
        order: usize,
        needed: usize,
        got: usize,
    },
    #[error("Sample vectors must have the same length ({xs} vs {ys})")]
    MismatchedLengths { xs: usize, ys: usize },
    #[error("Samples contain non-finite values")]
    NonFiniteInput,
    #[error("Least squares solve failed: {0}")]
    SolveFailed(String),
    #[error("Fitted coefficients are not finite")]
    DegenerateFit,
}

/// A polynomial `c0 + c1*x + c2*x^2 + ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    /// Creates a polynomial from ascending coefficients.
    ///
    /// An empty coefficient list is treated as the zero polynomial.
    pub fn new(coefficients: Vec<f64>) -> Self {
        if coefficients.is_empty() {
            return Self::zero();
        }
        Self { coefficients }
    }

    /// Creates a polynomial from coefficients ordered highest power first.
    pub fn from_descending(mut coefficients: Vec<f64>) -> Self {
        coefficients.reverse();
        Self::new(coefficients)
    }

    pub fn zero() -> Self {
        Self::constant(0.0)
    }

    pub fn constant(value: f64) -> Self {
        Self {
            coefficients: vec![value],
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// True when every coefficient is finite.
    pub fn is_finite(&self) -> bool {
        self.coefficients.iter().all(|c| c.is_finite())
    }

    /// Evaluates the polynomial at `x` using Horner's scheme.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    /// Returns a copy with `value` added to the constant term.
    pub fn offset(&self, value: f64) -> Self {
        let mut coefficients = self.coefficients.clone();
        coefficients[0] += value;
        Self { coefficients }
    }

    /// Least-squares fit of a polynomial of the given order to `(xs, ys)`.
    ///
    /// The Vandermonde columns are normalised before the SVD solve so that
    /// curves spanning hundreds of days at moderate order stay well
    /// conditioned. Singular values below `n * eps * s_max` are discarded.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use survey_math::Polynomial;
    ///
    /// let xs = [0.0, 1.0, 2.0, 3.0];
    /// let ys = [1.0, 3.0, 5.0, 7.0];
    /// let line = Polynomial::fit(&xs, &ys, 1).unwrap();
    /// assert!((line.evaluate(10.0) - 21.0).abs() < 1e-9);
    /// ```
    pub fn fit(xs: &[f64], ys: &[f64], order: usize) -> Result<Self, FitError> {
        if xs.len() != ys.len() {
            return Err(FitError::MismatchedLengths {
                xs: xs.len(),
                ys: ys.len(),
            });
        }

        let needed = order + 1;
        if xs.len() < needed {
            return Err(FitError::InsufficientPoints {
                order,
                needed,
                got: xs.len(),
            });
        }

        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(FitError::NonFiniteInput);
        }

        let n = xs.len();
        let mut vandermonde = DMatrix::from_fn(n, needed, |i, j| xs[i].powi(j as i32));

        let mut scales = Vec::with_capacity(needed);
        for j in 0..needed {
            let norm = vandermonde.column(j).norm();
            let scale = if norm > 0.0 { norm } else { 1.0 };
            vandermonde.column_mut(j).unscale_mut(scale);
            scales.push(scale);
        }

        let b = DVector::from_column_slice(ys);
        let svd = vandermonde.svd(true, true);
        let cutoff = n as f64 * f64::EPSILON * svd.singular_values.max();
        let solution = svd
            .solve(&b, cutoff)
            .map_err(|e| FitError::SolveFailed(e.to_string()))?;

        let coefficients: Vec<f64> = solution
            .iter()
            .zip(scales.iter())
            .map(|(c, s)| c / s)
            .collect();

        let fitted = Self::new(coefficients);
        if !fitted.is_finite() {
            return Err(FitError::DegenerateFit);
        }
        Ok(fitted)
    }
}

impl Default for Polynomial {
    fn default() -> Self {
        Self::zero()
    }
}

fn combine(lhs: &[f64], rhs: &[f64], op: impl Fn(f64, f64) -> f64) -> Polynomial {
    let len = lhs.len().max(rhs.len());
    let coefficients = (0..len)
        .map(|k| {
            let a = lhs.get(k).copied().unwrap_or(0.0);
            let b = rhs.get(k).copied().unwrap_or(0.0);
            op(a, b)
        })
        .collect();
    Polynomial::new(coefficients)
}

impl Add for &Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: &Polynomial) -> Polynomial {
        combine(&self.coefficients, &rhs.coefficients, |a, b| a + b)
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: &Polynomial) -> Polynomial {
        combine(&self.coefficients, &rhs.coefficients, |a, b| a - b)
    }
}

impl Add for Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: Polynomial) -> Polynomial {
        &self + &rhs
    }
}

impl Sub for Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: Polynomial) -> Polynomial {
        &self - &rhs
    }
}
