//! Numerical building blocks shared by the survey simulator.
//!
//! Provides dense polynomials with least-squares fitting and a bracketing
//! bisection root finder.

pub mod bisect;
pub mod polynomial;

pub use bisect::{bisect, BisectConfig, BisectError};
pub use polynomial::{FitError, Polynomial};
