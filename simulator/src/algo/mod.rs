//! Numerical helpers used by the cosmology and population code.

pub mod interp;
pub mod trapezoid;

pub use interp::{InterpError, Interpolator};
pub use trapezoid::{trap_integrate, TrapezoidError};
