//! Flat ΛCDM distance measures.
//!
//! Distances are in megaparsecs. The luminosity distance is obtained by
//! trapezoidal integration of `1/E(z)`, and its inverse (distance to
//! redshift) from a tabulated grid with linear interpolation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algo::trapezoid::{trap_integrate, uniform_corners, TrapezoidError};
use crate::algo::{InterpError, Interpolator};

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Redshift substituted for exactly zero when computing a distance modulus.
pub const MINIMUM_MODULUS_REDSHIFT: f64 = 0.01;

const INTEGRATION_STEPS: usize = 1000;

#[derive(Error, Debug)]
pub enum CosmologyError {
    #[error("Redshift must be finite and non-negative, got {0}")]
    InvalidRedshift(f64),
    #[error("Integration failed: {0}")]
    Integration(#[from] TrapezoidError),
    #[error("Distance table error: {0}")]
    Table(#[from] InterpError),
}

/// Cosmological parameters for a flat universe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cosmology {
    /// Hubble constant in km/s/Mpc
    pub hubble_constant: f64,
    pub omega_matter: f64,
    pub omega_lambda: f64,
}

impl Default for Cosmology {
    fn default() -> Self {
        Self {
            hubble_constant: 70.0,
            omega_matter: 0.3,
            omega_lambda: 0.7,
        }
    }
}

impl Cosmology {
    /// Hubble distance `c / H0` in Mpc.
    pub fn hubble_distance_mpc(&self) -> f64 {
        SPEED_OF_LIGHT_KM_S / self.hubble_constant
    }

    /// Dimensionless Hubble parameter `E(z) = H(z) / H0`.
    pub fn efunc(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        (self.omega_matter * zp1.powi(3) + self.omega_lambda).sqrt()
    }

    /// Line-of-sight comoving distance in Mpc.
    pub fn comoving_distance_mpc(&self, z: f64) -> Result<f64, CosmologyError> {
        if !z.is_finite() || z < 0.0 {
            return Err(CosmologyError::InvalidRedshift(z));
        }
        if z == 0.0 {
            return Ok(0.0);
        }
        let corners = uniform_corners(0.0, z, INTEGRATION_STEPS);
        let integral = trap_integrate(&corners, |zz| 1.0 / self.efunc(zz))?;
        Ok(self.hubble_distance_mpc() * integral)
    }

    /// Luminosity distance `(1 + z) * D_C` in Mpc.
    pub fn luminosity_distance_mpc(&self, z: f64) -> Result<f64, CosmologyError> {
        Ok((1.0 + z) * self.comoving_distance_mpc(z)?)
    }

    /// Distance modulus `5 log10(d_L / 10 pc)`.
    ///
    /// A redshift of exactly zero is replaced by
    /// [`MINIMUM_MODULUS_REDSHIFT`] so the result stays finite.
    pub fn distance_modulus(&self, z: f64) -> Result<f64, CosmologyError> {
        let z = if z == 0.0 { MINIMUM_MODULUS_REDSHIFT } else { z };
        let d_pc = self.luminosity_distance_mpc(z)? * 1.0e6;
        Ok(5.0 * d_pc.log10() - 5.0)
    }

    /// Volume of a Euclidean sphere whose radius is the luminosity distance.
    ///
    /// Used both to draw redshifts uniformly in volume and to size the
    /// redshift shells when converting rates.
    pub fn luminosity_sphere_volume_mpc3(&self, z: f64) -> Result<f64, CosmologyError> {
        let d = self.luminosity_distance_mpc(z)?;
        Ok(4.0 / 3.0 * std::f64::consts::PI * d.powi(3))
    }
}

/// Tabulated luminosity distance used to invert `d_L(z)`.
#[derive(Debug, Clone)]
pub struct DistanceTable {
    inverse: Interpolator,
}

impl DistanceTable {
    /// Tabulates `d_L` on `samples + 1` evenly spaced redshifts in `[0, z_max]`.
    pub fn new(cosmology: &Cosmology, z_max: f64, samples: usize) -> Result<Self, CosmologyError> {
        if !z_max.is_finite() || z_max <= 0.0 {
            return Err(CosmologyError::InvalidRedshift(z_max));
        }

        let redshifts = uniform_corners(0.0, z_max, samples.max(1));
        let distances = redshifts
            .iter()
            .map(|&z| cosmology.luminosity_distance_mpc(z))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            inverse: Interpolator::new(distances, redshifts)?,
        })
    }

    /// Redshift at which the luminosity distance equals `distance_mpc`.
    ///
    /// Distances past either end of the table are clamped to it.
    pub fn redshift_for_distance(&self, distance_mpc: f64) -> f64 {
        self.inverse.evaluate_clamped(distance_mpc)
    }
}
