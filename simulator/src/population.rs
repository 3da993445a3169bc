//! Random transient populations.
//!
//! Objects are drawn uniformly in volume between the configured redshift
//! limits and snapped to the redshift grid. Each gets a type from the ordered
//! rate table, a Gaussian peak magnitude for that type and host/galactic
//! colour excesses.

use log::info;
use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{
    ExtinctionSettings, RedshiftSettings, SimulationSettings, TransientTypeSettings,
};
use crate::cosmology::{Cosmology, CosmologyError, DistanceTable};

/// Points in the luminosity distance table used to invert sampled volumes.
pub const DISTANCE_TABLE_SAMPLES: usize = 2000;

#[derive(Error, Debug)]
pub enum PopulationError {
    #[error("Cosmology error: {0}")]
    Cosmology(#[from] CosmologyError),
    #[error("Invalid distribution for {name}: {source}")]
    Distribution {
        name: String,
        #[source]
        source: NormalError,
    },
}

/// One simulated transient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledObject {
    pub index: usize,
    pub redshift: f64,
    pub transient_type: String,
    pub peak_absolute_magnitude: f64,
    pub host_ebv: f64,
    pub galactic_ebv: f64,
}

/// Evenly spaced redshifts `lower, lower + res, ..., upper`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedshiftGrid {
    pub lower: f64,
    pub resolution: f64,
    /// Index of the last grid point
    pub steps: usize,
}

impl RedshiftGrid {
    pub fn new(settings: &RedshiftSettings) -> Self {
        let span = (settings.upper - settings.lower) / settings.resolution;
        Self {
            lower: settings.lower,
            resolution: settings.resolution,
            steps: (span + 1e-9).floor() as usize,
        }
    }

    pub fn point(&self, k: usize) -> f64 {
        let z = self.lower + k as f64 * self.resolution;
        (z * 1e9).round() / 1e9
    }

    pub fn points(&self) -> Vec<f64> {
        (0..=self.steps).map(|k| self.point(k)).collect()
    }

    /// Nearest grid point to `z`, clamped to the grid.
    pub fn snap(&self, z: f64) -> f64 {
        let k = ((z - self.lower) / self.resolution).round();
        let k = if k.is_nan() { 0.0 } else { k.clamp(0.0, self.steps as f64) };
        self.point(k as usize)
    }
}

/// Draws redshifts uniformly in luminosity-sphere volume, snapped to the grid.
pub fn sample_redshifts<R: Rng>(
    rng: &mut R,
    count: usize,
    settings: &RedshiftSettings,
    cosmology: &Cosmology,
) -> Result<Vec<f64>, PopulationError> {
    let grid = RedshiftGrid::new(settings);
    let table = DistanceTable::new(cosmology, settings.upper, DISTANCE_TABLE_SAMPLES)?;

    let lower_volume = if settings.lower == 0.0 {
        0.0
    } else {
        cosmology.luminosity_sphere_volume_mpc3(settings.lower)?
    };
    let upper_volume = cosmology.luminosity_sphere_volume_mpc3(settings.upper)?;

    let redshifts = (0..count)
        .map(|_| {
            let u: f64 = rng.random();
            let volume = lower_volume + u * (upper_volume - lower_volume);
            let distance = (3.0 * volume / (4.0 * std::f64::consts::PI)).cbrt();
            grid.snap(table.redshift_for_distance(distance))
        })
        .collect();
    Ok(redshifts)
}

/// Index of the first cumulative rate that is `>= draw`.
///
/// When rounding leaves the final cumulative sum just below `draw`, the last
/// type is returned.
pub fn pick_type(draw: f64, cumulative_rates: &[f64]) -> usize {
    cumulative_rates
        .iter()
        .position(|&c| draw <= c)
        .unwrap_or(cumulative_rates.len().saturating_sub(1))
}

/// Running sums of the relative rates in configured order.
pub fn cumulative_rates(types: &[TransientTypeSettings]) -> Vec<f64> {
    types
        .iter()
        .scan(0.0, |acc, t| {
            *acc += t.relative_rate;
            Some(*acc)
        })
        .collect()
}

/// Draws type indices into `types` with probability proportional to their rates.
pub fn sample_types<R: Rng>(
    rng: &mut R,
    count: usize,
    types: &[TransientTypeSettings],
) -> Vec<usize> {
    let cumulative = cumulative_rates(types);
    (0..count)
        .map(|_| pick_type(rng.random::<f64>(), &cumulative))
        .collect()
}

/// Gaussian peak absolute magnitude for each sampled type.
pub fn sample_peak_magnitudes<R: Rng>(
    rng: &mut R,
    type_indices: &[usize],
    types: &[TransientTypeSettings],
) -> Result<Vec<f64>, PopulationError> {
    let distributions = types
        .iter()
        .map(|t| {
            Normal::new(t.peak_magnitude_mean, t.peak_magnitude_sigma).map_err(|source| {
                PopulationError::Distribution {
                    name: t.name.clone(),
                    source,
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(type_indices
        .iter()
        .map(|&i| distributions[i].sample(rng))
        .collect())
}

/// Host and galactic E(B-V) for each object.
pub fn sample_extinctions<R: Rng>(
    rng: &mut R,
    count: usize,
    settings: &ExtinctionSettings,
) -> Result<Vec<(f64, f64)>, PopulationError> {
    match settings {
        ExtinctionSettings::Constant {
            host_ebv,
            galactic_ebv,
        } => Ok(vec![(*host_ebv, *galactic_ebv); count]),
        ExtinctionSettings::Random { host, galactic } => {
            let normal = |name: &str, mean: f64, sigma: f64| {
                Normal::new(mean, sigma).map_err(|source| PopulationError::Distribution {
                    name: name.to_string(),
                    source,
                })
            };
            let host_dist = normal("host extinction", host.mean, host.sigma)?;
            let galactic_dist = normal("galactic extinction", galactic.mean, galactic.sigma)?;
            Ok((0..count)
                .map(|_| {
                    let h: f64 = host_dist.sample(rng);
                    let g: f64 = galactic_dist.sample(rng);
                    (h.max(0.0), g.max(0.0))
                })
                .collect())
        }
    }
}

/// Draws the full population described by `settings`.
pub fn sample_population<R: Rng>(
    rng: &mut R,
    settings: &SimulationSettings,
    cosmology: &Cosmology,
) -> Result<Vec<SampledObject>, PopulationError> {
    let n = settings.sample_number;
    let types = &settings.transient_types;

    let redshifts = sample_redshifts(rng, n, &settings.redshift, cosmology)?;
    let type_indices = sample_types(rng, n, types);
    let peaks = sample_peak_magnitudes(rng, &type_indices, types)?;
    let extinctions = sample_extinctions(rng, n, &settings.extinction)?;

    info!(
        "Sampled {} objects between z = {} and z = {}",
        n, settings.redshift.lower, settings.redshift.upper
    );

    Ok((0..n)
        .map(|i| SampledObject {
            index: i,
            redshift: redshifts[i],
            transient_type: types[type_indices[i]].name.clone(),
            peak_absolute_magnitude: peaks[i],
            host_ebv: extinctions[i].0,
            galactic_ebv: extinctions[i].1,
        })
        .collect())
}
