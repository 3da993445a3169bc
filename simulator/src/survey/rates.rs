//! Annual discovery rates from per-shell discovery fractions.
//!
//! The redshift range is cut into shells of one grid step. Each shell's
//! expected transient rate is scaled from the local star-formation rate
//! measured by a reference survey, weighted by a `(1 + z)^2.5` star formation
//! history and reduced by time dilation. The simulated fraction of objects in
//! each category then converts that into discovered, too-faint and
//! short-campaign rates.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use super::outcome::Outcome;
use crate::config::{RateSettings, RedshiftSettings};
use crate::cosmology::{Cosmology, CosmologyError};

/// Sky area of the reference survey in square degrees.
pub const REFERENCE_AREA_SQ_DEG: f64 = 5713.0;
/// Redshift out to which the reference rate was measured.
pub const REFERENCE_REDSHIFT_LIMIT: f64 = 0.033;
/// Star-formation-derived rate of the reference survey.
pub const REFERENCE_RATE: f64 = 14787.21;

/// Star formation history weighting.
pub fn star_formation_history(z: f64) -> f64 {
    (1.0 + z).powf(2.5)
}

/// One redshift shell `(z_low, z_high]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellRate {
    pub z_low: f64,
    pub z_high: f64,
    pub z_mid: f64,
    /// Expected transients per year in this shell across the survey area
    pub volumetric_rate: f64,
    pub object_count: usize,
    pub discovered_fraction: f64,
    pub too_faint_fraction: f64,
    pub short_campaign_fraction: f64,
    pub discovered_rate: f64,
    pub too_faint_rate: f64,
    pub short_campaign_rate: f64,
}

/// Shell breakdown plus totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub shells: Vec<ShellRate>,
    pub total_rate: f64,
    pub too_faint_rate: f64,
    pub short_campaign_rate: f64,
}

/// Number of shells `ceil((upper - lower) / resolution)`.
pub fn shell_count(redshift: &RedshiftSettings) -> usize {
    (((redshift.upper - redshift.lower) / redshift.resolution) - 1e-9).ceil().max(1.0) as usize
}

/// Shell holding `z`; `lower` itself belongs to the first shell.
pub fn shell_index(z: f64, redshift: &RedshiftSettings) -> usize {
    let n = shell_count(redshift);
    let position = (z - redshift.lower) / redshift.resolution;
    // Points on a shell's upper edge belong to that shell
    let k = (position - 1e-9).ceil().max(1.0) as usize;
    k.min(n) - 1
}

/// Converts rate constants and cosmology into per-shell expected rates.
pub struct RateModel<'a> {
    pub cosmology: &'a Cosmology,
    pub redshift: &'a RedshiftSettings,
    pub rates: &'a RateSettings,
    pub sky_area_sq_deg: f64,
}

impl RateModel<'_> {
    /// Expected transients per year in the shell `(z_low, z_high]`.
    pub fn shell_volumetric_rate(&self, z_low: f64, z_high: f64) -> Result<f64, CosmologyError> {
        let res = self.redshift.resolution;
        let anchor = res / REFERENCE_REDSHIFT_LIMIT;
        let normalised_rate = REFERENCE_RATE * anchor.powi(3);
        let anchor_volume = self.cosmology.luminosity_distance_mpc(res)?.powi(3);

        let shell_volume = self.cosmology.luminosity_distance_mpc(z_high)?.powi(3)
            - self.cosmology.luminosity_distance_mpc(z_low)?.powi(3);

        let z_mid = 0.5 * (z_low + z_high);
        let sfr_density = (star_formation_history(z_mid) / anchor)
            * normalised_rate
            * (shell_volume / anchor_volume);
        let transient_fraction =
            self.rates.ccsn_progenitor_fraction * self.rates.transient_to_ccsn_ratio;
        let area_ratio = self.sky_area_sq_deg / REFERENCE_AREA_SQ_DEG;
        let time_dilation = 1.0 / (1.0 + z_mid);

        Ok(sfr_density * transient_fraction * area_ratio * time_dilation)
    }

    /// Aggregates classified objects given as `(redshift, outcome)` pairs.
    pub fn aggregate(&self, objects: &[(f64, Outcome)]) -> Result<RateSummary, CosmologyError> {
        let n = shell_count(self.redshift);
        let mut counts: Vec<BTreeMap<Outcome, usize>> = vec![BTreeMap::new(); n];
        for &(z, outcome) in objects {
            *counts[shell_index(z, self.redshift)].entry(outcome).or_default() += 1;
        }

        let mut shells = Vec::with_capacity(n);
        for (k, shell_counts) in counts.iter().enumerate() {
            let z_low = self.redshift.lower + k as f64 * self.redshift.resolution;
            let z_high = z_low + self.redshift.resolution;
            let volumetric_rate = self.shell_volumetric_rate(z_low, z_high)?;

            let total: usize = shell_counts.values().sum();
            let fraction = |outcome| {
                if total == 0 {
                    0.0
                } else {
                    shell_counts.get(&outcome).copied().unwrap_or(0) as f64 / total as f64
                }
            };
            let discovered_fraction = fraction(Outcome::Discovered);
            let too_faint_fraction = fraction(Outcome::TooFaint);
            let short_campaign_fraction = fraction(Outcome::ShortCampaign);

            shells.push(ShellRate {
                z_low,
                z_high,
                z_mid: 0.5 * (z_low + z_high),
                volumetric_rate,
                object_count: total,
                discovered_fraction,
                too_faint_fraction,
                short_campaign_fraction,
                discovered_rate: discovered_fraction * volumetric_rate,
                too_faint_rate: too_faint_fraction * volumetric_rate,
                short_campaign_rate: short_campaign_fraction * volumetric_rate,
            });
        }

        let summary = RateSummary {
            total_rate: shells.iter().map(|s| s.discovered_rate).sum(),
            too_faint_rate: shells.iter().map(|s| s.too_faint_rate).sum(),
            short_campaign_rate: shells.iter().map(|s| s.short_campaign_rate).sum(),
            shells,
        };
        info!(
            "Annual rates: discovered {:.1}, too faint {:.1}, short campaign {:.1}",
            summary.total_rate, summary.too_faint_rate, summary.short_campaign_rate
        );
        Ok(summary)
    }
}
