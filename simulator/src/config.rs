//! Simulation settings loaded from TOML.
//!
//! Everything a run needs is described by [`SimulationSettings`]: the
//! population to draw, the survey's filters and cadence, extinction handling,
//! rate constants and the follow-up constraints used to classify discoveries.
//! Settings are validated once at load time so that the simulation itself
//! never has to deal with malformed input.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cosmology::Cosmology;
use crate::photometry::extinction::standard_ebv_coefficient;
use crate::photometry::template::REDSHIFT_KEY_STEP;
use crate::survey::cadence::SURVEY_YEAR_DAYS;

/// Tolerance on the sum of relative type rates.
pub const RATE_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Sample number must be positive")]
    EmptySample,
    #[error("At least one transient type must be configured")]
    NoTransientTypes,
    #[error("At least one survey filter must be configured")]
    NoFilters,
    #[error("Relative transient rates sum to {0}, expected 1")]
    RatesDoNotSumToOne(f64),
    #[error("Relative rate for '{name}' must be non-negative, got {value}")]
    NegativeRate { name: String, value: f64 },
    #[error("Invalid redshift range: lower {lower}, upper {upper}, resolution {resolution}")]
    InvalidRedshiftRange {
        lower: f64,
        upper: f64,
        resolution: f64,
    },
    #[error("{name} must lie in [0, 1], got {value}")]
    FractionOutOfRange { name: String, value: f64 },
    #[error("Invalid cadence for filter '{filter}': {reason}")]
    InvalidCadence { filter: String, reason: String },
    #[error("Light curve polynomial order must be at least 1")]
    InvalidPolynomialOrder,
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidSigma { name: String, value: f64 },
    #[error("{name} must be finite, got {value}")]
    NonFinite { name: String, value: f64 },
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },
    #[error("No E(B-V) coefficient configured or known for filter '{0}'")]
    UnknownExtinctionCoefficient(String),
    #[error("Invalid cosmology: {0}")]
    InvalidCosmology(String),
}

/// Redshift range and the grid that sampled redshifts snap to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedshiftSettings {
    pub lower: f64,
    pub upper: f64,
    pub resolution: f64,
}

/// One transient population entry. Order in the settings file is the order
/// used for cumulative-rate sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientTypeSettings {
    pub name: String,
    pub relative_rate: f64,
    pub peak_magnitude_mean: f64,
    pub peak_magnitude_sigma: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianSettings {
    pub mean: f64,
    pub sigma: f64,
}

/// How host and galactic E(B-V) are assigned to each object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExtinctionSettings {
    /// Every object gets the same values.
    Constant { host_ebv: f64, galactic_ebv: f64 },
    /// Independent Gaussian draws per object, clamped at zero.
    Random {
        host: GaussianSettings,
        galactic: GaussianSettings,
    },
}

impl Default for ExtinctionSettings {
    fn default() -> Self {
        ExtinctionSettings::Constant {
            host_ebv: 0.0,
            galactic_ebv: 0.0,
        }
    }
}

/// Survey-wide observing conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveySettings {
    /// Fraction of the survey year during which the field is observable
    pub observable_fraction: f64,
    /// Fraction of scheduled nights lost to weather
    pub weather_loss_fraction: f64,
    /// Survey footprint in square degrees
    pub sky_area_sq_deg: f64,
}

/// Per-filter depth and scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub name: String,
    pub limiting_magnitude: f64,
    /// E(B-V) to magnitude conversion; defaults to the standard value for g, r, i, z
    #[serde(default)]
    pub ebv_coefficient: Option<f64>,
    pub first_observation_day: u32,
    pub repeat_every_days: u32,
    pub moon_loss_fraction: f64,
}

impl FilterSettings {
    pub fn extinction_coefficient(&self) -> Result<f64, ConfigError> {
        self.ebv_coefficient
            .or_else(|| standard_ebv_coefficient(&self.name))
            .ok_or_else(|| ConfigError::UnknownExtinctionCoefficient(self.name.clone()))
    }
}

/// Constants converting star formation into a transient rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSettings {
    /// Fraction of the IMF attributed to core-collapse progenitors
    #[serde(default = "default_ccsn_fraction")]
    pub ccsn_progenitor_fraction: f64,
    /// Ratio of the simulated transient rate to the CCSN rate
    #[serde(default = "default_transient_ratio")]
    pub transient_to_ccsn_ratio: f64,
}

fn default_ccsn_fraction() -> f64 {
    0.007
}

fn default_transient_ratio() -> f64 {
    1.0e-4
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            ccsn_progenitor_fraction: default_ccsn_fraction(),
            transient_to_ccsn_ratio: default_transient_ratio(),
        }
    }
}

/// Requirements a discovery must meet to be useful for follow-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyConstraints {
    /// Discoveries with a peak at or fainter than this are too faint to classify
    pub faint_magnitude_limit: f64,
    /// Minimum days of observability needed for a follow-up campaign
    pub min_campaign_days: f64,
}

fn default_polynomial_order() -> usize {
    5
}

/// Top-level settings for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub sample_number: usize,
    /// Base seed for every random stream; drawn from the OS when absent
    #[serde(default)]
    pub seed: Option<u64>,
    pub redshift: RedshiftSettings,
    pub transient_types: Vec<TransientTypeSettings>,
    /// Rest-frame filter that k-corrections map from
    pub rest_frame_filter: String,
    #[serde(default = "default_polynomial_order")]
    pub light_curve_poly_order: usize,
    #[serde(default)]
    pub extinction: ExtinctionSettings,
    pub survey: SurveySettings,
    pub filters: Vec<FilterSettings>,
    #[serde(default)]
    pub rates: RateSettings,
    pub constraints: SurveyConstraints,
    /// Flat 70 / 0.3 / 0.7 unless overridden
    #[serde(default)]
    pub cosmology: Cosmology,
}

/// A filter with its extinction coefficient resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedFilter {
    pub name: String,
    pub limiting_magnitude: f64,
    pub ebv_coefficient: f64,
}

impl SimulationSettings {
    /// Load and validate settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: SimulationSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every cross-field constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_number == 0 {
            return Err(ConfigError::EmptySample);
        }
        if self.light_curve_poly_order == 0 {
            return Err(ConfigError::InvalidPolynomialOrder);
        }

        let z = &self.redshift;
        if !(z.lower.is_finite() && z.upper.is_finite() && z.resolution.is_finite())
            || z.lower < 0.0
            || z.lower >= z.upper
            || z.resolution < REDSHIFT_KEY_STEP
        {
            return Err(ConfigError::InvalidRedshiftRange {
                lower: z.lower,
                upper: z.upper,
                resolution: z.resolution,
            });
        }

        let c = &self.cosmology;
        if !(c.hubble_constant.is_finite() && c.hubble_constant > 0.0) {
            return Err(ConfigError::InvalidCosmology(format!(
                "Hubble constant must be positive, got {}",
                c.hubble_constant
            )));
        }
        if !(c.omega_matter.is_finite() && c.omega_lambda.is_finite())
            || c.omega_matter < 0.0
            || c.omega_lambda < 0.0
            || c.omega_matter + c.omega_lambda <= 0.0
        {
            return Err(ConfigError::InvalidCosmology(format!(
                "density parameters Omega_m = {}, Omega_Lambda = {}",
                c.omega_matter, c.omega_lambda
            )));
        }

        self.validate_types()?;
        self.validate_extinction()?;
        self.validate_survey()?;
        self.validate_filters()?;

        check_finite("constraints.faint_magnitude_limit", self.constraints.faint_magnitude_limit)?;
        check_sigma("constraints.min_campaign_days", self.constraints.min_campaign_days)?;
        check_sigma("rates.ccsn_progenitor_fraction", self.rates.ccsn_progenitor_fraction)?;
        check_sigma("rates.transient_to_ccsn_ratio", self.rates.transient_to_ccsn_ratio)?;

        Ok(())
    }

    fn validate_types(&self) -> Result<(), ConfigError> {
        if self.transient_types.is_empty() {
            return Err(ConfigError::NoTransientTypes);
        }

        let mut seen = HashSet::new();
        let mut total = 0.0;
        for ty in &self.transient_types {
            if !seen.insert(ty.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "transient type",
                    name: ty.name.clone(),
                });
            }
            if !ty.relative_rate.is_finite() || ty.relative_rate < 0.0 {
                return Err(ConfigError::NegativeRate {
                    name: ty.name.clone(),
                    value: ty.relative_rate,
                });
            }
            check_finite(
                &format!("{}.peak_magnitude_mean", ty.name),
                ty.peak_magnitude_mean,
            )?;
            check_sigma(
                &format!("{}.peak_magnitude_sigma", ty.name),
                ty.peak_magnitude_sigma,
            )?;
            total += ty.relative_rate;
        }

        if (total - 1.0).abs() > RATE_SUM_TOLERANCE {
            return Err(ConfigError::RatesDoNotSumToOne(total));
        }
        Ok(())
    }

    fn validate_extinction(&self) -> Result<(), ConfigError> {
        match &self.extinction {
            ExtinctionSettings::Constant {
                host_ebv,
                galactic_ebv,
            } => {
                check_sigma("extinction.host_ebv", *host_ebv)?;
                check_sigma("extinction.galactic_ebv", *galactic_ebv)?;
            }
            ExtinctionSettings::Random { host, galactic } => {
                check_finite("extinction.host.mean", host.mean)?;
                check_sigma("extinction.host.sigma", host.sigma)?;
                check_finite("extinction.galactic.mean", galactic.mean)?;
                check_sigma("extinction.galactic.sigma", galactic.sigma)?;
            }
        }
        Ok(())
    }

    fn validate_survey(&self) -> Result<(), ConfigError> {
        check_fraction("survey.observable_fraction", self.survey.observable_fraction)?;
        check_fraction(
            "survey.weather_loss_fraction",
            self.survey.weather_loss_fraction,
        )?;
        if !self.survey.sky_area_sq_deg.is_finite() || self.survey.sky_area_sq_deg <= 0.0 {
            return Err(ConfigError::NonFinite {
                name: "survey.sky_area_sq_deg".to_string(),
                value: self.survey.sky_area_sq_deg,
            });
        }
        Ok(())
    }

    fn validate_filters(&self) -> Result<(), ConfigError> {
        if self.filters.is_empty() {
            return Err(ConfigError::NoFilters);
        }

        let mut seen = HashSet::new();
        for filter in &self.filters {
            if !seen.insert(filter.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "filter",
                    name: filter.name.clone(),
                });
            }
            if filter.repeat_every_days == 0 {
                return Err(ConfigError::InvalidCadence {
                    filter: filter.name.clone(),
                    reason: "repeat interval must be at least one day".to_string(),
                });
            }
            if filter.first_observation_day == 0 {
                return Err(ConfigError::InvalidCadence {
                    filter: filter.name.clone(),
                    reason: "first observation day is 1-based".to_string(),
                });
            }
            let year = SURVEY_YEAR_DAYS.floor() as u32;
            if filter.first_observation_day > year || filter.repeat_every_days > year {
                return Err(ConfigError::InvalidCadence {
                    filter: filter.name.clone(),
                    reason: format!("first day and repeat interval must not exceed {year} days"),
                });
            }
            check_fraction(
                &format!("{}.moon_loss_fraction", filter.name),
                filter.moon_loss_fraction,
            )?;
            check_finite(
                &format!("{}.limiting_magnitude", filter.name),
                filter.limiting_magnitude,
            )?;
            let coefficient = filter.extinction_coefficient()?;
            check_finite(&format!("{}.ebv_coefficient", filter.name), coefficient)?;
        }
        Ok(())
    }

    /// Filters in configured order with extinction coefficients resolved.
    pub fn observed_filters(&self) -> Result<Vec<ObservedFilter>, ConfigError> {
        self.filters
            .iter()
            .map(|f| {
                Ok(ObservedFilter {
                    name: f.name.clone(),
                    limiting_magnitude: f.limiting_magnitude,
                    ebv_coefficient: f.extinction_coefficient()?,
                })
            })
            .collect()
    }
}

fn check_finite(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite {
            name: name.to_string(),
            value,
        })
    }
}

fn check_sigma(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidSigma {
            name: name.to_string(),
            value,
        })
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::FractionOutOfRange {
            name: name.to_string(),
            value,
        })
    }
}
