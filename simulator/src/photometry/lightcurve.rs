//! Rest-frame template to observed-frame light curve transform.
//!
//! Each stage is a pure function over [`Polynomial`] curves of magnitude
//! versus days relative to peak:
//!
//! 1. absolute curve = template (peak at 0) + sampled peak magnitude
//! 2. apparent curve = absolute curve + distance modulus
//! 3. k-corrected curve = apparent curve - k-correction(type, z, rest -> observed)
//! 4. extincted curve = k-corrected curve + (host + galactic E(B-V)) * coefficient
//! 5. observed curve = refit through integer rest days stretched by (1 + z)
//!
//! Any stage that lacks data marks that filter [`FilterCurve::Undetectable`]
//! and the remaining filters carry on.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use survey_math::{FitError, Polynomial};

use super::extinction::extinction_magnitudes;
use super::template::{KCorrectionTable, TemplateLibrary};
use crate::config::ObservedFilter;
use crate::cosmology::{Cosmology, CosmologyError};
use crate::population::SampledObject;

/// Why a filter has no usable observed-frame curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndetectableReason {
    /// The template has no curve in the rest-frame filter
    MissingTemplateCurve,
    /// No k-correction exists for this type, redshift and filter pair
    MissingKCorrection,
    /// Too few points to fit a curve, either upstream or after resampling
    InsufficientData,
    /// The refit produced unusable coefficients
    DegenerateFit,
}

/// The observed-frame curve in one filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCurve {
    Defined {
        curve: Polynomial,
        /// Apparent magnitude at day 0
        peak_magnitude: f64,
    },
    Undetectable(UndetectableReason),
}

impl FilterCurve {
    pub fn curve(&self) -> Option<&Polynomial> {
        match self {
            FilterCurve::Defined { curve, .. } => Some(curve),
            FilterCurve::Undetectable(_) => None,
        }
    }

    pub fn peak_magnitude(&self) -> Option<f64> {
        match self {
            FilterCurve::Defined { peak_magnitude, .. } => Some(*peak_magnitude),
            FilterCurve::Undetectable(_) => None,
        }
    }
}

/// Observed-frame light curves for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedLightCurve {
    /// Explosion day relative to peak, time dilated
    pub explosion_day: f64,
    /// End of the light curve relative to peak, time dilated
    pub end_day: f64,
    pub filters: BTreeMap<String, FilterCurve>,
}

/// Stage 1.
pub fn absolute_curve(template_curve: &Polynomial, peak_absolute_magnitude: f64) -> Polynomial {
    template_curve.offset(peak_absolute_magnitude)
}

/// Stage 2.
pub fn apparent_curve(absolute: &Polynomial, distance_modulus: f64) -> Polynomial {
    absolute.offset(distance_modulus)
}

/// Stage 3.
pub fn k_corrected_curve(apparent: &Polynomial, k_correction: &Polynomial) -> Polynomial {
    apparent - k_correction
}

/// Stage 4.
pub fn extincted_curve(k_corrected: &Polynomial, extinction_magnitudes: f64) -> Polynomial {
    k_corrected.offset(extinction_magnitudes)
}

/// Integer rest-frame days in `[explosion_day, end_day]`.
pub fn resample_days(explosion_day: f64, end_day: f64) -> Vec<f64> {
    let first = explosion_day.ceil() as i64;
    let last = end_day.floor() as i64;
    (first..=last).map(|d| d as f64).collect()
}

/// Stage 5: sample at integer rest days, stretch by `1 + z`, refit.
pub fn time_dilated_curve(
    rest_curve: &Polynomial,
    explosion_day: f64,
    end_day: f64,
    redshift: f64,
    order: usize,
) -> Result<Polynomial, FitError> {
    let dilation = 1.0 + redshift;
    let days = resample_days(explosion_day, end_day);
    let observed_days: Vec<f64> = days.iter().map(|d| d * dilation).collect();
    let magnitudes: Vec<f64> = days.iter().map(|&d| rest_curve.evaluate(d)).collect();
    Polynomial::fit(&observed_days, &magnitudes, order)
}

/// Applies the five stages to sampled objects.
pub struct LightCurvePipeline<'a> {
    cosmology: &'a Cosmology,
    library: &'a TemplateLibrary,
    filters: &'a [ObservedFilter],
    rest_frame_filter: &'a str,
    order: usize,
}

impl<'a> LightCurvePipeline<'a> {
    pub fn new(
        cosmology: &'a Cosmology,
        library: &'a TemplateLibrary,
        filters: &'a [ObservedFilter],
        rest_frame_filter: &'a str,
        order: usize,
    ) -> Self {
        Self {
            cosmology,
            library,
            filters,
            rest_frame_filter,
            order,
        }
    }

    fn k_corrections(&self) -> &KCorrectionTable {
        &self.library.k_corrections
    }

    /// Builds the observed-frame light curve for one object.
    ///
    /// Only an invalid redshift is an error. Missing templates, curves or
    /// k-corrections degrade to [`FilterCurve::Undetectable`].
    pub fn transform(&self, object: &SampledObject) -> Result<ObservedLightCurve, CosmologyError> {
        let dilation = 1.0 + object.redshift;
        let Some(template) = self.library.template(&object.transient_type) else {
            warn!("Object {}: no template for type {}", object.index, object.transient_type);
            return Ok(self.all_undetectable(UndetectableReason::MissingTemplateCurve, 0.0, 0.0));
        };
        let end_rest = template.end_of_light_curve_day;

        let (rest_curve, explosion_rest) = match template.filters.get(self.rest_frame_filter) {
            Some(Some(rest)) => (&rest.curve, rest.explosion_day),
            Some(None) => {
                debug!(
                    "Object {}: template {} has no fitted {} curve",
                    object.index, object.transient_type, self.rest_frame_filter
                );
                return Ok(self.all_undetectable(
                    UndetectableReason::InsufficientData,
                    0.0,
                    end_rest * dilation,
                ));
            }
            None => {
                warn!(
                    "Object {}: no {} template curve for type {}",
                    object.index, self.rest_frame_filter, object.transient_type
                );
                return Ok(self.all_undetectable(
                    UndetectableReason::MissingTemplateCurve,
                    0.0,
                    end_rest * dilation,
                ));
            }
        };

        let mu = self.cosmology.distance_modulus(object.redshift)?;
        let absolute = absolute_curve(rest_curve, object.peak_absolute_magnitude);
        let apparent = apparent_curve(&absolute, mu);

        let mut filters = BTreeMap::new();
        for filter in self.filters {
            let curve = match self.k_corrections().get(
                &object.transient_type,
                object.redshift,
                self.rest_frame_filter,
                &filter.name,
            ) {
                None => {
                    debug!(
                        "Object {}: no k-correction for {} at z={:.3} {}->{}",
                        object.index,
                        object.transient_type,
                        object.redshift,
                        self.rest_frame_filter,
                        filter.name
                    );
                    FilterCurve::Undetectable(UndetectableReason::MissingKCorrection)
                }
                Some(k) => {
                    let dust = extinction_magnitudes(
                        object.host_ebv,
                        object.galactic_ebv,
                        filter.ebv_coefficient,
                    );
                    let rest_frame = extincted_curve(&k_corrected_curve(&apparent, k), dust);
                    self.observe(&rest_frame, explosion_rest, end_rest, object.redshift)
                }
            };
            filters.insert(filter.name.clone(), curve);
        }

        Ok(ObservedLightCurve {
            explosion_day: explosion_rest * dilation,
            end_day: end_rest * dilation,
            filters,
        })
    }

    fn observe(
        &self,
        rest_frame: &Polynomial,
        explosion: f64,
        end: f64,
        redshift: f64,
    ) -> FilterCurve {
        match time_dilated_curve(rest_frame, explosion, end, redshift, self.order) {
            Ok(curve) => {
                let peak_magnitude = curve.evaluate(0.0);
                if peak_magnitude.is_finite() {
                    FilterCurve::Defined {
                        curve,
                        peak_magnitude,
                    }
                } else {
                    FilterCurve::Undetectable(UndetectableReason::DegenerateFit)
                }
            }
            Err(FitError::InsufficientPoints { .. }) => {
                FilterCurve::Undetectable(UndetectableReason::InsufficientData)
            }
            Err(e) => {
                warn!("Light curve refit failed: {}", e);
                FilterCurve::Undetectable(UndetectableReason::DegenerateFit)
            }
        }
    }

    fn all_undetectable(
        &self,
        reason: UndetectableReason,
        explosion_day: f64,
        end_day: f64,
    ) -> ObservedLightCurve {
        ObservedLightCurve {
            explosion_day,
            end_day,
            filters: self
                .filters
                .iter()
                .map(|f| (f.name.clone(), FilterCurve::Undetectable(reason)))
                .collect(),
        }
    }
}
