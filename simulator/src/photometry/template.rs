//! Rest-frame transient templates and cross-filter k-corrections.
//!
//! Both are produced by external photometric synthesis and arrive as a single
//! JSON "template library". Coefficients in the file are ascending powers of
//! days relative to peak.
//!
//! ```json
//! {
//!   "templates": [
//!     {
//!       "name": "slow",
//!       "end_of_light_curve_day": 250.0,
//!       "filters": {
//!         "g": { "coefficients": [-19.8, 0.0, 0.0005], "peak_magnitude": -19.8,
//!                "explosion_day": -40.0 },
//!         "u": { "coefficients": null }
//!       }
//!     }
//!   ],
//!   "k_corrections": [
//!     { "transient_type": "slow", "redshift": 0.1, "rest_filter": "g",
//!       "observed_filter": "r", "coefficients": [0.12, 0.001] }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use survey_math::Polynomial;
use thiserror::Error;

use crate::config::TransientTypeSettings;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template library: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse template library: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Template '{0}' is defined more than once")]
    DuplicateTemplate(String),
    #[error("Template '{name}' filter '{filter}': explosion day {day} is not finite and <= 0")]
    InvalidExplosionDay {
        name: String,
        filter: String,
        day: f64,
    },
    #[error("Template '{name}': end of light curve day must be finite and > 0, got {day}")]
    InvalidEndDay { name: String, day: f64 },
    #[error("Template '{name}' filter '{filter}' has coefficients but no {field}")]
    MissingField {
        name: String,
        filter: String,
        field: &'static str,
    },
    #[error("Non-finite coefficients for {0}")]
    NonFiniteCoefficients(String),
    #[error("Non-finite redshift {0} in k-correction table")]
    InvalidRedshift(f64),
    #[error("No template for configured transient type '{0}'")]
    UnknownType(String),
}

/// A peak-normalised rest-frame light curve in one filter.
///
/// `curve(0)` is zero at peak; the sampled peak magnitude is added later.
#[derive(Debug, Clone, PartialEq)]
pub struct RestFrameCurve {
    pub curve: Polynomial,
    /// Day of explosion relative to peak, always <= 0
    pub explosion_day: f64,
}

/// Template for one transient type.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientTemplate {
    pub name: String,
    /// Last day of the light curve relative to peak, always > 0
    pub end_of_light_curve_day: f64,
    /// `None` marks a filter whose curve could not be fitted upstream
    pub filters: BTreeMap<String, Option<RestFrameCurve>>,
}

/// Smallest redshift step that k-correction keys can tell apart.
pub const REDSHIFT_KEY_STEP: f64 = 0.001;

/// Redshift key used to index k-corrections, in units of [`REDSHIFT_KEY_STEP`].
pub fn redshift_key(z: f64) -> i64 {
    (z / REDSHIFT_KEY_STEP).round() as i64
}

type FilterPairMap = BTreeMap<String, BTreeMap<String, Polynomial>>;

/// K-corrections keyed by (type, redshift, rest filter, observed filter).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KCorrectionTable {
    entries: BTreeMap<String, BTreeMap<i64, FilterPairMap>>,
}

impl KCorrectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        transient_type: &str,
        redshift: f64,
        rest_filter: &str,
        observed_filter: &str,
        correction: Polynomial,
    ) {
        self.entries
            .entry(transient_type.to_string())
            .or_default()
            .entry(redshift_key(redshift))
            .or_default()
            .entry(rest_filter.to_string())
            .or_default()
            .insert(observed_filter.to_string(), correction);
    }

    pub fn get(
        &self,
        transient_type: &str,
        redshift: f64,
        rest_filter: &str,
        observed_filter: &str,
    ) -> Option<&Polynomial> {
        self.entries
            .get(transient_type)?
            .get(&redshift_key(redshift))?
            .get(rest_filter)?
            .get(observed_filter)
    }

    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(|by_z| by_z.values())
            .flat_map(|by_rest| by_rest.values())
            .map(|by_obs| by_obs.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All templates and k-corrections available to a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateLibrary {
    templates: BTreeMap<String, TransientTemplate>,
    pub k_corrections: KCorrectionTable,
}

#[derive(Debug, Deserialize, Serialize)]
struct RestFrameCurveRecord {
    coefficients: Option<Vec<f64>>,
    #[serde(default)]
    peak_magnitude: Option<f64>,
    #[serde(default)]
    explosion_day: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
struct TemplateRecord {
    name: String,
    end_of_light_curve_day: f64,
    filters: BTreeMap<String, RestFrameCurveRecord>,
}

#[derive(Debug, Deserialize, Serialize)]
struct KCorrectionRecord {
    transient_type: String,
    redshift: f64,
    rest_filter: String,
    observed_filter: String,
    coefficients: Vec<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
struct TemplateLibraryRecord {
    templates: Vec<TemplateRecord>,
    #[serde(default)]
    k_corrections: Vec<KCorrectionRecord>,
}

fn finite_polynomial(
    coefficients: Vec<f64>,
    context: impl FnOnce() -> String,
) -> Result<Polynomial, TemplateError> {
    let poly = Polynomial::new(coefficients);
    if poly.is_finite() {
        Ok(poly)
    } else {
        Err(TemplateError::NonFiniteCoefficients(context()))
    }
}

impl TemplateRecord {
    fn into_template(self) -> Result<TransientTemplate, TemplateError> {
        if !self.end_of_light_curve_day.is_finite() || self.end_of_light_curve_day <= 0.0 {
            return Err(TemplateError::InvalidEndDay {
                name: self.name,
                day: self.end_of_light_curve_day,
            });
        }

        let mut filters = BTreeMap::new();
        for (filter, record) in self.filters {
            let Some(coefficients) = record.coefficients else {
                debug!("Template {} has no fitted curve in {}", self.name, filter);
                filters.insert(filter, None);
                continue;
            };

            let missing = |field| TemplateError::MissingField {
                name: self.name.clone(),
                filter: filter.clone(),
                field,
            };
            let peak_magnitude = record.peak_magnitude.ok_or_else(|| missing("peak_magnitude"))?;
            let explosion_day = record.explosion_day.ok_or_else(|| missing("explosion_day"))?;

            if !explosion_day.is_finite() || explosion_day > 0.0 {
                return Err(TemplateError::InvalidExplosionDay {
                    name: self.name.clone(),
                    filter,
                    day: explosion_day,
                });
            }

            let raw = finite_polynomial(coefficients, || {
                format!("template {} {}", self.name, filter)
            })?;
            filters.insert(
                filter,
                Some(RestFrameCurve {
                    curve: raw.offset(-peak_magnitude),
                    explosion_day,
                }),
            );
        }

        Ok(TransientTemplate {
            name: self.name,
            end_of_light_curve_day: self.end_of_light_curve_day,
            filters,
        })
    }
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a template library from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let json = fs::read_to_string(path.as_ref())?;
        let library = Self::from_json_str(&json)?;
        info!(
            "Loaded {} templates and {} k-corrections from {}",
            library.templates.len(),
            library.k_corrections.len(),
            path.as_ref().display()
        );
        Ok(library)
    }

    pub fn from_json_str(json: &str) -> Result<Self, TemplateError> {
        let record: TemplateLibraryRecord = serde_json::from_str(json)?;

        let mut library = TemplateLibrary::new();
        for template in record.templates {
            library.insert_template(template.into_template()?)?;
        }

        for k in record.k_corrections {
            if !k.redshift.is_finite() {
                return Err(TemplateError::InvalidRedshift(k.redshift));
            }
            let correction = finite_polynomial(k.coefficients, || {
                format!(
                    "k-correction {} z={} {}->{}",
                    k.transient_type, k.redshift, k.rest_filter, k.observed_filter
                )
            })?;
            library.k_corrections.insert(
                &k.transient_type,
                k.redshift,
                &k.rest_filter,
                &k.observed_filter,
                correction,
            );
        }

        Ok(library)
    }

    pub fn insert_template(&mut self, template: TransientTemplate) -> Result<(), TemplateError> {
        if self.templates.contains_key(&template.name) {
            return Err(TemplateError::DuplicateTemplate(template.name));
        }
        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    pub fn template(&self, name: &str) -> Option<&TransientTemplate> {
        self.templates.get(name)
    }

    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Every configured type must have a template.
    pub fn check_types(&self, types: &[TransientTypeSettings]) -> Result<(), TemplateError> {
        match types.iter().find(|t| !self.templates.contains_key(&t.name)) {
            Some(missing) => Err(TemplateError::UnknownType(missing.name.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    pub(crate) const EXAMPLE_LIBRARY: &str = r#"{
      "templates": [
        {
          "name": "slow",
          "end_of_light_curve_day": 150.0,
          "filters": {
            "g": { "coefficients": [-19.8, 0.0, 0.0004], "peak_magnitude": -19.8,
                   "explosion_day": -40.0 },
            "u": { "coefficients": null }
          }
        },
        {
          "name": "fast",
          "end_of_light_curve_day": 60.0,
          "filters": {
            "g": { "coefficients": [-19.0, 0.0, 0.002], "peak_magnitude": -19.0,
                   "explosion_day": -15.0 }
          }
        }
      ],
      "k_corrections": [
        { "transient_type": "slow", "redshift": 0.1, "rest_filter": "g",
          "observed_filter": "r", "coefficients": [0.1, 0.001] }
      ]
    }"#;

    pub(crate) fn example_library() -> TemplateLibrary {
        TemplateLibrary::from_json_str(EXAMPLE_LIBRARY).unwrap()
    }

    #[test]
    fn test_parse_library() {
        let library = TemplateLibrary::from_json_str(EXAMPLE_LIBRARY).unwrap();
        let names: Vec<&str> = library.template_names().collect();
        assert_eq!(names, vec!["fast", "slow"]);
        assert_eq!(library.k_corrections.len(), 1);

        let slow = library.template("slow").unwrap();
        assert_eq!(slow.end_of_light_curve_day, 150.0);
        assert_eq!(slow.filters.get("u"), Some(&None));
    }

    #[test]
    fn test_template_is_peak_normalised() {
        let library = TemplateLibrary::from_json_str(EXAMPLE_LIBRARY).unwrap();
        let g = library.template("slow").unwrap().filters["g"].as_ref().unwrap();
        assert_relative_eq!(g.curve.evaluate(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(g.curve.evaluate(10.0), 0.04, epsilon = 1e-12);
        assert_eq!(g.explosion_day, -40.0);
    }

    #[test]
    fn test_kcorrection_lookup_by_rounded_redshift() {
        let library = TemplateLibrary::from_json_str(EXAMPLE_LIBRARY).unwrap();
        let k = &library.k_corrections;
        assert!(k.get("slow", 0.1, "g", "r").is_some());
        // Grid arithmetic noise still hits the same key
        assert!(k.get("slow", 0.30000000000000004 - 0.2, "g", "r").is_some());
        assert!(k.get("slow", 0.2, "g", "r").is_none());
        assert!(k.get("slow", 0.1, "g", "i").is_none());
        assert!(k.get("fast", 0.1, "g", "r").is_none());
    }

    #[test]
    fn test_positive_explosion_day_rejected() {
        let json = EXAMPLE_LIBRARY.replace("\"explosion_day\": -15.0", "\"explosion_day\": 3.0");
        assert!(matches!(
            TemplateLibrary::from_json_str(&json),
            Err(TemplateError::InvalidExplosionDay { .. })
        ));
    }

    #[test]
    fn test_non_positive_end_day_rejected() {
        let json = EXAMPLE_LIBRARY.replace(
            "\"end_of_light_curve_day\": 60.0",
            "\"end_of_light_curve_day\": 0.0",
        );
        assert!(matches!(
            TemplateLibrary::from_json_str(&json),
            Err(TemplateError::InvalidEndDay { .. })
        ));
    }

    #[test]
    fn test_missing_peak_magnitude_rejected() {
        let json = EXAMPLE_LIBRARY.replace("\"peak_magnitude\": -19.0,", "");
        assert!(matches!(
            TemplateLibrary::from_json_str(&json),
            Err(TemplateError::MissingField {
                field: "peak_magnitude",
                ..
            })
        ));
    }

    #[test]
    fn test_check_types() {
        let library = TemplateLibrary::from_json_str(EXAMPLE_LIBRARY).unwrap();
        let mut types = vec![TransientTypeSettings {
            name: "slow".to_string(),
            relative_rate: 1.0,
            peak_magnitude_mean: -20.0,
            peak_magnitude_sigma: 0.1,
        }];
        assert!(library.check_types(&types).is_ok());

        types[0].name = "unknown".to_string();
        assert!(matches!(
            library.check_types(&types),
            Err(TemplateError::UnknownType(_))
        ));
    }

    #[test]
    fn test_duplicate_template_rejected() {
        let mut library = TemplateLibrary::from_json_str(EXAMPLE_LIBRARY).unwrap();
        let again = library.template("fast").unwrap().clone();
        assert!(matches!(
            library.insert_template(again),
            Err(TemplateError::DuplicateTemplate(_))
        ));
    }
}
