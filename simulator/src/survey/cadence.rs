//! Observing cadence for one survey year.
//!
//! The survey year is twelve lunar months. In every month the last
//! `moon_loss_fraction` of days is lost to moonlight. Each filter is scheduled
//! every `repeat_every_days` from its first observation day up to the
//! observable part of the year, and each scheduled night independently
//! survives the weather with probability `1 - weather_loss_fraction`.

use std::collections::BTreeMap;

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{FilterSettings, SurveySettings};

pub const LUNAR_MONTH_DAYS: f64 = 29.3;
pub const SURVEY_YEAR_DAYS: f64 = 12.0 * LUNAR_MONTH_DAYS;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CadenceError {
    #[error("Cadence for filter '{0}' is not strictly increasing")]
    NotIncreasing(String),
    #[error("Cadence day {day} for filter '{filter}' is outside 1..={max}")]
    OutOfYear { filter: String, day: u32, max: u32 },
}

/// True if `day` falls in the moonlit tail of its lunar month.
pub fn is_moon_lost(day: u32, moon_loss_fraction: f64) -> bool {
    if moon_loss_fraction <= 0.0 {
        return false;
    }
    let phase = (day as f64 % LUNAR_MONTH_DAYS) / LUNAR_MONTH_DAYS;
    phase >= 1.0 - moon_loss_fraction
}

/// Observation days for one filter.
///
/// One weather draw is consumed per scheduled candidate, moonlit or not, so
/// the stream position depends only on the schedule.
pub fn filter_cadence<R: Rng>(
    rng: &mut R,
    filter: &FilterSettings,
    survey: &SurveySettings,
) -> Vec<u32> {
    let last_day = survey.observable_fraction * SURVEY_YEAR_DAYS;
    let mut days = Vec::new();
    let mut next = Some(filter.first_observation_day);

    while let Some(day) = next.filter(|&d| d as f64 <= last_day) {
        let weather: f64 = rng.random();
        if !is_moon_lost(day, filter.moon_loss_fraction)
            && weather > survey.weather_loss_fraction
        {
            days.push(day);
        }
        // Stops on overflow and on a zero interval
        next = day
            .checked_add(filter.repeat_every_days)
            .filter(|&d| d > day);
    }
    days
}

/// Per-filter observation days, shared read-only by every object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CadenceTable {
    days: BTreeMap<String, Vec<u32>>,
}

impl CadenceTable {
    /// Generates the table for all filters in configured order.
    pub fn generate<R: Rng>(
        rng: &mut R,
        filters: &[FilterSettings],
        survey: &SurveySettings,
    ) -> Self {
        let mut days = BTreeMap::new();
        for filter in filters {
            let sequence = filter_cadence(rng, filter, survey);
            debug!("Cadence for {}: {:?}", filter.name, sequence);
            info!("Filter {}: {} observation epochs", filter.name, sequence.len());
            days.insert(filter.name.clone(), sequence);
        }
        Self { days }
    }

    /// Builds a table from explicit day lists.
    pub fn from_days(days: BTreeMap<String, Vec<u32>>) -> Result<Self, CadenceError> {
        let max = SURVEY_YEAR_DAYS.floor() as u32;
        for (filter, sequence) in &days {
            if sequence.windows(2).any(|w| w[1] <= w[0]) {
                return Err(CadenceError::NotIncreasing(filter.clone()));
            }
            if let Some(&day) = sequence.iter().find(|&&d| d == 0 || d > max) {
                return Err(CadenceError::OutOfYear {
                    filter: filter.clone(),
                    day,
                    max,
                });
            }
        }
        Ok(Self { days })
    }

    pub fn days(&self, filter: &str) -> Option<&[u32]> {
        self.days.get(filter).map(Vec::as_slice)
    }

    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.days.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn survey(weather: f64) -> SurveySettings {
        SurveySettings {
            observable_fraction: 1.0,
            weather_loss_fraction: weather,
            sky_area_sq_deg: 10.0,
        }
    }

    fn filter(first: u32, repeat: u32, moon: f64) -> FilterSettings {
        FilterSettings {
            name: "g".to_string(),
            limiting_magnitude: 22.0,
            ebv_coefficient: None,
            first_observation_day: first,
            repeat_every_days: repeat,
            moon_loss_fraction: moon,
        }
    }

    #[test]
    fn test_year_length() {
        assert!((SURVEY_YEAR_DAYS - 351.6).abs() < 1e-9);
    }

    #[test]
    fn test_moon_loss_tail_of_month() {
        // Last 20% of a 29.3 day month starts at 23.44
        assert!(!is_moon_lost(23, 0.2));
        assert!(is_moon_lost(24, 0.2));
        assert!(is_moon_lost(29, 0.2));
        assert!(!is_moon_lost(30, 0.2));
        assert!(!is_moon_lost(29, 0.0));
    }

    #[test]
    fn test_clear_sky_cadence() {
        let mut rng = StdRng::seed_from_u64(0);
        let days = filter_cadence(&mut rng, &filter(10, 10, 0.0), &survey(0.0));
        let expected: Vec<u32> = (1..=35).map(|k| k * 10).collect();
        assert_eq!(days, expected);
    }

    #[test]
    fn test_observable_fraction_truncates() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut s = survey(0.0);
        s.observable_fraction = 0.5;
        let days = filter_cadence(&mut rng, &filter(1, 1, 0.0), &s);
        assert_eq!(days.first(), Some(&1));
        assert_eq!(days.last(), Some(&175));
    }

    #[test]
    fn test_moon_days_excluded() {
        let mut rng = StdRng::seed_from_u64(0);
        let days = filter_cadence(&mut rng, &filter(1, 1, 0.25), &survey(0.0));
        assert!(days.iter().all(|&d| !is_moon_lost(d, 0.25)));
        assert!(!days.contains(&28));
    }

    #[test]
    fn test_total_weather_loss() {
        let mut rng = StdRng::seed_from_u64(0);
        let days = filter_cadence(&mut rng, &filter(1, 3, 0.0), &survey(1.0));
        assert!(days.is_empty());
    }

    #[test]
    fn test_weather_loss_fraction_statistics() {
        let mut rng = StdRng::seed_from_u64(21);
        let days = filter_cadence(&mut rng, &filter(1, 1, 0.0), &survey(0.3));
        let kept = days.len() as f64 / 351.0;
        assert!((kept - 0.7).abs() < 0.08, "kept {kept}");
        assert!(days.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_seeded_generation_reproducible() {
        let filters = vec![filter(1, 3, 0.2), {
            let mut r = filter(2, 3, 0.2);
            r.name = "r".to_string();
            r
        }];
        let a = CadenceTable::generate(&mut StdRng::seed_from_u64(4), &filters, &survey(0.4));
        let b = CadenceTable::generate(&mut StdRng::seed_from_u64(4), &filters, &survey(0.4));
        assert_eq!(a, b);
        assert_eq!(a.filters().collect::<Vec<_>>(), vec!["g", "r"]);
    }

    #[test]
    fn test_huge_repeat_interval_yields_single_epoch() {
        let mut rng = StdRng::seed_from_u64(0);
        let days = filter_cadence(&mut rng, &filter(10, u32::MAX, 0.0), &survey(0.0));
        assert_eq!(days, vec![10]);

        let days = filter_cadence(&mut rng, &filter(u32::MAX, 5, 0.0), &survey(0.0));
        assert!(days.is_empty());
    }

    #[test]
    fn test_zero_repeat_interval_terminates() {
        let mut rng = StdRng::seed_from_u64(0);
        let days = filter_cadence(&mut rng, &filter(7, 0, 0.0), &survey(0.0));
        assert_eq!(days, vec![7]);
    }

    #[test]
    fn test_from_days_validation() {
        let mut days = BTreeMap::new();
        days.insert("g".to_string(), vec![10, 5]);
        assert!(matches!(
            CadenceTable::from_days(days.clone()),
            Err(CadenceError::NotIncreasing(_))
        ));

        days.insert("g".to_string(), vec![10, 400]);
        assert!(matches!(
            CadenceTable::from_days(days),
            Err(CadenceError::OutOfYear { day: 400, .. })
        ));
    }
}
