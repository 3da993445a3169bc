//! Sorting discovered objects by whether they are useful for follow-up.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cadence::SURVEY_YEAR_DAYS;
use super::discovery::{CampaignLengthRecord, DiscoveryRecord};
use crate::config::SurveyConstraints;

/// Final category of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    /// Not discovered in any filter
    Undiscovered,
    /// Discovered but never bright enough to classify
    TooFaint,
    /// Discovered but not observable long enough for a campaign
    ShortCampaign,
    /// Discovered with a usable follow-up window
    Discovered,
}

/// Category of a single discovered filter.
fn classify_filter(
    survey_day: f64,
    peak_magnitude: Option<f64>,
    campaign_days: f64,
    max_campaign_days: f64,
    constraints: &SurveyConstraints,
    observable_fraction: f64,
) -> Outcome {
    let min_days = constraints.min_campaign_days;
    match peak_magnitude {
        Some(peak) if peak < constraints.faint_magnitude_limit => {}
        _ => return Outcome::TooFaint,
    }

    if max_campaign_days < min_days {
        return Outcome::ShortCampaign;
    }
    // Enough season left after discovery
    if SURVEY_YEAR_DAYS * observable_fraction - survey_day > min_days {
        return Outcome::Discovered;
    }
    // Or the campaign carries over into the next season
    if campaign_days - (SURVEY_YEAR_DAYS - survey_day) > min_days {
        return Outcome::Discovered;
    }
    Outcome::ShortCampaign
}

/// Puts an object into exactly one [`Outcome`].
///
/// Any filter classified `Discovered` wins, then `ShortCampaign`, then
/// `TooFaint`.
pub fn classify(
    discovery: &DiscoveryRecord,
    campaign: &CampaignLengthRecord,
    peak_magnitudes: &BTreeMap<String, Option<f64>>,
    constraints: &SurveyConstraints,
    observable_fraction: f64,
) -> Outcome {
    if !discovery.any {
        return Outcome::Undiscovered;
    }

    discovery
        .filters
        .iter()
        .filter_map(|(name, d)| d.survey_day().map(|day| (name, day)))
        .map(|(name, day)| {
            classify_filter(
                day as f64,
                peak_magnitudes.get(name).copied().flatten(),
                campaign.filters.get(name).copied().unwrap_or(0.0),
                campaign.max,
                constraints,
                observable_fraction,
            )
        })
        .max()
        .unwrap_or(Outcome::Undiscovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::discovery::{FilterDiscovery, MissReason};

    fn constraints() -> SurveyConstraints {
        SurveyConstraints {
            faint_magnitude_limit: 21.5,
            min_campaign_days: 20.0,
        }
    }

    type Inputs = (
        DiscoveryRecord,
        CampaignLengthRecord,
        BTreeMap<String, Option<f64>>,
    );

    fn single(survey_day: u32, peak: f64, campaign: f64) -> Inputs {
        let mut d = BTreeMap::new();
        d.insert(
            "g".to_string(),
            FilterDiscovery::Discovered {
                survey_day,
                light_curve_day: 0.0,
            },
        );
        let mut c = BTreeMap::new();
        c.insert("g".to_string(), campaign);
        let mut p = BTreeMap::new();
        p.insert("g".to_string(), Some(peak));
        (DiscoveryRecord::new(d), CampaignLengthRecord::new(c), p)
    }

    #[test]
    fn test_undiscovered() {
        let mut d = BTreeMap::new();
        d.insert("g".to_string(), FilterDiscovery::Missed(MissReason::PeakTooFaint));
        let record = DiscoveryRecord::new(d);
        let campaign = CampaignLengthRecord::new(BTreeMap::new());
        assert_eq!(
            classify(&record, &campaign, &BTreeMap::new(), &constraints(), 0.5),
            Outcome::Undiscovered
        );
    }

    #[test]
    fn test_too_faint() {
        let (d, c, p) = single(10, 21.5, 100.0);
        assert_eq!(classify(&d, &c, &p, &constraints(), 0.5), Outcome::TooFaint);
    }

    #[test]
    fn test_short_campaign() {
        let (d, c, p) = single(10, 20.0, 15.0);
        assert_eq!(classify(&d, &c, &p, &constraints(), 0.5), Outcome::ShortCampaign);
    }

    #[test]
    fn test_discovered_early_in_season() {
        let (d, c, p) = single(10, 20.0, 30.0);
        assert_eq!(classify(&d, &c, &p, &constraints(), 0.5), Outcome::Discovered);
    }

    #[test]
    fn test_late_discovery_needs_carry_over() {
        // Season ends at 175.8; discovered on 170 with a 30 day campaign
        let (d, c, p) = single(170, 20.0, 30.0);
        assert_eq!(classify(&d, &c, &p, &constraints(), 0.5), Outcome::ShortCampaign);

        // A campaign long enough to reach the next season
        let (d, c, p) = single(170, 20.0, 250.0);
        assert_eq!(classify(&d, &c, &p, &constraints(), 0.5), Outcome::Discovered);
    }

    #[test]
    fn test_best_filter_wins() {
        let (mut d, mut c, mut p) = single(10, 22.0, 40.0);
        d.filters.insert(
            "r".to_string(),
            FilterDiscovery::Discovered {
                survey_day: 12,
                light_curve_day: 0.0,
            },
        );
        c.filters.insert("r".to_string(), 40.0);
        p.insert("r".to_string(), Some(20.0));
        assert_eq!(classify(&d, &c, &p, &constraints(), 0.5), Outcome::Discovered);
    }
}
