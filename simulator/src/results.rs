//! Result bundle written at the end of a run, and its Markdown summary.
//!
//! The bundle echoes the settings and seed so that any run can be reproduced,
//! keeps the cadence table and one [`ObjectRecord`] per simulated transient,
//! and carries the aggregated annual rates.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SimulationSettings;
use crate::cosmology::CosmologyError;
use crate::photometry::ObservedLightCurve;
use crate::population::SampledObject;
use crate::survey::discovery::FilterDetail;
use crate::survey::{
    CadenceTable, CampaignLengthRecord, DiscoveryRecord, FilterDiscovery, MissReason,
    ObjectDiscovery, Outcome, RateModel, RateSummary,
};

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("Failed to access results file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to (de)serialize results: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to recompute rates: {0}")]
    Cosmology(#[from] CosmologyError),
}

/// Everything recorded about one simulated transient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub index: usize,
    pub redshift: f64,
    pub transient_type: String,
    pub peak_absolute_magnitude: f64,
    pub host_ebv: f64,
    pub galactic_ebv: f64,
    /// Observed-frame explosion day relative to peak
    pub explosion_day: f64,
    /// Observed-frame end of the light curve relative to peak
    pub end_day: f64,
    pub first_visible_day: f64,
    pub discovery: DiscoveryRecord,
    pub campaign: CampaignLengthRecord,
    pub filters: BTreeMap<String, FilterDetail>,
    pub outcome: Outcome,
}

impl ObjectRecord {
    pub fn new(
        object: &SampledObject,
        light_curve: &ObservedLightCurve,
        discovery: ObjectDiscovery,
        outcome: Outcome,
    ) -> Self {
        Self {
            index: object.index,
            redshift: object.redshift,
            transient_type: object.transient_type.clone(),
            peak_absolute_magnitude: object.peak_absolute_magnitude,
            host_ebv: object.host_ebv,
            galactic_ebv: object.galactic_ebv,
            explosion_day: light_curve.explosion_day,
            end_day: light_curve.end_day,
            first_visible_day: discovery.first_visible_day,
            discovery: discovery.record,
            campaign: discovery.campaign,
            filters: discovery.details,
            outcome,
        }
    }

    /// True if the rise could not be located in at least one filter.
    pub fn is_indeterminate(&self) -> bool {
        self.discovery
            .filters
            .values()
            .any(|d| *d == FilterDiscovery::Missed(MissReason::Indeterminate))
    }
}

/// Complete output of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub settings: SimulationSettings,
    /// Base seed every random stream of the run was derived from
    pub seed: u64,
    /// RFC 3339 time the run finished
    pub generated_at: String,
    pub cadence: CadenceTable,
    pub objects: Vec<ObjectRecord>,
    pub rates: RateSummary,
    /// Objects with at least one filter whose rise could not be located
    pub indeterminate_count: usize,
}

impl ResultBundle {
    /// Save to a pretty-printed JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ResultsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ResultsError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Number of objects in each outcome category.
    pub fn outcome_counts(&self) -> BTreeMap<Outcome, usize> {
        let mut counts = BTreeMap::new();
        for object in &self.objects {
            *counts.entry(object.outcome).or_insert(0) += 1;
        }
        counts
    }

    /// Re-runs the rate aggregation over the stored objects.
    pub fn recompute_rates(&self) -> Result<RateSummary, ResultsError> {
        let model = RateModel {
            cosmology: &self.settings.cosmology,
            redshift: &self.settings.redshift,
            rates: &self.settings.rates,
            sky_area_sq_deg: self.settings.survey.sky_area_sq_deg,
        };
        let classified: Vec<(f64, Outcome)> =
            self.objects.iter().map(|o| (o.redshift, o.outcome)).collect();
        Ok(model.aggregate(&classified)?)
    }

    /// Markdown log of the run's settings and results.
    pub fn summary_markdown(&self) -> String {
        struct Markdown<'a>(&'a ResultBundle);

        impl fmt::Display for Markdown<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.write_summary(f)
            }
        }

        Markdown(self).to_string()
    }

    /// Writes the Markdown log into `out`.
    pub fn write_summary<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let settings = &self.settings;

        writeln!(out, "# Transient survey simulation\n")?;
        writeln!(out, "- Generated: {}", self.generated_at)?;
        writeln!(out, "- Seed: {}", self.seed)?;
        writeln!(out, "- Objects simulated: {}", self.objects.len())?;
        writeln!(
            out,
            "- Redshift range: {} to {} in steps of {}",
            settings.redshift.lower, settings.redshift.upper, settings.redshift.resolution
        )?;
        writeln!(
            out,
            "- Cosmology: H0 = {}, Omega_m = {}, Omega_Lambda = {}\n",
            settings.cosmology.hubble_constant,
            settings.cosmology.omega_matter,
            settings.cosmology.omega_lambda
        )?;

        writeln!(out, "## Filters\n")?;
        writeln!(out, "| Filter | Limiting magnitude | Epochs | Discovered |")?;
        writeln!(out, "|---|---|---|---|")?;
        for filter in &settings.filters {
            let epochs = self.cadence.days(&filter.name).map_or(0, <[u32]>::len);
            let discovered = self
                .objects
                .iter()
                .filter(|o| {
                    o.discovery
                        .filters
                        .get(&filter.name)
                        .is_some_and(FilterDiscovery::is_discovered)
                })
                .count();
            writeln!(
                out,
                "| {} | {:.2} | {} | {} |",
                filter.name, filter.limiting_magnitude, epochs, discovered
            )?;
        }

        writeln!(out, "\n## Transient types\n")?;
        writeln!(out, "| Type | Relative rate | Peak magnitude | Sigma | Simulated |")?;
        writeln!(out, "|---|---|---|---|---|")?;
        for t in &settings.transient_types {
            let simulated = self
                .objects
                .iter()
                .filter(|o| o.transient_type == t.name)
                .count();
            writeln!(
                out,
                "| {} | {:.3} | {:.2} | {:.2} | {} |",
                t.name, t.relative_rate, t.peak_magnitude_mean, t.peak_magnitude_sigma, simulated
            )?;
        }

        writeln!(out, "\n## Survey constraints\n")?;
        writeln!(
            out,
            "- Faint limit on peak magnitude: {:.2}",
            settings.constraints.faint_magnitude_limit
        )?;
        writeln!(
            out,
            "- Minimum campaign length: {} days",
            settings.constraints.min_campaign_days
        )?;
        writeln!(
            out,
            "- Observable fraction of year: {}",
            settings.survey.observable_fraction
        )?;
        writeln!(
            out,
            "- Weather loss fraction: {}",
            settings.survey.weather_loss_fraction
        )?;
        writeln!(
            out,
            "- Sky area: {} square degrees",
            settings.survey.sky_area_sq_deg
        )?;

        writeln!(out, "\n## Outcomes\n")?;
        let counts = self.outcome_counts();
        for outcome in [
            Outcome::Discovered,
            Outcome::ShortCampaign,
            Outcome::TooFaint,
            Outcome::Undiscovered,
        ] {
            writeln!(
                out,
                "- {:?}: {}",
                outcome,
                counts.get(&outcome).copied().unwrap_or(0)
            )?;
        }
        writeln!(out, "- Indeterminate: {}", self.indeterminate_count)?;

        writeln!(out, "\n## Annual rates\n")?;
        writeln!(out, "- Discovered: {:.2} per year", self.rates.total_rate)?;
        writeln!(out, "- Too faint: {:.2} per year", self.rates.too_faint_rate)?;
        writeln!(
            out,
            "- Short campaign: {:.2} per year\n",
            self.rates.short_campaign_rate
        )?;
        writeln!(
            out,
            "| Shell | Objects | Expected rate | Discovered fraction | Discovered rate |"
        )?;
        writeln!(out, "|---|---|---|---|---|")?;
        for shell in &self.rates.shells {
            writeln!(
                out,
                "| {:.3}-{:.3} | {} | {:.3} | {:.3} | {:.3} |",
                shell.z_low,
                shell.z_high,
                shell.object_count,
                shell.volumetric_rate,
                shell.discovered_fraction,
                shell.discovered_rate
            )?;
        }

        Ok(())
    }
}

/// File stem `simulation_results_<YYYYMMDDtHHMMSS>` for a run finishing at `timestamp`.
pub fn result_file_stem<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("simulation_results_{}", timestamp.format("%Y%m%dt%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::example_settings;
    use chrono::Utc;

    fn record(
        index: usize,
        redshift: f64,
        outcome: Outcome,
        discovery: FilterDiscovery,
    ) -> ObjectRecord {
        let mut filters = BTreeMap::new();
        filters.insert("g".to_string(), discovery);
        let mut campaign = BTreeMap::new();
        campaign.insert("g".to_string(), 12.5);
        let mut details = BTreeMap::new();
        details.insert(
            "g".to_string(),
            FilterDetail {
                peak_magnitude: Some(20.0),
                ripe_day: Some(-5.0),
                fade_day: None,
            },
        );
        ObjectRecord {
            index,
            redshift,
            transient_type: "slow".to_string(),
            peak_absolute_magnitude: -19.5,
            host_ebv: 0.0,
            galactic_ebv: 0.02,
            explosion_day: -44.0,
            end_day: 165.0,
            first_visible_day: 3.5,
            discovery: DiscoveryRecord::new(filters),
            campaign: CampaignLengthRecord::new(campaign),
            filters: details,
            outcome,
        }
    }

    fn bundle() -> ResultBundle {
        let discovered = FilterDiscovery::Discovered {
            survey_day: 5,
            light_curve_day: -3.0,
        };
        let objects = vec![
            record(0, 0.1, Outcome::Discovered, discovered),
            record(1, 0.15, Outcome::ShortCampaign, discovered),
            record(
                2,
                0.55,
                Outcome::Undiscovered,
                FilterDiscovery::Missed(MissReason::Indeterminate),
            ),
        ];
        let mut days = BTreeMap::new();
        days.insert("g".to_string(), vec![1, 5, 9]);
        let mut bundle = ResultBundle {
            settings: example_settings(),
            seed: 42,
            generated_at: "2026-01-01T00:00:00+00:00".to_string(),
            cadence: CadenceTable::from_days(days).unwrap(),
            objects,
            rates: RateSummary {
                shells: Vec::new(),
                total_rate: 0.0,
                too_faint_rate: 0.0,
                short_campaign_rate: 0.0,
            },
            indeterminate_count: 1,
        };
        bundle.rates = bundle.recompute_rates().unwrap();
        bundle
    }

    #[test]
    fn test_save_and_reload() {
        let bundle = bundle();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        bundle.save_to_file(&path).unwrap();

        let loaded = ResultBundle::load_from_file(&path).unwrap();
        assert_eq!(loaded.seed, 42);
        assert_eq!(loaded.objects.len(), 3);
        assert_eq!(loaded.objects[2].outcome, Outcome::Undiscovered);
        assert_eq!(loaded.cadence, bundle.cadence);
        assert_eq!(loaded.rates.shells.len(), bundle.rates.shells.len());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ResultBundle::load_from_file("no/such/results.json"),
            Err(ResultsError::Io(_))
        ));
    }

    #[test]
    fn test_indeterminate_objects_flagged() {
        let bundle = bundle();
        let flagged: Vec<bool> = bundle
            .objects
            .iter()
            .map(ObjectRecord::is_indeterminate)
            .collect();
        assert_eq!(flagged, vec![false, false, true]);
    }

    #[test]
    fn test_recomputed_rates_use_stored_outcomes() {
        let bundle = bundle();
        let rates = bundle.recompute_rates().unwrap();
        assert_eq!(rates.shells.len(), 10);
        // Objects at 0.1 and 0.15 fall into the first two shells
        assert_eq!(rates.shells[0].object_count, 1);
        assert_eq!(rates.shells[0].discovered_fraction, 1.0);
        assert_eq!(rates.shells[1].short_campaign_fraction, 1.0);
        assert_eq!(rates.shells[5].discovered_fraction, 0.0);
        assert!(rates.total_rate > 0.0);
    }

    #[test]
    fn test_summary_contains_tables() {
        let summary = bundle().summary_markdown();
        assert!(summary.contains("| g | 23.00 | 3 | 2 |"), "{summary}");
        assert!(summary.contains("| slow | 0.300"), "{summary}");
        assert!(summary.contains("- Indeterminate: 1"));
        assert!(summary.contains("## Annual rates"));
    }

    #[test]
    fn test_result_file_stem() {
        let timestamp = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(result_file_stem(&timestamp), "simulation_results_20260314t150926");
    }
}
