//! Discovery and follow-up campaign state machine.
//!
//! For every filter an object walks
//! `Ripe -> AwaitingEpoch -> Discovered -> Observing -> Faded`,
//! or drops out into `Undiscoverable` with a reason. Days on the light curve
//! are observed-frame days relative to peak. Days on the cadence are survey
//! days in `1..=year`, and the mapping between them is fixed by the first
//! visible day drawn for the object.

use std::collections::BTreeMap;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use survey_math::Polynomial;

use super::cadence::{CadenceTable, SURVEY_YEAR_DAYS};
use super::threshold::{fade_day, ripe_day, Crossing};
use crate::config::ObservedFilter;
use crate::photometry::{FilterCurve, ObservedLightCurve, UndetectableReason};

/// Why an object was not discovered in a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissReason {
    /// No observed-frame curve in this filter
    Undetectable(UndetectableReason),
    /// Peak is not strictly brighter than the limiting magnitude
    PeakTooFaint,
    /// The rise could not be located reliably
    Indeterminate,
    /// The filter has no observation epochs
    NoCadence,
    /// The object faded before the first epoch after it became ripe
    FadedBeforeEpoch,
}

/// Per-filter discovery outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterDiscovery {
    Discovered {
        /// Cadence day of the first detection
        survey_day: u32,
        /// Light-curve day of the first detection
        light_curve_day: f64,
    },
    Missed(MissReason),
}

impl FilterDiscovery {
    pub fn is_discovered(&self) -> bool {
        matches!(self, FilterDiscovery::Discovered { .. })
    }

    pub fn survey_day(&self) -> Option<u32> {
        match self {
            FilterDiscovery::Discovered { survey_day, .. } => Some(*survey_day),
            FilterDiscovery::Missed(_) => None,
        }
    }
}

/// First detection of an object in one filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub survey_day: u32,
    pub light_curve_day: f64,
}

/// Discovery states for one object in one filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiscoveryState {
    /// Terminal: never discovered in this filter
    Undiscoverable(MissReason),
    /// Curve has crossed the limit on this light-curve day
    Ripe { ripe_day: f64 },
    /// Waiting for the next cadence epoch
    AwaitingEpoch {
        epoch_index: usize,
        survey_day: u32,
        light_curve_day: f64,
    },
    /// Detected at the given epoch
    Discovered {
        detection: Detection,
        epoch_index: usize,
    },
    /// Re-observed at `epoch_index`, still brighter than the limit
    Observing {
        detection: Detection,
        epoch_index: usize,
        light_curve_day: f64,
        campaign_days: f64,
    },
    /// Terminal: the first epoch at which the object was no longer observable
    Faded {
        detection: Detection,
        campaign_days: f64,
    },
}

/// Everything the state machine needs for one filter.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub curve: &'a Polynomial,
    pub limiting_magnitude: f64,
    pub explosion_day: f64,
    pub end_day: f64,
    pub cadence: &'a [u32],
    /// Survey day on which the object's explosion epoch lines up, in `[0, year)`
    pub first_visible_day: f64,
}

impl FilterContext<'_> {
    fn observable(&self, light_curve_day: f64) -> bool {
        self.curve.evaluate(light_curve_day) < self.limiting_magnitude
            && light_curve_day < self.end_day
    }
}

/// Index of the first epoch on or after `day` and the wait until it.
///
/// When no epoch remains this year, wraps to the first epoch of the next year.
/// Returns `None` for an empty cadence.
pub fn next_epoch(cadence: &[u32], day: f64) -> Option<(usize, f64)> {
    let first = *cadence.first()?;
    match cadence.iter().position(|&d| d as f64 >= day) {
        Some(i) => Some((i, cadence[i] as f64 - day)),
        None => Some((0, SURVEY_YEAR_DAYS + first as f64 - day)),
    }
}

/// Light-curve days between epoch `index` and the following one, wrapping the year.
fn advance(cadence: &[u32], index: usize) -> (usize, f64) {
    let last = cadence.len() - 1;
    if index < last {
        (index + 1, (cadence[index + 1] - cadence[index]) as f64)
    } else {
        (0, SURVEY_YEAR_DAYS + cadence[0] as f64 - cadence[last] as f64)
    }
}

impl DiscoveryState {
    /// Initial state from the threshold search.
    pub fn start(ctx: &FilterContext<'_>) -> Self {
        match ripe_day(ctx.curve, ctx.limiting_magnitude, ctx.explosion_day) {
            Crossing::At(ripe_day) => DiscoveryState::Ripe { ripe_day },
            Crossing::NotReached => DiscoveryState::Undiscoverable(MissReason::PeakTooFaint),
            Crossing::Indeterminate { .. } => {
                DiscoveryState::Undiscoverable(MissReason::Indeterminate)
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DiscoveryState::Undiscoverable(_) | DiscoveryState::Faded { .. }
        )
    }

    /// Advances one transition. Terminal states return themselves.
    pub fn step(self, ctx: &FilterContext<'_>) -> Self {
        match self {
            DiscoveryState::Undiscoverable(_) | DiscoveryState::Faded { .. } => self,
            DiscoveryState::Ripe { ripe_day } => {
                match next_epoch(ctx.cadence, ctx.first_visible_day) {
                    None => DiscoveryState::Undiscoverable(MissReason::NoCadence),
                    Some((epoch_index, waiting_days)) => DiscoveryState::AwaitingEpoch {
                        epoch_index,
                        survey_day: ctx.cadence[epoch_index],
                        light_curve_day: ripe_day + waiting_days,
                    },
                }
            }
            DiscoveryState::AwaitingEpoch {
                epoch_index,
                survey_day,
                light_curve_day,
            } => {
                if ctx.observable(light_curve_day) {
                    DiscoveryState::Discovered {
                        detection: Detection {
                            survey_day,
                            light_curve_day,
                        },
                        epoch_index,
                    }
                } else {
                    DiscoveryState::Undiscoverable(MissReason::FadedBeforeEpoch)
                }
            }
            DiscoveryState::Discovered {
                detection,
                epoch_index,
            } => DiscoveryState::Observing {
                detection,
                epoch_index,
                light_curve_day: detection.light_curve_day,
                campaign_days: 0.0,
            },
            DiscoveryState::Observing {
                detection,
                epoch_index,
                light_curve_day,
                campaign_days,
            } => {
                let (next_index, gap) = advance(ctx.cadence, epoch_index);
                let next_day = light_curve_day + gap;
                if ctx.observable(next_day) {
                    DiscoveryState::Observing {
                        detection,
                        epoch_index: next_index,
                        light_curve_day: next_day,
                        campaign_days: campaign_days + gap,
                    }
                } else {
                    DiscoveryState::Faded {
                        detection,
                        campaign_days,
                    }
                }
            }
        }
    }

    /// Runs the machine from [`start`](Self::start) to a terminal state.
    pub fn run(ctx: &FilterContext<'_>) -> Self {
        Self::start(ctx).finish(ctx)
    }

    /// Steps until a terminal state is reached.
    ///
    /// Every `Observing` step moves at least a fraction of a day forward and
    /// the end of the curve is finite, so this always terminates.
    pub fn finish(self, ctx: &FilterContext<'_>) -> Self {
        let mut state = self;
        while !state.is_terminal() {
            state = state.step(ctx);
        }
        state
    }

    /// Discovery outcome and campaign length of a terminal state.
    pub fn outcome(&self) -> (FilterDiscovery, f64) {
        match *self {
            DiscoveryState::Faded {
                detection,
                campaign_days,
            }
            | DiscoveryState::Observing {
                detection,
                campaign_days,
                ..
            } => (
                FilterDiscovery::Discovered {
                    survey_day: detection.survey_day,
                    light_curve_day: detection.light_curve_day,
                },
                campaign_days,
            ),
            DiscoveryState::Discovered { detection, .. } => (
                FilterDiscovery::Discovered {
                    survey_day: detection.survey_day,
                    light_curve_day: detection.light_curve_day,
                },
                0.0,
            ),
            DiscoveryState::Undiscoverable(reason) => (FilterDiscovery::Missed(reason), 0.0),
            DiscoveryState::Ripe { .. } | DiscoveryState::AwaitingEpoch { .. } => {
                (FilterDiscovery::Missed(MissReason::FadedBeforeEpoch), 0.0)
            }
        }
    }
}

/// Per filter discovery outcome plus the `any` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub filters: BTreeMap<String, FilterDiscovery>,
    pub any: bool,
}

impl DiscoveryRecord {
    pub fn new(filters: BTreeMap<String, FilterDiscovery>) -> Self {
        let any = filters.values().any(FilterDiscovery::is_discovered);
        Self { filters, any }
    }
}

/// Per filter campaign length in days plus the maximum over filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignLengthRecord {
    pub filters: BTreeMap<String, f64>,
    pub max: f64,
}

impl CampaignLengthRecord {
    pub fn new(filters: BTreeMap<String, f64>) -> Self {
        let max = filters.values().copied().fold(0.0, f64::max);
        Self { filters, max }
    }
}

/// Threshold days and apparent peak for one filter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterDetail {
    pub peak_magnitude: Option<f64>,
    pub ripe_day: Option<f64>,
    /// `None` when the object is still brighter than the limit at the end of the curve
    pub fade_day: Option<f64>,
}

/// Discovery results for one object across all filters.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDiscovery {
    pub first_visible_day: f64,
    pub record: DiscoveryRecord,
    pub campaign: CampaignLengthRecord,
    pub details: BTreeMap<String, FilterDetail>,
}

impl ObjectDiscovery {
    /// Apparent peak magnitude per filter, `None` where undetectable.
    pub fn peak_magnitudes(&self) -> BTreeMap<String, Option<f64>> {
        self.details
            .iter()
            .map(|(name, detail)| (name.clone(), detail.peak_magnitude))
            .collect()
    }
}

/// Uniform survey day on which the object's explosion epoch falls.
pub fn draw_first_visible_day<R: Rng>(rng: &mut R) -> f64 {
    rng.random::<f64>() * SURVEY_YEAR_DAYS
}

/// Runs the state machine in every filter for one object.
pub fn discover_object(
    light_curve: &ObservedLightCurve,
    filters: &[ObservedFilter],
    cadence: &CadenceTable,
    first_visible_day: f64,
) -> ObjectDiscovery {
    let mut discoveries = BTreeMap::new();
    let mut campaigns = BTreeMap::new();
    let mut details = BTreeMap::new();

    for filter in filters {
        let (discovery, campaign, detail) = match light_curve.filters.get(&filter.name) {
            Some(FilterCurve::Defined {
                curve,
                peak_magnitude,
            }) => {
                let ctx = FilterContext {
                    curve,
                    limiting_magnitude: filter.limiting_magnitude,
                    explosion_day: light_curve.explosion_day,
                    end_day: light_curve.end_day,
                    cadence: cadence.days(&filter.name).unwrap_or(&[]),
                    first_visible_day,
                };
                let start = DiscoveryState::start(&ctx);
                let ripe = match start {
                    DiscoveryState::Ripe { ripe_day } => Some(ripe_day),
                    _ => None,
                };
                let fade = ripe.and_then(|_| {
                    match fade_day(curve, filter.limiting_magnitude, light_curve.end_day) {
                        Crossing::At(day) => Some(day),
                        _ => None,
                    }
                });

                let (discovery, campaign) = start.finish(&ctx).outcome();
                if let FilterDiscovery::Missed(MissReason::Indeterminate) = discovery {
                    debug!("Filter {}: rise could not be located", filter.name);
                }

                (
                    discovery,
                    campaign,
                    FilterDetail {
                        peak_magnitude: Some(*peak_magnitude),
                        ripe_day: ripe,
                        fade_day: fade,
                    },
                )
            }
            Some(FilterCurve::Undetectable(reason)) => (
                FilterDiscovery::Missed(MissReason::Undetectable(*reason)),
                0.0,
                FilterDetail::default(),
            ),
            None => (
                FilterDiscovery::Missed(MissReason::Undetectable(
                    UndetectableReason::MissingTemplateCurve,
                )),
                0.0,
                FilterDetail::default(),
            ),
        };

        discoveries.insert(filter.name.clone(), discovery);
        campaigns.insert(filter.name.clone(), campaign);
        details.insert(filter.name.clone(), detail);
    }

    ObjectDiscovery {
        first_visible_day,
        record: DiscoveryRecord::new(discoveries),
        campaign: CampaignLengthRecord::new(campaigns),
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn every_ten_days() -> Vec<u32> {
        (1..=35).map(|k| k * 10).collect()
    }

    // Flat 20 mag from explosion to end: visible throughout
    fn flat() -> Polynomial {
        Polynomial::constant(20.0)
    }

    fn ctx<'a>(
        curve: &'a Polynomial,
        cadence: &'a [u32],
        visible: f64,
        end: f64,
    ) -> FilterContext<'a> {
        FilterContext {
            curve,
            limiting_magnitude: 22.0,
            explosion_day: -20.0,
            end_day: end,
            cadence,
            first_visible_day: visible,
        }
    }

    #[test]
    fn test_next_epoch_and_wrap() {
        let cadence = every_ten_days();
        assert_eq!(next_epoch(&cadence, 2.0), Some((0, 8.0)));
        assert_eq!(next_epoch(&cadence, 20.0), Some((1, 0.0)));
        let (index, wait) = next_epoch(&cadence, 351.0).unwrap();
        assert_eq!(index, 0);
        assert_relative_eq!(wait, 351.6 + 10.0 - 351.0, epsilon = 1e-9);
        assert_eq!(next_epoch(&[], 3.0), None);
    }

    #[test]
    fn test_discovery_day_is_first_epoch_after_visible_day() {
        let cadence = every_ten_days();
        let curve = flat();
        let c = ctx(&curve, &cadence, 2.0, 1000.0);

        let awaiting = DiscoveryState::Ripe { ripe_day: 5.0 }.step(&c);
        assert_eq!(
            awaiting,
            DiscoveryState::AwaitingEpoch {
                epoch_index: 0,
                survey_day: 10,
                light_curve_day: 13.0,
            }
        );
        match awaiting.step(&c) {
            DiscoveryState::Discovered { detection, .. } => assert_eq!(detection.survey_day, 10),
            other => panic!("expected discovery, got {other:?}"),
        }
    }

    #[test]
    fn test_campaign_accumulates_until_end_of_curve() {
        let cadence = every_ten_days();
        let curve = flat();
        // Already bright at explosion, so ripe = -20; visible day 5 -> epoch 10, wait 5
        let c = ctx(&curve, &cadence, 5.0, 60.0);
        let (discovery, campaign) = DiscoveryState::run(&c).outcome();
        assert_eq!(
            discovery,
            FilterDiscovery::Discovered {
                survey_day: 10,
                light_curve_day: -15.0
            }
        );
        // Epochs at lc days -15, -5, 5, ..., 55; the next one (65) is past the end
        assert_relative_eq!(campaign, 70.0);
    }

    #[test]
    fn test_campaign_wraps_year_boundary() {
        let cadence = vec![100, 340];
        let curve = flat();
        let c = ctx(&curve, &cadence, 300.0, 200.0);
        let (discovery, campaign) = DiscoveryState::run(&c).outcome();
        // Ripe -20, wait 40 -> detected at lc 20 on day 340; next epoch wraps to day 100
        assert_eq!(discovery.survey_day(), Some(340));
        let wrap_gap = 351.6 + 100.0 - 340.0;
        assert!(20.0 + wrap_gap < 200.0);
        assert_relative_eq!(campaign, wrap_gap, epsilon = 1e-9);
    }

    #[test]
    fn test_faded_before_first_epoch() {
        // m(t) = 21 + t / 10: brighter than 22 only before day 10
        let curve = Polynomial::new(vec![21.0, 0.1]);
        let cadence = vec![300];
        let c = ctx(&curve, &cadence, 0.0, 400.0);
        let (discovery, campaign) = DiscoveryState::run(&c).outcome();
        assert_eq!(discovery, FilterDiscovery::Missed(MissReason::FadedBeforeEpoch));
        assert_eq!(campaign, 0.0);
    }

    #[test]
    fn test_peak_equal_to_limit_is_missed() {
        let curve = Polynomial::constant(22.0);
        let cadence = every_ten_days();
        let c = ctx(&curve, &cadence, 0.0, 100.0);
        assert_eq!(
            DiscoveryState::run(&c),
            DiscoveryState::Undiscoverable(MissReason::PeakTooFaint)
        );
    }

    #[test]
    fn test_empty_cadence() {
        let curve = flat();
        let c = ctx(&curve, &[], 0.0, 100.0);
        assert_eq!(
            DiscoveryState::run(&c),
            DiscoveryState::Undiscoverable(MissReason::NoCadence)
        );
    }

    #[test]
    fn test_single_epoch_cadence_repeats_yearly() {
        let curve = flat();
        let cadence = vec![50];
        let c = ctx(&curve, &cadence, 0.0, 800.0);
        let (_, campaign) = DiscoveryState::run(&c).outcome();
        // Detected at lc 30, then 381.6 and 733.2; 1084.8 is past the end
        assert_relative_eq!(campaign, 2.0 * SURVEY_YEAR_DAYS, epsilon = 1e-9);
    }

    #[test]
    fn test_records() {
        let mut filters = BTreeMap::new();
        filters.insert("g".to_string(), FilterDiscovery::Missed(MissReason::PeakTooFaint));
        filters.insert(
            "r".to_string(),
            FilterDiscovery::Discovered {
                survey_day: 4,
                light_curve_day: -3.0,
            },
        );
        assert!(DiscoveryRecord::new(filters.clone()).any);
        filters.remove("r");
        assert!(!DiscoveryRecord::new(filters).any);

        let mut campaigns = BTreeMap::new();
        campaigns.insert("g".to_string(), 12.0);
        campaigns.insert("r".to_string(), 30.5);
        assert_eq!(CampaignLengthRecord::new(campaigns).max, 30.5);
        assert_eq!(CampaignLengthRecord::new(BTreeMap::new()).max, 0.0);
    }

    #[test]
    fn test_discover_object_mixes_filters() {
        let mut curves = BTreeMap::new();
        curves.insert(
            "g".to_string(),
            FilterCurve::Defined {
                curve: Polynomial::new(vec![20.0, 0.0, 0.001]),
                peak_magnitude: 20.0,
            },
        );
        curves.insert(
            "r".to_string(),
            FilterCurve::Undetectable(UndetectableReason::MissingKCorrection),
        );
        let lc = ObservedLightCurve {
            explosion_day: -30.0,
            end_day: 90.0,
            filters: curves,
        };
        let filters = vec![
            ObservedFilter {
                name: "g".to_string(),
                limiting_magnitude: 21.0,
                ebv_coefficient: 3.793,
            },
            ObservedFilter {
                name: "r".to_string(),
                limiting_magnitude: 21.0,
                ebv_coefficient: 2.751,
            },
        ];
        let mut days = BTreeMap::new();
        days.insert("g".to_string(), every_ten_days());
        days.insert("r".to_string(), every_ten_days());
        let cadence = CadenceTable::from_days(days).unwrap();

        let result = discover_object(&lc, &filters, &cadence, 1.0);
        assert!(result.record.any);
        assert_eq!(
            result.record.filters["r"],
            FilterDiscovery::Missed(MissReason::Undetectable(
                UndetectableReason::MissingKCorrection
            ))
        );
        let g = result.details["g"];
        // Already brighter than the limit at explosion
        assert_eq!(g.ripe_day, Some(-30.0));
        assert_relative_eq!(g.fade_day.unwrap(), 1000f64.sqrt(), epsilon = 0.25);
        // Detected at lc -21 on day 10, then every 10 days until 29
        assert_relative_eq!(result.campaign.filters["g"], 50.0, epsilon = 1e-9);
        assert_eq!(result.campaign.max, result.campaign.filters["g"]);

        let peaks = result.peak_magnitudes();
        assert_eq!(peaks["g"], Some(20.0));
        assert_eq!(peaks["r"], None);
    }
}
