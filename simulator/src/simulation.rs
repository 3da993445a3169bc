//! One complete simulation run.
//!
//! A run samples the population, generates the cadence table, pushes every
//! object through the light-curve pipeline and the discovery state machine in
//! parallel, classifies it and finally aggregates annual rates per redshift
//! shell.
//!
//! All randomness derives from a single base seed. Population sampling and
//! cadence generation use their own streams, and each object gets a private
//! `StdRng` seeded from the base seed and its index, so results do not depend
//! on how rayon schedules the objects.

use std::collections::BTreeMap;

use chrono::Local;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{ConfigError, ObservedFilter, SimulationSettings};
use crate::cosmology::CosmologyError;
use crate::photometry::{LightCurvePipeline, TemplateError, TemplateLibrary};
use crate::population::{sample_population, PopulationError, SampledObject};
use crate::results::{ObjectRecord, ResultBundle};
use crate::survey::discovery::draw_first_visible_day;
use crate::survey::{classify, discover_object, CadenceTable, Outcome, RateModel};

/// Offset of the population sampling stream from the base seed.
pub const POPULATION_STREAM: u64 = 0x5EED_0001;
/// Offset of the cadence stream from the base seed.
pub const CADENCE_STREAM: u64 = 0x5EED_0002;
/// Offset of the first per-object stream; object `i` uses `OBJECT_STREAM + i`.
pub const OBJECT_STREAM: u64 = 0x5EED_1000_0000;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error("Population error: {0}")]
    Population(#[from] PopulationError),
    #[error("Cosmology error: {0}")]
    Cosmology(#[from] CosmologyError),
}

/// Seed of the random stream `stream` derived from `seed`.
pub fn stream_seed(seed: u64, stream: u64) -> u64 {
    seed.wrapping_add(stream)
}

/// Seed of the private stream of object `index`.
pub fn object_seed(seed: u64, index: usize) -> u64 {
    stream_seed(seed, OBJECT_STREAM).wrapping_add(index as u64)
}

/// A configured run over validated settings and a template library.
pub struct Simulation<'a> {
    settings: &'a SimulationSettings,
    library: &'a TemplateLibrary,
    filters: Vec<ObservedFilter>,
}

impl<'a> Simulation<'a> {
    /// Checks settings and templates against each other.
    pub fn new(
        settings: &'a SimulationSettings,
        library: &'a TemplateLibrary,
    ) -> Result<Self, SimulationError> {
        settings.validate()?;
        library.check_types(&settings.transient_types)?;
        let filters = settings.observed_filters()?;
        Ok(Self {
            settings,
            library,
            filters,
        })
    }

    /// Base seed of the run; drawn from the OS when the settings have none.
    pub fn resolve_seed(&self) -> u64 {
        match self.settings.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::rng().random();
                info!("No seed configured, using {seed}");
                seed
            }
        }
    }

    pub fn run(&self) -> Result<ResultBundle, SimulationError> {
        self.run_with_progress(None)
    }

    /// Runs the simulation, ticking `progress` once per simulated object.
    pub fn run_with_progress(
        &self,
        progress: Option<&ProgressBar>,
    ) -> Result<ResultBundle, SimulationError> {
        let seed = self.resolve_seed();
        info!(
            "Simulating {} objects with seed {}",
            self.settings.sample_number, seed
        );

        let mut population_rng = StdRng::seed_from_u64(stream_seed(seed, POPULATION_STREAM));
        let cosmology = &self.settings.cosmology;
        let population = sample_population(&mut population_rng, self.settings, cosmology)?;

        let mut cadence_rng = StdRng::seed_from_u64(stream_seed(seed, CADENCE_STREAM));
        let cadence = CadenceTable::generate(
            &mut cadence_rng,
            &self.settings.filters,
            &self.settings.survey,
        );

        let pipeline = LightCurvePipeline::new(
            cosmology,
            self.library,
            &self.filters,
            &self.settings.rest_frame_filter,
            self.settings.light_curve_poly_order,
        );

        let progress = progress.cloned().unwrap_or_else(ProgressBar::hidden);
        let objects = population
            .par_iter()
            .progress_with(progress)
            .map(|object| self.simulate_object(object, &pipeline, &cadence, seed))
            .collect::<Result<Vec<_>, _>>()?;

        let indeterminate_count = objects.iter().filter(|o| o.is_indeterminate()).count();
        if indeterminate_count > 0 {
            warn!(
                "{} objects had a rise that could not be located and count as undiscovered",
                indeterminate_count
            );
        }
        log_outcomes(&objects);

        let model = RateModel {
            cosmology,
            redshift: &self.settings.redshift,
            rates: &self.settings.rates,
            sky_area_sq_deg: self.settings.survey.sky_area_sq_deg,
        };
        let classified: Vec<(f64, Outcome)> =
            objects.iter().map(|o| (o.redshift, o.outcome)).collect();
        let rates = model.aggregate(&classified)?;

        Ok(ResultBundle {
            settings: self.settings.clone(),
            seed,
            generated_at: Local::now().to_rfc3339(),
            cadence,
            objects,
            rates,
            indeterminate_count,
        })
    }

    /// Light curve, discovery and classification of a single object.
    pub fn simulate_object(
        &self,
        object: &SampledObject,
        pipeline: &LightCurvePipeline<'_>,
        cadence: &CadenceTable,
        seed: u64,
    ) -> Result<ObjectRecord, CosmologyError> {
        let mut rng = StdRng::seed_from_u64(object_seed(seed, object.index));

        let light_curve = pipeline.transform(object)?;
        let first_visible_day = draw_first_visible_day(&mut rng);
        let discovery = discover_object(&light_curve, &self.filters, cadence, first_visible_day);

        let outcome = classify(
            &discovery.record,
            &discovery.campaign,
            &discovery.peak_magnitudes(),
            &self.settings.constraints,
            self.settings.survey.observable_fraction,
        );
        debug!(
            "Object {} ({} at z={:.3}): {:?}, max campaign {:.1} days",
            object.index, object.transient_type, object.redshift, outcome, discovery.campaign.max
        );

        Ok(ObjectRecord::new(object, &light_curve, discovery, outcome))
    }
}

fn log_outcomes(objects: &[ObjectRecord]) {
    let mut counts: BTreeMap<Outcome, usize> = BTreeMap::new();
    for object in objects {
        *counts.entry(object.outcome).or_insert(0) += 1;
    }
    for (outcome, count) in counts {
        info!("{:?}: {} of {}", outcome, count, objects.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::example_settings;
    use crate::photometry::template::tests::example_library;
    use crate::population::RedshiftGrid;
    use approx::assert_relative_eq;
    use survey_math::Polynomial;

    // Example library plus a zero k-correction for every type, grid redshift and filter
    fn complete_library(settings: &SimulationSettings) -> TemplateLibrary {
        let mut library = example_library();
        for z in RedshiftGrid::new(&settings.redshift).points() {
            for t in &settings.transient_types {
                for f in &settings.filters {
                    library.k_corrections.insert(
                        &t.name,
                        z,
                        &settings.rest_frame_filter,
                        &f.name,
                        Polynomial::zero(),
                    );
                }
            }
        }
        library
    }

    #[test]
    fn test_object_seeds_distinct_from_streams() {
        let seed = 42;
        assert_ne!(object_seed(seed, 0), stream_seed(seed, POPULATION_STREAM));
        assert_ne!(object_seed(seed, 0), stream_seed(seed, CADENCE_STREAM));
        assert_eq!(object_seed(seed, 3), object_seed(seed, 0) + 3);
    }

    #[test]
    fn test_seeded_run_is_reproducible() {
        let settings = example_settings();
        let library = example_library();
        let simulation = Simulation::new(&settings, &library).unwrap();

        let a = simulation.run().unwrap();
        let b = simulation.run().unwrap();
        assert_eq!(a.seed, 42);
        assert_eq!(a.objects, b.objects);
        assert_eq!(a.cadence, b.cadence);
        assert_eq!(a.rates, b.rates);
    }

    #[test]
    fn test_every_object_recorded_and_classified() {
        let settings = example_settings();
        let library = example_library();
        let bundle = Simulation::new(&settings, &library).unwrap().run().unwrap();

        assert_eq!(bundle.objects.len(), settings.sample_number);
        for (i, object) in bundle.objects.iter().enumerate() {
            assert_eq!(object.index, i);
            assert_eq!(object.discovery.filters.len(), settings.filters.len());
            if !object.discovery.any {
                assert_eq!(object.outcome, Outcome::Undiscovered);
            }
        }
        let counted: usize = bundle.rates.shells.iter().map(|s| s.object_count).sum();
        assert_eq!(counted, settings.sample_number);
    }

    #[test]
    fn test_nearby_population_is_discovered() {
        let mut settings = example_settings();
        settings.redshift.upper = 0.3;
        let library = complete_library(&settings);
        let bundle = Simulation::new(&settings, &library).unwrap().run().unwrap();

        let discovered = bundle.objects.iter().filter(|o| o.discovery.any).count();
        assert!(discovered > 0);
        let rates = &bundle.rates;
        assert!(rates.total_rate + rates.short_campaign_rate + rates.too_faint_rate > 0.0);
        for object in &bundle.objects {
            assert!(object.filters.values().all(|d| d.peak_magnitude.is_some()));
            let span = object.end_day - object.explosion_day;
            assert!(object.campaign.max >= 0.0);
            assert!(object.campaign.max <= span + 1e-9);
        }
    }

    #[test]
    fn test_configured_cosmology_sets_distances() {
        let mut settings = example_settings();
        settings.redshift.upper = 0.3;
        let library = complete_library(&settings);
        let reference = Simulation::new(&settings, &library).unwrap().run().unwrap();

        // Doubling H0 halves every distance: same redshifts, peaks brighter by 5 log10(2)
        settings.cosmology.hubble_constant *= 2.0;
        let closer = Simulation::new(&settings, &library).unwrap().run().unwrap();

        let shift = 5.0 * 2f64.log10();
        let mut compared = 0;
        for (a, b) in reference.objects.iter().zip(&closer.objects) {
            assert_eq!(a.redshift, b.redshift);
            let far = a.filters["g"].peak_magnitude;
            let near = b.filters["g"].peak_magnitude;
            if let (Some(far), Some(near)) = (far, near) {
                assert_relative_eq!(far - near, shift, epsilon = 1e-6);
                compared += 1;
            }
        }
        assert!(compared > 0);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut settings = example_settings();
        settings.transient_types[0].name = "missing".to_string();
        let library = example_library();
        assert!(matches!(
            Simulation::new(&settings, &library),
            Err(SimulationError::Template(_))
        ));
    }

    #[test]
    fn test_progress_bar_ticks_per_object() {
        let settings = example_settings();
        let library = example_library();
        let simulation = Simulation::new(&settings, &library).unwrap();
        let pb = ProgressBar::hidden();
        simulation.run_with_progress(Some(&pb)).unwrap();
        assert_eq!(pb.position(), settings.sample_number as u64);
    }
}
