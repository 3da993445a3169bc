//! Monte Carlo simulation of how many transients an imaging survey discovers.
//!
//! A run draws a volume-uniform population of transients, turns each one's
//! rest-frame template into observed-frame light curves, matches those against
//! a stochastic observing cadence and converts the discovered fractions per
//! redshift shell into annual discovery rates.

pub mod algo;
pub mod config;
pub mod cosmology;
pub mod photometry;
pub mod population;
pub mod results;
pub mod shared_args;
pub mod simulation;
pub mod survey;

pub use config::{ConfigError, SimulationSettings};
pub use cosmology::Cosmology;
pub use photometry::{LightCurvePipeline, TemplateLibrary};
pub use population::SampledObject;
pub use results::{ObjectRecord, ResultBundle, ResultsError};
pub use simulation::{Simulation, SimulationError};
pub use survey::{CadenceTable, Outcome, RateSummary};
