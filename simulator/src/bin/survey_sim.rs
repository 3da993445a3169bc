//! Transient survey simulator
//!
//! Estimates how many transients a survey with a given cadence, filter set and
//! depth discovers per year.
//!
//! # Usage
//!
//! ```bash
//! # Run with the bundled example inputs, writing results to ./results
//! cargo run --release --bin survey_sim -- run --output results
//!
//! # Reproduce a run with an explicit seed
//! cargo run --release --bin survey_sim -- run --settings my_survey.toml \
//!     --templates templates.json --seed 1234
//!
//! # Re-print the summary of an earlier run
//! cargo run --release --bin survey_sim -- summarize \
//!     --results results/simulation_results_20260101t120000.json
//! ```
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use simulator::results::result_file_stem;
use simulator::shared_args::SimulationInputArgs;
use simulator::{ResultBundle, Simulation};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation and write the result bundle plus a Markdown summary
    Run {
        #[command(flatten)]
        inputs: SimulationInputArgs,

        /// Directory for the result bundle and summary
        #[arg(short, long, default_value = "survey_results")]
        output: PathBuf,

        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Reload a result bundle, recompute its rates and print the summary
    Summarize {
        /// Result bundle written by `run`
        #[arg(short, long)]
        results: PathBuf,
    },
}

fn run(
    inputs: &SimulationInputArgs,
    output: &Path,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (settings, library) = inputs.load()?;
    let simulation = Simulation::new(&settings, &library)?;

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(settings.sample_number as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        pb.set_message("Simulating transients");
        pb
    };

    let bundle = simulation.run_with_progress(Some(&pb))?;
    pb.finish_with_message("Simulation complete");

    fs::create_dir_all(output)?;
    let stem = result_file_stem(&Local::now());
    let results_path = output.join(format!("{stem}.json"));
    let summary_path = output.join(format!("{stem}.md"));

    bundle.save_to_file(&results_path)?;
    info!("Results written to {}", results_path.display());

    let summary = bundle.summary_markdown();
    fs::write(&summary_path, &summary)?;
    info!("Summary written to {}", summary_path.display());

    println!("Seed: {}", bundle.seed);
    println!(
        "Estimated discoveries per year: {:.2} (too faint: {:.2}, short campaign: {:.2})",
        bundle.rates.total_rate, bundle.rates.too_faint_rate, bundle.rates.short_campaign_rate
    );
    Ok(())
}

fn summarize(results: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut bundle = ResultBundle::load_from_file(results)?;
    info!(
        "Loaded {} objects from {}",
        bundle.objects.len(),
        results.display()
    );
    bundle.rates = bundle.recompute_rates()?;
    println!("{}", bundle.summary_markdown());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            inputs,
            output,
            quiet,
        } => run(&inputs, &output, quiet),
        Commands::Summarize { results } => summarize(&results),
    }
}
