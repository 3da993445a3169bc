use crate::config::SimulationSettings;
use crate::photometry::TemplateLibrary;
use clap::Args;
use log::info;
use std::path::{Path, PathBuf};

/// Parse a seed given either as decimal or as `0x`-prefixed hex
pub fn parse_seed(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| format!("Invalid seed value: {s}"))
}

/// Input files shared by every subcommand that runs a simulation
#[derive(Args, Debug, Clone)]
pub struct SimulationInputArgs {
    /// Simulation settings (TOML)
    #[arg(long, default_value = "simulator/data/example_settings.toml")]
    pub settings: PathBuf,

    /// Template library with light curves and k-corrections (JSON)
    #[arg(long, default_value = "simulator/data/example_templates.json")]
    pub templates: PathBuf,

    /// Override the seed from the settings file (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_seed)]
    pub seed: Option<u64>,
}

impl SimulationInputArgs {
    /// Load settings and templates, applying the seed override.
    pub fn load(
        &self,
    ) -> Result<(SimulationSettings, TemplateLibrary), Box<dyn std::error::Error>> {
        let (mut settings, library) = load_inputs(&self.settings, &self.templates)?;
        if let Some(seed) = self.seed {
            info!("Seed overridden on the command line: {seed}");
            settings.seed = Some(seed);
        }
        Ok((settings, library))
    }
}

/// Load the settings file and the template library it refers to
///
/// Every configured transient type must have a template, so a mismatch is
/// reported here before any sampling starts.
///
/// # Example
/// ```no_run
/// use simulator::shared_args::load_inputs;
///
/// let (settings, library) = load_inputs(
///     "simulator/data/example_settings.toml",
///     "simulator/data/example_templates.json",
/// )?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn load_inputs<P: AsRef<Path>, Q: AsRef<Path>>(
    settings_path: P,
    templates_path: Q,
) -> Result<(SimulationSettings, TemplateLibrary), Box<dyn std::error::Error>> {
    let settings_path = settings_path.as_ref();
    let templates_path = templates_path.as_ref();

    info!("Loading settings from: {}", settings_path.display());
    let settings = SimulationSettings::from_file(settings_path).map_err(|e| {
        format!(
            "Failed to load settings from '{}': {}",
            settings_path.display(),
            e
        )
    })?;

    info!("Loading templates from: {}", templates_path.display());
    let library = TemplateLibrary::load_from_file(templates_path).map_err(|e| {
        format!(
            "Failed to load templates from '{}': {}",
            templates_path.display(),
            e
        )
    })?;
    library.check_types(&settings.transient_types)?;
    info!(
        "Simulating {} transient types in {} filters",
        settings.transient_types.len(),
        settings.filters.len()
    );

    Ok((settings, library))
}
