//! Shared test infrastructure for the survey simulator workspace.
//!
//! Integration tests use these helpers to find the bundled example inputs
//! under `simulator/data/` and to keep result bundles and summaries they
//! produce in `<workspace>/test_output/` for manual inspection.
//!
//! ```rust
//! use test_helpers::{data_path, output_path};
//!
//! let settings = data_path("example_settings.toml");
//! assert!(settings.exists());
//!
//! let bundle = output_path("example_run.json");
//! assert!(bundle.starts_with(test_helpers::get_output_dir()));
//! ```

use once_cell::sync::Lazy;
use std::env;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    /// No `Cargo.toml` with a `[workspace]` section above the current directory
    #[error("Failed to find project root: {0}")]
    ProjectRootNotFound(String),
}

/// Walk up from the current directory to the workspace `Cargo.toml`.
pub fn find_project_root() -> Result<PathBuf, TestHelperError> {
    let mut current_dir = env::current_dir().map_err(|e| {
        TestHelperError::ProjectRootNotFound(format!("Failed to get current directory: {}", e))
    })?;

    loop {
        let cargo_toml = current_dir.join("Cargo.toml");
        if cargo_toml.exists() {
            let content = std::fs::read_to_string(&cargo_toml).map_err(|e| {
                TestHelperError::ProjectRootNotFound(format!("Failed to read Cargo.toml: {}", e))
            })?;

            if content.contains("[workspace]") {
                return Ok(current_dir);
            }
        }

        if !current_dir.pop() {
            break;
        }
    }

    Err(TestHelperError::ProjectRootNotFound(
        "Workspace root not found".to_string(),
    ))
}

static PROJECT_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_project_root().expect("Failed to find project root directory"));

/// `<workspace>/test_output`, created on first use.
pub fn get_output_dir() -> PathBuf {
    let output_dir = PROJECT_ROOT.join("test_output");

    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir).expect("Failed to create output directory");
    }

    output_dir
}

/// Path of a test artifact inside [`get_output_dir`].
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    get_output_dir().join(path)
}

/// Path of a bundled input file in `simulator/data`.
pub fn data_path<P: AsRef<Path>>(path: P) -> PathBuf {
    PROJECT_ROOT.join("simulator").join("data").join(path)
}
