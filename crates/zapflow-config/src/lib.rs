// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zapflow configuration.
//!
//! Seven TOML sections (`app`, `evolution`, `backend`, `storage`, `poller`,
//! `gateway`, `leads`) read from the file search path or a `--config` file,
//! then overridden by `ZAPFLOW_<SECTION>_<KEY>` variables. Unknown keys are
//! rejected; every problem found is returned at once so the CLI can report
//! them together.
//!
//! ```no_run
//! match zapflow_config::load_and_validate() {
//!     Ok(config) => println!("instance API at {}", config.evolution.base_url),
//!     Err(errors) => zapflow_config::render_errors(&errors),
//! }
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, ConfigOrigin, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::ZapflowConfig;

/// Search path plus environment.
pub fn load_and_validate() -> Result<ZapflowConfig, Vec<ConfigError>> {
    checked(loader::load_config(), None)
}

/// A TOML document only; the environment is not consulted.
pub fn load_and_validate_str(toml_content: &str) -> Result<ZapflowConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), Some(toml_content))
}

/// The file given with `--config` plus environment. Unlike search path
/// entries, this file must exist.
pub fn load_and_validate_path(path: &Path) -> Result<ZapflowConfig, Vec<ConfigError>> {
    if !path.is_file() {
        return Err(vec![ConfigError::MissingFile {
            path: path.to_path_buf(),
        }]);
    }
    checked(loader::load_config_from_path(path), None)
}

fn checked(
    loaded: Result<ZapflowConfig, figment::Error>,
    inline: Option<&str>,
) -> Result<ZapflowConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::from_figment(err, inline))?;
    validation::validate_config(&config)?;
    Ok(config)
}
