//! Layered configuration for the cifra chord annotator.
//!
//! Everything here is fixed for the life of the process: where rendered
//! PDFs live, what to bind, and which external tools to run.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cifraconf::CifraConfig;
//!
//! let config = CifraConfig::load().expect("Failed to load config");
//! println!("outputs: {}", config.paths.output_dir.display());
//! println!("listen: {}", config.bind.addr());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/cifra/config.toml` (system)
//! 2. `~/.config/cifra/config.toml` (user)
//! 3. `./cifra.toml` or `--config <path>` (local override)
//! 4. Environment variables (`CIFRA_*`, plus `PORT`, `AUDIVERIS_*`, `MUSESCORE_PATH`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! output_dir = "~/.local/share/cifra/outputs"
//! work_dir = "/tmp"
//!
//! [bind]
//! host = "0.0.0.0"
//! http_port = 5000
//!
//! [omr]
//! program = "/opt/audiveris/audiveris-cli.jar"
//! timeout_secs = 360
//!
//! [renderer]
//! program = "/usr/bin/mscore"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{
    BindConfig, OmrConfig, PathsConfig, RendererConfig, TelemetryConfig, MUSESCORE_LOCATIONS,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete cifra configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CifraConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub omr: OmrConfig,

    #[serde(default)]
    pub renderer: RendererConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl CifraConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace `./cifra.toml`.
    ///
    /// System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = CifraConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            config = loader::load_from_file(&path, config)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand to keep the section order and comments stable
        let mut output = String::new();

        output.push_str("# cifra configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "output_dir = {}\n",
            quote(&self.paths.output_dir.display().to_string())
        ));
        output.push_str(&format!(
            "work_dir = {}\n",
            quote(&self.paths.work_dir.display().to_string())
        ));

        output.push_str("\n[bind]\n");
        output.push_str(&format!("host = {}\n", quote(&self.bind.host)));
        output.push_str(&format!("http_port = {}\n", self.bind.http_port));

        output.push_str("\n[omr]\n");
        output.push_str(&format!("program = {}\n", quote(&self.omr.program)));
        let args: Vec<String> = self.omr.args.iter().map(|a| quote(a)).collect();
        output.push_str(&format!("args = [{}]\n", args.join(", ")));
        output.push_str(&format!("timeout_secs = {}\n", self.omr.timeout_secs));

        output.push_str("\n[renderer]\n");
        output.push_str("# empty means autodetect\n");
        output.push_str(&format!("program = {}\n", quote(&self.renderer.program)));
        output.push_str(&format!("timeout_secs = {}\n", self.renderer.timeout_secs));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = {}\n",
            quote(&self.telemetry.log_level)
        ));

        output
    }
}

/// TOML basic string; Windows paths carry backslashes.
fn quote(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
