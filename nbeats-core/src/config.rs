//! Configuration for ensemble sweeps.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment. Files are read from
//! `~/.config/nbeats/config.toml` and `.nbeats/config.toml` in the workspace.

use crate::error::EnsembleError;
use crate::training::backend::GpuOptions;
use crate::training::ensemble::FitOptions;
use crate::training::hyperparams::EnsembleGridSpec;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration of one sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// M4 group to train on: `Yearly`, `Quarterly` or `Monthly`.
    pub frequency: String,
    #[serde(default)]
    pub ensemble: EnsembleGridSpec,
    #[serde(default)]
    pub gpu: GpuOptions,
    #[serde(default)]
    pub fit: FitOptions,
    #[serde(default)]
    pub data: DataConfig,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            frequency: "Yearly".to_string(),
            ensemble: EnsembleGridSpec::default(),
            gpu: GpuOptions::cpu(),
            fit: FitOptions::default(),
            data: DataConfig::default(),
        }
    }
}

/// Where the per-group CSV tables live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub directory: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/m4"),
        }
    }
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".nbeats").join("config.toml")
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "nbeats", "nbeats")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `NBEATS_`, `__` between sections)
/// 2. `explicit`, when given (must exist)
/// 3. Workspace-local config (`.nbeats/config.toml`)
/// 4. User config (`~/.config/nbeats/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<EnsembleConfig, EnsembleError> {
    let mut figment = Figment::from(Serialized::defaults(EnsembleConfig::default()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(EnsembleError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }

    // NBEATS_FREQUENCY, NBEATS_FIT__LOGS_PATH, NBEATS_GPU__USE_GPUS, ...
    figment = figment.merge(Env::prefixed("NBEATS_").split("__"));

    let config: EnsembleConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

impl EnsembleConfig {
    /// Cheap checks that do not need any data: frequency, grid, GPU and fit options.
    pub fn validate(&self) -> Result<(), EnsembleError> {
        self.frequency.parse::<crate::m4::Frequency>()?;
        self.ensemble.validate()?;
        self.gpu.validate()?;
        self.fit.validate()?;
        Ok(())
    }
}
