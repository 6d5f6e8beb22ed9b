//! The ensemble sweep: train one NBEATS model per grid configuration and
//! reduce their forecasts to a per-series median.

use crate::data::loader::{LoaderParams, create_loaders};
use crate::data::source::SeriesSource;
use crate::error::EnsembleError;
use crate::forecast::{EnsembleForecast, ForecastFrame, aggregate_median, member_tag};
use crate::training::backend::{GpuOptions, TrainerOptions, TrainingBackend};
use crate::training::grid::merge_rows;
use crate::training::hyperparams::{EnsembleGridSpec, NbeatsHyperparameters};
use crate::training::logger::{ExperimentLogger, reset_group_logs};
use crate::training::metrics::TrainingMetrics;
use crate::training::model::{Loss, NbeatsConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Per-call settings for `NbeatsEnsemble::fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Validate every this many epochs.
    #[serde(default = "default_val_freq_steps")]
    pub val_freq_steps: usize,
    /// Write per-member experiment logs under `logs_path`.
    #[serde(default)]
    pub tensorboard_logs: bool,
    #[serde(default = "default_logs_path")]
    pub logs_path: PathBuf,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Clear the terminal before each member's progress line.
    #[serde(default)]
    pub clear_console: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            val_freq_steps: default_val_freq_steps(),
            tensorboard_logs: false,
            logs_path: default_logs_path(),
            num_workers: default_num_workers(),
            clear_console: false,
        }
    }
}

impl FitOptions {
    /// Reject settings the trainer cannot run with.
    pub fn validate(&self) -> Result<(), EnsembleError> {
        if self.val_freq_steps == 0 {
            return Err(EnsembleError::InvalidHyperparameters(vec![
                "val_freq_steps must be at least 1".to_string(),
            ]));
        }
        Ok(())
    }
}

fn default_val_freq_steps() -> usize {
    1
}

fn default_logs_path() -> PathBuf {
    PathBuf::from("logs")
}

fn default_num_workers() -> usize {
    4
}

/// What one trained member contributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub tag: String,
    pub loss_train: Loss,
    pub lookback: usize,
    pub random_seed: u64,
    pub n_forecasts: usize,
    pub metrics: TrainingMetrics,
}

/// Result of a full sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub sweep_id: String,
    pub group: String,
    pub forecast: EnsembleForecast,
    pub members: Vec<MemberRecord>,
}

/// NBEATS ensemble over one M4 frequency group.
#[derive(Debug, Clone)]
pub struct NbeatsEnsemble {
    hyperparameters: NbeatsHyperparameters,
    gpu: GpuOptions,
}

impl NbeatsEnsemble {
    /// Validate the GPU options and build the grids.
    ///
    /// Both checks run here so a bad configuration fails before any data is
    /// loaded.
    pub fn new(
        frequency: &str,
        ensemble_grid: &EnsembleGridSpec,
        gpu: GpuOptions,
    ) -> Result<Self, EnsembleError> {
        gpu.validate()?;
        let hyperparameters = NbeatsHyperparameters::new(frequency, ensemble_grid)?;
        Ok(Self {
            hyperparameters,
            gpu,
        })
    }

    pub fn hyperparameters(&self) -> &NbeatsHyperparameters {
        &self.hyperparameters
    }

    pub fn gpu(&self) -> &GpuOptions {
        &self.gpu
    }

    /// Train every configuration and return the median ensemble forecast.
    ///
    /// Runs strictly sequentially. The first error aborts the sweep and the
    /// forecasts gathered so far are dropped.
    pub async fn fit<S, B>(
        &self,
        source: &S,
        backend: &B,
        options: &FitOptions,
    ) -> Result<SweepOutcome, EnsembleError>
    where
        S: SeriesSource + ?Sized,
        B: TrainingBackend,
    {
        let hp = &self.hyperparameters;
        let group = hp.group.name;
        let sweep_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        options.validate()?;

        let (series, statics) = source.load(group).await?;
        let (series, statics) = (Arc::new(series), Arc::new(statics));
        let outer_rows = hp.grid.expand();
        let inner_rows = hp.ensemble_grid.expand();
        let n_models = outer_rows.len() * inner_rows.len();
        tracing::info!(
            %sweep_id,
            group,
            n_series = series.len(),
            n_models,
            "Starting ensemble sweep"
        );

        if options.tensorboard_logs {
            reset_group_logs(&options.logs_path, group)?;
        }

        let mut frames: Vec<ForecastFrame> = Vec::with_capacity(n_models);
        let mut members: Vec<MemberRecord> = Vec::with_capacity(n_models);

        for outer in &outer_rows {
            let loaders = create_loaders(
                &series,
                &statics,
                &LoaderParams::from_row(outer)?,
                options.num_workers,
            )?;

            for inner in &inner_rows {
                let idx = frames.len() + 1;
                let config = NbeatsConfig::from_row(&merge_rows(outer, inner))?;
                let mut model = backend.instantiate(&config)?;

                if options.clear_console {
                    clear_console()?;
                }
                self.report_progress(&config, idx, n_models);

                let logger = if options.tensorboard_logs {
                    let logger = ExperimentLogger::create(
                        &options.logs_path,
                        group,
                        &ExperimentLogger::version_for(&config),
                    )?;
                    logger.log_hyperparams(&config)?;
                    Some(logger)
                } else {
                    None
                };

                let trainer = TrainerOptions {
                    max_steps: config.n_steps,
                    gradient_clip_val: 0.0,
                    progress_bar_refresh_rate: 50,
                    devices: self.gpu.devices(),
                    auto_select_gpus: self.gpu.auto_select_gpus,
                    check_val_every_n_epoch: options.val_freq_steps,
                    logger: logger.as_ref(),
                };

                let metrics = backend.fit(&mut model, &loaders.train, &loaders.val, &trainer)?;
                let outputs = backend.predict(&model, &loaders.test, &trainer)?;
                let frame = ForecastFrame::from_predictions(&outputs, idx)?;
                tracing::debug!(
                    member = %member_tag(idx),
                    n_forecasts = frame.len(),
                    steps = metrics.steps_completed,
                    "Member finished"
                );

                members.push(MemberRecord {
                    tag: member_tag(idx),
                    loss_train: config.loss_train,
                    lookback: hp.lookback_of(config.n_time_in),
                    random_seed: config.random_seed,
                    n_forecasts: frame.len(),
                    metrics,
                });
                frames.push(frame);
            }
        }

        let forecast = aggregate_median(&frames)?;
        tracing::info!(
            %sweep_id,
            group,
            n_members = members.len(),
            n_series = forecast.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Ensemble sweep complete"
        );

        Ok(SweepOutcome {
            sweep_id,
            group: group.to_string(),
            forecast,
            members,
        })
    }

    fn report_progress(&self, config: &NbeatsConfig, idx: usize, n_models: usize) {
        let hp = &self.hyperparameters;
        tracing::info!(
            "{} ({}/{}) - loss: {}, lookback length: {}, random_seed: {}",
            hp.group.name,
            idx,
            n_models,
            config.loss_train,
            hp.lookback_of(config.n_time_in),
            config.random_seed
        );
    }
}

fn clear_console() -> Result<(), EnsembleError> {
    use crossterm::{cursor::MoveTo, execute, terminal};
    execute!(
        std::io::stdout(),
        terminal::Clear(terminal::ClearType::All),
        MoveTo(0, 0)
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gpu_validated_at_construction() {
        let grid = EnsembleGridSpec::default();
        assert!(
            NbeatsEnsemble::new("Yearly", &grid, GpuOptions::from_values(true, Some(json!(-1)), false).unwrap())
                .is_ok()
        );

        let bad = GpuOptions {
            use_gpus: false,
            gpus: Some(crate::training::backend::GpuSpec::Count(1)),
            auto_select_gpus: false,
        };
        let err = NbeatsEnsemble::new("Yearly", &grid, bad).unwrap_err();
        assert!(matches!(err, EnsembleError::InvalidGpuConfig(_)));
    }

    #[test]
    fn test_unsupported_frequency_at_construction() {
        let err = NbeatsEnsemble::new("Daily", &EnsembleGridSpec::default(), GpuOptions::cpu())
            .unwrap_err();
        assert!(matches!(err, EnsembleError::UnsupportedFrequency(_)));
    }

    #[test]
    fn test_fit_options_defaults_from_toml() {
        let options: FitOptions = toml::from_str("tensorboard_logs = true").unwrap();
        assert!(options.tensorboard_logs);
        assert_eq!(options.val_freq_steps, 1);
        assert_eq!(options.num_workers, 4);
        assert_eq!(options.logs_path, PathBuf::from("logs"));
    }

    #[test]
    fn test_zero_validation_frequency_rejected() {
        let options = FitOptions {
            val_freq_steps: 0,
            ..FitOptions::default()
        };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("val_freq_steps"));
        assert!(FitOptions::default().validate().is_ok());
    }
}
