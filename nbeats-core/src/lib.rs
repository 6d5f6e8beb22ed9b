//! # NBEATS Core
//!
//! Hyperparameter sweeps for NBEATS ensembles on the M4 benchmark.
//! Builds the per-frequency search space, turns raw series into windowed
//! loaders, trains one model per grid configuration through a pluggable
//! `TrainingBackend`, and reduces member forecasts to a per-series median.

pub mod config;
pub mod data;
pub mod error;
pub mod forecast;
pub mod m4;
pub mod persistence;
pub mod training;

// Re-export commonly used types at the crate root.
pub use config::{DataConfig, EnsembleConfig, load_config};
pub use data::{CsvSeriesSource, Loaders, SeriesSource, SeriesTable, StaticTable, create_loaders};
pub use error::{EnsembleError, Result};
pub use forecast::{EnsembleForecast, ForecastFrame, aggregate_median};
pub use m4::{Frequency, FrequencyGroup};
pub use training::{
    EnsembleGridSpec, FitOptions, GpuOptions, GpuSpec, NbeatsConfig, NbeatsEnsemble,
    NbeatsHyperparameters, ParameterGrid, PredictionBatch, SweepOutcome, TrainerOptions,
    TrainingBackend, TrainingMetrics,
};
