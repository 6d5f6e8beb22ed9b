//! Hyperparameter grids, typed model configuration, and the ensemble sweep.

pub mod backend;
pub mod ensemble;
pub mod grid;
pub mod hyperparams;
pub mod logger;
pub mod metrics;
pub mod model;

pub use backend::{DeviceSelection, GpuOptions, GpuSpec, PredictionBatch, TrainerOptions, TrainingBackend};
pub use ensemble::{FitOptions, MemberRecord, NbeatsEnsemble, SweepOutcome};
pub use grid::{HyperparameterRow, ParameterGrid, merge_rows};
pub use hyperparams::{EnsembleGridSpec, NbeatsHyperparameters, common_grid};
pub use logger::ExperimentLogger;
pub use metrics::TrainingMetrics;
pub use model::{Activation, Initialization, Loss, NbeatsConfig, StackType};
