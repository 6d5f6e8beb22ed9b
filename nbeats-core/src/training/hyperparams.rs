//! Hyperparameter grids for one M4 frequency group.
//!
//! The full search space is split three ways:
//! - the common grid: NBEATS-I architecture and optimization defaults,
//! - the frequency grid: window lengths and loss codes derived from the group,
//! - the ensemble grid: choices varied across ensemble members.

use crate::error::EnsembleError;
use crate::m4::{Frequency, FrequencyGroup};
use crate::training::grid::ParameterGrid;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Architecture and optimization defaults shared by every frequency.
///
/// Built fresh on each call; callers own and may modify the result.
pub fn common_grid() -> ParameterGrid {
    let n_layers = [4usize, 4];
    ParameterGrid::new()
        // Architecture
        .with("activation", vec![json!("ReLU")])
        .with("n_x", vec![json!(0)])
        .with("n_s", vec![json!(0)])
        .with("n_x_hidden", vec![json!(0)])
        .with("n_s_hidden", vec![json!(0)])
        .with("stack_types", vec![json!(["trend", "seasonality"])])
        .with("n_blocks", vec![json!([3, 3])])
        .with("n_layers", vec![json!(n_layers)])
        .with("shared_weights", vec![json!(true)])
        .with("n_harmonics", vec![json!(1)])
        .with("n_polynomials", vec![json!(2)])
        .with(
            "n_theta_hidden",
            vec![json!([vec![256; n_layers[0]], vec![2048; n_layers[1]]])],
        )
        .with("initialization", vec![json!("lecun_normal")])
        // Optimization
        .with("learning_rate", vec![json!(0.0001)])
        .with("lr_decay", vec![json!(0)])
        .with("lr_decay_step_size", vec![json!(1_000)])
        .with("loss_val", vec![json!("SMAPE")])
        .with("dropout_prob_theta", vec![json!(0)])
        .with("weight_decay", vec![json!(0)])
        .with("batch_size", vec![json!(1024)])
        .with("batch_normalization", vec![json!(false)])
        .with("train_sample_freq", vec![json!(1)])
        // Data
        .with("l_h", vec![json!(1.5)])
}

/// Keys that shape the data loaders; they are shared by every member of an
/// outer row and so cannot vary inside the ensemble grid.
pub const LOADER_KEYS: [&str; 4] = ["n_time_in", "n_time_out", "batch_size", "train_sample_freq"];

/// Choices varied across ensemble members.
///
/// `lookbacks` multiplies the group horizon into input window lengths and is
/// consumed by the frequency grid; every other list becomes an ensemble
/// dimension. Extra keys override the matching common-grid entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleGridSpec {
    pub lookbacks: Vec<usize>,
    pub loss_train: Vec<String>,
    pub random_seed: Vec<u64>,
    pub n_steps: Vec<usize>,
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, Vec<Value>>,
}

impl Default for EnsembleGridSpec {
    fn default() -> Self {
        Self {
            lookbacks: vec![2, 3, 4, 5, 6, 7],
            loss_train: vec!["SMAPE".into(), "MAPE".into(), "MASE".into()],
            random_seed: vec![1],
            n_steps: vec![15_000],
            extra: BTreeMap::new(),
        }
    }
}

impl EnsembleGridSpec {
    /// Check every list is usable, reporting all problems at once.
    pub fn validate(&self) -> Result<(), EnsembleError> {
        let mut problems = Vec::new();
        if self.lookbacks.is_empty() {
            problems.push("ensemble grid `lookbacks` must not be empty".to_string());
        }
        if self.lookbacks.contains(&0) {
            problems.push("ensemble grid `lookbacks` must be positive".to_string());
        }
        if self.loss_train.is_empty() {
            problems.push("ensemble grid `loss_train` must not be empty".to_string());
        }
        if self.random_seed.is_empty() {
            problems.push("ensemble grid `random_seed` must not be empty".to_string());
        }
        if self.n_steps.is_empty() {
            problems.push("ensemble grid `n_steps` must not be empty".to_string());
        }
        for (key, values) in &self.extra {
            if values.is_empty() {
                problems.push(format!("ensemble grid `{key}` must not be empty"));
            }
            if LOADER_KEYS.contains(&key.as_str()) {
                problems.push(format!(
                    "`{key}` shapes the data loaders and cannot vary across ensemble members"
                ));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(EnsembleError::InvalidHyperparameters(problems))
        }
    }

    /// The ensemble dimensions, without `lookbacks`.
    pub fn to_grid(&self) -> ParameterGrid {
        let mut grid = ParameterGrid::new()
            .with("loss_train", self.loss_train.iter().map(|l| json!(l)).collect())
            .with("random_seed", self.random_seed.iter().map(|s| json!(s)).collect())
            .with("n_steps", self.n_steps.iter().map(|s| json!(s)).collect());
        for (key, values) in &self.extra {
            grid.insert(key.clone(), values.clone());
        }
        grid
    }
}

/// Resolved search space for one frequency group.
#[derive(Debug, Clone)]
pub struct NbeatsHyperparameters {
    pub frequency: Frequency,
    pub group: FrequencyGroup,
    pub freq_grid: ParameterGrid,
    pub ensemble_grid: ParameterGrid,
    /// Common and frequency grids, minus every ensemble key.
    pub grid: ParameterGrid,
}

impl NbeatsHyperparameters {
    /// Parse the frequency name and build all grids.
    ///
    /// Fails before anything else is built when the name is not one of
    /// `Yearly`, `Quarterly` or `Monthly`.
    pub fn new(frequency: &str, ensemble: &EnsembleGridSpec) -> Result<Self, EnsembleError> {
        let frequency: Frequency = frequency.parse()?;
        Self::for_frequency(frequency, ensemble)
    }

    pub fn for_frequency(
        frequency: Frequency,
        ensemble: &EnsembleGridSpec,
    ) -> Result<Self, EnsembleError> {
        ensemble.validate()?;
        let group = frequency.group();

        let mut n_time_in = Vec::with_capacity(ensemble.lookbacks.len());
        let mut problems = Vec::new();
        for &lb in &ensemble.lookbacks {
            match group.horizon.checked_mul(lb) {
                Some(n) => n_time_in.push(json!(n)),
                None => problems.push(format!(
                    "lookback {lb} times horizon {} overflows n_time_in",
                    group.horizon
                )),
            }
        }
        if !problems.is_empty() {
            return Err(EnsembleError::InvalidHyperparameters(problems));
        }

        let freq_grid = ParameterGrid::new()
            .with("n_time_in", n_time_in)
            .with("n_time_out", vec![json!(group.horizon)])
            .with("frequency", vec![json!(group.code)])
            .with("seasonality", vec![json!(group.seasonality)]);

        let ensemble_grid = ensemble.to_grid();

        let mut grid = common_grid().merged(&freq_grid);
        for key in ensemble_grid.keys() {
            grid.remove(key);
        }

        Ok(Self {
            frequency,
            group,
            freq_grid,
            ensemble_grid,
            grid,
        })
    }

    /// Total number of models a sweep over this space trains.
    pub fn n_models(&self) -> usize {
        self.grid.combinations() * self.ensemble_grid.combinations()
    }

    /// Lookback multiplier recovered from an input window length.
    pub fn lookback_of(&self, n_time_in: usize) -> usize {
        n_time_in / self.group.horizon
    }

    /// Human-readable listing of every grid dimension.
    pub fn models_table(&self, table_width: usize) -> String {
        let full = self.grid.merged(&self.ensemble_grid);
        let key_width = full.keys().map(str::len).max().unwrap_or(0);
        let rule = "=".repeat(table_width);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "\n{} grid (# of different model configurations = {}):",
            self.group.name,
            full.combinations()
        );
        let _ = writeln!(out, "{rule}");
        for (key, values) in full.iter() {
            let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
            let _ = writeln!(out, "{key:<key_width$}    [{}]", rendered.join(", "));
        }
        let _ = writeln!(out, "{rule}");
        out
    }
}
