//! Typed NBEATS configuration built from a resolved hyperparameter row.
//!
//! Grid values are loose JSON; this is the single place where they are
//! coerced into the numeric kinds the model expects.

use crate::error::EnsembleError;
use crate::training::grid::HyperparameterRow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Basis expansion used by a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackType {
    Trend,
    Seasonality,
    Identity,
    Exogenous,
}

impl FromStr for StackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trend" => Ok(Self::Trend),
            "seasonality" => Ok(Self::Seasonality),
            "identity" => Ok(Self::Identity),
            "exogenous" => Ok(Self::Exogenous),
            other => Err(format!("unknown stack type `{other}`")),
        }
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Softplus,
    Tanh,
    SELU,
    LeakyReLU,
    PReLU,
    Sigmoid,
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ReLU" => Ok(Self::ReLU),
            "Softplus" => Ok(Self::Softplus),
            "Tanh" => Ok(Self::Tanh),
            "SELU" => Ok(Self::SELU),
            "LeakyReLU" => Ok(Self::LeakyReLU),
            "PReLU" => Ok(Self::PReLU),
            "Sigmoid" => Ok(Self::Sigmoid),
            other => Err(format!("unknown activation `{other}`")),
        }
    }
}

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initialization {
    Orthogonal,
    HeUniform,
    HeNormal,
    GlorotUniform,
    GlorotNormal,
    LecunNormal,
}

impl FromStr for Initialization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orthogonal" => Ok(Self::Orthogonal),
            "he_uniform" => Ok(Self::HeUniform),
            "he_normal" => Ok(Self::HeNormal),
            "glorot_uniform" => Ok(Self::GlorotUniform),
            "glorot_normal" => Ok(Self::GlorotNormal),
            "lecun_normal" => Ok(Self::LecunNormal),
            other => Err(format!("unknown initialization `{other}`")),
        }
    }
}

/// Training/validation loss.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
    MAE,
    MSE,
    RMSE,
    MAPE,
    SMAPE,
    MASE,
    PINBALL,
}

impl FromStr for Loss {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAE" => Ok(Self::MAE),
            "MSE" => Ok(Self::MSE),
            "RMSE" => Ok(Self::RMSE),
            "MAPE" => Ok(Self::MAPE),
            "SMAPE" => Ok(Self::SMAPE),
            "MASE" => Ok(Self::MASE),
            "PINBALL" => Ok(Self::PINBALL),
            other => Err(format!("unknown loss `{other}`")),
        }
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Every setting needed to instantiate and train one ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NbeatsConfig {
    // Data shape
    pub n_time_in: usize,
    pub n_time_out: usize,
    pub n_x: usize,
    pub n_s: usize,
    pub n_x_hidden: usize,
    pub n_s_hidden: usize,
    pub frequency: String,
    pub seasonality: usize,

    // Architecture
    pub stack_types: Vec<StackType>,
    pub n_blocks: Vec<usize>,
    pub n_layers: Vec<usize>,
    pub n_theta_hidden: Vec<Vec<usize>>,
    pub n_harmonics: usize,
    pub n_polynomials: usize,
    pub shared_weights: bool,
    pub initialization: Initialization,
    pub activation: Activation,

    // Optimization
    pub learning_rate: f64,
    pub lr_decay: f64,
    pub lr_decay_step_size: f64,
    pub weight_decay: f64,
    pub dropout_prob_theta: f64,
    pub batch_normalization: bool,
    pub n_steps: usize,
    pub random_seed: u64,

    // Loss
    pub loss_train: Loss,
    pub loss_valid: Loss,
    pub loss_hypar: usize,
}

impl NbeatsConfig {
    /// Coerce and validate a fully merged row.
    ///
    /// Every missing or malformed field is collected and returned in a single
    /// `InvalidHyperparameters` error.
    pub fn from_row(row: &HyperparameterRow) -> Result<Self, EnsembleError> {
        let mut r = RowReader::new(row);

        let seasonality = r.usize("seasonality");
        let config = Self {
            n_time_in: r.usize("n_time_in"),
            n_time_out: r.usize("n_time_out"),
            n_x: r.usize("n_x"),
            n_s: r.usize("n_s"),
            n_x_hidden: r.usize("n_x_hidden"),
            n_s_hidden: r.usize("n_s_hidden"),
            frequency: r.string("frequency"),
            seasonality,
            stack_types: r.parsed_list("stack_types"),
            n_blocks: r.usize_list("n_blocks"),
            n_layers: r.usize_list("n_layers"),
            n_theta_hidden: r.nested_usize_list("n_theta_hidden"),
            n_harmonics: r.usize("n_harmonics"),
            n_polynomials: r.usize("n_polynomials"),
            shared_weights: r.bool("shared_weights"),
            initialization: r.parsed("initialization", Initialization::LecunNormal),
            activation: r.parsed("activation", Activation::ReLU),
            learning_rate: r.f64("learning_rate"),
            lr_decay: r.f64("lr_decay"),
            lr_decay_step_size: r.f64("lr_decay_step_size"),
            weight_decay: r.f64("weight_decay"),
            dropout_prob_theta: r.f64("dropout_prob_theta"),
            batch_normalization: r.bool("batch_normalization"),
            n_steps: r.usize("n_steps"),
            random_seed: r.usize("random_seed") as u64,
            loss_train: r.parsed("loss_train", Loss::MAE),
            loss_valid: r.parsed("loss_val", Loss::MAE),
            loss_hypar: seasonality,
        };

        let mut problems = r.finish();
        if problems.is_empty() {
            problems.extend(config.shape_problems());
        }
        if problems.is_empty() {
            Ok(config)
        } else {
            Err(EnsembleError::InvalidHyperparameters(problems))
        }
    }

    /// Lookback multiplier for a given horizon.
    pub fn lookback(&self) -> usize {
        if self.n_time_out == 0 {
            0
        } else {
            self.n_time_in / self.n_time_out
        }
    }

    fn shape_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.n_time_in == 0 {
            problems.push("`n_time_in` must be positive".to_string());
        }
        if self.n_time_out == 0 {
            problems.push("`n_time_out` must be positive".to_string());
        }
        let n_stacks = self.stack_types.len();
        for (name, len) in [
            ("n_blocks", self.n_blocks.len()),
            ("n_layers", self.n_layers.len()),
            ("n_theta_hidden", self.n_theta_hidden.len()),
        ] {
            if len != n_stacks {
                problems.push(format!(
                    "`{name}` has {len} entries but there are {n_stacks} stacks"
                ));
            }
        }
        for (i, (layers, hidden)) in self.n_layers.iter().zip(&self.n_theta_hidden).enumerate() {
            if *layers != hidden.len() {
                problems.push(format!(
                    "stack {i}: `n_theta_hidden` has {} widths for {layers} layers",
                    hidden.len()
                ));
            }
        }
        if !(0.0..1.0).contains(&self.dropout_prob_theta) {
            problems.push("`dropout_prob_theta` must be in [0, 1)".to_string());
        }
        problems
    }
}

/// Reads fields out of a row, remembering every failure instead of stopping.
pub(crate) struct RowReader<'a> {
    row: &'a HyperparameterRow,
    problems: Vec<String>,
}

impl<'a> RowReader<'a> {
    pub(crate) fn new(row: &'a HyperparameterRow) -> Self {
        Self {
            row,
            problems: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> Vec<String> {
        self.problems
    }

    fn field(&mut self, key: &str) -> Option<&'a Value> {
        let value = self.row.get(key);
        if value.is_none() {
            self.problems.push(format!("missing field `{key}`"));
        }
        value
    }

    pub(crate) fn usize(&mut self, key: &str) -> usize {
        let Some(value) = self.field(key) else {
            return 0;
        };
        match coerce_usize(value) {
            Some(n) => n,
            None => {
                self.problems
                    .push(format!("`{key}` must be a non-negative integer, got {value}"));
                0
            }
        }
    }

    pub(crate) fn f64(&mut self, key: &str) -> f64 {
        let Some(value) = self.field(key) else {
            return 0.0;
        };
        match coerce_f64(value) {
            Some(x) => x,
            None => {
                self.problems
                    .push(format!("`{key}` must be a number, got {value}"));
                0.0
            }
        }
    }

    pub(crate) fn bool(&mut self, key: &str) -> bool {
        let Some(value) = self.field(key) else {
            return false;
        };
        match value {
            Value::Bool(b) => *b,
            Value::Number(n) if n.as_u64() == Some(0) => false,
            Value::Number(n) if n.as_u64() == Some(1) => true,
            _ => {
                self.problems
                    .push(format!("`{key}` must be a boolean, got {value}"));
                false
            }
        }
    }

    pub(crate) fn string(&mut self, key: &str) -> String {
        let Some(value) = self.field(key) else {
            return String::new();
        };
        match value.as_str() {
            Some(s) => s.to_string(),
            None => {
                self.problems
                    .push(format!("`{key}` must be a string, got {value}"));
                String::new()
            }
        }
    }

    pub(crate) fn parsed<T: FromStr<Err = String>>(&mut self, key: &str, fallback: T) -> T {
        let Some(value) = self.field(key) else {
            return fallback;
        };
        match value.as_str().map(str::parse::<T>) {
            Some(Ok(parsed)) => parsed,
            Some(Err(e)) => {
                self.problems.push(format!("`{key}`: {e}"));
                fallback
            }
            None => {
                self.problems
                    .push(format!("`{key}` must be a string, got {value}"));
                fallback
            }
        }
    }

    pub(crate) fn parsed_list<T: FromStr<Err = String>>(&mut self, key: &str) -> Vec<T> {
        let Some(value) = self.field(key) else {
            return Vec::new();
        };
        let Some(items) = value.as_array() else {
            self.problems
                .push(format!("`{key}` must be a list, got {value}"));
            return Vec::new();
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str().map(str::parse::<T>) {
                Some(Ok(parsed)) => out.push(parsed),
                Some(Err(e)) => self.problems.push(format!("`{key}`: {e}")),
                None => self
                    .problems
                    .push(format!("`{key}` entries must be strings, got {item}")),
            }
        }
        out
    }

    pub(crate) fn usize_list(&mut self, key: &str) -> Vec<usize> {
        let Some(value) = self.field(key) else {
            return Vec::new();
        };
        match usize_list(value) {
            Some(list) => list,
            None => {
                self.problems
                    .push(format!("`{key}` must be a list of integers, got {value}"));
                Vec::new()
            }
        }
    }

    pub(crate) fn nested_usize_list(&mut self, key: &str) -> Vec<Vec<usize>> {
        let Some(value) = self.field(key) else {
            return Vec::new();
        };
        let nested = value
            .as_array()
            .and_then(|items| items.iter().map(usize_list).collect::<Option<Vec<_>>>());
        match nested {
            Some(list) => list,
            None => {
                self.problems.push(format!(
                    "`{key}` must be a list of integer lists, got {value}"
                ));
                Vec::new()
            }
        }
    }
}

fn coerce_usize(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return usize::try_from(u).ok();
            }
            let f = n.as_f64()?;
            (f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64).then_some(f as usize)
        }
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn usize_list(value: &Value) -> Option<Vec<usize>> {
    value.as_array()?.iter().map(coerce_usize).collect()
}
