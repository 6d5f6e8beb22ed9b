//! The seam to the deep-learning runtime that actually trains NBEATS.
//!
//! Nothing in this crate computes gradients. A `TrainingBackend` receives the
//! typed configuration and the loaders, and hands back metrics and forecasts.

use crate::data::loader::TimeSeriesLoader;
use crate::error::EnsembleError;
use crate::training::logger::ExperimentLogger;
use crate::training::metrics::TrainingMetrics;
use crate::training::model::NbeatsConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which GPUs to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GpuSpec {
    /// Number of GPUs; `-1` means all available.
    Count(i64),
    /// Explicit device indices.
    Devices(Vec<usize>),
    /// Backend-specific device string, e.g. `"0,1"` or `"cuda:0"`.
    Device(String),
}

impl TryFrom<Value> for GpuSpec {
    type Error = EnsembleError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let shown = value.to_string();
        serde_json::from_value(value).map_err(|_| {
            EnsembleError::gpu(format!(
                "if use_gpus == true, gpus must be a count, a list or a string, not {shown}"
            ))
        })
    }
}

/// GPU settings, validated before any training starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuOptions {
    #[serde(default)]
    pub use_gpus: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpus: Option<GpuSpec>,
    #[serde(default)]
    pub auto_select_gpus: bool,
}

impl GpuOptions {
    pub fn cpu() -> Self {
        Self::default()
    }

    /// Build from loosely typed values, e.g. straight out of a JSON request.
    pub fn from_values(
        use_gpus: bool,
        gpus: Option<Value>,
        auto_select_gpus: bool,
    ) -> Result<Self, EnsembleError> {
        let gpus = match gpus {
            None | Some(Value::Null) => None,
            Some(v) if use_gpus => Some(GpuSpec::try_from(v)?),
            Some(v) => {
                return Err(EnsembleError::gpu(format!(
                    "if use_gpus == false, gpus must be None, not {v}"
                )));
            }
        };
        let options = Self {
            use_gpus,
            gpus,
            auto_select_gpus,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), EnsembleError> {
        match (self.use_gpus, &self.gpus) {
            (true, None) => Err(EnsembleError::gpu(
                "if use_gpus == true, gpus must be a count, a list or a string, not None",
            )),
            (true, Some(GpuSpec::Count(n))) if *n <= 0 && *n != -1 => Err(EnsembleError::gpu(
                format!("if gpus is a count, it must be either a positive integer or equal to -1, not {n}"),
            )),
            (true, Some(GpuSpec::Devices(d))) if d.is_empty() => Err(EnsembleError::gpu(
                "if gpus is a list, it must name at least one device",
            )),
            (true, Some(GpuSpec::Device(s))) if s.trim().is_empty() => Err(EnsembleError::gpu(
                "if gpus is a string, it must not be empty",
            )),
            (false, Some(spec)) => Err(EnsembleError::gpu(format!(
                "if use_gpus == false, gpus must be None, not {spec:?}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn devices(&self) -> DeviceSelection {
        match (&self.gpus, self.use_gpus) {
            (Some(spec), true) => DeviceSelection::Gpus(spec.clone()),
            _ => DeviceSelection::Cpu,
        }
    }
}

/// Where a backend should place the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelection {
    Cpu,
    Gpus(GpuSpec),
}

/// Trainer settings for one ensemble member.
#[derive(Debug, Clone)]
pub struct TrainerOptions<'a> {
    pub max_steps: usize,
    pub gradient_clip_val: f64,
    pub progress_bar_refresh_rate: usize,
    pub devices: DeviceSelection,
    pub auto_select_gpus: bool,
    /// Run validation every this many epochs.
    pub check_val_every_n_epoch: usize,
    pub logger: Option<&'a ExperimentLogger>,
}

/// One predicted test batch: targets and forecasts, one row per window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionBatch {
    pub y_true: Vec<Vec<f64>>,
    pub y_hat: Vec<Vec<f64>>,
}

/// A deep-learning runtime able to train and run NBEATS models.
pub trait TrainingBackend {
    type Model;

    /// Build an untrained model from a fully resolved configuration.
    fn instantiate(&self, config: &NbeatsConfig) -> Result<Self::Model, EnsembleError>;

    /// Train until `options.max_steps`, validating on `val` periodically.
    fn fit(
        &self,
        model: &mut Self::Model,
        train: &TimeSeriesLoader,
        val: &TimeSeriesLoader,
        options: &TrainerOptions<'_>,
    ) -> Result<TrainingMetrics, EnsembleError>;

    /// Forecast every window of `test`, in loader order.
    fn predict(
        &self,
        model: &Self::Model,
        test: &TimeSeriesLoader,
        options: &TrainerOptions<'_>,
    ) -> Result<Vec<PredictionBatch>, EnsembleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_gpus_accepted() {
        let options = GpuOptions::from_values(true, Some(json!(-1)), false).unwrap();
        assert_eq!(options.devices(), DeviceSelection::Gpus(GpuSpec::Count(-1)));
    }

    #[test]
    fn test_fractional_gpu_count_rejected() {
        let err = GpuOptions::from_values(true, Some(json!(0.5)), false).unwrap_err();
        assert!(matches!(err, EnsembleError::InvalidGpuConfig(_)));
    }

    #[test]
    fn test_gpus_without_use_gpus_rejected() {
        let err = GpuOptions::from_values(false, Some(json!(1)), false).unwrap_err();
        assert!(err.to_string().contains("use_gpus == false"));
    }

    #[test]
    fn test_cpu_only_accepted() {
        let options = GpuOptions::from_values(false, None, false).unwrap();
        assert_eq!(options.devices(), DeviceSelection::Cpu);
        assert_eq!(options, GpuOptions::cpu());
    }

    #[test]
    fn test_list_and_string_specs() {
        let list = GpuOptions::from_values(true, Some(json!([0, 1])), false).unwrap();
        assert_eq!(list.gpus, Some(GpuSpec::Devices(vec![0, 1])));
        let string = GpuOptions::from_values(true, Some(json!("cuda:0")), true).unwrap();
        assert_eq!(string.gpus, Some(GpuSpec::Device("cuda:0".into())));
    }

    #[test]
    fn test_non_positive_counts_rejected() {
        for n in [0, -2] {
            assert!(GpuOptions::from_values(true, Some(json!(n)), false).is_err());
        }
        assert!(GpuOptions::from_values(true, None, false).is_err());
    }

    #[test]
    fn test_deserialized_options_validate() {
        let options: GpuOptions = toml::from_str("use_gpus = false\ngpus = 2\n").unwrap();
        assert!(options.validate().is_err());
    }
}
