//! Experiment logging sink: one directory per frequency group, one version per member.
//!
//! Layout: `{logs_path}/{group}/{version}/hparams.json` plus an append-only
//! `metrics.jsonl`.

use crate::error::EnsembleError;
use crate::persistence::{append_json_line, atomic_write_json};
use crate::training::model::NbeatsConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One line of `metrics.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub step: usize,
    pub metrics: BTreeMap<String, f64>,
    pub logged_at: DateTime<Utc>,
}

/// Log writer for a single ensemble member.
#[derive(Debug, Clone)]
pub struct ExperimentLogger {
    name: String,
    version: String,
    dir: PathBuf,
}

impl ExperimentLogger {
    /// Create `{logs_path}/{name}/{version}`.
    pub fn create(logs_path: &Path, name: &str, version: &str) -> Result<Self, EnsembleError> {
        let dir = logs_path.join(name).join(version);
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            dir,
        })
    }

    /// Version string encoding loss, lookback length and seed.
    pub fn version_for(config: &NbeatsConfig) -> String {
        format!(
            "loss-{}_lbl-{}_rs-{}",
            config.loss_train,
            config.lookback(),
            config.random_seed
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_hyperparams(&self, config: &NbeatsConfig) -> Result<(), EnsembleError> {
        atomic_write_json(&self.dir.join("hparams.json"), config)?;
        Ok(())
    }

    pub fn log_metrics(
        &self,
        step: usize,
        metrics: BTreeMap<String, f64>,
    ) -> Result<(), EnsembleError> {
        let record = MetricsRecord {
            step,
            metrics,
            logged_at: Utc::now(),
        };
        append_json_line(&self.dir.join("metrics.jsonl"), &record)?;
        Ok(())
    }

    /// Read back every metrics record written so far.
    pub fn read_metrics(&self) -> Result<Vec<MetricsRecord>, EnsembleError> {
        let path = self.dir.join("metrics.jsonl");
        if !path.exists() {
            return Ok(Vec::new());
        }
        std::fs::read_to_string(&path)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(EnsembleError::from))
            .collect()
    }
}

/// Delete a previous sweep's logs for `group`, if any.
///
/// Returns whether a directory was removed.
pub fn reset_group_logs(logs_path: &Path, group: &str) -> Result<bool, EnsembleError> {
    let dir = logs_path.join(group);
    if !dir.exists() {
        return Ok(false);
    }
    tracing::warn!(path = %dir.display(), "Removing logs from a previous sweep");
    std::fs::remove_dir_all(&dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::model::Loss;
    use tempfile::TempDir;

    #[test]
    fn test_logger_layout_and_metrics() {
        let dir = TempDir::new().unwrap();
        let logger = ExperimentLogger::create(dir.path(), "Yearly", "loss-MAPE_lbl-2_rs-1").unwrap();
        assert!(logger.dir().ends_with("Yearly/loss-MAPE_lbl-2_rs-1"));

        logger
            .log_metrics(10, BTreeMap::from([("train_loss".to_string(), 0.5)]))
            .unwrap();
        logger
            .log_metrics(20, BTreeMap::from([("val_loss".to_string(), 0.4)]))
            .unwrap();
        let records = logger.read_metrics().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].step, 20);
        assert_eq!(records[1].metrics["val_loss"], 0.4);
    }

    #[test]
    fn test_reset_group_logs() {
        let dir = TempDir::new().unwrap();
        ExperimentLogger::create(dir.path(), "Monthly", "v1").unwrap();
        ExperimentLogger::create(dir.path(), "Yearly", "v1").unwrap();

        assert!(reset_group_logs(dir.path(), "Monthly").unwrap());
        assert!(!dir.path().join("Monthly").exists());
        assert!(dir.path().join("Yearly").exists());
        assert!(!reset_group_logs(dir.path(), "Monthly").unwrap());
    }

    #[test]
    fn test_version_string() {
        let row = crate::training::hyperparams::NbeatsHyperparameters::new(
            "Yearly",
            &crate::training::hyperparams::EnsembleGridSpec {
                lookbacks: vec![5],
                loss_train: vec!["SMAPE".into()],
                random_seed: vec![3],
                n_steps: vec![1],
                ..Default::default()
            },
        )
        .map(|hp| {
            crate::training::grid::merge_rows(
                &hp.grid.expand()[0],
                &hp.ensemble_grid.expand()[0],
            )
        })
        .unwrap();
        let config = NbeatsConfig::from_row(&row).unwrap();
        assert_eq!(config.loss_train, Loss::SMAPE);
        assert_eq!(ExperimentLogger::version_for(&config), "loss-SMAPE_lbl-5_rs-3");
    }
}
