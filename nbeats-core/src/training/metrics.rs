//! Training metrics reported back by a backend.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Training metrics for one ensemble member.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub steps_completed: usize,
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    /// `(epoch, loss)` for every epoch that ran validation.
    pub val_loss_history: Vec<(usize, f64)>,
    pub custom_metrics: HashMap<String, Vec<f64>>,
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f64>,
    pub total_training_time_secs: f64,
}

impl TrainingMetrics {
    /// Record the end of an epoch covering `steps` optimizer steps.
    pub fn record_epoch(&mut self, steps: usize, loss: f64, val_loss: Option<f64>) {
        self.steps_completed += steps;
        self.epochs_completed += 1;
        self.loss_history.push(loss);

        if let Some(vl) = val_loss {
            self.val_loss_history.push((self.epochs_completed, vl));
            if self.best_val_loss.is_none_or(|best| vl < best) {
                self.best_val_loss = Some(vl);
                self.best_epoch = Some(self.epochs_completed);
            }
        }
    }

    pub fn add_custom_metric(&mut self, name: &str, value: f64) {
        self.custom_metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    pub fn last_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}
