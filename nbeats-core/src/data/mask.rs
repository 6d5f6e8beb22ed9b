//! Train/validation/test sample masks over the tail of every series.

use crate::data::source::SeriesTable;
use serde::{Deserialize, Serialize};

/// One boolean per observation, aligned with `SeriesTable::series`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMask {
    pub per_series: Vec<Vec<bool>>,
}

impl SampleMask {
    pub fn n_marked(&self) -> usize {
        self.per_series
            .iter()
            .map(|m| m.iter().filter(|b| **b).count())
            .sum()
    }
}

/// Masks produced by `split_masks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskSplits {
    pub train: SampleMask,
    pub val: SampleMask,
    pub test: SampleMask,
}

/// Split each series so that its last `ds_in_test` observations are test,
/// the `ds_in_val` before them are validation, and the rest are train.
///
/// Series shorter than the held-out tail contribute no train observations.
pub fn split_masks(series: &SeriesTable, ds_in_test: usize, ds_in_val: usize) -> MaskSplits {
    let mut train = Vec::with_capacity(series.len());
    let mut val = Vec::with_capacity(series.len());
    let mut test = Vec::with_capacity(series.len());

    for s in &series.series {
        let len = s.len();
        let test_start = len.saturating_sub(ds_in_test);
        let val_start = test_start.saturating_sub(ds_in_val);
        train.push((0..len).map(|t| t < val_start).collect());
        val.push((0..len).map(|t| t >= val_start && t < test_start).collect());
        test.push((0..len).map(|t| t >= test_start).collect());
    }

    MaskSplits {
        train: SampleMask { per_series: train },
        val: SampleMask { per_series: val },
        test: SampleMask { per_series: test },
    }
}
