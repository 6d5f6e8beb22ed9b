//! Fixed-size input/output windows cut from every series.

use crate::data::mask::SampleMask;
use crate::data::source::{SeriesTable, StaticTable};
use crate::error::EnsembleError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shape and sampling rules for a `WindowsDataset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub input_size: usize,
    pub output_size: usize,
    /// Keep every k-th window, counted back from the most recent one.
    pub sample_freq: usize,
    /// Only keep windows whose whole output lies inside the sample mask.
    pub complete_sample: bool,
}

/// One training/prediction example, cut from its series on request.
///
/// Positions before the start or past the end of the series are zero with a
/// `false` mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub series_idx: usize,
    /// Index of the first output step within the series.
    pub cutoff: usize,
    pub insample_y: Vec<f64>,
    pub insample_mask: Vec<bool>,
    pub outsample_y: Vec<f64>,
    pub outsample_mask: Vec<bool>,
    pub static_features: Vec<f64>,
}

/// Position of a sampled window: which series, and where its output starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowIndex {
    pub series_idx: usize,
    pub cutoff: usize,
}

/// Sampled windows of every series, ordered by series then by cutoff.
///
/// Only the `(series, cutoff)` index is stored. The series and static
/// tables are shared, and window values are copied out by `window`.
#[derive(Debug, Clone)]
pub struct WindowsDataset {
    spec: WindowSpec,
    series: Arc<SeriesTable>,
    statics: Arc<StaticTable>,
    mask: SampleMask,
    index: Vec<WindowIndex>,
}

impl WindowsDataset {
    pub fn new(
        series: Arc<SeriesTable>,
        statics: Arc<StaticTable>,
        mask: SampleMask,
        spec: WindowSpec,
    ) -> Result<Self, EnsembleError> {
        if spec.input_size == 0 || spec.output_size == 0 {
            return Err(EnsembleError::dataset(format!(
                "window sizes must be positive (input_size = {}, output_size = {})",
                spec.input_size, spec.output_size
            )));
        }
        if spec.sample_freq == 0 {
            return Err(EnsembleError::dataset("sample_freq must be positive"));
        }
        if mask.per_series.len() != series.len() {
            return Err(EnsembleError::dataset(format!(
                "mask covers {} series but the table has {}",
                mask.per_series.len(),
                series.len()
            )));
        }

        let mut index = Vec::new();
        for (series_idx, (s, sample)) in series.series.iter().zip(&mask.per_series).enumerate() {
            if sample.len() != s.len() {
                return Err(EnsembleError::dataset(format!(
                    "mask for series {} has {} entries for {} observations",
                    s.unique_id,
                    sample.len(),
                    s.len()
                )));
            }

            let cutoffs: Vec<usize> = (1..=s.len())
                .filter(|&t| Self::is_sampled(sample, t, &spec))
                .collect();
            let start = index.len();
            index.extend(
                cutoffs
                    .iter()
                    .rev()
                    .step_by(spec.sample_freq)
                    .map(|&cutoff| WindowIndex { series_idx, cutoff }),
            );
            index[start..].reverse();
        }

        Ok(Self {
            spec,
            series,
            statics,
            mask,
            index,
        })
    }

    fn is_sampled(sample: &[bool], cutoff: usize, spec: &WindowSpec) -> bool {
        let end = cutoff + spec.output_size;
        if spec.complete_sample {
            end <= sample.len() && sample[cutoff..end].iter().all(|b| *b)
        } else {
            sample[cutoff..end.min(sample.len())].iter().any(|b| *b)
        }
    }

    /// Cut the `i`-th window. Panics when `i >= len()`, like slice indexing.
    pub fn window(&self, i: usize) -> Window {
        let WindowIndex { series_idx, cutoff } = self.index[i];
        let s = &self.series.series[series_idx];
        let sample = &self.mask.per_series[series_idx];
        let spec = &self.spec;

        let mut insample_y = vec![0.0; spec.input_size];
        let mut insample_mask = vec![false; spec.input_size];
        let pad = spec.input_size.saturating_sub(cutoff);
        let start = cutoff.saturating_sub(spec.input_size);
        insample_y[pad..].copy_from_slice(&s.y[start..cutoff]);
        insample_mask[pad..].fill(true);

        let mut outsample_y = vec![0.0; spec.output_size];
        let mut outsample_mask = vec![false; spec.output_size];
        for j in 0..spec.output_size {
            let t = cutoff + j;
            if t < s.y.len() {
                outsample_y[j] = s.y[t];
                outsample_mask[j] = sample[t];
            }
        }

        Window {
            series_idx,
            cutoff,
            insample_y,
            insample_mask,
            outsample_y,
            outsample_mask,
            static_features: self.statics.features(&s.unique_id).to_vec(),
        }
    }

    /// Every window in order, cut one at a time.
    pub fn iter(&self) -> impl Iterator<Item = Window> + '_ {
        (0..self.index.len()).map(|i| self.window(i))
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    pub fn index(&self) -> &[WindowIndex] {
        &self.index
    }

    pub fn series(&self) -> &Arc<SeriesTable> {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn n_series(&self) -> usize {
        self.series.len()
    }

    pub fn n_static(&self) -> usize {
        self.statics.n_features()
    }
}
