//! Batched loaders over `WindowsDataset`s and the per-row loader factory.

use crate::data::mask::split_masks;
use crate::data::source::{SeriesTable, StaticTable};
use crate::data::windows::{Window, WindowSpec, WindowsDataset};
use crate::error::EnsembleError;
use crate::training::grid::HyperparameterRow;
use crate::training::model::RowReader;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Batching behaviour of a `TimeSeriesLoader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Top up a short final batch with resampled windows.
    pub eq_batch_size: bool,
    pub shuffle: bool,
    /// Worker count handed through to the training backend.
    pub num_workers: usize,
    pub seed: u64,
}

/// A batch of windows cut from the loader's dataset.
#[derive(Debug, Clone)]
pub struct Batch {
    pub windows: Vec<Window>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Read-only batch iterator over a shared dataset.
#[derive(Debug, Clone)]
pub struct TimeSeriesLoader {
    dataset: Arc<WindowsDataset>,
    options: LoaderOptions,
}

impl TimeSeriesLoader {
    pub fn new(dataset: Arc<WindowsDataset>, options: LoaderOptions) -> Result<Self, EnsembleError> {
        if options.batch_size == 0 {
            return Err(EnsembleError::dataset("batch_size must be positive"));
        }
        Ok(Self { dataset, options })
    }

    pub fn dataset(&self) -> &WindowsDataset {
        &self.dataset
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn n_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.options.batch_size)
    }

    /// Batches for one pass over the data.
    ///
    /// Shuffling and top-up sampling are seeded from the loader seed and
    /// `epoch`, so a given epoch always yields the same batches. Only the
    /// batch order is planned up front; each batch's windows are cut when the
    /// iterator reaches it.
    pub fn batches(&self, epoch: u64) -> Batches<'_> {
        Batches {
            dataset: &self.dataset,
            plan: self.plan(epoch).into_iter(),
        }
    }

    fn plan(&self, epoch: u64) -> Vec<Vec<usize>> {
        let n = self.dataset.len();
        if n == 0 {
            return Vec::new();
        }

        let mut rng = StdRng::seed_from_u64(self.options.seed.wrapping_add(epoch));
        let mut order: Vec<usize> = (0..n).collect();
        if self.options.shuffle {
            order.shuffle(&mut rng);
        }

        let mut plan: Vec<Vec<usize>> = order
            .chunks(self.options.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        if self.options.eq_batch_size {
            if let Some(last) = plan.last_mut() {
                while last.len() < self.options.batch_size {
                    last.push(rng.gen_range(0..n));
                }
            }
        }
        plan
    }
}

/// Iterator over one epoch of batches, see `TimeSeriesLoader::batches`.
#[derive(Debug)]
pub struct Batches<'a> {
    dataset: &'a WindowsDataset,
    plan: std::vec::IntoIter<Vec<usize>>,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let indices = self.plan.next()?;
        Some(Batch {
            windows: indices.into_iter().map(|i| self.dataset.window(i)).collect(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.plan.size_hint()
    }
}

impl ExactSizeIterator for Batches<'_> {}

/// Loader-relevant subset of a resolved hyperparameter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderParams {
    pub n_time_in: usize,
    pub n_time_out: usize,
    pub batch_size: usize,
    pub train_sample_freq: usize,
}

impl LoaderParams {
    pub fn from_row(row: &HyperparameterRow) -> Result<Self, EnsembleError> {
        let mut r = RowReader::new(row);
        let params = Self {
            n_time_in: r.usize("n_time_in"),
            n_time_out: r.usize("n_time_out"),
            batch_size: r.usize("batch_size"),
            train_sample_freq: r.usize("train_sample_freq"),
        };
        let problems = r.finish();
        if problems.is_empty() {
            Ok(params)
        } else {
            Err(EnsembleError::InvalidHyperparameters(problems))
        }
    }
}

/// Train, validation and test loaders for one data shape.
#[derive(Debug, Clone)]
pub struct Loaders {
    pub train: TimeSeriesLoader,
    pub val: TimeSeriesLoader,
    pub test: TimeSeriesLoader,
}

/// Build the three loaders for one outer grid row.
///
/// The last `n_time_out` observations of every series are held out. Training
/// and validation iterate the same incomplete-window dataset over the rest;
/// the test loader yields one complete window per series whose output is the
/// held-out tail.
pub fn create_loaders(
    series: &Arc<SeriesTable>,
    statics: &Arc<StaticTable>,
    params: &LoaderParams,
    num_workers: usize,
) -> Result<Loaders, EnsembleError> {
    tracing::info!(n_time_in = params.n_time_in, "Instantiating loaders...");

    let splits = split_masks(series, 0, params.n_time_out);

    let train_dataset = Arc::new(WindowsDataset::new(
        Arc::clone(series),
        Arc::clone(statics),
        splits.train,
        WindowSpec {
            input_size: params.n_time_in,
            output_size: params.n_time_out,
            sample_freq: params.train_sample_freq,
            complete_sample: false,
        },
    )?);

    let test_dataset = Arc::new(WindowsDataset::new(
        Arc::clone(series),
        Arc::clone(statics),
        splits.val,
        WindowSpec {
            input_size: params.n_time_in,
            output_size: params.n_time_out,
            sample_freq: params.train_sample_freq,
            complete_sample: true,
        },
    )?);

    let options = |eq_batch_size, shuffle| LoaderOptions {
        batch_size: params.batch_size,
        eq_batch_size,
        shuffle,
        num_workers,
        seed: 0,
    };

    let loaders = Loaders {
        train: TimeSeriesLoader::new(Arc::clone(&train_dataset), options(true, true))?,
        val: TimeSeriesLoader::new(train_dataset, options(true, false))?,
        test: TimeSeriesLoader::new(test_dataset, options(false, false))?,
    };

    tracing::info!(
        train_windows = loaders.train.dataset().len(),
        test_windows = loaders.test.dataset().len(),
        "Data loaders ready"
    );
    Ok(loaders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::Series;
    use serde_json::json;

    fn table(n_series: usize, len: usize) -> Arc<SeriesTable> {
        Arc::new(SeriesTable {
            series: (0..n_series)
                .map(|i| Series {
                    unique_id: format!("S{i}"),
                    ds: (0..len).map(|t| t.to_string()).collect(),
                    y: (0..len).map(|t| (i * 100 + t) as f64).collect(),
                })
                .collect(),
        })
    }

    fn no_statics() -> Arc<StaticTable> {
        Arc::new(StaticTable::default())
    }

    fn params(batch_size: usize) -> LoaderParams {
        LoaderParams {
            n_time_in: 4,
            n_time_out: 2,
            batch_size,
            train_sample_freq: 1,
        }
    }

    #[test]
    fn test_test_loader_has_one_window_per_series() {
        let loaders = create_loaders(&table(3, 10), &no_statics(), &params(2), 1).unwrap();
        assert_eq!(loaders.test.dataset().len(), 3);
        let batches: Vec<Batch> = loaders.test.batches(0).collect();
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![2, 1]);
        let ids: Vec<_> = batches
            .iter()
            .flat_map(|b| b.windows.iter().map(|w| w.series_idx))
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_train_and_val_share_dataset() {
        let loaders = create_loaders(&table(2, 10), &no_statics(), &params(4), 2).unwrap();
        assert!(std::ptr::eq(loaders.train.dataset(), loaders.val.dataset()));
        assert!(loaders.train.options().shuffle);
        assert!(!loaders.val.options().shuffle);
        assert!(!loaders.test.options().eq_batch_size);
        assert_eq!(loaders.test.options().num_workers, 2);
    }

    #[test]
    fn test_eq_batch_size_tops_up_last_batch() {
        let loaders = create_loaders(&table(1, 10), &no_statics(), &params(5), 1).unwrap();
        // 7 train windows -> batches of 5 and 2 topped up to 5.
        assert_eq!(loaders.train.dataset().len(), 7);
        for batch in loaders.train.batches(0) {
            assert_eq!(batch.len(), 5);
        }
    }

    #[test]
    fn test_shuffle_is_deterministic_per_epoch() {
        let loaders = create_loaders(&table(4, 12), &no_statics(), &params(3), 1).unwrap();
        let cutoffs = |epoch| {
            loaders
                .train
                .batches(epoch)
                .flat_map(|b| b.windows.into_iter().map(|w| (w.series_idx, w.cutoff)))
                .collect::<Vec<_>>()
        };
        assert_eq!(cutoffs(3), cutoffs(3));
    }

    #[test]
    fn test_train_windows_index_shared_series() {
        // 2,000 monthly-sized series: 234 observations, 18 held out.
        let series = table(2_000, 234);
        let params = LoaderParams {
            n_time_in: 126,
            n_time_out: 18,
            batch_size: 1024,
            train_sample_freq: 1,
        };
        let loaders = create_loaders(&series, &no_statics(), &params, 1).unwrap();

        // Cutoffs 1..=215 touch the 216 training observations.
        assert_eq!(loaders.train.dataset().len(), 2_000 * 215);
        assert_eq!(loaders.test.dataset().len(), 2_000);
        assert!(Arc::ptr_eq(loaders.train.dataset().series(), &series));
        assert!(Arc::ptr_eq(loaders.test.dataset().series(), &series));

        let mut batches = loaders.train.batches(0);
        assert_eq!(batches.len(), loaders.train.n_batches());
        let first = batches.next().unwrap();
        assert_eq!(first.len(), 1024);
        assert!(first.windows.iter().all(|w| w.insample_y.len() == 126));
        assert_eq!(batches.len(), loaders.train.n_batches() - 1);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = create_loaders(&table(1, 10), &no_statics(), &params(0), 1).unwrap_err();
        assert!(matches!(err, EnsembleError::Dataset(_)));
    }

    #[test]
    fn test_loader_params_from_row_coerces() {
        let mut row = HyperparameterRow::new();
        row.insert("n_time_in".into(), json!(12));
        row.insert("n_time_out".into(), json!(6));
        row.insert("batch_size".into(), json!(1024.0));
        row.insert("train_sample_freq".into(), json!(1));
        let p = LoaderParams::from_row(&row).unwrap();
        assert_eq!(p.batch_size, 1024);

        row.remove("batch_size");
        assert!(LoaderParams::from_row(&row).is_err());
    }
}
