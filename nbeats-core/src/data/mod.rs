//! Data plumbing — raw series tables, sample masks, windowed datasets, loaders.

pub mod loader;
pub mod mask;
pub mod source;
pub mod windows;

pub use loader::{Loaders, LoaderParams, TimeSeriesLoader, create_loaders};
pub use source::{CsvSeriesSource, SeriesSource, SeriesTable, StaticTable};
pub use windows::{Window, WindowsDataset};
