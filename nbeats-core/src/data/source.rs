//! Raw series and static-feature tables, and where they are loaded from.

use crate::error::EnsembleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Observations of a single series, in time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub unique_id: String,
    pub ds: Vec<String>,
    pub y: Vec<f64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// All series of one frequency group (the long `unique_id, ds, y` table).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesTable {
    pub series: Vec<Series>,
}

impl SeriesTable {
    /// Group long-format rows by `unique_id`, keeping first-appearance order
    /// of ids and file order of observations within an id.
    pub fn from_long_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String, f64)>,
    {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut series: Vec<Series> = Vec::new();
        for (unique_id, ds, y) in rows {
            let pos = *index.entry(unique_id.clone()).or_insert_with(|| {
                series.push(Series {
                    unique_id,
                    ds: Vec::new(),
                    y: Vec::new(),
                });
                series.len() - 1
            });
            series[pos].ds.push(ds);
            series[pos].y.push(y);
        }
        Self { series }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn n_observations(&self) -> usize {
        self.series.iter().map(Series::len).sum()
    }
}

/// Per-series static features (the `S_df` table).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticTable {
    pub columns: Vec<String>,
    pub rows: BTreeMap<String, Vec<f64>>,
}

impl StaticTable {
    /// Features for a series; empty when the series has none.
    pub fn features(&self, unique_id: &str) -> &[f64] {
        self.rows.get(unique_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }
}

/// Where a frequency group's raw tables come from.
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Load the series and static tables for a group (e.g. `"Monthly"`).
    async fn load(&self, group: &str) -> Result<(SeriesTable, StaticTable), EnsembleError>;
}

// ---------------------------------------------------------------------------
// CsvSeriesSource
// ---------------------------------------------------------------------------

/// Reads `{directory}/{group}/Y_df.csv` and, when present, `S_df.csv`.
///
/// `Y_df.csv` has the header `unique_id,ds,y`; `S_df.csv` has `unique_id`
/// followed by one numeric column per static feature.
#[derive(Debug, Clone)]
pub struct CsvSeriesSource {
    pub directory: PathBuf,
    pub delimiter: char,
}

impl CsvSeriesSource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            delimiter: ',',
        }
    }

    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.directory.join(group)
    }
}

#[async_trait]
impl SeriesSource for CsvSeriesSource {
    async fn load(&self, group: &str) -> Result<(SeriesTable, StaticTable), EnsembleError> {
        let dir = self.group_dir(group);
        let y_path = dir.join("Y_df.csv");
        let content = tokio::fs::read_to_string(&y_path).await.map_err(|e| {
            EnsembleError::dataset(format!("Failed to read {}: {e}", y_path.display()))
        })?;
        let series = parse_series_csv(&content, self.delimiter, &y_path)?;

        let s_path = dir.join("S_df.csv");
        let statics = if tokio::fs::try_exists(&s_path).await? {
            let content = tokio::fs::read_to_string(&s_path).await?;
            parse_static_csv(&content, self.delimiter, &s_path)?
        } else {
            StaticTable::default()
        };

        tracing::info!(
            group,
            n_series = series.len(),
            n_observations = series.n_observations(),
            n_static = statics.n_features(),
            "Loaded series tables"
        );
        Ok((series, statics))
    }
}

fn split_line(line: &str, delimiter: char) -> Vec<&str> {
    line.split(delimiter)
        .map(|s| s.trim().trim_matches('"'))
        .collect()
}

fn parse_series_csv(
    content: &str,
    delimiter: char,
    path: &Path,
) -> Result<SeriesTable, EnsembleError> {
    let mut lines = content.lines();
    let header = split_line(
        lines
            .next()
            .ok_or_else(|| EnsembleError::dataset(format!("Empty CSV file {}", path.display())))?,
        delimiter,
    );
    let column = |name: &str| {
        header.iter().position(|c| *c == name).ok_or_else(|| {
            EnsembleError::dataset(format!("{} has no `{name}` column", path.display()))
        })
    };
    let (id_col, ds_col, y_col) = (column("unique_id")?, column("ds")?, column("y")?);

    let mut rows = Vec::new();
    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_line(line, delimiter);
        let get = |idx: usize| {
            fields.get(idx).copied().ok_or_else(|| {
                EnsembleError::dataset(format!(
                    "{}:{}: expected {} fields, found {}",
                    path.display(),
                    line_no + 2,
                    header.len(),
                    fields.len()
                ))
            })
        };
        let raw_y = get(y_col)?;
        let y = raw_y.parse::<f64>().map_err(|_| {
            EnsembleError::dataset(format!(
                "{}:{}: `y` is not numeric: {raw_y:?}",
                path.display(),
                line_no + 2
            ))
        })?;
        rows.push((get(id_col)?.to_string(), get(ds_col)?.to_string(), y));
    }
    Ok(SeriesTable::from_long_rows(rows))
}

fn parse_static_csv(
    content: &str,
    delimiter: char,
    path: &Path,
) -> Result<StaticTable, EnsembleError> {
    let mut lines = content.lines();
    let header = split_line(
        lines
            .next()
            .ok_or_else(|| EnsembleError::dataset(format!("Empty CSV file {}", path.display())))?,
        delimiter,
    );
    if header.first() != Some(&"unique_id") {
        return Err(EnsembleError::dataset(format!(
            "{} must start with a `unique_id` column",
            path.display()
        )));
    }
    let columns: Vec<String> = header[1..].iter().map(|c| c.to_string()).collect();

    let mut rows = BTreeMap::new();
    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_line(line, delimiter);
        if fields.len() != header.len() {
            return Err(EnsembleError::dataset(format!(
                "{}:{}: expected {} fields, found {}",
                path.display(),
                line_no + 2,
                header.len(),
                fields.len()
            )));
        }
        let values = fields[1..]
            .iter()
            .map(|v| v.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                EnsembleError::dataset(format!("{}:{}: {e}", path.display(), line_no + 2))
            })?;
        rows.insert(fields[0].to_string(), values);
    }
    Ok(StaticTable { columns, rows })
}
