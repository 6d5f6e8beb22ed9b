//! Per-member forecast frames and their median aggregation.

use crate::error::EnsembleError;
use crate::persistence::atomic_write;
use crate::training::backend::PredictionBatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// One forecast row of one ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub unique_id: usize,
    pub model: String,
    pub values: Vec<f64>,
}

/// Forecasts of a single trained configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastFrame {
    pub rows: Vec<ForecastRow>,
}

/// Tag identifying the `idx`-th trained member (1-based).
pub fn member_tag(idx: usize) -> String {
    format!("m_{idx}")
}

impl ForecastFrame {
    /// Stack the forecast half of every batch, numbering rows `0..n`.
    pub fn from_predictions(
        outputs: &[PredictionBatch],
        member_idx: usize,
    ) -> Result<Self, EnsembleError> {
        let model = member_tag(member_idx);
        let mut rows = Vec::new();
        let mut width = None;
        for values in outputs.iter().flat_map(|b| b.y_hat.iter()) {
            match width {
                None => width = Some(values.len()),
                Some(w) if w != values.len() => {
                    return Err(EnsembleError::prediction(format!(
                        "forecast rows of {model} have inconsistent lengths ({w} and {})",
                        values.len()
                    )));
                }
                Some(_) => {}
            }
            rows.push(ForecastRow {
                unique_id: rows.len(),
                model: model.clone(),
                values: values.clone(),
            });
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write as `unique_id,model,0,1,...`.
    pub fn write_csv(&self, path: &Path) -> Result<(), EnsembleError> {
        let width = self.rows.first().map_or(0, |r| r.values.len());
        let mut out = String::from("unique_id,model");
        for h in 0..width {
            let _ = write!(out, ",{h}");
        }
        out.push('\n');
        for row in &self.rows {
            let _ = write!(out, "{},{}", row.unique_id, row.model);
            for v in &row.values {
                let _ = write!(out, ",{v}");
            }
            out.push('\n');
        }
        atomic_write(path, out.as_bytes())?;
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self, EnsembleError> {
        let content = std::fs::read_to_string(path)?;
        let mut lines = content.lines();
        let header = lines
            .next()
            .ok_or_else(|| EnsembleError::dataset(format!("Empty CSV file {}", path.display())))?;
        if !header.starts_with("unique_id,model") {
            return Err(EnsembleError::dataset(format!(
                "{} is not a forecast frame (header `{header}`)",
                path.display()
            )));
        }

        let mut rows = Vec::new();
        for (line_no, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let bad = |what: &str| {
                EnsembleError::dataset(format!("{}:{}: {what}", path.display(), line_no + 2))
            };
            let mut fields = line.split(',').map(str::trim);
            let unique_id = fields
                .next()
                .and_then(|f| f.parse().ok())
                .ok_or_else(|| bad("invalid unique_id"))?;
            let model = fields
                .next()
                .ok_or_else(|| bad("missing model tag"))?
                .to_string();
            let values = fields
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| bad(&e.to_string()))?;
            rows.push(ForecastRow {
                unique_id,
                model,
                values,
            });
        }
        Ok(Self { rows })
    }
}

/// Median forecast per series across all ensemble members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleForecast {
    /// `(unique_id, values)`, ordered by id.
    pub rows: Vec<(usize, Vec<f64>)>,
}

impl EnsembleForecast {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, unique_id: usize) -> Option<&[f64]> {
        self.rows
            .binary_search_by_key(&unique_id, |(id, _)| *id)
            .ok()
            .map(|i| self.rows[i].1.as_slice())
    }

    /// Write as `unique_id,0,1,...`.
    pub fn write_csv(&self, path: &Path) -> Result<(), EnsembleError> {
        let width = self.rows.first().map_or(0, |(_, v)| v.len());
        let mut out = String::from("unique_id");
        for h in 0..width {
            let _ = write!(out, ",{h}");
        }
        out.push('\n');
        for (id, values) in &self.rows {
            let _ = write!(out, "{id}");
            for v in values {
                let _ = write!(out, ",{v}");
            }
            out.push('\n');
        }
        atomic_write(path, out.as_bytes())?;
        Ok(())
    }
}

/// Median of the non-NaN values; midpoint of the two central values for an
/// even count. `NaN` when nothing is left.
pub fn median(values: &[f64]) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

/// Concatenate member frames and take the element-wise median per series.
pub fn aggregate_median(frames: &[ForecastFrame]) -> Result<EnsembleForecast, EnsembleError> {
    let mut grouped: BTreeMap<usize, Vec<&[f64]>> = BTreeMap::new();
    for row in frames.iter().flat_map(|f| f.rows.iter()) {
        grouped
            .entry(row.unique_id)
            .or_default()
            .push(row.values.as_slice());
    }

    let mut rows = Vec::with_capacity(grouped.len());
    for (unique_id, members) in grouped {
        let width = members[0].len();
        if let Some(bad) = members.iter().find(|m| m.len() != width) {
            return Err(EnsembleError::aggregation(format!(
                "series {unique_id} has forecasts of length {width} and {}",
                bad.len()
            )));
        }
        let values = (0..width)
            .map(|h| median(&members.iter().map(|m| m[h]).collect::<Vec<_>>()))
            .collect::<Vec<f64>>();
        rows.push((unique_id, values));
    }

    tracing::debug!(
        n_frames = frames.len(),
        n_series = rows.len(),
        "Aggregated ensemble forecasts"
    );
    Ok(EnsembleForecast { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn frame(idx: usize, forecasts: Vec<Vec<f64>>) -> ForecastFrame {
        ForecastFrame::from_predictions(
            &[PredictionBatch {
                y_true: forecasts.clone(),
                y_hat: forecasts,
            }],
            idx,
        )
        .unwrap()
    }

    #[test]
    fn test_two_member_median() {
        let forecast =
            aggregate_median(&[frame(1, vec![vec![10.0, 20.0]]), frame(2, vec![vec![12.0, 18.0]])])
                .unwrap();
        assert_eq!(forecast.rows, vec![(0, vec![11.0, 19.0])]);
    }

    #[test]
    fn test_odd_count_and_outlier() {
        let forecast = aggregate_median(&[
            frame(1, vec![vec![1.0]]),
            frame(2, vec![vec![2.0]]),
            frame(3, vec![vec![1000.0]]),
        ])
        .unwrap();
        assert_eq!(forecast.get(0), Some(&[2.0][..]));
    }

    #[test]
    fn test_median_skips_nan() {
        assert_eq!(median(&[1.0, f64::NAN, 3.0]), 2.0);
        assert!(median(&[f64::NAN]).is_nan());
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_frame_rows_span_batches() {
        let outputs = vec![
            PredictionBatch {
                y_true: vec![vec![0.0]; 2],
                y_hat: vec![vec![1.0], vec![2.0]],
            },
            PredictionBatch {
                y_true: vec![vec![0.0]],
                y_hat: vec![vec![3.0]],
            },
        ];
        let frame = ForecastFrame::from_predictions(&outputs, 4).unwrap();
        let ids: Vec<_> = frame.rows.iter().map(|r| r.unique_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(frame.rows.iter().all(|r| r.model == "m_4"));
        assert_eq!(frame.rows[2].values, vec![3.0]);
    }

    #[test]
    fn test_inconsistent_widths_rejected() {
        let err = aggregate_median(&[frame(1, vec![vec![1.0, 2.0]]), frame(2, vec![vec![1.0]])])
            .unwrap_err();
        assert!(matches!(err, EnsembleError::Aggregation(_)));

        let outputs = [PredictionBatch {
            y_true: Vec::new(),
            y_hat: vec![vec![1.0], vec![1.0, 2.0]],
        }];
        assert!(ForecastFrame::from_predictions(&outputs, 1).is_err());
    }

    #[test]
    fn test_frame_csv_roundtrip_feeds_aggregation() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("m_1.csv");
        let b = dir.path().join("m_2.csv");
        frame(1, vec![vec![10.0, 20.0], vec![1.0, 1.0]]).write_csv(&a).unwrap();
        frame(2, vec![vec![12.0, 18.0], vec![3.0, 5.0]]).write_csv(&b).unwrap();

        let frames = vec![
            ForecastFrame::read_csv(&a).unwrap(),
            ForecastFrame::read_csv(&b).unwrap(),
        ];
        let forecast = aggregate_median(&frames).unwrap();
        assert_eq!(
            forecast.rows,
            vec![(0, vec![11.0, 19.0]), (1, vec![2.0, 3.0])]
        );

        let out = dir.path().join("forecast.csv");
        forecast.write_csv(&out).unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(content, "unique_id,0,1\n0,11,19\n1,2,3\n");
    }
}
