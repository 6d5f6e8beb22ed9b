//! Parameter grids and their Cartesian expansion.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One resolved configuration: parameter name -> scalar (or list-valued) choice.
pub type HyperparameterRow = serde_json::Map<String, Value>;

/// Ordered mapping from parameter name to its candidate values.
///
/// Insertion order is kept so the first parameter varies slowest on expansion
/// and printed tables list parameters the way they were declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    params: Vec<(String, Vec<Value>)>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Insert or replace the candidates for `name`.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<Value>) {
        let name = name.into();
        match self.params.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = values,
            None => self.params.push((name, values)),
        }
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<Value>> {
        let pos = self.params.iter().position(|(k, _)| k == name)?;
        Some(self.params.remove(pos).1)
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Union of two grids; keys in `other` win.
    pub fn merged(&self, other: &ParameterGrid) -> ParameterGrid {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.insert(k, v.to_vec());
        }
        out
    }

    /// Number of rows `expand` will produce.
    pub fn combinations(&self) -> usize {
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    /// Full Cartesian product, one row per combination.
    pub fn expand(&self) -> Vec<HyperparameterRow> {
        let mut rows = vec![HyperparameterRow::new()];
        for (key, values) in &self.params {
            let mut next = Vec::with_capacity(rows.len() * values.len());
            for row in &rows {
                for value in values {
                    let mut r = row.clone();
                    r.insert(key.clone(), value.clone());
                    next.push(r);
                }
            }
            rows = next;
        }
        rows
    }
}

/// Overlay `inner` onto `outer`; inner choices win on shared keys.
pub fn merge_rows(outer: &HyperparameterRow, inner: &HyperparameterRow) -> HyperparameterRow {
    let mut merged = outer.clone();
    for (k, v) in inner {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_row_count() {
        let grid = ParameterGrid::new()
            .with("loss_train", vec![json!("MAPE"), json!("SMAPE")])
            .with("random_seed", vec![json!(1), json!(2), json!(3)])
            .with("lookbacks", vec![json!(2)]);
        assert_eq!(grid.combinations(), 6);
        assert_eq!(grid.expand().len(), 6);
    }

    #[test]
    fn test_first_parameter_varies_slowest() {
        let grid = ParameterGrid::new()
            .with("a", vec![json!(1), json!(2)])
            .with("b", vec![json!("x"), json!("y")]);
        let rows = grid.expand();
        let pairs: Vec<_> = rows.iter().map(|r| (r["a"].clone(), r["b"].clone())).collect();
        assert_eq!(
            pairs,
            vec![
                (json!(1), json!("x")),
                (json!(1), json!("y")),
                (json!(2), json!("x")),
                (json!(2), json!("y")),
            ]
        );
    }

    #[test]
    fn test_empty_grid_yields_single_empty_row() {
        let rows = ParameterGrid::new().expand();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_empty());
    }

    #[test]
    fn test_empty_candidate_list_yields_no_rows() {
        let grid = ParameterGrid::new()
            .with("a", vec![json!(1)])
            .with("b", Vec::new());
        assert!(grid.expand().is_empty());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut grid = ParameterGrid::new()
            .with("a", vec![json!(1)])
            .with("b", vec![json!(2)]);
        grid.insert("a", vec![json!(5), json!(6)]);
        assert_eq!(grid.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(grid.get("a").unwrap().len(), 2);
        assert_eq!(grid.remove("b"), Some(vec![json!(2)]));
        assert!(!grid.contains("b"));
    }

    #[test]
    fn test_merge_rows_inner_wins() {
        let mut outer = HyperparameterRow::new();
        outer.insert("n_time_in".into(), json!(12));
        outer.insert("learning_rate".into(), json!(0.0001));
        let mut inner = HyperparameterRow::new();
        inner.insert("learning_rate".into(), json!(0.001));
        let merged = merge_rows(&outer, &inner);
        assert_eq!(merged["n_time_in"], json!(12));
        assert_eq!(merged["learning_rate"], json!(0.001));
    }
}
