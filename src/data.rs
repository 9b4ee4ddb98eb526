//! Column-oriented table holding measured spectra and calculated results.

use crate::error::{Result, SpectraFitError};
use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Table of named, equal-length columns.
///
/// A fit reads the independent axis and one intensity column per spectrum
/// from here; the reconstructor appends fit, residual, and per-component
/// columns after the fit. Column order is insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "IndexMap<String, Vec<f64>>", try_from = "IndexMap<String, Vec<f64>>")]
pub struct SpectraTable {
    columns: IndexMap<String, Array1<f64>>,
}

impl SpectraTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a column, replacing any column of the same name.
    ///
    /// Every column must match the length of the columns already present.
    pub fn insert(&mut self, name: &str, column: Array1<f64>) -> Result<()> {
        if let Some(expected) = self.row_count_excluding(name) {
            if column.len() != expected {
                return Err(SpectraFitError::DimensionMismatch(format!(
                    "column '{}' has {} rows, table has {}",
                    name,
                    column.len(),
                    expected
                )));
            }
        }
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    /// Row count implied by the other columns, ignoring the one being
    /// replaced.
    fn row_count_excluding(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|(existing, _)| existing.as_str() != name)
            .map(|(_, column)| column.len())
    }

    pub fn column(&self, name: &str) -> Result<&Array1<f64>> {
        self.columns
            .get(name)
            .ok_or_else(|| SpectraFitError::ColumnNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Array1<f64>> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Array1<f64>)> {
        self.columns.iter()
    }

    pub fn n_rows(&self) -> usize {
        self.columns
            .first()
            .map(|(_, column)| column.len())
            .unwrap_or(0)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl From<SpectraTable> for IndexMap<String, Vec<f64>> {
    fn from(table: SpectraTable) -> Self {
        table
            .columns
            .into_iter()
            .map(|(name, column)| (name, column.to_vec()))
            .collect()
    }
}

impl TryFrom<IndexMap<String, Vec<f64>>> for SpectraTable {
    type Error = SpectraFitError;

    fn try_from(columns: IndexMap<String, Vec<f64>>) -> Result<Self> {
        let mut table = SpectraTable::new();
        for (name, column) in columns {
            table.insert(&name, Array1::from(column))?;
        }
        Ok(table)
    }
}
