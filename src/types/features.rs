use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Column the model forecasts one step ahead.
pub const TARGET_COLUMN: &str = "close";

/// A raw record plus derived indicator columns. Values are positional
/// against the owning frame's column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub timestamp: NaiveDate,
    pub values: Vec<f64>,
}

/// Ordered collection of feature rows sharing one column layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r.values[index]).collect()
    }

    /// Columns fed to the model: everything except the target.
    pub fn predictor_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.as_str() != TARGET_COLUMN)
            .cloned()
            .collect()
    }

    pub fn push(&mut self, row: FeatureRow) -> Result<()> {
        if row.values.len() != self.columns.len() {
            return Err(PipelineError::Shape(format!(
                "row has {} values, frame has {} columns",
                row.values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Copy of the trailing n rows (all rows when fewer exist).
    pub fn tail(&self, n: usize) -> &[FeatureRow] {
        let len = self.rows.len();
        if n >= len {
            &self.rows[..]
        } else {
            &self.rows[len - n..]
        }
    }

    pub fn first_timestamp(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.timestamp)
    }
}

/// Chronological train/test split. Every train timestamp precedes every
/// test timestamp; construction goes through `TemporalSplitter`.
#[derive(Debug, Clone)]
pub struct Partition {
    pub train: FeatureFrame,
    pub test: FeatureFrame,
}

impl Partition {
    /// Verifies the temporal invariant. Splitting never interleaves, so this
    /// only fires if a partition was assembled by hand.
    pub fn check_chronology(&self) -> Result<()> {
        if let (Some(train_last), Some(test_first)) =
            (self.train.last_timestamp(), self.test.first_timestamp())
        {
            if train_last >= test_first {
                return Err(PipelineError::Order(format!(
                    "train ends {} but test begins {}",
                    train_last, test_first
                )));
            }
        }
        Ok(())
    }
}
