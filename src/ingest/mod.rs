use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::types::RawRecord;

const REQUIRED_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Loads a raw time-ordered table from a delimited file with a header row.
/// The first column is the date index; the remaining required columns are
/// matched by name, case-insensitively.
pub struct RecordStore;

impl RecordStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<RawRecord>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::NotFound {
                path: path.display().to_string(),
            });
        }

        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let headers = reader
            .headers()
            .map_err(|e| PipelineError::Schema(format!("unreadable header row: {}", e)))?
            .clone();

        let layout = ColumnLayout::resolve(&headers)?;

        let mut records: Vec<RawRecord> = Vec::new();
        for (i, row) in reader.records().enumerate() {
            // Header is row 1; data starts at row 2.
            let row_number = i + 2;
            let row = row.map_err(|e| PipelineError::Parse {
                row: row_number,
                message: e.to_string(),
            })?;

            let record = layout.parse_row(&row, row_number)?;

            if let Some(prev) = records.last() {
                if record.timestamp <= prev.timestamp {
                    return Err(PipelineError::Order(format!(
                        "row {}: {} does not follow {}",
                        row_number, record.timestamp, prev.timestamp
                    )));
                }
            }
            records.push(record);
        }

        info!(
            "Loaded {} records from {} ({} columns)",
            records.len(),
            path.display(),
            headers.len()
        );

        Ok(records)
    }
}

/// Drops rows carrying a non-finite observation before feature derivation,
/// logging how many were removed. Empty cells parse to NaN and land here.
pub fn drop_missing(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let before = records.len();
    let kept: Vec<RawRecord> = records.into_iter().filter(|r| r.is_finite()).collect();
    let removed = before - kept.len();
    if removed > 0 {
        warn!(
            "Dropped {} of {} rows with missing observations",
            removed, before
        );
    }
    kept
}

struct ColumnLayout {
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl ColumnLayout {
    /// Resolves required columns against the header, reporting every missing
    /// column at once rather than the first.
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let lowered: Vec<String> = headers.iter().map(|h| h.to_ascii_lowercase()).collect();

        let find = |name: &str| lowered.iter().position(|h| h == name);
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| find(c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Schema(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            open: find("open").unwrap(),
            high: find("high").unwrap(),
            low: find("low").unwrap(),
            close: find("close").unwrap(),
            volume: find("volume").unwrap(),
        })
    }

    fn parse_row(&self, row: &csv::StringRecord, row_number: usize) -> Result<RawRecord> {
        let date_field = row.get(0).unwrap_or("");
        let timestamp = NaiveDate::parse_from_str(date_field, "%Y-%m-%d").map_err(|_| {
            PipelineError::Parse {
                row: row_number,
                message: format!("invalid date '{}'", date_field),
            }
        })?;

        let number = |index: usize, name: &str| -> Result<f64> {
            let field = row.get(index).unwrap_or("");
            if field.is_empty() {
                // Missing observation; removed later by drop_missing.
                return Ok(f64::NAN);
            }
            field.parse::<f64>().map_err(|_| PipelineError::Parse {
                row: row_number,
                message: format!("invalid number '{}' in column {}", field, name),
            })
        };

        Ok(RawRecord {
            timestamp,
            open: number(self.open, "open")?,
            high: number(self.high, "high")?,
            low: number(self.low, "low")?,
            close: number(self.close, "close")?,
            volume: number(self.volume, "volume")?,
        })
    }
}
