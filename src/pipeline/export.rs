use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::types::{FeatureFrame, Partition, TARGET_COLUMN};

/// Writes the split partitions as timestamped CSVs for reproducibility:
/// X_train / X_test hold the predictor columns, y_train / y_test the
/// target. Debug output only; nothing downstream reads these back.
pub fn export_partition(
    partition: &Partition,
    dir: impl AsRef<Path>,
    stamp: &str,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(4);
    written.push(write_features(
        &partition.train,
        dir.join(format!("X_train_{}.csv", stamp)),
    )?);
    written.push(write_features(
        &partition.test,
        dir.join(format!("X_test_{}.csv", stamp)),
    )?);
    written.push(write_target(
        &partition.train,
        dir.join(format!("y_train_{}.csv", stamp)),
    )?);
    written.push(write_target(
        &partition.test,
        dir.join(format!("y_test_{}.csv", stamp)),
    )?);

    info!(
        "Exported partition files to {} ({} train rows, {} test rows)",
        dir.display(),
        partition.train.len(),
        partition.test.len()
    );

    Ok(written)
}

fn write_features(frame: &FeatureFrame, path: PathBuf) -> Result<PathBuf> {
    let mut file = File::create(&path)?;
    let predictors = frame.predictor_columns();
    writeln!(file, "date,{}", predictors.join(","))?;

    let idx: Vec<usize> = predictors
        .iter()
        .map(|c| frame.column_index(c).expect("predictor column exists"))
        .collect();
    for row in &frame.rows {
        let values: Vec<String> = idx.iter().map(|&i| format!("{:.6}", row.values[i])).collect();
        writeln!(file, "{},{}", row.timestamp, values.join(","))?;
    }
    Ok(path)
}

fn write_target(frame: &FeatureFrame, path: PathBuf) -> Result<PathBuf> {
    let mut file = File::create(&path)?;
    writeln!(file, "date,{}", TARGET_COLUMN)?;

    if let Some(idx) = frame.column_index(TARGET_COLUMN) {
        for row in &frame.rows {
            writeln!(file, "{},{:.6}", row.timestamp, row.values[idx])?;
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureRow;
    use chrono::NaiveDate;

    #[test]
    fn test_export_writes_four_files() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut train = FeatureFrame::new(vec!["close".into(), "ma_5".into()]);
        let mut test = FeatureFrame::new(vec!["close".into(), "ma_5".into()]);
        for i in 0..4u64 {
            train
                .push(FeatureRow {
                    timestamp: start + chrono::Days::new(i),
                    values: vec![100.0 + i as f64, 98.0],
                })
                .unwrap();
        }
        test.push(FeatureRow {
            timestamp: start + chrono::Days::new(9),
            values: vec![110.0, 99.0],
        })
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let partition = Partition { train, test };
        let files = export_partition(&partition, dir.path(), "20240110_000000").unwrap();
        assert_eq!(files.len(), 4);
        for f in &files {
            assert!(f.exists());
        }

        let x_train = std::fs::read_to_string(&files[0]).unwrap();
        assert!(x_train.starts_with("date,ma_5\n"));
        assert_eq!(x_train.lines().count(), 5);

        let y_test = std::fs::read_to_string(&files[3]).unwrap();
        assert!(y_test.contains("2024-01-10,110.000000"));
    }
}
