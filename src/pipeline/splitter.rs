use tracing::info;

use crate::error::{PipelineError, Result};
use crate::types::{FeatureFrame, Partition};

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Splits a feature frame into a chronological train prefix and test
/// suffix. Never shuffles; the split index is floor(N * (1 - fraction)).
#[derive(Debug, Clone)]
pub struct TemporalSplitter {
    test_fraction: f64,
}

impl Default for TemporalSplitter {
    fn default() -> Self {
        Self {
            test_fraction: DEFAULT_TEST_FRACTION,
        }
    }
}

impl TemporalSplitter {
    pub fn new(test_fraction: f64) -> Result<Self> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(PipelineError::Config(format!(
                "test_fraction must be inside (0, 1), got {}",
                test_fraction
            )));
        }
        Ok(Self { test_fraction })
    }

    pub fn split(&self, frame: &FeatureFrame) -> Partition {
        let n = frame.len();
        let split_index = (n as f64 * (1.0 - self.test_fraction)).floor() as usize;

        let mut train = FeatureFrame::new(frame.columns.clone());
        let mut test = FeatureFrame::new(frame.columns.clone());
        train.rows = frame.rows[..split_index].to_vec();
        test.rows = frame.rows[split_index..].to_vec();

        info!(
            "Split {} rows into {} train / {} test (test fraction {})",
            n,
            train.len(),
            test.len(),
            self.test_fraction
        );

        Partition { train, test }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureRow;
    use chrono::NaiveDate;

    fn frame(n: usize) -> FeatureFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut frame = FeatureFrame::new(vec!["close".into()]);
        for i in 0..n {
            frame
                .push(FeatureRow {
                    timestamp: start + chrono::Days::new(i as u64),
                    values: vec![i as f64],
                })
                .unwrap();
        }
        frame
    }

    #[test]
    fn test_default_fraction_split_sizes() {
        let partition = TemporalSplitter::default().split(&frame(100));
        assert_eq!(partition.train.len(), 80);
        assert_eq!(partition.test.len(), 20);
    }

    #[test]
    fn test_split_index_floors() {
        // 31 rows at 0.2 test: floor(31 * 0.8) = 24.
        let partition = TemporalSplitter::default().split(&frame(31));
        assert_eq!(partition.train.len(), 24);
        assert_eq!(partition.test.len(), 7);
    }

    #[test]
    fn test_every_train_timestamp_precedes_test() {
        let partition = TemporalSplitter::new(0.3).unwrap().split(&frame(50));
        let train_max = partition.train.last_timestamp().unwrap();
        let test_min = partition.test.first_timestamp().unwrap();
        assert!(train_max < test_min);
        partition.check_chronology().unwrap();
    }

    #[test]
    fn test_order_preserved_within_partitions() {
        let partition = TemporalSplitter::default().split(&frame(20));
        for rows in [&partition.train.rows, &partition.test.rows] {
            for pair in rows.windows(2) {
                assert!(pair[0].timestamp < pair[1].timestamp);
            }
        }
    }

    #[test]
    fn test_fraction_bounds() {
        assert!(TemporalSplitter::new(0.0).is_err());
        assert!(TemporalSplitter::new(1.0).is_err());
        assert!(TemporalSplitter::new(-0.1).is_err());
        assert!(TemporalSplitter::new(0.5).is_ok());
    }
}
