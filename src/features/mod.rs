use tracing::info;

use crate::types::{FeatureFrame, FeatureRow, RawRecord};

pub const WINDOW_SHORT: usize = 5;
pub const WINDOW_MEDIUM: usize = 20;
pub const WINDOW_LONG: usize = 60;
pub const VOLATILITY_WINDOW: usize = 20;

/// Rows at the head of the series that cannot carry the longest rolling
/// feature and are dropped from the output.
pub const WARM_UP_ROWS: usize = WINDOW_LONG - 1;

/// Derives the engineered indicator columns from raw records. Pure and
/// deterministic; every output row depends only on observations at or
/// before its own timestamp.
pub struct FeatureEngine;

impl FeatureEngine {
    pub fn columns() -> Vec<String> {
        [
            "open",
            "high",
            "low",
            "close",
            "volume",
            "daily_return",
            "ma_5",
            "ma_20",
            "ma_60",
            "volatility",
            "volume_ma_5",
            "high_low_ratio",
            "open_close_ratio",
            "volume_change",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect()
    }

    pub fn transform(records: &[RawRecord]) -> FeatureFrame {
        let mut frame = FeatureFrame::new(Self::columns());
        if records.len() < WINDOW_LONG {
            info!(
                "Only {} records supplied; {} needed for the {}-row window, returning empty frame",
                records.len(),
                WINDOW_LONG,
                WINDOW_LONG
            );
            return frame;
        }

        let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
        let volumes: Vec<f64> = records.iter().map(|r| r.volume).collect();
        let returns = percent_change(&closes);

        for t in WARM_UP_ROWS..records.len() {
            let r = &records[t];
            let daily_return = returns[t];

            let row = FeatureRow {
                timestamp: r.timestamp,
                values: vec![
                    r.open,
                    r.high,
                    r.low,
                    r.close,
                    r.volume,
                    daily_return,
                    trailing_mean(&closes, t, WINDOW_SHORT),
                    trailing_mean(&closes, t, WINDOW_MEDIUM),
                    trailing_mean(&closes, t, WINDOW_LONG),
                    trailing_std(&returns, t, VOLATILITY_WINDOW),
                    trailing_mean(&volumes, t, WINDOW_SHORT),
                    r.high / r.low,
                    r.open / r.close,
                    percent_change_at(&volumes, t),
                ],
            };
            frame.rows.push(row);
        }

        info!(
            "Derived {} feature rows from {} records ({} warm-up rows dropped)",
            frame.len(),
            records.len(),
            WARM_UP_ROWS
        );

        frame
    }
}

fn percent_change(series: &[f64]) -> Vec<f64> {
    (0..series.len())
        .map(|t| percent_change_at(series, t))
        .collect()
}

fn percent_change_at(series: &[f64], t: usize) -> f64 {
    if t == 0 {
        f64::NAN
    } else {
        (series[t] - series[t - 1]) / series[t - 1]
    }
}

/// Simple mean of the trailing `window` values ending at index t inclusive.
fn trailing_mean(series: &[f64], t: usize, window: usize) -> f64 {
    let slice = &series[t + 1 - window..=t];
    slice.iter().sum::<f64>() / window as f64
}

/// Sample standard deviation (ddof = 1) over the trailing window.
fn trailing_std(series: &[f64], t: usize, window: usize) -> f64 {
    let slice = &series[t + 1 - window..=t];
    let mean = slice.iter().sum::<f64>() / window as f64;
    let variance =
        slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (window as f64 - 1.0);
    variance.sqrt()
}
