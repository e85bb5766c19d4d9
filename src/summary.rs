//! Descriptive statistics of the cleaned series
//!
//! Count, mean, sample standard deviation, min, quartiles and max for each
//! recorded channel. Quartiles interpolate linearly between the closest ranks.

use serde::{Deserialize, Serialize};

use crate::types::SampleSeries;

/// Statistics of one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` below two values
    pub std: Option<f64>,
    pub min: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub max: f64,
}

impl ChannelSummary {
    /// Summarize `values`, or `None` when there are none
    pub fn describe(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std = (count > 1).then(|| {
            let squares: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (squares / (count - 1) as f64).sqrt()
        });

        Some(Self {
            count,
            mean,
            std,
            min: sorted[0],
            p25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            p75: quantile(&sorted, 0.75),
            max: sorted[count - 1],
        })
    }
}

/// Statistics of every channel in a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub smo2_primary: ChannelSummary,
    pub smo2_secondary: Option<ChannelSummary>,
    pub power: ChannelSummary,
}

impl SeriesSummary {
    pub fn from_series(series: &SampleSeries) -> Option<Self> {
        let samples = series.samples();
        Some(Self {
            smo2_primary: ChannelSummary::describe(samples.iter().map(|s| s.smo2_primary))?,
            smo2_secondary: ChannelSummary::describe(
                samples.iter().filter_map(|s| s.smo2_secondary),
            ),
            power: ChannelSummary::describe(samples.iter().map(|s| s.power))?,
        })
    }
}

/// Quantile of sorted, non-empty values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
