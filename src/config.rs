//! Engine configuration
//!
//! The scripts this tool replaces disagreed on a few policy choices. They are
//! explicit here:
//! - the window over which Pmin is taken (`[0, 30]` or `[5, 30]`)
//! - the baseline used for the reoxygenation level (test minimum or test start)
//! - the boundary the half-time is measured from (`t3` or the test end)

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Default effort duration (seconds)
pub const DEFAULT_TEST_DURATION: f64 = 30.0;

/// Default sub-window length for interval power (seconds)
pub const DEFAULT_INTERVAL_LENGTH: f64 = 10.0;

/// Default fraction of Pmax below which power counts as lost
pub const DEFAULT_POWER_LOSS_FRACTION: f64 = 0.8;

/// Upper bound on the number of interval-power sub-windows
pub const MAX_INTERVALS: usize = 1000;

/// Closed time window `[start, end]` in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Parse `"start,end"` (as given on the command line)
    pub fn parse(text: &str) -> Result<Self, AnalysisError> {
        let (start, end) = text.split_once(',').ok_or_else(|| {
            AnalysisError::InvalidConfig(format!("expected 'start,end', got '{}'", text))
        })?;
        let parse = |s: &str| {
            s.trim().parse::<f64>().map_err(|e| {
                AnalysisError::InvalidConfig(format!("invalid window bound '{}': {}", s, e))
            })
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }
}

/// Baseline for the reoxygenation half-time level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryBaseline {
    /// `min + 0.5 * (max_post - min)`
    #[default]
    TestMinimum,
    /// `start + 0.5 * (min - start)`: half of the desaturation amplitude
    TestStart,
}

impl RecoveryBaseline {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryBaseline::TestMinimum => "test_minimum",
            RecoveryBaseline::TestStart => "test_start",
        }
    }
}

/// Boundary the reoxygenation half-time is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalfTimeReference {
    /// The user-selected `t3`
    #[default]
    PhaseBoundary,
    /// The fixed end of the effort (`test_duration`)
    TestEnd,
}

/// Named configurations matching the historical variants of the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Pmin over the whole test, half-time from `t3`
    Standard,
    /// Pmin from 5 s (ignores the start-up ramp), half-time from the test end
    LatePmin,
}

/// Metrics engine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Effort duration; the test window is `[0, test_duration]`
    pub test_duration: f64,
    /// Length of the interval-power sub-windows
    pub interval_length: f64,
    /// Window over which Pmin is taken
    ///
    /// A window holding no samples leaves Pmin, ΔP and the fatigue index
    /// `empty_window` even when Pmax is positive.
    pub pmin_window: TimeWindow,
    /// Baseline policy for the half-time level
    pub recovery_baseline: RecoveryBaseline,
    /// Boundary the half-time is measured from
    pub half_time_reference: HalfTimeReference,
    /// Power-loss threshold as a fraction of Pmax
    pub power_loss_fraction: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            test_duration: DEFAULT_TEST_DURATION,
            interval_length: DEFAULT_INTERVAL_LENGTH,
            pmin_window: TimeWindow::new(0.0, DEFAULT_TEST_DURATION),
            recovery_baseline: RecoveryBaseline::default(),
            half_time_reference: HalfTimeReference::default(),
            power_loss_fraction: DEFAULT_POWER_LOSS_FRACTION,
        }
    }
}

impl EngineConfig {
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Standard => Self::default(),
            Preset::LatePmin => Self {
                pmin_window: TimeWindow::new(5.0, DEFAULT_TEST_DURATION),
                half_time_reference: HalfTimeReference::TestEnd,
                ..Self::default()
            },
        }
    }

    /// Load configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, AnalysisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.test_duration.is_finite() && self.test_duration > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "test_duration must be positive, got {}",
                self.test_duration
            )));
        }
        if !(self.interval_length.is_finite()
            && self.interval_length > 0.0
            && self.interval_length <= self.test_duration)
        {
            return Err(AnalysisError::InvalidConfig(format!(
                "interval_length must be in (0, test_duration], got {}",
                self.interval_length
            )));
        }
        if self.interval_count() > MAX_INTERVALS {
            return Err(AnalysisError::InvalidConfig(format!(
                "test_duration / interval_length gives more than {} intervals",
                MAX_INTERVALS
            )));
        }
        let w = self.pmin_window;
        if !(w.start.is_finite() && w.end.is_finite()) || w.start > w.end {
            return Err(AnalysisError::InvalidConfig(format!(
                "pmin_window must satisfy start <= end, got [{}, {}]",
                w.start, w.end
            )));
        }
        if !(self.power_loss_fraction > 0.0 && self.power_loss_fraction <= 1.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "power_loss_fraction must be in (0, 1], got {}",
                self.power_loss_fraction
            )));
        }
        Ok(())
    }

    fn interval_count(&self) -> usize {
        let count = (self.test_duration / self.interval_length).ceil();
        if count.is_finite() && count > 0.0 {
            count as usize
        } else {
            0
        }
    }

    /// Start/end of each interval-power sub-window, half-open
    ///
    /// At most [`MAX_INTERVALS`] windows are produced, even for a
    /// configuration that has not been validated.
    pub fn intervals(&self) -> Vec<(f64, f64)> {
        let count = self.interval_count().min(MAX_INTERVALS);
        (0..count)
            .map(|i| {
                let start = i as f64 * self.interval_length;
                let end = (start + self.interval_length).min(self.test_duration);
                (start, end)
            })
            .collect()
    }
}
