//! Core types for the all-out test analysis
//!
//! This module defines the data that flows through the analysis: cleaned
//! samples, phase boundaries, metric values with their "undefined" sentinels,
//! and the metrics record produced by the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AnalysisError;

/// One cleaned recording row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Elapsed time (seconds)
    pub time: f64,
    /// Muscle oxygen saturation of the primary sensor (%)
    pub smo2_primary: f64,
    /// Muscle oxygen saturation of the optional second sensor (%)
    pub smo2_secondary: Option<f64>,
    /// Power output (W)
    pub power: f64,
}

impl Sample {
    pub fn new(time: f64, smo2_primary: f64, power: f64) -> Self {
        Self {
            time,
            smo2_primary,
            smo2_secondary: None,
            power,
        }
    }

    pub fn with_secondary(mut self, smo2: f64) -> Self {
        self.smo2_secondary = Some(smo2);
        self
    }
}

/// SmO2 sensor selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmO2Channel {
    Primary,
    Secondary,
}

impl SmO2Channel {
    pub fn value(&self, sample: &Sample) -> Option<f64> {
        match self {
            SmO2Channel::Primary => Some(sample.smo2_primary),
            SmO2Channel::Secondary => sample.smo2_secondary,
        }
    }
}

/// Ordered, cleaned sample series
///
/// Time is expected to be non-decreasing; ties are tolerated and the series
/// is never re-sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    samples: Vec<Sample>,
    has_secondary: bool,
}

impl SampleSeries {
    pub fn new(samples: Vec<Sample>) -> Self {
        let has_secondary = samples.iter().any(|s| s.smo2_secondary.is_some());
        Self {
            samples,
            has_secondary,
        }
    }

    /// Build a series from parallel columns (primary sensor only)
    pub fn from_columns(time: &[f64], smo2: &[f64], power: &[f64]) -> Self {
        let samples = time
            .iter()
            .zip(smo2.iter())
            .zip(power.iter())
            .map(|((&t, &s), &p)| Sample::new(t, s, p))
            .collect();
        Self::new(samples)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether any sample carries a second SmO2 reading
    pub fn has_secondary(&self) -> bool {
        self.has_secondary
    }

    pub fn max_time(&self) -> Option<f64> {
        self.samples.iter().map(|s| s.time).reduce(f64::max)
    }

    /// Samples with `start <= time <= end`
    pub fn between(&self, start: f64, end: f64) -> impl Iterator<Item = &Sample> + '_ {
        self.samples
            .iter()
            .filter(move |s| s.time >= start && s.time <= end)
    }

    /// Samples with `start <= time < end`
    pub fn half_open(&self, start: f64, end: f64) -> impl Iterator<Item = &Sample> + '_ {
        self.samples
            .iter()
            .filter(move |s| s.time >= start && s.time < end)
    }

    /// Samples with `time > after`
    pub fn after(&self, after: f64) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter().filter(move |s| s.time > after)
    }
}

/// Test phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    T1,
    T2,
    T3,
    T4,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::T1, Phase::T2, Phase::T3, Phase::T4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::T1 => "T1",
            Phase::T2 => "T2",
            Phase::T3 => "T3",
            Phase::T4 => "T4",
        }
    }
}

/// User-selected phase boundaries `t1 < t2 < t3`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseBoundaries {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
}

impl Default for PhaseBoundaries {
    fn default() -> Self {
        Self {
            t1: 3.0,
            t2: 10.0,
            t3: 30.0,
        }
    }
}

impl PhaseBoundaries {
    /// Create boundaries, checking `0 <= t1 < t2 < t3`
    pub fn new(t1: f64, t2: f64, t3: f64) -> Result<Self, AnalysisError> {
        let boundaries = Self { t1, t2, t3 };
        boundaries.check_order()?;
        Ok(boundaries)
    }

    fn check_order(&self) -> Result<(), AnalysisError> {
        if ![self.t1, self.t2, self.t3].iter().all(|t| t.is_finite()) {
            return Err(AnalysisError::InvalidBoundaries(
                "boundaries must be finite".to_string(),
            ));
        }
        if self.t1 < 0.0 {
            return Err(AnalysisError::InvalidBoundaries(format!(
                "t1 ({}) must not be negative",
                self.t1
            )));
        }
        if !(self.t1 < self.t2 && self.t2 < self.t3) {
            return Err(AnalysisError::InvalidBoundaries(format!(
                "expected t1 < t2 < t3, got {} / {} / {}",
                self.t1, self.t2, self.t3
            )));
        }
        Ok(())
    }

    /// Check ordering and that `t3` lies within the recording
    pub fn validate(&self, max_time: f64) -> Result<(), AnalysisError> {
        self.check_order()?;
        if self.t3 > max_time {
            return Err(AnalysisError::InvalidBoundaries(format!(
                "t3 ({}) is beyond the end of the recording ({})",
                self.t3, max_time
            )));
        }
        Ok(())
    }

    /// Time span of a phase; T4 ends at the end of the recording
    pub fn span(&self, phase: Phase, max_time: f64) -> (f64, f64) {
        match phase {
            Phase::T1 => (0.0, self.t1),
            Phase::T2 => (self.t1, self.t2),
            Phase::T3 => (self.t2, self.t3),
            Phase::T4 => (self.t3, max_time),
        }
    }
}

/// Why a metric could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// No samples in the window the metric is defined over
    EmptyWindow,
    /// Denominator was zero (e.g. Pmax == 0)
    DivisionByZero,
    /// Power never dropped below the loss threshold
    NotDetected,
    /// SmO2 never recovered to the half-time level
    NotReached,
    /// Fewer than two samples for a slope
    InsufficientData,
    /// The requested SmO2 channel is not present in the recording
    MissingChannel,
}

impl UndefinedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UndefinedReason::EmptyWindow => "empty window",
            UndefinedReason::DivisionByZero => "not available",
            UndefinedReason::NotDetected => "not detected",
            UndefinedReason::NotReached => "not reached",
            UndefinedReason::InsufficientData => "insufficient data",
            UndefinedReason::MissingChannel => "missing channel",
        }
    }
}

/// A computed metric or the reason it is undefined
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Value(f64),
    Undefined(UndefinedReason),
}

impl MetricValue {
    pub fn from_option(value: Option<f64>, reason: UndefinedReason) -> Self {
        match value {
            Some(v) => MetricValue::Value(v),
            None => MetricValue::Undefined(reason),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(*v),
            MetricValue::Undefined(_) => None,
        }
    }

    /// Apply `f` to a defined value, propagating the undefined reason
    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            MetricValue::Value(v) => MetricValue::Value(f(v)),
            undefined => undefined,
        }
    }

    /// Render with a fixed number of decimals, or the sentinel text
    pub fn format(&self, decimals: usize) -> String {
        match self {
            MetricValue::Value(v) => format!("{:.*}", decimals, v),
            MetricValue::Undefined(r) => r.as_str().to_string(),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Value(v) => write!(f, "{}", v),
            MetricValue::Undefined(r) => f.write_str(r.as_str()),
        }
    }
}

/// Mean power over one sub-window of the test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalPower {
    pub start: f64,
    pub end: f64,
    pub mean: MetricValue,
}

/// SmO2 slope of each phase (%/s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseSlopes {
    pub t1: MetricValue,
    pub t2: MetricValue,
    pub t3: MetricValue,
    pub t4: MetricValue,
}

impl PhaseSlopes {
    pub fn get(&self, phase: Phase) -> MetricValue {
        match phase {
            Phase::T1 => self.t1,
            Phase::T2 => self.t2,
            Phase::T3 => self.t3,
            Phase::T4 => self.t4,
        }
    }
}

/// Metrics derived from one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Mean power over the test window (W)
    pub mean_power: MetricValue,
    /// Mean power of each fixed sub-window (W)
    pub interval_power: Vec<IntervalPower>,
    /// Peak power over the test window (W)
    pub p_max: MetricValue,
    /// Minimum power over the configured Pmin window (W)
    pub p_min: MetricValue,
    /// Pmax - Pmin (W)
    pub delta_p: MetricValue,
    /// 100 x (Pmax - Pmin) / Pmax (%)
    pub fatigue_index: MetricValue,
    /// First time power fell below the loss threshold (s)
    pub time_to_power_loss: MetricValue,
    /// SmO2 of the first sample of the test window (%)
    pub smo2_start: MetricValue,
    /// Lowest SmO2 over the test window (%)
    pub smo2_min: MetricValue,
    /// Highest SmO2 after the test window (%)
    pub smo2_max_post: MetricValue,
    /// Time of the post-test SmO2 maximum, first occurrence (s)
    pub smo2_max_post_time: MetricValue,
    /// SmO2 level defining reoxygenation half-time (%)
    pub recovery_level: MetricValue,
    /// Time from the reference boundary to the recovery level (s)
    pub reoxygenation_half_time: MetricValue,
    /// SmO2 slope of each phase, primary sensor (%/s)
    pub slopes: PhaseSlopes,
}
