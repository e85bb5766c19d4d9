//! Metrics engine
//!
//! Derives the test metrics from a cleaned sample series and the phase
//! boundaries:
//! - Power: mean, interval means, Pmax/Pmin, fatigue index, time to power loss
//! - SmO2: phase slopes, test minimum, post-test maximum
//! - Reoxygenation half-time
//!
//! Computation is pure. Anything that cannot be computed is reported as
//! [`MetricValue::Undefined`] with a reason; nothing here panics or divides
//! by zero.

use tracing::debug;

use crate::config::{EngineConfig, HalfTimeReference, RecoveryBaseline};
use crate::types::{
    IntervalPower, MetricValue, MetricsRecord, Phase, PhaseBoundaries, PhaseSlopes, Sample,
    SampleSeries, SmO2Channel, UndefinedReason,
};

/// Metrics engine parametrized by an [`EngineConfig`]
#[derive(Debug, Clone, Default)]
pub struct MetricsEngine {
    config: EngineConfig,
}

impl MetricsEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Compute the metrics record for one test
    pub fn compute(&self, series: &SampleSeries, boundaries: &PhaseBoundaries) -> MetricsRecord {
        let duration = self.config.test_duration;
        let test: Vec<&Sample> = series.between(0.0, duration).collect();

        if test.is_empty() {
            debug!(duration, "test window is empty, all metrics undefined");
            return self.undefined_record(UndefinedReason::EmptyWindow);
        }

        let mean_power = mean(test.iter().map(|s| s.power));
        let interval_power = self
            .config
            .intervals()
            .into_iter()
            .map(|(start, end)| IntervalPower {
                start,
                end,
                mean: mean(series.half_open(start, end).map(|s| s.power)),
            })
            .collect();

        let p_max = max(test.iter().map(|s| s.power));
        let window = self.config.pmin_window;
        let p_min = min(series.between(window.start, window.end).map(|s| s.power));
        let delta_p = combine(p_max, p_min, |max, min| MetricValue::Value(max - min));
        let fatigue_index = match p_max {
            MetricValue::Value(max) if max <= 0.0 => {
                MetricValue::Undefined(UndefinedReason::DivisionByZero)
            }
            _ => combine(p_max, p_min, |max, min| {
                MetricValue::Value(100.0 * (max - min) / max)
            }),
        };
        let time_to_power_loss = match p_max {
            MetricValue::Value(max) => {
                let threshold = self.config.power_loss_fraction * max;
                MetricValue::from_option(
                    min_opt(test.iter().filter(|s| s.power < threshold).map(|s| s.time)),
                    UndefinedReason::NotDetected,
                )
            }
            undefined => undefined,
        };

        let smo2_start = MetricValue::Value(test[0].smo2_primary);
        let smo2_min = min(test.iter().map(|s| s.smo2_primary));
        let (smo2_max_post, smo2_max_post_time) = post_test_maximum(series, duration);

        let recovery_level = match self.config.recovery_baseline {
            RecoveryBaseline::TestMinimum => combine(smo2_min, smo2_max_post, |min, max| {
                MetricValue::Value(min + 0.5 * (max - min))
            }),
            RecoveryBaseline::TestStart => combine(smo2_start, smo2_min, |start, min| {
                MetricValue::Value(start + 0.5 * (min - start))
            }),
        };

        let reference = match self.config.half_time_reference {
            HalfTimeReference::PhaseBoundary => boundaries.t3,
            HalfTimeReference::TestEnd => duration,
        };
        let reoxygenation_half_time = match recovery_level {
            MetricValue::Value(level) => half_time(series, reference, level),
            undefined => undefined,
        };

        let slopes = phase_slopes(series, boundaries);

        debug!(
            samples = series.len(),
            test_samples = test.len(),
            ?p_max,
            ?p_min,
            ?smo2_min,
            ?reoxygenation_half_time,
            "metrics computed"
        );

        MetricsRecord {
            mean_power,
            interval_power,
            p_max,
            p_min,
            delta_p,
            fatigue_index,
            time_to_power_loss,
            smo2_start,
            smo2_min,
            smo2_max_post,
            smo2_max_post_time,
            recovery_level,
            reoxygenation_half_time,
            slopes,
        }
    }

    fn undefined_record(&self, reason: UndefinedReason) -> MetricsRecord {
        let undefined = MetricValue::Undefined(reason);
        MetricsRecord {
            mean_power: undefined,
            interval_power: self
                .config
                .intervals()
                .into_iter()
                .map(|(start, end)| IntervalPower {
                    start,
                    end,
                    mean: undefined,
                })
                .collect(),
            p_max: undefined,
            p_min: undefined,
            delta_p: undefined,
            fatigue_index: undefined,
            time_to_power_loss: undefined,
            smo2_start: undefined,
            smo2_min: undefined,
            smo2_max_post: undefined,
            smo2_max_post_time: undefined,
            recovery_level: undefined,
            reoxygenation_half_time: undefined,
            slopes: PhaseSlopes {
                t1: undefined,
                t2: undefined,
                t3: undefined,
                t4: undefined,
            },
        }
    }
}

/// SmO2 slope between two times (%/s)
///
/// Uses the first and last samples within `[min(start, end), max(start, end)]`
/// and divides by `|end - start|`. Swapping `start` and `end` flips the sign.
pub fn slope(series: &SampleSeries, start: f64, end: f64, channel: SmO2Channel) -> MetricValue {
    if channel == SmO2Channel::Secondary && !series.has_secondary() {
        return MetricValue::Undefined(UndefinedReason::MissingChannel);
    }

    let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
    let values: Vec<f64> = series
        .between(lo, hi)
        .filter_map(|s| channel.value(s))
        .collect();

    let (first, last) = match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if values.len() >= 2 => (first, last),
        _ => return MetricValue::Undefined(UndefinedReason::InsufficientData),
    };

    let span = hi - lo;
    if span <= 0.0 {
        return MetricValue::Undefined(UndefinedReason::DivisionByZero);
    }

    let rise = if start <= end { last - first } else { first - last };
    MetricValue::Value(rise / span)
}

/// Primary-sensor slope of every phase; T4 runs to the end of the recording
pub fn phase_slopes(series: &SampleSeries, boundaries: &PhaseBoundaries) -> PhaseSlopes {
    let max_time = series.max_time().unwrap_or(boundaries.t3);
    let of = |phase: Phase| {
        let (start, end) = boundaries.span(phase, max_time);
        slope(series, start, end, SmO2Channel::Primary)
    };

    PhaseSlopes {
        t1: of(Phase::T1),
        t2: of(Phase::T2),
        t3: of(Phase::T3),
        t4: of(Phase::T4),
    }
}

/// Highest primary SmO2 strictly after `after`, and the time it first occurs
fn post_test_maximum(series: &SampleSeries, after: f64) -> (MetricValue, MetricValue) {
    let mut best: Option<&Sample> = None;
    for sample in series.after(after) {
        match best {
            Some(b) if sample.smo2_primary <= b.smo2_primary => {}
            _ => best = Some(sample),
        }
    }

    match best {
        Some(s) => (
            MetricValue::Value(s.smo2_primary),
            MetricValue::Value(s.time),
        ),
        None => (
            MetricValue::Undefined(UndefinedReason::EmptyWindow),
            MetricValue::Undefined(UndefinedReason::EmptyWindow),
        ),
    }
}

/// Earliest time after `reference` where primary SmO2 reaches `level`, relative to `reference`
fn half_time(series: &SampleSeries, reference: f64, level: f64) -> MetricValue {
    let reached = min_opt(
        series
            .after(reference)
            .filter(|s| s.smo2_primary >= level)
            .map(|s| s.time),
    );
    MetricValue::from_option(reached.map(|t| t - reference), UndefinedReason::NotReached)
}

fn mean(values: impl Iterator<Item = f64>) -> MetricValue {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        MetricValue::Undefined(UndefinedReason::EmptyWindow)
    } else {
        MetricValue::Value(sum / count as f64)
    }
}

fn max(values: impl Iterator<Item = f64>) -> MetricValue {
    MetricValue::from_option(values.reduce(f64::max), UndefinedReason::EmptyWindow)
}

fn min(values: impl Iterator<Item = f64>) -> MetricValue {
    MetricValue::from_option(min_opt(values), UndefinedReason::EmptyWindow)
}

fn min_opt(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.reduce(f64::min)
}

/// Combine two metrics; the first undefined operand decides the result
fn combine(
    a: MetricValue,
    b: MetricValue,
    f: impl FnOnce(f64, f64) -> MetricValue,
) -> MetricValue {
    match (a, b) {
        (MetricValue::Value(a), MetricValue::Value(b)) => f(a, b),
        (MetricValue::Undefined(r), _) | (_, MetricValue::Undefined(r)) => {
            MetricValue::Undefined(r)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeWindow;
    use pretty_assertions::assert_eq;

    fn reference_series() -> SampleSeries {
        SampleSeries::from_columns(
            &[0.0, 10.0, 20.0, 30.0, 40.0],
            &[60.0, 55.0, 50.0, 45.0, 50.0],
            &[300.0, 280.0, 260.0, 240.0, 0.0],
        )
    }

    fn reference_boundaries() -> PhaseBoundaries {
        PhaseBoundaries::new(3.0, 10.0, 30.0).unwrap()
    }

    /// One sample per second over a 60 s recording
    fn dense_series() -> SampleSeries {
        let samples = (0..=60)
            .map(|i| {
                let t = i as f64;
                let power = if t <= 30.0 { 900.0 - 15.0 * t } else { 80.0 };
                let smo2 = if t <= 30.0 { 70.0 - t } else { 40.0 + (t - 30.0) };
                Sample::new(t, smo2, power)
            })
            .collect();
        SampleSeries::new(samples)
    }

    #[test]
    fn test_reference_example() {
        let engine = MetricsEngine::default();
        let record = engine.compute(&reference_series(), &reference_boundaries());

        assert_eq!(record.mean_power, MetricValue::Value(270.0));
        assert_eq!(record.p_max, MetricValue::Value(300.0));
        assert_eq!(record.p_min, MetricValue::Value(240.0));
        assert_eq!(record.delta_p, MetricValue::Value(60.0));
        assert_eq!(record.fatigue_index, MetricValue::Value(20.0));
        assert_eq!(record.smo2_min, MetricValue::Value(45.0));
        assert_eq!(record.smo2_start, MetricValue::Value(60.0));

        let means: Vec<MetricValue> = record.interval_power.iter().map(|i| i.mean).collect();
        assert_eq!(
            means,
            vec![
                MetricValue::Value(300.0),
                MetricValue::Value(280.0),
                MetricValue::Value(260.0)
            ]
        );

        // 240 is not strictly below 0.8 * 300
        assert_eq!(
            record.time_to_power_loss,
            MetricValue::Undefined(UndefinedReason::NotDetected)
        );

        assert_eq!(record.smo2_max_post, MetricValue::Value(50.0));
        assert_eq!(record.smo2_max_post_time, MetricValue::Value(40.0));
        assert_eq!(record.recovery_level, MetricValue::Value(47.5));
        assert_eq!(record.reoxygenation_half_time, MetricValue::Value(10.0));
    }

    #[test]
    fn test_reference_slopes() {
        let record = MetricsEngine::default().compute(&reference_series(), &reference_boundaries());

        // [0, 3] and [3, 10] each hold a single sample
        assert_eq!(
            record.slopes.t1,
            MetricValue::Undefined(UndefinedReason::InsufficientData)
        );
        assert_eq!(
            record.slopes.t2,
            MetricValue::Undefined(UndefinedReason::InsufficientData)
        );
        assert_eq!(record.slopes.t3, MetricValue::Value((45.0 - 55.0) / 20.0));
        assert_eq!(record.slopes.t4, MetricValue::Value((50.0 - 45.0) / 10.0));
    }

    #[test]
    fn test_start_baseline_not_reached() {
        let config = EngineConfig {
            recovery_baseline: RecoveryBaseline::TestStart,
            ..EngineConfig::default()
        };
        let record = MetricsEngine::new(config).compute(&reference_series(), &reference_boundaries());

        // 60 + 0.5 * (45 - 60)
        assert_eq!(record.recovery_level, MetricValue::Value(52.5));
        assert_eq!(
            record.reoxygenation_half_time,
            MetricValue::Undefined(UndefinedReason::NotReached)
        );
    }

    #[test]
    fn test_late_pmin_window() {
        let series = SampleSeries::from_columns(
            &[0.0, 2.0, 10.0, 20.0, 30.0],
            &[60.0, 60.0, 55.0, 50.0, 45.0],
            &[100.0, 900.0, 800.0, 700.0, 600.0],
        );
        let boundaries = reference_boundaries();

        let standard = MetricsEngine::default().compute(&series, &boundaries);
        assert_eq!(standard.p_min, MetricValue::Value(100.0));

        let config = EngineConfig {
            pmin_window: TimeWindow::new(5.0, 30.0),
            ..EngineConfig::default()
        };
        let late = MetricsEngine::new(config).compute(&series, &boundaries);
        assert_eq!(late.p_min, MetricValue::Value(600.0));
        assert_eq!(late.delta_p, MetricValue::Value(300.0));
        assert_eq!(late.fatigue_index, MetricValue::Value(100.0 * 300.0 / 900.0));
    }

    #[test]
    fn test_time_to_power_loss_is_earliest() {
        let record = MetricsEngine::default().compute(&dense_series(), &reference_boundaries());

        // Pmax 900 at t=0; 900 - 15t < 720 first holds at t=13
        assert_eq!(record.time_to_power_loss, MetricValue::Value(13.0));
        assert!(900.0 - 15.0 * 13.0 < 0.8 * 900.0);
        assert!(900.0 - 15.0 * 12.0 >= 0.8 * 900.0);
    }

    #[test]
    fn test_interval_power_within_bounds() {
        let record = MetricsEngine::default().compute(&dense_series(), &reference_boundaries());
        let p_max = record.p_max.value().unwrap();
        let p_min = record.p_min.value().unwrap();

        for interval in &record.interval_power {
            let mean = interval.mean.value().unwrap();
            assert!(p_min <= mean && mean <= p_max, "{:?}", interval);
        }
    }

    #[test]
    fn test_zero_power_fatigue_undefined() {
        let series = SampleSeries::from_columns(&[0.0, 10.0, 20.0], &[60.0, 55.0, 50.0], &[0.0; 3]);
        let record = MetricsEngine::default().compute(&series, &reference_boundaries());

        assert_eq!(record.p_max, MetricValue::Value(0.0));
        assert_eq!(
            record.fatigue_index,
            MetricValue::Undefined(UndefinedReason::DivisionByZero)
        );
    }

    #[test]
    fn test_empty_pmin_window() {
        let config = EngineConfig {
            pmin_window: TimeWindow::new(31.0, 32.0),
            ..EngineConfig::default()
        };
        let engine = MetricsEngine::new(config);

        let record = engine.compute(&reference_series(), &reference_boundaries());
        assert_eq!(record.p_max, MetricValue::Value(300.0));
        assert_eq!(record.p_min, MetricValue::Undefined(UndefinedReason::EmptyWindow));
        assert_eq!(
            record.fatigue_index,
            MetricValue::Undefined(UndefinedReason::EmptyWindow)
        );

        // zero Pmax takes precedence over the missing Pmin
        let idle = SampleSeries::from_columns(&[0.0, 10.0, 20.0], &[60.0, 55.0, 50.0], &[0.0; 3]);
        let record = engine.compute(&idle, &reference_boundaries());
        assert_eq!(
            record.fatigue_index,
            MetricValue::Undefined(UndefinedReason::DivisionByZero)
        );
    }

    #[test]
    fn test_fatigue_index_exact() {
        let record = MetricsEngine::default().compute(&dense_series(), &reference_boundaries());
        let p_max = record.p_max.value().unwrap();
        let p_min = record.p_min.value().unwrap();
        assert_eq!(
            record.fatigue_index,
            MetricValue::Value(100.0 * (p_max - p_min) / p_max)
        );
    }

    #[test]
    fn test_empty_interval_is_undefined() {
        let series = SampleSeries::from_columns(&[0.0, 5.0, 25.0], &[60.0, 55.0, 50.0], &[500.0; 3]);
        let record = MetricsEngine::default().compute(&series, &reference_boundaries());

        assert_eq!(record.interval_power[0].mean, MetricValue::Value(500.0));
        assert_eq!(
            record.interval_power[1].mean,
            MetricValue::Undefined(UndefinedReason::EmptyWindow)
        );
        assert_eq!(record.interval_power[2].mean, MetricValue::Value(500.0));
    }

    #[test]
    fn test_empty_test_window() {
        let series = SampleSeries::from_columns(&[40.0, 50.0], &[60.0, 65.0], &[100.0, 90.0]);
        let record = MetricsEngine::default().compute(&series, &reference_boundaries());

        let empty = MetricValue::Undefined(UndefinedReason::EmptyWindow);
        assert_eq!(record.mean_power, empty);
        assert_eq!(record.p_max, empty);
        assert_eq!(record.fatigue_index, empty);
        assert_eq!(record.reoxygenation_half_time, empty);
        assert_eq!(record.slopes.t4, empty);
        assert!(record.interval_power.iter().all(|i| i.mean == empty));
    }

    #[test]
    fn test_no_recovery_samples() {
        let series = SampleSeries::from_columns(&[0.0, 10.0, 30.0], &[60.0, 50.0, 40.0], &[500.0; 3]);
        let record = MetricsEngine::default().compute(&series, &reference_boundaries());

        assert_eq!(
            record.smo2_max_post,
            MetricValue::Undefined(UndefinedReason::EmptyWindow)
        );
        assert_eq!(
            record.reoxygenation_half_time,
            MetricValue::Undefined(UndefinedReason::EmptyWindow)
        );
        assert!(record.mean_power.value().is_some());
    }

    #[test]
    fn test_post_max_first_occurrence() {
        let series = SampleSeries::from_columns(
            &[0.0, 30.0, 35.0, 40.0, 45.0],
            &[60.0, 40.0, 58.0, 58.0, 50.0],
            &[500.0; 5],
        );
        let record = MetricsEngine::default().compute(&series, &reference_boundaries());

        assert_eq!(record.smo2_max_post, MetricValue::Value(58.0));
        assert_eq!(record.smo2_max_post_time, MetricValue::Value(35.0));
    }

    #[test]
    fn test_half_time_from_test_end() {
        let boundaries = PhaseBoundaries::new(3.0, 10.0, 25.0).unwrap();
        let series = dense_series();

        let from_t3 = MetricsEngine::default().compute(&series, &boundaries);
        let config = EngineConfig {
            half_time_reference: HalfTimeReference::TestEnd,
            ..EngineConfig::default()
        };
        let from_end = MetricsEngine::new(config).compute(&series, &boundaries);

        // min 40 at t=30, post max 70 at t=60, level 55 first reached at t=45
        assert_eq!(from_t3.recovery_level, MetricValue::Value(55.0));
        assert_eq!(from_t3.reoxygenation_half_time, MetricValue::Value(45.0 - 25.0));
        assert_eq!(from_end.reoxygenation_half_time, MetricValue::Value(45.0 - 30.0));
    }

    #[test]
    fn test_half_time_monotonic_in_post_max() {
        let boundaries = reference_boundaries();
        let engine = MetricsEngine::default();
        let mut previous = f64::NEG_INFINITY;

        for peak in [50.0, 55.0, 60.0, 65.0, 70.0] {
            let series = SampleSeries::from_columns(
                &[0.0, 30.0, 35.0, 40.0, 45.0, 50.0],
                &[60.0, 40.0, 48.0, 52.0, 56.0, peak],
                &[500.0; 6],
            );
            let record = engine.compute(&series, &boundaries);
            let half = record.reoxygenation_half_time.value().unwrap();
            assert!(half >= previous, "peak {} gave {} < {}", peak, half, previous);
            previous = half;
        }
    }

    #[test]
    fn test_slope_antisymmetric() {
        let series = dense_series();
        let forward = slope(&series, 10.0, 20.0, SmO2Channel::Primary);
        let backward = slope(&series, 20.0, 10.0, SmO2Channel::Primary);

        assert_eq!(forward, MetricValue::Value(-1.0));
        assert_eq!(backward, MetricValue::Value(1.0));
    }

    #[test]
    fn test_slope_undefined_cases() {
        let series = dense_series();
        assert_eq!(
            slope(&series, 10.2, 10.8, SmO2Channel::Primary),
            MetricValue::Undefined(UndefinedReason::InsufficientData)
        );
        assert_eq!(
            slope(&series, 0.0, 10.0, SmO2Channel::Secondary),
            MetricValue::Undefined(UndefinedReason::MissingChannel)
        );

        let ties = SampleSeries::from_columns(&[5.0, 5.0], &[60.0, 61.0], &[100.0, 100.0]);
        assert_eq!(
            slope(&ties, 5.0, 5.0, SmO2Channel::Primary),
            MetricValue::Undefined(UndefinedReason::DivisionByZero)
        );
    }

    #[test]
    fn test_secondary_slope() {
        let series = SampleSeries::new(vec![
            Sample::new(0.0, 60.0, 500.0).with_secondary(70.0),
            Sample::new(10.0, 50.0, 400.0),
            Sample::new(20.0, 40.0, 300.0).with_secondary(50.0),
        ]);
        assert_eq!(
            slope(&series, 0.0, 20.0, SmO2Channel::Secondary),
            MetricValue::Value(-1.0)
        );
    }
}
