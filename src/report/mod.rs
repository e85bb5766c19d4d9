//! Test report
//!
//! Turns an [`Analysis`] into label/value lines, rendered either as plain
//! text or as a one-page PDF (see [`pdf`]).

pub mod pdf;

pub use pdf::{render_pdf, write_pdf, JpegImage};

use std::fmt::Write as _;

use crate::athlete::AthleteInfo;
use crate::session::Analysis;
use crate::summary::ChannelSummary;
use crate::table::RawTable;
use crate::types::{MetricValue, Phase};

/// One metric as it appears in a report
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
    pub label: String,
    pub value: MetricValue,
    pub decimals: usize,
}

impl ReportLine {
    fn new(label: impl Into<String>, value: MetricValue, decimals: usize) -> Self {
        Self {
            label: label.into(),
            value,
            decimals,
        }
    }

    pub fn formatted_value(&self) -> String {
        self.value.format(self.decimals)
    }
}

/// Report title for the configured effort duration
pub fn title(analysis: &Analysis) -> String {
    format!("All-out {} s test report", analysis.config.test_duration)
}

/// Metrics in report order
pub fn metric_lines(analysis: &Analysis) -> Vec<ReportLine> {
    let m = &analysis.metrics;
    let config = &analysis.config;
    let mut lines = vec![ReportLine::new(
        format!("Mean power {} s (W)", config.test_duration),
        m.mean_power,
        1,
    )];

    for interval in &m.interval_power {
        lines.push(ReportLine::new(
            format!("Power {}-{} s (W)", interval.start, interval.end),
            interval.mean,
            1,
        ));
    }

    lines.extend([
        ReportLine::new("Pmax (W)", m.p_max, 1),
        ReportLine::new(
            format!(
                "Pmin {}-{} s (W)",
                config.pmin_window.start, config.pmin_window.end
            ),
            m.p_min,
            1,
        ),
        ReportLine::new("Delta P (W)", m.delta_p, 1),
        ReportLine::new("Fatigue index (%)", m.fatigue_index, 1),
        ReportLine::new("Time to power loss (s)", m.time_to_power_loss, 1),
        ReportLine::new("SmO2 min (%)", m.smo2_min, 1),
        ReportLine::new("SmO2 max after test (%)", m.smo2_max_post, 1),
        ReportLine::new("SmO2 max time (s)", m.smo2_max_post_time, 1),
    ]);

    for phase in Phase::ALL {
        lines.push(ReportLine::new(
            format!("Slope {} SmO2 (%/s)", phase.as_str()),
            m.slopes.get(phase),
            3,
        ));
    }

    lines.push(ReportLine::new(
        format!("Recovery level, {} (%)", config.recovery_baseline.as_str()),
        m.recovery_level,
        1,
    ));
    lines.push(ReportLine::new(
        "Reoxygenation half-time (s)",
        m.reoxygenation_half_time,
        1,
    ));

    lines
}

/// Plain-text report
pub fn render_text(analysis: &Analysis, athlete: Option<&AthleteInfo>) -> String {
    let mut out = String::new();
    let heading = title(analysis);
    let _ = writeln!(out, "{}", heading);
    let _ = writeln!(out, "{}", "=".repeat(heading.len()));

    if let Some(info) = athlete.filter(|i| !i.is_empty()) {
        for (key, value) in info.entries() {
            let _ = writeln!(out, "{}: {}", key, value);
        }
        out.push('\n');
    }

    let b = analysis.boundaries;
    let _ = writeln!(
        out,
        "Phases: T1 0-{} s, T2 {}-{} s, T3 {}-{} s, T4 from {} s",
        b.t1, b.t1, b.t2, b.t2, b.t3, b.t3
    );
    let _ = writeln!(
        out,
        "Samples: {} kept, {} dropped",
        analysis.cleaning.kept_rows, analysis.cleaning.dropped_rows
    );
    out.push('\n');

    let lines = metric_lines(analysis);
    let width = lines.iter().map(|l| l.label.len()).max().unwrap_or(0);
    for line in &lines {
        let _ = writeln!(
            out,
            "{:<width$}  {}",
            line.label,
            line.formatted_value(),
            width = width
        );
    }

    out.push('\n');
    out.push_str(&render_summary(analysis));
    out
}

/// Descriptive statistics of the cleaned channels as a table
pub fn render_summary(analysis: &Analysis) -> String {
    let summary = &analysis.summary;
    let mut channels = vec![("SmO2 (%)", &summary.smo2_primary)];
    if let Some(secondary) = &summary.smo2_secondary {
        channels.push(("SmO2 2 (%)", secondary));
    }
    channels.push(("Power (W)", &summary.power));

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12}{:>7}{:>9}{:>9}{:>9}{:>9}{:>9}{:>9}{:>9}",
        "", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
    for (label, c) in channels {
        let _ = writeln!(
            out,
            "{:<12}{:>7}{:>9.1}{:>9}{:>9.1}{:>9.1}{:>9.1}{:>9.1}{:>9.1}",
            label,
            c.count,
            c.mean,
            std_text(c),
            c.min,
            c.p25,
            c.median,
            c.p75,
            c.max
        );
    }
    out
}

fn std_text(summary: &ChannelSummary) -> String {
    summary
        .std
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "-".to_string())
}

/// The first `rows` rows of a table, columns aligned to their widest cell
pub fn render_preview(table: &RawTable, rows: usize) -> String {
    let head = table.head(rows);
    let widths: Vec<usize> = table
        .headers()
        .iter()
        .enumerate()
        .map(|(col, header)| {
            head.iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let mut write_row = |cells: &[String]| {
        let line: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(col, &width)| {
                let cell = cells.get(col).map(String::as_str).unwrap_or("");
                format!("{:<width$}", cell, width = width)
            })
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    };

    write_row(table.headers());
    for row in head {
        write_row(row.as_slice());
    }
    out
}
