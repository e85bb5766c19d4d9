//! Test chart
//!
//! SmO2 on the left axis and power on the right axis against time, with the
//! phases shaded, the boundaries marked and the post-test SmO2 maximum
//! highlighted. Rendered to SVG.

use std::fmt::Display;
use std::ops::Range;
use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::debug;

use crate::error::AnalysisError;
use crate::session::Analysis;

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 500;

const COLOR_SMO2_PRIMARY: RGBColor = RGBColor(31, 119, 180);
const COLOR_SMO2_SECONDARY: RGBColor = RGBColor(23, 190, 207);
const COLOR_POWER: RGBColor = RGBColor(214, 39, 40);
const COLOR_MARKER: RGBColor = RGBColor(128, 128, 128);

/// Band colors for T1..T4
const PHASE_COLORS: [RGBColor; 4] = [
    RGBColor(144, 238, 144),
    RGBColor(240, 230, 140),
    RGBColor(240, 128, 128),
    RGBColor(173, 216, 230),
];
const PHASE_ALPHA: f64 = 0.3;

/// Write the chart as an SVG file
pub fn render_svg(analysis: &Analysis, path: &Path) -> Result<(), AnalysisError> {
    let root = SVGBackend::new(path, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
    draw_chart(&root, analysis)?;
    root.present().map_err(chart_err)?;
    debug!(path = %path.display(), "chart written");
    Ok(())
}

/// Render the chart to an SVG document in memory
pub fn render_svg_string(analysis: &Analysis) -> Result<String, AnalysisError> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        draw_chart(&root, analysis)?;
        root.present().map_err(chart_err)?;
    }
    Ok(svg)
}

fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    analysis: &Analysis,
) -> Result<(), AnalysisError> {
    let samples = analysis.series.samples();
    let boundaries = analysis.boundaries;
    let test_end = analysis.config.test_duration;

    let max_time = analysis.series.max_time().unwrap_or(test_end).max(test_end);
    let x_range = 0.0..max_time;

    let smo2_values = samples
        .iter()
        .flat_map(|s| std::iter::once(s.smo2_primary).chain(s.smo2_secondary));
    let smo2_range = padded_range(smo2_values);
    let power_max = samples.iter().map(|s| s.power).fold(0.0, f64::max);
    let power_min = samples.iter().map(|s| s.power).fold(0.0, f64::min);
    let power_range = power_min..(power_max * 1.1).max(power_min + 1.0);

    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(root)
        .caption("SmO2 and power during the test", ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .right_y_label_area_size(55)
        .build_cartesian_2d(x_range.clone(), smo2_range.clone())
        .map_err(chart_err)?
        .set_secondary_coord(x_range, power_range);

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("SmO2 (%)")
        .label_style(("sans-serif", 14))
        .draw()
        .map_err(chart_err)?;
    chart
        .configure_secondary_axes()
        .y_desc("Power (W)")
        .label_style(("sans-serif", 14))
        .draw()
        .map_err(chart_err)?;

    // T4 shading stops at the SmO2 peak when one was found after t3
    let recovery_end = analysis
        .metrics
        .smo2_max_post_time
        .value()
        .filter(|&t| t > boundaries.t3)
        .unwrap_or(max_time);
    let bands = [
        (0.0, boundaries.t1),
        (boundaries.t1, boundaries.t2),
        (boundaries.t2, boundaries.t3),
        (boundaries.t3, recovery_end),
    ];
    chart
        .draw_series(bands.iter().zip(PHASE_COLORS.iter()).map(|(&(start, end), color)| {
            Rectangle::new(
                [(start, smo2_range.start), (end, smo2_range.end)],
                color.mix(PHASE_ALPHA).filled(),
            )
        }))
        .map_err(chart_err)?;

    let markers = [boundaries.t1, boundaries.t2, boundaries.t3];
    chart
        .draw_series(markers.iter().map(|&t| {
            PathElement::new(
                vec![(t, smo2_range.start), (t, smo2_range.end)],
                COLOR_MARKER.stroke_width(1),
            )
        }))
        .map_err(chart_err)?;
    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(test_end, smo2_range.start), (test_end, smo2_range.end)],
            BLACK.stroke_width(2),
        )))
        .map_err(chart_err)?;

    chart
        .draw_series(LineSeries::new(
            samples.iter().map(|s| (s.time, s.smo2_primary)),
            COLOR_SMO2_PRIMARY.stroke_width(2),
        ))
        .map_err(chart_err)?
        .label("SmO2 sensor 1")
        .legend(|(x, y)| {
            PathElement::new(vec![(x, y), (x + 20, y)], COLOR_SMO2_PRIMARY.stroke_width(2))
        });

    if analysis.series.has_secondary() {
        chart
            .draw_series(LineSeries::new(
                samples
                    .iter()
                    .filter_map(|s| s.smo2_secondary.map(|v| (s.time, v))),
                COLOR_SMO2_SECONDARY.stroke_width(2),
            ))
            .map_err(chart_err)?
            .label("SmO2 sensor 2")
            .legend(|(x, y)| {
                PathElement::new(
                    vec![(x, y), (x + 20, y)],
                    COLOR_SMO2_SECONDARY.stroke_width(2),
                )
            });
    }

    chart
        .draw_secondary_series(LineSeries::new(
            samples.iter().map(|s| (s.time, s.power)),
            COLOR_POWER.stroke_width(2),
        ))
        .map_err(chart_err)?
        .label("Power")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], COLOR_POWER.stroke_width(2)));

    if let (Some(time), Some(value)) = (
        analysis.metrics.smo2_max_post_time.value(),
        analysis.metrics.smo2_max_post.value(),
    ) {
        chart
            .draw_series(std::iter::once(Circle::new(
                (time, value),
                5,
                COLOR_SMO2_PRIMARY.filled(),
            )))
            .map_err(chart_err)?
            .label("SmO2 max")
            .legend(|(x, y)| Circle::new((x + 10, y), 4, COLOR_SMO2_PRIMARY.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(("sans-serif", 14))
        .draw()
        .map_err(chart_err)?;

    Ok(())
}

/// Value range with 15% padding on both sides
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !(min.is_finite() && max.is_finite()) {
        return 0.0..100.0;
    }
    let span = max - min;
    let padding = if span < 1e-6 { 0.5 } else { span * 0.15 };
    (min - padding)..(max + padding)
}

fn chart_err(e: impl Display) -> AnalysisError {
    AnalysisError::Chart(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AnalysisSession;
    use crate::table::RawTable;

    fn analysis(csv: &str) -> Analysis {
        AnalysisSession::new(RawTable::parse(csv, None).unwrap())
            .recompute()
            .unwrap()
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range([40.0, 60.0].into_iter()), 37.0..63.0);
        assert_eq!(padded_range([50.0].into_iter()), 49.5..50.5);
        assert_eq!(padded_range(std::iter::empty()), 0.0..100.0);
    }

    #[test]
    fn test_render_svg_string() {
        let analysis = analysis(
            "Time,SmO2,SmO2_2,Power\n0,60,70,300\n10,55,66,280\n20,50,61,260\n30,45,55,240\n40,50,60,0\n",
        );
        let svg = render_svg_string(&analysis).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("SmO2 sensor 2"));
        assert!(svg.contains("Power (W)"));
    }
}
