//! Plot artifacts, written as svg files (never displayed interactively):
//! cost-vs-duration scatter, per-span histograms, time-series overlays.

use crate::Result;
use crate::spans::{ARC_KEY, Span, SpanThresholds, TIME_KEY, get_outfit_spans};
use crate::stats;
use crate::table::Table;
use log::{info, warn};
use plotters::prelude::*;
use std::path::Path;

/// Scatter of span cost against median frame duration, with 25th/75th
/// percentile error bars and a label per span.
pub fn plot_costs_vs_times(spans: &[Span], path: &Path) -> Result<()> {
    if spans.is_empty() {
        warn!("no spans to plot");
        return Ok(());
    }

    let costs: Vec<f64> = spans.iter().map(|s| s.arc).collect();
    let highs: Vec<f64> = spans.iter().map(|s| s.percentiles.p75).collect();

    let (x0, x1) = padded_range(&costs);
    let y1 = highs.iter().cloned().fold(0.0_f64, f64::max) * 1.2;
    let y1 = if y1 > 0.0 { y1 } else { 0.1 };

    let root = SVGBackend::new(path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x0..x1, 0.0..y1)?;
    chart
        .configure_mesh()
        .x_desc(ARC_KEY)
        .y_desc(TIME_KEY)
        .draw()?;

    for span in spans {
        chart.draw_series(std::iter::once(ErrorBar::new_vertical(
            span.arc,
            span.percentiles.p25,
            span.avg,
            span.percentiles.p75,
            BLUE.filled(),
            10,
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            span.label(),
            (span.arc, span.avg),
            ("sans-serif", 14).into_font(),
        )))?;
    }

    root.present()?;
    info!("wrote {}", path.display());
    Ok(())
}

/// One histogram row per span over a shared duration range, with the span
/// median marked.
pub fn plot_histograms(spans: &[Span], path: &Path) -> Result<()> {
    if spans.is_empty() {
        warn!("no spans to plot");
        return Ok(());
    }

    let all_times: Vec<f64> = spans.iter().flat_map(|s| s.times.iter().copied()).collect();
    let lo = stats::percentile(&all_times, 0.0);
    let mut hi = stats::percentile(&all_times, 98.0);
    if hi <= lo {
        hi = lo + 1e-6;
    }

    const BINS: usize = 100;
    let width = (hi - lo) / BINS as f64;

    let root = SVGBackend::new(path, (600, 200 * spans.len() as u32)).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((spans.len(), 1));

    for (area, span) in areas.iter().zip(spans) {
        let mut counts = vec![0i64; BINS];
        for &t in &span.times {
            if t < lo || t > hi {
                continue;
            }
            let bin = (((t - lo) / width) as usize).min(BINS - 1);
            counts[bin] += 1;
        }
        let y_max = counts.iter().copied().max().unwrap_or(0).max(1) + 1;

        let mut chart = ChartBuilder::on(area)
            .margin(10)
            .caption(span.label(), ("sans-serif", 14))
            .set_label_area_size(LabelAreaPosition::Left, 40)
            .set_label_area_size(LabelAreaPosition::Bottom, 25)
            .build_cartesian_2d(lo..hi, 0..y_max)?;
        chart.configure_mesh().disable_mesh().draw()?;

        chart.draw_series(counts.iter().enumerate().filter(|&(_, &c)| c > 0).map(
            |(i, &c)| {
                let x = lo + i as f64 * width;
                Rectangle::new([(x, 0), (x + width, c)], BLUE.mix(0.3).filled())
            },
        ))?;

        chart.draw_series(std::iter::once(PathElement::new(
            vec![(span.avg, 0), (span.avg, y_max)],
            RED,
        )))?;
    }

    root.present()?;
    info!("wrote {}", path.display());
    Ok(())
}

/// Per-field frame series with span segments drawn at their median
/// duration and labelled with outfit and cost.
pub fn plot_time_series(table: &Table, fields: &[String]) -> Result<()> {
    info!("plot_time_series {:?}", fields);
    let spans = get_outfit_spans(table, SpanThresholds::default())?;

    for field in fields {
        let Some(col) = table.column_index(field) else {
            warn!("no column {field} to plot");
            continue;
        };
        let series: Vec<(f64, f64)> = table
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row[col].as_f64().map(|y| (i as f64, y)))
            .collect();
        if series.is_empty() {
            warn!("column {field} has no numeric data to plot");
            continue;
        }

        let values: Vec<f64> = series.iter().map(|p| p.1).collect();
        let y1 = stats::percentile(&values, 98.0) * 1.1;
        let y1 = if y1 > 0.0 { y1 } else { 0.1 };
        let x1 = table.rows.len().max(1) as f64;

        let filename = format!("time_series_{field}.svg");
        let root = SVGBackend::new(&filename, (1200, 600)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(25)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(0.0..x1, 0.0..y1)?;
        chart.configure_mesh().x_desc("frame").y_desc(field).draw()?;

        chart.draw_series(LineSeries::new(series, &BLUE.mix(0.4)))?;

        for span in &spans {
            let (Some(&first), Some(&last)) = (span.rows.first(), span.rows.last()) else {
                continue;
            };
            let (x0, x1) = (first as f64, last as f64);
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x0, span.avg), (x1, span.avg)],
                BLUE,
            )))?;
            let label = format!("{} arc {}", span.outfit, stats::abbrev_number(span.arc));
            chart.draw_series(std::iter::once(Text::new(
                label,
                ((x0 + x1) / 2.0, span.avg),
                ("sans-serif", 12).into_font(),
            )))?;
        }

        root.present()?;
        info!("wrote {filename}");
    }
    Ok(())
}

fn padded_range(values: &[f64]) -> (f64, f64) {
    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.1).max(1.0);
    (lo - pad, hi + pad)
}
