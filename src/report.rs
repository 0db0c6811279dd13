//! Reporting: outfit breakdown, span exports, correlation, comparison.

use crate::Result;
use crate::config::AnalyzeConfig;
use crate::plot;
use crate::spans::{ARC_KEY, Span, SpanThresholds, TIME_KEY, get_outfit_spans};
use crate::stats;
use crate::table::{Table, default_export_name, fill_blanks, value_to_string};
use anyhow::Context;
use log::{debug, error, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Break the frame table down by outfit span: export span summaries and
/// per-span row groups, report cost/duration correlation, and render the
/// scatter and histogram artifacts.
pub fn process_by_outfit(table: &Table, cfg: &AnalyzeConfig, summarize: bool) -> Result<()> {
    let spans = get_outfit_spans(table, SpanThresholds::default())?;
    if cfg.verbose {
        info!("{} spans of sufficient duration and frame count", spans.len());
    }

    let outfits_csv = default_export_name(table, "outfits")?;
    spans_to_csv(&spans, Path::new(&outfits_csv))?;
    info!("wrote span summary {outfits_csv}");

    // One csv of raw rows per span, named after its label.
    for span in &spans {
        let filename = format!("{}.csv", span.label().replace(' ', "_").replace('*', ""));
        table.write_csv_rows(Path::new(&filename), &span.rows)?;
        debug!("wrote span rows {filename}");
    }

    if summarize {
        print_summary(&spans);
    }

    if spans.len() > 1 {
        correlate(&spans)?;
    }

    plot::plot_costs_vs_times(&spans, Path::new("costs_vs_times.svg"))?;
    plot::plot_histograms(&spans, Path::new("times_histo_outfits.svg"))?;
    Ok(())
}

/// Cost/duration correlation across spans. Downstream interpretation
/// depends on this number, so a failed computation is fatal for the
/// breakdown after being logged.
fn correlate(spans: &[Span]) -> Result<()> {
    let costs: Vec<f64> = spans
        .iter()
        .map(|s| {
            s.std_props
                .get(ARC_KEY)
                .and_then(|v| v.as_f64())
                .unwrap_or(s.arc)
        })
        .collect();
    let avgs: Vec<f64> = spans.iter().map(|s| s.avg).collect();
    let arcs: Vec<f64> = spans.iter().map(|s| s.arc).collect();

    match stats::corrcoef(&[costs, avgs, arcs]) {
        Ok(matrix) => {
            info!(
                "correlation between {} and {} is {:.4}",
                ARC_KEY, TIME_KEY, matrix[0][1]
            );
        }
        Err(err) => {
            error!("correlation computation failed: {err:#}");
            return Err(err);
        }
    }

    // Full matrix across all varying numeric span attributes.
    let (names, series) = numeric_span_series(spans);
    match stats::corrcoef(&series) {
        Ok(matrix) => {
            for (name, row) in names.iter().zip(&matrix) {
                let cells: Vec<String> = row.iter().map(|r| format!("{r:.3}")).collect();
                info!("corr {}: {}", name, cells.join(" "));
            }
        }
        Err(err) => {
            error!("correlation computation failed: {err:#}");
            return Err(err);
        }
    }
    Ok(())
}

/// Numeric per-span series: core attributes plus every numeric summary
/// field, keyed by name. Constant series have no defined correlation and
/// are left out rather than poisoning the whole matrix.
fn numeric_span_series(spans: &[Span]) -> (Vec<String>, Vec<Vec<f64>>) {
    let mut candidates: Vec<(String, Vec<f64>)> = vec![
        ("arc".to_string(), spans.iter().map(|s| s.arc).collect()),
        (
            "duration".to_string(),
            spans.iter().map(|s| s.duration).collect(),
        ),
        (
            "num_frames".to_string(),
            spans.iter().map(|s| s.num_frames as f64).collect(),
        ),
        ("avg".to_string(), spans.iter().map(|s| s.avg).collect()),
        ("std".to_string(), spans.iter().map(|s| s.std).collect()),
    ];

    if let Some(first) = spans.first() {
        for prop in first.std_props.keys() {
            let values: Vec<f64> = spans
                .iter()
                .filter_map(|s| s.std_props.get(prop).and_then(|v| v.as_f64()))
                .collect();
            if values.len() == spans.len() {
                candidates.push((prop.clone(), values));
            }
        }
    }

    let mut names = Vec::new();
    let mut series = Vec::new();
    for (name, values) in candidates {
        if values.windows(2).any(|w| w[0] != w[1]) {
            names.push(name);
            series.push(values);
        }
    }
    (names, series)
}

pub fn print_summary(spans: &[Span]) {
    println!(
        "{:<40} {:>12} {:>8} {:>10} {:>10} {:>10}",
        "outfit", "arc", "frames", "duration", "avg", "std"
    );
    for span in spans {
        println!(
            "{:<40} {:>12} {:>8} {:>10.3} {:>10.5} {:>10.5}",
            span.outfit,
            stats::abbrev_number(span.arc),
            span.num_frames,
            span.duration,
            span.avg,
            span.std
        );
    }
}

/// One csv row per retained span: every attribute except the raw duration
/// series and the captured row group.
pub fn spans_to_csv(spans: &[Span], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("create span csv {}", path.display()))?;

    let prop_names: Vec<String> = spans
        .first()
        .map(|s| s.std_props.keys().cloned().collect())
        .unwrap_or_default();

    let mut header = vec![
        "outfit".to_string(),
        "arc".to_string(),
        "num_frames".to_string(),
        "duration".to_string(),
        "start_frame".to_string(),
        "avg".to_string(),
        "std".to_string(),
        "p5".to_string(),
        "p25".to_string(),
        "p50".to_string(),
        "p75".to_string(),
        "p95".to_string(),
    ];
    header.extend(prop_names.iter().cloned());
    writer.write_record(&header)?;

    for span in spans {
        let mut row = vec![
            span.outfit.clone(),
            span.arc.to_string(),
            span.num_frames.to_string(),
            span.duration.to_string(),
            span.start_frame.to_string(),
            span.avg.to_string(),
            span.std.to_string(),
            span.percentiles.p5.to_string(),
            span.percentiles.p25.to_string(),
            span.percentiles.p50.to_string(),
            span.percentiles.p75.to_string(),
            span.percentiles.p95.to_string(),
        ];
        for prop in &prop_names {
            let value = span.std_props.get(prop).cloned().unwrap_or_default();
            row.push(value_to_string(&value));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Per-column comparison of two tables over their shared numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareRow {
    pub name: String,
    pub mean_a: f64,
    pub mean_b: f64,
    pub abs_diff_mean: f64,
    pub diff_mean_pct: f64,
}

/// Compare two frame tables column-wise and write the result as csv.
/// Both tables get the fill policy applied first so the means are taken
/// over the same semantics a single-table analysis would see.
pub fn compare_frames(
    a: &mut Table,
    b: &mut Table,
    out: impl Into<PathBuf>,
) -> Result<Vec<CompareRow>> {
    fill_blanks(a);
    fill_blanks(b);
    info!("comparing two data frames");

    let mut shared: Vec<String> = a
        .columns
        .iter()
        .filter(|name| {
            let Some(ca) = a.column_index(name) else {
                return false;
            };
            let Some(cb) = b.column_index(name) else {
                return false;
            };
            a.is_numeric_column(ca) && b.is_numeric_column(cb)
        })
        .cloned()
        .collect();
    shared.sort();
    info!("found {} shared numeric columns", shared.len());

    let mut rows = Vec::with_capacity(shared.len());
    for name in shared {
        let ca = a.column_index(&name).context("column vanished")?;
        let cb = b.column_index(&name).context("column vanished")?;
        let mean_a = a.column_mean(ca).unwrap_or(0.0);
        let mean_b = b.column_mean(cb).unwrap_or(0.0);
        let diff_mean_pct = if mean_a != 0.0 {
            100.0 * (mean_b - mean_a) / mean_a
        } else {
            0.0
        };
        rows.push(CompareRow {
            name,
            mean_a,
            mean_b,
            abs_diff_mean: (mean_a - mean_b).abs(),
            diff_mean_pct,
        });
    }

    let out = out.into();
    let mut writer = csv::Writer::from_path(&out)
        .with_context(|| format!("create comparison csv {}", out.display()))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows)
}
