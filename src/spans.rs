//! Span segmentation: contiguous runs sharing an outfit+cost signature.
//!
//! A run id increments every time the recorded cost changes from the
//! previous row, so a return to an earlier cost starts a new run rather
//! than merging with it. Grouping on the recorded cost (already quantized)
//! keeps the segmentation robust to noisy per-frame durations.

use crate::Result;
use crate::derived::{BOOL_GRAPHIC_PROPERTIES, SUM_GRAPHIC_PROPERTIES};
use crate::stats;
use crate::table::{Table, value_to_string};
use anyhow::Context;
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;

pub const OUTFIT_KEY: &str = "Avatars.Self.OutfitName";
pub const ARC_KEY: &str = "Avatars.Self.ARCCalculated";
pub const TIME_KEY: &str = "Timers.Frame.Time";

/// Spans below these limits carry too little signal to report.
#[derive(Debug, Clone, Copy)]
pub struct SpanThresholds {
    pub min_frames: usize,
    pub min_duration: f64,
}

impl Default for SpanThresholds {
    fn default() -> Self {
        Self {
            min_frames: 200,
            min_duration: 10.0,
        }
    }
}

/// Duration percentiles captured per span.
#[derive(Debug, Clone, Copy)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

impl Percentiles {
    pub fn of(times: &[f64]) -> Self {
        Self {
            p5: stats::percentile(times, 5.0),
            p25: stats::percentile(times, 25.0),
            p50: stats::percentile(times, 50.0),
            p75: stats::percentile(times, 75.0),
            p95: stats::percentile(times, 95.0),
        }
    }
}

/// One maximal run of frames sharing an (outfit, cost) signature.
#[derive(Debug, Clone)]
pub struct Span {
    pub outfit: String,
    pub arc: f64,
    pub duration: f64,
    pub num_frames: usize,
    pub start_frame: usize,
    /// Median of the per-frame durations (same as `percentiles.p50`).
    pub avg: f64,
    pub std: f64,
    pub percentiles: Percentiles,
    /// Per-frame duration series for this span.
    pub times: Vec<f64>,
    /// Row indices into the source table.
    pub rows: Vec<usize>,
    /// Summary fields sampled from the span's first row.
    pub std_props: BTreeMap<String, Value>,
}

impl Span {
    pub fn label(&self) -> String {
        format!(
            "{} arc {} frames {}",
            self.outfit,
            stats::abbrev_number(self.arc),
            self.num_frames
        )
    }
}

/// Summary fields captured per span: avatar cost, attachment texture stats,
/// and every derived attachment aggregate.
pub fn standard_props() -> Vec<String> {
    let mut props: Vec<String> = [
        "Avatars.Self.ARCCalculated",
        "Avatars.Self.AttachmentTextures.material_texture_count",
        "Avatars.Self.AttachmentTextures.material_texture_missing",
        "Avatars.Self.AttachmentTextures.material_texture_mpixels",
        "Avatars.Self.AttachmentTextures.texture_count",
        "Avatars.Self.AttachmentTextures.texture_missing",
        "Avatars.Self.AttachmentTextures.texture_mpixels",
        "Derived.Avatar.Attachments.Count",
        "Derived.Avatar.Attachments.triangles_high",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    props.extend(
        BOOL_GRAPHIC_PROPERTIES
            .iter()
            .chain(SUM_GRAPHIC_PROPERTIES)
            .map(|key| format!("Derived.Avatar.Attachments.{key}")),
    );
    props
}

/// Run ids over the cost column: 1-based, incrementing whenever the value
/// differs from the previous row.
pub fn run_ids(costs: &[&Value]) -> Vec<usize> {
    let mut ids = Vec::with_capacity(costs.len());
    let mut current = 1usize;
    for (i, cost) in costs.iter().enumerate() {
        if i > 0 && costs[i - 1] != *cost {
            current += 1;
        }
        ids.push(current);
    }
    ids
}

/// Segment a table into retained spans, sorted ascending by median frame
/// duration.
pub fn get_outfit_spans(table: &Table, thresholds: SpanThresholds) -> Result<Vec<Span>> {
    let outfit_col = table
        .column_index(OUTFIT_KEY)
        .with_context(|| format!("table is missing the {OUTFIT_KEY} column"))?;
    let arc_col = table
        .column_index(ARC_KEY)
        .with_context(|| format!("table is missing the {ARC_KEY} column"))?;
    let time_col = table
        .column_index(TIME_KEY)
        .with_context(|| format!("table is missing the {TIME_KEY} column"))?;

    let costs: Vec<&Value> = table.rows.iter().map(|row| &row[arc_col]).collect();
    let ids = run_ids(&costs);

    // Group rows on (outfit, cost, run id). Keyed on the cost's bit pattern
    // so equal values group and NaNs do not poison the key.
    let mut groups: BTreeMap<(String, u64, usize), Vec<usize>> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        let outfit = value_to_string(&row[outfit_col]);
        let arc = row[arc_col].as_f64().unwrap_or(f64::NAN);
        groups
            .entry((outfit, arc.to_bits(), ids[i]))
            .or_default()
            .push(i);
    }
    debug!("grouped into {} candidate spans", groups.len());

    let mut spans = Vec::new();
    for ((outfit, arc_bits, _run), rows) in groups {
        let times: Vec<f64> = rows
            .iter()
            .map(|&i| table.rows[i][time_col].as_f64().unwrap_or(0.0))
            .collect();
        let num_frames = rows.len();
        let duration: f64 = times.iter().sum();
        if num_frames <= thresholds.min_frames || duration <= thresholds.min_duration {
            continue;
        }

        let first = rows[0];
        let std_props = standard_props()
            .into_iter()
            .map(|prop| {
                let value = table.cell(first, &prop).cloned().unwrap_or(Value::Null);
                (prop, value)
            })
            .collect();

        let percentiles = Percentiles::of(&times);
        spans.push(Span {
            outfit,
            arc: f64::from_bits(arc_bits),
            duration,
            num_frames,
            start_frame: first,
            avg: percentiles.p50,
            std: stats::std_dev(&times),
            percentiles,
            times,
            rows,
            std_props,
        });
    }

    spans.sort_by(|a, b| {
        a.avg
            .partial_cmp(&b.avg)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    debug!(
        "{} spans of sufficient duration and frame count",
        spans.len()
    );
    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn table_with(outfits: &[&str], arcs: &[f64], times: &[f64]) -> Table {
        let mut table = Table::new(&[
            OUTFIT_KEY.to_string(),
            ARC_KEY.to_string(),
            TIME_KEY.to_string(),
        ]);
        for ((outfit, arc), time) in outfits.iter().zip(arcs).zip(times) {
            let mut row = vec![Value::Null; 3];
            row[table.column_index(OUTFIT_KEY).unwrap()] = json!(outfit);
            row[table.column_index(ARC_KEY).unwrap()] = json!(arc);
            row[table.column_index(TIME_KEY).unwrap()] = json!(time);
            table.rows.push(row);
        }
        table
    }

    fn relaxed() -> SpanThresholds {
        SpanThresholds {
            min_frames: 0,
            min_duration: 0.0,
        }
    }

    #[test]
    fn run_ids_restart_on_any_cost_change() {
        let costs = [5.0, 5.0, 5.0, 7.0, 7.0, 5.0, 5.0].map(|x| json!(x));
        let refs: Vec<&Value> = costs.iter().collect();
        // A return to an earlier cost starts a new run, not a merge.
        assert_eq!(run_ids(&refs), vec![1, 1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn segmentation_splits_runs_and_keeps_them_separate() {
        let table = table_with(
            &["a"; 7],
            &[5.0, 5.0, 5.0, 7.0, 7.0, 5.0, 5.0],
            &[1.0, 1.0, 1.0, 2.0, 2.0, 1.5, 1.5],
        );
        let spans = get_outfit_spans(&table, relaxed()).unwrap();
        assert_eq!(spans.len(), 3);
        // Sorted by median duration: first run, the return to cost 5, then
        // the cost-7 run. The two cost-5 runs stay separate.
        assert_eq!(spans[0].rows, vec![0, 1, 2]);
        assert_eq!(spans[1].rows, vec![5, 6]);
        assert_eq!(spans[2].rows, vec![3, 4]);
        let frames: Vec<usize> = spans.iter().map(|s| s.num_frames).collect();
        assert_eq!(frames, vec![3, 2, 2]);
    }

    #[test]
    fn insignificant_spans_are_dropped() {
        // 100 frames of 0.05s: fails both the frame and duration cutoffs.
        let table = table_with(&["a"; 100], &[5.0; 100], &[0.05; 100]);
        let spans = get_outfit_spans(&table, SpanThresholds::default()).unwrap();
        assert!(spans.is_empty());

        // 300 frames but only 3 seconds: still dropped.
        let table = table_with(&["a"; 300], &[5.0; 300], &[0.01; 300]);
        let spans = get_outfit_spans(&table, SpanThresholds::default()).unwrap();
        assert!(spans.is_empty());

        // 300 frames and 30 seconds: retained.
        let table = table_with(&["a"; 300], &[5.0; 300], &[0.1; 300]);
        let spans = get_outfit_spans(&table, SpanThresholds::default()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].num_frames, 300);
    }

    #[test]
    fn spans_sorted_by_median_duration() {
        let mut outfits = vec!["slow"; 4];
        outfits.extend(vec!["fast"; 4]);
        let arcs = [9.0, 9.0, 9.0, 9.0, 2.0, 2.0, 2.0, 2.0];
        let times = [0.04, 0.04, 0.04, 0.04, 0.01, 0.01, 0.01, 0.01];
        let table = table_with(&outfits, &arcs, &times);
        let spans = get_outfit_spans(&table, relaxed()).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].outfit, "fast");
        assert_eq!(spans[1].outfit, "slow");
        assert!(spans[0].avg < spans[1].avg);
    }

    #[test]
    fn single_constant_span_end_to_end() {
        let table = table_with(
            &["casual"; 3],
            &[4200.0; 3],
            &[0.01, 0.02, 0.015],
        );
        let spans = get_outfit_spans(&table, relaxed()).unwrap();
        assert_eq!(spans.len(), 1);
        let span = spans[0].clone();
        assert_eq!(span.outfit, "casual");
        assert_eq!(span.arc, 4200.0);
        assert_eq!(span.num_frames, 3);
        assert_eq!(span.avg, 0.015);
        assert_eq!(span.percentiles.p50, span.avg);
        assert!((span.percentiles.p5 - 0.0105).abs() < 1e-12);
        assert!((span.percentiles.p95 - 0.0195).abs() < 1e-12);
        assert_eq!(span.start_frame, 0);
        assert!((span.duration - 0.045).abs() < 1e-12);

        // With the default thresholds the same table yields nothing.
        let spans = get_outfit_spans(&table, SpanThresholds::default()).unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn spans_from_a_parsed_log_end_to_end() {
        use crate::config::AnalyzeConfig;
        use crate::table::{collect_frame_data, fill_blanks};
        use std::io::Write;

        let mut log = tempfile::NamedTempFile::with_suffix(".slp").unwrap();
        for time in [0.01, 0.02, 0.015] {
            write!(
                log,
                "<llsd><map>\
                 <key>Avatars</key><map><key>Self</key><map>\
                 <key>OutfitName</key><string>casual</string>\
                 <key>ARCCalculated</key><real>4200</real>\
                 </map></map>\
                 <key>Timers</key><map><key>Frame</key><map>\
                 <key>Time</key><real>{time}</real></map></map>\
                 </map></llsd>\n"
            )
            .unwrap();
        }

        let fields = vec![
            OUTFIT_KEY.to_string(),
            ARC_KEY.to_string(),
            TIME_KEY.to_string(),
        ];
        let mut table = collect_frame_data(
            &log.path().to_string_lossy(),
            &fields,
            &AnalyzeConfig::default(),
        )
        .unwrap();
        fill_blanks(&mut table);

        let spans = get_outfit_spans(&table, relaxed()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].outfit, "casual");
        assert_eq!(spans[0].arc, 4200.0);
        assert_eq!(spans[0].avg, 0.015);

        // The same table is below both default thresholds.
        let spans = get_outfit_spans(&table, SpanThresholds::default()).unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn std_props_sampled_from_first_row() {
        let mut columns = vec![
            OUTFIT_KEY.to_string(),
            ARC_KEY.to_string(),
            TIME_KEY.to_string(),
            "Derived.Avatar.Attachments.Count".to_string(),
        ];
        columns.sort();
        let mut table = Table::new(&columns);
        for (arc, count) in [(5.0, 3.0), (5.0, 4.0)] {
            let mut row = vec![Value::Null; columns.len()];
            row[table.column_index(OUTFIT_KEY).unwrap()] = json!("a");
            row[table.column_index(ARC_KEY).unwrap()] = json!(arc);
            row[table.column_index(TIME_KEY).unwrap()] = json!(1.0);
            row[table
                .column_index("Derived.Avatar.Attachments.Count")
                .unwrap()] = json!(count);
            table.rows.push(row);
        }
        let spans = get_outfit_spans(&table, relaxed()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(
            spans[0].std_props["Derived.Avatar.Attachments.Count"],
            json!(3.0)
        );
        // Columns absent from the table stay null rather than failing.
        assert_eq!(spans[0].std_props[ARC_KEY], json!(5.0));
        assert_eq!(
            spans[0].std_props["Avatars.Self.AttachmentTextures.texture_count"],
            Value::Null
        );
    }
}
