//! Small numeric helpers over per-frame duration series.

use crate::Result;
use anyhow::bail;

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Linear-interpolation percentile, `q` in [0, 100].
pub fn percentile(xs: &[f64], q: f64) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let weight = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * weight
}

/// Population standard deviation.
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Pearson correlation of two equally sized series.
///
/// A degenerate (constant) series has no defined correlation; that is an
/// error here so the caller can treat it as fatal rather than emit junk.
pub fn pearson(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        bail!("correlation inputs differ in length: {} vs {}", a.len(), b.len());
    }
    if a.len() < 2 {
        bail!("correlation needs at least 2 samples, got {}", a.len());
    }
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        var_a += (x - ma) * (x - ma);
        var_b += (y - mb) * (y - mb);
    }
    if var_a == 0.0 || var_b == 0.0 {
        bail!("correlation undefined for a constant series");
    }
    Ok(cov / (var_a.sqrt() * var_b.sqrt()))
}

/// Pearson correlation matrix over a set of series.
pub fn corrcoef(series: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let n = series.len();
    let mut matrix = vec![vec![1.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let r = pearson(&series[i], &series[j])?;
            matrix[i][j] = r;
            matrix[j][i] = r;
        }
    }
    Ok(matrix)
}

/// Shorten 33412.0 to "33K", etc., for simplified display labels.
pub fn abbrev_number(f: f64) -> String {
    if f <= 0.0 {
        return "0".to_string();
    }
    if f <= 1e3 {
        format!("{}", f as i64)
    } else if f <= 1e6 {
        format!("{}K", (f / 1e3) as i64)
    } else if f <= 1e9 {
        format!("{}M", (f / 1e6) as i64)
    } else if f <= 1e12 {
        format!("{}G", (f / 1e9) as i64)
    } else {
        format!("{}T", (f / 1e12) as i64)
    }
}
