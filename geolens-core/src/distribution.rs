use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Equal-width histogram over finite values. A constant series collapses to
/// a single bin; NaN and infinities are skipped.
pub fn build_histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: finite.len() as u64,
        }];
    }
    let width = (max - min) / bins as f64;
    let mut counts = vec![0u64; bins];
    for v in &finite {
        let idx = (((v - min) / width) as usize).min(bins - 1); // max value lands in the last bin
        counts[idx] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| HistogramBin {
            lower: min + i as f64 * width,
            upper: min + (i + 1) as f64 * width,
            count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: u64,
    pub percentage: f64,
}

/// Frequency table over categorical values, descending by count with ties
/// broken by value so the output is deterministic.
pub fn frequency_table<I>(values: I, top_n: usize) -> Vec<FrequencyEntry>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut total = 0u64;
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
        total += 1;
    }
    let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    entries
        .into_iter()
        .take(top_n)
        .map(|(value, count)| FrequencyEntry {
            value,
            count,
            percentage: if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect()
}
