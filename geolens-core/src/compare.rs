use std::collections::BTreeSet;

use geolens_common::{GeoLensError, Result};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::distribution::{build_histogram, frequency_table, FrequencyEntry, HistogramBin};
use crate::qa::{compute_qa, QaBundle};
use crate::value::{self, ColumnKind};

/// Case-sensitive partition of the column-name union of two schemas. The
/// three parts are pairwise disjoint and together cover the union.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaPartition {
    pub only_in_left: Vec<String>,
    pub only_in_right: Vec<String>,
    pub common: Vec<String>,
}

pub fn diff_schemas(left: &Dataset, right: &Dataset) -> SchemaPartition {
    let lset: BTreeSet<String> = left.column_names().into_iter().collect();
    let rset: BTreeSet<String> = right.column_names().into_iter().collect();
    SchemaPartition {
        only_in_left: lset.difference(&rset).cloned().collect(),
        only_in_right: rset.difference(&lset).cloned().collect(),
        common: lset.intersection(&rset).cloned().collect(),
    }
}

/// Schema diff plus independently computed QA bundles per side. A failure
/// on one side fails the whole comparison; the sides never get merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub left_name: String,
    pub right_name: String,
    pub schema: SchemaPartition,
    pub left: QaBundle,
    pub right: QaBundle,
}

pub fn compare_datasets(left: &Dataset, right: &Dataset) -> Result<ComparisonReport> {
    Ok(ComparisonReport {
        left_name: left.name.clone(),
        right_name: right.name.clone(),
        schema: diff_schemas(left, right),
        left: compute_qa(left)?,
        right: compute_qa(right)?,
    })
}

/// Two overlay-ready series for one shared column, one per side. Numeric
/// bins use the same bin count but independently computed edges per side —
/// the overlay is approximate by design, not bit-identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionPair {
    Numeric {
        left: Vec<HistogramBin>,
        right: Vec<HistogramBin>,
    },
    Categorical {
        left: Vec<FrequencyEntry>,
        right: Vec<FrequencyEntry>,
    },
}

pub fn distribution_pair(
    left: &Dataset,
    right: &Dataset,
    column: &str,
    bins: usize,
    top_n: usize,
) -> Result<DistributionPair> {
    let (Some(ldt), Some(rdt)) = (left.column_type(column), right.column_type(column)) else {
        return Err(GeoLensError::ColumnMissing(column.to_owned()));
    };
    match (value::column_kind(&ldt), value::column_kind(&rdt)) {
        (ColumnKind::Numeric, ColumnKind::Numeric) => {
            let lvals = numeric_values(left, column);
            let rvals = numeric_values(right, column);
            if lvals.is_empty() && rvals.is_empty() {
                return Err(GeoLensError::EmptyInput(format!(
                    "column `{column}` has no non-null values on either side"
                )));
            }
            Ok(DistributionPair::Numeric {
                left: build_histogram(&lvals, bins),
                right: build_histogram(&rvals, bins),
            })
        }
        (ColumnKind::Categorical, ColumnKind::Categorical) => {
            let lvals = text_values(left, column);
            let rvals = text_values(right, column);
            if lvals.is_empty() && rvals.is_empty() {
                return Err(GeoLensError::EmptyInput(format!(
                    "column `{column}` has no non-null values on either side"
                )));
            }
            Ok(DistributionPair::Categorical {
                left: frequency_table(lvals, top_n),
                right: frequency_table(rvals, top_n),
            })
        }
        // no coercion across kinds
        _ => Err(GeoLensError::TypeMismatch {
            column: column.to_owned(),
            left: ldt.to_string(),
            right: rdt.to_string(),
        }),
    }
}

fn numeric_values(dataset: &Dataset, column: &str) -> Vec<f64> {
    let Some(index) = dataset.column_index(column) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for batch in &dataset.batches {
        let array = batch.column(index);
        for row in 0..array.len() {
            if let Some(v) = value::numeric_cell(array.as_ref(), row) {
                out.push(v);
            }
        }
    }
    out
}

fn text_values(dataset: &Dataset, column: &str) -> Vec<String> {
    let Some(index) = dataset.column_index(column) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for batch in &dataset.batches {
        let array = batch.column(index);
        for row in 0..array.len() {
            if let Some(v) = value::cell_to_string(array.as_ref(), row) {
                out.push(v);
            }
        }
    }
    out
}
