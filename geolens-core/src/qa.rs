use std::collections::HashMap;

use arrow::array::Array;
use geolens_common::{GeoLensError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Dataset;
use crate::geometry::{self, BoundingBox, GeometryClass};
use crate::value;

/// Null census for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingColumn {
    pub name: String,
    pub null_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeCount {
    pub geometry_type: String,
    pub count: u64,
}

/// Health of the geometry column. Every non-null cell lands in exactly one
/// of empty / invalid / valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryHealth {
    pub type_histogram: Vec<TypeCount>,
    pub empty_count: usize,
    pub invalid_count: usize,
    pub valid_count: usize,
    /// Union extent of valid, non-empty geometries; None when there are none.
    pub bounding_box: Option<BoundingBox>,
}

/// A sub-statistic that could not be computed; the rest of the bundle is
/// still valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableStat {
    pub stat: String,
    pub reason: String,
}

/// Read-only QA snapshot of one dataset at computation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaBundle {
    pub row_count: usize,
    pub column_count: usize,
    pub crs: String,
    pub memory_bytes: usize,
    /// Columns with at least one null, sorted by null count descending.
    pub missing_by_column: Vec<MissingColumn>,
    /// Columns whose distinct non-null value count is <= 1. All-null and
    /// single-row columns qualify vacuously.
    pub constant_columns: Vec<String>,
    /// Absent when the dataset has no geometry binding.
    pub geometry: Option<GeometryHealth>,
    pub unavailable: Vec<UnavailableStat>,
}

/// Computes the full QA bundle. Sub-statistics fail independently: a
/// failure is recorded under `unavailable` and the call still succeeds.
pub fn compute_qa(dataset: &Dataset) -> Result<QaBundle> {
    let row_count = dataset.row_count();
    let column_count = dataset.column_count();
    let mut unavailable = Vec::new();

    let missing_by_column = missing_values(dataset, row_count);

    let constant_columns = match constant_columns(dataset) {
        Ok(cols) => cols,
        Err(e) => {
            unavailable.push(UnavailableStat {
                stat: "constant_columns".into(),
                reason: e.to_string(),
            });
            Vec::new()
        }
    };

    let geometry = if dataset.geometry.is_some() {
        match geometry_health(dataset) {
            Ok(health) => Some(health),
            Err(e) => {
                unavailable.push(UnavailableStat {
                    stat: "geometry_health".into(),
                    reason: e.to_string(),
                });
                None
            }
        }
    } else {
        None
    };

    debug!(
        rows = row_count,
        columns = column_count,
        unavailable = unavailable.len(),
        "qa bundle computed"
    );
    Ok(QaBundle {
        row_count,
        column_count,
        crs: dataset.crs_label(),
        memory_bytes: dataset.memory_bytes(),
        missing_by_column,
        constant_columns,
        geometry,
        unavailable,
    })
}

fn missing_values(dataset: &Dataset, row_count: usize) -> Vec<MissingColumn> {
    let mut out: Vec<MissingColumn> = dataset
        .schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let null_count: usize = dataset
                .batches
                .iter()
                .map(|b| b.column(i).null_count())
                .sum();
            let percentage = if row_count > 0 {
                null_count as f64 / row_count as f64 * 100.0
            } else {
                0.0
            };
            MissingColumn {
                name: field.name().clone(),
                null_count,
                percentage,
            }
        })
        .filter(|m| m.null_count > 0)
        .collect();
    out.sort_by(|a, b| b.null_count.cmp(&a.null_count).then(a.name.cmp(&b.name)));
    out
}

fn constant_columns(dataset: &Dataset) -> Result<Vec<String>> {
    let indices: Vec<usize> = (0..dataset.column_count()).collect();
    let flags: Vec<bool> = indices
        .par_iter()
        .map(|&i| is_constant(dataset, i))
        .collect();
    Ok(dataset
        .schema
        .fields()
        .iter()
        .zip(flags)
        .filter(|(_, constant)| *constant)
        .map(|(f, _)| f.name().clone())
        .collect())
}

/// Distinct non-null values <= 1, with early exit on the second value.
fn is_constant(dataset: &Dataset, index: usize) -> bool {
    let mut first: Option<String> = None;
    for batch in &dataset.batches {
        let column = batch.column(index);
        for row in 0..column.len() {
            let Some(v) = value::cell_to_string(column.as_ref(), row) else {
                continue;
            };
            match &first {
                None => first = Some(v),
                Some(seen) if *seen != v => return false,
                Some(_) => {}
            }
        }
    }
    true
}

fn geometry_health(dataset: &Dataset) -> Result<GeometryHealth> {
    let mut histogram: HashMap<&'static str, u64> = HashMap::new();
    let mut empty_count = 0usize;
    let mut invalid_count = 0usize;
    let mut valid_count = 0usize;
    let mut bounding_box: Option<BoundingBox> = None;

    for batch in &dataset.batches {
        let wkb = dataset.wkb_column(batch).ok_or_else(|| {
            GeoLensError::Geometry("geometry column is not WKB binary".to_owned())
        })?;
        for row in 0..wkb.len() {
            if wkb.is_null(row) {
                continue;
            }
            let geom = match geometry::decode_wkb(wkb.value(row)) {
                Ok(g) => g,
                Err(_) => {
                    // undecodable bytes count as invalid, typed unknown
                    invalid_count += 1;
                    *histogram.entry("Unknown").or_insert(0) += 1;
                    continue;
                }
            };
            *histogram.entry(geometry::type_label(&geom)).or_insert(0) += 1;
            match geometry::classify(&geom) {
                GeometryClass::Empty => empty_count += 1,
                GeometryClass::Invalid => invalid_count += 1,
                GeometryClass::Valid => {
                    valid_count += 1;
                    if let Some(bb) = geometry::bounds(&geom) {
                        match &mut bounding_box {
                            Some(acc) => acc.union(&bb),
                            None => bounding_box = Some(bb),
                        }
                    }
                }
            }
        }
    }

    let mut type_histogram: Vec<TypeCount> = histogram
        .into_iter()
        .map(|(geometry_type, count)| TypeCount {
            geometry_type: geometry_type.to_owned(),
            count,
        })
        .collect();
    type_histogram.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.geometry_type.cmp(&b.geometry_type))
    });

    Ok(GeometryHealth {
        type_histogram,
        empty_count,
        invalid_count,
        valid_count,
        bounding_box,
    })
}
