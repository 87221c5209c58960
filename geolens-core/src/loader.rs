use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, BinaryArray, BinaryBuilder, Float64Builder, Int64Builder, LargeBinaryArray, LargeStringArray, StringArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use geolens_common::{GeoLensError, Result};
use tracing::{info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::dataset::{Dataset, GeometryBinding, GEOMETRY_COLUMN};
use crate::geometry;
use crate::{geoparquet, gpkg};

/// What a format reader hands back before geometry binding.
pub struct RawTable {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    /// Geometry column named by the container's own metadata, if any.
    pub declared_geometry: Option<String>,
    pub crs: Option<String>,
    /// False for attribute-only formats (CSV): skip geometry detection.
    pub geometry_capable: bool,
    pub warnings: Vec<String>,
    pub fingerprint: u64,
}

/// Loads a file into a [`Dataset`], dispatching on extension. Supported:
/// `.gpkg`, `.parquet`/`.geoparquet`, and `.csv` (attribute-only). A
/// missing or unparseable geometry column is a warning, not an error: the
/// dataset still loads without a geometry binding.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    let raw = match ext.as_str() {
        "gpkg" => gpkg::read_gpkg(path)?,
        "parquet" | "geoparquet" => geoparquet::read_geoparquet(path)?,
        "csv" => read_csv(path)?,
        _ => return Err(GeoLensError::UnsupportedFormat(path.display().to_string())),
    };
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset")
        .to_owned();
    let dataset = bind_geometry(name, raw)?;
    info!(
        name = %dataset.name,
        rows = dataset.row_count(),
        columns = dataset.column_count(),
        geometry = dataset.geometry.is_some(),
        crs = %dataset.crs_label(),
        "dataset loaded"
    );
    Ok(dataset)
}

/// Picks the geometry column: the container's declared column first, then
/// an exact `geometry` match, then the first name containing `geom` or
/// `shape` (case-insensitive).
pub fn detect_geometry_column(schema: &Schema, declared: Option<&str>) -> Option<usize> {
    if let Some(name) = declared {
        if let Ok(idx) = schema.index_of(name) {
            return Some(idx);
        }
    }
    if let Ok(idx) = schema.index_of(GEOMETRY_COLUMN) {
        return Some(idx);
    }
    schema.fields().iter().position(|f| {
        let lower = f.name().to_ascii_lowercase();
        lower.contains("geom") || lower.contains("shape")
    })
}

fn bind_geometry(name: String, raw: RawTable) -> Result<Dataset> {
    let mut warnings = raw.warnings;
    let candidate = if raw.geometry_capable {
        detect_geometry_column(&raw.schema, raw.declared_geometry.as_deref())
    } else {
        None
    };

    let Some(index) = candidate else {
        if raw.geometry_capable {
            warn!(dataset = %name, "no geometry column found; geometry features disabled");
            warnings.push(
                "no geometry column was found; map and geometry statistics are disabled".into(),
            );
        }
        return Ok(Dataset {
            name,
            schema: raw.schema,
            batches: raw.batches,
            geometry: None,
            crs: raw.crs,
            warnings,
            fingerprint: raw.fingerprint,
        });
    };

    let source_name = raw.schema.field(index).name().clone();
    match normalize_geometry(&raw.schema, &raw.batches, index) {
        Ok((schema, batches, dropped)) => {
            if dropped > 0 {
                warnings.push(format!(
                    "{dropped} value(s) in `{source_name}` could not be parsed as geometry and were nulled"
                ));
            }
            Ok(Dataset {
                name,
                schema,
                batches,
                geometry: Some(GeometryBinding { index, source_name }),
                crs: raw.crs,
                warnings,
                fingerprint: raw.fingerprint,
            })
        }
        Err(e) => {
            // fallback of last resort: keep the attributes, drop the binding
            warn!(dataset = %name, column = %source_name, error = %e, "geometry binding failed");
            warnings.push(format!(
                "column `{source_name}` looked like geometry but could not be decoded ({e}); \
                 continuing without geometry"
            ));
            Ok(Dataset {
                name,
                schema: raw.schema,
                batches: raw.batches,
                geometry: None,
                crs: raw.crs,
                warnings,
                fingerprint: raw.fingerprint,
            })
        }
    }
}

/// Rewrites the chosen column as a `Binary` WKB column under the canonical
/// name. Binary columns are assumed WKB (verified on the first non-null
/// value); string columns are parsed as WKT and re-encoded. Individual WKT
/// cells that fail to parse become null and are counted for the caller.
fn normalize_geometry(
    schema: &SchemaRef,
    batches: &[RecordBatch],
    index: usize,
) -> Result<(SchemaRef, Vec<RecordBatch>, usize)> {
    let dt = schema.field(index).data_type().clone();
    let is_text = matches!(dt, DataType::Utf8 | DataType::LargeUtf8);
    let is_binary = matches!(dt, DataType::Binary | DataType::LargeBinary);
    if !is_text && !is_binary {
        return Err(GeoLensError::Geometry(format!(
            "unsupported geometry column type {dt}"
        )));
    }

    // probe the leading non-null values: a column where none of them
    // decode is not geometry and fails the binding; a corrupt cell among
    // decodable ones is left for the per-cell handling below
    probe_binding(batches, index, is_text)?;

    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[index] = Field::new(GEOMETRY_COLUMN, DataType::Binary, true);
    let new_schema = Arc::new(Schema::new(fields));

    let mut dropped = 0usize;
    let mut out = Vec::with_capacity(batches.len());
    for batch in batches {
        let column = batch.column(index);
        let mut builder = BinaryBuilder::new();
        for row in 0..column.len() {
            if column.is_null(row) {
                builder.append_null();
                continue;
            }
            if is_text {
                let text = text_cell(column.as_ref(), row);
                match geometry::wkt_to_wkb(text) {
                    Ok(wkb) => builder.append_value(wkb),
                    Err(_) => {
                        dropped += 1;
                        builder.append_null();
                    }
                }
            } else {
                // keep raw WKB bytes; undecodable cells are the QA
                // calculator's business (counted invalid there)
                builder.append_value(binary_cell(column.as_ref(), row));
            }
        }
        let mut columns = batch.columns().to_vec();
        columns[index] = Arc::new(builder.finish());
        out.push(RecordBatch::try_new(new_schema.clone(), columns)?);
    }
    Ok((new_schema, out, dropped))
}

const PROBE_LIMIT: usize = 8;

/// Tries to decode the first few non-null cells. Succeeds as soon as one
/// decodes; fails with the last decode error when none of the probed cells
/// (or none at all, on a short column) do. All-null columns pass.
fn probe_binding(batches: &[RecordBatch], index: usize, is_text: bool) -> Result<()> {
    let mut probed = 0usize;
    let mut last_err = None;
    for batch in batches {
        let column = batch.column(index);
        for row in 0..column.len() {
            if column.is_null(row) {
                continue;
            }
            let result = if is_text {
                geometry::wkt_to_wkb(text_cell(column.as_ref(), row)).map(|_| ())
            } else {
                geometry::decode_wkb(binary_cell(column.as_ref(), row)).map(|_| ())
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    probed += 1;
                    if probed == PROBE_LIMIT {
                        return Err(e);
                    }
                    last_err = Some(e);
                }
            }
        }
    }
    match last_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn text_cell(array: &dyn Array, row: usize) -> &str {
    if let Some(a) = array.as_any().downcast_ref::<StringArray>() {
        a.value(row)
    } else if let Some(a) = array.as_any().downcast_ref::<LargeStringArray>() {
        a.value(row)
    } else {
        ""
    }
}

fn binary_cell(array: &dyn Array, row: usize) -> &[u8] {
    if let Some(a) = array.as_any().downcast_ref::<BinaryArray>() {
        a.value(row)
    } else if let Some(a) = array.as_any().downcast_ref::<LargeBinaryArray>() {
        a.value(row)
    } else {
        &[]
    }
}

/// Attribute-only CSV loading with narrow-to-wide type inference per
/// column (all int → Int64, all numeric → Float64, else Utf8). Empty
/// fields are nulls.
fn read_csv(path: &Path) -> Result<RawTable> {
    let bytes = std::fs::read(path)?;
    let fingerprint = xxh3_64(&bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes.as_slice());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| GeoLensError::ParseFailure(format!("{}: {e}", path.display())))?
        .iter()
        .map(|h| h.to_owned())
        .collect();
    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record.map_err(|e| GeoLensError::ParseFailure(format!("{}: {e}", path.display())))?);
    }

    let mut fields = Vec::with_capacity(headers.len());
    let mut arrays: Vec<arrow::array::ArrayRef> = Vec::with_capacity(headers.len());
    for (i, header) in headers.iter().enumerate() {
        let values: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.get(i).filter(|v| !v.is_empty()))
            .collect();
        let all_int = values
            .iter()
            .flatten()
            .all(|v| v.parse::<i64>().is_ok());
        let all_float = values
            .iter()
            .flatten()
            .all(|v| v.parse::<f64>().is_ok());
        let has_values = values.iter().any(|v| v.is_some());
        if has_values && all_int {
            let mut builder = Int64Builder::new();
            for v in &values {
                match v.and_then(|v| v.parse::<i64>().ok()) {
                    Some(n) => builder.append_value(n),
                    None => builder.append_null(),
                }
            }
            fields.push(Field::new(header, DataType::Int64, true));
            arrays.push(Arc::new(builder.finish()));
        } else if has_values && all_float {
            let mut builder = Float64Builder::new();
            for v in &values {
                match v.and_then(|v| v.parse::<f64>().ok()) {
                    Some(n) => builder.append_value(n),
                    None => builder.append_null(),
                }
            }
            fields.push(Field::new(header, DataType::Float64, true));
            arrays.push(Arc::new(builder.finish()));
        } else {
            let mut builder = StringBuilder::new();
            for v in &values {
                match v {
                    Some(s) => builder.append_value(*s),
                    None => builder.append_null(),
                }
            }
            fields.push(Field::new(header, DataType::Utf8, true));
            arrays.push(Arc::new(builder.finish()));
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    Ok(RawTable {
        schema,
        batches: vec![batch],
        declared_geometry: None,
        crs: None,
        geometry_capable: false,
        warnings: Vec::new(),
        fingerprint,
    })
}
