use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geolens_common::{GeoLensError, Result};
use memmap2::Mmap;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use xxhash_rust::xxh3::xxh3_64;

use crate::loader::RawTable;

/// Reads the first feature table of a GeoPackage. Geometry blobs are
/// stripped of their GP header down to plain WKB; the CRS comes from
/// `gpkg_spatial_ref_sys`.
pub fn read_gpkg(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path)?;
    let mmap: Mmap = unsafe { Mmap::map(&file)? };
    let fingerprint = xxh3_64(&mmap);
    drop(mmap);

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let (table, srs_id): (String, i64) = conn
        .query_row(
            "SELECT table_name, srs_id FROM gpkg_contents WHERE data_type = 'features' \
             ORDER BY table_name LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| GeoLensError::ParseFailure(format!("not a GeoPackage: {e}")))?
        .ok_or_else(|| {
            GeoLensError::ParseFailure("GeoPackage has no feature table".to_owned())
        })?;

    let geom_column: Option<String> = conn
        .query_row(
            "SELECT column_name FROM gpkg_geometry_columns WHERE table_name = ?1",
            [&table],
            |row| row.get(0),
        )
        .optional()?;

    let crs: Option<String> = if srs_id > 0 {
        conn.query_row(
            "SELECT organization, organization_coordsys_id FROM gpkg_spatial_ref_sys \
             WHERE srs_id = ?1",
            [srs_id],
            |row| {
                let org: String = row.get(0)?;
                let code: i64 = row.get(1)?;
                Ok(format!("{}:{}", org.to_uppercase(), code))
            },
        )
        .optional()?
    } else {
        None
    };

    let quoted = table.replace('"', "\"\"");
    let mut stmt = conn.prepare(&format!("SELECT * FROM \"{quoted}\""))?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let ncols = names.len();

    let mut cells: Vec<Vec<Value>> = Vec::with_capacity(ncols);
    cells.resize_with(ncols, Vec::new);
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        for (i, col) in cells.iter_mut().enumerate() {
            col.push(row.get::<_, Value>(i)?);
        }
    }

    let mut warnings = Vec::new();
    let mut fields = Vec::with_capacity(ncols);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(ncols);
    for (name, column) in names.iter().zip(&cells) {
        let is_geometry = geom_column.as_deref() == Some(name.as_str());
        let (dt, array) = if is_geometry {
            let mut bad = 0usize;
            let array = build_geometry_column(column, &mut bad);
            if bad > 0 {
                warnings.push(format!(
                    "{bad} geometry blob(s) in `{name}` had no readable GeoPackage header"
                ));
            }
            (DataType::Binary, array)
        } else {
            build_attribute_column(column)
        };
        fields.push(Field::new(name, dt, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    Ok(RawTable {
        schema,
        batches: vec![batch],
        declared_geometry: geom_column,
        crs,
        geometry_capable: true,
        warnings,
        fingerprint,
    })
}

fn build_geometry_column(column: &[Value], bad: &mut usize) -> ArrayRef {
    let mut builder = BinaryBuilder::new();
    for value in column {
        match value {
            Value::Blob(blob) => match strip_gpkg_header(blob) {
                Ok(wkb) => builder.append_value(wkb),
                Err(_) => {
                    *bad += 1;
                    builder.append_null();
                }
            },
            _ => builder.append_null(),
        }
    }
    Arc::new(builder.finish())
}

/// SQLite columns are dynamically typed; pick the narrowest Arrow type the
/// observed values fit: Int64 < Float64 < Utf8, blobs stay binary.
fn build_attribute_column(column: &[Value]) -> (DataType, ArrayRef) {
    let mut has_int = false;
    let mut has_real = false;
    let mut has_text = false;
    let mut has_blob = false;
    for value in column {
        match value {
            Value::Integer(_) => has_int = true,
            Value::Real(_) => has_real = true,
            Value::Text(_) => has_text = true,
            Value::Blob(_) => has_blob = true,
            Value::Null => {}
        }
    }

    if has_blob && !has_text && !has_int && !has_real {
        let mut builder = BinaryBuilder::new();
        for value in column {
            match value {
                Value::Blob(b) => builder.append_value(b),
                _ => builder.append_null(),
            }
        }
        return (DataType::Binary, Arc::new(builder.finish()));
    }
    if has_text || has_blob {
        let mut builder = StringBuilder::new();
        for value in column {
            match value {
                Value::Integer(i) => builder.append_value(i.to_string()),
                Value::Real(f) => builder.append_value(f.to_string()),
                Value::Text(s) => builder.append_value(s),
                _ => builder.append_null(),
            }
        }
        return (DataType::Utf8, Arc::new(builder.finish()));
    }
    if has_real {
        let mut builder = Float64Builder::new();
        for value in column {
            match value {
                Value::Integer(i) => builder.append_value(*i as f64),
                Value::Real(f) => builder.append_value(*f),
                _ => builder.append_null(),
            }
        }
        return (DataType::Float64, Arc::new(builder.finish()));
    }
    let mut builder = Int64Builder::new();
    for value in column {
        match value {
            Value::Integer(i) => builder.append_value(*i),
            _ => builder.append_null(),
        }
    }
    (DataType::Int64, Arc::new(builder.finish()))
}

/// Strips the GeoPackage binary header (magic "GP", version, flags, srs_id,
/// optional envelope) and returns the trailing WKB payload.
pub fn strip_gpkg_header(blob: &[u8]) -> Result<&[u8]> {
    if blob.len() < 8 || blob[0] != b'G' || blob[1] != b'P' {
        return Err(GeoLensError::Geometry(
            "blob is not GeoPackage geometry (missing GP magic)".to_owned(),
        ));
    }
    let flags = blob[3];
    let envelope_len = match (flags >> 1) & 0x07 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        code => {
            return Err(GeoLensError::Geometry(format!(
                "invalid GeoPackage envelope contents indicator: {code}"
            )))
        }
    };
    let header_len = 8 + envelope_len;
    if blob.len() < header_len {
        return Err(GeoLensError::Geometry(
            "GeoPackage geometry blob shorter than its declared header".to_owned(),
        ));
    }
    Ok(&blob[header_len..])
}

/// Wraps WKB in a GeoPackage header (little-endian, no envelope). Used by
/// test fixtures and kept next to the parser so the two stay in sync.
pub fn wrap_gpkg_header(wkb: &[u8], srs_id: i32) -> Vec<u8> {
    let mut blob = Vec::with_capacity(8 + wkb.len());
    blob.extend_from_slice(b"GP");
    blob.push(0); // version
    blob.push(0x01); // flags: little-endian, no envelope
    blob.extend_from_slice(&srs_id.to_le_bytes());
    blob.extend_from_slice(wkb);
    blob
}
