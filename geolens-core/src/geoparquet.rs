use bytes::Bytes;
use geolens_common::{GeoLensError, Result};
use memmap2::Mmap;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

use crate::loader::RawTable;

/// Default CRS when a GeoParquet `geo` block omits or nulls the crs field,
/// per the GeoParquet specification.
pub const DEFAULT_GEOPARQUET_CRS: &str = "OGC:CRS84";

/// Reads a GeoParquet (or plain Parquet) file into record batches, pulling
/// the primary geometry column and CRS out of the file-level `geo`
/// key-value metadata when present.
pub fn read_geoparquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path)?;
    // memory-map for zero-copy footer access and fingerprinting
    let mmap: Mmap = unsafe { Mmap::map(&file)? };
    let fingerprint = xxh3_64(&mmap);
    let bytes = Bytes::copy_from_slice(&mmap);

    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .map_err(|e| GeoLensError::ParseFailure(format!("{}: {e}", path.display())))?;

    let mut declared_geometry = None;
    let mut crs = None;
    let mut warnings = Vec::new();
    let kv = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == "geo"))
        .and_then(|kv| kv.value.clone());
    if let Some(raw) = kv {
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(geo) => {
                let (col, parsed_crs) = parse_geo_metadata(&geo);
                declared_geometry = col;
                crs = parsed_crs;
            }
            Err(e) => warnings.push(format!("unreadable `geo` metadata block: {e}")),
        }
    }

    let schema = builder.schema().clone();
    let reader = builder
        .with_batch_size(8192)
        .build()
        .map_err(|e| GeoLensError::ParseFailure(format!("{}: {e}", path.display())))?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GeoLensError::ParseFailure(format!("{}: {e}", path.display())))?;

    Ok(RawTable {
        schema,
        batches,
        declared_geometry,
        crs,
        geometry_capable: true,
        warnings,
        fingerprint,
    })
}

/// Extracts (primary geometry column, CRS label) from a parsed `geo` block.
/// The crs field may be a PROJJSON object, a plain authority string (our own
/// export writes this), or null/absent meaning CRS84.
fn parse_geo_metadata(geo: &serde_json::Value) -> (Option<String>, Option<String>) {
    let primary = geo
        .get("primary_column")
        .and_then(|v| v.as_str())
        .map(|s| s.to_owned());
    let Some(col) = primary.as_deref() else {
        return (None, None);
    };
    let crs = match geo.get("columns").and_then(|c| c.get(col)) {
        Some(col_meta) => match col_meta.get("crs") {
            None | Some(serde_json::Value::Null) => Some(DEFAULT_GEOPARQUET_CRS.to_owned()),
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(obj) => projjson_authority(obj),
        },
        None => None,
    };
    (primary, crs)
}

/// PROJJSON carries its identity under `id: {authority, code}`.
fn projjson_authority(crs: &serde_json::Value) -> Option<String> {
    let id = crs.get("id")?;
    let authority = id.get("authority")?.as_str()?;
    let code = match id.get("code")? {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(format!("{authority}:{code}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projjson_crs_becomes_authority_code() {
        let geo = json!({
            "version": "1.0.0",
            "primary_column": "geom",
            "columns": {"geom": {"encoding": "WKB", "crs": {"id": {"authority": "EPSG", "code": 28992}}}}
        });
        let (col, crs) = parse_geo_metadata(&geo);
        assert_eq!(col.as_deref(), Some("geom"));
        assert_eq!(crs.as_deref(), Some("EPSG:28992"));
    }

    #[test]
    fn null_crs_defaults_to_crs84() {
        let geo = json!({
            "primary_column": "geometry",
            "columns": {"geometry": {"encoding": "WKB", "crs": null}}
        });
        let (_, crs) = parse_geo_metadata(&geo);
        assert_eq!(crs.as_deref(), Some(DEFAULT_GEOPARQUET_CRS));
    }

    #[test]
    fn string_crs_passes_through() {
        let geo = json!({
            "primary_column": "geometry",
            "columns": {"geometry": {"encoding": "WKB", "crs": "EPSG:4326"}}
        });
        let (_, crs) = parse_geo_metadata(&geo);
        assert_eq!(crs.as_deref(), Some("EPSG:4326"));
    }
}
