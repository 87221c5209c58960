use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{BinaryBuilder, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo_types::{polygon, Geometry, MultiPolygon, Point};
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use serde_json::json;

use geolens_core::geometry::encode_wkb;
use geolens_core::gpkg::wrap_gpkg_header;
use geolens_core::{compute_qa, load_dataset, write_csv, write_geoparquet};

fn point_wkb(x: f64, y: f64) -> Vec<u8> {
    encode_wkb(&Geometry::from(Point::new(x, y))).unwrap()
}

fn bowtie_wkb() -> Vec<u8> {
    let geom: Geometry<f64> = polygon![
        (x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0)
    ]
    .into();
    encode_wkb(&geom).unwrap()
}

fn empty_wkb() -> Vec<u8> {
    encode_wkb(&Geometry::from(MultiPolygon::<f64>(vec![]))).unwrap()
}

/// Five rows: two valid points, one invalid polygon, one empty
/// multipolygon, one null geometry.
fn write_geoparquet_fixture(path: &Path) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, true),
        Field::new("geom", DataType::Binary, true),
    ]));
    let mut geoms = BinaryBuilder::new();
    geoms.append_value(point_wkb(4.9, 52.37));
    geoms.append_value(point_wkb(5.1, 52.09));
    geoms.append_value(bowtie_wkb());
    geoms.append_value(empty_wkb());
    geoms.append_null();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])),
            Arc::new(geoms.finish()),
        ],
    )
    .unwrap();

    let geo = json!({
        "version": "1.0.0",
        "primary_column": "geom",
        "columns": {
            "geom": {
                "encoding": "WKB",
                "crs": {"id": {"authority": "EPSG", "code": 4326}}
            }
        }
    })
    .to_string();
    let props = WriterProperties::builder()
        .set_key_value_metadata(Some(vec![KeyValue::new("geo".to_owned(), geo)]))
        .build();
    let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, Some(props)).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

#[test]
fn geoparquet_loads_with_binding_and_crs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("places.parquet");
    write_geoparquet_fixture(&path);

    let dataset = load_dataset(&path).unwrap();
    assert_eq!(dataset.name, "places");
    assert_eq!(dataset.row_count(), 5);
    assert_eq!(dataset.crs.as_deref(), Some("EPSG:4326"));

    let binding = dataset.geometry.as_ref().unwrap();
    assert_eq!(binding.source_name, "geom");
    assert_eq!(dataset.schema.field(binding.index).name(), "geometry");
    assert_eq!(
        dataset.schema.field(binding.index).data_type(),
        &DataType::Binary
    );
}

#[test]
fn geometry_buckets_partition_the_non_null_cells() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("places.parquet");
    write_geoparquet_fixture(&path);
    let dataset = load_dataset(&path).unwrap();

    let bundle = compute_qa(&dataset).unwrap();
    let health = bundle.geometry.as_ref().unwrap();
    assert_eq!(health.valid_count, 2);
    assert_eq!(health.invalid_count, 1);
    assert_eq!(health.empty_count, 1);
    assert_eq!(
        health.valid_count + health.invalid_count + health.empty_count,
        4 // one of the five cells is null
    );

    let bb = health.bounding_box.as_ref().unwrap();
    assert_eq!(bb.min_x, 4.9);
    assert_eq!(bb.max_y, 52.37);

    // one null in the geometry column shows up in the missing table
    assert_eq!(bundle.missing_by_column[0].name, "geometry");
    assert_eq!(bundle.missing_by_column[0].null_count, 1);
}

#[test]
fn all_invalid_geometries_leave_no_bounding_box() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.parquet");

    let schema = Arc::new(Schema::new(vec![Field::new(
        "geometry",
        DataType::Binary,
        true,
    )]));
    let mut geoms = BinaryBuilder::new();
    geoms.append_value(bowtie_wkb());
    geoms.append_value(empty_wkb());
    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(geoms.finish())]).unwrap();
    let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let dataset = load_dataset(&path).unwrap();
    let health = compute_qa(&dataset).unwrap().geometry.unwrap();
    assert_eq!(health.valid_count, 0);
    assert!(health.bounding_box.is_none());
}

fn write_gpkg_fixture(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gpkg_contents (table_name TEXT, data_type TEXT, srs_id INTEGER);
         CREATE TABLE gpkg_geometry_columns (table_name TEXT, column_name TEXT);
         CREATE TABLE gpkg_spatial_ref_sys (srs_id INTEGER, organization TEXT, organization_coordsys_id INTEGER);
         CREATE TABLE parcels (fid INTEGER, owner TEXT, area REAL, geom BLOB);
         INSERT INTO gpkg_contents VALUES ('parcels', 'features', 4326);
         INSERT INTO gpkg_geometry_columns VALUES ('parcels', 'geom');
         INSERT INTO gpkg_spatial_ref_sys VALUES (4326, 'epsg', 4326);",
    )
    .unwrap();
    let mut stmt = conn
        .prepare("INSERT INTO parcels VALUES (?1, ?2, ?3, ?4)")
        .unwrap();
    stmt.execute(rusqlite::params![
        1,
        "alice",
        120.5,
        wrap_gpkg_header(&point_wkb(1.0, 2.0), 4326)
    ])
    .unwrap();
    stmt.execute(rusqlite::params![
        2,
        "bob",
        80.0,
        wrap_gpkg_header(&point_wkb(3.0, 4.0), 4326)
    ])
    .unwrap();
    stmt.execute(rusqlite::params![3, None::<String>, 99.9, None::<Vec<u8>>])
        .unwrap();
}

#[test]
fn gpkg_loads_first_feature_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("city.gpkg");
    write_gpkg_fixture(&path);

    let dataset = load_dataset(&path).unwrap();
    assert_eq!(dataset.name, "city");
    assert_eq!(dataset.row_count(), 3);
    assert_eq!(dataset.crs.as_deref(), Some("EPSG:4326"));
    assert_eq!(dataset.column_type("fid"), Some(DataType::Int64));
    assert_eq!(dataset.column_type("area"), Some(DataType::Float64));
    assert_eq!(dataset.column_type("owner"), Some(DataType::Utf8));

    let binding = dataset.geometry.as_ref().unwrap();
    assert_eq!(binding.source_name, "geom");

    let health = compute_qa(&dataset).unwrap().geometry.unwrap();
    assert_eq!(health.valid_count, 2);
    let bb = health.bounding_box.unwrap();
    assert_eq!(bb.max_x, 3.0);
}

#[test]
fn csv_export_reloads_with_wkt_geometry_text() {
    let dir = tempfile::tempdir().unwrap();
    let parquet_path = dir.path().join("places.parquet");
    write_geoparquet_fixture(&parquet_path);
    let dataset = load_dataset(&parquet_path).unwrap();

    let csv_path = dir.path().join("places.csv");
    write_csv(&dataset, &csv_path).unwrap();
    let reloaded = load_dataset(&csv_path).unwrap();

    assert_eq!(reloaded.row_count(), dataset.row_count());
    assert_eq!(reloaded.column_count(), dataset.column_count());
    // attribute-only format: geometry comes back as plain WKT text
    assert!(reloaded.geometry.is_none());
    assert_eq!(reloaded.column_type("geometry"), Some(DataType::Utf8));

    let batch = &reloaded.batches[0];
    let idx = reloaded.column_index("geometry").unwrap();
    let col = batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert!(col.value(0).starts_with("POINT"));

    // non-geometry values survive the round trip
    let ids = batch
        .column(reloaded.column_index("id").unwrap())
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let got: Vec<i64> = ids.iter().flatten().collect();
    assert_eq!(got, vec![1, 2, 3, 4, 5]);
}

#[test]
fn geoparquet_export_round_trips_crs_and_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("places.parquet");
    write_geoparquet_fixture(&source);
    let dataset = load_dataset(&source).unwrap();

    let out = dir.path().join("exported.geoparquet");
    write_geoparquet(&dataset, &out).unwrap();
    let reloaded = load_dataset(&out).unwrap();

    assert_eq!(reloaded.row_count(), dataset.row_count());
    assert_eq!(reloaded.crs, dataset.crs);
    let binding = reloaded.geometry.as_ref().unwrap();
    assert_eq!(binding.source_name, "geometry");

    let health = compute_qa(&reloaded).unwrap().geometry.unwrap();
    assert_eq!(health.valid_count, 2);
    assert_eq!(health.invalid_count, 1);
    assert_eq!(health.empty_count, 1);
}

#[test]
fn csv_with_inferred_types_loads_attribute_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.csv");
    std::fs::write(&path, "id,score,label\n1,0.5,a\n2,,b\n3,1.25,\n").unwrap();

    let dataset = load_dataset(&path).unwrap();
    assert_eq!(dataset.row_count(), 3);
    assert!(dataset.geometry.is_none());
    assert_eq!(dataset.column_type("id"), Some(DataType::Int64));
    assert_eq!(dataset.column_type("score"), Some(DataType::Float64));
    assert_eq!(dataset.column_type("label"), Some(DataType::Utf8));

    let bundle = compute_qa(&dataset).unwrap();
    assert_eq!(bundle.missing_by_column.len(), 2);
}

#[test]
fn corrupt_leading_cell_does_not_drop_the_binding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scrambled.parquet");

    let schema = Arc::new(Schema::new(vec![Field::new(
        "geometry",
        DataType::Binary,
        true,
    )]));
    let mut geoms = BinaryBuilder::new();
    geoms.append_value([0xde, 0xad, 0xbe, 0xef]); // not WKB
    geoms.append_value(point_wkb(1.0, 1.0));
    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(geoms.finish())]).unwrap();
    let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let dataset = load_dataset(&path).unwrap();
    assert!(dataset.geometry.is_some());
    let health = compute_qa(&dataset).unwrap().geometry.unwrap();
    assert_eq!(health.valid_count, 1);
    assert_eq!(health.invalid_count, 1);
}

#[test]
fn fully_undecodable_column_loads_attribute_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.parquet");

    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, true),
        Field::new("geometry", DataType::Binary, true),
    ]));
    let mut geoms = BinaryBuilder::new();
    geoms.append_value([1u8, 2, 3]);
    geoms.append_value([4u8, 5, 6]);
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(vec![1, 2])),
            Arc::new(geoms.finish()),
        ],
    )
    .unwrap();
    let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let dataset = load_dataset(&path).unwrap();
    assert!(dataset.geometry.is_none());
    assert!(dataset
        .warnings
        .iter()
        .any(|w| w.contains("continuing without geometry")));
}

#[test]
fn wkt_text_column_binds_as_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wkt.parquet");

    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, true),
        Field::new("the_geom", DataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])),
            Arc::new(StringArray::from(vec![
                Some("POINT(1 2)"),
                Some("not a geometry"),
                None,
            ])),
        ],
    )
    .unwrap();
    let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let dataset = load_dataset(&path).unwrap();
    let binding = dataset.geometry.as_ref().unwrap();
    assert_eq!(binding.source_name, "the_geom");
    // the unparseable cell was nulled and reported
    assert!(dataset.warnings.iter().any(|w| w.contains("1 value(s)")));
    let health = compute_qa(&dataset).unwrap().geometry.unwrap();
    assert_eq!(health.valid_count, 1);
}
