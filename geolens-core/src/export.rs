use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use geolens_common::Result;
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use serde_json::json;
use tracing::{info, warn};

use crate::compare::ComparisonReport;
use crate::dataset::{Dataset, GEOMETRY_COLUMN};
use crate::qa::QaBundle;
use crate::query::QueryOutput;
use crate::value;

/// Writes a dataset as CSV with geometry rendered as WKT text. Nulls become
/// empty cells.
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    let (schema, batches) = dataset.with_text_geometry()?;
    write_csv_batches(&schema, &batches, path)?;
    info!(path = %path.display(), rows = dataset.row_count(), "csv written");
    Ok(())
}

/// Writes a query result as CSV.
pub fn write_query_csv(output: &QueryOutput, path: &Path) -> Result<()> {
    write_csv_batches(&output.schema, &output.batches, path)?;
    info!(path = %path.display(), rows = output.row_count(), "query csv written");
    Ok(())
}

fn write_csv_batches(schema: &SchemaRef, batches: &[RecordBatch], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let header: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    writer.write_record(&header)?;
    for batch in batches {
        for row in 0..batch.num_rows() {
            let record: Vec<String> = batch
                .columns()
                .iter()
                .map(|c| value::cell_to_string(c.as_ref(), row).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Writes a dataset as GeoParquet: WKB geometry column plus regenerated
/// `geo` file metadata. Without a geometry binding this degrades to plain
/// Parquet with a warning.
pub fn write_geoparquet(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut props = WriterProperties::builder();
    if dataset.geometry.is_some() {
        props = props.set_key_value_metadata(Some(vec![KeyValue::new(
            "geo".to_owned(),
            geo_file_metadata(dataset),
        )]));
    } else {
        warn!(
            path = %path.display(),
            "no geometry binding; writing plain Parquet without geo metadata"
        );
    }

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, dataset.schema.clone(), Some(props.build()))?;
    for batch in &dataset.batches {
        writer.write(batch)?;
    }
    writer.close()?;
    info!(path = %path.display(), rows = dataset.row_count(), "geoparquet written");
    Ok(())
}

// The CRS is written as the plain "AUTHORITY:CODE" string; readers that
// insist on PROJJSON fall back to their own default.
fn geo_file_metadata(dataset: &Dataset) -> String {
    let mut column = json!({ "encoding": "WKB", "geometry_types": [] });
    if let Some(crs) = &dataset.crs {
        column["crs"] = json!(crs);
    }
    json!({
        "version": "1.0.0",
        "primary_column": GEOMETRY_COLUMN,
        "columns": { GEOMETRY_COLUMN: column },
    })
    .to_string()
}

/// Renders a self-contained Markdown snapshot of one QA bundle, with the
/// comparison section appended when a second dataset is held.
pub fn render_report(
    name: &str,
    bundle: &QaBundle,
    comparison: Option<&ComparisonReport>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# QA snapshot: {name}\n");
    write_bundle(&mut out, bundle);

    if let Some(report) = comparison {
        let _ = writeln!(
            out,
            "\n## Comparison: {} vs {}\n",
            report.left_name, report.right_name
        );
        let _ = writeln!(
            out,
            "- columns only in `{}`: {}",
            report.left_name,
            name_list(&report.schema.only_in_left)
        );
        let _ = writeln!(
            out,
            "- columns only in `{}`: {}",
            report.right_name,
            name_list(&report.schema.only_in_right)
        );
        let _ = writeln!(out, "- common columns: {}", report.schema.common.len());
        let _ = writeln!(out, "\n### Right side: {}\n", report.right_name);
        write_bundle(&mut out, &report.right);
    }
    out
}

fn write_bundle(out: &mut String, bundle: &QaBundle) {
    let _ = writeln!(out, "- rows: {}", bundle.row_count);
    let _ = writeln!(out, "- columns: {}", bundle.column_count);
    let _ = writeln!(out, "- crs: {}", bundle.crs);
    let _ = writeln!(out, "- memory: {} bytes", bundle.memory_bytes);

    if bundle.missing_by_column.is_empty() {
        let _ = writeln!(out, "\nNo missing values.");
    } else {
        let _ = writeln!(out, "\n| column | nulls | % |");
        let _ = writeln!(out, "|---|---|---|");
        for m in &bundle.missing_by_column {
            let _ = writeln!(out, "| {} | {} | {:.1} |", m.name, m.null_count, m.percentage);
        }
    }

    if !bundle.constant_columns.is_empty() {
        let _ = writeln!(
            out,
            "\nConstant columns: {}",
            name_list(&bundle.constant_columns)
        );
    }

    if let Some(geometry) = &bundle.geometry {
        let _ = writeln!(out, "\n### Geometry\n");
        let _ = writeln!(out, "- valid: {}", geometry.valid_count);
        let _ = writeln!(out, "- invalid: {}", geometry.invalid_count);
        let _ = writeln!(out, "- empty: {}", geometry.empty_count);
        for tc in &geometry.type_histogram {
            let _ = writeln!(out, "- {}: {}", tc.geometry_type, tc.count);
        }
        if let Some(bb) = &geometry.bounding_box {
            let _ = writeln!(
                out,
                "- bounds: [{}, {}, {}, {}]",
                bb.min_x, bb.min_y, bb.max_x, bb.max_y
            );
        }
    }

    for u in &bundle.unavailable {
        let _ = writeln!(out, "\n> {} unavailable: {}", u.stat, u.reason);
    }
}

fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_owned()
    } else {
        names.join(", ")
    }
}
