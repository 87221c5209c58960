use std::sync::Arc;

use arrow::array::{Array, BinaryArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use geolens_common::Result;

use crate::geometry;

/// Canonical name of the bound geometry column, regardless of its
/// original name in the source file.
pub const GEOMETRY_COLUMN: &str = "geometry";

pub const CRS_UNDEFINED: &str = "undefined";

/// Where the geometry column sits after loading, and what it was called
/// in the source file.
#[derive(Debug, Clone)]
pub struct GeometryBinding {
    pub index: usize,
    pub source_name: String,
}

/// An immutable in-memory table with an optional WKB geometry column and
/// CRS tag. Created once by the loader; downstream operations never mutate
/// it in place.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
    pub geometry: Option<GeometryBinding>,
    pub crs: Option<String>,
    /// Non-fatal loader diagnostics (e.g. missing geometry binding).
    pub warnings: Vec<String>,
    /// xxh3 of the source bytes; cache key, not identity.
    pub fingerprint: u64,
}

impl Dataset {
    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn column_count(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name).ok()
    }

    pub fn column_type(&self, name: &str) -> Option<DataType> {
        self.column_index(name)
            .map(|i| self.schema.field(i).data_type().clone())
    }

    /// Approximate in-memory footprint from Arrow buffer sizes.
    pub fn memory_bytes(&self) -> usize {
        self.batches
            .iter()
            .flat_map(|b| b.columns().iter())
            .map(|c| c.get_array_memory_size())
            .sum()
    }

    pub fn crs_label(&self) -> String {
        self.crs.clone().unwrap_or_else(|| CRS_UNDEFINED.into())
    }

    /// The geometry column of one batch as WKB, if a binding exists.
    pub fn wkb_column<'a>(&self, batch: &'a RecordBatch) -> Option<&'a BinaryArray> {
        let binding = self.geometry.as_ref()?;
        batch
            .column(binding.index)
            .as_any()
            .downcast_ref::<BinaryArray>()
    }

    /// Rewrites the dataset with geometry rendered as WKT text, for
    /// consumers that cannot handle opaque binary (SQL engine, CSV export).
    /// Datasets without a geometry binding pass through unchanged.
    pub fn with_text_geometry(&self) -> Result<(SchemaRef, Vec<RecordBatch>)> {
        let Some(binding) = self.geometry.as_ref() else {
            return Ok((self.schema.clone(), self.batches.clone()));
        };
        let mut fields: Vec<Field> = self
            .schema
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields[binding.index] = Field::new(GEOMETRY_COLUMN, DataType::Utf8, true);
        let schema = Arc::new(Schema::new(fields));

        let mut out = Vec::with_capacity(self.batches.len());
        for batch in &self.batches {
            let mut builder = StringBuilder::new();
            if let Some(wkb) = self.wkb_column(batch) {
                for row in 0..wkb.len() {
                    if wkb.is_null(row) {
                        builder.append_null();
                    } else {
                        match geometry::wkb_to_wkt(wkb.value(row)) {
                            Ok(wkt) => builder.append_value(wkt),
                            Err(_) => builder.append_null(), // undecodable cell: surface as null text
                        }
                    }
                }
            } else {
                for _ in 0..batch.num_rows() {
                    builder.append_null();
                }
            }
            let mut columns = batch.columns().to_vec();
            columns[binding.index] = Arc::new(builder.finish());
            out.push(RecordBatch::try_new(schema.clone(), columns)?);
        }
        Ok((schema, out))
    }
}
