use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use datafusion::datasource::MemTable;
use datafusion::error::DataFusionError;
use datafusion::prelude::SessionContext;
use geolens_common::{GeoLensError, Result};
use tracing::debug;

use crate::dataset::Dataset;

/// Embedded SQL over registered datasets. Queries run against in-memory
/// snapshots; re-registering a name replaces the previous snapshot.
pub struct QueryGateway {
    ctx: SessionContext,
}

/// Result of one query, detached from the gateway.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl QueryOutput {
    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

impl Default for QueryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryGateway {
    pub fn new() -> Self {
        Self {
            ctx: SessionContext::new(),
        }
    }

    /// Registers a dataset under a table name. Geometry is exposed as WKT
    /// text so it stays selectable and printable inside SQL.
    pub fn register(&self, name: &str, dataset: &Dataset) -> Result<()> {
        let (schema, batches) = dataset.with_text_geometry()?;
        let table = MemTable::try_new(schema, vec![batches]).map_err(classify)?;
        // the in-memory schema provider rejects duplicate names
        self.ctx.deregister_table(name).map_err(classify)?;
        self.ctx
            .register_table(name, Arc::new(table))
            .map_err(classify)?;
        debug!(table = name, rows = dataset.row_count(), "table registered");
        Ok(())
    }

    pub async fn run(&self, sql: &str) -> Result<QueryOutput> {
        let frame = self.ctx.sql(sql).await.map_err(classify)?;
        let schema: SchemaRef = Arc::new(frame.schema().as_arrow().clone());
        let batches = frame.collect().await.map_err(classify)?;
        Ok(QueryOutput { schema, batches })
    }
}

/// Parse errors and execution errors surface differently to the caller;
/// everything the tokenizer/parser rejects is a syntax problem.
fn classify(err: DataFusionError) -> GeoLensError {
    match err {
        DataFusionError::SQL(..) => GeoLensError::QuerySyntax(err.to_string()),
        other => GeoLensError::QueryExecution(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    fn hundred_rows() -> Dataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("category", DataType::Utf8, true),
        ]));
        let ids: Vec<i64> = (0..100).collect();
        let cats: Vec<&str> = (0..100).map(|i| if i % 2 == 0 { "a" } else { "b" }).collect();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(cats)),
            ],
        )
        .unwrap();
        Dataset {
            name: "data1".into(),
            schema,
            batches: vec![batch],
            geometry: None,
            crs: None,
            warnings: Vec::new(),
            fingerprint: 1,
        }
    }

    #[tokio::test]
    async fn count_star_sees_every_row() {
        let gateway = QueryGateway::new();
        gateway.register("data1", &hundred_rows()).unwrap();
        let out = gateway.run("SELECT COUNT(*) AS n FROM data1").await.unwrap();
        assert_eq!(out.row_count(), 1);
        let n = out.batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .value(0);
        assert_eq!(n, 100);
    }

    #[tokio::test]
    async fn group_by_works_over_registered_table() {
        let gateway = QueryGateway::new();
        gateway.register("data1", &hundred_rows()).unwrap();
        let out = gateway
            .run("SELECT category, COUNT(*) FROM data1 GROUP BY category ORDER BY category")
            .await
            .unwrap();
        assert_eq!(out.row_count(), 2);
    }

    #[tokio::test]
    async fn malformed_sql_is_a_syntax_error() {
        let gateway = QueryGateway::new();
        gateway.register("data1", &hundred_rows()).unwrap();
        let err = gateway.run("SELEC id FROM data1").await.unwrap_err();
        assert!(matches!(err, GeoLensError::QuerySyntax(_)));
    }

    #[tokio::test]
    async fn unknown_table_is_an_execution_error() {
        let gateway = QueryGateway::new();
        let err = gateway.run("SELECT * FROM nowhere").await.unwrap_err();
        assert!(matches!(err, GeoLensError::QueryExecution(_)));
    }

    #[tokio::test]
    async fn reregistering_replaces_the_snapshot() {
        let gateway = QueryGateway::new();
        let dataset = hundred_rows();
        gateway.register("data1", &dataset).unwrap();
        let mut trimmed = dataset.clone();
        trimmed.batches = vec![dataset.batches[0].slice(0, 10)];
        gateway.register("data1", &trimmed).unwrap();
        let out = gateway.run("SELECT COUNT(*) FROM data1").await.unwrap();
        let n = out.batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .value(0);
        assert_eq!(n, 10);
    }
}
