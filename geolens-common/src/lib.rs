pub mod config;
pub use config::Config;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoLensError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("GeoPackage error: {0}")]
    GeoPackage(#[from] rusqlite::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unsupported format: {0} (expected .gpkg, .parquet/.geoparquet or .csv)")]
    UnsupportedFormat(String),
    #[error("could not parse file: {0}")]
    ParseFailure(String),
    #[error("geometry error: {0}")]
    Geometry(String),
    #[error("column `{0}` does not exist in both datasets")]
    ColumnMissing(String),
    #[error("column `{column}` has incompatible types: {left} vs {right}")]
    TypeMismatch {
        column: String,
        left: String,
        right: String,
    },
    #[error("no values to compute on: {0}")]
    EmptyInput(String),
    #[error("SQL syntax error: {0}")]
    QuerySyntax(String),
    #[error("SQL execution error: {0}")]
    QueryExecution(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, GeoLensError>;
