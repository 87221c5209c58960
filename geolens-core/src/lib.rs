pub mod compare;
pub mod dataset;
pub mod distribution;
pub mod export;
pub mod geometry;
pub mod geoparquet;
pub mod gpkg;
pub mod loader;
pub mod qa;
pub mod query;
pub mod sample;
pub mod session;
pub mod value;

pub use compare::{compare_datasets, diff_schemas, distribution_pair, ComparisonReport, DistributionPair, SchemaPartition};
pub use dataset::{Dataset, GeometryBinding};
pub use distribution::{FrequencyEntry, HistogramBin};
pub use export::{render_report, write_csv, write_geoparquet, write_query_csv};
pub use geolens_common::{Config, GeoLensError, Result};
pub use geometry::BoundingBox;
pub use loader::load_dataset;
pub use qa::{compute_qa, GeometryHealth, QaBundle};
pub use query::{QueryGateway, QueryOutput};
pub use sample::sample_rows;
pub use session::{SessionSlot, SessionState};
