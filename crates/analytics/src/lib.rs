//! Metric fetching: warehouse queries per dimension, retry, and the
//! multi-source orchestrator that fans out across dimensions.

pub mod executor;
pub mod orchestrator;
pub mod queries;
pub mod retry;
pub mod warehouse;

pub use executor::MetricQueryExecutor;
pub use orchestrator::{DimensionRows, FetchedMetrics, Orchestrator, SkippedSource};
pub use retry::RetryPolicy;
pub use warehouse::ClickHouseExecutor;
