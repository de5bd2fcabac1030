pub mod config;
pub mod dates;
pub mod error;
pub mod sources;
pub mod types;

pub use config::RunConfig;
pub use dates::{DateRangeResolver, ReportWindow};
pub use error::{ErrorScope, InsightsError, InsightsResult, QueryError};
pub use sources::SourceRegistry;
pub use types::{
    fields, ChangeRate, DateRange, Dimension, FieldMap, Granularity, MetricRow, RawMetricRow,
    SourceDescriptor,
};
