//! The warehouse-facing seam: one metric query for one source.

use async_trait::async_trait;
use insights_core::{DateRange, Dimension, Granularity, QueryError, RawMetricRow, SourceDescriptor};

/// Runs the query for one metric dimension against one source.
///
/// Implementations report transport and credential problems as
/// [`QueryError::Transport`] / [`QueryError::Unauthorized`]; those abort the
/// whole dimension. Anything specific to the source (missing tables, bad
/// data) should be reported with a source-scoped variant so the
/// orchestrator can skip it and carry on.
#[async_trait]
pub trait MetricQueryExecutor: Send + Sync {
    async fn execute(
        &self,
        dimension: Dimension,
        source: &SourceDescriptor,
        range: &DateRange,
        granularity: Granularity,
    ) -> Result<Vec<RawMetricRow>, QueryError>;
}
