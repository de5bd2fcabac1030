//! Multi-source fetch orchestration.
//!
//! Dimensions are fetched concurrently and fail fast: a dimension-scoped
//! query error aborts the whole fetch. Inside a dimension, sources are
//! visited one after another and a source-scoped error only drops that
//! source's rows for that dimension.

use std::sync::Arc;

use insights_core::{
    DateRange, Dimension, ErrorScope, Granularity, InsightsError, InsightsResult, MetricRow,
    QueryError, SourceDescriptor,
};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::executor::MetricQueryExecutor;
use crate::retry::RetryPolicy;

/// A source left out of one dimension because its query failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSource {
    pub dimension: Dimension,
    pub source: String,
    pub reason: String,
}

/// Rows fetched for one dimension across all sources.
#[derive(Debug, Clone, Default)]
pub struct DimensionRows {
    pub rows: Vec<MetricRow>,
    pub skipped: Vec<SkippedSource>,
}

/// Everything fetched in one run, one row set per dimension.
#[derive(Debug, Clone, Default)]
pub struct FetchedMetrics {
    pub basic_cvr: Vec<MetricRow>,
    pub cvr_no_ads: Vec<MetricRow>,
    pub booking_funnel: Vec<MetricRow>,
    pub traffic_sources: Vec<MetricRow>,
    pub user_demographics: Vec<MetricRow>,
    /// Sources skipped per dimension, in dimension order.
    pub skipped: Vec<SkippedSource>,
}

impl FetchedMetrics {
    pub fn rows(&self, dimension: Dimension) -> &[MetricRow] {
        match dimension {
            Dimension::BasicCvr => &self.basic_cvr,
            Dimension::CvrExcludingAds => &self.cvr_no_ads,
            Dimension::BookingFunnel => &self.booking_funnel,
            Dimension::TrafficSources => &self.traffic_sources,
            Dimension::UserDemographics => &self.user_demographics,
        }
    }

    pub fn total_rows(&self) -> usize {
        Dimension::ALL.iter().map(|d| self.rows(*d).len()).sum()
    }
}

pub struct Orchestrator {
    executor: Arc<dyn MetricQueryExecutor>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn MetricQueryExecutor>, retry: RetryPolicy) -> Self {
        Self { executor, retry }
    }

    /// Fetch every dimension for every enabled source.
    pub async fn fetch_all(
        &self,
        sources: &[SourceDescriptor],
        range: &DateRange,
        granularity: Granularity,
    ) -> InsightsResult<FetchedMetrics> {
        info!(
            sources = sources.len(),
            range = %range,
            granularity = %granularity,
            "Fetching metrics for all dimensions"
        );

        let (basic, no_ads, funnel, traffic, demographics) = tokio::try_join!(
            self.fetch_dimension(Dimension::BasicCvr, sources, range, granularity),
            self.fetch_dimension(Dimension::CvrExcludingAds, sources, range, granularity),
            self.fetch_dimension(Dimension::BookingFunnel, sources, range, granularity),
            self.fetch_dimension(Dimension::TrafficSources, sources, range, granularity),
            self.fetch_dimension(Dimension::UserDemographics, sources, range, granularity),
        )?;

        let skipped = [&basic, &no_ads, &funnel, &traffic, &demographics]
            .into_iter()
            .flat_map(|d| d.skipped.iter().cloned())
            .collect();

        let fetched = FetchedMetrics {
            basic_cvr: basic.rows,
            cvr_no_ads: no_ads.rows,
            booking_funnel: funnel.rows,
            traffic_sources: traffic.rows,
            user_demographics: demographics.rows,
            skipped,
        };
        info!(
            rows = fetched.total_rows(),
            skipped = fetched.skipped.len(),
            "Metric fetch complete"
        );
        Ok(fetched)
    }

    /// Fetch one dimension, visiting sources in order. Source-scoped
    /// failures are logged and recorded; dimension-scoped ones abort.
    pub async fn fetch_dimension(
        &self,
        dimension: Dimension,
        sources: &[SourceDescriptor],
        range: &DateRange,
        granularity: Granularity,
    ) -> InsightsResult<DimensionRows> {
        let mut out = DimensionRows::default();

        for source in sources {
            if !source.enabled {
                debug!(source = %source.name, %dimension, "Skipping disabled source");
                continue;
            }
            debug!(source = %source.name, %dimension, "Processing source");

            match self.fetch_source(dimension, source, range, granularity).await {
                Ok(rows) => {
                    metrics::counter!("insights.rows_fetched").increment(rows.len() as u64);
                    out.rows.extend(rows);
                }
                Err(e) if e.scope() == ErrorScope::Dimension => {
                    error!(source = %source.name, %dimension, error = %e, "Dimension query failed");
                    return Err(InsightsError::Query {
                        dimension,
                        source_name: Some(source.name.clone()),
                        error: e,
                    });
                }
                Err(e) => {
                    metrics::counter!("insights.source_failures").increment(1);
                    error!(
                        source = %source.name,
                        %dimension,
                        error = %e,
                        "Source query failed, continuing with remaining sources"
                    );
                    out.skipped.push(SkippedSource {
                        dimension,
                        source: source.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(out)
    }

    async fn fetch_source(
        &self,
        dimension: Dimension,
        source: &SourceDescriptor,
        range: &DateRange,
        granularity: Granularity,
    ) -> Result<Vec<MetricRow>, QueryError> {
        let raw = self
            .retry
            .run(|| self.executor.execute(dimension, source, range, granularity))
            .await?;

        raw.into_iter()
            .map(|row| {
                if granularity.is_valid_period(&row.period) {
                    Ok(row.tagged(source))
                } else {
                    Err(QueryError::Decode(format!(
                        "period '{}' is not a {granularity} label",
                        row.period
                    )))
                }
            })
            .collect()
    }
}
