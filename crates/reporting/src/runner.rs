//! End-to-end reporting run: resolve the window, fetch every dimension,
//! derive change rates and summaries, then write all report tables.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use insights_analytics::{Orchestrator, SkippedSource};
use insights_core::config::ReportConfig;
use insights_core::dates::validate_range;
use insights_core::{
    fields, DateRange, DateRangeResolver, Granularity, InsightsError, InsightsResult,
    ReportWindow, SourceRegistry,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::change_rate::compute_change_rates;
use crate::formatter::{
    format_cvr, format_demographics, format_funnel, format_property_list, format_summary,
    format_traffic, Table,
};
use crate::merger::{merge, RowSet};
use crate::sink::ReportSink;
use crate::summary::{attach_funnel_completion, summarize, SummarySnapshot};

const BASIC_CVR_FIELDS: [(&str, &str); 5] = [
    (fields::ACTIVE_USERS, fields::ACTIVE_USERS),
    (fields::PURCHASE_USERS, fields::PURCHASE_USERS),
    (fields::CVR, fields::CVR),
    (fields::CHANGE_RATE, fields::CVR_CHANGE_RATE),
    (fields::CHANGE_RATE_PERCENTAGE, fields::CVR_CHANGE_RATE_PERCENTAGE),
];

const NO_ADS_CVR_FIELDS: [(&str, &str); 5] = [
    (fields::ACTIVE_USERS_NO_ADS, fields::ACTIVE_USERS_NO_ADS),
    (fields::PURCHASE_USERS_NO_ADS, fields::PURCHASE_USERS_NO_ADS),
    (fields::CVR_NO_ADS, fields::CVR_NO_ADS),
    (fields::CHANGE_RATE, fields::CVR_NO_ADS_CHANGE_RATE),
    (fields::CHANGE_RATE_PERCENTAGE, fields::CVR_NO_ADS_CHANGE_RATE_PERCENTAGE),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunRequest {
    pub granularity: Granularity,
    pub window: ReportWindow,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableWritten {
    pub table: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub granularity: Granularity,
    pub range: DateRange,
    pub sources: usize,
    pub tables: Vec<TableWritten>,
    pub skipped: Vec<SkippedSource>,
    pub summary: Vec<SummarySnapshot>,
}

pub struct ReportRunner {
    orchestrator: Orchestrator,
    sink: Arc<dyn ReportSink>,
    registry: SourceRegistry,
    resolver: DateRangeResolver,
    max_range_days: i64,
}

impl ReportRunner {
    pub fn new(
        orchestrator: Orchestrator,
        sink: Arc<dyn ReportSink>,
        registry: SourceRegistry,
        report: &ReportConfig,
    ) -> Self {
        Self {
            orchestrator,
            sink,
            registry,
            resolver: DateRangeResolver::today(),
            max_range_days: report.max_range_days,
        }
    }

    /// Resolve windows relative to a fixed date instead of today.
    pub fn with_resolver(mut self, resolver: DateRangeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub async fn run(&self, request: RunRequest) -> InsightsResult<RunOutcome> {
        let started_at = Utc::now();
        let range = self.resolver.resolve(request.granularity, request.window)?;
        validate_range(&range, self.max_range_days)?;

        let sources = self.registry.enabled_sources();
        if sources.is_empty() {
            return Err(InsightsError::Config("no enabled sources".into()));
        }
        info!(
            granularity = %request.granularity,
            range = %range,
            sources = sources.len(),
            "Starting report run"
        );

        let fetched = self
            .orchestrator
            .fetch_all(&sources, &range, request.granularity)
            .await?;
        for skipped in &fetched.skipped {
            warn!(
                dimension = %skipped.dimension,
                source = %skipped.source,
                reason = %skipped.reason,
                "Source omitted from report"
            );
        }

        let basic = compute_change_rates(&fetched.basic_cvr, fields::CVR);
        let no_ads = compute_change_rates(&fetched.cvr_no_ads, fields::CVR_NO_ADS);
        let merged = merge(&[
            RowSet::projected(&basic, &BASIC_CVR_FIELDS),
            RowSet::projected(&no_ads, &NO_ADS_CVR_FIELDS),
        ]);

        let mut summary = summarize(&fetched.basic_cvr);
        attach_funnel_completion(&mut summary, &fetched.booking_funnel);

        let report = [
            format_cvr(&merged),
            format_funnel(&fetched.booking_funnel),
            format_traffic(&fetched.traffic_sources),
            format_demographics(&fetched.user_demographics),
            format_property_list(self.registry.all()),
            format_summary(&summary),
        ];

        let mut tables = Vec::with_capacity(report.len());
        for table in &report {
            self.write_table(table).await?;
            tables.push(TableWritten {
                table: table.name.clone(),
                rows: table.rows.len(),
            });
        }

        let finished_at = Utc::now();
        info!(
            tables = tables.len(),
            skipped = fetched.skipped.len(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Report run complete"
        );

        Ok(RunOutcome {
            started_at,
            finished_at,
            granularity: request.granularity,
            range,
            sources: sources.len(),
            tables,
            skipped: fetched.skipped,
            summary,
        })
    }

    async fn write_table(&self, table: &Table) -> InsightsResult<()> {
        self.sink.ensure_exists(&table.name).await?;
        self.sink.clear(&table.name).await?;
        self.sink
            .write(&table.name, &table.headers, &table.rows)
            .await?;
        metrics::counter!("insights.tables_written").increment(1);
        info!(table = %table.name, rows = table.rows.len(), "Report table written");
        Ok(())
    }
}
