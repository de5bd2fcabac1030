//! ClickHouse-backed metric query executor.
//!
//! Each dimension has a typed row struct matching the column types its
//! query returns; rows are flattened into `RawMetricRow` field maps before
//! leaving this module.

use async_trait::async_trait;
use clickhouse::Row;
use insights_core::config::WarehouseConfig;
use insights_core::{DateRange, Dimension, Granularity, QueryError, RawMetricRow, SourceDescriptor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::executor::MetricQueryExecutor;
use crate::queries;

// ─── Row types ──────────────────────────────────────────────────────────────

#[derive(Debug, Row, Serialize, Deserialize)]
struct BasicCvrRow {
    period: String,
    active_users: u64,
    purchase_users: u64,
    cvr: Option<f64>,
}

#[derive(Debug, Row, Serialize, Deserialize)]
struct CvrNoAdsRow {
    period: String,
    active_users_no_ads: u64,
    purchase_users_no_ads: u64,
    cvr_no_ads: Option<f64>,
}

#[derive(Debug, Row, Serialize, Deserialize)]
struct FunnelRow {
    period: String,
    first_visit_users: u64,
    plan_selection_users: u64,
    booking_input_users: u64,
    personal_info_users: u64,
    completion_users: u64,
    hp_to_plan_rate: Option<f64>,
    plan_to_booking_rate: Option<f64>,
    booking_to_personal_rate: Option<f64>,
    personal_to_completion_rate: Option<f64>,
    overall_conversion_rate: Option<f64>,
}

#[derive(Debug, Row, Serialize, Deserialize)]
struct TrafficRow {
    period: String,
    source_medium: String,
    total_users: u64,
    purchase_users: u64,
    cvr_by_source: Option<f64>,
    user_percentage: f64,
}

#[derive(Debug, Row, Serialize, Deserialize)]
struct DemographicRow {
    period: String,
    demographic_type: String,
    demographic_value: String,
    total_users: u64,
    purchase_users: u64,
    cvr: Option<f64>,
    percentage: f64,
}

#[derive(Debug, Row, Deserialize)]
struct PingRow {
    #[allow(dead_code)]
    ok: u8,
}

// ─── Executor ───────────────────────────────────────────────────────────────

/// Runs dimension queries against a ClickHouse server over HTTP.
pub struct ClickHouseExecutor {
    client: clickhouse::Client,
}

impl ClickHouseExecutor {
    pub fn new(config: &WarehouseConfig) -> Self {
        let mut client = clickhouse::Client::default().with_url(&config.url);
        if let Some(user) = &config.user {
            client = client.with_user(user);
        }
        if let Some(password) = &config.password {
            client = client.with_password(password);
        }
        info!(url = %config.url, "ClickHouse executor initialized");
        Self { client }
    }

    /// Round-trip a trivial query to verify connectivity and credentials.
    pub async fn ping(&self) -> Result<(), QueryError> {
        self.client
            .query("SELECT 1 AS ok")
            .fetch_one::<PingRow>()
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn fetch<T>(&self, sql: &str) -> Result<Vec<RawMetricRow>, QueryError>
    where
        T: Row + Serialize + DeserializeOwned,
    {
        let rows = self
            .client
            .query(sql)
            .fetch_all::<T>()
            .await
            .map_err(classify)?;
        rows.iter().map(into_raw).collect()
    }
}

#[async_trait]
impl MetricQueryExecutor for ClickHouseExecutor {
    async fn execute(
        &self,
        dimension: Dimension,
        source: &SourceDescriptor,
        range: &DateRange,
        granularity: Granularity,
    ) -> Result<Vec<RawMetricRow>, QueryError> {
        let sql = queries::build(dimension, source, range, granularity);
        debug!(%dimension, source = %source.name, "Executing dimension query");

        match dimension {
            Dimension::BasicCvr => self.fetch::<BasicCvrRow>(&sql).await,
            Dimension::CvrExcludingAds => self.fetch::<CvrNoAdsRow>(&sql).await,
            Dimension::BookingFunnel => self.fetch::<FunnelRow>(&sql).await,
            Dimension::TrafficSources => self.fetch::<TrafficRow>(&sql).await,
            Dimension::UserDemographics => self.fetch::<DemographicRow>(&sql).await,
        }
    }
}

fn into_raw<T: Serialize>(row: &T) -> Result<RawMetricRow, QueryError> {
    let value = serde_json::to_value(row).map_err(|e| QueryError::Decode(e.to_string()))?;
    let serde_json::Value::Object(mut fields) = value else {
        return Err(QueryError::Decode("row did not serialize to an object".into()));
    };
    let period = match fields.remove("period") {
        Some(serde_json::Value::String(p)) => p,
        _ => return Err(QueryError::Decode("row has no period".into())),
    };
    Ok(RawMetricRow::new(period, fields))
}

// ─── Error classification ───────────────────────────────────────────────────

fn classify(err: clickhouse::error::Error) -> QueryError {
    use clickhouse::error::Error;
    match err {
        Error::Network(e) => QueryError::Transport(e.to_string()),
        Error::BadResponse(msg) => classify_response(&msg),
        Error::InvalidParams(e) => QueryError::Execution(e.to_string()),
        other => QueryError::Decode(other.to_string()),
    }
}

/// Map a server error message onto a failure kind by its exception name.
fn classify_response(message: &str) -> QueryError {
    const UNAUTHORIZED: [&str; 2] = ["AUTHENTICATION_FAILED", "Code: 516"];
    const FORBIDDEN: [&str; 2] = ["ACCESS_DENIED", "Code: 497"];
    const NOT_FOUND: [&str; 3] = [
        "UNKNOWN_TABLE",
        "UNKNOWN_DATABASE",
        "CANNOT_EXTRACT_TABLE_STRUCTURE",
    ];

    let message = message.trim().to_string();
    if UNAUTHORIZED.iter().any(|m| message.contains(m)) {
        QueryError::Unauthorized(message)
    } else if FORBIDDEN.iter().any(|m| message.contains(m)) {
        QueryError::Forbidden(message)
    } else if NOT_FOUND.iter().any(|m| message.contains(m)) {
        QueryError::NotFound(message)
    } else {
        QueryError::Execution(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::{fields, ErrorScope};

    #[test]
    fn test_classify_unauthorized() {
        let err = classify_response(
            "Code: 516. DB::Exception: default: Authentication failed: password is incorrect. (AUTHENTICATION_FAILED)",
        );
        assert!(matches!(err, QueryError::Unauthorized(_)));
        assert_eq!(err.scope(), ErrorScope::Dimension);
    }

    #[test]
    fn test_classify_missing_grant_is_source_scoped() {
        let err = classify_response(
            "Code: 497. DB::Exception: reporter: Not enough privileges. (ACCESS_DENIED)",
        );
        assert!(matches!(err, QueryError::Forbidden(_)));
        assert_eq!(err.scope(), ErrorScope::Source);
    }

    #[test]
    fn test_classify_missing_tables() {
        let err = classify_response(
            "Code: 81. DB::Exception: Database hakone_ga4 does not exist. (UNKNOWN_DATABASE)",
        );
        assert!(matches!(err, QueryError::NotFound(_)));
        assert!(matches!(
            classify_response("Code: 60. DB::Exception: Table x doesn't exist. (UNKNOWN_TABLE)"),
            QueryError::NotFound(_)
        ));
    }

    #[test]
    fn test_classify_other_server_errors() {
        let err = classify_response("Code: 62. DB::Exception: Syntax error. (SYNTAX_ERROR)\n");
        assert_eq!(
            err,
            QueryError::Execution("Code: 62. DB::Exception: Syntax error. (SYNTAX_ERROR)".into())
        );
    }

    #[test]
    fn test_rows_flatten_into_field_maps() {
        let row = BasicCvrRow {
            period: "2024-02".into(),
            active_users: 1000,
            purchase_users: 60,
            cvr: Some(0.06),
        };
        let raw = into_raw(&row).unwrap();
        assert_eq!(raw.period, "2024-02");
        assert!(!raw.fields.contains_key(fields::PERIOD));
        assert_eq!(raw.fields[fields::ACTIVE_USERS], 1000);
        assert_eq!(raw.fields[fields::CVR], 0.06);
    }

    #[test]
    fn test_null_rates_stay_null() {
        let row = FunnelRow {
            period: "2024-Q1".into(),
            first_visit_users: 0,
            plan_selection_users: 0,
            booking_input_users: 0,
            personal_info_users: 0,
            completion_users: 0,
            hp_to_plan_rate: None,
            plan_to_booking_rate: None,
            booking_to_personal_rate: None,
            personal_to_completion_rate: None,
            overall_conversion_rate: None,
        };
        let raw = into_raw(&row).unwrap();
        assert!(raw.fields[fields::OVERALL_CONVERSION_RATE].is_null());
    }
}
