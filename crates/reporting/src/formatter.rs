//! Projects report data into header + row tables for a sink.
//!
//! Rates render as percentages with two decimals. Absent counts render as
//! `0`; absent rates render as an empty cell so "not computed" stays
//! distinguishable from a computed zero.

use insights_core::{fields, MetricRow, SourceDescriptor};
use serde::Serialize;
use serde_json::{json, Value};

use crate::merger::MergedRecords;
use crate::summary::SummarySnapshot;

/// Output table names.
pub mod tables {
    pub const PROPERTY_CVR: &str = "property_cvr";
    pub const BOOKING_FUNNEL: &str = "booking_funnel";
    pub const TRAFFIC_SOURCES: &str = "traffic_sources";
    pub const USER_DEMOGRAPHICS: &str = "user_demographics";
    pub const PROPERTY_LIST: &str = "property_list";
    pub const PERFORMANCE_SUMMARY: &str = "performance_summary";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    fn new(name: &str, headers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

// ─── Cell helpers ───────────────────────────────────────────────────────────

/// `0.0523` becomes `"5.23%"`; absent becomes `""`.
pub fn percent(value: Option<f64>) -> Value {
    match value {
        Some(v) => Value::String(format!("{:.2}%", v * 100.0)),
        None => Value::String(String::new()),
    }
}

fn count(value: Option<&Value>) -> Value {
    value.cloned().unwrap_or_else(|| json!(0))
}

fn text(value: Option<&str>) -> Value {
    Value::String(value.unwrap_or_default().to_string())
}

// ─── Tables ─────────────────────────────────────────────────────────────────

/// Merged basic and paid-ads-excluded CVR with their change rates.
pub fn format_cvr(records: &MergedRecords) -> Table {
    let mut table = Table::new(
        tables::PROPERTY_CVR,
        &[
            "Period",
            "Property",
            "Description",
            "Active Users",
            "Purchase Users",
            "CVR",
            "CVR Change",
            "Active Users (excl. Ads)",
            "Purchase Users (excl. Ads)",
            "CVR (excl. Ads)",
            "CVR Change (excl. Ads)",
        ],
    );
    for record in records.values() {
        table.rows.push(vec![
            json!(record.period),
            json!(record.source_name),
            json!(record.source_description),
            count(record.get(fields::ACTIVE_USERS)),
            count(record.get(fields::PURCHASE_USERS)),
            percent(record.number(fields::CVR)),
            text(record.text(fields::CVR_CHANGE_RATE_PERCENTAGE)),
            count(record.get(fields::ACTIVE_USERS_NO_ADS)),
            count(record.get(fields::PURCHASE_USERS_NO_ADS)),
            percent(record.number(fields::CVR_NO_ADS)),
            text(record.text(fields::CVR_NO_ADS_CHANGE_RATE_PERCENTAGE)),
        ]);
    }
    table
}

pub fn format_funnel(rows: &[MetricRow]) -> Table {
    let mut table = Table::new(
        tables::BOOKING_FUNNEL,
        &[
            "Period",
            "Property",
            "First Visit",
            "Plan Selection",
            "Booking Input",
            "Personal Info",
            "Completion",
            "Visit to Plan",
            "Plan to Booking",
            "Booking to Personal Info",
            "Personal Info to Completion",
            "Overall Conversion",
        ],
    );
    for row in rows {
        table.rows.push(vec![
            json!(row.period),
            json!(row.source_name),
            count(row.get(fields::FIRST_VISIT_USERS)),
            count(row.get(fields::PLAN_SELECTION_USERS)),
            count(row.get(fields::BOOKING_INPUT_USERS)),
            count(row.get(fields::PERSONAL_INFO_USERS)),
            count(row.get(fields::COMPLETION_USERS)),
            percent(row.number(fields::HP_TO_PLAN_RATE)),
            percent(row.number(fields::PLAN_TO_BOOKING_RATE)),
            percent(row.number(fields::BOOKING_TO_PERSONAL_RATE)),
            percent(row.number(fields::PERSONAL_TO_COMPLETION_RATE)),
            percent(row.number(fields::OVERALL_CONVERSION_RATE)),
        ]);
    }
    table
}

pub fn format_traffic(rows: &[MetricRow]) -> Table {
    let mut table = Table::new(
        tables::TRAFFIC_SOURCES,
        &[
            "Period",
            "Property",
            "Source / Medium",
            "Users",
            "Purchase Users",
            "CVR",
            "User Share",
        ],
    );
    for row in rows {
        table.rows.push(vec![
            json!(row.period),
            json!(row.source_name),
            text(row.text(fields::SOURCE_MEDIUM)),
            count(row.get(fields::TOTAL_USERS)),
            count(row.get(fields::PURCHASE_USERS)),
            percent(row.number(fields::CVR_BY_SOURCE)),
            percent(row.number(fields::USER_PERCENTAGE)),
        ]);
    }
    table
}

pub fn format_demographics(rows: &[MetricRow]) -> Table {
    let mut table = Table::new(
        tables::USER_DEMOGRAPHICS,
        &[
            "Period",
            "Property",
            "Type",
            "Value",
            "Users",
            "Purchase Users",
            "CVR",
            "Share",
        ],
    );
    for row in rows {
        table.rows.push(vec![
            json!(row.period),
            json!(row.source_name),
            text(row.text(fields::DEMOGRAPHIC_TYPE)),
            text(row.text(fields::DEMOGRAPHIC_VALUE)),
            count(row.get(fields::TOTAL_USERS)),
            count(row.get(fields::PURCHASE_USERS)),
            percent(row.number(fields::CVR)),
            percent(row.number(fields::PERCENTAGE)),
        ]);
    }
    table
}

/// Every configured source, enabled or not.
pub fn format_property_list(sources: &[SourceDescriptor]) -> Table {
    let mut table = Table::new(
        tables::PROPERTY_LIST,
        &["Property", "Dataset", "Table Prefix", "Description", "Status"],
    );
    for source in sources {
        table.rows.push(vec![
            json!(source.name),
            json!(source.id),
            json!(source.table_prefix),
            json!(source.description),
            json!(if source.enabled { "Enabled" } else { "Disabled" }),
        ]);
    }
    table
}

pub fn format_summary(snapshots: &[SummarySnapshot]) -> Table {
    let mut table = Table::new(
        tables::PERFORMANCE_SUMMARY,
        &[
            "Rank",
            "Property",
            "Latest Period",
            "CVR",
            "Users",
            "Purchase Users",
            "Performance",
            "Funnel Completion",
        ],
    );
    for (i, s) in snapshots.iter().enumerate() {
        table.rows.push(vec![
            json!(i + 1),
            json!(s.source_name),
            json!(s.latest_period),
            percent(Some(s.latest_cvr)),
            json!(s.latest_users),
            json!(s.latest_conversions),
            json!(s.performance_rank.as_str()),
            percent(s.latest_completion_rate),
        ]);
    }
    table
}
