use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InsightsError, InsightsResult};

/// Field values of a metric row, keyed by column name.
pub type FieldMap = serde_json::Map<String, Value>;

/// Column names shared by the warehouse queries, the merger and the formatter.
pub mod fields {
    pub const PERIOD: &str = "period";

    pub const ACTIVE_USERS: &str = "active_users";
    pub const PURCHASE_USERS: &str = "purchase_users";
    pub const CVR: &str = "cvr";

    pub const ACTIVE_USERS_NO_ADS: &str = "active_users_no_ads";
    pub const PURCHASE_USERS_NO_ADS: &str = "purchase_users_no_ads";
    pub const CVR_NO_ADS: &str = "cvr_no_ads";

    pub const CHANGE_RATE: &str = "change_rate";
    pub const CHANGE_RATE_PERCENTAGE: &str = "change_rate_percentage";
    pub const CVR_CHANGE_RATE: &str = "cvr_change_rate";
    pub const CVR_CHANGE_RATE_PERCENTAGE: &str = "cvr_change_rate_percentage";
    pub const CVR_NO_ADS_CHANGE_RATE: &str = "cvr_no_ads_change_rate";
    pub const CVR_NO_ADS_CHANGE_RATE_PERCENTAGE: &str = "cvr_no_ads_change_rate_percentage";

    pub const FIRST_VISIT_USERS: &str = "first_visit_users";
    pub const PLAN_SELECTION_USERS: &str = "plan_selection_users";
    pub const BOOKING_INPUT_USERS: &str = "booking_input_users";
    pub const PERSONAL_INFO_USERS: &str = "personal_info_users";
    pub const COMPLETION_USERS: &str = "completion_users";
    pub const HP_TO_PLAN_RATE: &str = "hp_to_plan_rate";
    pub const PLAN_TO_BOOKING_RATE: &str = "plan_to_booking_rate";
    pub const BOOKING_TO_PERSONAL_RATE: &str = "booking_to_personal_rate";
    pub const PERSONAL_TO_COMPLETION_RATE: &str = "personal_to_completion_rate";
    pub const OVERALL_CONVERSION_RATE: &str = "overall_conversion_rate";

    pub const SOURCE_MEDIUM: &str = "source_medium";
    pub const TOTAL_USERS: &str = "total_users";
    pub const CVR_BY_SOURCE: &str = "cvr_by_source";
    pub const USER_PERCENTAGE: &str = "user_percentage";

    pub const DEMOGRAPHIC_TYPE: &str = "demographic_type";
    pub const DEMOGRAPHIC_VALUE: &str = "demographic_value";
    pub const PERCENTAGE: &str = "percentage";
}

// ─── Granularity ────────────────────────────────────────────────────────────

/// Bucketing unit for reporting periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Month,
    Quarter,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Quarter => "quarter",
        }
    }

    /// Period label containing `date`: `YYYY-MM` or `YYYY-Qn`.
    pub fn label_for(&self, date: NaiveDate) -> String {
        match self {
            Self::Month => format!("{:04}-{:02}", date.year(), date.month()),
            Self::Quarter => format!("{:04}-Q{}", date.year(), quarter_of(date.month())),
        }
    }

    /// Whether `period` is a well-formed label for this granularity.
    pub fn is_valid_period(&self, period: &str) -> bool {
        let bytes = period.as_bytes();
        let year_ok = bytes.len() >= 5 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'-';
        if !year_ok {
            return false;
        }
        match self {
            Self::Month => {
                bytes.len() == 7
                    && period[5..]
                        .parse::<u32>()
                        .is_ok_and(|m| (1..=12).contains(&m) && bytes[5].is_ascii_digit())
            }
            Self::Quarter => bytes.len() == 7 && bytes[5] == b'Q' && (b'1'..=b'4').contains(&bytes[6]),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = InsightsError;

    fn from_str(s: &str) -> InsightsResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "month" | "monthly" => Ok(Self::Month),
            "quarter" | "quarterly" => Ok(Self::Quarter),
            other => Err(InsightsError::Validation(format!(
                "unsupported period granularity '{other}', expected month or quarter"
            ))),
        }
    }
}

/// Calendar quarter (1-4) of a month (1-12).
pub fn quarter_of(month: u32) -> u32 {
    month.div_ceil(3)
}

// ─── Dimensions ─────────────────────────────────────────────────────────────

/// The metric dimensions fetched on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    BasicCvr,
    CvrExcludingAds,
    BookingFunnel,
    TrafficSources,
    UserDemographics,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::BasicCvr,
        Dimension::CvrExcludingAds,
        Dimension::BookingFunnel,
        Dimension::TrafficSources,
        Dimension::UserDemographics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicCvr => "basic_cvr",
            Self::CvrExcludingAds => "cvr_excluding_ads",
            Self::BookingFunnel => "booking_funnel",
            Self::TrafficSources => "traffic_sources",
            Self::UserDemographics => "user_demographics",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Sources ────────────────────────────────────────────────────────────────

/// One configured analytics property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Display identity, unique within a registry.
    pub name: String,
    /// Storage location (warehouse database) holding the event tables.
    pub id: String,
    /// Prefix of the daily sharded event tables, e.g. `events_`.
    pub table_prefix: String,
    pub description: String,
    pub enabled: bool,
}

// ─── Date ranges ────────────────────────────────────────────────────────────

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Compact `YYYYMMDD` form of the start date, as used in table suffixes.
    pub fn start_suffix(&self) -> String {
        self.start.format("%Y%m%d").to_string()
    }

    pub fn end_suffix(&self) -> String {
        self.end.format("%Y%m%d").to_string()
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ─── Metric rows ────────────────────────────────────────────────────────────

/// A row as returned by a metric query, before source tagging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricRow {
    pub period: String,
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl RawMetricRow {
    pub fn new(period: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            period: period.into(),
            fields,
        }
    }

    /// Stamp the row with the identity of the source it was fetched from.
    pub fn tagged(self, source: &SourceDescriptor) -> MetricRow {
        MetricRow {
            period: self.period,
            source_name: source.name.clone(),
            source_description: source.description.clone(),
            fields: self.fields,
        }
    }
}

/// A metric row tagged with its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub period: String,
    pub source_name: String,
    pub source_description: String,
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl MetricRow {
    /// Field value, treating an explicit null as absent.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }
}

// ─── Change rates ───────────────────────────────────────────────────────────

/// Ratio between a period's value and the preceding period's value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeRate {
    pub ratio: Option<f64>,
    pub percentage_text: Option<String>,
}

impl ChangeRate {
    pub fn between(previous: Option<f64>, current: Option<f64>) -> Self {
        match (previous, current) {
            (Some(prev), Some(cur)) if prev != 0.0 => {
                let ratio = cur / prev;
                Self {
                    ratio: Some(ratio),
                    percentage_text: Some(format!("{:.2}%", (ratio - 1.0) * 100.0)),
                }
            }
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_parse() {
        assert_eq!("month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert_eq!("Quarterly".parse::<Granularity>().unwrap(), Granularity::Quarter);
        let err = "week".parse::<Granularity>().unwrap_err();
        assert!(matches!(err, InsightsError::Validation(_)));
    }

    #[test]
    fn test_period_labels() {
        let date = NaiveDate::from_ymd_opt(2024, 8, 31).unwrap();
        assert_eq!(Granularity::Month.label_for(date), "2024-08");
        assert_eq!(Granularity::Quarter.label_for(date), "2024-Q3");
        assert_eq!(quarter_of(1), 1);
        assert_eq!(quarter_of(3), 1);
        assert_eq!(quarter_of(4), 2);
        assert_eq!(quarter_of(12), 4);
    }

    #[test]
    fn test_period_validation() {
        assert!(Granularity::Month.is_valid_period("2024-01"));
        assert!(Granularity::Month.is_valid_period("2024-12"));
        assert!(!Granularity::Month.is_valid_period("2024-13"));
        assert!(!Granularity::Month.is_valid_period("2024-1"));
        assert!(!Granularity::Month.is_valid_period("2024-Q1"));
        assert!(Granularity::Quarter.is_valid_period("2024-Q4"));
        assert!(!Granularity::Quarter.is_valid_period("2024-Q5"));
        assert!(!Granularity::Quarter.is_valid_period("2024-03"));
    }

    #[test]
    fn test_change_rate_between() {
        let rate = ChangeRate::between(Some(0.05), Some(0.075));
        assert!((rate.ratio.unwrap() - 1.5).abs() < 1e-9);
        assert_eq!(rate.percentage_text.as_deref(), Some("50.00%"));

        let drop = ChangeRate::between(Some(0.04), Some(0.03));
        assert_eq!(drop.percentage_text.as_deref(), Some("-25.00%"));

        assert_eq!(ChangeRate::between(Some(0.0), Some(0.1)), ChangeRate::default());
        assert_eq!(ChangeRate::between(None, Some(0.1)), ChangeRate::default());
        assert_eq!(ChangeRate::between(Some(0.1), None), ChangeRate::default());
    }

    #[test]
    fn test_metric_row_null_is_absent() {
        let mut values = FieldMap::new();
        values.insert(fields::CVR.into(), Value::Null);
        values.insert(fields::ACTIVE_USERS.into(), 10.into());
        let source = SourceDescriptor {
            name: "Hakone".into(),
            id: "hakone_ga4".into(),
            table_prefix: "events_".into(),
            description: "Hakone ryokan".into(),
            enabled: true,
        };
        let row = RawMetricRow::new("2024-01", values).tagged(&source);
        assert_eq!(row.source_name, "Hakone");
        assert_eq!(row.source_description, "Hakone ryokan");
        assert!(row.get(fields::CVR).is_none());
        assert_eq!(row.number(fields::ACTIVE_USERS), Some(10.0));
    }
}
