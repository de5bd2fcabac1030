//! Warehouse SQL for each metric dimension.
//!
//! Events live in daily sharded tables `{source.id}.{table_prefix}YYYYMMDD`
//! with the columns:
//!
//! ```text
//! event_date Date, event_timestamp Int64, event_name String,
//! user_pseudo_id String, source String, medium String,
//! age String, gender String, device_category String
//! ```
//!
//! Empty strings mean "unknown". Shards are selected with the `merge()`
//! table function and narrowed to the date range through `_table`.

use insights_core::{DateRange, Dimension, Granularity, SourceDescriptor};

/// Event names marking each booking funnel stage, in order.
pub const FUNNEL_STAGES: [(&str, &[&str]); 5] = [
    ("first_visit_users", &["first_visit", "first_open"]),
    ("plan_selection_users", &["view_item", "select_item"]),
    ("booking_input_users", &["begin_checkout"]),
    ("personal_info_users", &["add_payment_info", "add_shipping_info"]),
    ("completion_users", &["purchase"]),
];

/// Substring of the first-touch medium that marks a paid-ad user.
pub const PAID_MEDIUM_MARKER: &str = "cpm";

pub fn build(
    dimension: Dimension,
    source: &SourceDescriptor,
    range: &DateRange,
    granularity: Granularity,
) -> String {
    let q = QueryParts::new(source, range, granularity);
    match dimension {
        Dimension::BasicCvr => basic_cvr(&q),
        Dimension::CvrExcludingAds => cvr_excluding_ads(&q),
        Dimension::BookingFunnel => booking_funnel(&q),
        Dimension::TrafficSources => traffic_sources(&q),
        Dimension::UserDemographics => user_demographics(&q),
    }
}

struct QueryParts {
    table: String,
    prefix: String,
    start: String,
    end: String,
    granularity: Granularity,
}

impl QueryParts {
    fn new(source: &SourceDescriptor, range: &DateRange, granularity: Granularity) -> Self {
        Self {
            table: format!("merge('{}', '^{}[0-9]{{8}}$')", source.id, source.table_prefix),
            prefix: source.table_prefix.clone(),
            start: range.start_suffix(),
            end: range.end_suffix(),
            granularity,
        }
    }

    /// Shard filter, optionally qualified with a table alias.
    fn shards(&self, alias: &str) -> String {
        format!(
            "{alias}_table BETWEEN '{p}{s}' AND '{p}{e}'",
            p = self.prefix,
            s = self.start,
            e = self.end
        )
    }

    fn period(&self, alias: &str) -> String {
        match self.granularity {
            Granularity::Month => format!("formatDateTime({alias}event_date, '%Y-%m')"),
            Granularity::Quarter => format!(
                "concat(toString(toYear({alias}event_date)), '-Q', toString(toQuarter({alias}event_date)))"
            ),
        }
    }
}

fn ratio(numerator: &str, denominator: &str) -> String {
    format!("if({denominator} = 0, NULL, {numerator} / {denominator})")
}

fn quoted_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn basic_cvr(q: &QueryParts) -> String {
    format!(
        "SELECT
            {period} AS period,
            uniqExact(user_pseudo_id) AS active_users,
            uniqExactIf(user_pseudo_id, event_name = 'purchase') AS purchase_users,
            {cvr} AS cvr
        FROM {table}
        WHERE {shards}
        GROUP BY period
        ORDER BY period",
        period = q.period(""),
        cvr = ratio("purchase_users", "active_users"),
        table = q.table,
        shards = q.shards(""),
    )
}

fn cvr_excluding_ads(q: &QueryParts) -> String {
    format!(
        "WITH first_medium AS (
            SELECT user_pseudo_id, argMin(medium, event_timestamp) AS first_medium
            FROM {table}
            WHERE {shards} AND event_name IN ('first_visit', 'first_open')
            GROUP BY user_pseudo_id
        )
        SELECT
            {period} AS period,
            uniqExact(e.user_pseudo_id) AS active_users_no_ads,
            uniqExactIf(e.user_pseudo_id, e.event_name = 'purchase') AS purchase_users_no_ads,
            {cvr} AS cvr_no_ads
        FROM {table} AS e
        LEFT JOIN first_medium AS f ON e.user_pseudo_id = f.user_pseudo_id
        WHERE {shards_e} AND f.first_medium NOT LIKE '%{marker}%'
        GROUP BY period
        ORDER BY period",
        table = q.table,
        shards = q.shards(""),
        shards_e = q.shards("e."),
        period = q.period("e."),
        cvr = ratio("purchase_users_no_ads", "active_users_no_ads"),
        marker = PAID_MEDIUM_MARKER,
    )
}

fn booking_funnel(q: &QueryParts) -> String {
    let all_events: Vec<&str> = FUNNEL_STAGES
        .iter()
        .flat_map(|(_, events)| events.iter().copied())
        .collect();
    let stage_flags = FUNNEL_STAGES
        .iter()
        .enumerate()
        .map(|(i, (_, events))| format!("max(event_name IN ({})) AS stage_{}", quoted_list(events), i + 1))
        .collect::<Vec<_>>()
        .join(",\n            ");
    let stage_sums = FUNNEL_STAGES
        .iter()
        .enumerate()
        .map(|(i, (field, _))| format!("sum(stage_{}) AS {field}", i + 1))
        .collect::<Vec<_>>()
        .join(",\n            ");

    format!(
        "WITH stages AS (
            SELECT
            {period} AS period,
            user_pseudo_id,
            {stage_flags}
            FROM {table}
            WHERE {shards} AND event_name IN ({events})
            GROUP BY period, user_pseudo_id
        ),
        totals AS (
            SELECT
            period,
            {stage_sums}
            FROM stages
            GROUP BY period
        )
        SELECT
            period,
            first_visit_users,
            plan_selection_users,
            booking_input_users,
            personal_info_users,
            completion_users,
            {hp_to_plan} AS hp_to_plan_rate,
            {plan_to_booking} AS plan_to_booking_rate,
            {booking_to_personal} AS booking_to_personal_rate,
            {personal_to_completion} AS personal_to_completion_rate,
            {overall} AS overall_conversion_rate
        FROM totals
        ORDER BY period",
        period = q.period(""),
        table = q.table,
        shards = q.shards(""),
        events = quoted_list(&all_events),
        hp_to_plan = ratio("plan_selection_users", "first_visit_users"),
        plan_to_booking = ratio("booking_input_users", "plan_selection_users"),
        booking_to_personal = ratio("personal_info_users", "booking_input_users"),
        personal_to_completion = ratio("completion_users", "personal_info_users"),
        overall = ratio("completion_users", "first_visit_users"),
    )
}

fn traffic_sources(q: &QueryParts) -> String {
    format!(
        "WITH first_touch AS (
            SELECT
                user_pseudo_id,
                argMin(source, event_timestamp) AS first_source,
                argMin(medium, event_timestamp) AS first_medium
            FROM {table}
            WHERE {shards}
            GROUP BY user_pseudo_id
        ),
        by_source AS (
            SELECT
                {period} AS period,
                concat(
                    if(f.first_source = '', '(direct)', f.first_source),
                    ' / ',
                    if(f.first_medium = '', '(none)', f.first_medium)
                ) AS source_medium,
                uniqExact(e.user_pseudo_id) AS total_users,
                uniqExactIf(e.user_pseudo_id, e.event_name = 'purchase') AS purchase_users
            FROM {table} AS e
            LEFT JOIN first_touch AS f ON e.user_pseudo_id = f.user_pseudo_id
            WHERE {shards_e}
            GROUP BY period, source_medium
        )
        SELECT
            period,
            source_medium,
            total_users,
            purchase_users,
            {cvr} AS cvr_by_source,
            total_users / sum(total_users) OVER (PARTITION BY period) AS user_percentage
        FROM by_source
        ORDER BY period DESC, total_users DESC",
        table = q.table,
        shards = q.shards(""),
        shards_e = q.shards("e."),
        period = q.period("e."),
        cvr = ratio("purchase_users", "total_users"),
    )
}

fn user_demographics(q: &QueryParts) -> String {
    let breakdown = [("age", "age_group"), ("gender", "gender_value"), ("device", "device")]
        .iter()
        .map(|(kind, column)| {
            format!(
                "SELECT period, '{kind}' AS demographic_type, {column} AS demographic_value,
                    count() AS total_users, sum(has_purchase) AS purchase_users
                FROM users
                WHERE {column} != ''
                GROUP BY period, {column}"
            )
        })
        .collect::<Vec<_>>()
        .join("\n                UNION ALL\n                ");

    format!(
        "WITH users AS (
            SELECT
                {period} AS period,
                user_pseudo_id,
                anyIf(age, age != '') AS age_group,
                anyIf(gender, gender != '') AS gender_value,
                anyIf(device_category, device_category != '') AS device,
                max(event_name = 'purchase') AS has_purchase
            FROM {table}
            WHERE {shards}
            GROUP BY period, user_pseudo_id
        ),
        breakdown AS (
                {breakdown}
        )
        SELECT
            period,
            demographic_type,
            demographic_value,
            total_users,
            purchase_users,
            {cvr} AS cvr,
            total_users / sum(total_users) OVER (PARTITION BY period, demographic_type) AS percentage
        FROM breakdown
        ORDER BY period DESC, demographic_type, total_users DESC",
        period = q.period(""),
        table = q.table,
        shards = q.shards(""),
        cvr = ratio("purchase_users", "total_users"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn source() -> SourceDescriptor {
        SourceDescriptor {
            name: "Hakone".into(),
            id: "hakone_ga4".into(),
            table_prefix: "events_".into(),
            description: String::new(),
            enabled: true,
        }
    }

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
    }

    #[test]
    fn test_shard_selection() {
        let sql = build(Dimension::BasicCvr, &source(), &range(), Granularity::Month);
        assert!(sql.contains("merge('hakone_ga4', '^events_[0-9]{8}$')"));
        assert!(sql.contains("_table BETWEEN 'events_20240101' AND 'events_20240630'"));
        assert!(sql.contains("formatDateTime(event_date, '%Y-%m') AS period"));
    }

    #[test]
    fn test_quarter_period_expression() {
        let sql = build(Dimension::BasicCvr, &source(), &range(), Granularity::Quarter);
        assert!(sql.contains("'-Q', toString(toQuarter(event_date))"));
    }

    #[test]
    fn test_every_dimension_selects_period() {
        for dimension in Dimension::ALL {
            for granularity in [Granularity::Month, Granularity::Quarter] {
                let sql = build(dimension, &source(), &range(), granularity);
                assert!(sql.contains("AS period"), "{dimension} lacks period");
                assert!(!sql.contains('?'), "{dimension} contains a bind placeholder");
            }
        }
    }

    #[test]
    fn test_joined_queries_qualify_aliases() {
        let sql = build(Dimension::CvrExcludingAds, &source(), &range(), Granularity::Month);
        assert!(sql.contains("e._table BETWEEN"));
        assert!(sql.contains("formatDateTime(e.event_date, '%Y-%m')"));
        assert!(sql.contains("NOT LIKE '%cpm%'"));
    }

    #[test]
    fn test_funnel_covers_all_stages() {
        let sql = build(Dimension::BookingFunnel, &source(), &range(), Granularity::Month);
        for (field, _) in FUNNEL_STAGES {
            assert!(sql.contains(field));
        }
        assert!(sql.contains("stage_5"));
        assert!(sql.contains("AS overall_conversion_rate"));
    }

    #[test]
    fn test_demographics_union() {
        let sql = build(Dimension::UserDemographics, &source(), &range(), Granularity::Month);
        assert_eq!(sql.matches("UNION ALL").count(), 2);
        assert!(sql.contains("'device' AS demographic_type"));
    }
}
