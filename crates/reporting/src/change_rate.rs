//! Period-over-period change rates per source.

use insights_core::{fields, ChangeRate, MetricRow};
use serde_json::Value;

/// Annotate rows with `change_rate` and `change_rate_percentage` computed
/// on `value_field`.
///
/// Rows are grouped by source (groups keep first-seen order) and each group
/// is sorted by period ascending. The first row of a group, and any row
/// whose predecessor's value is absent or zero, gets nulls.
pub fn compute_change_rates(rows: &[MetricRow], value_field: &str) -> Vec<MetricRow> {
    let mut partitions: Vec<(&str, Vec<MetricRow>)> = Vec::new();
    for row in rows {
        match partitions
            .iter_mut()
            .find(|(source, _)| *source == row.source_name)
        {
            Some((_, group)) => group.push(row.clone()),
            None => partitions.push((row.source_name.as_str(), vec![row.clone()])),
        }
    }

    let mut out = Vec::with_capacity(rows.len());
    for (_, mut group) in partitions {
        group.sort_by(|a, b| a.period.cmp(&b.period));

        let mut previous: Option<f64> = None;
        for (i, mut row) in group.into_iter().enumerate() {
            let current = row.number(value_field);
            let rate = if i == 0 {
                ChangeRate::default()
            } else {
                ChangeRate::between(previous, current)
            };
            row.set(
                fields::CHANGE_RATE,
                rate.ratio.map(Value::from).unwrap_or(Value::Null),
            );
            row.set(
                fields::CHANGE_RATE_PERCENTAGE,
                rate.percentage_text.map(Value::from).unwrap_or(Value::Null),
            );
            previous = current;
            out.push(row);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::{FieldMap, RawMetricRow, SourceDescriptor};

    fn cvr_row(source: &str, period: &str, cvr: Option<f64>) -> MetricRow {
        let mut values = FieldMap::new();
        values.insert(
            fields::CVR.into(),
            cvr.map(Value::from).unwrap_or(Value::Null),
        );
        RawMetricRow::new(period, values).tagged(&SourceDescriptor {
            name: source.into(),
            id: "ds".into(),
            table_prefix: "events_".into(),
            description: String::new(),
            enabled: true,
        })
    }

    #[test]
    fn test_ab_scenario() {
        let rows = vec![
            cvr_row("A", "2024-02", Some(0.075)),
            cvr_row("B", "2024-01", Some(0.02)),
            cvr_row("A", "2024-01", Some(0.05)),
        ];
        let out = compute_change_rates(&rows, fields::CVR);

        let order: Vec<_> = out
            .iter()
            .map(|r| (r.source_name.as_str(), r.period.as_str()))
            .collect();
        assert_eq!(order, vec![("A", "2024-01"), ("A", "2024-02"), ("B", "2024-01")]);

        assert!(out[0].get(fields::CHANGE_RATE).is_none());
        let ratio = out[1].number(fields::CHANGE_RATE).unwrap();
        assert!((ratio - 1.5).abs() < 1e-9);
        assert_eq!(out[1].text(fields::CHANGE_RATE_PERCENTAGE), Some("50.00%"));
        assert!(out[2].get(fields::CHANGE_RATE).is_none());
        assert!(out[2].get(fields::CHANGE_RATE_PERCENTAGE).is_none());
    }

    #[test]
    fn test_zero_or_absent_previous_yields_null() {
        let rows = vec![
            cvr_row("A", "2024-01", Some(0.0)),
            cvr_row("A", "2024-02", Some(0.03)),
            cvr_row("A", "2024-03", None),
            cvr_row("A", "2024-04", Some(0.04)),
        ];
        let out = compute_change_rates(&rows, fields::CVR);
        assert!(out.iter().all(|r| r.get(fields::CHANGE_RATE).is_none()));
        assert!(out[1].fields[fields::CHANGE_RATE].is_null());
    }

    #[test]
    fn test_decrease_and_zero_current() {
        let rows = vec![
            cvr_row("A", "2024-Q1", Some(0.04)),
            cvr_row("A", "2024-Q2", Some(0.03)),
            cvr_row("A", "2024-Q3", Some(0.0)),
        ];
        let out = compute_change_rates(&rows, fields::CVR);
        assert_eq!(out[1].text(fields::CHANGE_RATE_PERCENTAGE), Some("-25.00%"));
        assert_eq!(out[2].number(fields::CHANGE_RATE), Some(0.0));
        assert_eq!(out[2].text(fields::CHANGE_RATE_PERCENTAGE), Some("-100.00%"));
    }

    #[test]
    fn test_input_fields_preserved() {
        let mut row = cvr_row("A", "2024-01", Some(0.05));
        row.set(fields::ACTIVE_USERS, 1200);
        let out = compute_change_rates(&[row], fields::CVR);
        assert_eq!(out[0].number(fields::ACTIVE_USERS), Some(1200.0));
        assert_eq!(out[0].source_name, "A");
    }
}
