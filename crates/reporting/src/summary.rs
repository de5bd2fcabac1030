//! Latest-period performance snapshot and ranking per source.

use std::fmt;

use insights_core::{fields, MetricRow};
use serde::Serialize;

/// CVR above this is ranked High.
pub const HIGH_CVR_THRESHOLD: f64 = 0.05;
/// CVR below this is ranked Low.
pub const LOW_CVR_THRESHOLD: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceRank {
    High,
    Average,
    Low,
}

impl PerformanceRank {
    pub fn for_cvr(cvr: f64) -> Self {
        if cvr > HIGH_CVR_THRESHOLD {
            Self::High
        } else if cvr < LOW_CVR_THRESHOLD {
            Self::Low
        } else {
            Self::Average
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Average => "Average",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for PerformanceRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarySnapshot {
    pub source_name: String,
    pub source_description: String,
    pub latest_period: String,
    pub latest_cvr: f64,
    pub latest_users: u64,
    pub latest_conversions: u64,
    pub performance_rank: PerformanceRank,
    /// Overall funnel conversion for `latest_period`, if that period has a funnel row.
    pub latest_completion_rate: Option<f64>,
}

/// One snapshot per source from its latest basic CVR row, ordered by CVR
/// descending. Sources with equal CVR keep first-seen order.
pub fn summarize(basic_cvr_rows: &[MetricRow]) -> Vec<SummarySnapshot> {
    let mut snapshots: Vec<SummarySnapshot> = Vec::new();
    for row in basic_cvr_rows {
        match snapshots
            .iter_mut()
            .find(|s| s.source_name == row.source_name)
        {
            Some(existing) if row.period > existing.latest_period => *existing = snapshot(row),
            Some(_) => {}
            None => snapshots.push(snapshot(row)),
        }
    }
    snapshots.sort_by(|a, b| b.latest_cvr.total_cmp(&a.latest_cvr));
    snapshots
}

/// Fill `latest_completion_rate` from the funnel row for the same source
/// and period as the snapshot. Left empty when that period has no funnel row.
pub fn attach_funnel_completion(snapshots: &mut [SummarySnapshot], funnel_rows: &[MetricRow]) {
    for snapshot in snapshots.iter_mut() {
        snapshot.latest_completion_rate = funnel_rows
            .iter()
            .find(|r| r.source_name == snapshot.source_name && r.period == snapshot.latest_period)
            .and_then(|r| r.number(fields::OVERALL_CONVERSION_RATE));
    }
}

fn snapshot(row: &MetricRow) -> SummarySnapshot {
    let cvr = row.number(fields::CVR).unwrap_or(0.0);
    SummarySnapshot {
        source_name: row.source_name.clone(),
        source_description: row.source_description.clone(),
        latest_period: row.period.clone(),
        latest_cvr: cvr,
        latest_users: count(row, fields::ACTIVE_USERS),
        latest_conversions: count(row, fields::PURCHASE_USERS),
        performance_rank: PerformanceRank::for_cvr(cvr),
        latest_completion_rate: None,
    }
}

fn count(row: &MetricRow, field: &str) -> u64 {
    row.get(field)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0)
}
