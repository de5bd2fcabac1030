//! Joins per-dimension row sets into one record per (period, source).

use std::collections::BTreeMap;

use insights_core::{FieldMap, MetricRow};
use serde::Serialize;
use serde_json::Value;

/// Identity of a unified record. Orders by period, then source name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RecordKey {
    pub period: String,
    pub source_name: String,
}

impl RecordKey {
    pub fn of(row: &MetricRow) -> Self {
        Self {
            period: row.period.clone(),
            source_name: row.source_name.clone(),
        }
    }
}

/// Fields contributed by every dimension for one (period, source).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedRecord {
    pub period: String,
    pub source_name: String,
    pub source_description: String,
    pub fields: FieldMap,
}

impl UnifiedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}

pub type MergedRecords = BTreeMap<RecordKey, UnifiedRecord>;

/// One dimension's rows plus which of their fields to carry over.
#[derive(Debug, Clone, Copy)]
pub struct RowSet<'a> {
    rows: &'a [MetricRow],
    projection: Option<&'a [(&'a str, &'a str)]>,
}

impl<'a> RowSet<'a> {
    /// Carry every field under its own name.
    pub fn all(rows: &'a [MetricRow]) -> Self {
        Self {
            rows,
            projection: None,
        }
    }

    /// Carry only the listed `(row field, record field)` pairs.
    pub fn projected(rows: &'a [MetricRow], projection: &'a [(&'a str, &'a str)]) -> Self {
        Self {
            rows,
            projection: Some(projection),
        }
    }

    fn apply(&self, row: &MetricRow, target: &mut FieldMap) {
        match self.projection {
            None => {
                for (field, value) in &row.fields {
                    target.insert(field.clone(), value.clone());
                }
            }
            Some(pairs) => {
                for (from, to) in pairs {
                    let value = row.fields.get(*from).cloned().unwrap_or(Value::Null);
                    target.insert((*to).to_string(), value);
                }
            }
        }
    }
}

/// Merge row sets into unified records.
///
/// The first set is primary: each of its rows creates (or updates) a
/// record. Later sets only update records that already exist; their rows
/// for unseen keys are dropped. Within a record the last write to a field
/// wins.
pub fn merge(sets: &[RowSet<'_>]) -> MergedRecords {
    let mut records = MergedRecords::new();
    let Some((primary, dependents)) = sets.split_first() else {
        return records;
    };

    for row in primary.rows {
        let record = records
            .entry(RecordKey::of(row))
            .or_insert_with(|| UnifiedRecord {
                period: row.period.clone(),
                source_name: row.source_name.clone(),
                source_description: row.source_description.clone(),
                fields: FieldMap::new(),
            });
        primary.apply(row, &mut record.fields);
    }

    for set in dependents {
        for row in set.rows {
            if let Some(record) = records.get_mut(&RecordKey::of(row)) {
                set.apply(row, &mut record.fields);
            }
        }
    }

    records
}
