//! Reporting window resolution. Turns a relative request ("last 12 months",
//! "previous quarter") into an explicit inclusive date range.

use chrono::{Datelike, Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{InsightsError, InsightsResult};
use crate::types::{quarter_of, DateRange, Granularity};

/// Which stretch of time a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReportWindow {
    /// From `months` months ago up to today.
    Trailing { months: u32 },
    /// The calendar month or quarter containing today.
    Current,
    /// The calendar month or quarter before the current one.
    Previous,
}

/// Resolves reporting windows relative to a fixed "today".
#[derive(Debug, Clone, Copy)]
pub struct DateRangeResolver {
    today: NaiveDate,
}

impl DateRangeResolver {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Resolver anchored on the local calendar date.
    pub fn today() -> Self {
        Self::new(Local::now().date_naive())
    }

    pub fn resolve(&self, granularity: Granularity, window: ReportWindow) -> InsightsResult<DateRange> {
        match window {
            ReportWindow::Trailing { months } => self.reporting_range(months),
            ReportWindow::Current => period_range(granularity, &self.current_label(granularity)),
            ReportWindow::Previous => period_range(granularity, &self.previous_label(granularity)),
        }
    }

    /// `today - months_back` months through today.
    pub fn reporting_range(&self, months_back: u32) -> InsightsResult<DateRange> {
        if months_back == 0 {
            return Err(InsightsError::Validation(
                "reporting range must cover at least one month".into(),
            ));
        }
        let start = self
            .today
            .checked_sub_months(Months::new(months_back))
            .ok_or_else(|| {
                InsightsError::Validation(format!("{months_back} months back is out of range"))
            })?;
        Ok(DateRange::new(start, self.today))
    }

    pub fn current_label(&self, granularity: Granularity) -> String {
        granularity.label_for(self.today)
    }

    pub fn previous_label(&self, granularity: Granularity) -> String {
        let year = self.today.year();
        match granularity {
            Granularity::Month => {
                let (year, month) = match self.today.month() {
                    1 => (year - 1, 12),
                    m => (year, m - 1),
                };
                format!("{year:04}-{month:02}")
            }
            Granularity::Quarter => {
                let (year, quarter) = match quarter_of(self.today.month()) - 1 {
                    0 => (year - 1, 4),
                    q => (year, q),
                };
                format!("{year:04}-Q{quarter}")
            }
        }
    }
}

/// First and last calendar day of a `YYYY-MM` or `YYYY-Qn` period.
pub fn period_range(granularity: Granularity, label: &str) -> InsightsResult<DateRange> {
    if !granularity.is_valid_period(label) {
        return Err(InsightsError::Validation(format!(
            "'{label}' is not a valid {granularity} period"
        )));
    }
    let invalid = || InsightsError::Validation(format!("'{label}' is not a valid {granularity} period"));
    let year: i32 = label[..4].parse().map_err(|_| invalid())?;
    let (first_month, last_month) = match granularity {
        Granularity::Month => {
            let month: u32 = label[5..].parse().map_err(|_| invalid())?;
            (month, month)
        }
        Granularity::Quarter => {
            let quarter: u32 = label[6..].parse().map_err(|_| invalid())?;
            ((quarter - 1) * 3 + 1, quarter * 3)
        }
    };
    let start = NaiveDate::from_ymd_opt(year, first_month, 1).ok_or_else(invalid)?;
    let end = last_day_of_month(year, last_month).ok_or_else(invalid)?;
    Ok(DateRange::new(start, end))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Reject empty, inverted or overly long ranges.
pub fn validate_range(range: &DateRange, max_days: i64) -> InsightsResult<()> {
    if range.start >= range.end {
        return Err(InsightsError::Validation(format!(
            "start date {} must be before end date {}",
            range.start, range.end
        )));
    }
    if range.num_days() > max_days {
        return Err(InsightsError::Validation(format!(
            "date range {range} spans {} days, limit is {max_days}",
            range.num_days()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_trailing_range() {
        let resolver = DateRangeResolver::new(date(2024, 6, 15));
        let range = resolver
            .resolve(Granularity::Month, ReportWindow::Trailing { months: 12 })
            .unwrap();
        assert_eq!(range.start, date(2023, 6, 15));
        assert_eq!(range.end, date(2024, 6, 15));
    }

    #[test]
    fn test_trailing_range_clamps_short_months() {
        let resolver = DateRangeResolver::new(date(2024, 3, 31));
        let range = resolver.reporting_range(1).unwrap();
        assert_eq!(range.start, date(2024, 2, 29));
    }

    #[test]
    fn test_zero_months_rejected() {
        let resolver = DateRangeResolver::new(date(2024, 3, 31));
        assert!(matches!(
            resolver.reporting_range(0),
            Err(InsightsError::Validation(_))
        ));
    }

    #[test]
    fn test_current_and_previous_month() {
        let resolver = DateRangeResolver::new(date(2024, 3, 10));
        let current = resolver.resolve(Granularity::Month, ReportWindow::Current).unwrap();
        assert_eq!(current, DateRange::new(date(2024, 3, 1), date(2024, 3, 31)));

        let previous = resolver.resolve(Granularity::Month, ReportWindow::Previous).unwrap();
        assert_eq!(previous, DateRange::new(date(2024, 2, 1), date(2024, 2, 29)));
    }

    #[test]
    fn test_previous_month_rolls_over_year() {
        let resolver = DateRangeResolver::new(date(2025, 1, 20));
        assert_eq!(resolver.previous_label(Granularity::Month), "2024-12");
        let range = resolver.resolve(Granularity::Month, ReportWindow::Previous).unwrap();
        assert_eq!(range, DateRange::new(date(2024, 12, 1), date(2024, 12, 31)));
    }

    #[test]
    fn test_quarters() {
        let resolver = DateRangeResolver::new(date(2024, 5, 2));
        assert_eq!(resolver.current_label(Granularity::Quarter), "2024-Q2");
        let current = resolver.resolve(Granularity::Quarter, ReportWindow::Current).unwrap();
        assert_eq!(current, DateRange::new(date(2024, 4, 1), date(2024, 6, 30)));
        let previous = resolver.resolve(Granularity::Quarter, ReportWindow::Previous).unwrap();
        assert_eq!(previous, DateRange::new(date(2024, 1, 1), date(2024, 3, 31)));
    }

    #[test]
    fn test_previous_quarter_rolls_over_year() {
        let resolver = DateRangeResolver::new(date(2024, 2, 14));
        assert_eq!(resolver.previous_label(Granularity::Quarter), "2023-Q4");
        let range = resolver.resolve(Granularity::Quarter, ReportWindow::Previous).unwrap();
        assert_eq!(range, DateRange::new(date(2023, 10, 1), date(2023, 12, 31)));
    }

    #[test]
    fn test_period_range_rejects_bad_labels() {
        assert!(period_range(Granularity::Month, "2024-Q1").is_err());
        assert!(period_range(Granularity::Quarter, "2024-05").is_err());
    }

    #[test]
    fn test_validate_range() {
        let ok = DateRange::new(date(2024, 1, 1), date(2024, 12, 31));
        assert!(validate_range(&ok, 366).is_ok());

        let inverted = DateRange::new(date(2024, 2, 1), date(2024, 1, 1));
        assert!(validate_range(&inverted, 366).is_err());

        let long = DateRange::new(date(2022, 1, 1), date(2024, 1, 1));
        assert!(validate_range(&long, 366).is_err());
    }
}
