//! Report assembly: merging per-dimension rows, change rates, performance
//! ranking, table formatting and sinks.

pub mod change_rate;
pub mod formatter;
pub mod merger;
pub mod runner;
pub mod sink;
pub mod summary;

pub use change_rate::compute_change_rates;
pub use formatter::{tables, Table};
pub use merger::{merge, MergedRecords, RecordKey, RowSet, UnifiedRecord};
pub use runner::{ReportRunner, RunOutcome, RunRequest, TableWritten};
pub use sink::{CsvDirectorySink, ReportSink};
pub use summary::{summarize, PerformanceRank, SummarySnapshot};
