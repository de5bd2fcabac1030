//! Report sinks. A sink persists named tables with full-overwrite
//! semantics: `ensure_exists`, then `clear`, then `write`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use insights_core::{InsightsError, InsightsResult};
use serde_json::Value;
use tracing::debug;

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Create the table if it does not exist yet.
    async fn ensure_exists(&self, table: &str) -> InsightsResult<()>;

    /// Remove every row from the table.
    async fn clear(&self, table: &str) -> InsightsResult<()>;

    async fn write(&self, table: &str, headers: &[String], rows: &[Vec<Value>]) -> InsightsResult<()>;
}

/// Writes each table as `<directory>/<table>.csv`.
pub struct CsvDirectorySink {
    directory: PathBuf,
}

impl CsvDirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.directory.join(format!("{table}.csv"))
    }
}

#[async_trait]
impl ReportSink for CsvDirectorySink {
    async fn ensure_exists(&self, table: &str) -> InsightsResult<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| InsightsError::sink(table, e))?;
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.table_path(table))
            .await
            .map_err(|e| InsightsError::sink(table, e))?;
        Ok(())
    }

    async fn clear(&self, table: &str) -> InsightsResult<()> {
        tokio::fs::write(self.table_path(table), b"")
            .await
            .map_err(|e| InsightsError::sink(table, e))
    }

    async fn write(&self, table: &str, headers: &[String], rows: &[Vec<Value>]) -> InsightsResult<()> {
        let path = self.table_path(table);
        debug!(table, rows = rows.len(), path = %path.display(), "Writing CSV table");
        tokio::fs::write(&path, to_csv(headers, rows))
            .await
            .map_err(|e| InsightsError::sink(table, e))
    }
}

/// Render a table as CSV. Strings are always quoted with embedded quotes
/// doubled; nulls become empty cells.
pub fn to_csv(headers: &[String], rows: &[Vec<Value>]) -> String {
    let mut csv = headers
        .iter()
        .map(|h| quote(h))
        .collect::<Vec<_>>()
        .join(",");
    csv.push('\n');
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                Value::String(s) => quote(s),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }
    csv
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_quoting() {
        let headers = vec!["Property".to_string(), "Users".to_string()];
        let rows = vec![
            vec![json!("Inn \"Kaze\", Hakone"), json!(120)],
            vec![Value::Null, json!(0.5)],
        ];
        let csv = to_csv(&headers, &rows);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "\"Property\",\"Users\"");
        assert_eq!(lines[1], "\"Inn \"\"Kaze\"\", Hakone\",120");
        assert_eq!(lines[2], ",0.5");
    }

    #[tokio::test]
    async fn test_directory_sink_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvDirectorySink::new(dir.path().join("reports"));
        let headers = vec!["Period".to_string()];

        sink.ensure_exists("property_cvr").await.unwrap();
        assert!(sink.table_path("property_cvr").exists());

        sink.write("property_cvr", &headers, &[vec![json!("2024-01")], vec![json!("2024-02")]])
            .await
            .unwrap();
        sink.clear("property_cvr").await.unwrap();
        assert_eq!(std::fs::read_to_string(sink.table_path("property_cvr")).unwrap(), "");

        sink.write("property_cvr", &headers, &[vec![json!("2024-03")]])
            .await
            .unwrap();
        let written = std::fs::read_to_string(sink.table_path("property_cvr")).unwrap();
        assert_eq!(written, "\"Period\"\n\"2024-03\"\n");
    }

    #[tokio::test]
    async fn test_ensure_exists_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvDirectorySink::new(dir.path());
        sink.write("t", &["A".to_string()], &[vec![json!(1)]])
            .await
            .unwrap();
        sink.ensure_exists("t").await.unwrap();
        let written = std::fs::read_to_string(sink.table_path("t")).unwrap();
        assert_eq!(written, "\"A\"\n1\n");
    }
}
