use serde::Deserialize;

use crate::error::InsightsResult;

/// Immutable settings for one reporting run. Loaded once from environment
/// variables with the prefix `PROPERTY_INSIGHTS__` and an optional TOML file,
/// then passed by reference to every component.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_url")]
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Where the source list comes from. Resolution order: `inline`, then
/// `file` if it exists, then a single source built from `default_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// JSON array of source descriptors.
    #[serde(default)]
    pub inline: Option<String>,
    #[serde(default = "default_sources_file")]
    pub file: String,
    #[serde(default)]
    pub default_id: Option<String>,
    #[serde(default = "default_table_prefix")]
    pub default_table_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_months_back")]
    pub months_back: u32,
    #[serde(default = "default_max_range_days")]
    pub max_range_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,
}

// Default functions
fn default_warehouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_sources_file() -> String {
    "config/sources.json".to_string()
}
fn default_table_prefix() -> String {
    "events_".to_string()
}
fn default_months_back() -> u32 {
    12
}
fn default_max_range_days() -> i64 {
    366
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_output_directory() -> String {
    "reports".to_string()
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            url: default_warehouse_url(),
            user: None,
            password: None,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            inline: None,
            file: default_sources_file(),
            default_id: None,
            default_table_prefix: default_table_prefix(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            months_back: default_months_back(),
            max_range_days: default_max_range_days(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warehouse: WarehouseConfig::default(),
            sources: SourcesConfig::default(),
            report: ReportConfig::default(),
            query: QueryConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load configuration from environment variables and the optional config
    /// file named by `PROPERTY_INSIGHTS_CONFIG` (default `config/insights`).
    pub fn load() -> InsightsResult<Self> {
        let file = std::env::var("PROPERTY_INSIGHTS_CONFIG")
            .unwrap_or_else(|_| "config/insights".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix("PROPERTY_INSIGHTS")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from TOML text, without consulting the environment.
    pub fn from_toml(text: &str) -> InsightsResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.warehouse.url, "http://localhost:8123");
        assert_eq!(config.sources.file, "config/sources.json");
        assert_eq!(config.sources.default_table_prefix, "events_");
        assert_eq!(config.report.months_back, 12);
        assert_eq!(config.query.max_attempts, 3);
        assert_eq!(config.output.directory, "reports");
    }

    #[test]
    fn test_from_toml_overrides_and_fills_defaults() {
        let config = RunConfig::from_toml(
            r#"
            [warehouse]
            url = "http://warehouse:8123"
            user = "reporter"

            [sources]
            default_id = "hakone_ga4"

            [report]
            months_back = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.warehouse.url, "http://warehouse:8123");
        assert_eq!(config.warehouse.user.as_deref(), Some("reporter"));
        assert_eq!(config.sources.default_id.as_deref(), Some("hakone_ga4"));
        assert_eq!(config.sources.default_table_prefix, "events_");
        assert_eq!(config.report.months_back, 6);
        assert_eq!(config.report.max_range_days, 366);
        assert_eq!(config.query.initial_backoff_ms, 1000);
    }
}
