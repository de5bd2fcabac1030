//! Source registry: the configured analytics properties for a run.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SourcesConfig;
use crate::error::{InsightsError, InsightsResult};
use crate::types::SourceDescriptor;

/// A source entry as written in configuration. Required fields are optional
/// here so that every missing field can be reported at once.
#[derive(Debug, Deserialize)]
struct SourceEntry {
    name: Option<String>,
    #[serde(alias = "dataset")]
    id: Option<String>,
    #[serde(alias = "tablePrefix")]
    table_prefix: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    enabled: bool,
}

/// Ordered, validated set of source descriptors.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    /// Resolve the source list: inline JSON, then the JSON file, then a
    /// single default source.
    pub fn load(config: &SourcesConfig) -> InsightsResult<Self> {
        if let Some(inline) = config.inline.as_deref().filter(|s| !s.trim().is_empty()) {
            debug!("Loading sources from inline configuration");
            return Self::from_json(inline);
        }

        let path = Path::new(&config.file);
        if path.exists() {
            debug!(file = %path.display(), "Loading sources from file");
            let text = std::fs::read_to_string(path).map_err(|e| {
                InsightsError::Config(format!("cannot read {}: {e}", path.display()))
            })?;
            return Self::from_json(&text);
        }

        if let Some(id) = config.default_id.as_deref().filter(|s| !s.is_empty()) {
            info!(id, "No source list configured, using single default source");
            return Self::new(vec![SourceDescriptor {
                name: "Default".to_string(),
                id: id.to_string(),
                table_prefix: config.default_table_prefix.clone(),
                description: "Default event dataset".to_string(),
                enabled: true,
            }]);
        }

        Err(InsightsError::Config(
            "no source configuration found: set sources.inline, sources.file or sources.default_id"
                .into(),
        ))
    }

    /// Parse a JSON array of source entries.
    pub fn from_json(text: &str) -> InsightsResult<Self> {
        let entries: Vec<SourceEntry> = serde_json::from_str(text)
            .map_err(|e| InsightsError::Config(format!("invalid source list: {e}")))?;

        let mut problems = Vec::new();
        let mut sources = Vec::with_capacity(entries.len());
        for (i, entry) in entries.into_iter().enumerate() {
            let name = required(entry.name, i, "name", &mut problems);
            let id = required(entry.id, i, "id", &mut problems);
            let table_prefix = required(entry.table_prefix, i, "table_prefix", &mut problems);
            if let (Some(name), Some(id), Some(table_prefix)) = (name, id, table_prefix) {
                sources.push(SourceDescriptor {
                    name,
                    id,
                    table_prefix,
                    description: entry.description.unwrap_or_default(),
                    enabled: entry.enabled,
                });
            }
        }

        if !problems.is_empty() {
            return Err(InsightsError::Config(problems.join("; ")));
        }
        Self::new(sources)
    }

    /// Build a registry from descriptors, checking that the list is
    /// non-empty, names are unique and storage identifiers are safe to
    /// embed in warehouse queries.
    pub fn new(sources: Vec<SourceDescriptor>) -> InsightsResult<Self> {
        if sources.is_empty() {
            return Err(InsightsError::Config("no sources configured".into()));
        }

        let mut problems = Vec::new();
        let mut seen = HashSet::new();
        for (i, source) in sources.iter().enumerate() {
            if source.name.trim().is_empty() {
                problems.push(format!("sources[{i}].name is not set"));
            } else if !seen.insert(source.name.as_str()) {
                problems.push(format!("sources[{i}].name '{}' is duplicated", source.name));
            }
            if !is_identifier(&source.id) {
                problems.push(format!(
                    "sources[{i}].id '{}' must be non-empty and contain only [A-Za-z0-9_]",
                    source.id
                ));
            }
            if !is_identifier(&source.table_prefix) {
                problems.push(format!(
                    "sources[{i}].table_prefix '{}' must be non-empty and contain only [A-Za-z0-9_]",
                    source.table_prefix
                ));
            }
        }

        if !problems.is_empty() {
            return Err(InsightsError::Config(problems.join("; ")));
        }
        Ok(Self { sources })
    }

    /// Every configured source, enabled or not, in configuration order.
    pub fn all(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Enabled sources in configuration order.
    pub fn enabled_sources(&self) -> Vec<SourceDescriptor> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn required(
    value: Option<String>,
    index: usize,
    field: &str,
    problems: &mut Vec<String>,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            problems.push(format!("sources[{index}].{field} is not set"));
            None
        }
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
