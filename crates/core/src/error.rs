use thiserror::Error;

use crate::types::Dimension;

pub type InsightsResult<T> = Result<T, InsightsError>;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Query error in {dimension} for {}: {error}", .source_name.as_deref().unwrap_or("all sources"))]
    Query {
        dimension: Dimension,
        source_name: Option<String>,
        error: QueryError,
    },

    #[error("Sink error on table {table}: {message}")]
    Sink { table: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl InsightsError {
    pub fn sink(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Sink {
            table: table.into(),
            message: message.to_string(),
        }
    }
}

impl From<config::ConfigError> for InsightsError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// How far a failed metric query reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// The warehouse itself is unusable; every source would fail the same way.
    Dimension,
    /// Only the one source is affected.
    Source,
}

/// Failure reported by a metric query executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials are valid but lack a grant on this source's data.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("query failed: {0}")]
    Execution(String),

    #[error("malformed result: {0}")]
    Decode(String),
}

impl QueryError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            Self::Unauthorized(_) | Self::Transport(_) => ErrorScope::Dimension,
            Self::Forbidden(_) | Self::NotFound(_) | Self::Execution(_) | Self::Decode(_) => {
                ErrorScope::Source
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_scope() {
        assert_eq!(
            QueryError::Unauthorized("bad key".into()).scope(),
            ErrorScope::Dimension
        );
        assert_eq!(
            QueryError::Transport("reset".into()).scope(),
            ErrorScope::Dimension
        );
        assert_eq!(
            QueryError::NotFound("events_*".into()).scope(),
            ErrorScope::Source
        );
        assert_eq!(
            QueryError::Forbidden("not enough privileges".into()).scope(),
            ErrorScope::Source
        );
        assert_eq!(QueryError::Decode("period".into()).scope(), ErrorScope::Source);
    }

    #[test]
    fn test_query_error_display_carries_context() {
        let err = InsightsError::Query {
            dimension: Dimension::TrafficSources,
            source_name: None,
            error: QueryError::Transport("connection refused".into()),
        };
        let text = err.to_string();
        assert!(text.contains("traffic_sources"));
        assert!(text.contains("all sources"));
        assert!(text.contains("connection refused"));
    }
}
