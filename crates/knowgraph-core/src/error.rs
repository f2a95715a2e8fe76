//! Error types for knowgraph

use thiserror::Error;

/// Result type alias using knowgraph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Knowledge graph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Graph errors (E001-E099)
    #[error("Node '{0}' not found in this workspace.")]
    NodeNotFound(String),

    #[error("Edge '{0}' not found in this workspace.")]
    EdgeNotFound(String),

    #[error("Invalid edge strength {0}: strength must lie within [0.0, 1.0].")]
    InvalidStrength(f32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding dimension mismatch: workspace uses {expected}, provider returned {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    // Embedding provider errors (E100-E199)
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Network error: {0}. Check that the embedding endpoint is reachable.")]
    NetworkError(#[from] reqwest::Error),

    // Store errors (E200-E299)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Failed to decode {record} record: {reason}")]
    Decode { record: &'static str, reason: String },

    // Deadline errors (E300-E399)
    #[error("Operation '{0}' exceeded its deadline")]
    Timeout(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a decode error for a malformed store record
    pub fn decode(record: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            record,
            reason: reason.to_string(),
        }
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "E001",
            Self::EdgeNotFound(_) => "E002",
            Self::InvalidStrength(_) => "E010",
            Self::InvalidInput(_) => "E011",
            Self::DimensionMismatch { .. } => "E012",
            Self::EmbeddingFailed(_) => "E100",
            Self::NetworkError(_) => "E101",
            Self::DatabaseError(_) => "E200",
            Self::Decode { .. } => "E201",
            Self::Timeout(_) => "E300",
            Self::ConfigError(_) => "E600",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NodeNotFound(_) => {
                Some("Create both endpoint nodes before connecting them".to_string())
            }
            Self::InvalidStrength(_) => Some("Use a strength between 0.0 and 1.0".to_string()),
            Self::DimensionMismatch { expected, .. } => Some(format!(
                "Configure the embedding provider to emit {} dimensions for this workspace",
                expected
            )),
            Self::EmbeddingFailed(_) | Self::NetworkError(_) => {
                Some("Check the embedding provider configuration and API key".to_string())
            }
            Self::Decode { .. } => Some("Run migrations or purge the corrupted record".to_string()),
            Self::Timeout(_) => Some("Increase the configured timeout".to_string()),
            _ => None,
        }
    }

    /// Whether this error originated in the embedding provider
    pub fn is_embedding_failure(&self) -> bool {
        matches!(self, Self::EmbeddingFailed(_) | Self::NetworkError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NodeNotFound("n1".into()).code(), "E001");
        assert_eq!(Error::InvalidStrength(1.5).code(), "E010");
        assert_eq!(Error::EmbeddingFailed("boom".into()).code(), "E100");
        assert_eq!(Error::decode("node", "bad version").code(), "E201");
        assert_eq!(Error::Other("x".into()).code(), "E9999");
    }

    #[test]
    fn test_error_messages() {
        let err = Error::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("768"));

        let err = Error::decode("edge", "unknown relationship 'FOO'");
        assert_eq!(
            err.to_string(),
            "Failed to decode edge record: unknown relationship 'FOO'"
        );
    }

    #[test]
    fn test_suggestions() {
        assert!(Error::InvalidStrength(-0.1).suggestion().is_some());
        assert!(Error::Other("x".into()).suggestion().is_none());
        assert!(Error::EmbeddingFailed("x".into()).is_embedding_failure());
        assert!(!Error::NodeNotFound("x".into()).is_embedding_failure());
    }
}
