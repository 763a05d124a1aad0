//! Domain-level error taxonomy for Sitecast.

use resource_layer::{LogicalId, ProviderError};

/// Sitecast synthesis errors.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPathPattern { pattern: String, reason: String },

    #[error("build artifact error: {0}")]
    Artifact(#[from] bundle_digest::BundleError),

    #[error("unit {0} still holds placeholder code")]
    PlaceholderCode(LogicalId),

    #[error("unit {0} is finalized and can no longer be mutated")]
    UnitFinalized(LogicalId),

    #[error("unknown unit: {0}")]
    UnknownUnit(LogicalId),

    #[error("duplicate logical id: {0}")]
    DuplicateLogicalId(LogicalId),

    #[error("edge function {0} has no published version")]
    UnresolvedVersion(LogicalId),

    #[error("regeneration of {url} failed: {message}")]
    Regeneration { url: String, message: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Sitecast domain operations.
pub type Result<T> = std::result::Result<T, SynthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_is_transparent() {
        let inner = ProviderError::Throttled {
            logical_id: "SiteServer".to_string(),
        };
        let expected = inner.to_string();
        let err: SynthError = inner.into();
        assert_eq!(err.to_string(), expected);
        assert!(matches!(
            err,
            SynthError::Provider(ProviderError::Throttled { .. })
        ));
    }

    #[test]
    fn test_invalid_path_pattern_display() {
        let err = SynthError::InvalidPathPattern {
            pattern: "api /*".to_string(),
            reason: "contains whitespace".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("api /*"));
        assert!(msg.contains("whitespace"));
    }
}
