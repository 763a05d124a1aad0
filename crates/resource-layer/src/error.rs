//! Error types for resource-layer

use thiserror::Error;

/// Errors raised by the primitive resource layer.
///
/// Synthesis never retries these; they are handed back to the caller as-is.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Caller is not allowed to create or update the resource
    #[error("Permission denied for {logical_id}: {message}")]
    PermissionDenied { logical_id: String, message: String },

    /// Control plane throttled the request
    #[error("Request throttled while applying {logical_id}")]
    Throttled { logical_id: String },

    /// Account or service quota exhausted
    #[error("Resource limit exceeded: {0}")]
    LimitExceeded(String),

    /// Resource properties rejected by the control plane
    #[error("Malformed payload for {logical_id}: {message}")]
    MalformedPayload { logical_id: String, message: String },

    /// Logical identifier does not satisfy naming rules
    #[error("Invalid logical id: {0}")]
    InvalidLogicalId(String),

    /// Digest string is not 64-char hex
    #[error("Invalid content hash: {0}")]
    InvalidContentHash(String),

    /// Queue operation failed
    #[error("Queue operation failed: {0}")]
    Queue(String),

    /// Local state could not be read or written
    #[error("State IO failed: {0}")]
    Io(#[from] std::io::Error),

    /// Local state could not be (de)serialized
    #[error("State serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Logical identifier the failure concerns, when there is one.
    pub fn logical_id(&self) -> Option<&str> {
        match self {
            ProviderError::PermissionDenied { logical_id, .. }
            | ProviderError::Throttled { logical_id }
            | ProviderError::MalformedPayload { logical_id, .. } => Some(logical_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_display() {
        let err = ProviderError::PermissionDenied {
            logical_id: "SiteServerFunction".to_string(),
            message: "lambda:PublishVersion".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SiteServerFunction"));
        assert!(msg.contains("lambda:PublishVersion"));
        assert_eq!(err.logical_id(), Some("SiteServerFunction"));
    }

    #[test]
    fn test_limit_exceeded_has_no_logical_id() {
        let err = ProviderError::LimitExceeded("functions per region".to_string());
        assert!(err.logical_id().is_none());
    }
}
