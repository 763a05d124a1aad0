//! Resource trait definitions for Sitecast
//!
//! These traits define the primitive resource abstractions:
//! - `ResourceProvider`: create/update resources keyed by logical id
//! - `VersionLedger`: track which edge version resource is current
//!
//! All traits are async and backend-agnostic. In-memory implementations
//! live in the `memory` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::ProviderError;
use crate::ProviderResult;

/// Hard ceiling on logical identifier length imposed by the provisioner.
pub const MAX_LOGICAL_ID_LEN: usize = 255;

// ---------------------------------------------------------------------------
// LogicalId
// ---------------------------------------------------------------------------

/// Name under which the provisioner tracks a resource.
///
/// Two applies with the same `LogicalId` update one resource; a different
/// `LogicalId` always means a new resource. Always ASCII alphanumeric and
/// at most [`MAX_LOGICAL_ID_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalId(String);

impl LogicalId {
    /// Validate and wrap a logical identifier.
    pub fn new(id: impl Into<String>) -> ProviderResult<Self> {
        Self::try_from(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<String> for LogicalId {
    type Error = ProviderError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.is_empty()
            || s.len() > MAX_LOGICAL_ID_LEN
            || !s.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ProviderError::InvalidLogicalId(s));
        }
        Ok(LogicalId(s))
    }
}

impl From<LogicalId> for String {
    fn from(id: LogicalId) -> Self {
        id.0
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ContentHash
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of packaged content.
///
/// The inner field is private so the string is always 64 lowercase hex
/// characters produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading `width` hex characters (the whole digest if shorter).
    pub fn prefix(&self, width: usize) -> &str {
        &self.0[..width.min(self.0.len())]
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        self.prefix(12)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ProviderError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProviderError::InvalidContentHash(s));
        }
        Ok(ContentHash(s.to_ascii_lowercase()))
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ResourceProvider
// ---------------------------------------------------------------------------

/// Kind of primitive resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Function,
    FunctionUrl,
    FunctionVersion,
    Queue,
    EventSourceMapping,
    Bucket,
    CachePolicy,
    Distribution,
    Grant,
}

/// Desired state of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub logical_id: LogicalId,
    pub kind: ResourceKind,
    /// Opaque provider properties
    pub properties: serde_json::Value,
}

impl ResourceSpec {
    pub fn new(logical_id: LogicalId, kind: ResourceKind, properties: serde_json::Value) -> Self {
        Self {
            logical_id,
            kind,
            properties,
        }
    }
}

/// What an apply did to the underlying resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// No resource existed under this logical id
    Created,
    /// Resource existed and its properties changed
    Updated,
    /// Resource existed with identical properties
    Unchanged,
}

/// Stored state of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub spec: ResourceSpec,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Primitive resource provisioner.
///
/// Guarantees:
/// - `apply` with an unseen `LogicalId` creates; with a known one updates.
/// - Failures (permission, throttling, limits) are returned, never retried.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Create or update the resource named by `spec.logical_id`.
    async fn apply(&self, spec: &ResourceSpec) -> ProviderResult<ApplyOutcome>;

    /// Fetch the stored record for a logical id, if any.
    async fn get(&self, logical_id: &LogicalId) -> ProviderResult<Option<ResourceRecord>>;

    /// List records, optionally filtered by kind, ordered by logical id.
    async fn list(&self, kind: Option<ResourceKind>) -> ProviderResult<Vec<ResourceRecord>>;
}

// ---------------------------------------------------------------------------
// VersionLedger
// ---------------------------------------------------------------------------

/// Association between an edge unit's content hash and the version
/// resource created for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Base identifier of the version's resource position
    pub position: LogicalId,
    /// Logical id of the version resource (trimmed base + hash suffix)
    pub identifier: LogicalId,
    /// Function the version was published from
    pub function: LogicalId,
    /// Content hash at publication time
    pub content_hash: ContentHash,
    pub created_at: DateTime<Utc>,
}

/// Edge version ledger.
///
/// Semantics:
/// - `record` appends a new current version for a position.
/// - Superseded versions remain in `history`; their resources are left for
///   the provisioner to garbage collect.
#[async_trait]
pub trait VersionLedger: Send + Sync {
    /// Current version record for a position, if any.
    async fn current(&self, position: &LogicalId) -> ProviderResult<Option<VersionRecord>>;

    /// Make `record` the current version for its position.
    async fn record(&self, record: VersionRecord) -> ProviderResult<()>;

    /// All versions for a position (newest first).
    async fn history(&self, position: &LogicalId) -> ProviderResult<Vec<VersionRecord>>;
}
