//! Version identity for edge-replicated code.
//!
//! The provisioner decides create-vs-update by logical id, so a version
//! resource is named by its content: a trimmed base identifier followed by
//! a fixed-width hash suffix. Same content, same name, no new resource.
//! Changed content, new name, new resource; the superseded one is left for
//! the provisioner to collect.

use chrono::Utc;
use resource_layer::{
    ContentHash, LogicalId, ResourceKind, ResourceProvider, ResourceSpec, VersionLedger,
    VersionRecord, MAX_LOGICAL_ID_LEN,
};
use serde_json::json;

use crate::domain::digest::content_hash;
use crate::domain::{DeployableUnit, Result};
use crate::obs;

/// Ceiling on a version identifier's length.
pub const MAX_IDENTIFIER_LEN: usize = MAX_LOGICAL_ID_LEN;

/// Width of the content hash suffix.
pub const HASH_SUFFIX_LEN: usize = 32;

/// Keep at most the last `max` characters of `s`.
///
/// Trailing segments of a construct path are the most specific ones, so
/// trimming happens at the start.
pub fn trim_from_start(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    match s.char_indices().nth(count - max) {
        Some((offset, _)) => &s[offset..],
        None => "",
    }
}

/// The fixed-width suffix taken from a content hash.
pub fn hash_suffix(hash: &ContentHash) -> &str {
    hash.prefix(HASH_SUFFIX_LEN)
}

/// Build `trim_from_start(base) + suffix`, never longer than
/// [`MAX_IDENTIFIER_LEN`].
pub fn derive_identifier(base: &LogicalId, hash: &ContentHash) -> Result<LogicalId> {
    let suffix = hash_suffix(hash);
    let base = trim_from_start(base.as_str(), MAX_IDENTIFIER_LEN - suffix.len());
    Ok(LogicalId::new(format!("{base}{suffix}"))?)
}

/// Content hash of a unit's version-relevant configuration.
pub fn unit_content_hash(unit: &DeployableUnit) -> Result<ContentHash> {
    content_hash(&unit.version_config()?)
}

/// Outcome of [`compute_version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionDecision {
    /// Existing record still matches the content
    Reuse(VersionRecord),
    /// Content changed (or first publication); a new resource is needed
    Create(VersionRecord),
}

impl VersionDecision {
    pub fn record(&self) -> &VersionRecord {
        match self {
            VersionDecision::Reuse(r) | VersionDecision::Create(r) => r,
        }
    }

    pub fn into_record(self) -> VersionRecord {
        match self {
            VersionDecision::Reuse(r) | VersionDecision::Create(r) => r,
        }
    }

    pub fn is_reuse(&self) -> bool {
        matches!(self, VersionDecision::Reuse(_))
    }
}

/// Decide whether `unit` needs a new version at position `base`.
///
/// Pure: touches neither the provider nor the ledger.
pub fn compute_version(
    unit: &DeployableUnit,
    base: &LogicalId,
    existing: Option<&VersionRecord>,
) -> Result<VersionDecision> {
    let hash = unit_content_hash(unit)?;
    let suffix = hash_suffix(&hash);

    if let Some(existing) = existing {
        if existing.identifier.as_str().ends_with(suffix) {
            return Ok(VersionDecision::Reuse(existing.clone()));
        }
    }

    let identifier = derive_identifier(base, &hash)?;
    Ok(VersionDecision::Create(VersionRecord {
        position: base.clone(),
        identifier,
        function: unit.logical_id.clone(),
        content_hash: hash,
        created_at: Utc::now(),
    }))
}

/// Resource spec of the version resource a record names.
pub fn version_resource(record: &VersionRecord) -> ResourceSpec {
    ResourceSpec::new(
        record.identifier.clone(),
        ResourceKind::FunctionVersion,
        json!({
            "function": record.function,
            "content_hash": record.content_hash,
        }),
    )
}

/// Publish `unit` at position `base`, reusing the current version when
/// its content is unchanged.
///
/// Provider errors are returned unmodified and leave the ledger untouched.
pub async fn publish_version(
    provider: &dyn ResourceProvider,
    ledger: &dyn VersionLedger,
    unit: &DeployableUnit,
    base: &LogicalId,
) -> Result<VersionRecord> {
    let existing = ledger.current(base).await?;

    match compute_version(unit, base, existing.as_ref())? {
        VersionDecision::Reuse(record) => {
            obs::emit_version_reused(&unit.logical_id, &record.identifier);
            Ok(record)
        }
        VersionDecision::Create(record) => {
            provider.apply(&version_resource(&record)).await?;
            ledger.record(record.clone()).await?;
            obs::emit_version_created(
                &unit.logical_id,
                &record.identifier,
                record.content_hash.short(),
            );
            Ok(record)
        }
    }
}
