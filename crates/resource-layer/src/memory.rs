//! In-memory implementations of the resource traits
//!
//! Provides `MemoryResourceProvider` and `MemoryVersionLedger` that satisfy
//! the trait contracts without any external service. Used by tests and by
//! the CLI's local state mode (see [`crate::state`]).

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ProviderError;
use crate::resource_traits::*;
use crate::ProviderResult;

// ---------------------------------------------------------------------------
// MemoryResourceProvider
// ---------------------------------------------------------------------------

/// In-memory provisioner backed by a `BTreeMap<LogicalId, ResourceRecord>`.
///
/// Failures can be injected per logical id with [`fail_on`](Self::fail_on);
/// an injected failure fires once and leaves the store untouched.
#[derive(Debug, Default)]
pub struct MemoryResourceProvider {
    records: Mutex<BTreeMap<LogicalId, ResourceRecord>>,
    failures: Mutex<HashMap<LogicalId, ProviderError>>,
    applies: Mutex<Vec<(LogicalId, ApplyOutcome)>>,
}

impl MemoryResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the provider with previously stored records.
    pub fn with_records(records: impl IntoIterator<Item = ResourceRecord>) -> Self {
        let provider = Self::new();
        {
            let mut store = provider.records.lock().unwrap();
            for record in records {
                store.insert(record.spec.logical_id.clone(), record);
            }
        }
        provider
    }

    /// Make the next apply of `logical_id` fail with `error`.
    pub fn fail_on(&self, logical_id: LogicalId, error: ProviderError) {
        self.failures.lock().unwrap().insert(logical_id, error);
    }

    /// Every apply so far, in call order.
    pub fn apply_log(&self) -> Vec<(LogicalId, ApplyOutcome)> {
        self.applies.lock().unwrap().clone()
    }

    /// Number of applies that created a resource.
    pub fn created_count(&self) -> usize {
        self.applies
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, o)| *o == ApplyOutcome::Created)
            .count()
    }

    /// Snapshot of all stored records, ordered by logical id.
    pub fn records(&self) -> Vec<ResourceRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl ResourceProvider for MemoryResourceProvider {
    async fn apply(&self, spec: &ResourceSpec) -> ProviderResult<ApplyOutcome> {
        if let Some(err) = self.failures.lock().unwrap().remove(&spec.logical_id) {
            return Err(err);
        }

        let now = Utc::now();
        let mut records = self.records.lock().unwrap();
        let outcome = match records.get_mut(&spec.logical_id) {
            Some(existing) if existing.spec == *spec => ApplyOutcome::Unchanged,
            Some(existing) => {
                existing.spec = spec.clone();
                existing.updated_at = now;
                ApplyOutcome::Updated
            }
            None => {
                records.insert(
                    spec.logical_id.clone(),
                    ResourceRecord {
                        spec: spec.clone(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                ApplyOutcome::Created
            }
        };
        drop(records);

        tracing::debug!(logical_id = %spec.logical_id, ?outcome, "resource applied");
        self.applies
            .lock()
            .unwrap()
            .push((spec.logical_id.clone(), outcome));
        Ok(outcome)
    }

    async fn get(&self, logical_id: &LogicalId) -> ProviderResult<Option<ResourceRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(logical_id).cloned())
    }

    async fn list(&self, kind: Option<ResourceKind>) -> ProviderResult<Vec<ResourceRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|r| kind.map(|k| r.spec.kind == k).unwrap_or(true))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryVersionLedger
// ---------------------------------------------------------------------------

/// In-memory version ledger backed by a `HashMap<position, Vec<VersionRecord>>`.
///
/// Each position maps to its full version history (newest last internally).
#[derive(Debug, Default)]
pub struct MemoryVersionLedger {
    versions: Mutex<HashMap<LogicalId, Vec<VersionRecord>>>,
}

impl MemoryVersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the ledger with records in oldest-first order.
    pub fn with_records(records: impl IntoIterator<Item = VersionRecord>) -> Self {
        let ledger = Self::new();
        {
            let mut versions = ledger.versions.lock().unwrap();
            for record in records {
                versions
                    .entry(record.position.clone())
                    .or_default()
                    .push(record);
            }
        }
        ledger
    }

    /// Every record across all positions, oldest first within a position.
    pub fn all_records(&self) -> Vec<VersionRecord> {
        let versions = self.versions.lock().unwrap();
        let mut positions: Vec<_> = versions.keys().cloned().collect();
        positions.sort();
        positions
            .iter()
            .flat_map(|p| versions[p].iter().cloned())
            .collect()
    }
}

#[async_trait]
impl VersionLedger for MemoryVersionLedger {
    async fn current(&self, position: &LogicalId) -> ProviderResult<Option<VersionRecord>> {
        let versions = self.versions.lock().unwrap();
        Ok(versions.get(position).and_then(|h| h.last().cloned()))
    }

    async fn record(&self, record: VersionRecord) -> ProviderResult<()> {
        let mut versions = self.versions.lock().unwrap();
        versions
            .entry(record.position.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn history(&self, position: &LogicalId) -> ProviderResult<Vec<VersionRecord>> {
        let versions = self.versions.lock().unwrap();
        let mut history = versions.get(position).cloned().unwrap_or_default();
        history.reverse(); // newest first
        Ok(history)
    }
}
