//! Deferred finalization work collected during the declare phase.
//!
//! Bundle digests do not exist until the build has run, so declaring a
//! unit only records what has to happen to it later. [`FinalizeQueue::run`]
//! consumes the list, in registration order, exactly once.

use std::path::PathBuf;

use bundle_digest::{bundle_size, hash_bundle};
use resource_layer::{ContentHash, LogicalId, ResourceProvider, VersionLedger, VersionRecord};

use crate::domain::{CodePayload, DeployableUnit, Result, SynthError};
use crate::registry::ResourceScope;
use crate::version::{publish_version, version_resource};

/// One unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTask {
    /// Replace the unit's placeholder with the bundle at `bundle`
    PatchCode { unit: LogicalId, bundle: PathBuf },
    /// Publish (or reuse) an edge version of the unit at `position`
    PublishVersion {
        unit: LogicalId,
        position: LogicalId,
    },
}

impl DeferredTask {
    pub fn unit(&self) -> &LogicalId {
        match self {
            DeferredTask::PatchCode { unit, .. }
            | DeferredTask::PublishVersion { unit, .. } => unit,
        }
    }
}

/// Ordered list of deferred tasks.
#[derive(Debug, Clone, Default)]
pub struct FinalizeQueue {
    tasks: Vec<DeferredTask>,
}

impl FinalizeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: DeferredTask) {
        self.tasks.push(task);
    }

    pub fn tasks(&self) -> &[DeferredTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task in registration order.
    ///
    /// Stops at the first error. Returns the version records published or
    /// reused, in task order.
    pub async fn run(
        self,
        units: &mut [DeployableUnit],
        scope: &mut ResourceScope,
        provider: &dyn ResourceProvider,
        ledger: &dyn VersionLedger,
    ) -> Result<Vec<VersionRecord>> {
        let mut versions = Vec::new();

        for task in self.tasks {
            tracing::debug!(?task, "running deferred task");
            match task {
                DeferredTask::PatchCode { unit, bundle } => {
                    let unit = find_unit(units, &unit)?;
                    let code = load_bundle(bundle).await?;
                    unit.finalize_with(code)?;
                    scope.update(unit.to_resource_spec())?;
                }
                DeferredTask::PublishVersion { unit, position } => {
                    let unit = find_unit(units, &unit)?;
                    if !unit.is_finalized() {
                        unit.finalize()?;
                        scope.update(unit.to_resource_spec())?;
                    }
                    let record = publish_version(provider, ledger, unit, &position).await?;
                    scope.get_or_declare(&record.identifier, |_| version_resource(&record))?;
                    versions.push(record);
                }
            }
        }

        Ok(versions)
    }
}

fn find_unit<'a>(
    units: &'a mut [DeployableUnit],
    logical_id: &LogicalId,
) -> Result<&'a mut DeployableUnit> {
    units
        .iter_mut()
        .find(|u| &u.logical_id == logical_id)
        .ok_or_else(|| SynthError::UnknownUnit(logical_id.clone()))
}

/// Hash a bundle off the async runtime.
async fn load_bundle(path: PathBuf) -> Result<CodePayload> {
    let hashed = path.clone();
    let (digest, size_bytes) = tokio::task::spawn_blocking(move || {
        Ok::<_, bundle_digest::BundleError>((hash_bundle(&hashed)?, bundle_size(&hashed)?))
    })
    .await??;

    Ok(CodePayload::Bundle {
        path,
        digest: ContentHash::try_from(digest)?,
        size_bytes,
    })
}
