//! JSON snapshot of local provider state.
//!
//! Lets a local run pick up where the previous one left off: the resource
//! records decide create-vs-update, the version records decide whether an
//! edge version is reused.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::memory::{MemoryResourceProvider, MemoryVersionLedger};
use crate::resource_traits::{ResourceRecord, VersionRecord};
use crate::ProviderResult;

/// Serializable contents of a [`MemoryResourceProvider`] and
/// [`MemoryVersionLedger`] pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub resources: Vec<ResourceRecord>,
    pub versions: Vec<VersionRecord>,
}

impl StateSnapshot {
    /// Read a snapshot from `path`. A missing file yields an empty snapshot.
    pub fn load(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no state file, starting empty");
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write the snapshot to `path` atomically (temp file + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> ProviderResult<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(self)?)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Capture the current contents of a provider/ledger pair.
    pub fn capture(provider: &MemoryResourceProvider, ledger: &MemoryVersionLedger) -> Self {
        Self {
            resources: provider.records(),
            versions: ledger.all_records(),
        }
    }

    /// Rebuild a provider/ledger pair from this snapshot.
    pub fn into_parts(self) -> (MemoryResourceProvider, MemoryVersionLedger) {
        (
            MemoryResourceProvider::with_records(self.resources),
            MemoryVersionLedger::with_records(self.versions),
        )
    }
}
