//! Deployable compute units.

use std::collections::BTreeMap;
use std::path::PathBuf;

use resource_layer::{ContentHash, LogicalId, ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::error::{Result, SynthError};

/// Function runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    Nodejs18x,
    Nodejs20x,
}

/// Instruction set the unit is built for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    #[default]
    X86_64,
    Arm64,
}

/// Where the unit executes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Single regional endpoint
    Regional,
    /// Replicated to delivery-layer edge locations
    Edge,
}

/// The code a unit ships.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodePayload {
    /// Declared before the build exists; patched during finalization
    Placeholder,
    /// Source known at declaration time
    Inline { source: String },
    /// Packaged build artifact
    Bundle {
        path: PathBuf,
        digest: ContentHash,
        size_bytes: u64,
    },
}

impl CodePayload {
    /// Content fingerprint of the payload; `None` for a placeholder.
    pub fn digest(&self) -> Option<ContentHash> {
        match self {
            CodePayload::Placeholder => None,
            CodePayload::Inline { source } => Some(ContentHash::from_bytes(source.as_bytes())),
            CodePayload::Bundle { digest, .. } => Some(digest.clone()),
        }
    }
}

/// A permission statement bound to a unit's role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl Permission {
    pub fn new(actions: &[&str], resources: Vec<String>) -> Self {
        Self {
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
        }
    }
}

/// A code bundle plus everything needed to run it.
///
/// Only the environment and permissions may change after creation, and
/// only until [`finalize`](Self::finalize) is called.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployableUnit {
    pub logical_id: LogicalId,
    pub description: String,
    pub code: CodePayload,
    pub handler: String,
    pub runtime: Runtime,
    pub architecture: Architecture,
    pub placement: Placement,
    environment: BTreeMap<String, String>,
    pub memory_mb: u32,
    pub timeout_secs: u32,
    permissions: Vec<Permission>,
    finalized: bool,
}

impl DeployableUnit {
    /// Create a regional unit with placeholder code.
    pub fn new(logical_id: LogicalId, description: impl Into<String>) -> Self {
        Self {
            logical_id,
            description: description.into(),
            code: CodePayload::Placeholder,
            handler: "index.handler".to_string(),
            runtime: Runtime::Nodejs18x,
            architecture: Architecture::default(),
            placement: Placement::Regional,
            environment: BTreeMap::new(),
            memory_mb: 1024,
            timeout_secs: 10,
            permissions: Vec::new(),
            finalized: false,
        }
    }

    pub fn with_memory(mut self, memory_mb: u32) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_code(mut self, code: CodePayload) -> Self {
        self.code = code;
        self
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Set an environment value.
    pub fn add_environment(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.environment.insert(key.into(), value.into());
        Ok(())
    }

    /// Bind a permission to the unit's role.
    pub fn grant(&mut self, permission: Permission) -> Result<()> {
        self.ensure_mutable()?;
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
        Ok(())
    }

    /// Replace the placeholder with the real payload and freeze the unit.
    pub fn finalize_with(&mut self, code: CodePayload) -> Result<()> {
        self.ensure_mutable()?;
        self.code = code;
        self.finalize()
    }

    /// Freeze the unit. Code must no longer be a placeholder.
    pub fn finalize(&mut self) -> Result<()> {
        if self.code == CodePayload::Placeholder {
            return Err(SynthError::PlaceholderCode(self.logical_id.clone()));
        }
        self.finalized = true;
        Ok(())
    }

    /// The configuration that identifies a published version of this unit.
    ///
    /// Permissions are excluded: they live on the role, not the version.
    pub fn version_config(&self) -> Result<serde_json::Value> {
        let code = self
            .code
            .digest()
            .ok_or_else(|| SynthError::PlaceholderCode(self.logical_id.clone()))?;
        Ok(json!({
            "code": code.as_str(),
            "handler": self.handler,
            "runtime": self.runtime,
            "architecture": self.architecture,
            "environment": self.environment,
            "memory_mb": self.memory_mb,
            "timeout_secs": self.timeout_secs,
            "description": self.description,
        }))
    }

    /// Function resource spec carrying the unit's full configuration.
    pub fn to_resource_spec(&self) -> ResourceSpec {
        ResourceSpec::new(
            self.logical_id.clone(),
            ResourceKind::Function,
            json!({
                "description": self.description,
                "code": self.code,
                "handler": self.handler,
                "runtime": self.runtime,
                "architecture": self.architecture,
                "placement": self.placement,
                "environment": self.environment,
                "memory_mb": self.memory_mb,
                "timeout_secs": self.timeout_secs,
                "permissions": self.permissions,
            }),
        )
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.finalized {
            return Err(SynthError::UnitFinalized(self.logical_id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> DeployableUnit {
        DeployableUnit::new(LogicalId::new("SiteServer").unwrap(), "render")
    }

    #[test]
    fn test_environment_frozen_after_finalize() {
        let mut u = unit();
        u.add_environment("A", "1").unwrap();
        u.finalize_with(CodePayload::Inline {
            source: "x".to_string(),
        })
        .unwrap();

        assert!(matches!(
            u.add_environment("B", "2"),
            Err(SynthError::UnitFinalized(_))
        ));
        assert_eq!(u.environment().len(), 1);
    }

    #[test]
    fn test_finalize_rejects_placeholder() {
        let mut u = unit();
        assert!(matches!(u.finalize(), Err(SynthError::PlaceholderCode(_))));
        assert!(!u.is_finalized());
    }

    #[test]
    fn test_version_config_requires_code() {
        assert!(unit().version_config().is_err());
    }

    #[test]
    fn test_grant_is_idempotent() {
        let mut u = unit();
        let p = Permission::new(&["s3:GetObject"], vec!["arn:aws:s3:::b/*".to_string()]);
        u.grant(p.clone()).unwrap();
        u.grant(p).unwrap();
        assert_eq!(u.permissions().len(), 1);
    }

    #[test]
    fn test_version_config_tracks_environment() {
        let code = CodePayload::Inline {
            source: "x".to_string(),
        };
        let mut a = unit().with_code(code.clone());
        let b = unit().with_code(code);
        a.add_environment("K", "V").unwrap();
        assert_ne!(a.version_config().unwrap(), b.version_config().unwrap());
    }
}
