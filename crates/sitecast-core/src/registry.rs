//! Scoped resource registry for one synthesis pass.
//!
//! Resources are declared under a construct path rooted at the site name.
//! The registry keeps declaration order, which is also the order the
//! provisioner applies them in.

use std::collections::HashMap;

use resource_layer::{LogicalId, ResourceKind, ResourceSpec, MAX_LOGICAL_ID_LEN};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::domain::{Result, SynthError};
use crate::version::trim_from_start;

/// Width of the path hash appended to every logical id.
pub const PATH_HASH_LEN: usize = 8;

/// Construct-path segment of the shared version-publishing function.
pub const EDGE_VERSION_PROVIDER: &str = "EdgeVersionProvider";

/// Declared resources of a single synthesis scope, keyed by logical id.
#[derive(Debug, Clone, Default)]
pub struct ResourceScope {
    root: String,
    resources: Vec<ResourceSpec>,
    index: HashMap<LogicalId, usize>,
}

impl ResourceScope {
    /// Open a scope rooted at `root` (the site name).
    pub fn new(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        if sanitize(&root).is_empty() {
            return Err(SynthError::Config(format!(
                "scope root '{root}' has no alphanumeric characters"
            )));
        }
        Ok(Self {
            root,
            ..Self::default()
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Deterministic logical id for the construct at `path` below the root.
    ///
    /// Sanitized segments are concatenated and followed by an uppercase
    /// hash of the full `/`-joined path, so paths that sanitize alike
    /// still get distinct ids.
    pub fn logical_id(&self, path: &[&str]) -> Result<LogicalId> {
        let full = std::iter::once(self.root.as_str())
            .chain(path.iter().copied())
            .collect::<Vec<_>>()
            .join("/");

        let readable: String = std::iter::once(self.root.as_str())
            .chain(path.iter().copied())
            .map(sanitize)
            .collect();

        let hash = hex::encode_upper(Sha256::digest(full.as_bytes()));
        let readable = trim_from_start(&readable, MAX_LOGICAL_ID_LEN - PATH_HASH_LEN);
        Ok(LogicalId::new(format!("{readable}{}", &hash[..PATH_HASH_LEN]))?)
    }

    /// Declare a new resource. Fails if the logical id is already taken.
    pub fn declare(&mut self, spec: ResourceSpec) -> Result<&ResourceSpec> {
        if self.index.contains_key(&spec.logical_id) {
            return Err(SynthError::DuplicateLogicalId(spec.logical_id));
        }
        let position = self.resources.len();
        self.index.insert(spec.logical_id.clone(), position);
        self.resources.push(spec);
        Ok(&self.resources[position])
    }

    /// Return the resource under `logical_id`, declaring it with `make` if
    /// it does not exist yet.
    pub fn get_or_declare<F>(&mut self, logical_id: &LogicalId, make: F) -> Result<&ResourceSpec>
    where
        F: FnOnce(&LogicalId) -> ResourceSpec,
    {
        match self.index.get(logical_id) {
            Some(&position) => Ok(&self.resources[position]),
            None => {
                let spec = make(logical_id);
                if &spec.logical_id != logical_id {
                    return Err(SynthError::Config(format!(
                        "declared {} under lookup key {}",
                        spec.logical_id, logical_id
                    )));
                }
                self.declare(spec)
            }
        }
    }

    /// Replace the properties of an already declared resource.
    pub fn update(&mut self, spec: ResourceSpec) -> Result<()> {
        let position = *self
            .index
            .get(&spec.logical_id)
            .ok_or_else(|| SynthError::UnknownUnit(spec.logical_id.clone()))?;
        self.resources[position] = spec;
        Ok(())
    }

    pub fn get(&self, logical_id: &LogicalId) -> Option<&ResourceSpec> {
        self.index.get(logical_id).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, logical_id: &LogicalId) -> bool {
        self.index.contains_key(logical_id)
    }

    /// Declared resources in declaration order.
    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceSpec> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn into_resources(self) -> Vec<ResourceSpec> {
        self.resources
    }
}

/// Declare the shared version-publishing function once per scope.
pub fn edge_version_provider(scope: &mut ResourceScope) -> Result<LogicalId> {
    let id = scope.logical_id(&[EDGE_VERSION_PROVIDER])?;
    scope.get_or_declare(&id, |id| {
        ResourceSpec::new(
            id.clone(),
            ResourceKind::Function,
            json!({
                "description": "Publishes edge function versions",
                "handler": "index.handler",
                "timeout_secs": 900,
            }),
        )
    })?;
    Ok(id)
}

/// Deploy-time reference to an attribute of a declared resource.
pub fn attribute_ref(logical_id: &LogicalId, attribute: &str) -> String {
    format!("${{{logical_id}.{attribute}}}")
}

fn sanitize(segment: &str) -> String {
    segment.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}
