//! The synthesis output handed to the delivery-layer provisioner.

use chrono::{DateTime, Utc};
use resource_layer::{ResourceSpec, VersionRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assets::AssetRule;
use crate::domain::route_table::RouteTable;
use crate::domain::unit::DeployableUnit;
use crate::revalidation::RevalidationPipeline;

/// How the render compute is deployed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Render compute behind a regional invocation endpoint
    #[default]
    Regional,
    /// Render compute replicated to edge locations as a request handler
    EdgeReplicated,
}

impl std::fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyKind::Regional => write!(f, "regional"),
            TopologyKind::EdgeReplicated => write!(f, "edge_replicated"),
        }
    }
}

/// Immutable, fully resolved description of one site deployment.
///
/// Only produced by a completed second synthesis phase: every unit is
/// finalized and every edge association carries a published version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteDescriptor {
    pub(crate) site: String,
    pub(crate) topology: TopologyKind,
    pub(crate) build_id: String,
    pub(crate) synthesis_id: Uuid,
    pub(crate) synthesized_at: DateTime<Utc>,
    pub(crate) route_table: RouteTable,
    pub(crate) revalidation: Option<RevalidationPipeline>,
    pub(crate) units: Vec<DeployableUnit>,
    pub(crate) versions: Vec<VersionRecord>,
    pub(crate) resources: Vec<ResourceSpec>,
    pub(crate) asset_rules: Vec<AssetRule>,
}

impl SiteDescriptor {
    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn topology(&self) -> TopologyKind {
        self.topology
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn synthesis_id(&self) -> Uuid {
        self.synthesis_id
    }

    pub fn synthesized_at(&self) -> DateTime<Utc> {
        self.synthesized_at
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    pub fn revalidation(&self) -> Option<&RevalidationPipeline> {
        self.revalidation.as_ref()
    }

    pub fn units(&self) -> &[DeployableUnit] {
        &self.units
    }

    pub fn unit(&self, logical_id: &resource_layer::LogicalId) -> Option<&DeployableUnit> {
        self.units.iter().find(|u| &u.logical_id == logical_id)
    }

    /// Published edge versions, in publication order.
    pub fn versions(&self) -> &[VersionRecord] {
        &self.versions
    }

    /// Every declared resource in declaration order.
    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn asset_rules(&self) -> &[AssetRule] {
        &self.asset_rules
    }

    pub fn to_json_pretty(&self) -> crate::domain::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
