//! Domain models for Sitecast.
//!
//! Canonical definitions for the core entities:
//! - `DeployableUnit`: a code bundle plus its runtime configuration
//! - `Behavior` / `RouteTable`: path classes mapped to origins and cache contracts
//! - `SiteDescriptor`: the immutable synthesis output

pub mod behavior;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod route_table;
pub mod unit;

// Re-export main types and errors
pub use behavior::{
    AllowedMethods, Behavior, CachePolicy, CachedMethods, EdgeEventType, EdgeFunctionAssociation,
    FunctionUrlAuth, Origin, ViewerProtocolPolicy,
};
pub use descriptor::{SiteDescriptor, TopologyKind};
pub use error::{Result, SynthError};
pub use route_table::{PathPattern, RouteTable};
pub use unit::{Architecture, CodePayload, DeployableUnit, Permission, Placement, Runtime};
