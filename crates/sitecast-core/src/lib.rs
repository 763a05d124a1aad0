//! Sitecast Core Library
//!
//! Compiles a built hybrid web application into a deployment descriptor:
//! render compute, a delivery-layer route table with per-class cache
//! contracts, a background revalidation pipeline, and content-addressed
//! versions for edge-replicated code.

pub mod assets;
pub mod config;
pub mod domain;
pub mod finalize;
pub mod image;
pub mod obs;
pub mod registry;
pub mod revalidation;
pub mod routes;
pub mod synth;
pub mod telemetry;
pub mod version;

pub use domain::{
    AllowedMethods, Architecture, Behavior, CachePolicy, CachedMethods, CodePayload,
    DeployableUnit, EdgeEventType, EdgeFunctionAssociation, FunctionUrlAuth, Origin, PathPattern,
    Permission, Placement, Result, RouteTable, Runtime, SiteDescriptor, SynthError, TopologyKind,
    ViewerProtocolPolicy,
};

pub use assets::{asset_rules, classify_asset, route_class, ArtifactSource, AssetRule, ContentClass};
pub use config::{ImageConfig, RevalidationConfig, ServerConfig, SiteConfig};
pub use finalize::{DeferredTask, FinalizeQueue};
pub use image::{build_image_behavior, ImageTransformPath};
pub use registry::{edge_version_provider, ResourceScope};
pub use revalidation::{
    drain_once, enqueue, wire_revalidation, DrainReport, PageRegenerator, RevalidationMessage,
    RevalidationPipeline, WiredRevalidation,
};
pub use routes::{build_route_table, DefaultBehaviorOverride, RouteOverrides, ServerTopology};
pub use synth::{provision, synthesize, DeclaredSite, ProvisionReport, SiteSynthesizer};
pub use telemetry::init_tracing;
pub use version::{
    compute_version, derive_identifier, publish_version, trim_from_start, VersionDecision,
};

pub use bundle_digest::BuildOutput;
pub use resource_layer::{ContentHash, LogicalId, VersionRecord};
