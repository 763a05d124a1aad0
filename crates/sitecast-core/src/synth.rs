//! Two-phase site synthesis.
//!
//! Phase 1 ([`SiteSynthesizer::declare`]) runs before the build exists. It
//! declares every resource, with placeholder code wherever a bundle is
//! needed, and queues the deferred work. Phase 2
//! ([`DeclaredSite::finalize`]) runs once the artifacts are on disk. It
//! patches in the real bundles, publishes edge versions and freezes the
//! result into a [`SiteDescriptor`].

use std::collections::HashMap;
use std::time::Instant;

use bundle_digest::BuildOutput;
use chrono::Utc;
use resource_layer::{
    ApplyOutcome, LogicalId, ResourceKind, ResourceProvider, ResourceSpec, VersionLedger,
};
use serde::Serialize;
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use crate::assets::{asset_rules, CACHE_KEY_PREFIX};
use crate::config::SiteConfig;
use crate::domain::{
    DeployableUnit, FunctionUrlAuth, Permission, Placement, Result, RouteTable, SiteDescriptor,
    SynthError,
};
use crate::finalize::{DeferredTask, FinalizeQueue};
use crate::image::build_image_behavior;
use crate::obs;
use crate::registry::{edge_version_provider, ResourceScope};
use crate::revalidation::{wire_revalidation, RevalidationPipeline};
use crate::routes::{build_route_table, ServerTopology};

/// Cache bucket name injected into render compute.
pub const CACHE_BUCKET_NAME_ENV: &str = "CACHE_BUCKET_NAME";
/// Cache key prefix injected into render compute.
pub const CACHE_BUCKET_KEY_PREFIX_ENV: &str = "CACHE_BUCKET_KEY_PREFIX";
/// Cache bucket region injected into render compute.
pub const CACHE_BUCKET_REGION_ENV: &str = "CACHE_BUCKET_REGION";

/// Entry point of a synthesis pass over a validated config.
#[derive(Debug, Clone)]
pub struct SiteSynthesizer {
    config: SiteConfig,
}

impl SiteSynthesizer {
    pub fn new(config: SiteConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Phase 1: declare everything. Does not touch `output` on disk.
    pub fn declare(&self, output: &BuildOutput) -> Result<DeclaredSite> {
        let config = &self.config;
        let synthesis_id = Uuid::new_v4();
        let _span = obs::SynthSpan::enter(&config.name, &synthesis_id);
        let started = Instant::now();
        obs::emit_synth_started(&config.name, config.topology);

        let mut scope = ResourceScope::new(&config.name)?;
        let mut tasks = FinalizeQueue::new();
        let mut units = Vec::new();

        let bucket = scope.logical_id(&["AssetBucket"])?;
        scope.declare(ResourceSpec::new(
            bucket,
            ResourceKind::Bucket,
            json!({ "bucket": config.bucket, "region": config.region }),
        ))?;

        let mut server = self.server_unit(&scope)?;

        let revalidation = if config.revalidation.enabled {
            match wire_revalidation(
                &mut scope,
                Some(&mut server),
                &config.revalidation,
                &config.region,
            )? {
                Some(wired) => {
                    tasks.push(DeferredTask::PatchCode {
                        unit: wired.consumer.logical_id.clone(),
                        bundle: output.revalidation_bundle.clone(),
                    });
                    units.push(wired.consumer);
                    Some(wired.pipeline)
                }
                None => None,
            }
        } else {
            None
        };

        scope.declare(server.to_resource_spec())?;
        tasks.push(DeferredTask::PatchCode {
            unit: server.logical_id.clone(),
            bundle: output.server_bundle.clone(),
        });

        let topology = match server.placement {
            Placement::Regional => {
                let url = scope.logical_id(&["ServerFunction", "Url"])?;
                scope.declare(ResourceSpec::new(
                    url,
                    ResourceKind::FunctionUrl,
                    json!({ "function": server.logical_id, "auth": FunctionUrlAuth::None }),
                ))?;
                ServerTopology::Regional {
                    server: server.logical_id.clone(),
                }
            }
            Placement::Edge => {
                edge_version_provider(&mut scope)?;
                tasks.push(DeferredTask::PublishVersion {
                    unit: server.logical_id.clone(),
                    position: scope.logical_id(&["ServerFunction", "Version"])?,
                });
                ServerTopology::EdgeReplicated {
                    server: server.logical_id.clone(),
                    bucket: config.bucket.clone(),
                }
            }
        };
        units.insert(0, server);

        let image = if topology.supports_image_route() {
            let path = build_image_behavior(&mut scope, &config.image, &config.bucket)?;
            tasks.push(DeferredTask::PatchCode {
                unit: path.unit.logical_id.clone(),
                bundle: output.image_bundle.clone(),
            });
            units.push(path.unit);
            if let Some(signer) = path.signer {
                tasks.push(DeferredTask::PublishVersion {
                    unit: signer.logical_id.clone(),
                    position: scope.logical_id(&["ImageFunction", "Signer", "Version"])?,
                });
                units.push(signer);
            }
            Some(path.behavior)
        } else {
            None
        };

        let route_table = build_route_table(&topology, image.as_ref(), &config.routes)?;

        // Behaviors share a policy resource by name, so one name must carry
        // one set of settings.
        let behaviors =
            std::iter::once(route_table.default_behavior()).chain(route_table.behaviors());
        for behavior in behaviors {
            let policy = &behavior.cache_policy;
            let properties = json!(policy);
            let id = scope.logical_id(&["CachePolicy", policy.name.as_str()])?;
            let declared = scope.get_or_declare(&id, |id| {
                ResourceSpec::new(id.clone(), ResourceKind::CachePolicy, properties.clone())
            })?;
            if declared.properties != properties {
                return Err(SynthError::Config(format!(
                    "cache policy '{}' is declared with conflicting settings",
                    policy.name
                )));
            }
        }

        let distribution = scope.logical_id(&["Distribution"])?;
        scope.declare(distribution_spec(&distribution, &route_table))?;

        obs::emit_phase_completed(
            &config.name,
            "declare",
            scope.len(),
            started.elapsed().as_millis() as u64,
        );

        Ok(DeclaredSite {
            config: config.clone(),
            output: output.clone(),
            synthesis_id,
            topology,
            scope,
            units,
            route_table,
            revalidation,
            distribution,
            tasks,
        })
    }

    fn server_unit(&self, scope: &ResourceScope) -> Result<DeployableUnit> {
        let config = &self.config;
        let placement = match config.topology {
            crate::domain::TopologyKind::Regional => Placement::Regional,
            crate::domain::TopologyKind::EdgeReplicated => Placement::Edge,
        };

        let server_id = scope.logical_id(&["ServerFunction"])?;
        let mut server = DeployableUnit::new(server_id, "Next.js server")
            .with_memory(config.server.memory_mb)
            .with_timeout(config.server.timeout_secs)
            .with_architecture(config.server.architecture)
            .with_placement(placement);

        for (key, value) in &config.server.environment {
            server.add_environment(key, value)?;
        }
        server.add_environment(CACHE_BUCKET_NAME_ENV, &config.bucket)?;
        server.add_environment(CACHE_BUCKET_KEY_PREFIX_ENV, CACHE_KEY_PREFIX)?;
        server.add_environment(CACHE_BUCKET_REGION_ENV, &config.region)?;

        server.grant(Permission::new(
            &["s3:GetObject", "s3:PutObject", "s3:ListBucket"],
            vec![
                format!("arn:aws:s3:::{}", config.bucket),
                format!("arn:aws:s3:::{}/{CACHE_KEY_PREFIX}/*", config.bucket),
            ],
        ))?;
        Ok(server)
    }
}

fn distribution_spec(id: &LogicalId, route_table: &RouteTable) -> ResourceSpec {
    ResourceSpec::new(
        id.clone(),
        ResourceKind::Distribution,
        json!({ "route_table": route_table }),
    )
}

/// Output of phase 1, waiting for the build.
#[derive(Debug, Clone)]
pub struct DeclaredSite {
    config: SiteConfig,
    output: BuildOutput,
    synthesis_id: Uuid,
    topology: ServerTopology,
    scope: ResourceScope,
    units: Vec<DeployableUnit>,
    route_table: RouteTable,
    revalidation: Option<RevalidationPipeline>,
    distribution: LogicalId,
    tasks: FinalizeQueue,
}

impl DeclaredSite {
    pub fn synthesis_id(&self) -> Uuid {
        self.synthesis_id
    }

    pub fn topology(&self) -> &ServerTopology {
        &self.topology
    }

    /// Route table as declared; edge associations have no version yet.
    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    pub fn revalidation(&self) -> Option<&RevalidationPipeline> {
        self.revalidation.as_ref()
    }

    pub fn units(&self) -> &[DeployableUnit] {
        &self.units
    }

    pub fn server(&self) -> Option<&DeployableUnit> {
        let server = self.topology.server();
        self.units.iter().find(|u| &u.logical_id == server)
    }

    pub fn scope(&self) -> &ResourceScope {
        &self.scope
    }

    pub fn tasks(&self) -> &[DeferredTask] {
        self.tasks.tasks()
    }

    /// Phase 2: verify the build, run deferred work and freeze the result.
    pub async fn finalize(
        self,
        provider: &dyn ResourceProvider,
        ledger: &dyn VersionLedger,
    ) -> Result<SiteDescriptor> {
        let site = self.config.name.clone();
        let span = obs::synth_span(&site, &self.synthesis_id);

        let result = self.finalize_inner(provider, ledger).instrument(span).await;
        if let Err(e) = &result {
            obs::emit_synth_failed(&site, "finalize", e);
        }
        result
    }

    async fn finalize_inner(
        mut self,
        provider: &dyn ResourceProvider,
        ledger: &dyn VersionLedger,
    ) -> Result<SiteDescriptor> {
        let started = Instant::now();
        self.output.verify()?;
        let build_id = self.output.read_build_id()?;

        let versions = self
            .tasks
            .run(&mut self.units, &mut self.scope, provider, ledger)
            .await?;

        for unit in self.units.iter_mut().filter(|u| !u.is_finalized()) {
            unit.finalize()?;
            self.scope.update(unit.to_resource_spec())?;
        }

        let published: HashMap<LogicalId, LogicalId> = versions
            .iter()
            .map(|v| (v.function.clone(), v.identifier.clone()))
            .collect();
        self.route_table.resolve_versions(&published)?;
        self.scope
            .update(distribution_spec(&self.distribution, &self.route_table))?;

        obs::emit_phase_completed(
            &self.config.name,
            "finalize",
            self.scope.len(),
            started.elapsed().as_millis() as u64,
        );

        Ok(SiteDescriptor {
            site: self.config.name,
            topology: self.topology.kind(),
            build_id,
            synthesis_id: self.synthesis_id,
            synthesized_at: Utc::now(),
            route_table: self.route_table,
            revalidation: self.revalidation,
            units: self.units,
            versions,
            resources: self.scope.into_resources(),
            asset_rules: asset_rules(),
        })
    }
}

/// Run both phases back to back.
pub async fn synthesize(
    output: &BuildOutput,
    config: SiteConfig,
    provider: &dyn ResourceProvider,
    ledger: &dyn VersionLedger,
) -> Result<SiteDescriptor> {
    SiteSynthesizer::new(config)?
        .declare(output)?
        .finalize(provider, ledger)
        .await
}

/// Counts from [`provision`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl ProvisionReport {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

/// Apply every declared resource in declaration order.
///
/// Stops at the first provider error and returns it unmodified.
pub async fn provision(
    descriptor: &SiteDescriptor,
    provider: &dyn ResourceProvider,
) -> Result<ProvisionReport> {
    let mut report = ProvisionReport::default();
    for spec in descriptor.resources() {
        match provider.apply(spec).await? {
            ApplyOutcome::Created => report.created += 1,
            ApplyOutcome::Updated => report.updated += 1,
            ApplyOutcome::Unchanged => report.unchanged += 1,
        }
    }
    tracing::info!(
        site = %descriptor.site(),
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        "descriptor provisioned"
    );
    Ok(report)
}
