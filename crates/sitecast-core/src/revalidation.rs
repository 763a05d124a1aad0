//! Background page regeneration.
//!
//! Render compute enqueues a [`RevalidationMessage`] when it serves a stale
//! page; a consumer function drains the FIFO queue and regenerates pages.
//! Delivery is at-least-once and ordered only within a page's group, so
//! regenerating the same page twice must be harmless.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use resource_layer::{LogicalId, ReceiptHandle, ResourceKind, ResourceSpec, WorkQueue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::RevalidationConfig;
use crate::domain::{DeployableUnit, Permission, Result, SynthError};
use crate::obs;
use crate::registry::{attribute_ref, ResourceScope};

/// Queue address injected into render compute.
pub const QUEUE_URL_ENV: &str = "REVALIDATION_QUEUE_URL";
/// Queue region injected into render compute.
pub const QUEUE_REGION_ENV: &str = "REVALIDATION_QUEUE_REGION";

/// Declared queue wiring between render compute and the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidationPipeline {
    pub queue: LogicalId,
    pub queue_url: String,
    pub queue_region: String,
    pub consumer: LogicalId,
    pub event_source: LogicalId,
    pub batch_size: u32,
    pub receive_wait_secs: u32,
    pub visibility_timeout_secs: u32,
}

impl RevalidationPipeline {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs.into())
    }

    pub fn receive_wait(&self) -> Duration {
        Duration::from_secs(self.receive_wait_secs.into())
    }
}

/// Result of [`wire_revalidation`]: the pipeline plus its consumer unit,
/// whose bundle is patched in during finalization.
#[derive(Debug, Clone)]
pub struct WiredRevalidation {
    pub pipeline: RevalidationPipeline,
    pub consumer: DeployableUnit,
}

/// Wire a revalidation queue behind `render`.
///
/// Without render compute there is nothing to revalidate: returns `None`
/// and declares nothing. Otherwise mutates the render unit's environment
/// and permissions, so it must run before that unit is finalized.
pub fn wire_revalidation(
    scope: &mut ResourceScope,
    render: Option<&mut DeployableUnit>,
    config: &RevalidationConfig,
    region: &str,
) -> Result<Option<WiredRevalidation>> {
    let Some(render) = render else {
        tracing::debug!("no render compute; revalidation skipped");
        return Ok(None);
    };
    if render.is_finalized() {
        return Err(SynthError::UnitFinalized(render.logical_id.clone()));
    }

    let queue = scope.logical_id(&["Revalidation", "Queue"])?;
    scope.declare(ResourceSpec::new(
        queue.clone(),
        ResourceKind::Queue,
        json!({
            "fifo": true,
            "receive_wait_secs": config.receive_wait_secs,
            "visibility_timeout_secs": config.visibility_timeout_secs,
        }),
    ))?;
    let queue_url = attribute_ref(&queue, "QueueUrl");
    let queue_arn = attribute_ref(&queue, "Arn");

    let consumer_id = scope.logical_id(&["Revalidation", "Consumer"])?;
    let mut consumer = DeployableUnit::new(consumer_id.clone(), "Next.js revalidator")
        .with_memory(config.memory_mb)
        .with_timeout(config.timeout_secs);
    consumer.grant(Permission::new(
        &[
            "sqs:ReceiveMessage",
            "sqs:DeleteMessage",
            "sqs:ChangeMessageVisibility",
            "sqs:GetQueueAttributes",
        ],
        vec![queue_arn.clone()],
    ))?;
    scope.declare(consumer.to_resource_spec())?;

    let event_source = scope.logical_id(&["Revalidation", "EventSource"])?;
    scope.declare(ResourceSpec::new(
        event_source.clone(),
        ResourceKind::EventSourceMapping,
        json!({
            "queue": queue,
            "function": consumer_id,
            "batch_size": config.batch_size,
        }),
    ))?;

    render.grant(Permission::new(&["sqs:SendMessage"], vec![queue_arn]))?;
    render.add_environment(QUEUE_URL_ENV, queue_url.clone())?;
    render.add_environment(QUEUE_REGION_ENV, region)?;

    let pipeline = RevalidationPipeline {
        queue,
        queue_url,
        queue_region: region.to_string(),
        consumer: consumer_id,
        event_source,
        batch_size: config.batch_size,
        receive_wait_secs: config.receive_wait_secs,
        visibility_timeout_secs: config.visibility_timeout_secs,
    };
    obs::emit_revalidation_wired(&pipeline.queue, &render.logical_id, pipeline.batch_size);
    Ok(Some(WiredRevalidation { pipeline, consumer }))
}

// ---------------------------------------------------------------------------
// Runtime side
// ---------------------------------------------------------------------------

/// A page the render path found stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevalidationMessage {
    pub host: String,
    /// Request path, optionally with a query string
    pub url: String,
    /// Epoch millis of the cached copy that triggered revalidation
    pub last_modified: i64,
}

impl RevalidationMessage {
    /// Ordering group: every message for one page path shares a group.
    pub fn group_id(&self) -> String {
        let path = self.url.split('?').next().unwrap_or_default();
        hex::encode(Sha256::digest(path.as_bytes()))
    }

    /// Deduplication id: one regeneration per cached copy.
    pub fn dedup_id(&self) -> String {
        let key = format!("{}-{}", self.url, self.last_modified);
        hex::encode(Sha256::digest(key.as_bytes()))
    }
}

/// Enqueue `message`. Returns `None` if the queue dropped it as a duplicate.
pub async fn enqueue(
    queue: &dyn WorkQueue,
    message: &RevalidationMessage,
) -> Result<Option<String>> {
    let body = serde_json::to_value(message)?;
    Ok(queue
        .send(&message.group_id(), &message.dedup_id(), body)
        .await?)
}

/// Regenerates a single page.
#[async_trait]
pub trait PageRegenerator: Send + Sync {
    async fn regenerate(&self, message: &RevalidationMessage) -> Result<()>;
}

/// Outcome of one [`drain_once`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub received: usize,
    pub regenerated: usize,
    /// Left unacknowledged for redelivery
    pub failed: usize,
    /// Unparseable bodies, acknowledged and dropped
    pub discarded: usize,
    /// Held back unprocessed behind an earlier failure in the same group
    pub deferred: usize,
}

/// Receive one batch, regenerate each page, and acknowledge successes.
///
/// Failed regenerations stay in flight and reappear after the visibility
/// timeout; that redelivery is the only retry. Later messages of a failed
/// group are left in flight untouched so the group replays in order.
pub async fn drain_once(
    queue: &dyn WorkQueue,
    regenerator: &dyn PageRegenerator,
    batch_size: usize,
) -> Result<DrainReport> {
    let batch = queue.receive(batch_size).await?;
    let mut report = DrainReport {
        received: batch.len(),
        ..DrainReport::default()
    };
    let mut failed_groups: HashSet<String> = HashSet::new();

    for received in batch {
        if failed_groups.contains(&received.message.group_id) {
            tracing::debug!(
                message_id = %received.message.message_id,
                "holding back message behind failed group"
            );
            report.deferred += 1;
            continue;
        }

        let message: RevalidationMessage = match serde_json::from_value(received.message.body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    message_id = %received.message.message_id,
                    error = %e,
                    "discarding malformed revalidation message"
                );
                ack(queue, &received.receipt).await?;
                report.discarded += 1;
                continue;
            }
        };

        match regenerator.regenerate(&message).await {
            Ok(()) => {
                ack(queue, &received.receipt).await?;
                report.regenerated += 1;
            }
            Err(e) => {
                tracing::warn!(
                    url = %message.url,
                    receive_count = received.message.receive_count,
                    error = %e,
                    "regeneration failed; awaiting redelivery"
                );
                failed_groups.insert(received.message.group_id);
                report.failed += 1;
            }
        }
    }

    obs::emit_revalidation_drained(report.received, report.regenerated, report.failed);
    Ok(report)
}

async fn ack(queue: &dyn WorkQueue, receipt: &ReceiptHandle) -> Result<()> {
    queue.ack(receipt).await.map_err(SynthError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render() -> DeployableUnit {
        DeployableUnit::new(LogicalId::new("SiteServer").unwrap(), "render")
    }

    #[test]
    fn test_no_render_compute_is_noop() {
        let mut scope = ResourceScope::new("site").unwrap();
        let config = RevalidationConfig::default();
        let wired = wire_revalidation(&mut scope, None, &config, "us-east-1").unwrap();
        assert!(wired.is_none());
        assert!(scope.is_empty());
    }

    #[test]
    fn test_wiring_injects_queue_environment() {
        let mut scope = ResourceScope::new("site").unwrap();
        let mut server = render();
        let wired = wire_revalidation(
            &mut scope,
            Some(&mut server),
            &RevalidationConfig::default(),
            "eu-west-1",
        )
        .unwrap()
        .unwrap();

        assert_eq!(server.environment()[QUEUE_URL_ENV], wired.pipeline.queue_url);
        assert_eq!(server.environment()[QUEUE_REGION_ENV], "eu-west-1");
        assert!(server
            .permissions()
            .iter()
            .any(|p| p.actions == vec!["sqs:SendMessage".to_string()]));
        assert_eq!(wired.pipeline.batch_size, 5);
        assert_eq!(wired.pipeline.receive_wait_secs, 20);
        assert_eq!(wired.consumer.memory_mb, 128);

        let queue = scope.get(&wired.pipeline.queue).unwrap();
        assert_eq!(queue.properties["fifo"], true);
        assert_eq!(scope.of_kind(ResourceKind::EventSourceMapping).count(), 1);
    }

    #[test]
    fn test_wiring_after_finalize_fails() {
        let mut scope = ResourceScope::new("site").unwrap();
        let mut server = render();
        server
            .finalize_with(crate::domain::CodePayload::Inline {
                source: "x".to_string(),
            })
            .unwrap();
        assert!(matches!(
            wire_revalidation(
                &mut scope,
                Some(&mut server),
                &RevalidationConfig::default(),
                "us-east-1"
            ),
            Err(SynthError::UnitFinalized(_))
        ));
    }

    #[test]
    fn test_message_keys() {
        let a = RevalidationMessage {
            host: "example.com".to_string(),
            url: "/blog/post?draft=1".to_string(),
            last_modified: 1,
        };
        let b = RevalidationMessage {
            url: "/blog/post".to_string(),
            last_modified: 2,
            ..a.clone()
        };
        assert_eq!(a.group_id(), b.group_id());
        assert_ne!(a.dedup_id(), b.dedup_id());
        assert_eq!(a.group_id().len(), 64);
    }
}
