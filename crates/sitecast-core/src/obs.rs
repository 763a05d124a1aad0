//! Structured observability hooks for synthesis lifecycle events.
//!
//! This module provides:
//! - Synthesis-scoped tracing spans via the `SynthSpan` RAII guard
//! - Emission functions for phase, version and revalidation events
//!
//! Every event carries a stable `event` field so log pipelines can filter
//! on it regardless of message wording.

use resource_layer::LogicalId;
use tracing::info;

use crate::domain::TopologyKind;

/// RAII guard that enters a synthesis-scoped span.
///
/// # Example
///
/// ```ignore
/// let _span = SynthSpan::enter("docs", &synthesis_id);
/// // every event below is tagged with site and synthesis_id
/// ```
pub struct SynthSpan {
    _span: tracing::span::EnteredSpan,
}

impl SynthSpan {
    pub fn enter(site: &str, synthesis_id: &uuid::Uuid) -> Self {
        Self {
            _span: synth_span(site, synthesis_id).entered(),
        }
    }
}

/// The synthesis span itself, for instrumenting futures that cross
/// `.await` points.
pub fn synth_span(site: &str, synthesis_id: &uuid::Uuid) -> tracing::Span {
    tracing::info_span!("sitecast.synth", site = %site, synthesis_id = %synthesis_id)
}

/// Emit event: synthesis started for a site.
pub fn emit_synth_started(site: &str, topology: TopologyKind) {
    info!(event = "synth.started", site = %site, topology = %topology);
}

/// Emit event: a synthesis phase finished with `resources` declared so far.
pub fn emit_phase_completed(site: &str, phase: &str, resources: usize, duration_ms: u64) {
    info!(
        event = "synth.phase_completed",
        site = %site,
        phase = %phase,
        resources = resources,
        duration_ms = duration_ms,
    );
}

/// Emit event: unchanged content, existing version reused.
pub fn emit_version_reused(unit: &LogicalId, identifier: &LogicalId) {
    info!(event = "version.reused", unit = %unit, identifier = %identifier);
}

/// Emit event: new version resource created.
pub fn emit_version_created(unit: &LogicalId, identifier: &LogicalId, content_hash: &str) {
    info!(
        event = "version.created",
        unit = %unit,
        identifier = %identifier,
        content_hash = %content_hash,
    );
}

/// Emit event: revalidation queue wired behind render compute.
pub fn emit_revalidation_wired(queue: &LogicalId, render: &LogicalId, batch_size: u32) {
    info!(
        event = "revalidation.wired",
        queue = %queue,
        render = %render,
        batch_size = batch_size,
    );
}

/// Emit event: one consumer drain pass finished.
pub fn emit_revalidation_drained(received: usize, regenerated: usize, failed: usize) {
    info!(
        event = "revalidation.drained",
        received = received,
        regenerated = regenerated,
        failed = failed,
    );
}

/// Emit event: synthesis aborted (warning level).
pub fn emit_synth_failed(site: &str, phase: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "synth.failed", site = %site, phase = %phase, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synth_span_enter() {
        let _span = SynthSpan::enter("docs", &uuid::Uuid::new_v4());
        emit_synth_started("docs", TopologyKind::Regional);
    }
}
