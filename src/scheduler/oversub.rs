//! Dynamic oversubscription controller
//!
//! Runs once at the start of every `Schedule` call, before any pod is
//! considered. A node whose requests already look tight but whose real
//! usage still has headroom is safe to pack further, so its factor is
//! raised one step; any other shape reverts it to conservative.

use tracing::trace;

use crate::context::SchedulerContext;

/// Headroom factor both conditions are checked against
pub const OVERSUB_SLACK: f64 = 0.9;
/// How much one raise adds to a node's factor
pub const OVERSUB_STEP: f64 = 0.1;
/// Upper bound of any node's factor
pub const MAX_OVERSUB: f64 = 2.0;

/// Per-tick update of each node's oversubscription factor from observed
/// usage vs. request
#[derive(Debug, Clone)]
pub struct OversubController {
    slack: f64,
    step: f64,
    max_factor: f64,
}

impl Default for OversubController {
    fn default() -> Self {
        Self {
            slack: OVERSUB_SLACK,
            step: OVERSUB_STEP,
            max_factor: MAX_OVERSUB,
        }
    }
}

impl OversubController {
    /// Controller with the design's constants
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the factor of every node that has a metrics snapshot.
    ///
    /// Nodes without metrics are left untouched. The factor rises by one
    /// step per call, so repeated calls with identical metrics converge in
    /// bounded steps and are idempotent afterwards.
    pub fn update<'a>(
        &self,
        ctx: &SchedulerContext,
        node_names: impl IntoIterator<Item = &'a String>,
    ) {
        for name in node_names {
            let Some(metrics) = ctx.metrics(name) else {
                continue;
            };
            let request_tight = !metrics
                .request
                .le_with_factor(&metrics.allocatable, self.slack);
            let usage_light = metrics
                .usage
                .le_with_factor(&metrics.allocatable, self.slack);

            let factor = if request_tight && usage_light {
                (ctx.oversub_factor(name) + self.step).min(self.max_factor)
            } else {
                1.0
            };
            trace!(node = %name, factor, "oversubscription factor updated");
            ctx.set_oversub_factor(name.clone(), factor);
        }
    }
}
