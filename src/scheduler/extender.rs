//! Extenders: out-of-band filter/prioritize pairs
//!
//! An extender runs after the in-process plugins, taking the already
//! filtered node list. Conceptually a remote scorer collapsed to an
//! in-process call. Extender scores compose additively with plugin
//! scores and are not normalized, so a high extender weight dominates.

use std::sync::Arc;

use tracing::debug;

use crate::context::SchedulerContext;
use crate::error::Result;
use crate::pod::Pod;
use crate::scheduler::predicates::{FailedPredicateMap, PredicateFailure};
use crate::scheduler::priorities::{HostPriority, MAX_PRIORITY};

/// An out-of-band filter + prioritize pair
pub trait Extender: Send + Sync {
    /// Name used in logs and failure reasons
    fn name(&self) -> &str;

    /// Multiplier applied to this extender's scores before they are added
    /// to the plugin scores
    fn weight(&self) -> i64 {
        1
    }

    /// Drop nodes the extender rejects, recording reasons for the dropped
    /// ones
    fn filter(
        &self,
        pod: &Pod,
        nodes: Vec<String>,
        failed: &mut FailedPredicateMap,
    ) -> Result<Vec<String>>;

    /// Score the surviving nodes
    fn prioritize(&self, pod: &Pod, nodes: &[String]) -> Result<Vec<HostPriority>>;
}

/// Usage-aware admission and scoring against the metrics snapshot.
///
/// Filtering drops a node when observed usage plus the pod's request would
/// exceed allocatable, a stricter test than the request-based predicates.
/// Prioritization favors nodes with usage headroom, taking the minimum
/// across resources. Nodes without metrics are treated optimistically:
/// kept, and scored at [`MAX_PRIORITY`].
pub struct UsageAwareExtender {
    ctx: Arc<SchedulerContext>,
    weight: i64,
}

impl UsageAwareExtender {
    /// Create the extender over the simulation's shared context
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self { ctx, weight: 1 }
    }

    /// Set the score weight
    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }
}

impl Extender for UsageAwareExtender {
    fn name(&self) -> &str {
        "UsageAware"
    }

    fn weight(&self) -> i64 {
        self.weight
    }

    fn filter(
        &self,
        pod: &Pod,
        nodes: Vec<String>,
        failed: &mut FailedPredicateMap,
    ) -> Result<Vec<String>> {
        let mut kept = Vec::with_capacity(nodes.len());
        for name in nodes {
            match self.ctx.metrics(&name) {
                Some(metrics) if !(metrics.usage + pod.request).le(&metrics.allocatable) => {
                    debug!(node = %name, pod = %pod.key(), "usage too high, dropping node");
                    failed.insert(
                        name,
                        PredicateFailure {
                            predicate: self.name().to_string(),
                            reason: "node usage is too high".to_string(),
                        },
                    );
                }
                _ => kept.push(name),
            }
        }
        Ok(kept)
    }

    fn prioritize(&self, _pod: &Pod, nodes: &[String]) -> Result<Vec<HostPriority>> {
        let priorities = nodes
            .iter()
            .map(|name| {
                let score = match self.ctx.metrics(name) {
                    Some(metrics) => {
                        // A dimension the node does not carry never drags
                        // the minimum down.
                        let headroom = |used: u64, capacity: u64| {
                            if capacity == 0 {
                                MAX_PRIORITY
                            } else {
                                MAX_PRIORITY * (capacity as i64 - used as i64) / capacity as i64
                            }
                        };
                        let cpu =
                            headroom(metrics.usage.milli_cpu, metrics.allocatable.milli_cpu);
                        let mem = headroom(metrics.usage.memory, metrics.allocatable.memory);
                        cpu.min(mem)
                    }
                    None => MAX_PRIORITY,
                };
                HostPriority {
                    host: name.clone(),
                    score,
                }
            })
            .collect();
        Ok(priorities)
    }
}
