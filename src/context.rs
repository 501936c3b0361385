//! Shared scheduling context
//!
//! ## Table of Contents
//! - **NodeMetrics**: per-node usage/allocatable/request snapshot
//! - **SchedulerContext**: metrics cache, oversubscription factors and the
//!   cancellation token, passed explicitly instead of living in globals
//! - **CancelToken**: cooperative cancellation observed between pods
//!
//! The context is written in phases: the harness fills the metrics cache
//! before each `Schedule` call, the oversubscription controller rewrites
//! the factor map at the start of the call, and the pipeline only reads.
//! Correctness depends on that phase order, not on the locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::resources::ResourceVector;

/// Aggregated per-node metrics snapshot published by the harness
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Observed resource usage (sum of running pods' actual consumption)
    pub usage: ResourceVector,
    /// Schedulable capacity
    pub allocatable: ResourceVector,
    /// Sum of bound pods' requests
    pub request: ResourceVector,
}

/// Cooperative cancellation flag.
///
/// The harness cancels the whole simulation on SIGINT/SIGTERM; the driver
/// observes the token between pods, and fan-out tasks abandon their slot
/// when it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared state read by predicates, extenders and the oversubscription
/// controller.
///
/// One context serves one simulation; the harness keeps a clone of the
/// `Arc` to publish metrics and to cancel.
#[derive(Debug)]
pub struct SchedulerContext {
    metrics: RwLock<HashMap<String, NodeMetrics>>,
    oversub_factors: RwLock<HashMap<String, f64>>,
    default_oversub_factor: f64,
    cancel: CancelToken,
}

impl SchedulerContext {
    /// Create a context whose nodes start at the given oversubscription
    /// factor
    pub fn new(default_oversub_factor: f64) -> Arc<Self> {
        Arc::new(Self {
            metrics: RwLock::new(HashMap::new()),
            oversub_factors: RwLock::new(HashMap::new()),
            default_oversub_factor,
            cancel: CancelToken::new(),
        })
    }

    /// Publish a node's metrics snapshot; called by the harness before
    /// `Schedule`
    pub fn update_metrics(&self, node_name: impl Into<String>, metrics: NodeMetrics) {
        self.metrics.write().insert(node_name.into(), metrics);
    }

    /// The node's latest metrics snapshot; `None` means unknown, and
    /// consumers treat the node optimistically
    pub fn metrics(&self, node_name: &str) -> Option<NodeMetrics> {
        self.metrics.read().get(node_name).copied()
    }

    /// Drop all published metrics
    pub fn clear_metrics(&self) {
        self.metrics.write().clear();
    }

    /// The node's current oversubscription factor, or the global default
    /// if the controller has not touched it yet
    pub fn oversub_factor(&self, node_name: &str) -> f64 {
        self.oversub_factors
            .read()
            .get(node_name)
            .copied()
            .unwrap_or(self.default_oversub_factor)
    }

    /// Overwrite a node's oversubscription factor
    pub fn set_oversub_factor(&self, node_name: impl Into<String>, factor: f64) {
        self.oversub_factors.write().insert(node_name.into(), factor);
    }

    /// The cancellation token shared with the harness
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the simulation was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_roundtrip() {
        let ctx = SchedulerContext::new(1.0);
        assert_eq!(ctx.metrics("node-0"), None);

        let metrics = NodeMetrics {
            usage: ResourceVector::new(3000, 1024),
            allocatable: ResourceVector::new(10000, 4096),
            request: ResourceVector::new(9500, 2048),
        };
        ctx.update_metrics("node-0", metrics);
        assert_eq!(ctx.metrics("node-0"), Some(metrics));

        ctx.clear_metrics();
        assert_eq!(ctx.metrics("node-0"), None);
    }

    #[test]
    fn test_oversub_factor_defaults() {
        let ctx = SchedulerContext::new(1.5);
        assert_eq!(ctx.oversub_factor("node-0"), 1.5);
        ctx.set_oversub_factor("node-0", 2.0);
        assert_eq!(ctx.oversub_factor("node-0"), 2.0);
        assert_eq!(ctx.oversub_factor("node-1"), 1.5);
    }

    #[test]
    fn test_cancel_token() {
        let ctx = SchedulerContext::new(1.0);
        let token = ctx.cancel_token();
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
