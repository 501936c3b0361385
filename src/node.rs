//! Node state: allocatable capacity, bound pods and derived usage
//!
//! ## Table of Contents
//! - **NodeInfo**: per-node scheduling state mutated only by the driver
//! - **NodeLister**: the harness's view of the current fleet

use serde::{Deserialize, Serialize};

use crate::pod::Pod;
use crate::resources::ResourceVector;

/// Scheduling state of one node.
///
/// The driver owns the node-info map during a `Schedule` call; the parallel
/// fan-out reads snapshots of it and never writes. Request and demand sums
/// are maintained incrementally as pods bind and unbind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    name: String,
    allocatable: ResourceVector,
    pods: Vec<Pod>,
    request_sum: ResourceVector,
    demand_sum: ResourceVector,
}

impl NodeInfo {
    /// Create a node with the given schedulable capacity
    pub fn new(name: impl Into<String>, allocatable: ResourceVector) -> Self {
        Self {
            name: name.into(),
            allocatable,
            pods: Vec::new(),
            request_sum: ResourceVector::zero(),
            demand_sum: ResourceVector::zero(),
        }
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedulable capacity vector
    pub fn allocatable(&self) -> &ResourceVector {
        &self.allocatable
    }

    /// Pods currently bound to this node, in bind order
    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    /// Sum of requests over bound pods
    pub fn request_sum(&self) -> &ResourceVector {
        &self.request_sum
    }

    /// Sum of demands over bound pods; the harness samples this as the
    /// node's actual usage when it publishes metrics
    pub fn demand_sum(&self) -> &ResourceVector {
        &self.demand_sum
    }

    /// Bind a pod to this node, reserving its request
    pub fn add_pod(&mut self, pod: Pod) {
        debug_assert!(
            !self.has_pod(&pod.namespace, &pod.name),
            "pod {} bound twice to node {}",
            pod.key(),
            self.name
        );
        self.request_sum += pod.request;
        self.demand_sum += pod.demand;
        self.pods.push(pod);
    }

    /// Unbind a pod, releasing its request. Returns the pod if it was bound.
    pub fn remove_pod(&mut self, namespace: &str, name: &str) -> Option<Pod> {
        let idx = self
            .pods
            .iter()
            .position(|p| p.namespace == namespace && p.name == name)?;
        let pod = self.pods.remove(idx);
        self.request_sum = self.request_sum.saturating_sub(&pod.request);
        self.demand_sum = self.demand_sum.saturating_sub(&pod.demand);
        Some(pod)
    }

    /// Whether a pod with this identity is bound here
    pub fn has_pod(&self, namespace: &str, name: &str) -> bool {
        self.pods
            .iter()
            .any(|p| p.namespace == namespace && p.name == name)
    }

    /// Number of bound pods belonging to the given job
    pub fn tasks_of_job(&self, job_name: &str) -> usize {
        self.pods.iter().filter(|p| p.job_name() == job_name).count()
    }
}

/// The harness's view of the current fleet.
///
/// `list` returns node names; ordering is stable within a tick but
/// otherwise unspecified.
pub trait NodeLister {
    /// Names of every node in the fleet
    fn list(&self) -> Vec<String>;
}

impl NodeLister for Vec<String> {
    fn list(&self) -> Vec<String> {
        self.clone()
    }
}
