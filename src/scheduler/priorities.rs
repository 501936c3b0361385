//! Prioritizer registry: weighted scoring of filtered nodes
//!
//! A prioritizer maps (pod, node snapshot) to a score in
//! `[0, MAX_PRIORITY]`; the driver multiplies by the prioritizer's weight
//! and sums across the registry. CPU and memory drive the built-in
//! scorers; ephemeral storage participates in fit checks only.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::NodeInfo;
use crate::pod::Pod;

/// Upper bound of a single prioritizer's score
pub const MAX_PRIORITY: i64 = 10;

/// A node's accumulated score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPriority {
    /// Node name
    pub host: String,
    /// Weighted score sum
    pub score: i64,
}

/// Per-node scoring function
pub type PriorityMapFn = Arc<dyn Fn(&Pod, &NodeInfo) -> Result<i64> + Send + Sync>;

/// A named, weighted prioritizer
#[derive(Clone)]
pub struct PriorityConfig {
    /// Display name for logs
    pub name: String,
    /// The per-node scoring function
    pub map: PriorityMapFn,
    /// Multiplier applied to every score this prioritizer produces
    pub weight: i64,
}

impl PriorityConfig {
    /// Create a prioritizer config
    pub fn new(name: impl Into<String>, map: PriorityMapFn, weight: i64) -> Self {
        Self {
            name: name.into(),
            map,
            weight,
        }
    }
}

impl fmt::Debug for PriorityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityConfig")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}

fn utilization_after_bind(pod: &Pod, node: &NodeInfo) -> (f64, f64) {
    let wanted = pod.request + *node.request_sum();
    let capacity = node.allocatable();
    let frac = |want: u64, have: u64| {
        if have == 0 {
            // A zero-capacity dimension is never a reason to prefer a node.
            1.0
        } else {
            want as f64 / have as f64
        }
    };
    (
        frac(wanted.milli_cpu, capacity.milli_cpu),
        frac(wanted.memory, capacity.memory),
    )
}

/// Best-fit: favor nodes that would be most utilized after the bind.
///
/// Requests beyond capacity score zero for that resource.
pub fn most_requested_map(pod: &Pod, node: &NodeInfo) -> Result<i64> {
    let (cpu, mem) = utilization_after_bind(pod, node);
    let score = |frac: f64| {
        if frac > 1.0 {
            0
        } else {
            (frac * MAX_PRIORITY as f64) as i64
        }
    };
    Ok((score(cpu) + score(mem)) / 2)
}

/// Worst-fit: favor nodes that would be least utilized after the bind
pub fn least_requested_map(pod: &Pod, node: &NodeInfo) -> Result<i64> {
    let (cpu, mem) = utilization_after_bind(pod, node);
    let score = |frac: f64| {
        if frac > 1.0 {
            0
        } else {
            ((1.0 - frac) * MAX_PRIORITY as f64) as i64
        }
    };
    Ok((score(cpu) + score(mem)) / 2)
}

/// Favor nodes whose CPU and memory utilization would stay closest to
/// each other after the bind
pub fn balanced_resource_allocation_map(pod: &Pod, node: &NodeInfo) -> Result<i64> {
    let (cpu, mem) = utilization_after_bind(pod, node);
    if cpu > 1.0 || mem > 1.0 {
        return Ok(0);
    }
    let diff = (cpu - mem).abs();
    Ok(((1.0 - diff) * MAX_PRIORITY as f64) as i64)
}

/// Spread tasks of one job: favor nodes hosting few pods of the
/// candidate's job
pub fn least_tasks_from_same_job_map(pod: &Pod, node: &NodeInfo) -> Result<i64> {
    let count = node.tasks_of_job(pod.job_name()) as i64;
    Ok(MAX_PRIORITY - count.min(MAX_PRIORITY))
}

/// Rank all nodes equally; applied when no prioritizers are registered so
/// host selection still has a well-formed input
pub fn equal_priority_map(_pod: &Pod, _node: &NodeInfo) -> Result<i64> {
    Ok(1)
}
