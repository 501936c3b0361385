//! Predicate registry: named fit checks over (pod, node snapshot)
//!
//! A predicate is a pure function from a pod and a node-info snapshot to a
//! fit decision. The registry is ordered; evaluation shortcuts on the
//! first failure, so registration order is observable.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::SchedulerContext;
use crate::error::Result;
use crate::node::NodeInfo;
use crate::pod::Pod;

/// Fit decision returned by a predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateOutcome {
    /// The pod fits on the node
    Fits,
    /// The pod does not fit, with a human-readable reason
    Unschedulable(String),
}

impl PredicateOutcome {
    /// Whether the pod fits
    pub fn fits(&self) -> bool {
        matches!(self, PredicateOutcome::Fits)
    }
}

/// A registered fit-check function
pub type Predicate = Arc<dyn Fn(&Pod, &NodeInfo) -> Result<PredicateOutcome> + Send + Sync>;

/// Why a node rejected a pod: the failing predicate and its reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateFailure {
    /// Name the failing check was registered (or, for extenders, the
    /// extender name)
    pub predicate: String,
    /// Human-readable reason
    pub reason: String,
}

/// Predicates whose failures no amount of evicting pods can cure.
///
/// Resource-pressure failures are curable; identity constraints are not.
/// The built-in compound predicate stubs these checks, so the list only
/// matters for harness-registered predicates reusing the names.
const UNRESOLVABLE_PREDICATES: &[&str] = &["PodFitsHost", "MatchNodeSelector"];

impl PredicateFailure {
    /// Whether evicting pods from the node could flip this failure
    pub fn is_potentially_curable(&self) -> bool {
        !UNRESOLVABLE_PREDICATES.contains(&self.predicate.as_str())
    }
}

impl fmt::Display for PredicateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.predicate, self.reason)
    }
}

/// Per-node failure reasons collected during filtering, keyed by node name
pub type FailedPredicateMap = BTreeMap<String, PredicateFailure>;

/// Run an ordered registry against one node, shortcutting on the first
/// failure. `Ok(None)` means every predicate passed.
pub fn run_predicates(
    registry: &[(String, Predicate)],
    pod: &Pod,
    node: &NodeInfo,
) -> Result<Option<PredicateFailure>> {
    for (name, predicate) in registry {
        match predicate(pod, node)? {
            PredicateOutcome::Fits => continue,
            PredicateOutcome::Unschedulable(reason) => {
                return Ok(Some(PredicateFailure {
                    predicate: name.clone(),
                    reason,
                }));
            }
        }
    }
    Ok(None)
}

fn resource_fit(pod: &Pod, node: &NodeInfo, factor: f64) -> PredicateOutcome {
    let wanted = pod.request + *node.request_sum();
    let capacity = node.allocatable();
    let dimensions: [(&str, u64, u64); 3] = [
        ("cpu", wanted.milli_cpu, capacity.milli_cpu),
        ("memory", wanted.memory, capacity.memory),
        (
            "ephemeral storage",
            wanted.ephemeral_storage,
            capacity.ephemeral_storage,
        ),
    ];
    for (resource, want, have) in dimensions {
        if want as f64 > have as f64 * factor {
            return PredicateOutcome::Unschedulable(format!(
                "insufficient {resource}: requests would total {want} of {have} allocatable"
            ));
        }
    }
    PredicateOutcome::Fits
}

/// `request(pod) + requestSum(node) <= allocatable(node)`
pub fn pod_fits_resources() -> Predicate {
    Arc::new(|pod, node| Ok(resource_fit(pod, node, 1.0)))
}

/// Resource fit against allocatable scaled by the node's current
/// oversubscription factor
pub fn pod_fits_resources_oversub(ctx: Arc<SchedulerContext>) -> Predicate {
    Arc::new(move |pod, node| {
        let factor = ctx.oversub_factor(node.name());
        match resource_fit(pod, node, factor) {
            PredicateOutcome::Fits => Ok(PredicateOutcome::Fits),
            PredicateOutcome::Unschedulable(reason) => Ok(PredicateOutcome::Unschedulable(
                format!("{reason} (oversubscription factor {factor:.1})"),
            )),
        }
    })
}

/// Compound of name, host-port and resource fits.
///
/// The simulator has no real network or kubelet, so the port and hostname
/// checks always pass; the resource fit is the material check.
pub fn general_predicates() -> Predicate {
    Arc::new(|pod, node| Ok(resource_fit(pod, node, 1.0)))
}

/// Reject nodes that already host a task of the candidate's job.
///
/// Opt-in: policies that spread tasks register it explicitly.
pub fn job_conflict() -> Predicate {
    Arc::new(|pod, node| {
        let job = pod.job_name();
        if node.tasks_of_job(job) > 0 {
            Ok(PredicateOutcome::Unschedulable(format!(
                "node already hosts a task of job {job}"
            )))
        } else {
            Ok(PredicateOutcome::Fits)
        }
    })
}
