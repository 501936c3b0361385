//! Pod: a unit of workload to be scheduled
//!
//! A pod is identified by `(namespace, name)` and is immutable after
//! creation except for its scheduling-state annotation (the nominated
//! node set by preemption).

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::resources::ResourceVector;

/// A schedulable workload unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    /// Namespace the pod lives in
    pub namespace: String,
    /// Pod name; tasks of the same job share the second `-`-separated
    /// segment
    pub name: String,
    /// What the scheduler reserves on the chosen node
    pub request: ResourceVector,
    /// What the pod will actually consume while running; may differ from
    /// the request by a demand-to-request ratio
    pub demand: ResourceVector,
    /// Scheduling priority; higher is more important
    pub priority: i32,
    /// Virtual arrival time assigned by the submitter
    pub creation_timestamp: Option<Clock>,
    /// Node hint set by preemption; cleared once the pod binds
    pub nominated_node: Option<String>,
}

impl Pod {
    /// Create a pod with zero resources and priority 0
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            request: ResourceVector::zero(),
            demand: ResourceVector::zero(),
            priority: 0,
            creation_timestamp: None,
            nominated_node: None,
        }
    }

    /// Set the resource request; demand defaults to the same vector
    pub fn with_request(mut self, request: ResourceVector) -> Self {
        self.request = request;
        self.demand = request;
        self
    }

    /// Set an explicit demand vector
    pub fn with_demand(mut self, demand: ResourceVector) -> Self {
        self.demand = demand;
        self
    }

    /// Derive demand by scaling the request, e.g. 0.6 for pods that
    /// typically consume 60% of what they reserve
    pub fn with_demand_ratio(mut self, ratio: f64) -> Self {
        self.demand = self.request.scale(ratio);
        self
    }

    /// Set the scheduling priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the virtual creation timestamp
    pub fn with_creation_timestamp(mut self, clock: Clock) -> Self {
        self.creation_timestamp = Some(clock);
        self
    }

    /// Unique key, `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Job this pod belongs to.
    ///
    /// Derived from the pod name: the second `-`-separated segment, or the
    /// whole name when there are fewer than two segments. Tasks named
    /// `task-job1-0` and `task-job1-1` spread across nodes.
    pub fn job_name(&self) -> &str {
        let mut parts = self.name.split('-');
        match (parts.next(), parts.next()) {
            (Some(_), Some(job)) => job,
            _ => &self.name,
        }
    }
}
