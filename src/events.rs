//! Events returned to the simulation harness
//!
//! The core mutates nothing in the outside world; binds and deletions are
//! reported as events and the harness applies them.

use serde::{Deserialize, Serialize};

use crate::pod::Pod;

/// Outcome of a successful placement decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleResult {
    /// The chosen node
    pub suggested_host: String,
    /// Nodes the pipeline looked at (feasible plus rejected)
    pub evaluated_nodes: usize,
    /// Nodes that passed every filter
    pub feasible_nodes: usize,
}

/// A pod was bound to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindEvent {
    /// The pod that was placed
    pub pod: Pod,
    /// Where and how it was placed
    pub schedule_result: ScheduleResult,
}

impl BindEvent {
    /// Name of the node the pod was bound to
    pub fn node_name(&self) -> &str {
        &self.schedule_result.suggested_host
    }
}

/// A bound pod was selected as a preemption victim and must terminate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEvent {
    /// Victim pod namespace
    pub pod_namespace: String,
    /// Victim pod name
    pub pod_name: String,
    /// Node the victim is bound to
    pub node_name: String,
}

/// Everything a `Schedule` call can ask the harness to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Bind a pod to a node
    Bind(BindEvent),
    /// Delete a preemption victim
    Delete(DeleteEvent),
}

impl Event {
    /// The bind payload, if this is a bind event
    pub fn as_bind(&self) -> Option<&BindEvent> {
        match self {
            Event::Bind(bind) => Some(bind),
            Event::Delete(_) => None,
        }
    }

    /// The delete payload, if this is a delete event
    pub fn as_delete(&self) -> Option<&DeleteEvent> {
        match self {
            Event::Bind(_) => None,
            Event::Delete(delete) => Some(delete),
        }
    }
}
