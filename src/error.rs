//! Error types for oversim
//!
//! ## Table of Contents
//! - **OversimError**: Main error enum covering all failure modes
//! - **FitError**: Recoverable "pod fits nowhere" error with per-node reasons
//! - **Result**: Type alias for `Result<T, OversimError>`

use thiserror::Error;

use crate::pod::Pod;
use crate::scheduler::predicates::FailedPredicateMap;

/// Result type alias for oversim operations
pub type Result<T> = std::result::Result<T, OversimError>;

/// Main error type for oversim operations
#[derive(Error, Debug)]
pub enum OversimError {
    /// The pending queue has no pods; ends the tick's dequeue loop
    #[error("pending queue is empty")]
    EmptyQueue,

    /// No node passed all predicates for the pod; recovered by preemption
    /// or the fail queue
    #[error(transparent)]
    Fit(#[from] FitError),

    /// The node lister returned an empty fleet; fatal for the tick
    #[error("no nodes available to schedule pods")]
    NoNodesAvailable,

    /// A predicate or prioritizer failed; fatal for the tick
    #[error("policy error: {0}")]
    Policy(String),

    /// Invalid scheduler or queue configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A node name was referenced that is not in the node-info map
    #[error("no node named {0}")]
    UnknownNode(String),

    /// A pod was pushed onto a queue that already holds it
    #[error("pod {0} is already queued")]
    DuplicatePod(String),

    /// The simulation context was cancelled during a pipeline phase
    #[error("scheduling cancelled")]
    Cancelled,

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OversimError {
    /// Create a policy error
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is recoverable within a tick (spurs preemption
    /// or the fail queue instead of aborting the Schedule call)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmptyQueue | Self::Fit(_))
    }
}

/// The pod could not be placed on any node.
///
/// Carries the pod, the total fleet size and the failed-predicate-per-node
/// map so preemption can tell curable resource pressure apart from
/// unsatisfiable constraints.
#[derive(Error, Debug, Clone)]
#[error("pod {} does not fit on any of the {} nodes", .pod.key(), .num_all_nodes)]
pub struct FitError {
    /// The pod that failed to schedule
    pub pod: Pod,
    /// Number of nodes the fleet held when filtering ran
    pub num_all_nodes: usize,
    /// Why each node rejected the pod, keyed by node name
    pub failed_predicates: FailedPredicateMap,
}
