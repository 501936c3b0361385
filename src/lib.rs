//! # oversim
//!
//! A discrete-event simulator of a cluster workload scheduler. Given a
//! fleet of virtual nodes, a stream of pods and a pluggable scheduling
//! policy, it advances a virtual clock tick by tick, admits arriving pods
//! into a pending queue, binds each pod to a node through a
//! filter → prioritize → select → bind pipeline and accounts per-node
//! resource usage, far faster than real time.
//!
//! ## Features
//!
//! - **Pluggable policies**: predicate filters, weighted prioritizers and
//!   out-of-band extenders (best-fit, worst-fit, task spreading, ...)
//! - **Dynamic oversubscription**: per-node factors raised while real
//!   usage has headroom, reset when it does not
//! - **Preemption**: minimal victim sets with reprieve and deterministic
//!   node choice
//! - **Parallel fan-out**: bounded-worker filtering and scoring over the
//!   fleet
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use oversim::prelude::*;
//! use oversim::scheduler::{predicates, priorities};
//! use std::sync::Arc;
//!
//! fn main() -> oversim::Result<()> {
//!     let mut sched = Scheduler::new(SchedulerConfig::default())?;
//!     sched.add_predicate("PodFitsResources", predicates::pod_fits_resources());
//!     sched.add_prioritizer(PriorityConfig::new(
//!         "MostRequested",
//!         Arc::new(priorities::most_requested_map),
//!         1,
//!     ));
//!
//!     let mut queue = FifoQueue::new();
//!     queue.push(Pod::new("default", "web-a-0").with_request(ResourceVector::new(500, 1 << 20)))?;
//!
//!     let mut nodes = HashMap::new();
//!     nodes.insert(
//!         "node-0".to_string(),
//!         NodeInfo::new("node-0", ResourceVector::new(8000, 1 << 34)),
//!     );
//!     let fleet = vec!["node-0".to_string()];
//!
//!     let clock = Clock::from_rfc3339("2019-01-01T00:00:00+00:00")?;
//!     let events = sched.schedule(&clock, &mut queue, &fleet, &mut nodes)?;
//!     println!("{} events", events.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod clock;
pub mod context;
pub mod error;
pub mod events;
pub mod node;
pub mod pod;
pub mod queue;
pub mod resources;
pub mod scheduler;

// Re-exports for ergonomic API
pub use clock::Clock;
pub use context::{CancelToken, NodeMetrics, SchedulerContext};
pub use error::{FitError, OversimError, Result};
pub use events::{BindEvent, DeleteEvent, Event, ScheduleResult};
pub use node::{NodeInfo, NodeLister};
pub use pod::Pod;
pub use queue::{build_queue, FifoQueue, PodQueue, PriorityOrder, PriorityQueue, QueueClass};
pub use resources::ResourceVector;
pub use scheduler::{
    Extender, HostPriority, PriorityConfig, PriorityMapFn, Scheduler, SchedulerConfig,
    UsageAwareExtender, MAX_PRIORITY,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::Clock;
    pub use crate::context::{NodeMetrics, SchedulerContext};
    pub use crate::error::Result;
    pub use crate::events::Event;
    pub use crate::node::{NodeInfo, NodeLister};
    pub use crate::pod::Pod;
    pub use crate::queue::{FifoQueue, PodQueue, PriorityQueue};
    pub use crate::resources::ResourceVector;
    pub use crate::scheduler::{PriorityConfig, Scheduler, SchedulerConfig};
}
