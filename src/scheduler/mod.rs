//! The scheduling driver
//!
//! One `Scheduler` serves one simulation. Per tick the harness calls
//! [`Scheduler::schedule`], which first lets the oversubscription
//! controller adjust every node's factor, then repeatedly peeks the
//! pending queue and runs the filter → prioritize → select → bind
//! pipeline against the current node state. Binds and preemption victims
//! come back as events; the harness applies them and advances the clock.

pub mod extender;
pub mod fanout;
pub mod oversub;
pub mod predicates;
pub mod preemption;
pub mod priorities;

use std::collections::HashMap;
use std::sync::Arc;

use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::context::SchedulerContext;
use crate::error::{FitError, OversimError, Result};
use crate::events::{BindEvent, Event, ScheduleResult};
use crate::node::{NodeInfo, NodeLister};
use crate::pod::Pod;
use crate::queue::{FifoQueue, PodQueue, PriorityOrder, QueueClass};

pub use extender::{Extender, UsageAwareExtender};
pub use fanout::DEFAULT_WORKER_NUM;
pub use oversub::{OversubController, MAX_OVERSUB, OVERSUB_SLACK, OVERSUB_STEP};
pub use predicates::{FailedPredicateMap, Predicate, PredicateFailure, PredicateOutcome};
pub use priorities::{HostPriority, PriorityConfig, PriorityMapFn, MAX_PRIORITY};

use fanout::{build_pool, fan_out};
use predicates::run_predicates;

/// Recognized scheduler options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Evict lower-priority pods when a pod fits nowhere
    pub preemption_enabled: bool,
    /// Move unschedulable pods to the back instead of blocking the head
    pub keep_scheduling: bool,
    /// How many pods may fail per tick before keep-scheduling gives up
    pub keep_scheduling_timeout: usize,
    /// Queue variant the harness should build
    pub queue_class: QueueClass,
    /// Ordering of the priority queue variant
    pub priority_type: PriorityOrder,
    /// Initial per-node oversubscription factor
    pub global_oversub_default: f64,
    /// Fan-out parallelism for filtering and prioritizing
    pub worker_num: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            preemption_enabled: false,
            keep_scheduling: false,
            keep_scheduling_timeout: 64,
            queue_class: QueueClass::default(),
            priority_type: PriorityOrder::default(),
            global_oversub_default: 1.0,
            worker_num: DEFAULT_WORKER_NUM,
        }
    }
}

/// The scheduling driver
pub struct Scheduler {
    config: SchedulerConfig,
    context: Arc<SchedulerContext>,
    predicates: Vec<(String, Predicate)>,
    prioritizers: Vec<PriorityConfig>,
    extenders: Vec<Box<dyn Extender>>,
    oversub: OversubController,
    fail_queue: FifoQueue,
    pool: ThreadPool,
}

impl Scheduler {
    /// Create a driver and its shared context from a config
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let pool = build_pool(config.worker_num)?;
        let context = SchedulerContext::new(config.global_oversub_default);
        Ok(Self {
            config,
            context,
            predicates: Vec::new(),
            prioritizers: Vec::new(),
            extenders: Vec::new(),
            oversub: OversubController::new(),
            fail_queue: FifoQueue::new(),
            pool,
        })
    }

    /// Register a predicate; evaluation order is registration order
    pub fn add_predicate(&mut self, name: impl Into<String>, predicate: Predicate) {
        self.predicates.push((name.into(), predicate));
    }

    /// Register a weighted prioritizer
    pub fn add_prioritizer(&mut self, config: PriorityConfig) {
        self.prioritizers.push(config);
    }

    /// Register an extender, invoked after the in-process plugins
    pub fn add_extender(&mut self, extender: Box<dyn Extender>) {
        self.extenders.push(extender);
    }

    /// The shared context the harness publishes metrics into
    pub fn context(&self) -> Arc<SchedulerContext> {
        Arc::clone(&self.context)
    }

    /// The driver's configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one scheduling tick.
    ///
    /// Returns the bind and delete events for the harness to apply, in
    /// decision order. An empty queue returns `Ok` with no events and
    /// mutates nothing.
    pub fn schedule(
        &mut self,
        clock: &Clock,
        queue: &mut dyn PodQueue,
        node_lister: &dyn NodeLister,
        node_info_map: &mut HashMap<String, NodeInfo>,
    ) -> Result<Vec<Event>> {
        let node_names: Vec<String> = node_info_map.keys().cloned().collect();
        self.oversub.update(&self.context, &node_names);

        let mut events = Vec::new();
        loop {
            // Cancellation is observed between pods, never mid-pipeline.
            if self.context.is_cancelled() {
                debug!("scheduling cancelled");
                break;
            }

            let pod = match queue.front() {
                Ok(pod) => pod,
                Err(OversimError::EmptyQueue) => break,
                Err(err) => return Err(err),
            };
            trace!(pod = %pod.key(), clock = %clock, "trying to schedule pod");

            match self.schedule_one(&pod, node_lister, node_info_map) {
                Ok(result) => {
                    debug!(pod = %pod.key(), node = %result.suggested_host, "selected node");

                    let mut bound = queue.pop()?;
                    queue.remove_nominated_node(&bound)?;
                    bound.nominated_node = None;

                    let node = node_info_map
                        .get_mut(&result.suggested_host)
                        .ok_or_else(|| OversimError::UnknownNode(result.suggested_host.clone()))?;
                    node.add_pod(bound.clone());
                    events.push(Event::Bind(BindEvent {
                        pod: bound,
                        schedule_result: result,
                    }));
                }
                Err(OversimError::Fit(fit_error)) => {
                    debug!(pod = %pod.key(), "pod does not fit on any node");

                    if self.config.keep_scheduling {
                        self.fail_queue.push(pod)?;
                        queue.pop()?;
                        if self.fail_queue.len() > self.config.keep_scheduling_timeout {
                            debug!("fail budget exhausted, ending tick");
                            break;
                        }
                    } else if self.config.preemption_enabled {
                        debug!(pod = %pod.key(), "trying preemption");
                        events.extend(preemption::preempt(
                            &self.predicates,
                            &pod,
                            queue,
                            node_lister,
                            node_info_map,
                            &fit_error,
                        )?);
                        // Victims must terminate before the preemptor can
                        // bind, so this tick's loop ends here.
                        break;
                    } else {
                        break;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        if self.config.keep_scheduling {
            self.drain_fail_queue(queue)?;
        }
        Ok(events)
    }

    /// Move failed pods back into the pending queue, preserving order
    fn drain_fail_queue(&mut self, queue: &mut dyn PodQueue) -> Result<()> {
        loop {
            match self.fail_queue.pop() {
                Ok(pod) => queue.push(pod)?,
                Err(OversimError::EmptyQueue) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// Make a placement decision for one pod against the current fleet
    fn schedule_one(
        &self,
        pod: &Pod,
        node_lister: &dyn NodeLister,
        node_info_map: &HashMap<String, NodeInfo>,
    ) -> Result<ScheduleResult> {
        let nodes = node_lister.list();
        if nodes.is_empty() {
            return Err(OversimError::NoNodesAvailable);
        }

        let (filtered, failed) = self.filter(pod, &nodes, node_info_map)?;
        trace!(pod = %pod.key(), feasible = filtered.len(), "nodes filtered");

        match filtered.len() {
            0 => Err(FitError {
                pod: pod.clone(),
                num_all_nodes: nodes.len(),
                failed_predicates: failed,
            }
            .into()),
            1 => Ok(ScheduleResult {
                suggested_host: filtered[0].clone(),
                evaluated_nodes: 1 + failed.len(),
                feasible_nodes: 1,
            }),
            feasible => {
                let priorities = self.prioritize(pod, &filtered, node_info_map)?;
                trace!(pod = %pod.key(), ?priorities, "nodes prioritized");
                Ok(ScheduleResult {
                    suggested_host: Self::select_host(&priorities)?,
                    evaluated_nodes: feasible + failed.len(),
                    feasible_nodes: feasible,
                })
            }
        }
    }

    /// Drop nodes that cannot accommodate the pod: in-process predicates
    /// fan out across the pool, then extenders run in series over the
    /// survivors
    fn filter(
        &self,
        pod: &Pod,
        nodes: &[String],
        node_info_map: &HashMap<String, NodeInfo>,
    ) -> Result<(Vec<String>, FailedPredicateMap)> {
        let slots = fan_out(&self.pool, nodes, &self.context.cancel_token(), |_, name| {
            let node = node_info_map
                .get(name)
                .ok_or_else(|| OversimError::UnknownNode(name.clone()))?;
            run_predicates(&self.predicates, pod, node)
        });

        let mut filtered = Vec::with_capacity(nodes.len());
        let mut failed = FailedPredicateMap::new();
        for (name, slot) in nodes.iter().zip(slots) {
            match slot.ok_or(OversimError::Cancelled)?? {
                None => filtered.push(name.clone()),
                Some(failure) => {
                    failed.insert(name.clone(), failure);
                }
            }
        }

        if !filtered.is_empty() {
            for ext in &self.extenders {
                filtered = ext.filter(pod, filtered, &mut failed)?;
                if filtered.is_empty() {
                    break;
                }
            }
        }
        Ok((filtered, failed))
    }

    /// Score the filtered nodes: each prioritizer fans out across the
    /// pool, then extender scores are added in series
    fn prioritize(
        &self,
        pod: &Pod,
        filtered: &[String],
        node_info_map: &HashMap<String, NodeInfo>,
    ) -> Result<Vec<HostPriority>> {
        if self.prioritizers.is_empty() && self.extenders.is_empty() {
            // Rank all nodes equally so host selection still has a
            // well-formed input.
            return filtered
                .iter()
                .map(|name| {
                    let node = node_info_map
                        .get(name)
                        .ok_or_else(|| OversimError::UnknownNode(name.clone()))?;
                    Ok(HostPriority {
                        host: name.clone(),
                        score: priorities::equal_priority_map(pod, node)?,
                    })
                })
                .collect();
        }

        let mut scores = vec![0i64; filtered.len()];
        for config in &self.prioritizers {
            let slots = fan_out(&self.pool, filtered, &self.context.cancel_token(), |_, name| {
                let node = node_info_map
                    .get(name)
                    .ok_or_else(|| OversimError::UnknownNode(name.clone()))?;
                (config.map)(pod, node)
            });
            for (i, slot) in slots.into_iter().enumerate() {
                scores[i] += config.weight * slot.ok_or(OversimError::Cancelled)??;
            }
        }

        for ext in &self.extenders {
            for priority in ext.prioritize(pod, filtered)? {
                if let Some(i) = filtered.iter().position(|name| *name == priority.host) {
                    scores[i] += ext.weight() * priority.score;
                }
            }
        }

        Ok(filtered
            .iter()
            .zip(scores)
            .map(|(host, score)| HostPriority {
                host: host.clone(),
                score,
            })
            .collect())
    }

    /// Pick the best-scoring node: the last one at the maximum score.
    ///
    /// Round-robin among the maxima would make best-fit nondeterministic;
    /// the last-index rule keeps runs reproducible and reduces spread on
    /// equally scored nodes.
    fn select_host(priorities: &[HostPriority]) -> Result<String> {
        let max = priorities
            .iter()
            .map(|p| p.score)
            .max()
            .ok_or_else(|| OversimError::policy("empty priority list"))?;
        priorities
            .iter()
            .rev()
            .find(|p| p.score == max)
            .map(|p| p.host.clone())
            .ok_or_else(|| OversimError::policy("empty priority list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceVector;

    fn clock() -> Clock {
        Clock::from_rfc3339("2019-01-01T00:00:00+00:00").unwrap()
    }

    fn fleet(specs: &[(&str, u64)]) -> (Vec<String>, HashMap<String, NodeInfo>) {
        let names: Vec<String> = specs.iter().map(|(n, _)| n.to_string()).collect();
        let map = specs
            .iter()
            .map(|(name, cpu)| {
                (
                    name.to_string(),
                    NodeInfo::new(*name, ResourceVector::new(*cpu, 1 << 30)),
                )
            })
            .collect();
        (names, map)
    }

    fn basic_scheduler(config: SchedulerConfig) -> Scheduler {
        let mut sched = Scheduler::new(config).unwrap();
        sched.add_predicate("PodFitsResources", predicates::pod_fits_resources());
        sched
    }

    #[test]
    fn test_empty_queue_is_a_noop() {
        let mut sched = basic_scheduler(SchedulerConfig::default());
        let mut queue = FifoQueue::new();
        let (names, mut map) = fleet(&[("a", 10000)]);

        let events = sched
            .schedule(&clock(), &mut queue, &names, &mut map)
            .unwrap();
        assert!(events.is_empty());
        assert!(map["a"].pods().is_empty());
    }

    #[test]
    fn test_exact_fit_binds() {
        let mut sched = basic_scheduler(SchedulerConfig::default());
        let mut queue = FifoQueue::new();
        let (names, mut map) = fleet(&[("a", 3000)]);
        queue
            .push(Pod::new("default", "p-x-0").with_request(ResourceVector::new(3000, 0)))
            .unwrap();

        let events = sched
            .schedule(&clock(), &mut queue, &names, &mut map)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_bind().unwrap().node_name(), "a");
        assert!(queue.is_empty());
        assert!(map["a"].has_pod("default", "p-x-0"));
    }

    #[test]
    fn test_unschedulable_pod_stays_at_head() {
        let mut sched = basic_scheduler(SchedulerConfig::default());
        let mut queue = FifoQueue::new();
        let (names, mut map) = fleet(&[("a", 1000)]);
        queue
            .push(Pod::new("default", "p-x-0").with_request(ResourceVector::new(2000, 0)))
            .unwrap();

        let events = sched
            .schedule(&clock(), &mut queue, &names, &mut map)
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(queue.front().unwrap().name, "p-x-0");
    }

    #[test]
    fn test_empty_fleet_is_fatal() {
        let mut sched = basic_scheduler(SchedulerConfig::default());
        let mut queue = FifoQueue::new();
        queue.push(Pod::new("default", "p-x-0")).unwrap();
        let mut map = HashMap::new();

        let empty_fleet: Vec<String> = Vec::new();
        let err = sched
            .schedule(&clock(), &mut queue, &empty_fleet, &mut map)
            .unwrap_err();
        assert!(matches!(err, OversimError::NoNodesAvailable));
    }

    #[test]
    fn test_select_host_takes_last_max() {
        let priorities = vec![
            HostPriority {
                host: "a".to_string(),
                score: 7,
            },
            HostPriority {
                host: "b".to_string(),
                score: 7,
            },
            HostPriority {
                host: "c".to_string(),
                score: 3,
            },
        ];
        assert_eq!(Scheduler::select_host(&priorities).unwrap(), "b");
        assert!(Scheduler::select_host(&[]).is_err());
    }

    #[test]
    fn test_keep_scheduling_moves_failures_to_the_back() {
        let mut sched = basic_scheduler(SchedulerConfig {
            keep_scheduling: true,
            keep_scheduling_timeout: 8,
            ..SchedulerConfig::default()
        });
        let mut queue = FifoQueue::new();
        let (names, mut map) = fleet(&[("a", 3000)]);

        queue
            .push(Pod::new("default", "huge-x-0").with_request(ResourceVector::new(9000, 0)))
            .unwrap();
        queue
            .push(Pod::new("default", "small-y-0").with_request(ResourceVector::new(1000, 0)))
            .unwrap();

        let events = sched
            .schedule(&clock(), &mut queue, &names, &mut map)
            .unwrap();
        // The huge pod no longer blocks the head; the small one binds.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_bind().unwrap().pod.name, "small-y-0");
        // The failed pod was drained back and waits for the next tick.
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().name, "huge-x-0");
    }

    #[test]
    fn test_keep_scheduling_fail_budget_ends_tick() {
        let mut sched = basic_scheduler(SchedulerConfig {
            keep_scheduling: true,
            keep_scheduling_timeout: 1,
            ..SchedulerConfig::default()
        });
        let mut queue = FifoQueue::new();
        let (names, mut map) = fleet(&[("a", 3000)]);

        for i in 0..3 {
            queue
                .push(
                    Pod::new("default", format!("huge-x-{i}"))
                        .with_request(ResourceVector::new(9000, 0)),
                )
                .unwrap();
        }
        queue
            .push(Pod::new("default", "small-y-0").with_request(ResourceVector::new(1000, 0)))
            .unwrap();

        let events = sched
            .schedule(&clock(), &mut queue, &names, &mut map)
            .unwrap();
        // The budget (1) is exceeded after the second failure, so the
        // small pod is never reached this tick.
        assert!(events.is_empty());
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_cancelled_context_ends_tick_between_pods() {
        let mut sched = basic_scheduler(SchedulerConfig::default());
        sched.context().cancel_token().cancel();
        let mut queue = FifoQueue::new();
        let (names, mut map) = fleet(&[("a", 3000)]);
        queue
            .push(Pod::new("default", "p-x-0").with_request(ResourceVector::new(1000, 0)))
            .unwrap();

        let events = sched
            .schedule(&clock(), &mut queue, &names, &mut map)
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(queue.len(), 1);
    }
}
