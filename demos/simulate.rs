//! Minimal simulation harness driving the scheduler over a few ticks.
//!
//! Demonstrates the harness contract: push arriving pods into the pending
//! queue, publish node metrics, call `schedule`, apply the returned
//! events, advance the clock.

use std::collections::HashMap;
use std::sync::Arc;

use oversim::scheduler::{predicates, priorities};
use oversim::{
    Clock, Event, NodeInfo, NodeMetrics, Pod, PodQueue, PriorityConfig, ResourceVector, Scheduler,
    SchedulerConfig, UsageAwareExtender,
};

const GIB: u64 = 1 << 30;
const TICK_SECONDS: i64 = 1;

fn build_fleet(node_count: usize) -> (Vec<String>, HashMap<String, NodeInfo>) {
    let names: Vec<String> = (0..node_count).map(|i| format!("node-{i}")).collect();
    let map = names
        .iter()
        .map(|name| {
            (
                name.clone(),
                NodeInfo::new(name.clone(), ResourceVector::new(64_000, 128 * GIB)),
            )
        })
        .collect();
    (names, map)
}

/// Pods arriving over the first ticks; tasks of a job share its middle
/// name segment and will spread
fn build_workload(start: Clock) -> Vec<(Clock, Pod)> {
    let mut arrivals = Vec::new();
    for job in 0..4 {
        for task in 0..8 {
            let pod = Pod::new("default", format!("task-j{job}-{task}"))
                .with_request(ResourceVector::new(8_000, 4 * GIB))
                .with_demand_ratio(0.6)
                .with_priority(i32::from(job == 0))
                .with_creation_timestamp(start.add(job));
            arrivals.push((start.add(job), pod));
        }
    }
    arrivals
}

fn main() -> oversim::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut sched = Scheduler::new(SchedulerConfig {
        global_oversub_default: 1.0,
        ..SchedulerConfig::default()
    })?;
    let ctx = sched.context();
    sched.add_predicate("GeneralPredicates", predicates::general_predicates());
    sched.add_prioritizer(PriorityConfig::new(
        "AvoidTasksFromSameJob",
        Arc::new(priorities::least_tasks_from_same_job_map),
        1,
    ));
    sched.add_extender(Box::new(UsageAwareExtender::new(Arc::clone(&ctx))));

    let (names, mut nodes) = build_fleet(4);
    let mut queue = oversim::build_queue(
        sched.config().queue_class,
        sched.config().priority_type,
    );

    let start = Clock::from_rfc3339("2019-01-01T00:00:00+00:00")?;
    let mut arrivals = build_workload(start);
    let mut clock = start;
    let mut bound_total = 0usize;

    for _ in 0..16 {
        // 1) Admit pods that arrived by this tick.
        let (due, later): (Vec<_>, Vec<_>) = arrivals
            .into_iter()
            .partition(|(arrival, _)| !clock.before(arrival));
        arrivals = later;
        for (_, pod) in due {
            queue.push(pod)?;
        }

        // 2) Publish metrics: demand stands in for observed usage.
        for node in nodes.values() {
            ctx.update_metrics(
                node.name(),
                NodeMetrics {
                    usage: *node.demand_sum(),
                    allocatable: *node.allocatable(),
                    request: *node.request_sum(),
                },
            );
        }

        // 3) Schedule and apply the returned events.
        let events = sched.schedule(&clock, queue.as_mut(), &names, &mut nodes)?;
        for event in &events {
            match event {
                Event::Bind(bind) => {
                    bound_total += 1;
                    tracing::info!(pod = %bind.pod.key(), node = %bind.node_name(), "bound");
                }
                Event::Delete(delete) => {
                    if let Some(node) = nodes.get_mut(&delete.node_name) {
                        node.remove_pod(&delete.pod_namespace, &delete.pod_name);
                    }
                    tracing::info!(pod = %delete.pod_name, node = %delete.node_name, "evicted");
                }
            }
        }

        // 4) Advance the virtual clock.
        clock = clock.tick(1, TICK_SECONDS);
    }

    tracing::info!(bound_total, pending = queue.len(), "simulation finished");
    for name in &names {
        let node = &nodes[name];
        tracing::info!(
            node = %name,
            pods = node.pods().len(),
            cpu_requested = node.request_sum().milli_cpu,
            oversub = ctx.oversub_factor(name),
            "final node state"
        );
    }
    Ok(())
}
