//! Preemption: evicting lower-priority pods to make room
//!
//! On a failed fit the driver asks preemption for a node whose
//! lower-priority pods could be evicted so the preemptor fits. Victims are
//! reported as delete events; no bind happens in the same tick because the
//! harness applies deletions asynchronously. The preemptor is nominated to
//! the chosen node instead.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace, warn};

use crate::error::{FitError, OversimError, Result};
use crate::events::{DeleteEvent, Event};
use crate::node::{NodeInfo, NodeLister};
use crate::pod::Pod;
use crate::queue::PodQueue;
use crate::scheduler::predicates::{run_predicates, FailedPredicateMap, Predicate};

/// Try to make room for `preemptor` after a failed fit.
///
/// Returns the delete events for the selected victims; empty when
/// preemption cannot help.
pub(crate) fn preempt(
    registry: &[(String, Predicate)],
    preemptor: &Pod,
    queue: &mut dyn PodQueue,
    node_lister: &dyn NodeLister,
    node_info_map: &HashMap<String, NodeInfo>,
    fit_error: &FitError,
) -> Result<Vec<Event>> {
    if !eligible_to_preempt_others(preemptor, queue, node_info_map) {
        debug!(pod = %preemptor.key(), "not eligible for more preemption");
        return Ok(Vec::new());
    }

    let all_nodes = node_lister.list();
    if all_nodes.is_empty() {
        return Err(OversimError::NoNodesAvailable);
    }

    let potential_nodes = nodes_where_preemption_might_help(&all_nodes, &fit_error.failed_predicates);
    if potential_nodes.is_empty() {
        debug!(pod = %preemptor.key(), "preemption will not help on any node");
        // A stale nomination would only pin the pod to a hopeless node.
        queue.remove_nominated_node(preemptor)?;
        return Ok(Vec::new());
    }

    let mut node_to_victims = BTreeMap::new();
    for name in &potential_nodes {
        let node = node_info_map
            .get(name)
            .ok_or_else(|| OversimError::UnknownNode(name.clone()))?;
        if let Some(victims) = select_victims_on_node(registry, preemptor, node, queue) {
            node_to_victims.insert(name.clone(), victims);
        }
    }

    let Some(chosen) = pick_one_node_for_preemption(&node_to_victims) else {
        return Ok(Vec::new());
    };
    debug!(pod = %preemptor.key(), node = %chosen, "node selected for preemption");

    queue.update_nominated_node(preemptor, &chosen)?;

    // Lower-priority pods nominated to this node may no longer fit there;
    // clearing the hint lets the scheduler find them another place.
    for nominated in queue.nominated_pods(&chosen) {
        if nominated.priority < preemptor.priority {
            trace!(pod = %nominated.key(), "nomination cleared");
            queue.remove_nominated_node(&nominated)?;
        }
    }

    let events = node_to_victims[&chosen]
        .iter()
        .map(|victim| {
            debug!(pod = %victim.key(), node = %chosen, "pod selected as victim");
            Event::Delete(DeleteEvent {
                pod_namespace: victim.namespace.clone(),
                pod_name: victim.name.clone(),
                node_name: chosen.clone(),
            })
        })
        .collect();
    Ok(events)
}

/// A preemptor that already holds a nomination to a live node is expected
/// to land there once its victims terminate; fresh preemption would only
/// evict more pods for the same placement.
fn eligible_to_preempt_others(
    preemptor: &Pod,
    queue: &dyn PodQueue,
    node_info_map: &HashMap<String, NodeInfo>,
) -> bool {
    match queue.nominated_node(preemptor) {
        Some(node) => !node_info_map.contains_key(&node),
        None => true,
    }
}

/// Keep candidate nodes whose recorded failure eviction could cure
fn nodes_where_preemption_might_help(
    all_nodes: &[String],
    failed: &FailedPredicateMap,
) -> Vec<String> {
    all_nodes
        .iter()
        .filter(|name| {
            failed
                .get(*name)
                .map(|failure| failure.is_potentially_curable())
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Fit check used during victim selection.
///
/// Nominated pods of equal or higher priority targeted at this node are
/// assumed to land there first, so they are counted against capacity.
/// Predicate errors are logged and treated as "does not fit".
fn pod_fits_on_node(
    registry: &[(String, Predicate)],
    pod: &Pod,
    node: &NodeInfo,
    queue: &dyn PodQueue,
) -> bool {
    let mut projected = node.clone();
    for nominated in queue.nominated_pods(node.name()) {
        if nominated.priority >= pod.priority
            && nominated.key() != pod.key()
            && !projected.has_pod(&nominated.namespace, &nominated.name)
        {
            projected.add_pod(nominated);
        }
    }
    match run_predicates(registry, pod, &projected) {
        Ok(failure) => failure.is_none(),
        Err(err) => {
            warn!(node = %node.name(), error = %err, "predicate error while selecting victims");
            false
        }
    }
}

/// Find the minimal victim set on one node, or `None` if the node is
/// hopeless even with every lower-priority pod gone.
fn select_victims_on_node(
    registry: &[(String, Predicate)],
    preemptor: &Pod,
    node: &NodeInfo,
    queue: &dyn PodQueue,
) -> Option<Vec<Pod>> {
    let mut copy = node.clone();

    let mut potential_victims: Vec<Pod> = node
        .pods()
        .iter()
        .filter(|p| p.priority < preemptor.priority)
        .cloned()
        .collect();
    for victim in &potential_victims {
        copy.remove_pod(&victim.namespace, &victim.name);
    }

    if !pod_fits_on_node(registry, preemptor, &copy, queue) {
        debug!(
            node = %node.name(),
            pod = %preemptor.key(),
            "preemptor does not fit even with all lower-priority pods removed"
        );
        return None;
    }

    // Reprieve from the highest priority down: re-add each tentative
    // victim and keep it if the preemptor still fits.
    potential_victims.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut victims = Vec::new();
    for candidate in potential_victims {
        copy.add_pod(candidate.clone());
        if !pod_fits_on_node(registry, preemptor, &copy, queue) {
            copy.remove_pod(&candidate.namespace, &candidate.name);
            trace!(pod = %candidate.key(), node = %node.name(), "potential preemption victim");
            victims.push(candidate);
        }
    }
    Some(victims)
}

/// Deterministic, preemption-minimizing node choice.
///
/// Prefers, in order: the lowest highest-victim priority, the smallest
/// victim priority sum, the fewest victims, and finally name order. (A
/// PDB-violation count would come first, but the simulator has no
/// disruption budgets, so it is zero everywhere.)
fn pick_one_node_for_preemption(node_to_victims: &BTreeMap<String, Vec<Pod>>) -> Option<String> {
    let mut best: Option<(&String, (i64, i64, usize))> = None;
    for (name, victims) in node_to_victims {
        let highest = victims
            .iter()
            .map(|p| i64::from(p.priority))
            .max()
            .unwrap_or(i64::MIN);
        let sum: i64 = victims.iter().map(|p| i64::from(p.priority)).sum();
        let key = (highest, sum, victims.len());
        // Strict comparison keeps the earlier (lexicographically smaller)
        // name on ties.
        if best.map(|(_, best_key)| key < best_key).unwrap_or(true) {
            best = Some((name, key));
        }
    }
    best.map(|(name, _)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::FifoQueue;
    use crate::resources::ResourceVector;
    use crate::scheduler::predicates::pod_fits_resources;

    fn registry() -> Vec<(String, Predicate)> {
        vec![("PodFitsResources".to_string(), pod_fits_resources())]
    }

    fn full_node(name: &str, victim_priority: i32) -> NodeInfo {
        let mut node = NodeInfo::new(name, ResourceVector::new(10000, 10000));
        node.add_pod(
            Pod::new("default", format!("victim-{name}-0"))
                .with_request(ResourceVector::new(10000, 10000))
                .with_priority(victim_priority),
        );
        node
    }

    #[test]
    fn test_select_victims_reprieves_when_possible() {
        let mut node = NodeInfo::new("n", ResourceVector::new(10000, 10000));
        node.add_pod(
            Pod::new("default", "small-a-0")
                .with_request(ResourceVector::new(2000, 2000))
                .with_priority(1),
        );
        node.add_pod(
            Pod::new("default", "big-b-0")
                .with_request(ResourceVector::new(7000, 7000))
                .with_priority(2),
        );

        // Needs 8000: evicting only the big pod suffices, the small one is
        // reprieved.
        let preemptor = Pod::new("default", "hi-c-0")
            .with_request(ResourceVector::new(8000, 8000))
            .with_priority(10);
        let queue = FifoQueue::new();
        let victims = select_victims_on_node(&registry(), &preemptor, &node, &queue).unwrap();
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].name, "big-b-0");
    }

    #[test]
    fn test_hopeless_node_yields_none() {
        let mut node = full_node("n", 1);
        // A higher-priority pod the preemptor cannot evict.
        node.add_pod(
            Pod::new("default", "pinned-p-0")
                .with_request(ResourceVector::new(5000, 5000))
                .with_priority(100),
        );
        let preemptor = Pod::new("default", "hi-c-0")
            .with_request(ResourceVector::new(8000, 8000))
            .with_priority(10);
        let queue = FifoQueue::new();
        assert!(select_victims_on_node(&registry(), &preemptor, &node, &queue).is_none());
    }

    #[test]
    fn test_pick_node_minimizes_highest_victim_priority() {
        let mut map = BTreeMap::new();
        map.insert(
            "x".to_string(),
            vec![Pod::new("default", "vx-a-0").with_priority(1)],
        );
        map.insert(
            "y".to_string(),
            vec![Pod::new("default", "vy-a-0").with_priority(5)],
        );
        assert_eq!(pick_one_node_for_preemption(&map).as_deref(), Some("x"));
    }

    #[test]
    fn test_pick_node_prefers_fewer_victims_then_name() {
        let mut map = BTreeMap::new();
        map.insert(
            "b".to_string(),
            vec![
                Pod::new("default", "v1-a-0").with_priority(1),
                Pod::new("default", "v2-a-0").with_priority(1),
            ],
        );
        map.insert(
            "c".to_string(),
            vec![
                Pod::new("default", "v3-a-0").with_priority(1),
                Pod::new("default", "v4-a-0").with_priority(1),
            ],
        );
        // b and c tie on every dimension; name order decides.
        assert_eq!(pick_one_node_for_preemption(&map).as_deref(), Some("b"));

        map.insert(
            "a".to_string(),
            vec![Pod::new("default", "v5-a-0").with_priority(1)],
        );
        assert_eq!(pick_one_node_for_preemption(&map).as_deref(), Some("a"));
    }

    #[test]
    fn test_nominated_pods_count_against_capacity() {
        let node = NodeInfo::new("n", ResourceVector::new(10000, 10000));
        let mut queue = FifoQueue::new();
        let rival = Pod::new("default", "rival-r-0")
            .with_request(ResourceVector::new(6000, 6000))
            .with_priority(20);
        queue.push(rival.clone()).unwrap();
        queue.update_nominated_node(&rival, "n").unwrap();

        let pod = Pod::new("default", "p-q-0")
            .with_request(ResourceVector::new(6000, 6000))
            .with_priority(10);
        assert!(!pod_fits_on_node(&registry(), &pod, &node, &queue));

        // Without the rival nomination the pod fits.
        queue.remove_nominated_node(&rival).unwrap();
        assert!(pod_fits_on_node(&registry(), &pod, &node, &queue));
    }

    #[test]
    fn test_eligibility() {
        let mut node_map = HashMap::new();
        node_map.insert("n".to_string(), full_node("n", 1));
        let mut queue = FifoQueue::new();
        let pod = Pod::new("default", "p-q-0").with_priority(10);
        queue.push(pod.clone()).unwrap();

        assert!(eligible_to_preempt_others(&pod, &queue, &node_map));
        queue.update_nominated_node(&pod, "n").unwrap();
        assert!(!eligible_to_preempt_others(&pod, &queue, &node_map));
        // A nomination to a node that left the fleet is stale.
        queue.update_nominated_node(&pod, "gone").unwrap();
        assert!(eligible_to_preempt_others(&pod, &queue, &node_map));
    }
}
