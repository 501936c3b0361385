//! Pending-pod queues
//!
//! Two variants behind one contract: insertion-ordered FIFO and a priority
//! queue with FIFO ordering inside equal keys. Both track preemption
//! nominations in a side map so recording a hint never reorders the queue.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{OversimError, Result};
use crate::pod::Pod;

/// Which queue variant the harness should build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueClass {
    /// Insertion-ordered queue
    #[default]
    Fifo,
    /// Priority queue ordered by [`PriorityOrder`]
    Priority,
}

/// Ordering key for the priority queue variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityOrder {
    /// Pod priority descending, ties broken by creation timestamp ascending
    #[default]
    PodPriority,
    /// Request size descending, CPU-dominant: milli CPU first, then memory,
    /// ties broken by creation timestamp ascending
    LargestRequestFirst,
}

/// Contract shared by every pending-pod queue.
///
/// The scheduling driver peeks with `front` and only `pop`s after a
/// successful bind, so an unschedulable pod stays at the head unless the
/// fail-budget policy moves it.
pub trait PodQueue: Send {
    /// Append a pod; errors if a pod with the same key is already queued
    fn push(&mut self, pod: Pod) -> Result<()>;

    /// Peek the head without removing it
    fn front(&self) -> Result<Pod>;

    /// Remove and return the head
    fn pop(&mut self) -> Result<Pod>;

    /// Number of queued pods
    fn len(&self) -> usize;

    /// Whether the queue is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a preemption hint for the pod; does not change queue order
    fn update_nominated_node(&mut self, pod: &Pod, node_name: &str) -> Result<()>;

    /// Drop the pod's preemption hint, if any
    fn remove_nominated_node(&mut self, pod: &Pod) -> Result<()>;

    /// The pod's current preemption hint, if any
    fn nominated_node(&self, pod: &Pod) -> Option<String>;

    /// Queued pods nominated to the given node, sorted by key
    fn nominated_pods(&self, node_name: &str) -> Vec<Pod>;
}

/// Pod-key to node-name nomination hints shared by both queue variants
#[derive(Debug, Default, Clone)]
struct Nominations(HashMap<String, String>);

impl Nominations {
    fn set(&mut self, pod: &Pod, node_name: &str) {
        self.0.insert(pod.key(), node_name.to_string());
    }

    fn clear(&mut self, pod: &Pod) {
        self.0.remove(&pod.key());
    }

    fn get(&self, pod: &Pod) -> Option<String> {
        self.0.get(&pod.key()).cloned()
    }

    /// Clone `pod` with its nomination annotation filled in
    fn annotate(&self, pod: &Pod) -> Pod {
        let mut pod = pod.clone();
        pod.nominated_node = self.0.get(&pod.key()).cloned();
        pod
    }

    fn pods_for_node<'a>(
        &self,
        node_name: &str,
        pods: impl Iterator<Item = &'a Pod>,
    ) -> Vec<Pod> {
        let mut nominated: Vec<Pod> = pods
            .filter(|p| self.0.get(&p.key()).map(String::as_str) == Some(node_name))
            .map(|p| self.annotate(p))
            .collect();
        nominated.sort_by_key(Pod::key);
        nominated
    }
}

/// Insertion-ordered pending queue
#[derive(Debug, Default)]
pub struct FifoQueue {
    pods: VecDeque<Pod>,
    keys: HashSet<String>,
    nominations: Nominations,
}

impl FifoQueue {
    /// Create an empty FIFO queue
    pub fn new() -> Self {
        Self::default()
    }
}

impl PodQueue for FifoQueue {
    fn push(&mut self, pod: Pod) -> Result<()> {
        if !self.keys.insert(pod.key()) {
            return Err(OversimError::DuplicatePod(pod.key()));
        }
        self.pods.push_back(pod);
        Ok(())
    }

    fn front(&self) -> Result<Pod> {
        self.pods
            .front()
            .map(|p| self.nominations.annotate(p))
            .ok_or(OversimError::EmptyQueue)
    }

    fn pop(&mut self) -> Result<Pod> {
        let pod = self.pods.pop_front().ok_or(OversimError::EmptyQueue)?;
        self.keys.remove(&pod.key());
        Ok(self.nominations.annotate(&pod))
    }

    fn len(&self) -> usize {
        self.pods.len()
    }

    fn update_nominated_node(&mut self, pod: &Pod, node_name: &str) -> Result<()> {
        self.nominations.set(pod, node_name);
        Ok(())
    }

    fn remove_nominated_node(&mut self, pod: &Pod) -> Result<()> {
        self.nominations.clear(pod);
        Ok(())
    }

    fn nominated_node(&self, pod: &Pod) -> Option<String> {
        self.nominations.get(pod)
    }

    fn nominated_pods(&self, node_name: &str) -> Vec<Pod> {
        self.nominations.pods_for_node(node_name, self.pods.iter())
    }
}

/// Queued pod wrapper carrying the sequence number that makes the heap
/// ordering total and therefore deterministic
#[derive(Debug)]
struct QueuedPod {
    pod: Pod,
    sequence: u64,
    order: PriorityOrder,
}

impl PartialEq for QueuedPod {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedPod {}

impl PartialOrd for QueuedPod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedPod {
    fn cmp(&self, other: &Self) -> Ordering {
        let key = match self.order {
            // Higher pod priority pops first.
            PriorityOrder::PodPriority => self.pod.priority.cmp(&other.pod.priority),
            // Larger request pops first, CPU-dominant.
            PriorityOrder::LargestRequestFirst => self
                .pod
                .request
                .milli_cpu
                .cmp(&other.pod.request.milli_cpu)
                .then(self.pod.request.memory.cmp(&other.pod.request.memory)),
        };
        key
            // Earlier creation pops first; pods without a timestamp sort
            // as earliest.
            .then(
                other
                    .pod
                    .creation_timestamp
                    .cmp(&self.pod.creation_timestamp),
            )
            // Lower sequence pops first, keeping equal keys FIFO.
            .then(other.sequence.cmp(&self.sequence))
    }
}

/// Priority-ordered pending queue
#[derive(Debug)]
pub struct PriorityQueue {
    heap: BinaryHeap<QueuedPod>,
    keys: HashSet<String>,
    nominations: Nominations,
    order: PriorityOrder,
    sequence: u64,
}

impl PriorityQueue {
    /// Create an empty queue with the given ordering
    pub fn new(order: PriorityOrder) -> Self {
        Self {
            heap: BinaryHeap::new(),
            keys: HashSet::new(),
            nominations: Nominations::default(),
            order,
            sequence: 0,
        }
    }
}

impl PodQueue for PriorityQueue {
    fn push(&mut self, pod: Pod) -> Result<()> {
        if !self.keys.insert(pod.key()) {
            return Err(OversimError::DuplicatePod(pod.key()));
        }
        self.heap.push(QueuedPod {
            pod,
            sequence: self.sequence,
            order: self.order,
        });
        self.sequence += 1;
        Ok(())
    }

    fn front(&self) -> Result<Pod> {
        self.heap
            .peek()
            .map(|q| self.nominations.annotate(&q.pod))
            .ok_or(OversimError::EmptyQueue)
    }

    fn pop(&mut self) -> Result<Pod> {
        let queued = self.heap.pop().ok_or(OversimError::EmptyQueue)?;
        self.keys.remove(&queued.pod.key());
        Ok(self.nominations.annotate(&queued.pod))
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn update_nominated_node(&mut self, pod: &Pod, node_name: &str) -> Result<()> {
        self.nominations.set(pod, node_name);
        Ok(())
    }

    fn remove_nominated_node(&mut self, pod: &Pod) -> Result<()> {
        self.nominations.clear(pod);
        Ok(())
    }

    fn nominated_node(&self, pod: &Pod) -> Option<String> {
        self.nominations.get(pod)
    }

    fn nominated_pods(&self, node_name: &str) -> Vec<Pod> {
        self.nominations
            .pods_for_node(node_name, self.heap.iter().map(|q| &q.pod))
    }
}

/// Build the queue variant a config asks for
pub fn build_queue(class: QueueClass, order: PriorityOrder) -> Box<dyn PodQueue> {
    match class {
        QueueClass::Fifo => Box::new(FifoQueue::new()),
        QueueClass::Priority => Box::new(PriorityQueue::new(order)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::resources::ResourceVector;

    fn clock(secs: i64) -> Clock {
        Clock::from_rfc3339("2019-01-01T00:00:00+00:00")
            .unwrap()
            .add(secs)
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = FifoQueue::new();
        queue.push(Pod::new("default", "a")).unwrap();
        queue.push(Pod::new("default", "b")).unwrap();

        assert_eq!(queue.front().unwrap().name, "a");
        assert_eq!(queue.pop().unwrap().name, "a");
        assert_eq!(queue.pop().unwrap().name, "b");
        assert!(matches!(queue.pop(), Err(OversimError::EmptyQueue)));
    }

    #[test]
    fn test_duplicate_push() {
        let mut queue = FifoQueue::new();
        queue.push(Pod::new("default", "a")).unwrap();
        assert!(matches!(
            queue.push(Pod::new("default", "a")),
            Err(OversimError::DuplicatePod(_))
        ));
        // Popping frees the key for re-submission.
        queue.pop().unwrap();
        queue.push(Pod::new("default", "a")).unwrap();
    }

    #[test]
    fn test_priority_order() {
        let mut queue = PriorityQueue::new(PriorityOrder::PodPriority);
        queue
            .push(Pod::new("default", "low").with_priority(1))
            .unwrap();
        queue
            .push(Pod::new("default", "high").with_priority(10))
            .unwrap();
        queue
            .push(Pod::new("default", "mid").with_priority(5))
            .unwrap();

        assert_eq!(queue.pop().unwrap().name, "high");
        assert_eq!(queue.pop().unwrap().name, "mid");
        assert_eq!(queue.pop().unwrap().name, "low");
    }

    #[test]
    fn test_priority_creation_tiebreak() {
        let mut queue = PriorityQueue::new(PriorityOrder::PodPriority);
        queue
            .push(
                Pod::new("default", "younger")
                    .with_priority(5)
                    .with_creation_timestamp(clock(10)),
            )
            .unwrap();
        queue
            .push(
                Pod::new("default", "older")
                    .with_priority(5)
                    .with_creation_timestamp(clock(0)),
            )
            .unwrap();

        assert_eq!(queue.pop().unwrap().name, "older");
        assert_eq!(queue.pop().unwrap().name, "younger");
    }

    #[test]
    fn test_largest_request_first_is_cpu_dominant() {
        let mut queue = PriorityQueue::new(PriorityOrder::LargestRequestFirst);
        queue
            .push(Pod::new("default", "small").with_request(ResourceVector::new(1000, 9999)))
            .unwrap();
        queue
            .push(Pod::new("default", "big").with_request(ResourceVector::new(4000, 1)))
            .unwrap();
        queue
            .push(Pod::new("default", "mid-hi-mem").with_request(ResourceVector::new(2000, 512)))
            .unwrap();
        queue
            .push(Pod::new("default", "mid-lo-mem").with_request(ResourceVector::new(2000, 256)))
            .unwrap();

        assert_eq!(queue.pop().unwrap().name, "big");
        assert_eq!(queue.pop().unwrap().name, "mid-hi-mem");
        assert_eq!(queue.pop().unwrap().name, "mid-lo-mem");
        assert_eq!(queue.pop().unwrap().name, "small");
    }

    #[test]
    fn test_equal_keys_stay_fifo() {
        let mut queue = PriorityQueue::new(PriorityOrder::PodPriority);
        for name in ["first", "second", "third"] {
            queue
                .push(Pod::new("default", name).with_priority(7))
                .unwrap();
        }
        assert_eq!(queue.pop().unwrap().name, "first");
        assert_eq!(queue.pop().unwrap().name, "second");
        assert_eq!(queue.pop().unwrap().name, "third");
    }

    #[test]
    fn test_nominations() {
        let mut queue = FifoQueue::new();
        let a = Pod::new("default", "a").with_priority(1);
        let b = Pod::new("default", "b").with_priority(2);
        queue.push(a.clone()).unwrap();
        queue.push(b.clone()).unwrap();

        queue.update_nominated_node(&a, "node-1").unwrap();
        queue.update_nominated_node(&b, "node-1").unwrap();
        assert_eq!(queue.nominated_node(&a).as_deref(), Some("node-1"));

        let nominated = queue.nominated_pods("node-1");
        assert_eq!(nominated.len(), 2);
        assert_eq!(nominated[0].nominated_node.as_deref(), Some("node-1"));

        queue.remove_nominated_node(&a).unwrap();
        assert_eq!(queue.nominated_node(&a), None);
        assert_eq!(queue.nominated_pods("node-1").len(), 1);
        // Clearing a nomination that is already gone is not an error.
        queue.remove_nominated_node(&a).unwrap();

        // Nomination does not change queue order.
        assert_eq!(queue.front().unwrap().name, "a");
    }

    #[test]
    fn test_build_queue() {
        let mut queue = build_queue(QueueClass::Priority, PriorityOrder::PodPriority);
        queue
            .push(Pod::new("default", "lo").with_priority(0))
            .unwrap();
        queue
            .push(Pod::new("default", "hi").with_priority(9))
            .unwrap();
        assert_eq!(queue.front().unwrap().name, "hi");
    }
}
