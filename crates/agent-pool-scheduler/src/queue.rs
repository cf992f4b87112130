use agent_pool_core::{PoolError, Result, Task};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A task wrapper for priority queue ordering
struct PrioritizedTask(Task);

impl PartialEq for PrioritizedTask {
    fn eq(&self, other: &Self) -> bool {
        self.0.sort_key() == other.0.sort_key()
    }
}

impl Eq for PrioritizedTask {}

impl PartialOrd for PrioritizedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the smallest (priority, arrival_order)
        // must compare greatest.
        other.0.sort_key().cmp(&self.0.sort_key())
    }
}

struct QueueState {
    heap: BinaryHeap<PrioritizedTask>,
    next_order: u64,
}

/// Bounded in-memory priority queue shared by submitters and workers.
///
/// Heap and arrival counter sit behind one mutex; `Notify` plays the role of
/// the condition variable for waiting consumers.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Notify,
    capacity: usize,
}

impl TaskQueue {
    /// Create a queue holding at most `capacity` tasks (0 = unbounded)
    pub fn new(capacity: usize) -> Self {
        TaskQueue {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_order: 0,
            }),
            available: Notify::new(),
            capacity,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Admit a task, failing immediately when the queue is full
    pub fn admit(&self, mut task: Task) -> Result<()> {
        {
            let mut state = self.state.lock();
            if self.capacity > 0 && state.heap.len() >= self.capacity {
                debug!(task_id = %task.id(), capacity = self.capacity, "Queue full, rejecting task");
                return Err(PoolError::AdmissionRejected {
                    capacity: self.capacity,
                });
            }

            task.assign_arrival_order(state.next_order);
            state.next_order += 1;
            state.heap.push(PrioritizedTask(task));
        }

        self.available.notify_one();
        Ok(())
    }

    /// Wait for the most urgent task.
    ///
    /// Returns `Cancelled` once `shutdown` fires, whether or not tasks remain.
    pub async fn take(&self, shutdown: &CancellationToken) -> Result<Task> {
        loop {
            if shutdown.is_cancelled() {
                debug!("Queue wait skipped, shutdown requested");
                return Err(PoolError::Cancelled);
            }

            // Register as a waiter before looking, so an admit between the
            // check and the await is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = self.pop() {
                return Ok(task);
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Queue wait cancelled by shutdown");
                    return Err(PoolError::Cancelled);
                }
                _ = &mut notified => {}
            }
        }
    }

    /// Pop the most urgent task without waiting
    pub fn pop(&self) -> Option<Task> {
        self.state.lock().heap.pop().map(|prioritized| prioritized.0)
    }

    /// Remove every queued task, most urgent first
    pub fn drain(&self) -> Vec<Task> {
        let mut state = self.state.lock();
        let mut tasks = Vec::with_capacity(state.heap.len());
        while let Some(prioritized) = state.heap.pop() {
            tasks.push(prioritized.0);
        }
        tasks
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.len() >= self.capacity
    }

    /// Configured capacity (0 = unbounded)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get count by priority tier: (urgent, normal, background)
    pub fn depth_by_tier(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        let mut urgent = 0;
        let mut normal = 0;
        let mut background = 0;

        for prioritized in state.heap.iter() {
            match prioritized.0.priority().tier() {
                "urgent" => urgent += 1,
                "normal" => normal += 1,
                _ => background += 1,
            }
        }

        (urgent, normal, background)
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_pool_core::{Completion, TaskPayload};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn task(priority: u8, label: &str) -> (Task, Completion) {
        let mut payload = TaskPayload::new();
        payload.insert("prompt".to_string(), json!(label));
        Task::new(priority, payload).unwrap()
    }

    fn label(task: &Task) -> String {
        task.payload()["prompt"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_priority_ordering() {
        let queue = TaskQueue::unbounded();

        queue.admit(task(10, "p10").0).unwrap();
        queue.admit(task(2, "p2-first").0).unwrap();
        queue.admit(task(2, "p2-second").0).unwrap();

        assert_eq!(label(&queue.pop().unwrap()), "p2-first");
        assert_eq!(label(&queue.pop().unwrap()), "p2-second");
        assert_eq!(label(&queue.pop().unwrap()), "p10");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_arrival_order_assigned_on_admission() {
        let queue = TaskQueue::unbounded();

        // Built in one order, admitted in the other.
        let (built_first, _) = task(5, "built-first");
        let (built_second, _) = task(5, "built-second");
        queue.admit(built_second).unwrap();
        queue.admit(built_first).unwrap();

        let first = queue.pop().unwrap();
        let second = queue.pop().unwrap();
        assert_eq!(label(&first), "built-second");
        assert_eq!(first.arrival_order(), Some(0));
        assert_eq!(second.arrival_order(), Some(1));
    }

    #[test]
    fn test_capacity_enforcement() {
        let queue = TaskQueue::new(2);

        queue.admit(task(7, "a").0).unwrap();
        queue.admit(task(7, "b").0).unwrap();
        assert!(queue.is_full());

        match queue.admit(task(7, "c").0) {
            Err(PoolError::AdmissionRejected { capacity: 2 }) => {}
            other => panic!("Expected AdmissionRejected, got {:?}", other.err()),
        }
        assert_eq!(queue.len(), 2);

        queue.pop().unwrap();
        queue.admit(task(7, "d").0).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_unbounded_never_full() {
        let queue = TaskQueue::unbounded();
        for i in 0..500 {
            queue.admit(task((i % 16) as u8, "t").0).unwrap();
        }
        assert!(!queue.is_full());
        assert_eq!(queue.len(), 500);
    }

    #[test]
    fn test_depth_by_tier() {
        let queue = TaskQueue::unbounded();

        queue.admit(task(0, "u").0).unwrap();
        queue.admit(task(7, "n").0).unwrap();
        queue.admit(task(9, "n").0).unwrap();
        queue.admit(task(15, "b").0).unwrap();

        assert_eq!(queue.depth_by_tier(), (1, 2, 1));
    }

    #[test]
    fn test_drain_returns_priority_order() {
        let queue = TaskQueue::unbounded();
        queue.admit(task(9, "low").0).unwrap();
        queue.admit(task(1, "high").0).unwrap();

        let drained: Vec<_> = queue.drain().iter().map(label).collect();
        assert_eq!(drained, vec!["high", "low"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_take_waits_for_admission() {
        let queue = Arc::new(TaskQueue::unbounded());
        let shutdown = CancellationToken::new();

        let waiter = {
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.take(&shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.admit(task(3, "late").0).unwrap();
        let taken = waiter.await.unwrap().unwrap();
        assert_eq!(label(&taken), "late");
    }

    #[tokio::test]
    async fn test_take_cancelled_by_shutdown() {
        let queue = Arc::new(TaskQueue::unbounded());
        let shutdown = CancellationToken::new();

        let waiter = {
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.take(&shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.cancel();

        match waiter.await.unwrap() {
            Err(PoolError::Cancelled) => {}
            other => panic!("Expected Cancelled, got {:?}", other.map(|t| t.id().clone())),
        }
    }

    #[tokio::test]
    async fn test_take_after_cancel_leaves_tasks_queued() {
        let queue = TaskQueue::unbounded();
        let shutdown = CancellationToken::new();
        queue.admit(task(1, "pending").0).unwrap();

        shutdown.cancel();
        assert!(matches!(queue.take(&shutdown).await, Err(PoolError::Cancelled)));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_takers_receive_each_task_once() {
        let queue = Arc::new(TaskQueue::unbounded());
        let shutdown = CancellationToken::new();

        let mut takers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            takers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Ok(task) = queue.take(&shutdown).await {
                    seen.push(task.arrival_order().unwrap());
                }
                seen
            }));
        }

        for i in 0..100 {
            queue.admit(task((i % 16) as u8, "t").0).unwrap();
        }

        while !queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();

        let mut all = Vec::new();
        for taker in takers {
            all.extend(taker.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<u64>>());
    }

    proptest! {
        #[test]
        fn prop_pop_order_is_sorted(priorities in proptest::collection::vec(0u8..=15, 0..64)) {
            let queue = TaskQueue::unbounded();
            for p in &priorities {
                queue.admit(task(*p, "t").0).unwrap();
            }

            let mut keys = Vec::new();
            while let Some(task) = queue.pop() {
                keys.push((task.priority().value(), task.arrival_order().unwrap()));
            }

            let mut expected = keys.clone();
            expected.sort();
            prop_assert_eq!(keys.len(), priorities.len());
            prop_assert_eq!(keys, expected);
        }
    }
}
