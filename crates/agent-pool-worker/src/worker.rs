use crate::executor::HandlerExecutor;
use crate::handler::HandlerRegistry;
use agent_pool_core::{PoolError, Task};
use agent_pool_scheduler::{PoolMetrics, TaskQueue};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One execution loop draining the shared queue
struct Worker {
    worker_id: usize,
    queue: Arc<TaskQueue>,
    registry: HandlerRegistry,
    metrics: Arc<PoolMetrics>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.worker_id, "Worker started");
        let _active = ActiveWorker::enter(self.metrics.clone());

        // Cancellation is only observed inside `take`, so a handler call in
        // progress always finishes first.
        while let Ok(task) = self.queue.take(&self.shutdown).await {
            self.metrics.update_queue_depth(self.queue.depth_by_tier());
            self.execute_task(task).await;
        }

        info!(worker = self.worker_id, "Worker cancelled");
    }

    async fn execute_task(&self, task: Task) {
        let priority = task.priority();
        let created_at = task.created_at();
        let (task_id, payload, handle) = task.into_parts();

        debug!(
            worker = self.worker_id,
            task_id = %task_id,
            priority = priority.value(),
            created_at = %created_at,
            "Executing task"
        );

        let outcome = match self.registry.current() {
            Some(handler) => {
                let in_flight = InFlight::enter(&self.metrics);
                let started = Instant::now();

                let outcome = HandlerExecutor::new(handler).execute(&task_id, payload).await;

                self.metrics
                    .observe_duration(started.elapsed().as_secs_f64());
                in_flight.finish();
                outcome
            }
            None => {
                error!(task_id = %task_id, "No handler registered, failing task");
                Err(PoolError::HandlerMissing)
            }
        };

        self.metrics.record_outcome(&outcome);

        let abandoned = handle.is_abandoned();
        handle.resolve(outcome);
        debug!(task_id = %task_id, abandoned, "Task resolved");
    }
}

/// Counts a running worker loop for as long as it is alive, aborted or not
struct ActiveWorker(Arc<PoolMetrics>);

impl ActiveWorker {
    fn enter(metrics: Arc<PoolMetrics>) -> Self {
        metrics.workers_active.inc();
        ActiveWorker(metrics)
    }
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        self.0.workers_active.dec();
    }
}

/// Tracks one handler call. Dropped without `finish` means the worker was
/// aborted mid-call and the task counts as stopped.
struct InFlight<'a> {
    metrics: &'a PoolMetrics,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a PoolMetrics) -> Self {
        metrics.tasks_in_progress.inc();
        InFlight {
            metrics,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.tasks_in_progress.dec();
        if !self.finished {
            self.metrics.record_outcome(&Err(PoolError::Stopped));
        }
    }
}

/// Fixed set of worker loops sharing one queue and one handler registry
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn exactly `worker_count` loops on the current runtime
    pub fn spawn(
        worker_count: usize,
        queue: Arc<TaskQueue>,
        registry: HandlerRegistry,
        metrics: Arc<PoolMetrics>,
    ) -> Self {
        let shutdown = CancellationToken::new();

        let handles = (0..worker_count)
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    queue: queue.clone(),
                    registry: registry.clone(),
                    metrics: metrics.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        WorkerPool { handles, shutdown }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Ask every loop to exit after its current task. Does not wait.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Cancel every loop and wait for them to exit.
    ///
    /// Loops still inside a handler call when `timeout` elapses are aborted;
    /// the tasks they held drop their completion handles. Returns how many
    /// loops had to be aborted.
    pub async fn shutdown(mut self, timeout: Duration) -> usize {
        self.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut aborted = 0;

        for mut handle in std::mem::take(&mut self.handles) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Worker exited abnormally: {}", e),
                Err(_) => {
                    handle.abort();
                    // Returns once the loop has been dropped and its guards ran.
                    let _ = handle.await;
                    aborted += 1;
                }
            }
        }

        if aborted > 0 {
            warn!("Shutdown deadline exceeded, aborted {} busy workers", aborted);
        }
        aborted
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Loops left running would wait on the queue forever.
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EchoHandler;
    use agent_pool_core::{Completion, HandlerError, TaskPayload};
    use serde_json::json;

    fn task(priority: u8, prompt: &str) -> (Task, Completion) {
        let mut payload = TaskPayload::new();
        payload.insert("prompt".to_string(), json!(prompt));
        Task::new(priority, payload).unwrap()
    }

    fn spawn_pool(workers: usize, registry: HandlerRegistry) -> (Arc<TaskQueue>, Arc<PoolMetrics>, WorkerPool) {
        let queue = Arc::new(TaskQueue::unbounded());
        let metrics = Arc::new(PoolMetrics::new().unwrap());
        let pool = WorkerPool::spawn(workers, queue.clone(), registry, metrics.clone());
        (queue, metrics, pool)
    }

    #[tokio::test]
    async fn test_workers_resolve_tasks() {
        let (queue, metrics, pool) = spawn_pool(2, HandlerRegistry::with_handler(EchoHandler));

        let (t, completion) = task(7, "hello");
        queue.admit(t).unwrap();

        assert_eq!(completion.wait().await.unwrap(), "hello");
        assert_eq!(metrics.tasks_total.with_label_values(&["completed"]).get(), 1);
        assert_eq!(pool.len(), 2);

        assert_eq!(pool.shutdown(Duration::from_secs(1)).await, 0);
        assert_eq!(metrics.workers_active.get(), 0);
    }

    #[tokio::test]
    async fn test_missing_handler_keeps_loop_alive() {
        let registry = HandlerRegistry::new();
        let (queue, _metrics, pool) = spawn_pool(1, registry.clone());

        let (t, completion) = task(7, "nobody home");
        queue.admit(t).unwrap();
        assert!(matches!(completion.wait().await, Err(PoolError::HandlerMissing)));

        registry.register(EchoHandler);
        let (t, completion) = task(7, "now served");
        queue.admit(t).unwrap();
        assert_eq!(completion.wait().await.unwrap(), "now served");

        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_handler_failure_is_isolated() {
        let registry = HandlerRegistry::new();
        registry.register_fn("picky", |payload: TaskPayload| async move {
            match payload["prompt"].as_str() {
                Some("bad") => Err::<String, HandlerError>("refused".into()),
                Some(other) => Ok(other.to_string()),
                None => Ok(String::new()),
            }
        });
        let (queue, _metrics, pool) = spawn_pool(1, registry);

        let (bad, bad_completion) = task(7, "bad");
        let (good, good_completion) = task(7, "good");
        queue.admit(bad).unwrap();
        queue.admit(good).unwrap();

        assert_eq!(bad_completion.wait().await.unwrap_err().kind(), "handler_failure");
        assert_eq!(good_completion.wait().await.unwrap(), "good");

        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_handler() {
        let registry = HandlerRegistry::new();
        registry.register_fn("slow", |_payload: TaskPayload| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<String, HandlerError>("finished".to_string())
        });
        let (queue, _metrics, pool) = spawn_pool(1, registry);

        let (t, completion) = task(7, "x");
        queue.admit(t).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(pool.shutdown(Duration::from_secs(5)).await, 0);
        assert_eq!(completion.wait().await.unwrap(), "finished");
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_handler() {
        let registry = HandlerRegistry::new();
        registry.register_fn("stuck", |_payload: TaskPayload| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<String, HandlerError>(String::new())
        });
        let (queue, metrics, pool) = spawn_pool(1, registry);

        let (t, completion) = task(7, "x");
        queue.admit(t).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(metrics.tasks_in_progress.get(), 1);
        assert_eq!(metrics.workers_active.get(), 1);

        assert_eq!(pool.shutdown(Duration::from_millis(50)).await, 1);
        assert!(matches!(completion.wait().await, Err(PoolError::Stopped)));

        assert_eq!(metrics.tasks_in_progress.get(), 0);
        assert_eq!(metrics.workers_active.get(), 0);
        assert_eq!(metrics.tasks_total.with_label_values(&["stopped"]).get(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_of_idle_and_busy_workers_balances_gauges() {
        let registry = HandlerRegistry::new();
        registry.register_fn("stuck", |_payload: TaskPayload| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<String, HandlerError>(String::new())
        });
        let (queue, metrics, pool) = spawn_pool(3, registry);

        let (t, _completion) = task(7, "x");
        queue.admit(t).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(metrics.workers_active.get(), 3);

        assert_eq!(pool.shutdown(Duration::from_millis(50)).await, 1);
        assert_eq!(metrics.workers_active.get(), 0);
        assert_eq!(metrics.tasks_in_progress.get(), 0);
    }
}
