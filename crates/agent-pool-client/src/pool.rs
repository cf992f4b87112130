use crate::LlmRequest;
use agent_pool_core::{PoolError, Result, Task, TaskPayload};
use agent_pool_scheduler::{PoolMetrics, TaskQueue};
use agent_pool_worker::{HandlerRegistry, TaskHandler, WorkerPool};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

struct RunningPool {
    queue: Arc<TaskQueue>,
    workers: WorkerPool,
}

/// A priority-ordered pool of workers running one pluggable handler.
///
/// Nothing runs until [`AgentPool::start`]; [`AgentPool::stop`] returns the
/// pool to that state. Both must be called from inside a Tokio runtime.
pub struct AgentPool {
    running: Mutex<Option<RunningPool>>,
    handlers: HandlerRegistry,
    metrics: Arc<PoolMetrics>,
    shutdown_timeout: Duration,
}

impl AgentPool {
    /// Pool with no handler registered yet
    pub fn new() -> Self {
        Self::with_registry(HandlerRegistry::new())
    }

    /// Pool whose workers call `handler`
    pub fn with_handler<H: TaskHandler + 'static>(handler: H) -> Self {
        Self::with_registry(HandlerRegistry::with_handler(handler))
    }

    pub fn with_registry(handlers: HandlerRegistry) -> Self {
        AgentPool {
            running: Mutex::new(None),
            handlers,
            metrics: Arc::new(PoolMetrics::default()),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// How long `stop` waits for busy workers before aborting them
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Create the queue and spawn `worker_count` workers.
    ///
    /// Returns `false` without touching anything if the pool is already
    /// running. `capacity` 0 means unbounded.
    pub fn start(&self, worker_count: usize, capacity: usize) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("Agent pool already started, ignoring repeated start");
            return false;
        }

        let queue = Arc::new(TaskQueue::new(capacity));
        let workers = WorkerPool::spawn(
            worker_count,
            queue.clone(),
            self.handlers.clone(),
            self.metrics.clone(),
        );
        *running = Some(RunningPool { queue, workers });

        if capacity > 0 {
            info!("Agent pool started, workers={}, capacity={}", worker_count, capacity);
        } else {
            info!("Agent pool started, workers={}, capacity=unbounded", worker_count);
        }
        true
    }

    /// Stop the workers and reset the pool.
    ///
    /// Tasks still queued are resolved with `Stopped`; a handler call in
    /// progress is allowed to finish until the shutdown timeout. The handler
    /// is cleared. Calling this on a stopped pool only clears the handler.
    pub async fn stop(&self) {
        // Reset under the lock so a `start` racing the wait below gets a
        // clean pool whose handler this call no longer touches.
        let running = {
            let mut running = self.running.lock();
            let taken = running.take();
            if let Some(old) = &taken {
                old.workers.cancel();
            }
            self.handlers.clear();
            taken
        };

        if let Some(RunningPool { queue, workers }) = running {
            let worker_count = workers.len();
            workers.shutdown(self.shutdown_timeout).await;

            let pending = queue.drain();
            let dropped = pending.len();
            for task in pending {
                self.metrics.record_outcome(&Err(PoolError::Stopped));
                task.resolve(Err(PoolError::Stopped));
            }
            self.metrics.update_queue_depth(queue.depth_by_tier());

            info!(
                "Agent pool stopped, workers={}, pending tasks failed={}",
                worker_count, dropped
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Number of worker loops owned by the running pool (0 when stopped)
    pub fn worker_count(&self) -> usize {
        self.running
            .lock()
            .as_ref()
            .map(|running| running.workers.len())
            .unwrap_or(0)
    }

    pub fn queue_len(&self) -> usize {
        self.running
            .lock()
            .as_ref()
            .map(|running| running.queue.len())
            .unwrap_or(0)
    }

    /// Replace the handler used by every worker
    pub fn register_handler<H: TaskHandler + 'static>(&self, handler: H) {
        self.handlers.register(handler);
    }

    pub fn clear_handler(&self) {
        self.handlers.clear();
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Submit an LLM request and wait for the reply
    pub async fn submit(&self, request: LlmRequest) -> Result<String> {
        self.submit_payload(request.to_payload(), request.get_priority(), request.get_timeout())
            .await
    }

    /// Queue `payload` at `priority` and wait up to `timeout` (measured from
    /// admission) for the handler's reply.
    ///
    /// On timeout the task stays queued; if a worker runs it later the
    /// result is dropped.
    pub async fn submit_payload(
        &self,
        payload: TaskPayload,
        priority: u8,
        timeout: Duration,
    ) -> Result<String> {
        let queue = self
            .running
            .lock()
            .as_ref()
            .map(|running| running.queue.clone())
            .ok_or(PoolError::NotStarted)?;

        let (task, completion) = Task::new(priority, payload)?;
        let task_id = task.id().clone();

        if let Err(e) = queue.admit(task) {
            return Err(match e {
                PoolError::AdmissionRejected { capacity } => {
                    self.metrics.admission_rejected_total.inc();
                    warn!(task_id = %task_id, "Agent pool queue full, request rejected");
                    PoolError::QueueFull { capacity }
                }
                other => other,
            });
        }
        self.metrics.update_queue_depth(queue.depth_by_tier());
        debug!(task_id = %task_id, priority, "Task admitted");

        // Holding the queue while waiting would keep a stopped pool's
        // leftover tasks alive.
        drop(queue);

        let outcome = completion.wait_timeout(timeout).await;
        if let Err(PoolError::Timeout(after)) = &outcome {
            warn!(task_id = %task_id, "Caller gave up after {:?}", after);
        }
        outcome
    }
}

impl Default for AgentPool {
    fn default() -> Self {
        Self::new()
    }
}
