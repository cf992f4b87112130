use crate::completion::{self, Completion, CompletionHandle, TaskOutcome};
use crate::{Priority, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Request parameters handed verbatim to the handler
pub type TaskPayload = serde_json::Map<String, serde_json::Value>;

/// Short identifier used to correlate log lines for one task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// First 8 hex characters of a random v4 UUID
    pub fn generate() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        TaskId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        TaskId(value.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of prioritized work and the slot its result goes into
#[derive(Debug)]
pub struct Task {
    id: TaskId,

    priority: Priority,

    payload: TaskPayload,

    /// When the task was built (for logging; ordering uses `arrival_order`)
    created_at: DateTime<Utc>,

    /// Sequence number assigned by the queue on admission
    arrival_order: Option<u64>,

    completion: CompletionHandle,
}

impl Task {
    /// Create a task together with the [`Completion`] its submitter awaits.
    ///
    /// Fails with `InvalidPriority` if `priority` is outside 0-15.
    pub fn new(priority: u8, payload: TaskPayload) -> Result<(Self, Completion)> {
        let priority = Priority::new(priority)?;
        let (handle, completion) = completion::channel();
        Ok((Self::with_handle(priority, payload, handle), completion))
    }

    /// Create a task around an existing completion handle
    pub fn with_handle(priority: Priority, payload: TaskPayload, completion: CompletionHandle) -> Self {
        Task {
            id: TaskId::generate(),
            priority,
            payload,
            created_at: Utc::now(),
            arrival_order: None,
            completion,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `None` until the task has been admitted to a queue
    pub fn arrival_order(&self) -> Option<u64> {
        self.arrival_order
    }

    /// Stamp the admission sequence number. Only the queue calls this, once,
    /// while holding its lock.
    pub fn assign_arrival_order(&mut self, order: u64) {
        debug_assert!(self.arrival_order.is_none(), "task {} admitted twice", self.id);
        self.arrival_order = Some(order);
    }

    /// Ordering key: priority first, then admission order
    pub fn sort_key(&self) -> (Priority, u64) {
        (self.priority, self.arrival_order.unwrap_or(u64::MAX))
    }

    /// Resolve the completion handle; see [`CompletionHandle::resolve`]
    pub fn resolve(&self, outcome: TaskOutcome) -> bool {
        self.completion.resolve(outcome)
    }

    pub fn is_abandoned(&self) -> bool {
        self.completion.is_abandoned()
    }

    /// Split into the handler input and the handle to resolve afterwards
    pub fn into_parts(self) -> (TaskId, TaskPayload, CompletionHandle) {
        (self.id, self.payload, self.completion)
    }
}
