use crate::task::TaskId;
use std::time::Duration;
use thiserror::Error;

/// Error type produced by task handlers.
///
/// Boxed so that `anyhow::Error`, `reqwest::Error` and plain strings all
/// convert with `?` or `.into()`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Invalid priority value: {0} (expected 0-15)")]
    InvalidPriority(u8),

    #[error("Agent pool is not started")]
    NotStarted,

    #[error("Queue is at capacity ({capacity}), task rejected")]
    AdmissionRejected { capacity: usize },

    #[error("Agent pool queue is full ({capacity} pending), request rejected")]
    QueueFull { capacity: usize },

    #[error("No handler registered")]
    HandlerMissing,

    #[error("Handler failed for task {task_id}: {source}")]
    HandlerFailure {
        task_id: TaskId,
        #[source]
        source: HandlerError,
    },

    #[error("Timeout exceeded after {0:?}")]
    Timeout(Duration),

    #[error("Queue wait cancelled by pool shutdown")]
    Cancelled,

    #[error("Agent pool stopped before the task completed")]
    Stopped,
}

impl PoolError {
    /// Stable identifier for the error kind, used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::InvalidPriority(_) => "invalid_priority",
            PoolError::NotStarted => "not_started",
            PoolError::AdmissionRejected { .. } => "admission_rejected",
            PoolError::QueueFull { .. } => "queue_full",
            PoolError::HandlerMissing => "handler_missing",
            PoolError::HandlerFailure { .. } => "handler_failure",
            PoolError::Timeout(_) => "timeout",
            PoolError::Cancelled => "cancelled",
            PoolError::Stopped => "stopped",
        }
    }

    pub fn handler_failure(task_id: TaskId, source: impl Into<HandlerError>) -> Self {
        PoolError::HandlerFailure {
            task_id,
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
