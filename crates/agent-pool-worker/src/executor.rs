use crate::handler::TaskHandler;
use agent_pool_core::{PoolError, TaskId, TaskOutcome, TaskPayload};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

/// Runs one handler call with failure isolation
pub struct HandlerExecutor {
    handler: Arc<dyn TaskHandler>,
}

impl HandlerExecutor {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        HandlerExecutor { handler }
    }

    /// Execute the handler, turning errors and panics into `HandlerFailure`
    pub async fn execute(&self, task_id: &TaskId, payload: TaskPayload) -> TaskOutcome {
        debug!(task_id = %task_id, handler = self.handler.name(), "Invoking handler");

        match AssertUnwindSafe(self.handler.handle(payload))
            .catch_unwind()
            .await
        {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                error!(task_id = %task_id, "Handler failed: {}", e);
                Err(PoolError::handler_failure(task_id.clone(), e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(task_id = %task_id, "Handler panicked: {}", message);
                Err(PoolError::handler_failure(
                    task_id.clone(),
                    format!("handler panicked: {}", message),
                ))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
