//! Write-once result slot shared between a submitter and the worker that
//! runs its task.

use crate::PoolError;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

/// What a task resolves to: the handler's reply or the reason it has none.
pub type TaskOutcome = Result<String, PoolError>;

/// Create a connected handle/completion pair.
pub fn channel() -> (CompletionHandle, Completion) {
    let (tx, rx) = oneshot::channel();
    (
        CompletionHandle {
            slot: Mutex::new(Some(tx)),
        },
        Completion { rx },
    )
}

/// Write side, carried by the task through the queue.
#[derive(Debug)]
pub struct CompletionHandle {
    slot: Mutex<Option<oneshot::Sender<TaskOutcome>>>,
}

impl CompletionHandle {
    /// Resolve the handle. Returns `true` only for the call that actually
    /// resolved it; every later call is a no-op returning `false`.
    ///
    /// The outcome is silently discarded when the waiting side already gave up.
    pub fn resolve(&self, outcome: TaskOutcome) -> bool {
        match self.slot.lock().take() {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// True once the submitter stopped waiting (timed out or dropped).
    pub fn is_abandoned(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map(|tx| tx.is_closed())
            .unwrap_or(false)
    }
}

/// Read side, held by the submitter.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<TaskOutcome>,
}

impl Completion {
    /// Wait for the outcome. A handle dropped without being resolved means the
    /// pool went away underneath the task, reported as `Stopped`.
    pub async fn wait(self) -> TaskOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PoolError::Stopped),
        }
    }

    /// Wait at most `timeout`. On expiry the receiver is dropped, so a late
    /// resolution lands nowhere.
    pub async fn wait_timeout(self, timeout: Duration) -> TaskOutcome {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PoolError::Timeout(timeout)),
        }
    }
}
