mod completion;
mod error;
mod priority;
mod task;

pub use completion::{channel as completion_channel, Completion, CompletionHandle, TaskOutcome};
pub use error::{HandlerError, PoolError, Result};
pub use priority::Priority;
pub use task::{Task, TaskId, TaskPayload};

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Caller-side wait applied when a request does not set its own timeout.
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
