mod pool;
mod request;

pub use pool::AgentPool;
pub use request::LlmRequest;

pub use agent_pool_core::{PoolError, Result};
pub use agent_pool_worker::{EchoHandler, HandlerRegistry, HandlerResult, TaskHandler};

/// Worker loops spawned when none are configured
pub const DEFAULT_WORKERS: usize = 5;

pub use agent_pool_scheduler::DEFAULT_CAPACITY;
