pub mod executor;
pub mod handler;
pub mod worker;

pub use executor::HandlerExecutor;
pub use handler::{EchoHandler, FnHandler, HandlerRegistry, HandlerResult, TaskHandler};
pub use worker::WorkerPool;
