pub mod metrics;
pub mod queue;

pub use metrics::PoolMetrics;
pub use queue::TaskQueue;

/// Queue capacity used when none is configured. Zero would mean unbounded.
pub const DEFAULT_CAPACITY: usize = 100;
