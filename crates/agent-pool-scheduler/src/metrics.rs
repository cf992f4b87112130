use agent_pool_core::TaskOutcome;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Prometheus metrics for one agent pool
pub struct PoolMetrics {
    pub registry: Registry,

    // Resolved tasks by outcome ("completed" or an error kind)
    pub tasks_total: IntCounterVec,

    pub admission_rejected_total: IntCounter,

    pub tasks_in_progress: IntGauge,

    pub task_duration: Histogram,

    pub workers_active: IntGauge,

    // Queue depth by priority tier
    pub queue_depth: IntGaugeVec,
}

impl PoolMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tasks_total = IntCounterVec::new(
            Opts::new("agentp_tasks_total", "Resolved tasks by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let admission_rejected_total = IntCounter::new(
            "agentp_admission_rejected_total",
            "Tasks rejected because the queue was full",
        )?;
        registry.register(Box::new(admission_rejected_total.clone()))?;

        let tasks_in_progress =
            IntGauge::new("agentp_tasks_in_progress", "Tasks currently inside a handler")?;
        registry.register(Box::new(tasks_in_progress.clone()))?;

        let task_duration = Histogram::with_opts(HistogramOpts::new(
            "agentp_task_duration_seconds",
            "Handler execution time in seconds",
        ))?;
        registry.register(Box::new(task_duration.clone()))?;

        let workers_active = IntGauge::new("agentp_workers_active", "Running worker loops")?;
        registry.register(Box::new(workers_active.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("agentp_queue_depth", "Queue depth by priority tier"),
            &["tier"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(PoolMetrics {
            registry,
            tasks_total,
            admission_rejected_total,
            tasks_in_progress,
            task_duration,
            workers_active,
            queue_depth,
        })
    }

    /// Update queue depth metrics from `TaskQueue::depth_by_tier`
    pub fn update_queue_depth(&self, (urgent, normal, background): (usize, usize, usize)) {
        self.queue_depth
            .with_label_values(&["urgent"])
            .set(urgent as i64);
        self.queue_depth
            .with_label_values(&["normal"])
            .set(normal as i64);
        self.queue_depth
            .with_label_values(&["background"])
            .set(background as i64);
    }

    /// Count a resolved task under its outcome label
    pub fn record_outcome(&self, outcome: &TaskOutcome) {
        let label = match outcome {
            Ok(_) => "completed",
            Err(e) => e.kind(),
        };
        self.tasks_total.with_label_values(&[label]).inc();
    }

    pub fn observe_duration(&self, duration_secs: f64) {
        self.task_duration.observe(duration_secs);
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_pool_core::PoolError;

    #[test]
    fn test_record_outcome_labels() {
        let metrics = PoolMetrics::new().unwrap();

        metrics.record_outcome(&Ok("hi".to_string()));
        metrics.record_outcome(&Ok("again".to_string()));
        metrics.record_outcome(&Err(PoolError::HandlerMissing));

        assert_eq!(metrics.tasks_total.with_label_values(&["completed"]).get(), 2);
        assert_eq!(
            metrics.tasks_total.with_label_values(&["handler_missing"]).get(),
            1
        );
    }

    #[test]
    fn test_render_includes_queue_depth() {
        let metrics = PoolMetrics::new().unwrap();
        metrics.update_queue_depth((3, 1, 0));

        let text = metrics.render().unwrap();
        assert!(text.contains("agentp_queue_depth{tier=\"urgent\"} 3"));
        assert!(text.contains("agentp_queue_depth{tier=\"normal\"} 1"));
    }
}
