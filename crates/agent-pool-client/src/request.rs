use agent_pool_core::{Priority, TaskPayload, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use serde_json::Value;
use std::time::Duration;

/// One LLM call to push through the pool.
///
/// Every field ends up in the task payload; the pool itself only looks at
/// `priority` and `timeout`.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    api_key: String,
    prompt: String,
    api_base: Option<String>,
    model: String,
    priority: u8,
    timeout: Duration,
    params: TaskPayload,
}

impl LlmRequest {
    pub fn new(api_key: impl Into<String>, prompt: impl Into<String>) -> Self {
        LlmRequest {
            api_key: api_key.into(),
            prompt: prompt.into(),
            api_base: None,
            model: DEFAULT_MODEL.to_string(),
            priority: Priority::default().value(),
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            params: TaskPayload::new(),
        }
    }

    /// Override the provider endpoint
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// 0 (most urgent) to 15; validated on submission
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Timeout in fractional seconds. Negative and NaN mean zero; infinity
    /// or anything too large for a `Duration` waits indefinitely.
    pub fn timeout_secs(self, secs: f64) -> Self {
        let timeout = if secs.is_nan() || secs <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        };
        self.timeout(timeout)
    }

    /// Extra parameter merged into the payload (e.g. `temperature`)
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params(mut self, params: TaskPayload) -> Self {
        self.params.extend(params);
        self
    }

    pub fn get_priority(&self) -> u8 {
        self.priority
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the handler payload. Extra parameters are applied last and may
    /// replace the base fields.
    pub fn to_payload(&self) -> TaskPayload {
        let mut payload = TaskPayload::new();
        payload.insert("api_key".to_string(), Value::from(self.api_key.clone()));
        payload.insert(
            "api_base".to_string(),
            self.api_base.clone().map(Value::from).unwrap_or(Value::Null),
        );
        payload.insert("prompt".to_string(), Value::from(self.prompt.clone()));
        payload.insert("model".to_string(), Value::from(self.model.clone()));
        payload.extend(self.params.clone());
        payload
    }
}
