use agent_pool_core::{HandlerError, TaskPayload};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Result type for task handlers
pub type HandlerResult = Result<String, HandlerError>;

/// The work every worker performs for a task's payload
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task and return the reply text
    async fn handle(&self, payload: TaskPayload) -> HandlerResult;

    /// Name used in log lines
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapts an async closure into a [`TaskHandler`]
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(TaskPayload) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        FnHandler {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskPayload) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, payload: TaskPayload) -> HandlerResult {
        (self.f)(payload).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Holds the single handler shared by all workers of a pool.
///
/// Cloning is cheap and every clone sees the same slot.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handler: Arc<RwLock<Option<Arc<dyn TaskHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that already holds `handler`
    pub fn with_handler<H: TaskHandler + 'static>(handler: H) -> Self {
        let registry = Self::new();
        registry.register(handler);
        registry
    }

    /// Install `handler`, replacing any previous one
    pub fn register<H: TaskHandler + 'static>(&self, handler: H) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&self, handler: Arc<dyn TaskHandler>) {
        info!("Registered handler: {}", handler.name());
        *self.handler.write() = Some(handler);
    }

    /// Install an async closure as the handler
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(TaskPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(FnHandler::new(name, f));
    }

    /// Remove the handler
    pub fn clear(&self) {
        self.handler.write().take();
    }

    /// Handler to use for the next task, if any
    pub fn current(&self) -> Option<Arc<dyn TaskHandler>> {
        self.handler.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.handler.read().is_some()
    }
}

/// Replies with the payload's `prompt` field. Useful offline and in tests.
pub struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn handle(&self, payload: TaskPayload) -> HandlerResult {
        payload
            .get("prompt")
            .and_then(|prompt| prompt.as_str())
            .map(str::to_string)
            .ok_or_else(|| "payload has no string `prompt` field".into())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(prompt: &str) -> TaskPayload {
        let mut map = TaskPayload::new();
        map.insert("prompt".to_string(), json!(prompt));
        map
    }

    #[tokio::test]
    async fn test_echo_handler() {
        let result = EchoHandler.handle(payload("test data")).await.unwrap();
        assert_eq!(result, "test data");

        assert!(EchoHandler.handle(TaskPayload::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_registry_replace_and_clear() {
        let registry = HandlerRegistry::new();
        assert!(registry.current().is_none());

        registry.register(EchoHandler);
        assert_eq!(registry.current().unwrap().name(), "echo");

        registry.register_fn("shout", |payload: TaskPayload| async move {
            let prompt = payload["prompt"].as_str().unwrap_or_default().to_uppercase();
            Ok::<_, HandlerError>(prompt)
        });
        let handler = registry.current().unwrap();
        assert_eq!(handler.name(), "shout");
        assert_eq!(handler.handle(payload("hey")).await.unwrap(), "HEY");

        registry.clear();
        assert!(!registry.is_registered());
    }

    #[tokio::test]
    async fn test_clones_share_slot() {
        let registry = HandlerRegistry::new();
        let clone = registry.clone();

        registry.register(EchoHandler);
        assert!(clone.is_registered());
    }
}
