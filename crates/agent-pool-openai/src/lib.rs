//! OpenAI chat completion handler for the agent pool

pub mod provider;
pub mod types;

pub use provider::{
    completions_url, prepare_call, CompletionDefaults, OpenAiError, OpenAiHandler, PreparedCall,
    DEFAULT_API_BASE, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
pub use types::{ChatMessage, ChatRequest, ChatResponse};
