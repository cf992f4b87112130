use agent_pool_client::{DEFAULT_CAPACITY, DEFAULT_WORKERS};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPoolConfig {
    pub pool: PoolConfig,
    pub request: RequestConfig,
    pub openai: OpenAiConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    /// 0 means unbounded
    pub capacity: usize,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub model: String,
    pub priority: u8,
    pub timeout_secs: f64,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub temperature: f64,
    pub max_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            workers: DEFAULT_WORKERS,
            capacity: DEFAULT_CAPACITY,
            shutdown_timeout_secs: 10,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        RequestConfig {
            model: "gpt-3.5-turbo".to_string(),
            priority: 7,
            timeout_secs: 30.0,
            api_base: None,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        OpenAiConfig {
            temperature: agent_pool_openai::DEFAULT_TEMPERATURE,
            max_tokens: agent_pool_openai::DEFAULT_MAX_TOKENS,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            log_level: "info".to_string(),
        }
    }
}

impl AgentPoolConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AgentPoolConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
