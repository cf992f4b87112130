mod config;

use agent_pool_client::{AgentPool, EchoHandler, LlmRequest};
use agent_pool_openai::{CompletionDefaults, OpenAiHandler};
use anyhow::{bail, Context};
use clap::Parser;
use config::AgentPoolConfig;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "agentp")]
#[command(about = "Send prompts through a priority-scheduled LLM agent pool", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Number of worker loops
    #[arg(short, long)]
    workers: Option<usize>,

    /// Maximum queued requests (0 = unbounded)
    #[arg(long)]
    capacity: Option<usize>,

    /// Request priority, 0 (most urgent) to 15
    #[arg(short, long)]
    priority: Option<u8>,

    /// Per-request timeout in seconds
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// OpenAI-compatible endpoint base URL
    #[arg(long)]
    api_base: Option<String>,

    /// API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Prompt to send (repeatable); reads stdin lines when omitted
    #[arg(long)]
    prompt: Vec<String>,

    /// Echo prompts back instead of calling the API
    #[arg(long)]
    echo: bool,

    /// Print Prometheus metrics before exiting
    #[arg(long)]
    metrics: bool,
}

async fn read_prompts(args: &Args) -> anyhow::Result<Vec<String>> {
    if !args.prompt.is_empty() {
        return Ok(args.prompt.clone());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prompts = Vec::new();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if !line.is_empty() {
            prompts.push(line.to_string());
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        AgentPoolConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path))?
    } else {
        AgentPoolConfig::default()
    };

    // Override with CLI args
    if let Some(workers) = args.workers {
        config.pool.workers = workers;
    }
    if let Some(capacity) = args.capacity {
        config.pool.capacity = capacity;
    }
    if let Some(priority) = args.priority {
        config.request.priority = priority;
    }
    if let Some(timeout) = args.timeout {
        config.request.timeout_secs = timeout;
    }
    if let Some(model) = &args.model {
        config.request.model = model.clone();
    }
    if let Some(api_base) = &args.api_base {
        config.request.api_base = Some(api_base.clone());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitoring.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let api_key = match (&args.api_key, args.echo) {
        (Some(key), _) => key.clone(),
        (None, true) => String::new(),
        (None, false) => bail!("No API key given; set OPENAI_API_KEY or pass --api-key (or use --echo)"),
    };

    let pool = if args.echo {
        AgentPool::with_handler(EchoHandler)
    } else {
        AgentPool::with_handler(OpenAiHandler::with_defaults(CompletionDefaults {
            temperature: config.openai.temperature,
            max_tokens: config.openai.max_tokens,
        }))
    };
    let pool = Arc::new(
        pool.shutdown_timeout(Duration::from_secs(config.pool.shutdown_timeout_secs)),
    );
    pool.start(config.pool.workers, config.pool.capacity);

    // Handle shutdown signals
    let signal_pool = pool.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        signal_pool.stop().await;
    });

    let prompts = read_prompts(&args).await?;
    tracing::info!("Submitting {} prompts", prompts.len());

    let submissions = prompts.iter().map(|prompt| {
        let mut request = LlmRequest::new(api_key.clone(), prompt.clone())
            .model(config.request.model.clone())
            .priority(config.request.priority)
            .timeout_secs(config.request.timeout_secs);
        if let Some(api_base) = &config.request.api_base {
            request = request.api_base(api_base.clone());
        }
        pool.submit(request)
    });
    let replies = join_all(submissions).await;

    let mut failed = 0;
    for (index, reply) in replies.into_iter().enumerate() {
        match reply {
            Ok(text) => println!("[{}] {}", index, text),
            Err(e) => {
                failed += 1;
                println!("[{}] error: {} ({})", index, e.kind(), e);
            }
        }
    }

    if args.metrics {
        let text = pool.metrics().render().context("Failed to render metrics")?;
        print!("{}", text);
    }

    pool.stop().await;

    if failed > 0 {
        tracing::warn!("{} of {} requests failed", failed, prompts.len());
    }
    Ok(())
}
