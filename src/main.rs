use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use browser_assistant::config::AssistantConfig;
use browser_assistant::provider::{
    AppActionsProvider, HttpActionService, InMemoryStore, MemoryProvider,
};
use browser_assistant::session::{Conversation, StaticIdentity};
use browser_assistant::tool::{RegisterProviderOptions, ToolRegistry};
use browser_assistant::{LLMClientBuilder, Orchestrator};

/// Browser assistant - run the tool orchestration loop from the command line
#[derive(Parser, Debug)]
#[command(name = "browser-assistant", version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model to use (overrides config and environment)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Rounds of tool use before the model must answer
    #[arg(long, global = true)]
    max_rounds: Option<usize>,

    /// Sampling temperature (0.0 to 2.0)
    #[arg(long, global = true)]
    temperature: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the assistant a question
    Ask {
        /// The question to ask
        #[arg(value_name = "PROMPT", required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Print the tool schemas offered to the model
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AssistantConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(max_rounds) = cli.max_rounds {
        config.max_rounds = max_rounds;
    }
    if cli.temperature.is_some() {
        config.temperature = cli.temperature;
    }
    config.validate()?;

    let registry = build_registry(&config).await?;

    match cli.command {
        Commands::Tools => {
            let schemas = registry.get_schemas_for_model().await;
            println!("{}", serde_json::to_string_pretty(&schemas)?);
        }
        Commands::Ask { prompt } => {
            let llm_client = build_llm_client(&config)?;
            let orchestrator = Orchestrator::new(llm_client, registry.clone());
            let outcome = orchestrator
                .run_turn(Conversation::from_user(prompt.join(" ")), config.turn_options())
                .await?;

            println!("{}", outcome.answer);
            if !outcome.execution_report.is_empty() {
                eprintln!("\nTools used:");
                for entry in &outcome.execution_report {
                    let status = if entry.success { "ok" } else { "failed" };
                    eprintln!(
                        "  {} {} ({} ms){}",
                        entry.tool_name,
                        status,
                        entry.duration_ms,
                        entry.error.as_deref().map(|e| format!(": {}", e)).unwrap_or_default()
                    );
                }
            }
            if let Some(usage) = outcome.usage {
                info!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    model_calls = outcome.model_calls,
                    "Turn usage"
                );
            }
        }
    }

    registry.dispose().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn build_registry(config: &AssistantConfig) -> Result<Arc<ToolRegistry>> {
    let registry = Arc::new(ToolRegistry::with_history_capacity(config.history_capacity));

    let store = match &config.memory_records_path {
        Some(path) => InMemoryStore::from_json_file(path)
            .with_context(|| format!("failed to load memories from {}", path.display()))?,
        None => InMemoryStore::new(Vec::new()),
    };
    let memories = MemoryProvider::new(None, Arc::new(store))?;
    registry
        .register_provider(
            Arc::new(memories),
            RegisterProviderOptions {
                enabled: config.memories_enabled,
                ..Default::default()
            },
        )
        .await?;

    if let Some(url) = &config.app_actions_url {
        let identity = match config.identity() {
            Some(identity) => StaticIdentity::new(identity),
            None => StaticIdentity::anonymous(),
        };
        let service = HttpActionService::new(url.clone(), config.request_timeout())?;
        let provider = AppActionsProvider::new(Arc::new(service), Arc::new(identity));
        if let Err(error) = registry
            .register_provider(Arc::new(provider), RegisterProviderOptions::default())
            .await
        {
            warn!(error = %error, "App actions unavailable");
        }
    }

    Ok(registry)
}

fn build_llm_client(config: &AssistantConfig) -> Result<Arc<dyn browser_assistant::LLMClient>> {
    let mut builder = LLMClientBuilder::new()
        .with_base_url(config.base_url.clone())
        .with_timeout(config.request_timeout())
        .with_header("x-memories-enabled", config.memories_enabled.to_string());
    if let Some(api_key) = &config.api_key {
        builder = builder
            .with_api_key(api_key.clone())
            .with_header("X-API-Key", api_key.clone());
    }
    if let Some(user_id) = &config.user_id {
        builder = builder.with_header("x-user-id", user_id.clone());
    }
    Ok(builder.build_openai()?)
}
