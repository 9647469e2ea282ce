//! freegate CLI - Serve free-tier LLMs behind an Ollama compatible API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use freegate::api::{create_router_with_state, AppState};
use freegate::backend::{ChatBackend, OpenRouterClient};
use freegate::catalog::ModelCatalog;
use freegate::config::{Config, LogVerbosity};
use freegate::cooldown::CooldownStore;
use freegate::dispatch::{DirectRouter, Dispatcher, ModelRouter};
use freegate::error::GatewayError;
use freegate::filter::NameFilter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "freegate")]
#[command(about = "Ollama compatible gateway that routes across free LLMs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Startup banner verbosity (defaults to the config value)
        #[arg(short, long, value_enum)]
        log_level: Option<LogLevel>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Forget every recorded model failure
    ResetCooldowns {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    Minimal,
    Compact,
    Verbose,
}

impl From<LogLevel> for LogVerbosity {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Minimal => LogVerbosity::Minimal,
            LogLevel::Compact => LogVerbosity::Compact,
            LogLevel::Verbose => LogVerbosity::Verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve {
            port,
            log_level,
            config,
        }) => {
            run_server(port, log_level, config).await?;
        }
        Some(Commands::Config { path }) => {
            show_config(path)?;
        }
        Some(Commands::ResetCooldowns { config }) => {
            reset_cooldowns(config)?;
        }
        None => {
            // Default: run server
            run_server(None, None, None).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config.with_env_overrides())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_target(false)))
        .with((!json).then(|| fmt::layer().with_target(false)))
        .init();
}

async fn build_router(config: &Config) -> anyhow::Result<ModelRouter> {
    let api_key = config
        .upstream
        .api_key
        .clone()
        .filter(|key| !key.is_empty())
        .ok_or(GatewayError::ApiKeyMissing)?;

    let backend: Arc<dyn ChatBackend> =
        Arc::new(OpenRouterClient::new(Some(api_key)).with_base_url(&config.upstream.base_url));

    let filter = NameFilter::load(&config.paths.filter_file).with_context(|| {
        format!("reading model filter {}", config.paths.filter_file.display())
    })?;
    let filter = Arc::new(filter);

    if !config.gateway.free_mode {
        tracing::info!(tool_use_only = config.gateway.tool_use_only, "Direct mode enabled");
        let router = DirectRouter::new(backend, filter)
            .with_tool_use_only(config.gateway.tool_use_only)
            .with_attempt_timeout(config.gateway.attempt_timeout());
        return Ok(ModelRouter::Direct(router));
    }

    let catalog =
        ModelCatalog::load_or_fetch(&config.paths.free_models_file, backend.as_ref()).await?;
    if catalog.is_empty() {
        tracing::warn!("Free model catalog is empty; every chat will fail");
    }
    let cooldowns = CooldownStore::open(&config.paths.cooldown_db)?;
    tracing::info!(
        models = catalog.len(),
        cooldown_db = %config.paths.cooldown_db.display(),
        "Free mode enabled"
    );

    let dispatcher = Dispatcher::new(Arc::new(catalog), filter, cooldowns, backend)
        .with_attempt_timeout(config.gateway.attempt_timeout());
    Ok(ModelRouter::Free(dispatcher))
}

async fn run_server(
    port_override: Option<u16>,
    log_level: Option<LogLevel>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    init_tracing(config.logging.json);

    let port = port_override.unwrap_or(config.gateway.port);
    // All interfaces: Ollama clients commonly run in other containers.
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let router = build_router(&config).await?;
    let mode = match &router {
        ModelRouter::Free(_) => "free",
        ModelRouter::Direct(_) => "direct",
    };
    let app = create_router_with_state(AppState::new(router));

    let verbosity: LogVerbosity = log_level
        .map(LogVerbosity::from)
        .unwrap_or_else(|| config.app.log_verbosity.clone());
    match verbosity {
        LogVerbosity::Minimal => {
            println!("freegate:{}", port);
        }
        LogVerbosity::Compact => {
            println!("→ freegate starting on http://{} ({} mode)", addr, mode);
            println!("→ Ollama API: http://{}/api", addr);
            println!("→ OpenAI-compatible API: http://{}/v1", addr);
        }
        LogVerbosity::Verbose => {
            println!("────────────────────────────────────────");
            println!("freegate v{}", env!("CARGO_PKG_VERSION"));
            println!("────────────────────────────────────────");
            println!("Gateway:    http://{}", addr);
            println!("Mode:       {}", mode);
            println!("Upstream:   {}", config.upstream.base_url);
            println!("Ollama:     http://{}/api/tags", addr);
            println!("OpenAI:     http://{}/v1/models", addr);
            println!("Filter:     {}", config.paths.filter_file.display());
            println!("Cooldowns:  {}", config.paths.cooldown_db.display());
            println!("────────────────────────────────────────");
        }
    }

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\nGateway stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn show_config(show_path: bool) -> anyhow::Result<()> {
    if show_path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    let mut config = Config::load()?.with_env_overrides();
    if config.upstream.api_key.is_some() {
        config.upstream.api_key = Some("********".to_string());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn reset_cooldowns(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = CooldownStore::open(&config.paths.cooldown_db)?;
    let removed = store.reset_all()?;
    println!(
        "Cleared {} cooldown record(s) from {}",
        removed,
        config.paths.cooldown_db.display()
    );
    Ok(())
}
