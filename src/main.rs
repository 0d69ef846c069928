use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gemini_cli_web::config::{api_key_from_env, Config};
use gemini_cli_web::executor::ShellExecutor;
use gemini_cli_web::llm::GeminiClient;
use gemini_cli_web::metrics::RelayMetrics;
use gemini_cli_web::relay::CommandRelay;
use gemini_cli_web::server::{build_router, AppState};
use gemini_cli_web::session::SessionStore;

/// Chat-terminal backend relaying commands to Gemini
#[derive(Parser, Debug)]
#[command(name = "gemini-cli-web", version, about)]
struct Cli {
    /// Config file path (optional)
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Address to bind to
    #[arg(short, long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// Working directory for model-requested shell commands
    #[arg(short, long, env = "RELAY_WORKDIR")]
    working_dir: Option<PathBuf>,

    /// Gemini model name
    #[arg(short, long, env = "GEMINI_MODEL")]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "gemini_cli_web=debug,tower_http=debug"
    } else {
        "gemini_cli_web=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(dir) = cli.working_dir {
        config.executor.working_dir = Some(dir);
    }
    if let Some(model) = cli.model {
        config.model.model = model;
    }

    // Fatal before serving anything
    let api_key = api_key_from_env()?;

    let model = GeminiClient::new(&config.model, &api_key)?;
    let relay = CommandRelay::new(
        Arc::new(SessionStore::new(config.sessions.eviction_policy())),
        Arc::new(model),
        ShellExecutor::new(&config.executor),
        Arc::new(RelayMetrics::new()),
    );
    let app = build_router(AppState::new(relay));

    let addr = config.server.socket_addr()?;
    info!(
        model = %config.model.model,
        working_dir = ?config.executor.working_dir,
        allowed_programs = ?config.executor.allowed_programs,
        "starting relay on http://{}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
