use std::sync::Arc;

use clap::{Parser, Subcommand};

use forgeline::config::AppConfig;
use forgeline::server::{create_router, AppState, Services};
use forgeline::shutdown::wait_for_shutdown;

#[derive(Parser)]
#[command(name = "forgeline", about = "Multi-role LLM pipeline orchestrator")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the command API over HTTP (default)
    Serve,
    /// Run one workflow and print the resulting run as JSON
    Run {
        /// Feature request handed to the first role
        #[arg(short, long)]
        feature: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    forgeline::telemetry::init(&config.logging);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Run { feature } => run_once(config, &feature).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        mode = ?config.pipeline.mode,
        "Starting forgeline server"
    );

    let state = Arc::new(AppState::new(&config).await?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        config.server.host, config.server.port
    ))
    .await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_once(config: AppConfig, feature: &str) -> anyhow::Result<()> {
    let services = Services::from_config(&config).await?;
    let report = services
        .orchestrator
        .run_workflow_with_metrics(feature)
        .await?;

    tracing::info!(
        workflow_id = %report.run.id,
        status = ?report.run.status,
        metrics = %serde_json::to_string(&report.metrics)?,
        "Run finished"
    );
    println!("{}", serde_json::to_string_pretty(&report.run)?);
    Ok(())
}
