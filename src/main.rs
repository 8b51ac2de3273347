//! Reversal Webhook Server
//!
//! Receives transaction action webhooks and dispatches refunds to payment providers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower_http::trace::TraceLayer;

use reversal_webhook::build_app;
use reversal_webhook::handlers::AppState;
use reversal_webhook::reversal::ReversalWebhookConfig;

/// Reversal Webhook Server
#[derive(Parser, Debug)]
#[command(name = "reversal-webhook")]
#[command(version)]
#[command(about = "Idempotent payment reversal webhook server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3001", env = "PORT")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Processed-event ledger file (overrides REVERSAL_LEDGER_PATH)
    #[arg(long)]
    ledger_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ReversalWebhookConfig::from_env().context("invalid configuration")?;
    if let Some(path) = args.ledger_path.clone() {
        config.ledger_path = Some(path);
    }

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;

    let webhook_path = config.webhook_path.clone();
    let app = build_app(config, Arc::new(AppState::new()))
        .await
        .context("cannot build application")?
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;

    tracing::info!(%addr, path = %webhook_path, "Reversal webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Reversal webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
