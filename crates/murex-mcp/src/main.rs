//! Murex MCP Server binary.
//!
//! Loads the execution policy from a JSON configuration file and serves the
//! `run_command` tool over stdio (the default) or HTTP:
//!
//! ```bash
//! murex-mcp --config policy.json
//! murex-mcp --config policy.json --stdio false --port 8080
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{Json, Router, routing::get};
use clap::{ArgAction, Parser};
use rmcp::ServiceExt;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use murex::ExecPolicy;
use murex_mcp::MurexServer;

/// Murex MCP Server - policy-enforced shell execution for AI assistants
#[derive(Parser, Debug)]
#[command(name = "murex-mcp")]
#[command(about = "MCP server providing policy-enforced shell execution")]
struct Args {
    /// Path to the policy configuration file (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Path to an operational log file (distinct from the block journal)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Port to listen on when serving HTTP
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Use stdin/stdout for MCP communication; pass `--stdio false` to
    /// serve HTTP instead
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    stdio: bool,

    /// Override the policy's maximum execution time in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum number of concurrent command executions
    #[arg(long, default_value_t = 4)]
    max_concurrent: usize,
}

fn init_tracing(log: Option<&PathBuf>) -> anyhow::Result<()> {
    // Log to stderr so stdio MCP framing on stdout stays clean.
    let registry = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()));

    match log {
        Some(path) => {
            if let Some(dir) = path.parent()
                && !dir.as_os_str().is_empty()
            {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating log directory for {}", path.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "service": "murex"}))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log.as_ref())?;

    let mut policy = ExecPolicy::from_file(&args.config)
        .with_context(|| format!("loading policy from {}", args.config.display()))?;
    if let Some(timeout) = args.timeout {
        policy.set_max_exec_seconds(timeout);
    }

    let server = MurexServer::new(policy, args.max_concurrent);

    if args.stdio {
        tracing::info!("starting MCP server on stdin/stdout");

        let service = server
            .serve(rmcp::transport::stdio())
            .await
            .inspect_err(|e| {
                tracing::error!("failed to start MCP service: {}", e);
            })?;

        service.waiting().await?;
        tracing::info!("MCP server shutting down");
    } else {
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        tracing::info!(%addr, "starting MCP server on HTTP");

        let mcp_service = StreamableHttpService::new(
            move || Ok(server.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );
        let router = Router::new()
            .nest_service("/mcp", mcp_service)
            .route("/health", get(handle_health));

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        axum::serve(listener, router).await?;
    }

    Ok(())
}
