//! `librarian-mcp-http` — runs the streaming HTTP transport: SSE event
//! stream, companion submission endpoint, and the OAuth 2.1 authorization
//! subsystem that gates it.

use anyhow::Result;
use clap::Parser;
use librarian_mcp::protocol::Engine;
use librarian_mcp::search::{SearchBackend, TrigramSearchBackend};
use librarian_mcp::session::SessionManager;
use librarian_mcp::{facade, observability, prompts, tools, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "librarian-mcp-http", version, about = "Librarian MCP server (streaming HTTP transport)")]
struct Args {
    /// Path to a TOML configuration file, equivalent to `CONFIG_PATH`.
    #[arg(short, long)]
    config: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate configuration and the search index, then exit.
    #[arg(long)]
    health_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.config {
        std::env::set_var("CONFIG_PATH", path);
    }
    let mut config = Config::load()?;
    if args.verbose >= 2 {
        config.logging.level = "trace".to_string();
    } else if args.verbose == 1 {
        config.logging.level = "debug".to_string();
    }

    observability::init_logging(&config.logging.level);

    if args.health_check {
        return run_health_check(&config);
    }

    tracing::info!(
        name = %config.mcp.server_name,
        version = %config.mcp.server_version,
        host = %config.server.host,
        port = config.server.port,
        "starting librarian-mcp (streaming HTTP transport)"
    );

    let config = Arc::new(config);
    let search_backend: Arc<dyn SearchBackend> = Arc::new(
        TrigramSearchBackend::open(&config.search.index_path).map_err(|err| {
            tracing::error!(path = %config.search.index_path, error = %err, "search index unavailable, aborting startup");
            err
        })?,
    );
    let engine = Arc::new(Engine::new(
        config.clone(),
        Arc::new(tools::default_registry()),
        Arc::new(prompts::default_registry()),
        search_backend,
    ));
    let sessions = Arc::new(SessionManager::new(Duration::from_secs(
        config.server.session_idle_seconds,
    )));
    sessions.spawn_reaper(Duration::from_secs(30));

    let router = facade::build_router(config.clone(), engine, sessions);
    let addr: std::net::SocketAddr =
        format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}

/// Validate configuration and the search index without binding a listener.
/// A missing or corrupt index is a fatal startup failure (same as a normal
/// run), reported here as a non-zero exit rather than a bind attempt.
fn run_health_check(config: &Config) -> Result<()> {
    println!("librarian-mcp-http health check");
    println!("  server_name: {}", config.mcp.server_name);
    println!("  listen: {}:{}", config.server.host, config.server.port);
    let backend = TrigramSearchBackend::open(&config.search.index_path)?;
    println!("  search index: ok ({} sources)", backend.sources().len());
    println!("  oauth: {}", if config.auth.simplified { "simplified" } else { "full" });
    Ok(())
}
