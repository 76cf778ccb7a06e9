//! `librarian-mcp-stdio` — runs the line-framed stdio transport. No HTTP
//! surface, no OAuth subsystem: a single implicit session lives for the
//! lifetime of the process.

use anyhow::Result;
use clap::Parser;
use librarian_mcp::protocol::Engine;
use librarian_mcp::search::TrigramSearchBackend;
use librarian_mcp::session::SessionManager;
use librarian_mcp::{observability, prompts, tools, transport, Config};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "librarian-mcp-stdio", version, about = "Librarian MCP server (stdio transport)")]
struct Args {
    /// Path to a TOML configuration file, equivalent to `CONFIG_PATH`.
    #[arg(short, long)]
    config: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
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

    // stdout is reserved for JSON-RPC frames; all logs go to stderr.
    observability::init_logging(&config.logging.level);

    tracing::info!(
        name = %config.mcp.server_name,
        version = %config.mcp.server_version,
        "starting librarian-mcp (stdio transport)"
    );

    let config = Arc::new(config);
    let search_backend: Arc<dyn librarian_mcp::search::SearchBackend> = Arc::new(
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

    transport::line::run(engine, sessions).await
}
