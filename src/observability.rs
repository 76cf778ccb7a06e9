//! Structured logging setup.
//!
//! Follows the layered-subscriber pattern used elsewhere in this codebase:
//! `EnvFilter` driven, `RUST_LOG` takes precedence when set, otherwise the
//! configured `LOG_LEVEL` picks a default filter. The line transport must
//! never write logs to stdout (that channel carries JSON-RPC frames), so
//! both entry points route the formatter to stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with the given minimum level (`error`, `warn`, `info`,
/// `debug`, `trace`). Safe to call more than once; a second call is a no-op.
pub fn init_logging(level: &str) {
    let default_filter = format!("librarian_mcp={level}");

    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    } else {
        EnvFilter::new(default_filter)
    };

    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
