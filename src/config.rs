//! Server configuration.
//!
//! Struct-of-structs assembled from defaults, optionally overridden by a
//! TOML file (`CONFIG_PATH`), then overridden by environment variables.
//! A `Default` impl covers local development; the environment pass covers
//! deployment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub mcp: McpConfig,
    pub auth: AuthConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_base_url: String,
    pub transport: Transport,
    pub session_idle_seconds: u64,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpConfig {
    pub server_name: String,
    pub server_version: String,
    /// Supported protocol versions, newest first.
    pub supported_protocol_versions: Vec<String>,
    pub tool_call_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub issuer: String,
    pub token_ttl_seconds: u64,
    pub grant_ttl_seconds: u64,
    pub simplified: bool,
    /// `client_id` patterns (exact match, or a trailing `*` prefix wildcard)
    /// allowed to call `GET /oauth/start-auth/{client_id}` and connect to
    /// the submission path without a bearer token once they do.  Empty by
    /// default: `simplified` alone grants nothing.
    pub simplified_client_patterns: Vec<String>,
    pub auto_approve_hosts: Vec<String>,
    /// Redirect URI hosts accepted at dynamic registration beyond loopback.
    pub allowed_callback_hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub index_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                public_base_url: "http://localhost:8080".to_string(),
                transport: Transport::Http,
                session_idle_seconds: 300,
                cors_allowed_origins: Vec::new(),
            },
            mcp: McpConfig {
                server_name: "librarian-mcp".to_string(),
                server_version: env!("CARGO_PKG_VERSION").to_string(),
                supported_protocol_versions: vec![
                    "2025-06-18".to_string(),
                    "2025-03-26".to_string(),
                    "2024-11-05".to_string(),
                ],
                tool_call_timeout: Duration::from_secs(30),
            },
            auth: AuthConfig {
                issuer: "http://localhost:8080".to_string(),
                token_ttl_seconds: 3600,
                grant_ttl_seconds: 600,
                simplified: false,
                simplified_client_patterns: Vec::new(),
                auto_approve_hosts: Vec::new(),
                allowed_callback_hosts: vec![
                    "localhost".to_string(),
                    "127.0.0.1".to_string(),
                    "claude.ai".to_string(),
                    "claude.com".to_string(),
                ],
            },
            search: SearchConfig {
                index_path: "./corpus-index.json".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load a TOML file, falling back to defaults if absent.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Assemble configuration: optional `CONFIG_PATH` file, then environment
    /// variable overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("CONFIG_PATH") {
            Ok(path) if std::path::Path::new(&path).exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };

        if let Ok(host) = std::env::var("HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port.parse()?;
        }
        if let Ok(base_url) = std::env::var("PUBLIC_BASE_URL") {
            config.server.public_base_url = base_url.clone();
            config.auth.issuer = base_url;
        }
        if let Ok(transport) = std::env::var("TRANSPORT") {
            config.server.transport = match transport.as_str() {
                "stdio" => Transport::Stdio,
                _ => Transport::Http,
            };
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(simplified) = std::env::var("OAUTH_SIMPLIFIED") {
            config.auth.simplified = matches!(simplified.as_str(), "1" | "true" | "yes");
        }
        if let Ok(patterns) = std::env::var("OAUTH_SIMPLIFIED_CLIENT_PATTERNS") {
            config.auth.simplified_client_patterns =
                patterns.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(idle) = std::env::var("SESSION_IDLE_SECONDS") {
            config.server.session_idle_seconds = idle.parse()?;
        }
        if let Ok(ttl) = std::env::var("TOKEN_TTL_SECONDS") {
            config.auth.token_ttl_seconds = ttl.parse()?;
        }
        if let Ok(index_path) = std::env::var("SEARCH_INDEX_PATH") {
            config.search.index_path = index_path;
        }
        if let Ok(origins) = std::env::var("CORS_ALLOWED_ORIGINS") {
            config.server.cors_allowed_origins =
                origins.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(hosts) = std::env::var("OAUTH_AUTO_APPROVE_HOSTS") {
            config.auth.auto_approve_hosts =
                hosts.split(',').map(|s| s.trim().to_string()).collect();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert!(!config.mcp.supported_protocol_versions.is_empty());
        assert!(!config.auth.simplified);
        assert!(config.auth.simplified_client_patterns.is_empty());
    }

    #[test]
    fn from_file_missing_is_an_error() {
        assert!(Config::from_file("/nonexistent/path.toml").is_err());
    }
}
