//! OAuth 2.1 authorization subsystem: dynamic client registration,
//! authorization-code + PKCE, bearer token issuance, and discovery
//! documents, all gating the streaming HTTP transport's submission path.
//! Stores are in-memory and process-lifetime only — no durable persistence.

pub mod middleware;
pub mod routes;
pub mod store;
pub mod types;

use crate::config::Config;
use dashmap::DashSet;
use store::{ClientStore, GrantStore, TokenStore};
use std::sync::Arc;

/// Shared state for the authorization subsystem's axum router.
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<Config>,
    pub clients: Arc<ClientStore>,
    pub grants: Arc<GrantStore>,
    pub tokens: Arc<TokenStore>,
    /// `client_id`s that have completed `GET /oauth/start-auth/{client_id}`
    /// under simplified mode and may connect to the submission path without
    /// a bearer token. Empty unless `auth.simplified` is enabled and a
    /// client matches `auth.simplified_client_patterns`.
    pub simplified_clients: Arc<DashSet<String>>,
}

impl AuthState {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            clients: Arc::new(ClientStore::default()),
            grants: Arc::new(GrantStore::default()),
            tokens: Arc::new(TokenStore::default()),
            simplified_clients: Arc::new(DashSet::new()),
        }
    }
}

pub use middleware::{require_bearer_token, AuthContext};
pub use routes::router;
pub use store::TokenStore;
