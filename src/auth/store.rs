//! In-memory OAuth stores: registered clients, single-use authorization
//! grants, and bearer access tokens. Backed by `dashmap::DashMap` for the
//! same reason the session manager is: short-held, concurrent map access
//! from many request tasks, no need for a single coarse lock.
//!
//! Grant issuance is serialized per `client_id` via a `parking_lot::Mutex`
//! keyed lock, so two concurrent token exchanges against the same client
//! can't both redeem the same code.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Client {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub created_at: DateTime<Utc>,
}

/// A single-use authorization code: a second redemption attempt fails.
pub struct Grant {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub issued_at: Instant,
    pub expires_at: Instant,
    consumed: AtomicBool,
    /// The access token minted against this grant, if any, so a replay of
    /// an already-consumed code can revoke it (RFC 6749 §4.1.2).
    issued_token: Mutex<Option<String>>,
}

impl Grant {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Atomically mark this grant consumed. Returns `false` if it was
    /// already consumed, closing the window for a concurrent double-redeem.
    pub fn consume(&self) -> bool {
        !self.consumed.swap(true, Ordering::AcqRel)
    }
}

/// Why a grant redemption failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantRedeemError {
    /// No such code, wrong client, or expired: nothing to revoke.
    Invalid,
    /// The code was already consumed. Carries the access token minted on
    /// its first (legitimate) redemption, if one was recorded, so the
    /// caller can revoke it.
    Reused(Option<String>),
}

pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub scope: String,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Generate a URL-safe random token of `bytes` bytes of entropy.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Verify a PKCE `code_verifier` against a stored S256 `code_challenge`
/// (RFC 7636 §4.6): `BASE64URL(SHA256(code_verifier)) == code_challenge`.
pub fn verify_pkce(code_verifier: &str, code_challenge: &str, method: &str) -> bool {
    if method != "S256" {
        return false;
    }
    let digest = Sha256::digest(code_verifier.as_bytes());
    let computed = URL_SAFE_NO_PAD.encode(digest);
    // Constant-time-ish compare is not critical here: the challenge is not
    // secret (it travels in the authorize redirect), only the verifier is.
    computed == code_challenge
}

#[derive(Default)]
pub struct ClientStore {
    clients: DashMap<String, Client>,
}

impl ClientStore {
    pub fn insert(&self, client: Client) {
        self.clients.insert(client.client_id.clone(), client);
    }

    pub fn get(&self, client_id: &str) -> Option<Client> {
        self.clients.get(client_id).map(|entry| entry.clone())
    }
}

#[derive(Default)]
pub struct GrantStore {
    grants: DashMap<String, Grant>,
    /// Per-client lock keyed by client_id, so concurrent `/token` requests
    /// for the same client serialize on consuming a grant.
    locks: DashMap<String, std::sync::Arc<parking_lot::Mutex<()>>>,
}

impl GrantStore {
    pub fn issue(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        code_challenge: &str,
        code_challenge_method: &str,
        ttl: Duration,
    ) -> String {
        let code = random_token(32);
        let now = Instant::now();
        let grant = Grant {
            code: code.clone(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            code_challenge: code_challenge.to_string(),
            code_challenge_method: code_challenge_method.to_string(),
            issued_at: now,
            expires_at: now + ttl,
            consumed: AtomicBool::new(false),
            issued_token: Mutex::new(None),
        };
        self.grants.insert(code.clone(), grant);
        code
    }

    fn lock_for(&self, client_id: &str) -> std::sync::Arc<parking_lot::Mutex<()>> {
        self.locks
            .entry(client_id.to_string())
            .or_insert_with(|| std::sync::Arc::new(parking_lot::Mutex::new(())))
            .clone()
    }

    /// Redeem a grant: validates existence, expiry, and single-use under the
    /// client's serialization lock, returning the grant's fields on success.
    /// On a reuse of an already-consumed grant, returns the access token
    /// that was minted against its first redemption (if recorded) so the
    /// caller can revoke it per RFC 6749 §4.1.2.
    pub fn redeem(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<(String, String, String, String), GrantRedeemError> {
        let lock = self.lock_for(client_id);
        let _guard = lock.lock();

        let entry = self.grants.get(code).ok_or(GrantRedeemError::Invalid)?;
        if entry.client_id != client_id || entry.is_expired() {
            return Err(GrantRedeemError::Invalid);
        }
        if !entry.consume() {
            return Err(GrantRedeemError::Reused(entry.issued_token.lock().clone()));
        }
        Ok((
            entry.redirect_uri.clone(),
            entry.scope.clone(),
            entry.code_challenge.clone(),
            entry.code_challenge_method.clone(),
        ))
    }

    /// Record the access token minted against `code`'s redemption, so a
    /// later replay of the same code can revoke it.
    pub fn record_issued_token(&self, code: &str, token: String) {
        if let Some(entry) = self.grants.get(code) {
            *entry.issued_token.lock() = Some(token);
        }
    }
}

#[derive(Default)]
pub struct TokenStore {
    tokens: DashMap<String, AccessToken>,
}

impl TokenStore {
    pub fn issue(&self, client_id: &str, scope: &str, ttl: Duration) -> (String, u64) {
        let now = Instant::now();
        let token = random_token(32);
        let expires_at = now + ttl;
        self.tokens.insert(
            token.clone(),
            AccessToken {
                token: token.clone(),
                client_id: client_id.to_string(),
                scope: scope.to_string(),
                issued_at: now,
                expires_at,
            },
        );
        (token, ttl.as_secs())
    }

    /// Validate a bearer token, returning its client_id/scope if live.
    pub fn validate(&self, token: &str) -> Option<(String, String)> {
        let entry = self.tokens.get(token)?;
        if entry.is_expired() {
            None
        } else {
            Some((entry.client_id.clone(), entry.scope.clone()))
        }
    }

    /// Revoke a token immediately, e.g. after detecting replay of the
    /// authorization code it was minted against.
    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_round_trips() {
        let verifier = "a-code-verifier-that-is-reasonably-long-12345";
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        assert!(verify_pkce(verifier, &challenge, "S256"));
        assert!(!verify_pkce("wrong-verifier", &challenge, "S256"));
    }

    #[test]
    fn plain_method_is_rejected() {
        assert!(!verify_pkce("x", "x", "plain"));
    }

    #[test]
    fn grant_is_single_use() {
        let store = GrantStore::default();
        let code = store.issue("client-1", "https://example.com/cb", "mcp", "chal", "S256", Duration::from_secs(60));
        assert!(store.redeem("client-1", &code).is_ok());
        assert_eq!(store.redeem("client-1", &code), Err(GrantRedeemError::Reused(None)));
    }

    #[test]
    fn grant_rejects_wrong_client() {
        let store = GrantStore::default();
        let code = store.issue("client-1", "https://example.com/cb", "mcp", "chal", "S256", Duration::from_secs(60));
        assert_eq!(store.redeem("client-2", &code), Err(GrantRedeemError::Invalid));
    }

    #[test]
    fn grant_redeem_of_unknown_code_is_invalid_not_reused() {
        let store = GrantStore::default();
        assert_eq!(store.redeem("client-1", "nonexistent"), Err(GrantRedeemError::Invalid));
    }

    #[test]
    fn replaying_a_consumed_grant_reports_its_issued_token() {
        let store = GrantStore::default();
        let code = store.issue("client-1", "https://example.com/cb", "mcp", "chal", "S256", Duration::from_secs(60));
        assert!(store.redeem("client-1", &code).is_ok());
        store.record_issued_token(&code, "token-abc".to_string());

        let replay = store.redeem("client-1", &code);
        assert_eq!(replay, Err(GrantRedeemError::Reused(Some("token-abc".to_string()))));
    }

    #[test]
    fn revoked_token_no_longer_validates() {
        let store = TokenStore::default();
        let (token, _ttl) = store.issue("client-1", "mcp", Duration::from_secs(60));
        assert!(store.validate(&token).is_some());
        store.revoke(&token);
        assert!(store.validate(&token).is_none());
    }

    #[test]
    fn token_validate_rejects_unknown() {
        let store = TokenStore::default();
        assert!(store.validate("nonexistent").is_none());
    }

    #[test]
    fn token_validate_accepts_issued() {
        let store = TokenStore::default();
        let (token, _ttl) = store.issue("client-1", "mcp", Duration::from_secs(60));
        assert!(store.validate(&token).is_some());
    }
}
