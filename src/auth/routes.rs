//! OAuth 2.1 HTTP surface: discovery, dynamic client registration,
//! authorize + consent, token exchange, and a callback landing page for
//! clients that can't run a local redirect listener.

use crate::auth::store::{verify_pkce, Client, GrantRedeemError};
use crate::auth::types::{
    AuthorizationServerMetadata, AuthorizeParams, ClientRegistrationRequest,
    ClientRegistrationResponse, ConsentDecision, OAuth2Error, ProtectedResourceMetadata,
    TokenRequest, TokenResponse,
};
use crate::auth::AuthState;
use crate::error::AuthError;
use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use std::time::Duration;

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(discovery_metadata),
        )
        .route("/.well-known/mcp/resource", get(resource_metadata))
        .route("/oauth/register", post(register_client))
        .route("/oauth/authorize", get(authorize))
        .route("/oauth/consent", post(submit_consent))
        .route("/oauth/token", post(token))
        .route("/oauth/callback", get(callback))
        .route("/oauth/start-auth/:client_id", get(start_auth))
        .with_state(state)
}

/// Returns `true` if `client_id` matches `pattern`. A pattern ending in `*`
/// matches on the prefix before it; any other pattern must match exactly.
pub fn client_id_matches_pattern(client_id: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => client_id.starts_with(prefix),
        None => client_id == pattern,
    }
}

/// `GET /oauth/start-auth/{client_id}`: the simplified-mode entry point.
/// Spec's "deployment-time policy flag" for bypassing interactive OAuth for
/// a whitelisted class of clients — gated on `auth.simplified` being on
/// *and* `client_id` matching one of `auth.simplified_client_patterns`.
/// Once a client completes this, it's recorded in `simplified_clients` and
/// the bearer-token middleware lets its submissions through without a
/// token; clients that never call this (or don't match the allowlist)
/// still need a real bearer token even with `auth.simplified` set.
async fn start_auth(
    State(state): State<AuthState>,
    Path(client_id): Path<String>,
) -> Result<Json<serde_json::Value>, AuthError> {
    if !state.config.auth.simplified {
        return Err(AuthError::Unauthorized);
    }
    let allowed = state
        .config
        .auth
        .simplified_client_patterns
        .iter()
        .any(|pattern| client_id_matches_pattern(&client_id, pattern));
    if !allowed {
        return Err(AuthError::InvalidClient(client_id));
    }

    state.simplified_clients.insert(client_id);
    Ok(Json(
        serde_json::json!({ "status": "success", "auth_not_required": true }),
    ))
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::InvalidClient(_) | AuthError::InvalidGrant(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidRedirectUri(_) | AuthError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AuthError::UnsupportedGrantType(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidToken | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
        };
        let body = OAuth2Error {
            error: self.oauth_error_code().to_string(),
            error_description: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

async fn discovery_metadata(State(state): State<AuthState>) -> Json<AuthorizationServerMetadata> {
    let base = &state.config.auth.issuer;
    Json(AuthorizationServerMetadata {
        issuer: base.clone(),
        authorization_endpoint: format!("{base}/oauth/authorize"),
        token_endpoint: format!("{base}/oauth/token"),
        registration_endpoint: format!("{base}/oauth/register"),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec!["authorization_code".to_string()],
        code_challenge_methods_supported: vec!["S256".to_string()],
        token_endpoint_auth_methods_supported: vec![
            "none".to_string(),
            "client_secret_post".to_string(),
        ],
    })
}

async fn resource_metadata(State(state): State<AuthState>) -> Json<ProtectedResourceMetadata> {
    Json(ProtectedResourceMetadata {
        resource: state.config.server.public_base_url.clone(),
        authorization_servers: vec![state.config.auth.issuer.clone()],
        bearer_methods_supported: Some(vec!["header".to_string()]),
    })
}

async fn register_client(
    State(state): State<AuthState>,
    Json(req): Json<ClientRegistrationRequest>,
) -> Result<Json<ClientRegistrationResponse>, AuthError> {
    if req.redirect_uris.is_empty() {
        return Err(AuthError::InvalidRequest(
            "redirect_uris must not be empty".to_string(),
        ));
    }
    for uri in &req.redirect_uris {
        validate_redirect_uri(uri, &state)?;
    }

    let client_id = format!("client_{}", crate::auth::store::random_token(12));
    let auth_method = req
        .token_endpoint_auth_method
        .unwrap_or_else(|| "none".to_string());
    let client_secret = if auth_method == "none" {
        None
    } else {
        Some(crate::auth::store::random_token(24))
    };
    let grant_types = req
        .grant_types
        .unwrap_or_else(|| vec!["authorization_code".to_string()]);
    let response_types = req.response_types.unwrap_or_else(|| vec!["code".to_string()]);

    let client = Client {
        client_id: client_id.clone(),
        client_secret: client_secret.clone(),
        client_name: req.client_name,
        redirect_uris: req.redirect_uris.clone(),
        grant_types: grant_types.clone(),
        response_types: response_types.clone(),
        token_endpoint_auth_method: auth_method.clone(),
        created_at: Utc::now(),
    };
    state.clients.insert(client);

    Ok(Json(ClientRegistrationResponse {
        client_id,
        client_secret,
        client_id_issued_at: Utc::now().timestamp(),
        client_secret_expires_at: 0,
        redirect_uris: req.redirect_uris,
        grant_types,
        response_types,
        token_endpoint_auth_method: auth_method,
    }))
}

fn validate_redirect_uri(uri: &str, state: &AuthState) -> Result<(), AuthError> {
    let parsed = url::Url::parse(uri)
        .map_err(|_| AuthError::InvalidRedirectUri(format!("not a valid URI: {uri}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AuthError::InvalidRedirectUri(format!("no host in {uri}")))?;
    let is_loopback = host == "localhost" || host == "127.0.0.1" || host == "::1";
    if is_loopback || state.config.auth.allowed_callback_hosts.iter().any(|h| h == host) {
        Ok(())
    } else {
        Err(AuthError::InvalidRedirectUri(format!(
            "host '{host}' is not an allowed callback host"
        )))
    }
}

/// GET /oauth/authorize: validates the request and either auto-approves
/// (via the auto-approve host allowlist) or renders a
/// consent page the resource owner submits via POST /oauth/consent.
async fn authorize(
    State(state): State<AuthState>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Response, AuthError> {
    let client = state
        .clients
        .get(&params.client_id)
        .ok_or_else(|| AuthError::InvalidClient(params.client_id.clone()))?;

    if !client.redirect_uris.iter().any(|r| r == &params.redirect_uri) {
        return Err(AuthError::InvalidRedirectUri(params.redirect_uri.clone()));
    }
    if params.response_type != "code" {
        return Err(AuthError::InvalidRequest(format!(
            "unsupported response_type '{}'",
            params.response_type
        )));
    }
    if params.code_challenge_method != "S256" {
        return Err(AuthError::InvalidRequest(
            "code_challenge_method must be S256".to_string(),
        ));
    }

    let host = url::Url::parse(&params.redirect_uri)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    if state.config.auth.auto_approve_hosts.iter().any(|h| h == &host) {
        return Ok(issue_grant_and_redirect(&state, &params).into_response());
    }

    Ok(Html(consent_page_html(&params)).into_response())
}

/// Escape the five characters HTML needs escaped in attribute/text context.
/// The consent page interpolates client-supplied query parameters
/// (`client_id`, `redirect_uri`, `state`, ...); without this a crafted
/// authorize link is a reflected-XSS vector against the resource owner.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn consent_page_html(params: &AuthorizeParams) -> String {
    let scope = escape_html(params.scope.as_deref().unwrap_or_default());
    let state_field = params
        .state
        .as_deref()
        .map(escape_html)
        .map(|s| format!(r#"<input type="hidden" name="state" value="{s}">"#))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html><head><title>Authorize access</title></head>
<body>
<h1>Authorize access</h1>
<p>Client <strong>{client_id}</strong> is requesting access (scope: {scope}).</p>
<form method="post" action="/oauth/consent">
<input type="hidden" name="client_id" value="{client_id}">
<input type="hidden" name="redirect_uri" value="{redirect_uri}">
<input type="hidden" name="scope" value="{scope}">
<input type="hidden" name="code_challenge" value="{code_challenge}">
<input type="hidden" name="code_challenge_method" value="{code_challenge_method}">
{state_field}
<button type="submit" name="approve" value="yes">Approve</button>
<button type="submit" name="approve" value="no">Deny</button>
</form>
</body></html>"#,
        client_id = escape_html(&params.client_id),
        redirect_uri = escape_html(&params.redirect_uri),
        scope = scope,
        code_challenge = escape_html(&params.code_challenge),
        code_challenge_method = escape_html(&params.code_challenge_method),
        state_field = state_field,
    )
}

fn issue_grant_and_redirect(state: &AuthState, params: &AuthorizeParams) -> Redirect {
    let scope = params.scope.clone().unwrap_or_else(|| "mcp".to_string());
    let code = state.grants.issue(
        &params.client_id,
        &params.redirect_uri,
        &scope,
        &params.code_challenge,
        &params.code_challenge_method,
        Duration::from_secs(state.config.auth.grant_ttl_seconds),
    );
    let mut target = format!("{}?code={}", params.redirect_uri, url_encode(&code));
    if let Some(s) = &params.state {
        target.push_str(&format!("&state={}", url_encode(s)));
    }
    Redirect::to(&target)
}

/// Percent-encode a query-parameter value. `state` is client-supplied and
/// echoed verbatim; without encoding, a `&` or `#` in it would corrupt the
/// redirect's query string.
fn url_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

async fn submit_consent(
    State(state): State<AuthState>,
    Form(decision): Form<ConsentDecision>,
) -> Result<Response, AuthError> {
    if decision.approve != "yes" {
        let mut target = format!("{}?error=access_denied", decision.redirect_uri);
        if let Some(s) = &decision.state {
            target.push_str(&format!("&state={}", url_encode(s)));
        }
        return Ok(Redirect::to(&target).into_response());
    }

    let params = AuthorizeParams {
        response_type: "code".to_string(),
        client_id: decision.client_id,
        redirect_uri: decision.redirect_uri,
        scope: decision.scope,
        state: decision.state,
        code_challenge: decision.code_challenge,
        code_challenge_method: decision.code_challenge_method,
    };
    Ok(issue_grant_and_redirect(&state, &params).into_response())
}

/// POST /oauth/token: exchanges a single-use authorization code plus PKCE
/// verifier for a bearer access token.
async fn token(
    State(state): State<AuthState>,
    Form(req): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    if req.grant_type != "authorization_code" {
        return Err(AuthError::UnsupportedGrantType(req.grant_type));
    }
    let client_id = req
        .client_id
        .ok_or_else(|| AuthError::InvalidRequest("client_id is required".to_string()))?;
    let code = req
        .code
        .ok_or_else(|| AuthError::InvalidRequest("code is required".to_string()))?;
    let verifier = req
        .code_verifier
        .ok_or_else(|| AuthError::InvalidRequest("code_verifier is required".to_string()))?;

    let client = state
        .clients
        .get(&client_id)
        .ok_or_else(|| AuthError::InvalidClient(client_id.clone()))?;
    if let Some(secret) = &client.client_secret {
        if req.client_secret.as_deref() != Some(secret.as_str()) {
            return Err(AuthError::InvalidClient(client_id));
        }
    }

    let (redirect_uri, scope, code_challenge, code_challenge_method) =
        match state.grants.redeem(&client_id, &code) {
            Ok(fields) => fields,
            // RFC 6749 §4.1.2: reuse of an already-consumed code must
            // revoke any token previously issued against it.
            Err(GrantRedeemError::Reused(Some(issued_token))) => {
                state.tokens.revoke(&issued_token);
                return Err(AuthError::InvalidGrant(code));
            }
            Err(GrantRedeemError::Reused(None)) | Err(GrantRedeemError::Invalid) => {
                return Err(AuthError::InvalidGrant(code))
            }
        };

    if let Some(requested_redirect) = &req.redirect_uri {
        if requested_redirect != &redirect_uri {
            return Err(AuthError::InvalidGrant(
                "redirect_uri does not match the authorization request".to_string(),
            ));
        }
    }

    if !verify_pkce(&verifier, &code_challenge, &code_challenge_method) {
        return Err(AuthError::InvalidGrant("PKCE verification failed".to_string()));
    }

    let (access_token, expires_in) = state.tokens.issue(
        &client_id,
        &scope,
        Duration::from_secs(state.config.auth.token_ttl_seconds),
    );
    state.grants.record_issued_token(&code, access_token.clone());

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in,
        scope,
    }))
}

#[derive(serde::Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// GET /oauth/callback: a landing page for clients that embed the authorize
/// step in a popup/window rather than running a local redirect listener. If
/// `window.opener` is present, posts the result via `postMessage` and closes
/// itself; either way the raw code/state is also rendered so a client
/// polling the page without an opener can still read the result.
async fn callback(Query(params): Query<CallbackParams>) -> Html<String> {
    let payload = match params.error {
        Some(error) => serde_json::json!({ "type": "oauth_callback", "error": error }),
        None => serde_json::json!({
            "type": "oauth_callback",
            "code": params.code.clone().unwrap_or_default(),
            "state": params.state.clone().unwrap_or_default(),
        }),
    };
    // `</script>` inside a code/state value would otherwise close the tag
    // early; JSON-encoding already escaped quotes, this closes the one gap.
    let payload = serde_json::to_string(&payload)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");
    let code = escape_html(&params.code.unwrap_or_default());
    let state = escape_html(&params.state.unwrap_or_default());
    Html(format!(
        r#"<!DOCTYPE html>
<html><head><title>Authorization complete</title></head>
<body>
<h1>Authorization complete</h1>
<p>Copy this code back into your client if this window did not close automatically:</p>
<pre>code={code}&amp;state={state}</pre>
<script>
  if (window.opener) {{
    window.opener.postMessage({payload}, "*");
    window.close();
  }}
</script>
</body></html>"#
    ))
}
