//! Domain error taxonomy.
//!
//! Mirrors the error categories the protocol engine and HTTP facade need to
//! distinguish: protocol-level failures, domain failures raised by tools and
//! prompts, auth failures, and transport-level failures. Each carries a
//! stable string code that ends up in `error.data.code` on the wire (see
//! `crate::protocol::types::MCPError`).

use thiserror::Error;

/// Stable machine-readable codes surfaced in JSON-RPC `error.data.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainCode {
    AlreadyInitialized,
    NotInitialized,
    UnsupportedProtocol,
    UnknownTool,
    UnknownPrompt,
    InvalidArguments,
    ToolExecutionFailed,
    Timeout,
    BackendUnavailable,
    MethodNotFound,
    Cancelled,
}

impl DomainCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainCode::AlreadyInitialized => "AlreadyInitialized",
            DomainCode::NotInitialized => "NotInitialized",
            DomainCode::UnsupportedProtocol => "UnsupportedProtocol",
            DomainCode::UnknownTool => "UnknownTool",
            DomainCode::UnknownPrompt => "UnknownPrompt",
            DomainCode::InvalidArguments => "InvalidArguments",
            DomainCode::ToolExecutionFailed => "ToolExecutionFailed",
            DomainCode::Timeout => "Timeout",
            DomainCode::BackendUnavailable => "BackendUnavailable",
            DomainCode::MethodNotFound => "MethodNotFound",
            DomainCode::Cancelled => "Cancelled",
        }
    }
}

/// Protocol-level errors: malformed session state, unsupported negotiation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("session has already completed initialize")]
    AlreadyInitialized,

    #[error("session has not completed initialize")]
    NotInitialized,

    #[error("no protocol version in common with the client; server supports {supported:?}")]
    UnsupportedProtocol { supported: Vec<String> },

    #[error("unknown method '{0}'")]
    MethodNotFound(String),
}

impl ProtocolError {
    pub fn code(&self) -> DomainCode {
        match self {
            ProtocolError::AlreadyInitialized => DomainCode::AlreadyInitialized,
            ProtocolError::NotInitialized => DomainCode::NotInitialized,
            ProtocolError::UnsupportedProtocol { .. } => DomainCode::UnsupportedProtocol,
            ProtocolError::MethodNotFound(_) => DomainCode::MethodNotFound,
        }
    }
}

/// Errors raised while dispatching a `tools/call`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("tool call timed out")]
    Timeout,

    #[error("search backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl ToolError {
    pub fn code(&self) -> DomainCode {
        match self {
            ToolError::UnknownTool(_) => DomainCode::UnknownTool,
            ToolError::InvalidArguments(_) => DomainCode::InvalidArguments,
            ToolError::ExecutionFailed(_) => DomainCode::ToolExecutionFailed,
            ToolError::Timeout => DomainCode::Timeout,
            ToolError::BackendUnavailable(_) => DomainCode::BackendUnavailable,
        }
    }

    /// Redacted message safe to place on the wire; full detail stays in logs.
    pub fn redacted_message(&self) -> String {
        match self {
            ToolError::ExecutionFailed(_) => "tool execution failed".to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors raised while dispatching a `prompts/get`.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unknown prompt '{0}'")]
    UnknownPrompt(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl PromptError {
    pub fn code(&self) -> DomainCode {
        match self {
            PromptError::UnknownPrompt(_) => DomainCode::UnknownPrompt,
            PromptError::InvalidArguments(_) => DomainCode::InvalidArguments,
        }
    }
}

/// Errors surfaced by the search backend itself.
#[derive(Debug, Error, Clone)]
pub enum SearchError {
    #[error("search index unavailable: {0}")]
    Unavailable(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Transport-level failures (framing, oversize frames, stream teardown).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("frame exceeded maximum size of {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("frame was not valid JSON: {0}")]
    ParseError(String),

    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("stream closed unexpectedly")]
    StreamClosed,
}

impl TransportError {
    /// Stable machine-readable code for the JSON error body, e.g.
    /// `{ "error": "unknown_session" }`, distinct from the human-readable
    /// `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::FrameTooLarge { .. } => "frame_too_large",
            TransportError::ParseError(_) => "parse_error",
            TransportError::UnknownSession(_) => "unknown_session",
            TransportError::StreamClosed => "stream_closed",
        }
    }
}

/// OAuth 2.1 authorization subsystem errors. Codes follow RFC 6749 §5.2's
/// `error` vocabulary rather than [`DomainCode`] since these cross the HTTP
/// boundary as OAuth error bodies, not JSON-RPC frames.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown or invalid client: {0}")]
    InvalidClient(String),

    #[error("invalid redirect_uri: {0}")]
    InvalidRedirectUri(String),

    #[error("invalid or expired grant: {0}")]
    InvalidGrant(String),

    #[error("malformed authorization request: {0}")]
    InvalidRequest(String),

    #[error("invalid or expired access token")]
    InvalidToken,

    #[error("missing bearer token")]
    Unauthorized,

    #[error("unsupported grant_type '{0}'")]
    UnsupportedGrantType(String),
}

impl AuthError {
    /// The `error` field OAuth 2.0 error responses use (RFC 6749 §5.2).
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidClient(_) => "invalid_client",
            AuthError::InvalidRedirectUri(_) => "invalid_request",
            AuthError::InvalidGrant(_) => "invalid_grant",
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::InvalidToken => "invalid_token",
            AuthError::Unauthorized => "invalid_token",
            AuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
        }
    }
}
