//! MCP JSON-RPC frame types.
//!
//! Shape follows the existing `MCPRequest`/`MCPResponse`/`MCPError` triple
//! used by this codebase's prior MCP work: an untagged `RequestId` over
//! string or number, and an error payload carrying a stable `data.code`
//! string alongside the numeric JSON-RPC error code.

use crate::error::DomainCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl MCPRequest {
    /// A request with no `id` is a notification: it must not be answered.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MCPError>,
}

impl MCPResponse {
    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: MCPError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Standard JSON-RPC 2.0 error codes.
pub mod jsonrpc_error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl MCPError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: jsonrpc_error_codes::PARSE_ERROR,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: jsonrpc_error_codes::INVALID_REQUEST,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: jsonrpc_error_codes::METHOD_NOT_FOUND,
            message: format!("Method '{method}' not found"),
            data: Some(serde_json::json!({ "code": DomainCode::MethodNotFound.as_str() })),
        }
    }

    /// Domain error mapped to `-32602`/`-32603`, carrying the stable textual
    /// code in `error.data.code`.
    pub fn domain(jsonrpc_code: i32, code: DomainCode, message: impl Into<String>) -> Self {
        Self {
            code: jsonrpc_code,
            message: message.into(),
            data: Some(serde_json::json!({ "code": code.as_str() })),
        }
    }

    pub fn invalid_params(code: DomainCode, message: impl Into<String>) -> Self {
        Self::domain(jsonrpc_error_codes::INVALID_PARAMS, code, message)
    }

    pub fn internal(code: DomainCode, message: impl Into<String>) -> Self {
        Self::domain(jsonrpc_error_codes::INTERNAL_ERROR, code, message)
    }
}

/// An event pushed onto a session's outbound stream:
/// `event: <type>\ndata: <json-or-url>\n\n`.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// First event on a freshly opened stream, carrying the submission
    /// URL for the new session as a plain string, not JSON.
    Endpoint(String),
    /// A JSON-RPC response/notification frame produced by the engine.
    Message(serde_json::Value),
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::Endpoint(_) => "endpoint",
            ServerEvent::Message(_) => "message",
        }
    }

    /// The raw `data:` payload for this event.
    pub fn data(&self) -> String {
        match self {
            ServerEvent::Endpoint(url) => url.clone(),
            ServerEvent::Message(value) => {
                serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_roundtrips_string_and_number() {
        let s: RequestId = serde_json::from_value(serde_json::json!("abc")).unwrap();
        assert_eq!(s, RequestId::String("abc".to_string()));
        let n: RequestId = serde_json::from_value(serde_json::json!(42)).unwrap();
        assert_eq!(n, RequestId::Number(42));
    }

    #[test]
    fn notification_has_no_id() {
        let req: MCPRequest = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "initialized",
        }))
        .unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn response_omits_null_fields() {
        let resp = MCPResponse::success(RequestId::Number(1), serde_json::json!({"ok": true}));
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("error").is_none());
    }
}
