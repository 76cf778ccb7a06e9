//! Protocol Engine: translates JSON-RPC frames into method calls and back,
//! transport-agnostic.
//!
//! A single dispatcher both transports call through, rather than each
//! transport keeping its own copy of the method-handling table.

use crate::config::Config;
use crate::error::{DomainCode, ProtocolError, ToolError};
use crate::prompts::PromptRegistry;
use crate::protocol::coercion::coerce_array_strings;
use crate::protocol::types::{jsonrpc_error_codes, MCPError, MCPRequest, MCPResponse, RequestId};
use crate::protocol::validation::validate;
use crate::search::SearchBackend;
use crate::session::{ClientInfo, Session};
use crate::tools::ToolRegistry;
use serde_json::Value;
use std::sync::Arc;

/// Transport-agnostic dispatcher over `(Session, Frame) -> Frame option`.
pub struct Engine {
    config: Arc<Config>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptRegistry>,
    search_backend: Arc<dyn SearchBackend>,
}

impl Engine {
    pub fn new(
        config: Arc<Config>,
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptRegistry>,
        search_backend: Arc<dyn SearchBackend>,
    ) -> Self {
        Self {
            config,
            tools,
            prompts,
            search_backend,
        }
    }

    /// Dispatch a single inbound frame. Returns `None` for notifications:
    /// they produce no response and must not be queued for delivery.
    pub async fn dispatch(&self, session: &Session, request: MCPRequest) -> Option<MCPResponse> {
        session.touch();

        let Some(id) = request.id.clone() else {
            self.handle_notification(session, &request);
            return None;
        };

        // Requests on one session are processed serially; notifications
        // above don't take this lock and may overlap with it.
        let _guard = session.dispatch_guard().await;
        let result = self.handle_request(session, &request).await;
        Some(match result {
            Ok(value) => MCPResponse::success(id, value),
            Err(error) => MCPResponse::failure(id, error),
        })
    }

    fn handle_notification(&self, session: &Session, request: &MCPRequest) {
        match request.method.as_str() {
            "initialized" => {
                tracing::debug!(session_id = %session.id, "client acknowledged initialize");
            }
            other => {
                tracing::debug!(session_id = %session.id, method = other, "ignored notification");
            }
        }
    }

    async fn handle_request(&self, session: &Session, request: &MCPRequest) -> Result<Value, MCPError> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(session, &request.params),
            "tools/list" => self.handle_tools_list(session),
            "tools/call" => self.handle_tools_call(session, &request.params).await,
            "prompts/list" => self.handle_prompts_list(session),
            "prompts/get" => self.handle_prompts_get(session, &request.params),
            "ping" => Ok(serde_json::json!({})),
            other => Err(MCPError::method_not_found(other)),
        }
    }

    fn handle_initialize(&self, session: &Session, params: &Value) -> Result<Value, MCPError> {
        let requested_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("");
        let client_info = params
            .get("clientInfo")
            .and_then(|v| serde_json::from_value::<ClientInfo>(v.clone()).ok())
            .unwrap_or(ClientInfo {
                name: "unknown".to_string(),
                version: "0".to_string(),
            });

        let negotiated = self
            .config
            .mcp
            .supported_protocol_versions
            .iter()
            .find(|v| v.as_str() == requested_version)
            .cloned();

        let negotiated = match negotiated {
            Some(v) => v,
            None => {
                return Err(MCPError::domain(
                    jsonrpc_error_codes::INVALID_PARAMS,
                    DomainCode::UnsupportedProtocol,
                    format!(
                        "no protocol version in common with the client; server supports {:?}",
                        self.config.mcp.supported_protocol_versions
                    ),
                ))
            }
        };

        session
            .complete_initialize(negotiated.clone(), client_info)
            .map_err(|e: ProtocolError| {
                MCPError::domain(jsonrpc_error_codes::INVALID_REQUEST, e.code(), e.to_string())
            })?;

        Ok(serde_json::json!({
            "protocolVersion": negotiated,
            "serverInfo": {
                "name": self.config.mcp.server_name,
                "version": self.config.mcp.server_version,
            },
            "capabilities": {
                "tools": {},
                "prompts": {},
            },
        }))
    }

    fn require_initialized(&self, session: &Session) -> Result<(), MCPError> {
        if session.is_initialized() {
            Ok(())
        } else {
            Err(MCPError::domain(
                jsonrpc_error_codes::INVALID_REQUEST,
                DomainCode::NotInitialized,
                "session has not completed initialize",
            ))
        }
    }

    fn handle_tools_list(&self, session: &Session) -> Result<Value, MCPError> {
        self.require_initialized(session)?;
        Ok(serde_json::json!({ "tools": self.tools.definitions() }))
    }

    async fn handle_tools_call(&self, session: &Session, params: &Value) -> Result<Value, MCPError> {
        self.require_initialized(session)?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MCPError::invalid_params(DomainCode::InvalidArguments, "'name' is required")
            })?;

        let tool = self.tools.get(name).ok_or_else(|| {
            MCPError::invalid_params(
                DomainCode::UnknownTool,
                format!("unknown tool '{name}'"),
            )
        })?;

        let mut arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        coerce_array_strings(&mut arguments, tool.input_schema());

        if let Err(reason) = validate(&arguments, tool.input_schema()) {
            return Err(MCPError::invalid_params(DomainCode::InvalidArguments, reason));
        }

        let call = tool.call(arguments, self.search_backend.as_ref());
        let outcome = tokio::select! {
            outcome = tokio::time::timeout(self.config.mcp.tool_call_timeout, call) => outcome,
            _ = session.cancelled() => {
                tracing::info!(tool = name, session_id = %session.id, "session closed, abandoning in-flight tool call");
                return Err(MCPError::internal(DomainCode::Cancelled, "session closed before the tool call completed"));
            }
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err @ ToolError::InvalidArguments(_))) => {
                return Err(MCPError::invalid_params(err.code(), err.redacted_message()))
            }
            Ok(Err(err)) => {
                tracing::error!(tool = name, error = %err, "tool execution failed");
                return Err(MCPError::internal(err.code(), err.redacted_message()));
            }
            Err(_elapsed) => {
                tracing::warn!(tool = name, "tool call timed out");
                return Err(MCPError::internal(
                    DomainCode::Timeout,
                    "tool call timed out",
                ));
            }
        };

        serde_json::to_value(&result)
            .map_err(|e| MCPError::internal(DomainCode::ToolExecutionFailed, e.to_string()))
    }

    fn handle_prompts_list(&self, session: &Session) -> Result<Value, MCPError> {
        self.require_initialized(session)?;
        Ok(serde_json::json!({ "prompts": self.prompts.descriptors() }))
    }

    fn handle_prompts_get(&self, session: &Session, params: &Value) -> Result<Value, MCPError> {
        self.require_initialized(session)?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MCPError::invalid_params(DomainCode::InvalidArguments, "'name' is required")
            })?;

        let prompt = self.prompts.get(name).ok_or_else(|| {
            MCPError::invalid_params(
                DomainCode::UnknownPrompt,
                format!("unknown prompt '{name}'"),
            )
        })?;

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let messages = prompt
            .render(&arguments)
            .map_err(|e| MCPError::invalid_params(e.code(), e.to_string()))?;

        serde_json::to_value(serde_json::json!({ "messages": messages }))
            .map_err(|e| MCPError::internal(DomainCode::InvalidArguments, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::RequestId;
    use crate::search::TrigramSearchBackend;
    use crate::session::SessionManager;
    use std::time::Duration;

    fn engine() -> Engine {
        Engine::new(
            Arc::new(Config::default()),
            Arc::new(crate::tools::default_registry()),
            Arc::new(crate::prompts::default_registry()),
            Arc::new(TrigramSearchBackend::from_documents(vec![])),
        )
    }

    fn request(method: &str, params: Value, id: Option<i64>) -> MCPRequest {
        MCPRequest {
            jsonrpc: "2.0".to_string(),
            id: id.map(RequestId::Number),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn uninitialized_session_cannot_list_tools() {
        let engine = engine();
        let manager = SessionManager::new(Duration::from_secs(300));
        let session = manager.attach_http();

        let response = engine
            .dispatch(&session, request("tools/list", Value::Null, Some(1)))
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.data.unwrap()["code"], "NotInitialized");
    }

    #[tokio::test]
    async fn initialize_then_list_tools_succeeds() {
        let engine = engine();
        let manager = SessionManager::new(Duration::from_secs(300));
        let session = manager.attach_http();

        let init = engine
            .dispatch(
                &session,
                request(
                    "initialize",
                    serde_json::json!({
                        "protocolVersion": "2025-06-18",
                        "clientInfo": { "name": "t", "version": "0" },
                        "capabilities": {}
                    }),
                    Some(1),
                ),
            )
            .await
            .unwrap();
        assert!(init.error.is_none());

        let list = engine
            .dispatch(&session, request("tools/list", Value::Null, Some(2)))
            .await
            .unwrap();
        assert!(list.error.is_none());
        assert!(list.result.unwrap()["tools"].as_array().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn second_initialize_on_same_session_fails() {
        let engine = engine();
        let manager = SessionManager::new(Duration::from_secs(300));
        let session = manager.attach_http();
        let params = serde_json::json!({
            "protocolVersion": "2025-06-18",
            "clientInfo": { "name": "t", "version": "0" },
            "capabilities": {}
        });

        engine
            .dispatch(&session, request("initialize", params.clone(), Some(1)))
            .await;
        let second = engine
            .dispatch(&session, request("initialize", params, Some(2)))
            .await
            .unwrap();
        assert_eq!(
            second.error.unwrap().data.unwrap()["code"],
            "AlreadyInitialized"
        );
    }

    #[tokio::test]
    async fn unsupported_protocol_version_fails_initialize() {
        let engine = engine();
        let manager = SessionManager::new(Duration::from_secs(300));
        let session = manager.attach_http();

        let response = engine
            .dispatch(
                &session,
                request(
                    "initialize",
                    serde_json::json!({
                        "protocolVersion": "1999-01-01",
                        "clientInfo": { "name": "t", "version": "0" },
                        "capabilities": {}
                    }),
                    Some(1),
                ),
            )
            .await
            .unwrap();
        assert_eq!(
            response.error.unwrap().data.unwrap()["code"],
            "UnsupportedProtocol"
        );
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let engine = engine();
        let manager = SessionManager::new(Duration::from_secs(300));
        let session = manager.attach_http();
        let response = engine
            .dispatch(&session, request("initialized", Value::Null, None))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let engine = engine();
        let manager = SessionManager::new(Duration::from_secs(300));
        let session = manager.attach_http();
        let response = engine
            .dispatch(&session, request("nonexistent", Value::Null, Some(1)))
            .await
            .unwrap();
        assert_eq!(
            response.error.unwrap().code,
            jsonrpc_error_codes::METHOD_NOT_FOUND
        );
    }

    struct SlowTool;

    #[async_trait::async_trait]
    impl crate::tools::Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps well past any reasonable deadline"
        }
        fn input_schema(&self) -> &Value {
            static SCHEMA: std::sync::OnceLock<Value> = std::sync::OnceLock::new();
            SCHEMA.get_or_init(|| serde_json::json!({ "type": "object", "properties": {} }))
        }
        async fn call(
            &self,
            _arguments: Value,
            _backend: &dyn crate::search::SearchBackend,
        ) -> Result<crate::tools::ToolCallResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(crate::tools::ToolCallResult::ok(vec![]))
        }
    }

    #[tokio::test]
    async fn cancelling_session_abandons_in_flight_tool_call() {
        let tools = crate::tools::ToolRegistry::builder()
            .register(Arc::new(SlowTool))
            .build();
        let engine = Engine::new(
            Arc::new(Config::default()),
            Arc::new(tools),
            Arc::new(crate::prompts::default_registry()),
            Arc::new(TrigramSearchBackend::from_documents(vec![])),
        );
        let manager = SessionManager::new(Duration::from_secs(300));
        let session = manager.attach_http();

        engine
            .dispatch(
                &session,
                request(
                    "initialize",
                    serde_json::json!({
                        "protocolVersion": "2025-06-18",
                        "clientInfo": { "name": "t", "version": "0" },
                        "capabilities": {}
                    }),
                    Some(1),
                ),
            )
            .await;

        let session_for_cancel = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            session_for_cancel.cancel();
        });

        let response = engine
            .dispatch(
                &session,
                request("tools/call", serde_json::json!({ "name": "slow", "arguments": {} }), Some(2)),
            )
            .await
            .unwrap();
        assert_eq!(
            response.error.unwrap().data.unwrap()["code"],
            "Cancelled"
        );
    }

    #[tokio::test]
    async fn string_encoded_array_argument_is_coerced() {
        let engine = engine();
        let manager = SessionManager::new(Duration::from_secs(300));
        let session = manager.attach_http();
        engine
            .dispatch(
                &session,
                request(
                    "initialize",
                    serde_json::json!({
                        "protocolVersion": "2025-06-18",
                        "clientInfo": { "name": "t", "version": "0" },
                        "capabilities": {}
                    }),
                    Some(1),
                ),
            )
            .await;

        let response = engine
            .dispatch(
                &session,
                request(
                    "tools/call",
                    serde_json::json!({
                        "name": "search",
                        "arguments": { "query": "x", "sources": "[\"news\"]" }
                    }),
                    Some(2),
                ),
            )
            .await
            .unwrap();
        assert!(response.error.is_none(), "{:?}", response.error);
    }
}
