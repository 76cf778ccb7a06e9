//! JSON-RPC 2.0 envelope and the MCP protocol engine.

pub mod coercion;
pub mod engine;
pub mod types;
pub mod validation;

pub use engine::Engine;
pub use types::{MCPError, MCPRequest, MCPResponse, RequestId};
