//! Tool Registry and the concrete tools dispatched into the search backend.

pub mod get_document;
pub mod list_sources;
pub mod registry;
pub mod search_tool;

pub use registry::{ContentBlock, Tool, ToolCallResult, ToolDefinition, ToolRegistry};

use std::sync::Arc;

/// The default tool set this server registers at startup.
pub fn default_registry() -> ToolRegistry {
    ToolRegistry::builder()
        .register(Arc::new(search_tool::SearchTool))
        .register(Arc::new(get_document::GetDocumentTool))
        .register(Arc::new(list_sources::ListSourcesTool))
        .build()
}
