//! `list_sources` tool — enumerate the distinct source labels in the corpus
//! (books, news, forum posts) so clients can build source filters for
//! `search` without guessing.

use crate::error::ToolError;
use crate::search::SearchBackend;
use crate::tools::registry::{ContentBlock, Tool, ToolCallResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;

pub struct ListSourcesTool;

static INPUT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
});

#[async_trait]
impl Tool for ListSourcesTool {
    fn name(&self) -> &str {
        "list_sources"
    }

    fn description(&self) -> &str {
        "List the distinct source labels present in the knowledge corpus."
    }

    fn input_schema(&self) -> &Value {
        &INPUT_SCHEMA
    }

    async fn call(
        &self,
        _arguments: Value,
        backend: &dyn SearchBackend,
    ) -> Result<ToolCallResult, ToolError> {
        let sources = backend.sources();
        Ok(ToolCallResult::ok(vec![ContentBlock::json(
            serde_json::json!({ "sources": sources }),
        )]))
    }
}
