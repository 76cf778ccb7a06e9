//! `get_document` tool — fetch a single corpus document by id.

use crate::error::ToolError;
use crate::search::SearchBackend;
use crate::tools::registry::{ContentBlock, Tool, ToolCallResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;

pub struct GetDocumentTool;

static INPUT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "description": "document id as returned by `search`" }
        },
        "required": ["id"],
        "additionalProperties": false
    })
});

#[async_trait]
impl Tool for GetDocumentTool {
    fn name(&self) -> &str {
        "get_document"
    }

    fn description(&self) -> &str {
        "Retrieve the full text and metadata of a single corpus document."
    }

    fn input_schema(&self) -> &Value {
        &INPUT_SCHEMA
    }

    async fn call(
        &self,
        arguments: Value,
        backend: &dyn SearchBackend,
    ) -> Result<ToolCallResult, ToolError> {
        let id = arguments
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("'id' must be a string".into()))?;

        match backend.get_document(id).await {
            Ok(Some(doc)) => {
                let json = serde_json::to_value(&doc)
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                Ok(ToolCallResult::ok(vec![ContentBlock::json(json)]))
            }
            Ok(None) => Ok(ToolCallResult::error(format!(
                "no document with id '{id}'"
            ))),
            Err(e) => Err(ToolError::BackendUnavailable(e.to_string())),
        }
    }
}
