//! `search` tool — the primary corpus-search operation.

use crate::error::ToolError;
use crate::search::SearchBackend;
use crate::tools::registry::{ContentBlock, Tool, ToolCallResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;

pub struct SearchTool;

static INPUT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "free-text search query" },
            "limit": { "type": "integer", "description": "maximum number of results", "default": 10 },
            "sources": {
                "type": "array",
                "items": { "type": "string" },
                "description": "restrict results to these source labels (e.g. \"book\", \"news\", \"forum\")"
            }
        },
        "required": ["query"],
        "additionalProperties": false
    })
});

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the knowledge corpus and return ranked documents with metadata."
    }

    fn input_schema(&self) -> &Value {
        &INPUT_SCHEMA
    }

    async fn call(
        &self,
        arguments: Value,
        backend: &dyn SearchBackend,
    ) -> Result<ToolCallResult, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("'query' must be a string".into()))?;

        let limit = match arguments.get("limit") {
            None => 10usize,
            Some(v) => {
                let n = v
                    .as_i64()
                    .ok_or_else(|| ToolError::InvalidArguments("'limit' must be an integer".into()))?;
                if n <= 0 {
                    return Err(ToolError::InvalidArguments(
                        "'limit' must be a positive integer".into(),
                    ));
                }
                n as usize
            }
        };

        let sources = match arguments.get("sources") {
            None => None,
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let s = item.as_str().ok_or_else(|| {
                        ToolError::InvalidArguments("'sources' entries must be strings".into())
                    })?;
                    out.push(s.to_string());
                }
                Some(out)
            }
            Some(_) => {
                return Err(ToolError::InvalidArguments(
                    "'sources' must be an array of strings".into(),
                ))
            }
        };

        match backend.search(query, limit, sources.as_deref()).await {
            Ok(hits) => {
                let json = serde_json::to_value(&hits)
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                Ok(ToolCallResult::ok(vec![ContentBlock::json(
                    serde_json::json!({ "results": json, "total": hits.len() }),
                )]))
            }
            // Backend degraded but not the sole purpose of this call failing
            // outright — return a structured degraded result instead.
            Err(crate::error::SearchError::Unavailable(reason)) => {
                Ok(ToolCallResult::ok(vec![ContentBlock::json(serde_json::json!({
                    "results": [],
                    "total": 0,
                    "warning": format!("search backend unavailable: {reason}"),
                }))]))
            }
            Err(crate::error::SearchError::InvalidQuery(reason)) => {
                Err(ToolError::InvalidArguments(reason))
            }
        }
    }
}
