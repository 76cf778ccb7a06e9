//! End-to-end `tools/call` scenarios over the HTTP facade: string-encoded
//! array arguments going through coercion, and an unknown-tool error mapped
//! to a JSON-RPC error frame delivered over SSE.

use anyhow::Result;
use futures::StreamExt;
use librarian_mcp::protocol::Engine;
use librarian_mcp::search::{Document, TrigramSearchBackend};
use librarian_mcp::session::SessionManager;
use librarian_mcp::{facade, prompts, tools, Config};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn start_test_server() -> Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let mut config = Config::default();
    config.auth.simplified = true;
    config.auth.simplified_client_patterns = vec!["test-client".to_string()];
    config.server.port = 0;
    let config = Arc::new(config);

    let documents = vec![Document {
        id: "doc-1".to_string(),
        source: "book".to_string(),
        title: "Example Document".to_string(),
        body: "the quick brown fox jumps over the lazy dog".to_string(),
        url: None,
    }];

    let engine = Arc::new(Engine::new(
        config.clone(),
        Arc::new(tools::default_registry()),
        Arc::new(prompts::default_registry()),
        Arc::new(TrigramSearchBackend::from_documents(documents)),
    ));
    let sessions = Arc::new(SessionManager::new(std::time::Duration::from_secs(
        config.server.session_idle_seconds,
    )));

    let router = facade::build_router(config, engine, sessions);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router.into_make_service()).await {
            tracing::error!("test server terminated unexpectedly: {err}");
        }
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    Ok((addr, task))
}

async fn open_session(
    client: &reqwest::Client,
    addr: std::net::SocketAddr,
) -> Result<(String, impl futures::Stream<Item = reqwest::Result<bytes::Bytes>>)> {
    client
        .get(format!("http://{addr}/oauth/start-auth/test-client"))
        .send()
        .await?;
    let mut stream = client
        .get(format!("http://{addr}/sse"))
        .send()
        .await?
        .bytes_stream();
    let first_chunk = stream.next().await.expect("endpoint event")?;
    let text = String::from_utf8_lossy(&first_chunk);
    let session_id = text.split("session_id=").nth(1).unwrap().trim().to_string();
    Ok((session_id, stream))
}

/// Completes the `initialize` handshake on an already-opened session,
/// consuming its response event off the SSE stream so later calls can read
/// their own event without the initialize reply in the way.
async fn initialize_session(
    client: &reqwest::Client,
    addr: std::net::SocketAddr,
    session_id: &str,
    stream: &mut (impl futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin),
) -> Result<()> {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 0,
        "method": "initialize",
        "params": { "protocolVersion": "2025-06-18" }
    });
    client
        .post(format!(
            "http://{addr}/messages?session_id={session_id}&client_id=test-client"
        ))
        .json(&payload)
        .send()
        .await?;
    stream.next().await.expect("initialize response event")?;
    Ok(())
}

#[tokio::test]
async fn array_argument_encoded_as_a_json_string_is_coerced_and_accepted() -> Result<()> {
    let (addr, server_task) = start_test_server().await?;
    let client = reqwest::Client::new();
    let (session_id, mut stream) = open_session(&client, addr).await?;
    initialize_session(&client, addr, &session_id, &mut stream).await?;

    // `sources` is declared as a JSON array in the search tool's schema;
    // here it's submitted as a JSON-encoded string, as some clients do.
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {
            "name": "search",
            "arguments": {
                "query": "fox",
                "sources": "[\"book\"]"
            }
        }
    });
    let resp = client
        .post(format!(
            "http://{addr}/messages?session_id={session_id}&client_id=test-client"
        ))
        .json(&payload)
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let chunk = stream.next().await.expect("tool response event")?;
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.contains("event: message"));
    let data_line = text
        .lines()
        .find(|l| l.starts_with("data:"))
        .expect("data line");
    let body: serde_json::Value = serde_json::from_str(data_line.trim_start_matches("data:").trim())?;
    assert_eq!(body["id"], 7);
    assert!(body.get("error").is_none());

    server_task.abort();
    Ok(())
}

#[tokio::test]
async fn unknown_tool_name_yields_a_jsonrpc_error_not_a_5xx() -> Result<()> {
    let (addr, server_task) = start_test_server().await?;
    let client = reqwest::Client::new();
    let (session_id, mut stream) = open_session(&client, addr).await?;
    initialize_session(&client, addr, &session_id, &mut stream).await?;

    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 9,
        "method": "tools/call",
        "params": { "name": "does-not-exist", "arguments": {} }
    });
    let resp = client
        .post(format!(
            "http://{addr}/messages?session_id={session_id}&client_id=test-client"
        ))
        .json(&payload)
        .send()
        .await?;
    // Transport-level success; the failure is a JSON-RPC error frame.
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let chunk = stream.next().await.expect("error response event")?;
    let text = String::from_utf8_lossy(&chunk);
    let data_line = text
        .lines()
        .find(|l| l.starts_with("data:"))
        .expect("data line");
    let body: serde_json::Value = serde_json::from_str(data_line.trim_start_matches("data:").trim())?;
    assert_eq!(body["id"], 9);
    assert!(body["error"]["code"].is_number());

    server_task.abort();
    Ok(())
}
