//! Black-box protocol tests over the streaming HTTP transport: bind a real
//! listener, drive it with `reqwest`, assert on status codes and bodies.

use anyhow::Result;
use librarian_mcp::protocol::Engine;
use librarian_mcp::search::TrigramSearchBackend;
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

    let engine = Arc::new(Engine::new(
        config.clone(),
        Arc::new(tools::default_registry()),
        Arc::new(prompts::default_registry()),
        Arc::new(TrigramSearchBackend::from_documents(vec![])),
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

#[tokio::test]
async fn sse_handshake_delivers_endpoint_event_then_initialize_round_trips() -> Result<()> {
    let (addr, server_task) = start_test_server().await?;
    let client = reqwest::Client::new();
    client
        .get(format!("http://{addr}/oauth/start-auth/test-client"))
        .send()
        .await?;

    let mut stream = client
        .get(format!("http://{addr}/sse"))
        .send()
        .await?
        .bytes_stream();

    use futures::StreamExt;
    let first_chunk = stream.next().await.expect("endpoint event")?;
    let text = String::from_utf8_lossy(&first_chunk);
    assert!(text.contains("event: endpoint"));
    assert!(text.contains("/messages?session_id="));

    let session_id = text
        .split("session_id=")
        .nth(1)
        .unwrap()
        .trim()
        .to_string();

    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": { "protocolVersion": "2025-06-18" }
    });
    let resp = client
        .post(format!(
            "http://{addr}/messages?session_id={session_id}&client_id=test-client"
        ))
        .json(&payload)
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    server_task.abort();
    Ok(())
}

#[tokio::test]
async fn submission_against_unknown_session_is_404() -> Result<()> {
    let (addr, server_task) = start_test_server().await?;
    let client = reqwest::Client::new();
    client
        .get(format!("http://{addr}/oauth/start-auth/test-client"))
        .send()
        .await?;

    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "ping",
    });
    let resp = client
        .post(format!(
            "http://{addr}/messages?session_id=does-not-exist&client_id=test-client"
        ))
        .json(&payload)
        .send()
        .await?;
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    server_task.abort();
    Ok(())
}

#[tokio::test]
async fn health_document_reports_supported_protocol_versions() -> Result<()> {
    let (addr, server_task) = start_test_server().await?;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .get(format!("http://{addr}/"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["status"], "ok");
    assert!(body["protocol_versions"].as_array().unwrap().len() >= 1);

    server_task.abort();
    Ok(())
}
