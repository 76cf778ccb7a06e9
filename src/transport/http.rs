//! Streaming HTTP transport: SSE event stream + companion submission
//! endpoint.
//!
//! Built on `axum::response::sse` with a per-session `broadcast::Sender` and
//! `KeepAlive`. The first event on a freshly opened stream carries the
//! submission URL as a bare string (the `endpoint` handshake event), and the
//! companion POST path is keyed by a `session_id` query parameter.

use crate::config::Config;
use crate::error::TransportError;
use crate::protocol::engine::Engine;
use crate::protocol::types::{MCPRequest, MCPResponse, ServerEvent};
use crate::session::{Session, SessionManager};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Clone)]
pub struct HttpTransportState {
    pub engine: Arc<Engine>,
    pub sessions: Arc<SessionManager>,
    pub config: Arc<Config>,
}

/// The full streaming transport router (both paths, no auth gating). Kept
/// for callers that don't need to apply bearer-token middleware selectively;
/// the facade (§4.6) instead composes [`sse_router`] and [`messages_router`]
/// separately so the submission path alone carries the auth layer:
/// `/sse` auth is deployment-policy-optional, `/messages` requires a bearer
/// token unless simplified mode is configured.
pub fn router(state: HttpTransportState) -> Router {
    sse_router(state.clone()).merge(messages_router(state))
}

/// `GET /sse` only — the event-stream handshake path.
pub fn sse_router(state: HttpTransportState) -> Router {
    Router::new().route("/sse", get(open_stream)).with_state(state)
}

/// `POST /messages` only — the companion submission path this crate's
/// bearer-token middleware gates.
pub fn messages_router(state: HttpTransportState) -> Router {
    Router::new()
        .route("/messages", post(submit_message))
        .with_state(state)
}

async fn open_stream(
    State(state): State<HttpTransportState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = state.sessions.attach_http();
    let submission_url = format!(
        "{}/messages?session_id={}",
        state.config.server.public_base_url, session.id
    );

    let endpoint_event = futures::stream::once(async move {
        Ok(to_sse_event(&ServerEvent::Endpoint(submission_url)))
    });

    let rx = session
        .subscribe()
        .expect("HTTP sessions always carry an outbound channel");
    let message_events = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => Some(Ok(to_sse_event(&event))),
            Err(_lagged) => None,
        }
    });

    let stream = SessionBoundStream {
        inner: Box::pin(endpoint_event.chain(message_events)),
        session,
        sessions: state.sessions.clone(),
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(20))
            .text(": keep-alive"),
    )
}

fn to_sse_event(event: &ServerEvent) -> Event {
    Event::default().event(event.event_type()).data(event.data())
}

/// Wraps the SSE event stream so dropping it — which axum does as soon as
/// the connection closes, either end — tears down the session: removes it
/// from the registry and cancels its token so an in-flight tool call for
/// this session is abandoned rather than run to completion against a
/// client that's gone (spec's "closing an event stream cancels all
/// in-flight handlers for that session on a best-effort basis").
struct SessionBoundStream<T> {
    inner: Pin<Box<dyn Stream<Item = T> + Send>>,
    session: Arc<Session>,
    sessions: Arc<SessionManager>,
}

impl<T> Stream for SessionBoundStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<T> Drop for SessionBoundStream<T> {
    fn drop(&mut self) {
        self.sessions.detach(&self.session.id);
    }
}

#[derive(Debug, Deserialize)]
struct SubmitQuery {
    session_id: String,
}

/// POST /messages: submits one JSON-RPC frame for an open SSE session.
/// Responses are delivered asynchronously over the SSE stream, not in this
/// request's body: 202 for notifications, 200 empty for requests, 404 for
/// an unknown session.
async fn submit_message(
    State(state): State<HttpTransportState>,
    Query(query): Query<SubmitQuery>,
    body: Bytes,
) -> Response {
    let Some(session) = state.sessions.get(&query.session_id) else {
        return transport_error_response(
            StatusCode::NOT_FOUND,
            &TransportError::UnknownSession(query.session_id),
        );
    };

    let request: MCPRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return transport_error_response(
                StatusCode::BAD_REQUEST,
                &TransportError::ParseError(e.to_string()),
            )
        }
    };

    let is_notification = request.is_notification();
    let response: Option<MCPResponse> = state.engine.dispatch(&session, request).await;

    if is_notification {
        return StatusCode::ACCEPTED.into_response();
    }

    if let Some(response) = response {
        let value = serde_json::to_value(&response).unwrap_or_else(|_| serde_json::json!({}));
        session.publish(ServerEvent::Message(value));
    }

    StatusCode::OK.into_response()
}

fn transport_error_response(status: StatusCode, error: &TransportError) -> Response {
    (status, axum::Json(serde_json::json!({ "error": error.code() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_event_data_is_a_bare_url_not_json() {
        let event = ServerEvent::Endpoint("https://example.com/messages?session_id=abc".into());
        assert_eq!(event.data(), "https://example.com/messages?session_id=abc");
        assert_eq!(event.event_type(), "endpoint");
    }
}
