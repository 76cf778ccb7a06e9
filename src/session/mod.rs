//! Session Manager: owns per-connection state across both transports.
//!
//! Tracks negotiated protocol version, client info, the initialized flag,
//! and idle-timeout eviction for every attached session. Guarded by
//! `dashmap` for the same reason the wider codebase uses it elsewhere:
//! short-held, lock-free-ish concurrent map access from many tasks.

use crate::error::ProtocolError;
use crate::protocol::types::ServerEvent;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Which transport a session is attached to. The line transport has exactly
/// one process-wide session that is never idle-reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    Line,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Per-connection state.
pub struct Session {
    pub id: String,
    pub transport: TransportKind,
    state: parking_lot::RwLock<SessionState>,
    /// Outbound event channel, present only for the streaming HTTP
    /// transport.
    outbound: Option<broadcast::Sender<ServerEvent>>,
    created_at_unix: i64,
    last_activity_unix: AtomicI64,
    initialized: AtomicBool,
    /// Cancelled when the owning transport disconnects, so in-flight tool
    /// calls for this session can be abandoned on a best-effort basis
    /// instead of running to completion against a client that's gone.
    cancellation: CancellationToken,
    /// Held for the duration of one request's dispatch so that requests on
    /// the same session are processed serially even if two arrive
    /// concurrently (two overlapping `/messages` POSTs for one session id).
    /// Notifications don't take this lock.
    dispatch_lock: tokio::sync::Mutex<()>,
}

struct SessionState {
    protocol_version: Option<String>,
    client_info: Option<ClientInfo>,
}

impl Session {
    fn new(id: String, transport: TransportKind, outbound: Option<broadcast::Sender<ServerEvent>>) -> Self {
        let now = now_unix();
        Self {
            id,
            transport,
            state: parking_lot::RwLock::new(SessionState {
                protocol_version: None,
                client_info: None,
            }),
            outbound,
            created_at_unix: now,
            last_activity_unix: AtomicI64::new(now),
            initialized: AtomicBool::new(false),
            cancellation: CancellationToken::new(),
            dispatch_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Mark this session initialized with the negotiated version and client
    /// info. Fails `AlreadyInitialized` if called twice.
    pub fn complete_initialize(
        &self,
        protocol_version: String,
        client_info: ClientInfo,
    ) -> Result<(), ProtocolError> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            // Roll back — another concurrent initialize beat us to it.
            self.initialized.store(true, Ordering::Release);
            return Err(ProtocolError::AlreadyInitialized);
        }
        let mut state = self.state.write();
        state.protocol_version = Some(protocol_version);
        state.client_info = Some(client_info);
        Ok(())
    }

    pub fn protocol_version(&self) -> Option<String> {
        self.state.read().protocol_version.clone()
    }

    pub fn client_info(&self) -> Option<ClientInfo> {
        self.state.read().client_info.clone()
    }

    pub fn touch(&self) {
        self.last_activity_unix.store(now_unix(), Ordering::Release);
    }

    pub fn idle_seconds(&self) -> i64 {
        (now_unix() - self.last_activity_unix.load(Ordering::Acquire)).max(0)
    }

    pub fn created_at_unix(&self) -> i64 {
        self.created_at_unix
    }

    /// Subscribe to this session's outbound event stream (HTTP transport
    /// only).
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ServerEvent>> {
        self.outbound.as_ref().map(|tx| tx.subscribe())
    }

    /// Publish an event to this session's outbound stream. A no-op (but not
    /// an error) for sessions without an outbound channel, e.g. the line
    /// transport's single session.
    pub fn publish(&self, event: ServerEvent) {
        if let Some(tx) = &self.outbound {
            let _ = tx.send(event);
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.outbound
            .as_ref()
            .map(|tx| tx.receiver_count() > 0)
            .unwrap_or(true)
    }

    /// Mark this session's in-flight work for cancellation. Called when the
    /// owning transport disconnects (SSE stream closed, stdin at EOF).
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Resolves once [`Session::cancel`] has been called for this session.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Serializes request dispatch on this session. Held only around a
    /// single request's handling, not around notifications.
    pub async fn dispatch_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.dispatch_lock.lock().await
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Owns all Session records for the process.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
        }
    }

    /// Attach a new HTTP session with its own outbound broadcast channel.
    pub fn attach_http(&self) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();
        let (tx, _rx) = broadcast::channel(256);
        let session = Arc::new(Session::new(id.clone(), TransportKind::Http, Some(tx)));
        self.sessions.insert(id, session.clone());
        session
    }

    /// Attach the single process-wide line-transport session. Callers
    /// should call this exactly once per process.
    pub fn attach_line(&self) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), TransportKind::Line, None));
        self.sessions.insert(id, session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    pub fn detach(&self, id: &str) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Evict idle HTTP sessions past the configured timeout.
    /// Line-transport sessions are never evicted: EOF on stdin is their
    /// only teardown signal.
    pub fn reap_idle(&self) -> Vec<String> {
        let timeout_secs = self.idle_timeout.as_secs() as i64;
        let mut evicted = Vec::new();
        self.sessions.retain(|id, session| {
            let keep = session.transport == TransportKind::Line
                || (session.idle_seconds() < timeout_secs || session.has_subscriber());
            if !keep {
                session.cancel();
                evicted.push(id.clone());
            }
            keep
        });
        evicted
    }

    /// Spawn the background idle-reaper task. Returns a handle
    /// the caller can abort on shutdown.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = manager.reap_idle();
                for id in evicted {
                    tracing::info!(session_id = %id, "evicted idle session");
                }
            }
        })
    }
}
