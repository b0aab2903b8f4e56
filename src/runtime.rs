//! Runtime for executing user sessions
//!
//! Each session gets its own event loop task. Sessions share nothing but the
//! agent provider client.

mod executor;

pub use executor::SessionRuntime;

use crate::agent::{AgentGateway, AgentProvider};
use crate::config::AgentSpec;
use crate::controller::SessionController;
use crate::state_machine::{Event, SessionSnapshot, SessionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How often idle sessions are looked for
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Errors addressing a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session {0} is no longer running")]
    Closed(String),
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init { snapshot: SessionSnapshot },
    StateChange { snapshot: SessionSnapshot },
    Error { message: String },
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
    pub snapshot_rx: watch::Receiver<SessionSnapshot>,
    shutdown: CancellationToken,
}

struct SessionEntry {
    handle: SessionHandle,
    task: JoinHandle<()>,
    last_activity: Mutex<Instant>,
}

/// Manager for all session runtimes
pub struct RuntimeManager {
    provider: Arc<dyn AgentProvider>,
    spec: AgentSpec,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl RuntimeManager {
    pub fn new(provider: Arc<dyn AgentProvider>, spec: AgentSpec) -> Self {
        Self {
            provider,
            spec,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session and begin provisioning its agent
    pub async fn create_session(&self) -> Result<String, SessionError> {
        let session_id = uuid::Uuid::new_v4().to_string();

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionState::default().snapshot());
        let shutdown = CancellationToken::new();

        let gateway = AgentGateway::new(Arc::clone(&self.provider), self.spec.clone());
        let runtime = SessionRuntime::new(
            session_id.clone(),
            SessionController::new(gateway),
            event_rx,
            event_tx.clone(),
            broadcast_tx.clone(),
            snapshot_tx,
            shutdown.clone(),
        );
        let task = tokio::spawn(runtime.run());

        let handle = SessionHandle {
            event_tx,
            broadcast_tx,
            snapshot_rx,
            shutdown,
        };
        self.sessions.write().await.insert(
            session_id.clone(),
            SessionEntry {
                handle: handle.clone(),
                task,
                last_activity: Mutex::new(Instant::now()),
            },
        );

        tracing::info!(session_id = %session_id, "Session created");
        handle
            .event_tx
            .send(Event::Initialize)
            .await
            .map_err(|_| SessionError::Closed(session_id.clone()))?;
        Ok(session_id)
    }

    /// Look up a session, counting the lookup as activity
    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        *entry.last_activity.lock().await = Instant::now();
        Ok(entry.handle.clone())
    }

    /// Send an event to a session
    pub async fn send_event(&self, session_id: &str, event: Event) -> Result<(), SessionError> {
        let handle = self.get(session_id).await?;
        handle
            .event_tx
            .send(event)
            .await
            .map_err(|_| SessionError::Closed(session_id.to_string()))
    }

    /// Current state of a session
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let handle = self.get(session_id).await?;
        let snapshot = handle.snapshot_rx.borrow().clone();
        Ok(snapshot)
    }

    /// Current state plus a receiver for subsequent updates
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SseEvent>), SessionError> {
        let handle = self.get(session_id).await?;
        let rx = handle.broadcast_tx.subscribe();
        let snapshot = handle.snapshot_rx.borrow().clone();
        Ok((snapshot, rx))
    }

    /// Stop a session's runtime, waiting for its agent teardown
    pub async fn end_session(&self, session_id: &str) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        entry.handle.shutdown.cancel();
        if let Err(e) = entry.task.await {
            tracing::warn!(session_id = %session_id, error = %e, "Session task failed");
        }
        tracing::info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    /// End sessions that no page is subscribed to and that have seen no
    /// requests for `idle`. Returns how many were ended.
    pub async fn end_idle_sessions(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for (id, entry) in sessions.iter() {
                if entry.handle.broadcast_tx.receiver_count() > 0 {
                    continue;
                }
                let last_activity = *entry.last_activity.lock().await;
                if now.saturating_duration_since(last_activity) >= idle {
                    expired.push(id.clone());
                }
            }
        }

        for id in &expired {
            tracing::info!(session_id = %id, "Ending idle session");
            let _ = self.end_session(id).await;
        }
        expired.len()
    }

    /// Sweep for idle sessions in the background until the manager is dropped
    pub fn spawn_idle_reaper(self: &Arc<Self>, idle: Duration) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    tracing::debug!("Runtime manager dropped, idle reaper exiting");
                    break;
                };
                manager.end_idle_sessions(idle).await;
            }
        })
    }

    /// End every session (server shutdown)
    pub async fn end_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for id in ids {
            let _ = self.end_session(&id).await;
        }
    }
}
