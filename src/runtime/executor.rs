//! Session runtime executor

use super::SseEvent;
use crate::agent::{send_message, GatewayError};
use crate::controller::SessionController;
use crate::state_machine::{Effect, Event, SessionSnapshot, TransitionError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Event loop driving one user session.
///
/// Events are processed one at a time. Agent requests run as background
/// tasks and report back through the event channel, so `Clear` and `Reset`
/// are handled while a request is in flight. The state machine holds back
/// the next request until the running one has reported.
pub struct SessionRuntime {
    session_id: String,
    controller: SessionController,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    shutdown: CancellationToken,
}

impl SessionRuntime {
    pub fn new(
        session_id: String,
        controller: SessionController,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            controller,
            event_rx,
            event_tx,
            broadcast_tx,
            snapshot_tx,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.session_id, "Starting session runtime");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                Some(event) = self.event_rx.recv() => self.process_event(event).await,
            }
        }

        // The remote agent would otherwise outlive the session
        self.controller.execute_effect(Effect::TeardownAgent).await;
        tracing::info!(session_id = %self.session_id, "Session runtime stopped");
    }

    async fn process_event(&mut self, event: Event) {
        let mut events = vec![event];

        while let Some(current) = events.pop() {
            if let Event::AgentReplied { request_id, .. } | Event::AgentFailed { request_id, .. } =
                &current
            {
                if self.controller.state().pending_request_id() != Some(*request_id) {
                    tracing::info!(
                        session_id = %self.session_id,
                        request_id = *request_id,
                        "Late agent response dropped"
                    );
                }
            }

            let effects = match self.controller.handle_event(current) {
                Ok(effects) => effects,
                Err(e @ TransitionError::InvalidTransition(_)) => {
                    tracing::warn!(session_id = %self.session_id, error = %e, "Rejected event");
                    let _ = self.broadcast_tx.send(SseEvent::Error {
                        message: e.to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    tracing::debug!(session_id = %self.session_id, reason = %e, "Event ignored");
                    continue;
                }
            };

            for effect in effects {
                match effect {
                    Effect::NotifyClient => self.publish(),
                    Effect::ProcessPending => events.push(Event::Dispatch),
                    Effect::SendMessage { request_id, text } => {
                        if let Some(failed) = self.spawn_send(request_id, text) {
                            events.push(failed);
                        }
                    }
                    other => {
                        if let Some(next) = self.controller.execute_effect(other).await {
                            events.push(next);
                        }
                    }
                }
            }
        }
    }

    /// Issue the agent request in the background. Returns the failure event
    /// immediately if there is no agent to send to.
    fn spawn_send(&self, request_id: u64, text: String) -> Option<Event> {
        let gateway = self.controller.gateway();
        let Some(session) = gateway.session().cloned() else {
            return Some(Event::from_send_result(
                request_id,
                Err(GatewayError::NoSession),
            ));
        };
        let provider = gateway.provider();
        let event_tx = self.event_tx.clone();
        let session_id = self.session_id.clone();

        tracing::info!(session_id = %session_id, request_id, "Sending message to agent");
        tokio::spawn(async move {
            let result = send_message(provider.as_ref(), &session, &text).await;
            if let Err(GatewayError::Request(e)) = &result {
                tracing::warn!(session_id = %session_id, request_id, kind = ?e.kind, error = %e, "Agent request failed");
            }
            if event_tx
                .send(Event::from_send_result(request_id, result))
                .await
                .is_err()
            {
                tracing::debug!(session_id = %session_id, request_id, "Session ended before reply");
            }
        });
        None
    }

    fn publish(&self) {
        let snapshot = self.controller.state().snapshot();
        self.snapshot_tx.send_replace(snapshot.clone());
        let _ = self.broadcast_tx.send(SseEvent::StateChange { snapshot });
    }
}
