//! Pure state transition function
//!
//! Given the same state and event this always produces the same result; all
//! I/O is described by the returned effects.

use super::state::{ChatTurn, PendingRequest, Phase, SessionState};
use super::{Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Reasons an event is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Agent is busy, wait for the current answer")]
    AgentBusy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Agent is not ready")]
    NotReady,
    #[error("Discarding response to request {0}, which is no longer pending")]
    StaleResponse(u64),
    #[error("Request {0} is still running on the agent")]
    RequestInFlight(u64),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

pub fn transition(state: &SessionState, event: Event) -> Result<TransitionResult, TransitionError> {
    match (&state.phase, event) {
        // ============================================================
        // Provisioning
        // ============================================================
        (Phase::Uninitialized, Event::Initialize) => {
            let result = TransitionResult::new(SessionState {
                phase: Phase::Provisioning,
                ..state.clone()
            });
            // A request from before the reset is still running; provisioning
            // starts once it reports back
            if state.in_flight.is_some() {
                return Ok(result.with_effect(Effect::NotifyClient));
            }
            Ok(result
                .with_effect(Effect::ProvisionAgent)
                .with_effect(Effect::NotifyClient))
        }

        (Phase::Provisioning, Event::AgentReady { session }) => {
            Ok(TransitionResult::new(SessionState {
                phase: Phase::Idle,
                agent: Some(session),
                ..state.clone()
            })
            .with_effect(Effect::NotifyClient))
        }

        (Phase::Provisioning, Event::ProvisioningFailed { message }) => {
            Ok(TransitionResult::new(SessionState {
                phase: Phase::Halted { message },
                agent: None,
                ..state.clone()
            })
            .with_effect(Effect::NotifyClient))
        }

        // ============================================================
        // Submission
        // ============================================================
        (Phase::Submitted { .. } | Phase::AwaitingResponse { .. }, Event::Submit { .. }) => {
            Err(TransitionError::AgentBusy)
        }

        (
            Phase::Uninitialized | Phase::Provisioning | Phase::Halted { .. },
            Event::Submit { .. },
        ) => Err(TransitionError::NotReady),

        (Phase::Idle, Event::Submit { text, .. }) if text.trim().is_empty() => {
            Err(TransitionError::EmptyMessage)
        }

        (Phase::Idle, Event::Submit { text, at }) => {
            let pending = PendingRequest {
                request_id: state.next_request_id,
                text,
                submitted_at: at,
            };
            Ok(TransitionResult::new(SessionState {
                phase: Phase::Submitted { pending },
                next_request_id: state.next_request_id + 1,
                ..state.clone()
            })
            .with_effect(Effect::NotifyClient)
            .with_effect(Effect::ProcessPending))
        }

        (Phase::Submitted { pending }, Event::Dispatch) => {
            // One remote request per session; this one waits in Submitted
            if let Some(running) = state.in_flight {
                return Err(TransitionError::RequestInFlight(running));
            }
            let effect = Effect::SendMessage {
                request_id: pending.request_id,
                text: pending.text.clone(),
            };
            Ok(TransitionResult::new(SessionState {
                phase: Phase::AwaitingResponse {
                    pending: pending.clone(),
                },
                in_flight: Some(pending.request_id),
                ..state.clone()
            })
            .with_effect(effect)
            .with_effect(Effect::NotifyClient))
        }

        // ============================================================
        // Responses
        // ============================================================
        (Phase::AwaitingResponse { pending }, Event::AgentReplied { request_id, text, at })
            if pending.request_id == request_id =>
        {
            Ok(complete_round_trip(state, pending, ChatTurn::agent(text, at)))
        }

        (Phase::AwaitingResponse { pending }, Event::AgentFailed { request_id, message, at })
            if pending.request_id == request_id =>
        {
            let reply = ChatTurn::agent(format!("Error: {message}"), at);
            Ok(complete_round_trip(state, pending, reply))
        }

        // Cleared or reset while the call was in flight: drop the outcome and
        // resume whatever was waiting for the session to be free
        (
            phase,
            Event::AgentReplied { request_id, .. } | Event::AgentFailed { request_id, .. },
        ) if state.in_flight == Some(request_id) => {
            let result = TransitionResult::new(SessionState {
                in_flight: None,
                ..state.clone()
            });
            Ok(match phase {
                Phase::Submitted { .. } => result.with_effect(Effect::ProcessPending),
                Phase::Provisioning => result.with_effect(Effect::ProvisionAgent),
                _ => result,
            })
        }

        (
            _,
            Event::AgentReplied { request_id, .. } | Event::AgentFailed { request_id, .. },
        ) => Err(TransitionError::StaleResponse(request_id)),

        // ============================================================
        // Clear / Reset
        // ============================================================
        (phase, Event::Clear) => {
            let phase = match phase {
                Phase::Submitted { .. } | Phase::AwaitingResponse { .. } => Phase::Idle,
                other => other.clone(),
            };
            Ok(TransitionResult::new(SessionState {
                phase,
                history: Vec::new(),
                ..state.clone()
            })
            .with_effect(Effect::NotifyClient))
        }

        (_, Event::Reset) => Ok(TransitionResult::new(SessionState {
            next_request_id: state.next_request_id,
            in_flight: state.in_flight,
            ..SessionState::default()
        })
        .with_effect(Effect::TeardownAgent)
        .with_effect(Effect::NotifyClient)),

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {phase:?} with event {event:?}"
        ))),
    }
}

/// Append the user turn and the reply, and go back to accepting input
fn complete_round_trip(
    state: &SessionState,
    pending: &PendingRequest,
    reply: ChatTurn,
) -> TransitionResult {
    let mut history = state.history.clone();
    history.push(ChatTurn::user(pending.text.clone(), pending.submitted_at));
    history.push(reply);

    TransitionResult::new(SessionState {
        phase: Phase::Idle,
        history,
        in_flight: None,
        ..state.clone()
    })
    .with_effect(Effect::NotifyClient)
}
