//! Session state types

use crate::agent::AgentSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of identifier characters shown in the debug view
const DEBUG_ID_CHARS: usize = 20;

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Agent,
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at,
        }
    }

    pub fn agent(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
            at,
        }
    }
}

/// The user message currently being answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Tags the remote call so that responses arriving after `Clear` or
    /// `Reset` can be told apart from the current one
    pub request_id: u64,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
}

/// Where the session is in its request lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    /// No agent provisioned yet
    #[default]
    Uninitialized,

    /// Agent and thread are being created
    Provisioning,

    /// Accepting input
    Idle,

    /// User pressed send; the request has not been issued yet
    Submitted { pending: PendingRequest },

    /// Remote call in flight
    AwaitingResponse { pending: PendingRequest },

    /// Provisioning failed; only a reset leaves this phase
    Halted { message: String },
}

impl Phase {
    fn pending(&self) -> Option<&PendingRequest> {
        match self {
            Phase::Submitted { pending } | Phase::AwaitingResponse { pending } => Some(pending),
            _ => None,
        }
    }
}

/// Everything one user session owns
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    pub history: Vec<ChatTurn>,
    pub agent: Option<AgentSession>,
    /// Id given to the next submitted request. Survives `Reset`.
    pub next_request_id: u64,
    /// Request whose remote call has not reported back yet. Survives `Clear`
    /// and `Reset`; nothing new is sent on the session until it is `None`.
    pub in_flight: Option<u64>,
}

impl SessionState {
    /// Whether a submitted message is waiting for its answer
    pub fn is_processing(&self) -> bool {
        self.phase.pending().is_some()
    }

    /// The in-flight user message; set exactly when `is_processing`
    pub fn pending_input(&self) -> Option<&str> {
        self.phase.pending().map(|p| p.text.as_str())
    }

    pub fn pending_request_id(&self) -> Option<u64> {
        self.phase.pending().map(|p| p.request_id)
    }

    /// Status line shown next to the controls
    pub fn status_label(&self) -> &'static str {
        match self.phase {
            Phase::Uninitialized | Phase::Provisioning => "Initializing...",
            Phase::Idle => "Ready",
            Phase::Submitted { .. } | Phase::AwaitingResponse { .. } => "Processing...",
            Phase::Halted { .. } => "Unavailable",
        }
    }

    pub fn debug_view(&self) -> DebugView {
        DebugView {
            history_len: self.history.len(),
            is_processing: self.is_processing(),
            agent_id: self.agent.as_ref().map(|a| truncate_id(&a.agent_id)),
            thread_id: self.agent.as_ref().map(|a| truncate_id(&a.thread_id)),
        }
    }

    /// Read-only projection handed to clients
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase.clone(),
            history: self.history.clone(),
            is_processing: self.is_processing(),
            pending_input: self.pending_input().map(ToString::to_string),
            status: self.status_label(),
            error: match &self.phase {
                Phase::Halted { message } => Some(message.clone()),
                _ => None,
            },
            debug: self.debug_view(),
        }
    }
}

/// Internal identifiers, shortened for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugView {
    pub history_len: usize,
    pub is_processing: bool,
    pub agent_id: Option<String>,
    pub thread_id: Option<String>,
}

/// What the page renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub history: Vec<ChatTurn>,
    pub is_processing: bool,
    pub pending_input: Option<String>,
    pub status: &'static str,
    pub error: Option<String>,
    pub debug: DebugView,
}

fn truncate_id(id: &str) -> String {
    let prefix: String = id.chars().take(DEBUG_ID_CHARS).collect();
    format!("{prefix}...")
}
