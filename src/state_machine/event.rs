//! Events that drive a session

use crate::agent::{AgentSession, GatewayError};
use chrono::{DateTime, Utc};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Lifecycle
    Initialize,
    AgentReady {
        session: AgentSession,
    },
    ProvisioningFailed {
        message: String,
    },

    // User actions
    Submit {
        text: String,
        at: DateTime<Utc>,
    },
    Clear,
    Reset,

    // Request processing
    Dispatch,
    AgentReplied {
        request_id: u64,
        text: String,
        at: DateTime<Utc>,
    },
    AgentFailed {
        request_id: u64,
        message: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn submit(text: impl Into<String>) -> Self {
        Event::Submit {
            text: text.into(),
            at: Utc::now(),
        }
    }

    /// Turn the outcome of a gateway send into the event reporting it
    pub fn from_send_result(request_id: u64, result: Result<String, GatewayError>) -> Self {
        match result {
            Ok(text) => Event::AgentReplied {
                request_id,
                text,
                at: Utc::now(),
            },
            Err(e) => Event::AgentFailed {
                request_id,
                message: e.to_string(),
                at: Utc::now(),
            },
        }
    }

    /// Turn the outcome of provisioning into the event reporting it
    pub fn from_provision_result(result: Result<AgentSession, GatewayError>) -> Self {
        match result {
            Ok(session) => Event::AgentReady { session },
            Err(e) => Event::ProvisioningFailed {
                message: e.to_string(),
            },
        }
    }
}
