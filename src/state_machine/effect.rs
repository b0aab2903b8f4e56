//! Effects produced by state transitions

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Create the agent and thread for this session
    ProvisionAgent,

    /// A message was submitted; issue it when the caller is ready
    ProcessPending,

    /// Post the message and wait for the agent's reply
    SendMessage { request_id: u64, text: String },

    /// Delete the remote agent (best effort)
    TeardownAgent,

    /// Push the new state to connected clients
    NotifyClient,
}
