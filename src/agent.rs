//! Remote agent service
//!
//! The agents API is an opaque collaborator: agent identities, threads and
//! runs live server-side. This module defines the operations we consume
//! ([`AgentProvider`]), an HTTP implementation of them, and the per-session
//! gateway that provisions one agent + thread and mediates exchanges.

mod error;
mod extract;
mod gateway;
mod http;
mod types;

#[cfg(test)]
pub mod testing;

pub use error::{GatewayError, ProviderError};
pub use gateway::{send_message, AgentGateway, AgentSession};
pub use http::HttpAgentProvider;
pub use types::*;

use async_trait::async_trait;

/// Operations consumed from the remote agents API
#[async_trait]
pub trait AgentProvider: Send + Sync {
    /// Acquire (or refresh) credentials for subsequent calls
    async fn authenticate(&self) -> Result<(), ProviderError>;

    /// List the project's connections
    async fn list_connections(&self) -> Result<Vec<Connection>, ProviderError>;

    /// Provision an agent identity
    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<Agent, ProviderError>;

    /// Open a conversation thread
    async fn create_thread(&self) -> Result<Thread, ProviderError>;

    /// Append a message to a thread
    async fn post_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ProviderError>;

    /// Start a run of `agent_id` over `thread_id` and wait for it to reach a
    /// terminal status
    async fn run_and_process(&self, thread_id: &str, agent_id: &str) -> Result<Run, ProviderError>;

    /// Read messages back from a thread
    async fn list_messages(
        &self,
        thread_id: &str,
        order: ListOrder,
        limit: u32,
    ) -> Result<Vec<ThreadMessage>, ProviderError>;

    /// Delete an agent identity
    async fn delete_agent(&self, agent_id: &str) -> Result<(), ProviderError>;
}
