//! Per-session agent gateway
//!
//! Provisions exactly one agent identity and thread for a user session, the
//! first time one is needed, and mediates request/response exchanges on it.

use super::extract::reply_or_placeholder;
use super::types::{
    Connection, CreateAgentRequest, ListOrder, MessageRole, RunStatus, ToolDefinition,
    ToolResources,
};
use super::{AgentProvider, GatewayError};
use crate::config::AgentSpec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifiers of a provisioned agent and its conversation thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSession {
    pub agent_id: String,
    pub thread_id: String,
}

/// Lazily provisioned connection between one user session and the agent service
pub struct AgentGateway {
    provider: Arc<dyn AgentProvider>,
    spec: AgentSpec,
    session: Option<AgentSession>,
}

impl AgentGateway {
    pub fn new(provider: Arc<dyn AgentProvider>, spec: AgentSpec) -> Self {
        Self {
            provider,
            spec,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&AgentSession> {
        self.session.as_ref()
    }

    pub fn provider(&self) -> Arc<dyn AgentProvider> {
        Arc::clone(&self.provider)
    }

    /// Provision the agent and thread if that has not happened yet.
    ///
    /// Subsequent calls return the cached session without remote calls.
    pub async fn ensure_session(&mut self) -> Result<AgentSession, GatewayError> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }

        let session = provision(self.provider.as_ref(), &self.spec).await?;
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Send one user message and wait for the agent's reply
    pub async fn send(&self, text: &str) -> Result<String, GatewayError> {
        let session = self.session.as_ref().ok_or(GatewayError::NoSession)?;
        send_message(self.provider.as_ref(), session, text).await
    }

    /// Delete the remote agent, best effort. The cached session is dropped
    /// whether or not the delete succeeds.
    pub async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            delete_session(self.provider.as_ref(), &session).await;
        }
    }
}

/// Find a connection by exact name
fn find_connection<'a>(connections: &'a [Connection], name: &str) -> Option<&'a Connection> {
    connections.iter().find(|c| c.name == name)
}

async fn provision(
    provider: &dyn AgentProvider,
    spec: &AgentSpec,
) -> Result<AgentSession, GatewayError> {
    provider
        .authenticate()
        .await
        .map_err(GatewayError::Provisioning)?;

    let connections = provider
        .list_connections()
        .await
        .map_err(GatewayError::Provisioning)?;
    let connection = find_connection(&connections, &spec.connection_name)
        .ok_or_else(|| GatewayError::ConnectionNotFound(spec.connection_name.clone()))?;
    tracing::info!(connection = %connection.name, "Connected to AI Search");

    let request = CreateAgentRequest {
        model: spec.model.clone(),
        name: spec.name.clone(),
        instructions: spec.instructions.clone(),
        tools: vec![ToolDefinition::AzureAiSearch],
        tool_resources: ToolResources::search(&connection.id, &spec.index_name),
    };
    let agent = provider
        .create_agent(&request)
        .await
        .map_err(GatewayError::Provisioning)?;

    let thread = match provider.create_thread().await {
        Ok(thread) => thread,
        Err(e) => {
            // Don't leave an orphaned agent behind
            if let Err(delete_err) = provider.delete_agent(&agent.id).await {
                tracing::warn!(agent_id = %agent.id, error = %delete_err, "Failed to delete agent");
            }
            return Err(GatewayError::Provisioning(e));
        }
    };

    tracing::info!(agent_id = %agent.id, thread_id = %thread.id, "Agent ready");
    Ok(AgentSession {
        agent_id: agent.id,
        thread_id: thread.id,
    })
}

/// Post `text` on the session's thread, run the agent to completion, and
/// read back its reply.
///
/// A failed run is not an error: its description is returned as the reply.
pub async fn send_message(
    provider: &dyn AgentProvider,
    session: &AgentSession,
    text: &str,
) -> Result<String, GatewayError> {
    provider
        .post_message(&session.thread_id, MessageRole::User, text)
        .await?;

    let run = provider
        .run_and_process(&session.thread_id, &session.agent_id)
        .await?;

    if run.status == RunStatus::Failed {
        tracing::warn!(run_id = %run.id, error = %run.error_text(), "Run failed");
        return Ok(format!("❌ Error: {}", run.error_text()));
    }

    let messages = provider
        .list_messages(&session.thread_id, ListOrder::Desc, 1)
        .await?;

    Ok(reply_or_placeholder(messages.first()))
}

/// Delete the session's agent; failures are logged and ignored
async fn delete_session(provider: &dyn AgentProvider, session: &AgentSession) {
    match provider.delete_agent(&session.agent_id).await {
        Ok(()) => tracing::info!(agent_id = %session.agent_id, "Agent deleted"),
        Err(e) => {
            tracing::warn!(agent_id = %session.agent_id, error = %e, "Agent teardown failed");
        }
    }
}
