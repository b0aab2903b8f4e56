//! Mock agent provider for testing
//!
//! Records every call and replays queued runs and message listings.

use super::types::{
    Agent, Connection, CreateAgentRequest, ListOrder, MessageRole, Run, RunError, RunStatus,
    Thread, ThreadMessage,
};
use super::{AgentProvider, ProviderError};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A recorded provider call
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Authenticate,
    ListConnections,
    CreateAgent(CreateAgentRequest),
    CreateThread,
    PostMessage {
        thread_id: String,
        role: MessageRole,
        content: String,
    },
    RunAndProcess {
        thread_id: String,
        agent_id: String,
    },
    ListMessages {
        order: ListOrder,
        limit: u32,
    },
    DeleteAgent(String),
}

#[derive(Default)]
pub struct MockProvider {
    connections: Vec<Connection>,
    auth_error: Option<ProviderError>,
    thread_error: Option<ProviderError>,
    delete_error: Option<ProviderError>,
    runs: Mutex<VecDeque<Result<Run, ProviderError>>>,
    messages: Mutex<VecDeque<Vec<ThreadMessage>>>,
    calls: Mutex<Vec<MockCall>>,
    provisioned: AtomicUsize,
    active_runs: AtomicUsize,
    max_active_runs: AtomicUsize,
    /// When set, runs block until the gate is notified
    run_gate: Option<Arc<Notify>>,
    /// Notified when a run starts
    pub run_started: Arc<Notify>,
}

#[allow(dead_code)]
impl MockProvider {
    pub const SEARCH_CONNECTION_ID: &'static str = "/connections/ragaisearch002";

    /// A provider whose project has no connections
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose project has the search connection the agent needs
    pub fn with_search_connection() -> Self {
        Self::new().with_connections(vec![
            Connection {
                name: "other-connection".to_string(),
                id: "/connections/other".to_string(),
            },
            Connection {
                name: "ragaisearch002".to_string(),
                id: Self::SEARCH_CONNECTION_ID.to_string(),
            },
        ])
    }

    pub fn with_connections(mut self, connections: Vec<Connection>) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_auth_error(mut self, error: ProviderError) -> Self {
        self.auth_error = Some(error);
        self
    }

    pub fn with_thread_error(mut self, error: ProviderError) -> Self {
        self.thread_error = Some(error);
        self
    }

    pub fn with_delete_error(mut self, error: ProviderError) -> Self {
        self.delete_error = Some(error);
        self
    }

    pub fn with_run_gate(mut self, gate: Arc<Notify>) -> Self {
        self.run_gate = Some(gate);
        self
    }

    /// Queue the result of the next `run_and_process`
    pub fn queue_run(&self, run: Run) {
        self.runs.lock().unwrap().push_back(Ok(run));
    }

    /// Queue a transport failure for the next `run_and_process`
    pub fn queue_run_error(&self, error: ProviderError) {
        self.runs.lock().unwrap().push_back(Err(error));
    }

    /// Queue the result of the next `list_messages`
    pub fn queue_messages(&self, messages: Vec<ThreadMessage>) {
        self.messages.lock().unwrap().push_back(messages);
    }

    /// Queue a completed run answered by `text`
    pub fn queue_reply(&self, text: &str) {
        self.queue_run(Run::completed());
        self.queue_messages(vec![Self::assistant_text(text)]);
    }

    pub fn assistant_text(text: &str) -> ThreadMessage {
        ThreadMessage {
            role: MessageRole::Assistant,
            content: vec![json!({ "type": "text", "text": { "value": text, "annotations": [] } })],
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Most runs that were ever in progress at the same time
    pub fn max_concurrent_runs(&self) -> usize {
        self.max_active_runs.load(Ordering::SeqCst)
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Run {
    pub fn completed() -> Self {
        Self {
            id: "run_mock".to_string(),
            status: RunStatus::Completed,
            last_error: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            id: "run_mock".to_string(),
            status: RunStatus::Failed,
            last_error: Some(RunError {
                code: None,
                message: Some(message.to_string()),
            }),
        }
    }
}

#[async_trait]
impl AgentProvider for MockProvider {
    async fn authenticate(&self) -> Result<(), ProviderError> {
        self.record(MockCall::Authenticate);
        match &self.auth_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn list_connections(&self) -> Result<Vec<Connection>, ProviderError> {
        self.record(MockCall::ListConnections);
        Ok(self.connections.clone())
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<Agent, ProviderError> {
        self.record(MockCall::CreateAgent(request.clone()));
        let n = self.provisioned.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Agent {
            id: format!("asst_mock_{n:024}"),
        })
    }

    async fn create_thread(&self) -> Result<Thread, ProviderError> {
        self.record(MockCall::CreateThread);
        if let Some(e) = &self.thread_error {
            return Err(e.clone());
        }
        let n = self.provisioned.load(Ordering::SeqCst);
        Ok(Thread {
            id: format!("thread_mock_{n:024}"),
        })
    }

    async fn post_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ProviderError> {
        self.record(MockCall::PostMessage {
            thread_id: thread_id.to_string(),
            role,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn run_and_process(&self, thread_id: &str, agent_id: &str) -> Result<Run, ProviderError> {
        self.record(MockCall::RunAndProcess {
            thread_id: thread_id.to_string(),
            agent_id: agent_id.to_string(),
        });
        let active = self.active_runs.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_runs.fetch_max(active, Ordering::SeqCst);
        self.run_started.notify_one();
        if let Some(gate) = &self.run_gate {
            gate.notified().await;
        }
        self.active_runs.fetch_sub(1, Ordering::SeqCst);
        self.runs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::network("No mock run queued")))
    }

    async fn list_messages(
        &self,
        _thread_id: &str,
        order: ListOrder,
        limit: u32,
    ) -> Result<Vec<ThreadMessage>, ProviderError> {
        self.record(MockCall::ListMessages { order, limit });
        Ok(self.messages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), ProviderError> {
        self.record(MockCall::DeleteAgent(agent_id.to_string()));
        match &self.delete_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
