//! Conversation state controller
//!
//! Owns one session's [`SessionState`] and [`AgentGateway`], applies events
//! through the pure transition function, and executes the resulting effects.
//! Rejected events are no-ops for the caller; remote failures end up in the
//! chat history rather than being returned.
//!
//! Two drivers sit on top. The session runtime feeds events through
//! [`SessionController::handle_event`] and spawns agent requests itself so
//! the session stays responsive. `initialize`, `submit`, `process_pending`,
//! `clear` and `reset` are the synchronous driver: each awaits every effect
//! inline, so a request is always finished before the next call returns.
//! The server uses the runtime; the synchronous driver serves embedders and
//! tests.

use crate::agent::AgentGateway;
use crate::state_machine::{transition, Effect, Event, SessionState, TransitionError};

pub struct SessionController {
    state: SessionState,
    gateway: AgentGateway,
}

impl SessionController {
    pub fn new(gateway: AgentGateway) -> Self {
        Self {
            state: SessionState::default(),
            gateway,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn gateway(&self) -> &AgentGateway {
        &self.gateway
    }

    /// Apply one event, returning the effects the caller must execute
    pub fn handle_event(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
        let result = transition(&self.state, event)?;
        self.state = result.new_state;
        Ok(result.effects)
    }

    /// Execute an effect inline, returning the event that reports its outcome.
    ///
    /// `ProcessPending` and `NotifyClient` are left to the caller.
    pub async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::ProvisionAgent => {
                let result = self.gateway.ensure_session().await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Agent provisioning failed");
                }
                Some(Event::from_provision_result(result))
            }
            Effect::SendMessage { request_id, text } => {
                let result = self.gateway.send(&text).await;
                Some(Event::from_send_result(request_id, result))
            }
            Effect::TeardownAgent => {
                self.gateway.teardown().await;
                None
            }
            Effect::ProcessPending | Effect::NotifyClient => None,
        }
    }
}

/// Driving the conversation directly, with every effect awaited inline
#[allow(dead_code)] // Unused by the server binary, which goes through the runtime
impl SessionController {
    /// Apply an event and everything it sets in motion
    async fn apply(&mut self, event: Event) {
        let mut events = vec![event];
        while let Some(event) = events.pop() {
            match self.handle_event(event) {
                Ok(effects) => {
                    for effect in effects {
                        if let Some(next) = self.execute_effect(effect).await {
                            events.push(next);
                        }
                    }
                }
                Err(e) => tracing::debug!(reason = %e, "Event ignored"),
            }
        }
    }

    /// Provision the agent for this session
    pub async fn initialize(&mut self) {
        self.apply(Event::Initialize).await;
    }

    /// Accept a message for processing. Returns whether it was accepted;
    /// busy, empty, or not-ready submissions are ignored.
    pub fn submit(&mut self, text: &str) -> bool {
        match self.handle_event(Event::submit(text)) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(reason = %e, "Submit ignored");
                false
            }
        }
    }

    /// Send the submitted message and record the exchange
    pub async fn process_pending(&mut self) {
        self.apply(Event::Dispatch).await;
    }

    /// Empty the history. An in-flight reply, if any, will be discarded.
    pub fn clear(&mut self) {
        if let Err(e) = self.handle_event(Event::Clear) {
            tracing::debug!(reason = %e, "Clear ignored");
        }
    }

    /// Tear down the remote agent and discard all session state
    pub async fn reset(&mut self) {
        self.apply(Event::Reset).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{MockCall, MockProvider};
    use crate::agent::{ProviderError, Run};
    use crate::config::AgentSpec;
    use crate::state_machine::state::{Phase, Role};
    use std::sync::Arc;

    async fn ready_controller(provider: &Arc<MockProvider>) -> SessionController {
        let mut controller =
            SessionController::new(AgentGateway::new(provider.clone(), AgentSpec::default()));
        controller.initialize().await;
        assert_eq!(controller.state().phase, Phase::Idle);
        controller
    }

    fn turns(controller: &SessionController) -> Vec<(Role, String)> {
        controller
            .state()
            .history
            .iter()
            .map(|t| (t.role, t.text.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_doc_question_round_trip() {
        let provider = Arc::new(MockProvider::with_search_connection());
        provider.queue_reply("Doc X contains...");
        let mut controller = ready_controller(&provider).await;

        assert!(controller.submit("What is in doc X?"));
        assert!(controller.state().is_processing());
        assert!(matches!(controller.state().phase, Phase::Submitted { .. }));

        controller.process_pending().await;

        assert_eq!(
            turns(&controller),
            vec![
                (Role::User, "What is in doc X?".to_string()),
                (Role::Agent, "Doc X contains...".to_string()),
            ]
        );
        assert_eq!(controller.state().phase, Phase::Idle);
        assert_eq!(provider.count(|c| matches!(c, MockCall::PostMessage { .. })), 1);
        assert_eq!(provider.count(|c| matches!(c, MockCall::RunAndProcess { .. })), 1);
    }

    #[tokio::test]
    async fn test_failed_run_is_recovered() {
        let provider = Arc::new(MockProvider::with_search_connection());
        provider.queue_run(Run::failed("rate limited"));
        let mut controller = ready_controller(&provider).await;

        controller.submit("hello");
        controller.process_pending().await;

        let history = &controller.state().history;
        assert_eq!(history.len(), 2);
        assert!(history[1].text.contains("rate limited"));
        assert_eq!(controller.state().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_transport_failure_is_recovered() {
        let provider = Arc::new(MockProvider::with_search_connection());
        provider.queue_run_error(ProviderError::network("connection reset by peer"));
        provider.queue_reply("second answer");
        let mut controller = ready_controller(&provider).await;

        controller.submit("first");
        controller.process_pending().await;

        let history = &controller.state().history;
        assert_eq!(history.len(), 2);
        assert!(history[1].text.contains("Error"));
        assert!(!controller.state().is_processing());
        assert!(controller.state().pending_input().is_none());

        // The session stays usable
        assert!(controller.submit("second"));
        controller.process_pending().await;
        assert_eq!(controller.state().history.len(), 4);
        assert_eq!(controller.state().history[3].text, "second answer");
    }

    #[tokio::test]
    async fn test_submit_ignored_while_processing() {
        let provider = Arc::new(MockProvider::with_search_connection());
        let mut controller = ready_controller(&provider).await;

        assert!(controller.submit("first"));
        assert!(!controller.submit("second"));
        assert!(!controller.submit("third"));

        assert!(controller.state().history.is_empty());
        assert_eq!(controller.state().pending_input(), Some("first"));
    }

    #[tokio::test]
    async fn test_submit_ignored_before_initialize() {
        let provider = Arc::new(MockProvider::with_search_connection());
        let mut controller =
            SessionController::new(AgentGateway::new(provider.clone(), AgentSpec::default()));

        assert!(!controller.submit("hello"));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_process_pending_without_submission_is_noop() {
        let provider = Arc::new(MockProvider::with_search_connection());
        let mut controller = ready_controller(&provider).await;

        controller.process_pending().await;

        assert!(controller.state().history.is_empty());
        assert_eq!(provider.count(|c| matches!(c, MockCall::PostMessage { .. })), 0);
    }

    #[tokio::test]
    async fn test_clear_while_submitted() {
        let provider = Arc::new(MockProvider::with_search_connection());
        provider.queue_reply("answer");
        let mut controller = ready_controller(&provider).await;

        controller.submit("hello");
        controller.process_pending().await;
        controller.submit("pending");
        controller.clear();

        assert!(controller.state().history.is_empty());
        assert!(!controller.state().is_processing());

        // Nothing left to send
        controller.process_pending().await;
        assert_eq!(provider.count(|c| matches!(c, MockCall::PostMessage { .. })), 1);
    }

    #[tokio::test]
    async fn test_connection_missing_halts() {
        let provider = Arc::new(MockProvider::new());
        let mut controller =
            SessionController::new(AgentGateway::new(provider.clone(), AgentSpec::default()));

        controller.initialize().await;

        match &controller.state().phase {
            Phase::Halted { message } => assert!(message.contains("connection not found")),
            other => panic!("expected Halted, got {other:?}"),
        }
        assert!(!controller.submit("hello"));
        assert_eq!(provider.count(|c| matches!(c, MockCall::CreateAgent(_))), 0);
    }

    #[tokio::test]
    async fn test_reset_tears_down_and_reprovisions() {
        let provider = Arc::new(
            MockProvider::with_search_connection()
                .with_delete_error(ProviderError::network("unreachable")),
        );
        provider.queue_reply("answer");
        let mut controller = ready_controller(&provider).await;
        let first_agent = controller.state().agent.clone().unwrap();

        controller.submit("hello");
        controller.process_pending().await;
        controller.reset().await;

        assert_eq!(controller.state().phase, Phase::Uninitialized);
        assert!(controller.state().history.is_empty());
        assert!(controller.state().agent.is_none());
        assert!(controller.gateway().session().is_none());
        assert!(provider
            .calls()
            .contains(&MockCall::DeleteAgent(first_agent.agent_id.clone())));

        controller.initialize().await;
        let second_agent = controller.state().agent.clone().unwrap();
        assert_ne!(first_agent, second_agent);
        assert_eq!(provider.count(|c| matches!(c, MockCall::CreateAgent(_))), 2);
    }
}
