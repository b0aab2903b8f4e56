//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::state::*;
use super::transition::*;
use super::*;
use crate::agent::AgentSession;
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn ready_state() -> SessionState {
    SessionState {
        phase: Phase::Idle,
        agent: Some(AgentSession {
            agent_id: "asst_prop".to_string(),
            thread_id: "thread_prop".to_string(),
        }),
        ..SessionState::default()
    }
}

/// Apply an event, keeping the old state when it is rejected
fn apply(state: &SessionState, event: Event) -> SessionState {
    match transition(state, event) {
        Ok(result) => result.new_state,
        Err(_) => state.clone(),
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        1 => Just(String::new()),
        1 => Just("   ".to_string()),
        6 => "[a-zA-Z0-9 ?]{1,20}",
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        4 => arb_text().prop_map(Event::submit),
        3 => Just(Event::Dispatch),
        3 => (0u64..6, "[a-z ]{1,20}").prop_map(|(request_id, text)| Event::AgentReplied {
            request_id,
            text,
            at: Utc::now(),
        }),
        2 => (0u64..6, "[a-z ]{1,20}").prop_map(|(request_id, message)| Event::AgentFailed {
            request_id,
            message,
            at: Utc::now(),
        }),
        1 => Just(Event::Clear),
        1 => Just(Event::Reset),
        1 => Just(Event::Initialize),
        1 => Just(Event::AgentReady {
            session: AgentSession {
                agent_id: "asst_new".to_string(),
                thread_id: "thread_new".to_string(),
            },
        }),
    ]
}

fn arb_reachable_state() -> impl Strategy<Value = SessionState> {
    proptest::collection::vec(arb_event(), 0..30)
        .prop_map(|events| events.into_iter().fold(ready_state(), |s, e| apply(&s, e)))
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_pending_input_iff_processing(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut state = ready_state();
        for event in events {
            state = apply(&state, event);
            prop_assert_eq!(state.is_processing(), state.pending_input().is_some());
        }
    }

    #[test]
    fn prop_history_is_user_agent_pairs(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut state = ready_state();
        for event in events {
            state = apply(&state, event);
            prop_assert_eq!(state.history.len() % 2, 0);
            for pair in state.history.chunks(2) {
                prop_assert_eq!(pair[0].role, Role::User);
                prop_assert_eq!(pair[1].role, Role::Agent);
            }
        }
    }

    #[test]
    fn prop_only_first_submit_accepted_while_processing(
        first in "[a-z]{1,10}",
        others in proptest::collection::vec(arb_text(), 1..10),
        dispatch_first in any::<bool>(),
    ) {
        let mut state = apply(&ready_state(), Event::submit(first.clone()));
        if dispatch_first {
            state = apply(&state, Event::Dispatch);
        }
        let history_len = state.history.len();

        for text in others {
            let result = transition(&state, Event::submit(text));
            prop_assert_eq!(result.unwrap_err(), TransitionError::AgentBusy);
        }
        prop_assert_eq!(state.history.len(), history_len);
        prop_assert_eq!(state.pending_input(), Some(first.as_str()));
    }

    #[test]
    fn prop_clear_always_empties(state in arb_reachable_state()) {
        let cleared = transition(&state, Event::Clear).unwrap().new_state;
        prop_assert!(cleared.history.is_empty());
        prop_assert!(!cleared.is_processing());
        prop_assert_eq!(cleared.agent, state.agent);
    }

    #[test]
    fn prop_reply_grows_history_by_two(
        state in arb_reachable_state(),
        text in "[a-z]{1,10}",
        reply in "[a-z ]{1,20}",
        fail in any::<bool>(),
    ) {
        let state = apply(&apply(&state, Event::Clear), Event::submit(text.clone()));
        prop_assume!(state.is_processing());
        let state = apply(&state, Event::Dispatch);
        prop_assume!(matches!(state.phase, Phase::AwaitingResponse { .. }));
        let request_id = state.pending_request_id().unwrap();
        let before = state.history.len();

        let event = if fail {
            Event::AgentFailed { request_id, message: reply.clone(), at: Utc::now() }
        } else {
            Event::AgentReplied { request_id, text: reply.clone(), at: Utc::now() }
        };
        let after = transition(&state, event).unwrap().new_state;

        prop_assert_eq!(after.history.len(), before + 2);
        prop_assert_eq!(&after.history[before].text, &text);
        prop_assert!(after.history[before + 1].text.contains(reply.as_str()));
        if fail {
            prop_assert!(after.history[before + 1].text.contains("Error"));
        }
        prop_assert!(!after.is_processing());
        prop_assert!(after.pending_input().is_none());
    }

    #[test]
    fn prop_stale_responses_never_change_state(
        state in arb_reachable_state(),
        request_id in 0u64..10,
    ) {
        prop_assume!(state.pending_request_id() != Some(request_id));
        prop_assume!(state.in_flight != Some(request_id));
        let event = Event::AgentReplied {
            request_id,
            text: "late".to_string(),
            at: Utc::now(),
        };
        prop_assert_eq!(
            transition(&state, event).unwrap_err(),
            TransitionError::StaleResponse(request_id)
        );
    }

    #[test]
    fn prop_at_most_one_send_outstanding(events in proptest::collection::vec(arb_event(), 0..60)) {
        let mut state = ready_state();
        let mut outstanding: Option<u64> = None;
        for event in events {
            let reported = match &event {
                Event::AgentReplied { request_id, .. } | Event::AgentFailed { request_id, .. } => {
                    Some(*request_id)
                }
                _ => None,
            };
            let Ok(result) = transition(&state, event) else {
                continue;
            };
            if reported.is_some() && reported == outstanding {
                outstanding = None;
            }
            for effect in &result.effects {
                if let Effect::SendMessage { request_id, .. } = effect {
                    prop_assert_eq!(outstanding, None);
                    outstanding = Some(*request_id);
                }
            }
            state = result.new_state;
            prop_assert_eq!(state.in_flight, outstanding);
        }
    }

    #[test]
    fn prop_request_ids_never_reused(events in proptest::collection::vec(arb_event(), 0..40)) {
        let mut state = ready_state();
        let mut seen = Vec::new();
        for event in events {
            state = apply(&state, event);
            if let Some(id) = state.pending_request_id() {
                if seen.last() != Some(&id) {
                    prop_assert!(!seen.contains(&id));
                    seen.push(id);
                }
            }
        }
    }
}
