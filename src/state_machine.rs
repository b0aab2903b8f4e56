//! Session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions: the
//! page is a projection of [`SessionState`], and every change goes through
//! [`transition`].

mod effect;
mod event;
pub mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{SessionSnapshot, SessionState};
pub use transition::{transition, TransitionError};
