//! The dialogue engine: scripted multi-turn conversations bound to one
//! (chat, sender) pair, multiplexed across a concurrent inbound stream.
//!
//! A command builds a [`Dialogue`] from ordered steps and hands it to the
//! [`DialogueRegistry`]. From then on every inbound message is offered to
//! [`DialogueRegistry::route`] ahead of command dispatch; messages matching
//! an active binding drive that dialogue's current step, everything else
//! passes through unchanged.

mod registry;
mod session;
mod step;

pub use registry::{CancelPolicy, DialogueRegistry, Routed};
pub use session::{Binding, Dialogue, DialogueBuilder, DialogueError};
pub use step::Transition;

#[cfg(test)]
pub(crate) use session::TurnOutcome;
