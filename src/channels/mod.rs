//! Platform adapters and the shared message vocabulary.
//!
//! A [`Channel`] listens for inbound events and materializes a [`Chat`]
//! handle per event; everything downstream (dialogues, commands) talks to
//! chats and never sees platform specifics.

pub mod console;
pub mod qq;
pub mod traits;

pub use console::ConsoleChannel;
pub use qq::QqChannel;
pub use traits::{Channel, Chat, ChatId, ChatKind, ChatRef, InboundMessage, Sender, UserId};
