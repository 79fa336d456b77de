use std::fmt;

use anyhow::Result;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tracing::{error, warn};

use super::step::{advance, Advance, Step, Transition};
use crate::channels::{ChatId, ChatKind, ChatRef, InboundMessage, Sender, UserId};

/// The (chat, sender) key deciding which dialogue, if any, captures an
/// inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub chat: ChatId,
    pub user: UserId,
}

impl Binding {
    pub fn of(msg: &InboundMessage) -> Self {
        Self {
            chat: msg.chat.id().clone(),
            user: msg.sender.id.clone(),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.chat, self.user)
    }
}

#[derive(Debug, Error)]
pub enum DialogueError {
    /// The dialogue was declared for one chat kind and bound to another.
    /// Raised at build time so the invoking command can report it instead
    /// of silently never receiving input.
    #[error("dialogue runs in {declared} chats, but {chat} is a {actual} chat")]
    KindMismatch {
        declared: ChatKind,
        actual: ChatKind,
        chat: ChatId,
    },
    /// A dialogue with no steps could never advance or stop.
    #[error("dialogue has no steps")]
    Empty,
    /// The (chat, sender) pair already has an active dialogue. Never
    /// overwritten silently; finish or cancel the running one first.
    #[error("a dialogue is already active for {0}")]
    AlreadyEngaged(Binding),
}

/// A live multi-turn dialogue bound to one (chat, sender) pair.
///
/// `S` is the session-scoped state: prompts read it, handlers mutate it.
/// Built via [`Dialogue::builder`], then consumed by
/// [`super::DialogueRegistry::start`]; once its worker exits the value is
/// dropped, so a finished dialogue cannot be restarted.
pub struct Dialogue<S> {
    pub(crate) steps: Vec<Step<S>>,
    pub(crate) cursor: usize,
    pub(crate) chat: ChatRef,
    pub(crate) with: Sender,
    pub(crate) state: S,
}

/// Describes a dialogue before it is bound to a concrete chat: the declared
/// chat kind plus the ordered steps.
pub struct DialogueBuilder<S> {
    kind: ChatKind,
    steps: Vec<Step<S>>,
}

impl<S> Dialogue<S> {
    /// Start describing a dialogue that runs in chats of `kind`.
    pub fn builder(kind: ChatKind) -> DialogueBuilder<S> {
        DialogueBuilder {
            kind,
            steps: Vec::new(),
        }
    }

    pub fn binding(&self) -> Binding {
        Binding {
            chat: self.chat.id().clone(),
            user: self.with.id.clone(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    /// Send the current step's prompt. A failed send is logged and the
    /// dialogue stays where it is; the sender can still answer or cancel.
    ///
    /// `&mut self` although it only reads: `Dialogue<S>` is `Send` but not
    /// `Sync` (boxed `FnMut` handlers), and the worker future must stay
    /// `Send`, so no shared borrow may live across the send.
    pub(crate) async fn send_prompt(&mut self) {
        let text = self.steps[self.cursor].render(&self.state);
        if let Err(e) = self.chat.send(&text).await {
            warn!(
                chat = %self.chat.id(),
                step = self.cursor,
                error = %e,
                "dialogue.prompt_send_failed"
            );
        }
    }

    /// Run one turn: hand `msg` to the current step's handler and apply the
    /// transition it returns. A handler fault is reported through the shared
    /// failure path and treated as a replay, leaving the cursor untouched.
    pub(crate) async fn take_turn(&mut self, msg: &InboundMessage) -> TurnOutcome {
        let len = self.steps.len();
        let step = &mut self.steps[self.cursor];
        let transition = match (step.handler)(msg, &mut self.state).await {
            Ok(transition) => transition,
            Err(e) => {
                warn!(
                    chat = %msg.chat.id(),
                    user = %msg.sender.id,
                    step = self.cursor,
                    error = %e,
                    "dialogue.handler_failed"
                );
                crate::bot::report_failure(&self.chat, "that answer").await;
                Transition::Replay
            }
        };
        match advance(self.cursor, len, transition) {
            Advance::At(next) => {
                self.cursor = next;
                self.send_prompt().await;
                TurnOutcome::Continue
            }
            Advance::Clamped(stay) => {
                error!(
                    chat = %self.chat.id(),
                    step = self.cursor,
                    ?transition,
                    "dialogue.transition_out_of_range"
                );
                self.cursor = stay;
                self.send_prompt().await;
                TurnOutcome::Continue
            }
            Advance::Finished => TurnOutcome::Finished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnOutcome {
    Continue,
    Finished,
}

impl<S> DialogueBuilder<S> {
    /// Append a step: `prompt` renders the text shown on entry (and on every
    /// replay), `handler` consumes the next message and returns the one
    /// transition to apply.
    pub fn step<P, H>(mut self, prompt: P, handler: H) -> Self
    where
        P: Fn(&S) -> String + Send + Sync + 'static,
        H: for<'a> FnMut(&'a InboundMessage, &'a mut S) -> BoxFuture<'a, Result<Transition>>
            + Send
            + 'static,
    {
        self.steps.push(Step::new(prompt, handler));
        self
    }

    /// Bind to a concrete chat and sender, checking the chat's actual kind
    /// against the declared one. On success the dialogue is inert until
    /// handed to [`super::DialogueRegistry::start`].
    pub fn bind(self, chat: ChatRef, with: Sender, state: S) -> Result<Dialogue<S>, DialogueError> {
        if self.steps.is_empty() {
            return Err(DialogueError::Empty);
        }
        let actual = chat.kind();
        if actual != self.kind {
            return Err(DialogueError::KindMismatch {
                declared: self.kind,
                actual,
                chat: chat.id().clone(),
            });
        }
        Ok(Dialogue {
            steps: self.steps,
            cursor: 0,
            chat,
            with,
            state,
        })
    }
}
