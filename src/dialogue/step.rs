use anyhow::Result;
use futures_util::future::BoxFuture;

use crate::channels::InboundMessage;

/// What a step handler tells the engine to do after consuming one message.
///
/// Returning the transition is the only way to move a dialogue: there is no
/// "forgot to transition" state, and returning an `Err` instead means the
/// engine replays the current step (see the registry worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Advance to the following step and render its prompt. A defect on the
    /// final step: the engine clamps and replays instead of wrapping.
    Next,
    /// Stay on the current step and render its prompt again. The usual
    /// answer to input that failed validation.
    Replay,
    /// Jump to the step at this index and render its prompt. Used to loop
    /// back over part of a script.
    Goto(usize),
    /// End the dialogue. Its binding immediately stops capturing messages.
    Stop,
}

pub(crate) type PromptFn<S> = Box<dyn Fn(&S) -> String + Send + Sync>;

pub(crate) type HandlerFn<S> =
    Box<dyn for<'a> FnMut(&'a InboundMessage, &'a mut S) -> BoxFuture<'a, Result<Transition>> + Send>;

/// One stage of a dialogue: the text shown on entry plus the logic that
/// consumes the next message from the bound sender.
///
/// Prompts must be side-effect-free; the engine re-invokes them verbatim on
/// every replay and expects identical output for identical state.
pub struct Step<S> {
    prompt: PromptFn<S>,
    pub(crate) handler: HandlerFn<S>,
}

impl<S> Step<S> {
    pub(crate) fn new<P, H>(prompt: P, handler: H) -> Self
    where
        P: Fn(&S) -> String + Send + Sync + 'static,
        H: for<'a> FnMut(&'a InboundMessage, &'a mut S) -> BoxFuture<'a, Result<Transition>>
            + Send
            + 'static,
    {
        Self {
            prompt: Box::new(prompt),
            handler: Box::new(handler),
        }
    }

    pub(crate) fn render(&self, state: &S) -> String {
        (self.prompt)(state)
    }
}

/// Where the cursor lands after applying `transition` at `cursor` in a
/// script of `len` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    /// Move to this index and render its prompt.
    At(usize),
    /// The transition pointed outside the script; stay put and re-render.
    Clamped(usize),
    /// The dialogue ended.
    Finished,
}

pub(crate) fn advance(cursor: usize, len: usize, transition: Transition) -> Advance {
    match transition {
        Transition::Next if cursor + 1 < len => Advance::At(cursor + 1),
        Transition::Next => Advance::Clamped(cursor),
        Transition::Replay => Advance::At(cursor),
        Transition::Goto(n) if n < len => Advance::At(n),
        Transition::Goto(_) => Advance::Clamped(cursor),
        Transition::Stop => Advance::Finished,
    }
}
