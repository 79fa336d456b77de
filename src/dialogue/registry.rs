use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::session::{Binding, Dialogue, DialogueError, TurnOutcome};
use crate::channels::InboundMessage;

/// Engine-level cancellation: words that end any dialogue from the outside,
/// so individual step handlers never need their own escape hatch.
#[derive(Debug, Clone)]
pub struct CancelPolicy {
    words: Vec<String>,
    ack: Option<String>,
}

impl CancelPolicy {
    pub fn new(words: Vec<String>, ack: Option<String>) -> Self {
        Self { words, ack }
    }

    /// Whole-message match on the trimmed text, ASCII-case-insensitive.
    fn matches(&self, text: &str) -> bool {
        let text = text.trim();
        self.words.iter().any(|word| text.eq_ignore_ascii_case(word))
    }
}

impl Default for CancelPolicy {
    fn default() -> Self {
        Self {
            words: vec!["cancel".to_string(), "exit".to_string()],
            ack: Some("Okay, never mind.".to_string()),
        }
    }
}

/// What a dialogue worker receives, in arrival order, on its private queue.
enum Input {
    Turn(InboundMessage),
    Cancel(InboundMessage),
}

impl Input {
    fn into_message(self) -> InboundMessage {
        match self {
            Input::Turn(msg) | Input::Cancel(msg) => msg,
        }
    }
}

struct ActiveDialogue {
    feed: mpsc::UnboundedSender<Input>,
}

/// Outcome of offering an inbound message to the dialogue engine.
#[derive(Debug)]
pub enum Routed {
    /// Delivered to an active dialogue; command dispatch must not also
    /// process this message.
    Consumed,
    /// No active dialogue claimed the message.
    Pass(InboundMessage),
}

/// Process-wide index of active dialogues, keyed by (chat, sender).
///
/// One worker task per binding serializes that binding's turns in arrival
/// order; different bindings run fully in parallel. The map lock is only
/// held for insert/lookup/remove, never across an await.
///
/// Owned by the bot and shared via `Arc`; nothing here is process-global.
pub struct DialogueRegistry {
    active: Mutex<HashMap<Binding, ActiveDialogue>>,
    cancel: CancelPolicy,
    /// Messages that were queued behind a dialogue when it stopped. The bot
    /// loop drains this into plain command dispatch so nothing is dropped.
    passback: mpsc::UnboundedSender<InboundMessage>,
}

impl DialogueRegistry {
    /// Build the registry plus the receiver for handed-back messages.
    pub fn new(cancel: CancelPolicy) -> (Arc<Self>, mpsc::UnboundedReceiver<InboundMessage>) {
        let (passback, handed_back) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            active: Mutex::new(HashMap::new()),
            cancel,
            passback,
        });
        (registry, handed_back)
    }

    /// Register a built dialogue and start its worker. The step-0 prompt is
    /// emitted from the worker shortly after this returns, before any queued
    /// message is processed.
    pub fn start<S: Send + 'static>(
        self: &Arc<Self>,
        dialogue: Dialogue<S>,
    ) -> Result<Binding, DialogueError> {
        let binding = dialogue.binding();
        let (feed, inbox) = mpsc::unbounded_channel();
        {
            let mut active = self.active.lock();
            if active.contains_key(&binding) {
                return Err(DialogueError::AlreadyEngaged(binding));
            }
            active.insert(binding.clone(), ActiveDialogue { feed });
        }
        info!(binding = %binding, steps = dialogue.len(), "dialogue.start");
        tokio::spawn(run_dialogue(
            dialogue,
            inbox,
            Arc::clone(self),
            binding.clone(),
        ));
        Ok(binding)
    }

    /// Offer an inbound message to the engine. Called ahead of command
    /// dispatch on every message; cheap (a map lookup and a queue push).
    pub fn route(&self, msg: InboundMessage) -> Routed {
        let binding = Binding::of(&msg);
        let feed = {
            self.active
                .lock()
                .get(&binding)
                .map(|entry| entry.feed.clone())
        };
        let Some(feed) = feed else {
            return Routed::Pass(msg);
        };
        let input = if self.cancel.matches(&msg.text) {
            Input::Cancel(msg)
        } else {
            Input::Turn(msg)
        };
        match feed.send(input) {
            Ok(()) => Routed::Consumed,
            // The worker exited between lookup and send: hand the message
            // back so it goes through normal command dispatch.
            Err(lost) => Routed::Pass(lost.0.into_message()),
        }
    }

    pub fn is_engaged(&self, binding: &Binding) -> bool {
        self.active.lock().contains_key(binding)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    fn deregister(&self, binding: &Binding) -> bool {
        self.active.lock().remove(binding).is_some()
    }
}

/// Releases the binding if the worker unwinds mid-turn, so a panicking
/// handler cannot leave a dead dialogue capturing messages forever.
struct ReleaseOnExit {
    registry: Arc<DialogueRegistry>,
    binding: Binding,
}

impl Drop for ReleaseOnExit {
    fn drop(&mut self) {
        if self.registry.deregister(&self.binding) {
            warn!(binding = %self.binding, "dialogue.worker_died");
        }
    }
}

async fn run_dialogue<S: Send + 'static>(
    mut dialogue: Dialogue<S>,
    mut inbox: mpsc::UnboundedReceiver<Input>,
    registry: Arc<DialogueRegistry>,
    binding: Binding,
) {
    let _guard = ReleaseOnExit {
        registry: Arc::clone(&registry),
        binding: binding.clone(),
    };

    dialogue.send_prompt().await;

    let mut cancelled = false;
    while let Some(input) = inbox.recv().await {
        match input {
            Input::Cancel(_) => {
                cancelled = true;
                break;
            }
            Input::Turn(msg) => {
                debug!(binding = %binding, "dialogue.turn");
                match dialogue.take_turn(&msg).await {
                    TurnOutcome::Continue => {}
                    TurnOutcome::Finished => break,
                }
            }
        }
    }

    // Deregister before draining: once the binding is gone no new message
    // can land on this queue, so everything still in it is handed back to
    // command dispatch and nothing is lost in the stop window.
    registry.deregister(&binding);
    inbox.close();
    let mut handed_back = 0usize;
    while let Ok(input) = inbox.try_recv() {
        if registry.passback.send(input.into_message()).is_ok() {
            handed_back += 1;
        }
    }
    if handed_back > 0 {
        debug!(binding = %binding, count = handed_back, "dialogue.handed_back");
    }

    if cancelled {
        info!(binding = %binding, "dialogue.cancelled");
        if let Some(ack) = &registry.cancel.ack {
            if let Err(e) = dialogue.chat.send(ack).await {
                warn!(binding = %binding, error = %e, "dialogue.cancel_ack_failed");
            }
        }
    } else {
        info!(binding = %binding, "dialogue.stop");
    }
}
