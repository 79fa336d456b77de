//! Whole conversations, driven the way the bot's pump drives them: every
//! message is offered to the dialogue router first and only refused
//! messages reach command dispatch. No channels involved; the chat is a
//! recording fake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use palaver::channels::{Chat, ChatId, ChatKind, ChatRef, InboundMessage, Sender};
use palaver::commands::CommandRegistry;
use palaver::dialogue::{CancelPolicy, Dialogue, DialogueRegistry, Routed, Transition};
use palaver::Config;

struct RecordingChat {
    id: ChatId,
    kind: ChatKind,
    sent: Mutex<Vec<String>>,
}

impl RecordingChat {
    fn new(id: &str, kind: ChatKind) -> Arc<Self> {
        Arc::new(Self {
            id: ChatId::from(id),
            kind,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Chat for RecordingChat {
    fn id(&self) -> &ChatId {
        &self.id
    }

    fn kind(&self) -> ChatKind {
        self.kind
    }

    async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}

fn message(chat: &Arc<RecordingChat>, text: &str) -> InboundMessage {
    InboundMessage {
        id: "m".into(),
        chat: chat.clone() as ChatRef,
        sender: Sender::new("u1", "ada"),
        text: text.into(),
        sent_at: Utc::now(),
    }
}

/// One trip through the bot's routing rule: dialogue first, commands second.
async fn pump_once(
    registry: &Arc<DialogueRegistry>,
    commands: &CommandRegistry,
    msg: InboundMessage,
) {
    match registry.route(msg) {
        Routed::Consumed => {}
        Routed::Pass(msg) => commands.dispatch(&msg, registry).await,
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    for _ in 0..600 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

// ─────────────────────────────────────────────────────────────────────────
// Multi-step flows
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_two_step_form_collects_state_across_turns() {
    let (registry, _handback) = DialogueRegistry::new(CancelPolicy::default());
    let chat = RecordingChat::new("qq/friend/1", ChatKind::Friend);

    let form = Dialogue::<Vec<String>>::builder(ChatKind::Friend)
        .step(
            |_| "What's your name?".to_string(),
            |msg, answers| {
                Box::pin(async move {
                    answers.push(msg.text.clone());
                    Ok(Transition::Next)
                })
            },
        )
        .step(
            |answers: &Vec<String>| format!("Hi {}! Favorite color?", answers[0]),
            |msg, answers| {
                Box::pin(async move {
                    answers.push(msg.text.clone());
                    msg.reply(&format!("{} likes {}.", answers[0], answers[1]))
                        .await?;
                    Ok(Transition::Stop)
                })
            },
        )
        .bind(
            chat.clone() as ChatRef,
            Sender::new("u1", "ada"),
            Vec::new(),
        )
        .expect("friend chat matches");

    let binding = registry.start(form).expect("start");
    registry.route(message(&chat, "Marta"));
    registry.route(message(&chat, "teal"));

    wait_until("form finished", || !registry.is_engaged(&binding)).await;
    assert_eq!(
        chat.sent(),
        [
            "What's your name?",
            "Hi Marta! Favorite color?",
            "Marta likes teal."
        ]
    );
}

#[tokio::test]
async fn an_unparseable_answer_replays_the_step_then_a_valid_one_advances() {
    let (registry, _handback) = DialogueRegistry::new(CancelPolicy::default());
    let chat = RecordingChat::new("qq/friend/7", ChatKind::Friend);

    let form = Dialogue::<u32>::builder(ChatKind::Friend)
        .step(
            |_| "Pick a number from 1 to 9.".to_string(),
            |msg, n| {
                Box::pin(async move {
                    match msg.text.trim().parse::<u32>() {
                        Ok(v) if (1..=9).contains(&v) => {
                            *n = v;
                            Ok(Transition::Next)
                        }
                        _ => {
                            msg.reply("Numbers only, please.").await?;
                            Ok(Transition::Replay)
                        }
                    }
                })
            },
        )
        .step(
            |n: &u32| format!("Got {n}. Say done."),
            |_msg, _| Box::pin(async { Ok(Transition::Stop) }),
        )
        .bind(chat.clone() as ChatRef, Sender::new("u1", "ada"), 0)
        .expect("friend chat matches");

    let binding = registry.start(form).expect("start");
    registry.route(message(&chat, "abc"));
    registry.route(message(&chat, "5"));

    wait_until("second step reached", || chat.sent().len() == 4).await;
    assert_eq!(
        chat.sent(),
        [
            "Pick a number from 1 to 9.",
            "Numbers only, please.",
            "Pick a number from 1 to 9.",
            "Got 5. Say done."
        ]
    );
    assert!(registry.is_engaged(&binding));

    registry.route(message(&chat, "done"));
    wait_until("form finished", || !registry.is_engaged(&binding)).await;
}

#[tokio::test]
async fn a_cancel_word_ends_the_flow_and_frees_the_binding() {
    let (registry, _handback) = DialogueRegistry::new(CancelPolicy::default());
    let commands = CommandRegistry::builtin(&Config::default());
    let chat = RecordingChat::new("qq/friend/2", ChatKind::Friend);

    pump_once(&registry, &commands, message(&chat, "/quiz")).await;
    wait_until("first question", || !chat.sent().is_empty()).await;
    assert_eq!(registry.active_count(), 1);

    pump_once(&registry, &commands, message(&chat, "cancel")).await;
    wait_until("binding freed", || registry.active_count() == 0).await;
    wait_until("cancel ack", || {
        chat.sent().iter().any(|s| s == "Okay, never mind.")
    })
    .await;

    // The next message is nobody's business but the command layer's.
    pump_once(&registry, &commands, message(&chat, "/ping")).await;
    wait_until("pong", || chat.sent().iter().any(|s| s == "pong")).await;
}

#[tokio::test]
async fn a_failing_handler_reports_and_replays_then_recovers() {
    let (registry, _handback) = DialogueRegistry::new(CancelPolicy::default());
    let chat = RecordingChat::new("qq/friend/3", ChatKind::Friend);

    let mut calls = 0u32;
    let flaky = Dialogue::<()>::builder(ChatKind::Friend)
        .step(
            |_| "ready?".to_string(),
            move |_msg, _| {
                calls += 1;
                let fail = calls == 1;
                Box::pin(async move {
                    if fail {
                        Err(anyhow::anyhow!("backend offline"))
                    } else {
                        Ok(Transition::Stop)
                    }
                })
            },
        )
        .bind(chat.clone() as ChatRef, Sender::new("u1", "ada"), ())
        .expect("friend chat matches");

    let binding = registry.start(flaky).expect("start");
    registry.route(message(&chat, "yes"));

    // The fault is reported and the step replayed; the dialogue survives.
    wait_until("failure notice and replayed prompt", || {
        chat.sent().len() == 3
    })
    .await;
    let sent = chat.sent();
    assert_eq!(sent[0], "ready?");
    assert!(sent[1].contains("went wrong"), "got: {}", sent[1]);
    assert_eq!(sent[2], "ready?");
    assert!(registry.is_engaged(&binding));

    // Second attempt goes through.
    registry.route(message(&chat, "yes"));
    wait_until("recovered and stopped", || !registry.is_engaged(&binding)).await;
}

// ─────────────────────────────────────────────────────────────────────────
// Commands opening dialogues
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_full_quiz_round_through_routing_and_dispatch() {
    let (registry, _handback) = DialogueRegistry::new(CancelPolicy::default());
    let commands = CommandRegistry::builtin(&Config::default());
    let chat = RecordingChat::new("qq/friend/4", ChatKind::Friend);

    pump_once(&registry, &commands, message(&chat, "/quiz")).await;
    wait_until("question one", || {
        chat.sent().iter().any(|s| s.starts_with("Q1/3"))
    })
    .await;

    for answer in ["saturn", "sn", "16"] {
        pump_once(&registry, &commands, message(&chat, answer)).await;
    }

    wait_until("perfect score", || {
        chat.sent().iter().any(|s| s.contains("3/3"))
    })
    .await;
    wait_until("binding freed", || registry.active_count() == 0).await;

    // With the quiz gone, commands work again for this sender.
    pump_once(&registry, &commands, message(&chat, "/ping")).await;
    wait_until("pong", || chat.sent().iter().any(|s| s == "pong")).await;
}

#[tokio::test]
async fn group_declared_dialogue_refuses_a_friend_chat() {
    let (registry, _handback) = DialogueRegistry::new(CancelPolicy::default());
    let commands = CommandRegistry::builtin(&Config::default());
    let chat = RecordingChat::new("qq/friend/5", ChatKind::Friend);

    // /rank declares Group; in a friend chat it must apologize, not start.
    pump_once(&registry, &commands, message(&chat, "/rank")).await;
    wait_until("refusal", || !chat.sent().is_empty()).await;

    assert_eq!(registry.active_count(), 0);
    let sent = chat.sent();
    assert!(
        sent[0].contains("group"),
        "refusal should point at group chats, got: {}",
        sent[0]
    );
}

#[tokio::test]
async fn busy_binding_gets_a_busy_reply_not_a_second_dialogue() {
    let (registry, _handback) = DialogueRegistry::new(CancelPolicy::default());
    let commands = CommandRegistry::builtin(&Config::default());
    let chat = RecordingChat::new("qq/friend/6", ChatKind::Friend);

    // Dispatches run off the routing task, so two commands from one sender
    // can race for the same binding. The loser must apologize, not clobber
    // the dialogue the winner opened.
    commands.dispatch(&message(&chat, "/quiz"), &registry).await;
    commands.dispatch(&message(&chat, "/quiz"), &registry).await;

    assert_eq!(registry.active_count(), 1);
    wait_until("busy reply", || {
        chat.sent().iter().any(|s| s.contains("One thing at a time"))
    })
    .await;
}
