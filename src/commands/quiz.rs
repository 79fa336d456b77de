use async_trait::async_trait;
use tracing::info;

use super::{Command, CommandContext, CommandMeta};
use crate::channels::ChatKind;
use crate::dialogue::{Dialogue, DialogueBuilder, DialogueError, Transition};

static META: CommandMeta = CommandMeta {
    name: "quiz",
    aliases: &["trivia"],
    usage: "/quiz",
    summary: "A short trivia round, one question at a time.",
};

const QUESTIONS: &[(&str, &str)] = &[
    ("Q1/3: Which planet has the most known moons?", "saturn"),
    ("Q2/3: What is the chemical symbol for tin?", "sn"),
    ("Q3/3: How many bits are in two bytes?", "16"),
];

#[derive(Default)]
struct QuizRun {
    index: usize,
    correct: u32,
}

/// One step looping over itself with `Goto(0)`: the prompt renders whichever
/// question the state points at, so the script stays a single step no matter
/// how long the question list gets.
fn script() -> DialogueBuilder<QuizRun> {
    Dialogue::builder(ChatKind::Friend).step(
        |run: &QuizRun| QUESTIONS[run.index].0.to_string(),
        |msg, run| {
            Box::pin(async move {
                let expected = QUESTIONS[run.index].1;
                let hit = msg.text.trim().eq_ignore_ascii_case(expected);
                let correct = run.correct + u32::from(hit);
                let next = run.index + 1;

                // State moves only after every send has gone out; a failed
                // send replays the same question with nothing half-applied.
                if hit {
                    msg.reply("Correct!").await?;
                } else {
                    msg.reply(&format!("Nope, it was \"{expected}\".")).await?;
                }

                if next < QUESTIONS.len() {
                    run.correct = correct;
                    run.index = next;
                    Ok(Transition::Goto(0))
                } else {
                    msg.reply(&format!(
                        "That's the round: {}/{} right.",
                        correct,
                        QUESTIONS.len()
                    ))
                    .await?;
                    info!(correct, total = QUESTIONS.len(), "quiz.finished");
                    Ok(Transition::Stop)
                }
            })
        },
    )
}

/// Trivia round in friend chats. Kept out of groups so one person's quiz
/// does not swallow everyone else's messages to the bot.
pub struct QuizCommand;

#[async_trait]
impl Command for QuizCommand {
    fn meta(&self) -> &'static CommandMeta {
        &META
    }

    async fn invoke(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let dialogue = match script().bind(
            ctx.msg.chat.clone(),
            ctx.msg.sender.clone(),
            QuizRun::default(),
        ) {
            Ok(dialogue) => dialogue,
            Err(DialogueError::KindMismatch { .. }) => {
                return ctx
                    .msg
                    .reply("Quiz me in a friend chat, so the group doesn't have to watch.")
                    .await;
            }
            Err(err) => return Err(err.into()),
        };

        match ctx.dialogues.start(dialogue) {
            Ok(_) => Ok(()),
            Err(DialogueError::AlreadyEngaged(_)) => {
                ctx.msg
                    .reply("One thing at a time. Finish the current dialogue or say \"cancel\".")
                    .await
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{Chat, ChatId, ChatRef, InboundMessage, Sender};
    use crate::dialogue::TurnOutcome;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FakeChat {
        id: ChatId,
        sent: Mutex<Vec<String>>,
    }

    impl FakeChat {
        fn friend() -> Arc<Self> {
            Arc::new(Self {
                id: ChatId::from("qq/friend/7"),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Chat for FakeChat {
        fn id(&self) -> &ChatId {
            &self.id
        }

        fn kind(&self) -> ChatKind {
            ChatKind::Friend
        }

        async fn send(&self, text: &str) -> anyhow::Result<()> {
            self.sent.lock().push(text.to_string());
            Ok(())
        }
    }

    fn message<C: Chat + 'static>(chat: &Arc<C>, text: &str) -> InboundMessage {
        InboundMessage {
            id: "m".into(),
            chat: chat.clone() as ChatRef,
            sender: Sender::new("7", "bob"),
            text: text.into(),
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn full_round_scores_and_stops() {
        let chat = FakeChat::friend();
        let mut dialogue = script()
            .bind(
                chat.clone() as ChatRef,
                Sender::new("7", "bob"),
                QuizRun::default(),
            )
            .expect("friend chat matches the declared kind");

        dialogue.send_prompt().await;
        assert_eq!(
            dialogue.take_turn(&message(&chat, "Saturn")).await,
            TurnOutcome::Continue
        );
        assert_eq!(
            dialogue.take_turn(&message(&chat, "tin")).await,
            TurnOutcome::Continue
        );
        assert_eq!(
            dialogue.take_turn(&message(&chat, "16")).await,
            TurnOutcome::Finished
        );

        let sent = chat.sent.lock();
        // Q1, "Correct!", Q2, wrong-answer nudge, Q3, "Correct!", score.
        assert_eq!(sent.len(), 7);
        assert!(sent[0].starts_with("Q1/3"));
        assert_eq!(sent[1], "Correct!");
        assert!(sent[3].contains("sn"));
        assert!(sent[6].contains("2/3"));
    }

    #[tokio::test]
    async fn answers_are_case_insensitive_and_trimmed() {
        let chat = FakeChat::friend();
        let mut dialogue = script()
            .bind(
                chat.clone() as ChatRef,
                Sender::new("7", "bob"),
                QuizRun::default(),
            )
            .expect("friend chat matches the declared kind");

        dialogue.take_turn(&message(&chat, "  SATURN  ")).await;
        assert_eq!(chat.sent.lock()[0], "Correct!");
    }

    #[tokio::test]
    async fn a_failed_score_send_replays_the_final_question() {
        // Fails the score message once, then delivers everything.
        struct FlakyChat {
            id: ChatId,
            sent: Mutex<Vec<String>>,
            failed_once: Mutex<bool>,
        }

        #[async_trait]
        impl Chat for FlakyChat {
            fn id(&self) -> &ChatId {
                &self.id
            }

            fn kind(&self) -> ChatKind {
                ChatKind::Friend
            }

            async fn send(&self, text: &str) -> anyhow::Result<()> {
                let mut failed = self.failed_once.lock();
                if text.contains("That's the round") && !*failed {
                    *failed = true;
                    anyhow::bail!("connection reset");
                }
                self.sent.lock().push(text.to_string());
                Ok(())
            }
        }

        let chat = Arc::new(FlakyChat {
            id: ChatId::from("qq/friend/7"),
            sent: Mutex::new(Vec::new()),
            failed_once: Mutex::new(false),
        });
        let mut dialogue = script()
            .bind(
                chat.clone() as ChatRef,
                Sender::new("7", "bob"),
                QuizRun::default(),
            )
            .expect("friend chat matches the declared kind");

        dialogue.send_prompt().await;
        dialogue.take_turn(&message(&chat, "saturn")).await;
        dialogue.take_turn(&message(&chat, "sn")).await;

        // The last answer is right but the score never leaves the chat;
        // the turn downgrades to a replay of Q3 instead of finishing.
        assert_eq!(
            dialogue.take_turn(&message(&chat, "16")).await,
            TurnOutcome::Continue
        );
        {
            let sent = chat.sent.lock();
            let last = sent.last().expect("prompt resent");
            assert!(last.starts_with("Q3/3"), "expected Q3 again, got {last}");
        }

        // Answering once more ends the round with each answer counted once.
        assert_eq!(
            dialogue.take_turn(&message(&chat, "16")).await,
            TurnOutcome::Finished
        );
        let sent = chat.sent.lock();
        assert!(sent.last().is_some_and(|s| s.contains("3/3")));
    }

    #[test]
    fn quiz_refuses_group_chats() {
        struct GroupChat {
            id: ChatId,
        }

        #[async_trait]
        impl Chat for GroupChat {
            fn id(&self) -> &ChatId {
                &self.id
            }

            fn kind(&self) -> ChatKind {
                ChatKind::Group
            }

            async fn send(&self, _text: &str) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let chat = Arc::new(GroupChat {
            id: ChatId::from("qq/group/1"),
        });
        let err = script()
            .bind(chat as ChatRef, Sender::new("7", "bob"), QuizRun::default())
            .err()
            .expect("kind mismatch");
        assert!(matches!(err, DialogueError::KindMismatch { .. }));
    }
}
