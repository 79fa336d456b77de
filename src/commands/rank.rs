use async_trait::async_trait;
use tracing::info;

use super::{Command, CommandContext, CommandMeta};
use crate::channels::ChatKind;
use crate::dialogue::{Dialogue, DialogueBuilder, DialogueError, Transition};

static META: CommandMeta = CommandMeta {
    name: "rank",
    aliases: &["rate"],
    usage: "/rank",
    summary: "Rate today's group mood, 1 to 100.",
};

/// What the form has collected so far.
#[derive(Default)]
struct RankDraft {
    score: u32,
}

fn script() -> DialogueBuilder<RankDraft> {
    Dialogue::builder(ChatKind::Group)
        .step(
            |_: &RankDraft| "How's the group mood today? Give me a number from 1 to 100.".to_string(),
            |msg, draft| {
                Box::pin(async move {
                    match msg.text.trim().parse::<u32>() {
                        Ok(n) if (1..=100).contains(&n) => {
                            draft.score = n;
                            Ok(Transition::Next)
                        }
                        _ => {
                            msg.reply("A whole number between 1 and 100, please.")
                                .await?;
                            Ok(Transition::Replay)
                        }
                    }
                })
            },
        )
        .step(
            |draft: &RankDraft| {
                format!(
                    "{} it is. Lock that in? (yes / no / again)",
                    draft.score
                )
            },
            |msg, draft| {
                Box::pin(async move {
                    match msg.text.trim().to_ascii_lowercase().as_str() {
                        "yes" | "y" => {
                            info!(score = draft.score, "rank.recorded");
                            msg.reply(&format!("Recorded: {}/100. Thanks!", draft.score))
                                .await?;
                            Ok(Transition::Stop)
                        }
                        "no" | "n" => {
                            msg.reply("Dropped. Nothing recorded.").await?;
                            Ok(Transition::Stop)
                        }
                        "again" => Ok(Transition::Goto(0)),
                        _ => Ok(Transition::Replay),
                    }
                })
            },
        )
}

/// Two-step form that collects and confirms a mood score. Group chats only;
/// the score is per-chat, so in a friend chat there is nothing to rate.
pub struct RankCommand;

#[async_trait]
impl Command for RankCommand {
    fn meta(&self) -> &'static CommandMeta {
        &META
    }

    async fn invoke(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let dialogue = match script().bind(
            ctx.msg.chat.clone(),
            ctx.msg.sender.clone(),
            RankDraft::default(),
        ) {
            Ok(dialogue) => dialogue,
            Err(DialogueError::KindMismatch { .. }) => {
                return ctx
                    .msg
                    .reply("Mood ranking is a group thing. Ask me in a group chat.")
                    .await;
            }
            Err(err) => return Err(err.into()),
        };

        match ctx.dialogues.start(dialogue) {
            Ok(_) => Ok(()),
            Err(DialogueError::AlreadyEngaged(_)) => {
                ctx.msg
                    .reply("We're already in the middle of something here. Finish that first, or say \"cancel\".")
                    .await
            }
            Err(err) => Err(err.into()),
        }
    }
}
