//! Slash-command layer.
//!
//! Commands are the stateless half of the bot: one message in, one action
//! out. Anything that needs to hold a conversation starts a dialogue
//! through [`crate::dialogue::DialogueRegistry`] and returns immediately.

pub mod help;
pub mod ping;
pub mod quiz;
pub mod rank;

pub use help::HelpCommand;
pub use ping::PingCommand;
pub use quiz::QuizCommand;
pub use rank::RankCommand;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::channels::{ChatKind, InboundMessage};
use crate::config::Config;
use crate::dialogue::DialogueRegistry;

/// Static description of a command, shown by `/help` and used for lookup.
#[derive(Debug, Clone, Copy)]
pub struct CommandMeta {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub summary: &'static str,
}

/// Everything a command gets to work with for a single invocation.
pub struct CommandContext<'a> {
    pub msg: &'a InboundMessage,
    pub args: Vec<&'a str>,
    pub dialogues: &'a Arc<DialogueRegistry>,
}

/// Core command trait. Implementations must be cheap to construct and
/// hold no per-chat state; per-chat state belongs in a dialogue.
#[async_trait]
pub trait Command: Send + Sync {
    fn meta(&self) -> &'static CommandMeta;

    async fn invoke(&self, ctx: CommandContext<'_>) -> anyhow::Result<()>;
}

/// Lookup table over the installed commands plus the configured prefix.
pub struct CommandRegistry {
    prefix: String,
    commands: Vec<Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Build the registry with every built-in command installed.
    pub fn builtin(config: &Config) -> Self {
        let commands: Vec<Arc<dyn Command>> = vec![
            Arc::new(PingCommand),
            Arc::new(RankCommand),
            Arc::new(QuizCommand),
        ];
        // Help renders its text from the metas above, so it goes in last.
        let help = HelpCommand::new(
            &config.bot.command_prefix,
            config.dialogue.cancel_words.first().map(String::as_str),
            commands.iter().map(|c| *c.meta()).collect(),
        );
        let mut commands = commands;
        commands.push(Arc::new(help));

        Self {
            prefix: config.bot.command_prefix.clone(),
            commands,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.iter().find(|c| {
            let meta = c.meta();
            meta.name.eq_ignore_ascii_case(name)
                || meta.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
        })
    }

    /// Handle one message that reached the command layer.
    ///
    /// Messages without the prefix are ignored here; in a friend chat an
    /// unknown command gets a short hint, in group chats it is dropped so
    /// the bot does not answer chatter that merely starts with `/`.
    pub async fn dispatch(&self, msg: &InboundMessage, dialogues: &Arc<DialogueRegistry>) {
        let Some(rest) = msg.text.trim().strip_prefix(&self.prefix) else {
            debug!(chat = %msg.chat.id(), "command.not_a_command");
            return;
        };

        let mut parts = rest.split_whitespace();
        let Some(name) = parts.next() else {
            return;
        };
        let args: Vec<&str> = parts.collect();

        let Some(command) = self.find(name) else {
            debug!(chat = %msg.chat.id(), name, "command.unknown");
            if msg.chat.kind() == ChatKind::Friend {
                let hint = format!("Unknown command. Try {}help.", self.prefix);
                if let Err(err) = msg.reply(&hint).await {
                    warn!(chat = %msg.chat.id(), error = %err, "command.hint_failed");
                }
            }
            return;
        };

        let meta = command.meta();
        info!(
            chat = %msg.chat.id(),
            sender = %msg.sender.id,
            command = meta.name,
            "command.dispatch"
        );

        let ctx = CommandContext {
            msg,
            args,
            dialogues,
        };
        if let Err(err) = command.invoke(ctx).await {
            warn!(command = meta.name, error = ?err, "command.failed");
            crate::bot::report_failure(&msg.chat, meta.usage).await;
        }
    }
}
