use async_trait::async_trait;

use super::{Command, CommandContext, CommandMeta};

static META: CommandMeta = CommandMeta {
    name: "ping",
    aliases: &[],
    usage: "/ping",
    summary: "Check that the bot is alive.",
};

/// Liveness probe. Useful to tell "bot is down" from "bot is ignoring you".
pub struct PingCommand;

#[async_trait]
impl Command for PingCommand {
    fn meta(&self) -> &'static CommandMeta {
        &META
    }

    async fn invoke(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        ctx.msg.reply("pong").await
    }
}
