use async_trait::async_trait;

use super::{Command, CommandContext, CommandMeta};

static META: CommandMeta = CommandMeta {
    name: "help",
    aliases: &["h", "?"],
    usage: "/help",
    summary: "List the available commands.",
};

/// Prints the command list.
///
/// The text is rendered once at construction from the metas of the other
/// installed commands, so help never goes stale and never needs to reach
/// back into the registry that owns it.
pub struct HelpCommand {
    text: String,
}

impl HelpCommand {
    /// `cancel_word` is the first word from the dialogue cancel list; help
    /// quotes whatever the operator configured instead of a fixed word.
    pub fn new(prefix: &str, cancel_word: Option<&str>, mut metas: Vec<CommandMeta>) -> Self {
        metas.push(META);
        let width = metas
            .iter()
            .map(|m| m.name.len())
            .max()
            .unwrap_or(0);

        let mut text = String::from("Commands:\n");
        for meta in &metas {
            text.push_str(&format!(
                "  {prefix}{name:<width$}  {summary}\n",
                name = meta.name,
                summary = meta.summary,
            ));
        }
        text.push('\n');
        if let Some(word) = cancel_word {
            text.push_str(&format!(
                "Say \"{word}\" at any time to leave a running dialogue. "
            ));
        }
        text.push_str(&format!("See {prefix}<command> usage by just trying it."));

        Self { text }
    }
}

#[async_trait]
impl Command for HelpCommand {
    fn meta(&self) -> &'static CommandMeta {
        &META
    }

    async fn invoke(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        ctx.msg.reply(&self.text).await
    }
}
