//! Wires the pieces into a running bot: channel listeners feeding one
//! inbound queue, the dialogue router in front, command dispatch behind.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::{Channel, ChatRef, ConsoleChannel, InboundMessage, QqChannel};
use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::dialogue::{CancelPolicy, DialogueRegistry, Routed};
use crate::util;

/// Instantiate every channel the config enables. At least one is required;
/// a bot nobody can reach is a misconfiguration, not a valid state.
pub(crate) fn build_channels(config: &Config) -> Result<Vec<Arc<dyn Channel>>> {
    let mut channels: Vec<Arc<dyn Channel>> = Vec::new();

    if config.channels.console.enabled {
        channels.push(Arc::new(ConsoleChannel::new()));
    }
    if let Some(qq) = &config.channels.qq {
        channels.push(Arc::new(QqChannel::new(qq)));
    }

    if channels.is_empty() {
        bail!(
            "no channels enabled; enable console or configure [channels.qq] in {}",
            config.config_path.display()
        );
    }
    Ok(channels)
}

/// Run the bot until Ctrl+C.
pub async fn run(config: Config) -> Result<()> {
    let initial_backoff = config.reliability.channel_initial_backoff_secs.max(1);
    let max_backoff = config
        .reliability
        .channel_max_backoff_secs
        .max(initial_backoff);

    let cancel = CancelPolicy::new(
        config.dialogue.cancel_words.clone(),
        config.dialogue.cancel_ack_message(),
    );
    let (dialogues, handback_rx) = DialogueRegistry::new(cancel);
    let commands = Arc::new(CommandRegistry::builtin(&config));

    let channels = build_channels(&config)?;
    let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(1024);

    crate::health::mark_ok("bot");

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    for channel in &channels {
        handles.push(spawn_listener_supervisor(
            channel.clone(),
            inbound_tx.clone(),
            initial_backoff,
            max_backoff,
        ));
    }
    handles.push(tokio::spawn(pump(
        inbound_rx,
        handback_rx,
        dialogues,
        commands,
    )));

    println!("🗨️  palaver {} is up", env!("CARGO_PKG_VERSION"));
    println!("   Channels: {}", names.join(", "));
    println!(
        "   Prefix:   {prefix}   (try {prefix}help)",
        prefix = config.bot.command_prefix
    );
    println!("   Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    crate::health::mark_error("bot", "shutdown requested");

    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }

    let snapshot = crate::health::snapshot();
    for (name, component) in &snapshot.components {
        info!(
            component = name.as_str(),
            status = component.status.as_str(),
            restarts = component.restart_count,
            "bot.component_final"
        );
    }
    Ok(())
}

/// Keep one channel's `listen` loop alive, restarting it with doubling
/// backoff and recording every death in the health registry.
fn spawn_listener_supervisor(
    channel: Arc<dyn Channel>,
    tx: mpsc::Sender<InboundMessage>,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
) -> JoinHandle<()> {
    let component = format!("channel:{}", channel.name());
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            crate::health::mark_ok(&component);
            match channel.listen(tx.clone()).await {
                Ok(()) => {
                    crate::health::mark_error(&component, "listener exited unexpectedly");
                    warn!(channel = channel.name(), "channel.listener_exited");
                }
                Err(e) => {
                    crate::health::mark_error(&component, e.to_string());
                    error!(channel = channel.name(), error = %e, "channel.listener_failed");
                }
            }

            crate::health::bump_restart(&component);
            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}

/// The single consumer of the inbound queue. Every message is offered to the
/// dialogue router first; only refused messages reach command dispatch.
/// Messages a stopping dialogue hands back skip the router on purpose: they
/// already lost their dialogue, re-offering them could bounce forever.
async fn pump(
    mut inbound: mpsc::Receiver<InboundMessage>,
    mut handback: mpsc::UnboundedReceiver<InboundMessage>,
    dialogues: Arc<DialogueRegistry>,
    commands: Arc<CommandRegistry>,
) {
    loop {
        tokio::select! {
            maybe = inbound.recv() => {
                let Some(msg) = maybe else { break };
                debug!(
                    chat = %msg.chat.id(),
                    sender = %msg.sender.id,
                    text = %util::preview(&msg.text, 80),
                    "bot.inbound"
                );
                match dialogues.route(msg) {
                    Routed::Consumed => {}
                    Routed::Pass(msg) => spawn_dispatch(msg, &dialogues, &commands),
                }
            }
            Some(msg) = handback.recv() => {
                debug!(chat = %msg.chat.id(), sender = %msg.sender.id, "bot.handback");
                spawn_dispatch(msg, &dialogues, &commands);
            }
        }
    }
}

/// Dispatch off the pump task so one slow command cannot stall routing for
/// every other chat.
fn spawn_dispatch(
    msg: InboundMessage,
    dialogues: &Arc<DialogueRegistry>,
    commands: &Arc<CommandRegistry>,
) {
    let dialogues = dialogues.clone();
    let commands = commands.clone();
    tokio::spawn(async move {
        commands.dispatch(&msg, &dialogues).await;
    });
}

/// Shared failure path: tell the chat something went wrong without leaking
/// the error itself. Details stay in the logs.
pub async fn report_failure(chat: &ChatRef, what: &str) {
    let text = format!("⚠️ Something went wrong handling {what}. Please try again.");
    if let Err(e) = chat.send(&text).await {
        warn!(chat = %chat.id(), error = %e, "report.send_failed");
    }
}
