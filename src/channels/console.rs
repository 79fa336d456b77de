use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use super::traits::{Channel, Chat, ChatId, ChatKind, ChatRef, InboundMessage, Sender};

/// Console channel: stdin/stdout, always available. Presents a single
/// friend-kind chat so commands and dialogues can be tried locally.
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub fn new() -> Self {
        Self
    }
}

struct ConsoleChat {
    id: ChatId,
}

#[async_trait]
impl Chat for ConsoleChat {
    fn id(&self) -> &ChatId {
        &self.id
    }

    fn kind(&self) -> ChatKind {
        ChatKind::Friend
    }

    async fn send(&self, text: &str) -> anyhow::Result<()> {
        println!("{text}");
        Ok(())
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn listen(&self, tx: mpsc::Sender<InboundMessage>) -> anyhow::Result<()> {
        let chat: ChatRef = Arc::new(ConsoleChat {
            id: ChatId::from("console"),
        });
        let reader = BufReader::new(io::stdin());
        let mut lines = reader.lines();

        println!("console ready - type /help to see commands");

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            let msg = InboundMessage {
                id: Uuid::new_v4().to_string(),
                chat: chat.clone(),
                sender: Sender::new("local", "local"),
                text: line,
                sent_at: Utc::now(),
            };

            if tx.send(msg).await.is_err() {
                break;
            }
        }

        // Stdin closed (EOF, detached terminal). Park instead of returning
        // so the supervisor does not hot-loop restarting a dead tty.
        info!("console.stdin_closed");
        std::future::pending::<()>().await;
        Ok(())
    }
}
