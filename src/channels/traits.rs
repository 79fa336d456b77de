use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// What category of chat a conversation lives in. QQ distinguishes
/// one-to-one friend chats, temporary sessions opened from a group member
/// card, and regular group chats; dialogues declare which one they run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatKind {
    Friend,
    GroupTemp,
    Group,
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Friend => "friend",
            Self::GroupTemp => "group-temp",
            Self::Group => "group",
        })
    }
}

/// Platform-scoped identity of a chat, e.g. `friend/1234` or `group/99`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatId(String);

/// Platform-scoped identity of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

macro_rules! string_id {
    ($t:ident) => {
        impl $t {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $t {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<&str> for $t {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(ChatId);
string_id!(UserId);

/// The user account a message came from.
#[derive(Debug, Clone)]
pub struct Sender {
    pub id: UserId,
    /// Display name as reported by the platform; falls back to the id.
    pub name: String,
}

impl Sender {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// An addressable conversation on some platform. Handed out by channel
/// adapters per inbound event; cheap to clone behind [`ChatRef`].
#[async_trait]
pub trait Chat: Send + Sync {
    fn id(&self) -> &ChatId;

    /// The kind this chat actually is, as reported by the platform.
    fn kind(&self) -> ChatKind;

    /// Deliver `text` into this chat.
    async fn send(&self, text: &str) -> anyhow::Result<()>;
}

pub type ChatRef = Arc<dyn Chat>;

/// One inbound chat event, as handed to the dialogue router and, when no
/// dialogue claims it, to command dispatch.
#[derive(Clone)]
pub struct InboundMessage {
    pub id: String,
    pub chat: ChatRef,
    pub sender: Sender,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Answer into the chat this message arrived in.
    pub async fn reply(&self, text: &str) -> anyhow::Result<()> {
        self.chat.send(text).await
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("id", &self.id)
            .field("chat", &self.chat.id())
            .field("sender", &self.sender)
            .field("text", &self.text)
            .field("sent_at", &self.sent_at)
            .finish()
    }
}

/// A platform adapter. Implement for any messaging backend.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short name used in logs and health entries.
    fn name(&self) -> &str;

    /// Receive loop (long-running). Pushes every inbound event onto `tx`.
    /// Returning or erroring means the listener died; the supervisor
    /// restarts it with backoff.
    async fn listen(&self, tx: mpsc::Sender<InboundMessage>) -> anyhow::Result<()>;

    /// Lightweight reachability probe for `doctor`.
    async fn health_check(&self) -> bool {
        true
    }
}
