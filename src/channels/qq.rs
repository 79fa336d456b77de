use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::traits::{Channel, Chat, ChatId, ChatKind, ChatRef, InboundMessage, Sender};
use crate::config::QqConfig;

/// QQ channel: talks to a OneBot v12 style HTTP sidecar (the process that
/// bridges the actual QQ client protocol). We long-poll `get_latest_events`
/// for inbound messages and post `send_message` actions back.
pub struct QqChannel {
    api: Arc<QqApi>,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
}

/// Shared HTTP surface of the sidecar, cloned into every chat handle this
/// channel hands out.
struct QqApi {
    base: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl QqApi {
    /// One OneBot action call. The sidecar wraps every response in
    /// `{status, retcode, data, message}`; a non-zero retcode is an error.
    async fn call(&self, action: &str, params: Value) -> Result<Value> {
        let payload = json!({ "action": action, "params": params });
        let mut request = self.http.post(&self.base).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("qq api {action} request failed"))?;
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("qq api {action} returned a non-JSON body"))?;
        let retcode = body.get("retcode").and_then(Value::as_i64).unwrap_or(0);
        if retcode != 0 {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("qq api {action} failed: retcode {retcode} ({message})");
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

/// Where a QQ message goes back to. Temp chats are addressed through the
/// group they were opened from, which is why they key differently from a
/// friend chat with the same user.
#[derive(Debug, Clone, PartialEq, Eq)]
enum QqTarget {
    Friend { user: String },
    Group { group: String },
    Temp { group: String, user: String },
}

impl QqTarget {
    fn kind(&self) -> ChatKind {
        match self {
            QqTarget::Friend { .. } => ChatKind::Friend,
            QqTarget::Group { .. } => ChatKind::Group,
            QqTarget::Temp { .. } => ChatKind::GroupTemp,
        }
    }

    fn chat_id(&self) -> ChatId {
        match self {
            QqTarget::Friend { user } => ChatId::from(format!("qq/friend/{user}")),
            QqTarget::Group { group } => ChatId::from(format!("qq/group/{group}")),
            QqTarget::Temp { group, user } => ChatId::from(format!("qq/temp/{group}/{user}")),
        }
    }
}

struct QqChat {
    id: ChatId,
    target: QqTarget,
    api: Arc<QqApi>,
}

impl QqChat {
    fn new(target: QqTarget, api: Arc<QqApi>) -> Self {
        Self {
            id: target.chat_id(),
            target,
            api,
        }
    }
}

#[async_trait]
impl Chat for QqChat {
    fn id(&self) -> &ChatId {
        &self.id
    }

    fn kind(&self) -> ChatKind {
        self.target.kind()
    }

    async fn send(&self, text: &str) -> Result<()> {
        let segments = json!([{ "type": "text", "data": { "text": text } }]);
        let params = match &self.target {
            QqTarget::Friend { user } => json!({
                "detail_type": "private",
                "user_id": user,
                "message": segments,
            }),
            QqTarget::Group { group } => json!({
                "detail_type": "group",
                "group_id": group,
                "message": segments,
            }),
            QqTarget::Temp { group, user } => json!({
                "detail_type": "group_temp",
                "group_id": group,
                "user_id": user,
                "message": segments,
            }),
        };
        self.api.call("send_message", params).await?;
        Ok(())
    }
}

impl QqChannel {
    pub fn new(config: &QqConfig) -> Self {
        Self {
            api: Arc::new(QqApi {
                base: config.api_url.trim_end_matches('/').to_string(),
                token: config.access_token.clone(),
                http: reqwest::Client::new(),
            }),
            allowed_users: config.allowed_users.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        }
    }

    /// Point the channel at a different sidecar URL (tests use this to aim
    /// at a mock server).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api = Arc::new(QqApi {
            base: base.trim_end_matches('/').to_string(),
            token: self.api.token.clone(),
            http: self.api.http.clone(),
        });
        self
    }

    fn is_user_allowed(&self, user: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == user)
    }

    /// Map one sidecar event onto an [`InboundMessage`]. Non-message events
    /// and messages with no text are skipped.
    fn parse_event(&self, event: &Value) -> Option<InboundMessage> {
        if event.get("type").and_then(Value::as_str) != Some("message") {
            return None;
        }
        let detail = event.get("detail_type").and_then(Value::as_str)?;
        let user = event.get("user_id").and_then(Value::as_str)?.to_string();
        let group = event
            .get("group_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let text = event
            .get("alt_message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if text.is_empty() {
            return None;
        }

        let target = match detail {
            "private" => QqTarget::Friend { user: user.clone() },
            "group" => QqTarget::Group { group: group? },
            "group_temp" => QqTarget::Temp {
                group: group?,
                user: user.clone(),
            },
            other => {
                debug!(detail_type = other, "qq.event_skipped");
                return None;
            }
        };

        let name = event
            .get("user_name")
            .and_then(Value::as_str)
            .unwrap_or(&user)
            .to_string();
        let sent_at = event
            .get("time")
            .and_then(Value::as_f64)
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
            .unwrap_or_else(Utc::now);
        let id = event
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

        let chat: ChatRef = Arc::new(QqChat::new(target, Arc::clone(&self.api)));
        Some(InboundMessage {
            id,
            chat,
            sender: Sender::new(user, name),
            text,
            sent_at,
        })
    }
}

#[async_trait]
impl Channel for QqChannel {
    fn name(&self) -> &str {
        "qq"
    }

    async fn listen(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        info!(api = %self.api.base, "qq.listening");

        loop {
            let params = json!({ "limit": 0, "timeout": self.poll_timeout_secs });
            let data = match self.api.call("get_latest_events", params).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "qq.poll_failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let Some(events) = data.as_array() else {
                continue;
            };
            for event in events {
                let Some(msg) = self.parse_event(event) else {
                    continue;
                };
                if !self.is_user_allowed(msg.sender.id.as_str()) {
                    debug!(user = %msg.sender.id, "qq.sender_not_allowed");
                    continue;
                }
                if tx.send(msg).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    async fn health_check(&self) -> bool {
        match self.api.call("get_status", json!({})).await {
            Ok(data) => data.get("good").and_then(Value::as_bool).unwrap_or(true),
            Err(_) => false,
        }
    }
}
