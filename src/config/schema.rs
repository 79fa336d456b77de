use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub dialogue: DialogueConfig,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            bot: BotConfig::default(),
            dialogue: DialogueConfig::default(),
            channels: ChannelsConfig::default(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

// ── Bot ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Leading marker that makes a message a command (e.g. `/ping`).
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

fn default_command_prefix() -> String {
    "/".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
        }
    }
}

// ── Dialogues ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Words that end any running dialogue, matched against the whole
    /// trimmed message (case-insensitive for ASCII).
    #[serde(default = "default_cancel_words")]
    pub cancel_words: Vec<String>,
    /// Reply sent after a dialogue is cancelled; set to an empty string to
    /// stay silent.
    #[serde(default = "default_cancel_ack")]
    pub cancel_ack: String,
}

fn default_cancel_words() -> Vec<String> {
    vec!["cancel".to_string(), "exit".to_string()]
}

fn default_cancel_ack() -> String {
    "Okay, never mind.".to_string()
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            cancel_words: default_cancel_words(),
            cancel_ack: default_cancel_ack(),
        }
    }
}

impl DialogueConfig {
    /// The configured ack, or `None` when it was blanked out.
    pub fn cancel_ack_message(&self) -> Option<String> {
        if self.cancel_ack.is_empty() {
            None
        } else {
            Some(self.cancel_ack.clone())
        }
    }
}

// ── Channels ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub console: ConsoleConfig,
    /// Present only when a QQ sidecar is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qq: Option<QqConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Local stdin/stdout channel, handy for trying dialogues out.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QqConfig {
    /// Base URL of the OneBot-compatible sidecar, e.g. `http://127.0.0.1:5700`.
    pub api_url: String,
    /// Bearer token, when the sidecar requires one.
    #[serde(default)]
    pub access_token: Option<String>,
    /// User ids allowed to talk to the bot; `"*"` allows everyone.
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,
    /// Long-poll timeout passed to the sidecar.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_poll_timeout_secs() -> u64 {
    30
}

// ── Reliability ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Initial backoff for channel listener restarts.
    #[serde(default = "default_channel_backoff_secs")]
    pub channel_initial_backoff_secs: u64,
    /// Max backoff for channel listener restarts.
    #[serde(default = "default_channel_backoff_max_secs")]
    pub channel_max_backoff_secs: u64,
}

fn default_channel_backoff_secs() -> u64 {
    2
}

fn default_channel_backoff_max_secs() -> u64 {
    60
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            channel_initial_backoff_secs: default_channel_backoff_secs(),
            channel_max_backoff_secs: default_channel_backoff_max_secs(),
        }
    }
}

// ── Loading & persistence ─────────────────────────────────────────

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let palaver_dir = home.join(".palaver");
        let config_path = palaver_dir.join("config.toml");

        if !palaver_dir.exists() {
            std::fs::create_dir_all(&palaver_dir).context("Failed to create .palaver directory")?;
        }

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            Ok(config)
        } else {
            let mut config = Config::default();
            config.config_path = config_path;
            config.save()?;
            info!(path = %config.config_path.display(), "config.created");
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        // Command prefix: PALAVER_COMMAND_PREFIX
        if let Ok(prefix) = std::env::var("PALAVER_COMMAND_PREFIX") {
            if !prefix.is_empty() {
                self.bot.command_prefix = prefix;
            }
        }

        // Cancel words: PALAVER_CANCEL_WORDS (comma-separated)
        if let Ok(words) = std::env::var("PALAVER_CANCEL_WORDS") {
            let words: Vec<String> = words
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string)
                .collect();
            if !words.is_empty() {
                self.dialogue.cancel_words = words;
            }
        }

        // QQ sidecar: PALAVER_QQ_API_URL / PALAVER_QQ_ACCESS_TOKEN
        if let Ok(url) = std::env::var("PALAVER_QQ_API_URL") {
            if !url.is_empty() {
                let qq = self.channels.qq.get_or_insert_with(|| QqConfig {
                    api_url: String::new(),
                    access_token: None,
                    allowed_users: default_allowed_users(),
                    poll_timeout_secs: default_poll_timeout_secs(),
                });
                qq.api_url = url;
            }
        }
        if let Ok(token) = std::env::var("PALAVER_QQ_ACCESS_TOKEN") {
            if !token.is_empty() {
                if let Some(qq) = &mut self.channels.qq {
                    qq.access_token = Some(token);
                }
            }
        }

        // Console toggle: PALAVER_CONSOLE
        if let Ok(val) = std::env::var("PALAVER_CONSOLE") {
            if !val.is_empty() {
                self.channels.console.enabled = val == "1" || val.eq_ignore_ascii_case("true");
            }
        }
    }
}
