pub mod schema;

pub use schema::{
    BotConfig, ChannelsConfig, Config, ConsoleConfig, DialogueConfig, QqConfig, ReliabilityConfig,
};
