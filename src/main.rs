#![warn(clippy::all, clippy::pedantic)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use palaver::{bot, doctor, Config};

/// A small multi-channel chat bot with scripted dialogues.
#[derive(Parser, Debug)]
#[command(name = "palaver")]
#[command(version)]
#[command(about = "Multi-turn dialogue bot for console and QQ.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bot and listen on every enabled channel
    Run,
    /// Probe the configured channels and report what is reachable
    Doctor,
    /// Show the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = Config::load_or_init()?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Run => bot::run(config).await,
        Commands::Doctor => doctor::run(&config).await,
        Commands::Status => {
            println!("🗨️  palaver {}", env!("CARGO_PKG_VERSION"));
            println!("   Config:  {}", config.config_path.display());
            println!("   Prefix:  {}", config.bot.command_prefix);
            println!(
                "   Console: {}",
                if config.channels.console.enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            if let Some(qq) = &config.channels.qq {
                println!(
                    "   QQ:      {} ({} allowed users)",
                    qq.api_url,
                    qq.allowed_users.len()
                );
            } else {
                println!("   QQ:      not configured");
            }
            println!("   Cancel:  {}", config.dialogue.cancel_words.join(", "));
            Ok(())
        }
    }
}
