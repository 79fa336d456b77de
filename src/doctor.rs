//! Preflight checks for a configured bot, run from the CLI.

use anyhow::Result;

use crate::config::Config;

/// Probe every configured channel and print a verdict per line. Problems
/// are reported, not returned; the exit code stays zero so scripts can
/// parse the output.
pub async fn run(config: &Config) -> Result<()> {
    println!("🩺 Palaver Doctor");
    println!("  Config: {}", config.config_path.display());

    let channels = match crate::bot::build_channels(config) {
        Ok(channels) => channels,
        Err(e) => {
            println!("  ❌ {e}");
            return Ok(());
        }
    };

    let mut all_ok = true;
    for channel in &channels {
        if channel.health_check().await {
            println!("  ✅ {} reachable", channel.name());
        } else {
            all_ok = false;
            println!("  ❌ {} unreachable", channel.name());
        }
    }

    if let Some(qq) = &config.channels.qq {
        if qq.allowed_users.iter().any(|u| u == "*") {
            println!("  ⚠️  qq allowlist contains \"*\", anyone can talk to the bot");
        }
    }

    if all_ok {
        println!("  💚 all channels healthy");
    } else {
        println!("  💡 check that the sidecar is running and api_url/access_token match it");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_passes_preflight() {
        // Console is always healthy, so the default config checks out.
        run(&Config::default()).await.unwrap();
    }
}
