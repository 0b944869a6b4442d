mod config_commands;
mod service;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use tunegrab_config::TunegrabConfig;

#[derive(Parser)]
#[command(name = "tunegrab", about = "tunegrab: YouTube to mp3 over Telegram")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of searching the standard locations.
    #[arg(long, global = true, env = "TUNEGRAB_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default when no subcommand is provided).
    Run,
    /// Validate the configuration and report problems.
    CheckConfig,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the explicit config file if one was given, otherwise discover one.
/// Environment overrides apply either way.
fn load_config(path: Option<&Path>) -> anyhow::Result<TunegrabConfig> {
    match path {
        Some(path) => {
            let mut config = tunegrab_config::load_config(path)?;
            tunegrab_config::apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(tunegrab_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "tunegrab starting");

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None | Some(Commands::Run) => service::run(config).await,
        Some(Commands::CheckConfig) => config_commands::check(&config, cli.config.as_deref()),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.toml");
        std::fs::write(&path, "[choice]\nwait_secs = 3\n\n[download]\nbinary = \"/opt/yt-dlp\"\n")
            .unwrap();

        let config = load_config(Some(&path)).unwrap();

        assert_eq!(config.choice.wait_secs, 3);
        assert_eq!(config.download.binary, "/opt/yt-dlp");
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["tunegrab", "--log-level", "debug"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "debug");

        let cli = Cli::try_parse_from(["tunegrab", "check-config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
    }
}
