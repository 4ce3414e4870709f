mod commands;
mod gateway;

use clap::{Parser, Subcommand};
use progressor_channels::telegram::TelegramChannel;
use progressor_core::{
    config::{self, shellexpand, Config},
    entity::EntityKind,
    progress::ProgressEngine,
    traits::Channel,
};
use progressor_store::{cache, tree, MemoryCache, Repository};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "progressor",
    version,
    about = "Progressor — chat-driven progress tracker"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "PROGRESSOR_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot.
    Start,
    /// Show configuration and database summary.
    Status,
    /// Print the progress of one workspace.
    Progress {
        /// Workspace id.
        workspace_id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _log_guard = init_logging(&cfg, matches!(cli.command, Commands::Start))?;

    match cli.command {
        Commands::Start => {
            let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();

            if let Some(ref tg) = cfg.channel.telegram {
                if tg.enabled {
                    if tg.bot_token.is_empty() {
                        anyhow::bail!(
                            "Telegram is enabled but bot_token is empty. \
                             Set it in config.toml or the TELEGRAM_BOT_TOKEN env var."
                        );
                    }
                    let channel = TelegramChannel::new(tg.clone());
                    channels.insert("telegram".to_string(), Arc::new(channel));
                }
            }

            if channels.is_empty() {
                anyhow::bail!("No channels enabled. Enable at least one channel in config.toml.");
            }

            let cache = cache::connect(&cfg.cache).await?;
            let repo = Repository::new(&cfg.storage, cache).await?;

            println!("Progressor — starting bot...");
            let gw = Arc::new(gateway::Gateway::new(channels, repo));
            gw.run().await?;
        }
        Commands::Status => {
            println!("Progressor — Status Check\n");
            println!("Config: {}", cli.config);
            println!("Database: {}", shellexpand(&cfg.storage.db_path));
            println!();

            if let Some(ref tg) = cfg.channel.telegram {
                println!(
                    "  telegram: {}",
                    if tg.enabled && !tg.bot_token.is_empty() {
                        "configured"
                    } else if tg.enabled {
                        "enabled but missing bot_token"
                    } else {
                        "disabled"
                    }
                );
            } else {
                println!("  telegram: not configured");
            }

            match cache::connect(&cfg.cache).await {
                Ok(backend) => println!("  cache: {} (reachable)", backend.name()),
                Err(e) => println!("  cache: {e}"),
            }

            let repo = Repository::new(&cfg.storage, Arc::new(MemoryCache::new())).await?;
            println!();
            for kind in EntityKind::ALL {
                let rows = repo.get_all(kind).await?.len();
                println!("  {:<12} {rows}", kind.table());
            }
        }
        Commands::Progress { workspace_id } => {
            let repo = Repository::new(&cfg.storage, Arc::new(MemoryCache::new())).await?;
            let Some(node) = tree::load_workspace(&repo, workspace_id).await? else {
                anyhow::bail!("no workspace with id {workspace_id}");
            };
            println!(
                "{}",
                commands::render_workspace(&node, &mut ProgressEngine::new())?
            );
        }
    }

    Ok(())
}

/// Console logging, plus a daily-rotated file under `{data_dir}/logs` for
/// the long-running bot. `RUST_LOG` overrides the configured level.
fn init_logging(cfg: &Config, to_file: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.progressor.log_level));

    if !to_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
        return Ok(None);
    }

    let log_dir = PathBuf::from(shellexpand(&cfg.progressor.data_dir)).join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "progressor.log"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}
