//! CLI shell over the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;

use crate::config::ConfigStore;
use crate::models::{ReplyScrapeOptions, SortMode};
use crate::orchestrator::{Orchestrator, ScrapeMethod, ScrapeOutcome};
use crate::progress::{self, ProgressChannel};
use crate::storage::SqliteStore;

#[derive(Parser)]
#[command(name = "threadharvest")]
#[command(about = "Reply-thread harvester for the X platform")]
#[command(version)]
pub struct Cli {
    /// SQLite database path
    #[arg(long, global = true, default_value = "threadharvest.db")]
    db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest recent posts and replies from a profile
    Account {
        /// Profile handle, without the @
        handle: String,
        /// Upper bound on roots to collect
        #[arg(short, long, default_value = "10")]
        max_posts: usize,
        #[command(flatten)]
        scrape: ScrapeArgs,
    },

    /// Harvest one root post and its replies
    Tweet {
        /// Status id of the root post
        id: String,
        #[command(flatten)]
        scrape: ScrapeArgs,
    },

    /// Read or write harvest configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Args)]
struct ScrapeArgs {
    /// Reply ordering: recent or top
    #[arg(long, default_value = "recent")]
    sort: String,

    /// Also expand folded / low-quality reply branches
    #[arg(long)]
    expand: bool,

    /// Harvest method: browser, api, or auto
    #[arg(long, default_value = "auto")]
    method: String,
}

impl ScrapeArgs {
    fn options(&self) -> Result<ReplyScrapeOptions, String> {
        let sort_mode = SortMode::parse(&self.sort)
            .ok_or_else(|| format!("unknown sort mode '{}'; expected recent or top", self.sort))?;
        Ok(ReplyScrapeOptions {
            sort_mode,
            expand_folded_replies: self.expand,
        })
    }

    fn method(&self) -> Result<ScrapeMethod, String> {
        self.method.parse()
    }
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let store = Arc::new(SqliteStore::new(&cli.db)?);

    match cli.command {
        Commands::Account {
            handle,
            max_posts,
            scrape,
        } => {
            let options = scrape.options().map_err(anyhow::Error::msg)?;
            let method = scrape.method().map_err(anyhow::Error::msg)?;
            let orchestrator = Orchestrator::new(store.clone(), store);

            let key = progress::account_key(&handle);
            let printer = spawn_progress_printer(key);
            let outcome = orchestrator
                .scrape_account(&handle, max_posts, options, method)
                .await;
            printer.abort();
            report(&outcome);
        }
        Commands::Tweet { id, scrape } => {
            let options = scrape.options().map_err(anyhow::Error::msg)?;
            let method = scrape.method().map_err(anyhow::Error::msg)?;
            let orchestrator = Orchestrator::new(store.clone(), store);

            let key = progress::tweet_key(&id);
            let printer = spawn_progress_printer(key);
            let outcome = orchestrator.scrape_root_post(&id, options, method).await;
            printer.abort();
            report(&outcome);
        }
        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => match store.get(&key).await? {
                Some(value) => println!("{value}"),
                None => println!("{}", style("(unset)").dim()),
            },
            ConfigCommands::Set { key, value } => {
                store.set(&key, &value, None).await?;
                println!("{} {}", style("Set").green(), key);
            }
        },
    }

    Ok(())
}

/// Poll the progress channel and keep one status line fresh.
fn spawn_progress_printer(key: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_message = String::new();
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            if let Some(progress) = ProgressChannel::global().get(&key) {
                if progress.message != last_message {
                    eprintln!(
                        "{} {} ({} posts, {} replies)",
                        style("▸").cyan(),
                        progress.message,
                        progress.posts_found,
                        progress.replies_found
                    );
                    last_message = progress.message;
                }
                if progress.stage.is_terminal() {
                    break;
                }
            }
        }
    })
}

fn report(outcome: &ScrapeOutcome) {
    if outcome.success {
        println!(
            "{} {} posts, {} replies (via {})",
            style("Done:").green().bold(),
            outcome.posts_found,
            outcome.replies_found,
            outcome.method
        );
    } else {
        println!(
            "{} {} (via {}; {} posts and {} replies were kept)",
            style("Failed:").red().bold(),
            outcome.error.as_deref().unwrap_or("unknown error"),
            outcome.method,
            outcome.posts_found,
            outcome.replies_found
        );
    }
}
