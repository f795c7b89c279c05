//! Slack Betting Pool CLI
//!
//! Runs bet commands against the local store without going through Slack.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use slackbet::command::{dispatch, Command, InfoTarget};
use slackbet::{
    BetRef, BetService, BetSettings, Broadcaster, Config, ConsoleNotifier, Database, Notifier,
    SlackClient,
};
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "slackbet")]
#[command(about = "Closest-guess betting pool for a Slack channel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// User name the command runs as
    #[arg(short, long, global = true, default_value = "cli")]
    user: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run any slash command, e.g. `exec save 42 feeling lucky`
    Exec {
        /// Command words as typed after `/bet`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },

    /// Show the most recent bets
    List {
        /// Number of bets to show
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Show a bet report: latest, a bet id, or a month name
    Info {
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let (command, list_count) = match cli.command {
        Commands::Exec { words } => (words.join(" ").parse::<Command>(), config.list_count),
        Commands::List { count } => (Ok(Command::List), count.unwrap_or(config.list_count)),
        Commands::Info { target } => {
            let command = match target {
                Some(target) => format!("info {}", target).parse::<Command>(),
                None => Ok(Command::Info(InfoTarget::Bet(BetRef::Latest))),
            };
            (command, config.list_count)
        }
    };

    match command {
        Ok(command) => run(&config, &cli.user, command, list_count).await,
        Err(e) => {
            println!("{}", e.to_string().red());
            std::process::exit(2);
        }
    }
}

async fn run(config: &Config, user: &str, command: Command, list_count: usize) -> Result<()> {
    let notifier: Arc<dyn Notifier> = match SlackClient::from_config(&config.slack) {
        Some(client) => Arc::new(client),
        None => Arc::new(ConsoleNotifier),
    };

    let db = Database::new(&config.database_path, config.cipher()?).await?;
    let settings = BetSettings {
        admins: config.admins.clone(),
        month_scan_depth: config.month_scan_depth,
    };
    let service = BetService::new(Arc::new(db), Broadcaster::new(notifier), settings);

    debug!("Running {:?} as {}", command, user);
    let result = dispatch(&service, user, command, list_count).await;

    // Broadcasts run detached; let them finish before the process exits
    service.flush_broadcasts().await;

    match result {
        Ok(reply) => {
            println!("{}", reply.green());
            Ok(())
        }
        Err(e) => {
            println!("{}", e.to_string().red());
            std::process::exit(1);
        }
    }
}
