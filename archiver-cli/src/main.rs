//! SimpleFIN Archiver CLI - keep a local archive of your bank data

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod api;
mod commands;
mod output;

use commands::{list, logs, serve, setup, status, sync, venmo};

/// SimpleFIN archiver - reconcile bank data into a local DuckDB archive
#[derive(Parser)]
#[command(name = "sfa", version, about, long_about = None)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging (RUST_LOG is honored otherwise)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch from SimpleFIN and reconcile into the archive
    Sync {
        /// SimpleFIN access URL
        #[arg(long)]
        simplefin_key: Option<String>,
        /// File containing the SimpleFIN access URL
        #[arg(long)]
        simplefin_key_file: Option<PathBuf>,
        /// Days of history to request
        #[arg(long)]
        days_history: Option<u32>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Claim a SimpleFIN setup token and store the access URL
    Setup {
        /// SimpleFIN setup token
        #[arg(long)]
        token: String,
    },

    /// Show archive summary
    Status,

    /// List archived accounts
    Accounts,

    /// List archived transactions, newest first
    Transactions {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List archived balances, newest first
    Balances {
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Archive transactions parsed from Venmo notification emails
    Venmo {
        /// JSON array of {subject, html, date}
        #[arg(long)]
        file: PathBuf,
        /// Account the transactions belong to
        #[arg(long)]
        account_id: String,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Serve the archive over HTTP
    Serve {
        /// Address to bind (defaults to settings, then 127.0.0.1:8000)
        #[arg(long)]
        listen: Option<String>,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Sync {
            simplefin_key,
            simplefin_key_file,
            days_history,
            timeout,
            dry_run,
        } => sync::run(
            sync::SyncArgs {
                simplefin_key,
                simplefin_key_file,
                days_history,
                timeout,
                dry_run,
            },
            json,
        ),
        Commands::Setup { token } => setup::run(&token, json),
        Commands::Status => status::run(json),
        Commands::Accounts => list::accounts(json),
        Commands::Transactions { limit } => list::transactions(limit, json),
        Commands::Balances { limit } => list::balances(limit, json),
        Commands::Venmo {
            file,
            account_id,
            dry_run,
        } => venmo::run(&file, &account_id, dry_run, json),
        Commands::Serve { listen } => serve::run(listen),
        Commands::Logs { command } => logs::run(command, json),
    }
}
