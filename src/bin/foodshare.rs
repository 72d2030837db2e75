//! Command-line front end for the foodshare store.
#![forbid(unsafe_code)]

#[path = "foodshare/config.rs"]
mod config;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use foodshare::{
    admin::{stats, StatsReport},
    db::{Command as StoreCommand, Fields, Operation, Reply, Store, StoreOptions},
    init_logging, StoreError,
};
use thiserror::Error;
use tracing::debug;

use crate::config::{CliConfig, ConfigError};

#[derive(Parser, Debug)]
#[command(
    name = "foodshare",
    version,
    about = "Share surplus food through a small file-backed store",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for replies"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        env = "FOODSHARE_DATA_DIR",
        help = "Directory holding users.txt, food.txt and requests.txt"
    )]
    data_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "FOODSHARE_CONFIG",
        help = "CLI config file (defaults to <config dir>/foodshare/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "MS", help = "Lock wait timeout")]
    lock_timeout_ms: Option<u64>,

    #[arg(long, global = true, value_name = "FILTER", help = "Tracing filter, e.g. debug")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Create a user")]
    Register {
        username: String,
        password: String,
        role: String,
    },
    #[command(about = "Check credentials and print the role")]
    Login { username: String, password: String },
    #[command(about = "Publish a food offer")]
    AddFood {
        donor: String,
        name: String,
        quantity: String,
        location: String,
    },
    #[command(about = "List available food offers")]
    ListFood,
    #[command(about = "Claim an available offer")]
    ClaimFood { food_id: String, receiver: String },
    #[command(about = "Post a food request")]
    AddRequest {
        receiver: String,
        food_type: String,
        quantity: String,
    },
    #[command(about = "List every request")]
    ListRequests,
    #[command(about = "Cancel one of your pending requests")]
    CancelRequest { request_id: String, receiver: String },
    #[command(about = "Delete one of your requests")]
    DeleteRequest { request_id: String, receiver: String },
    #[command(about = "Fulfill a pending request")]
    FulfillRequest { request_id: String, donor: String },
    #[command(about = "Run an operation from named fields (key=value)")]
    Exec {
        #[arg(value_name = "OPERATION")]
        operation: String,
        #[arg(value_name = "FIELD=VALUE")]
        fields: Vec<String>,
    },
    #[command(about = "Print per-collection statistics")]
    Stats,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not encode reply: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            CliError::Store(err) => err.code(),
            CliError::Config(_) => "config",
            CliError::Json(_) => "output",
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}: {err}", err.code());
        process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.open.config.clone())?;
    let level = cli
        .open
        .log_level
        .as_deref()
        .or(config.log_level())
        .unwrap_or("warn");
    init_logging(level)?;
    if let Some(path) = config.path() {
        debug!(path = %path.display(), "cli.config");
    }

    let store = Store::open(build_store_options(&cli.open, &config))?;
    match cli.command {
        Command::Stats => {
            let report = stats(&store)?;
            emit(cli.format, &report, || print_stats_text(&report))?;
        }
        command => {
            let reply = store.apply(into_store_command(command)?)?;
            emit(cli.format, &reply, || print_reply_text(&reply))?;
        }
    }
    Ok(())
}

fn build_store_options(args: &OpenArgs, config: &CliConfig) -> StoreOptions {
    let mut opts = config.store_options();
    if let Some(dir) = &args.data_dir {
        opts.data_dir = dir.clone();
    }
    if let Some(ms) = args.lock_timeout_ms {
        opts.lock_timeout = Duration::from_millis(ms);
    }
    opts
}

fn into_store_command(command: Command) -> Result<StoreCommand, StoreError> {
    Ok(match command {
        Command::Register {
            username,
            password,
            role,
        } => StoreCommand::Register {
            username,
            password,
            role,
        },
        Command::Login { username, password } => StoreCommand::Login { username, password },
        Command::AddFood {
            donor,
            name,
            quantity,
            location,
        } => StoreCommand::AddFood {
            donor,
            name,
            quantity,
            location,
        },
        Command::ListFood => StoreCommand::ListFood,
        Command::ClaimFood { food_id, receiver } => StoreCommand::ClaimFood { food_id, receiver },
        Command::AddRequest {
            receiver,
            food_type,
            quantity,
        } => StoreCommand::AddRequest {
            receiver,
            food_type,
            quantity,
        },
        Command::ListRequests => StoreCommand::ListRequests,
        Command::CancelRequest {
            request_id,
            receiver,
        } => StoreCommand::CancelRequest {
            request_id,
            receiver,
        },
        Command::DeleteRequest {
            request_id,
            receiver,
        } => StoreCommand::DeleteRequest {
            request_id,
            receiver,
        },
        Command::FulfillRequest { request_id, donor } => {
            StoreCommand::FulfillRequest { request_id, donor }
        }
        Command::Exec { operation, fields } => {
            let op: Operation = operation.parse()?;
            StoreCommand::from_fields(op, &parse_fields(&fields)?)?
        }
        Command::Stats => {
            return Err(StoreError::Invalid("stats is not a store operation".into()));
        }
    })
}

fn parse_fields(pairs: &[String]) -> Result<Fields, StoreError> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.to_string()))
                .ok_or_else(|| StoreError::Invalid(format!("expected FIELD=VALUE, got {pair:?}")))
        })
        .collect()
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), CliError>
where
    T: serde::Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_reply_text(reply: &Reply) {
    match reply {
        Reply::Registered { username } => println!("registered {username}"),
        Reply::LoggedIn { username, role } => println!("logged in as {username} ({role})"),
        Reply::FoodAdded { id } | Reply::RequestAdded { id } => println!("{id}"),
        Reply::FoodList { offers } => {
            if offers.is_empty() {
                println!("no food available");
            }
            for offer in offers {
                println!(
                    "{}  {} x{} at {} (donor {})",
                    offer.id, offer.name, offer.quantity, offer.location, offer.donor
                );
            }
        }
        Reply::FoodClaimed { id } => println!("claimed {id}"),
        Reply::RequestList { requests } => {
            if requests.is_empty() {
                println!("no requests");
            }
            for request in requests {
                let by = request
                    .fulfilled_by
                    .as_deref()
                    .map(|donor| format!(" by {donor}"))
                    .unwrap_or_default();
                println!(
                    "{}  {} x{} for {} [{}{by}]",
                    request.id, request.food_type, request.quantity, request.receiver, request.status
                );
            }
        }
        Reply::RequestCancelled { id } => println!("cancelled {id}"),
        Reply::RequestDeleted { id } => println!("deleted {id}"),
        Reply::RequestFulfilled { id } => println!("fulfilled {id}"),
    }
}

fn print_stats_text(report: &StatsReport) {
    println!("Data dir: {}", report.data_dir);
    for (label, section) in [
        ("Users", &report.users),
        ("Food offers", &report.food_offers),
        ("Requests", &report.requests),
    ] {
        println!(
            "{label}: records={} skipped={} size={} file={}",
            section.records, section.skipped_lines, section.size_bytes, section.file
        );
        for (status, count) in &section.by_status {
            println!("  {status}={count}");
        }
    }
    let throttle = report.locks.throttle;
    println!(
        "Throttle: capacity={} in_use={} waiting={}",
        throttle.capacity, throttle.in_use, throttle.waiting
    );
}
