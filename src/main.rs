use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mirrorfeed::api::{read_feed, ReadError};
use mirrorfeed::config::Config;
use mirrorfeed::feed::{probe, refresh_all, refresh_one, seed, Orchestrator};
use mirrorfeed::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/mirrorfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("mirrorfeed"))
}

#[derive(Parser, Debug)]
#[command(
    name = "mirrorfeed",
    about = "Harvest search feeds from redundant mirrors into a local cache"
)]
struct Args {
    /// Config file (default: ~/.config/mirrorfeed/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh every configured feed and print a JSON summary
    Refresh,
    /// Fetch one query and store it under a key
    Write {
        #[arg(long, default_value = "frontend.xml")]
        key: String,
        #[arg(long, default_value = "react")]
        query: String,
    },
    /// Store a fixed one-entry feed without touching the network
    Seed {
        #[arg(long, default_value = "frontend.xml")]
        key: String,
    },
    /// Report which mirrors currently return content (nothing is stored)
    Probe {
        #[arg(long, default_value = "react")]
        query: String,
    },
    /// Print a stored feed: `<name>.xml` for Atom, `<name>.json` for JSON
    Read { path: String },
    /// List stored feeds with their query and last update
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match args.command {
        Command::Probe { query } => {
            let orch = orchestrator(&config)?;
            let report = probe(&orch, &query, &config.probe).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Refresh => {
            let db = open_database(&config, &config_dir).await?;
            let orch = orchestrator(&config)?;
            let reports =
                refresh_all(&orch, &db, &config.feeds, config.refresh_concurrency).await;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Command::Write { key, query } => {
            let db = open_database(&config, &config_dir).await?;
            let orch = orchestrator(&config)?;
            let count = refresh_one(&orch, &db, &key, &query)
                .await
                .with_context(|| format!("Failed to write {key}"))?;
            println!("wrote {key} for \"{query}\" ({count} items)");
        }
        Command::Seed { key } => {
            let db = open_database(&config, &config_dir).await?;
            seed(&db, &key).await.context("Failed to seed feed")?;
            println!("seeded {key}");
        }
        Command::Read { path } => {
            let db = open_database(&config, &config_dir).await?;
            match read_feed(&db, &path).await {
                Ok(response) => println!("{}", response.into_body()?),
                Err(ReadError::NotFound(key)) => {
                    eprintln!("missing: {key}");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::List => {
            let db = open_database(&config, &config_dir).await?;
            let feeds = db.list_with_metadata().await?;
            if feeds.is_empty() {
                println!("(empty)");
            }
            for feed in feeds {
                let updated = feed
                    .updated_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}\t{}\t{}",
                    feed.key,
                    feed.query.as_deref().unwrap_or("(unknown)"),
                    updated
                );
            }
        }
    }

    Ok(())
}

fn orchestrator(config: &Config) -> Result<Orchestrator> {
    // Per-request deadlines are applied by the fetcher; the client only
    // carries connection settings.
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    Orchestrator::new(client, config).context("Invalid provider configuration")
}

async fn open_database(config: &Config, config_dir: &std::path::Path) -> Result<Database> {
    let db_path = config.database_path(config_dir);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => Err(e).context("Failed to open database"),
    }
}
