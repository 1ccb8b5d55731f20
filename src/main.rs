use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::BufWriter;
use std::path::PathBuf;

use kih::config::Config;
use kih::discovery::{discover, prune, Prober};
use kih::feed::{sync, write_feed};
use kih::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(
    name = "kih",
    version,
    about = "Archive Кремов и Хрусталев episodes and republish them as a podcast feed",
    arg_required_else_help = true
)]
struct Args {
    /// Configuration file (optional; built-in defaults are used if missing)
    #[arg(long, value_name = "FILE", default_value = "kih.toml", global = true)]
    config: PathBuf,

    /// Episode catalog, overrides `database` from the config file
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Probe the file server for episodes newer than the catalog
    Fetch,
    /// Import the show's items from the broadcaster's feed
    Sync,
    /// Print the podcast feed to stdout
    Rss,
    /// Remove episodes whose file is gone from the server
    Prune,
    /// Prune, then fetch and sync
    Update,
    /// Fetch and sync (first run)
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr: stdout carries the feed
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kih=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(database) = args.database {
        config.database = database;
    }

    let db = match Database::open(&config.database).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: {} is locked by another kih process. Wait for it to finish and try again.",
                config.database
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to open catalog {}: {}",
                config.database,
                e
            ));
        }
    };

    let client = reqwest::Client::builder()
        .user_agent(concat!("kih/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let result = run(args.command, &db, &client, &config).await;
    db.close().await;
    result
}

async fn run(
    command: Command,
    db: &Database,
    client: &reqwest::Client,
    config: &Config,
) -> Result<()> {
    let prober = Prober::new(client.clone(), &config.probe);

    match command {
        Command::Fetch => fetch(db, &prober, config).await,
        Command::Sync => import(db, client, config).await,
        Command::Rss => {
            let episodes = db
                .episodes_by_date_desc()
                .await
                .context("Failed to read catalog")?;
            let stdout = std::io::stdout();
            write_feed(BufWriter::new(stdout.lock()), &episodes, &config.channel)
                .context("Failed to write feed")
        }
        Command::Prune => {
            let report = prune(db, &prober).await.context("Pruning pass failed")?;
            for url in &report.removed {
                println!("{url} was removed from the server");
            }
            Ok(())
        }
        Command::Update => {
            let report = prune(db, &prober).await.context("Pruning pass failed")?;
            for url in &report.removed {
                println!("{url} was removed from the server");
            }
            fetch(db, &prober, config).await?;
            import(db, client, config).await
        }
        Command::Init => {
            fetch(db, &prober, config).await?;
            import(db, client, config).await
        }
    }
}

async fn fetch(db: &Database, prober: &Prober, config: &Config) -> Result<()> {
    let report = discover(db, prober, &config.show, Utc::now())
        .await
        .context("Discovery pass failed")?;
    for url in &report.stored {
        println!("{url}");
    }
    Ok(())
}

async fn import(db: &Database, client: &reqwest::Client, config: &Config) -> Result<()> {
    let report = sync(db, client, &config.upstream, &config.show)
        .await
        .with_context(|| format!("Sync from {} failed", config.upstream.url))?;
    println!(
        "Imported {} of {} upstream items",
        report.imported.len(),
        report.seen
    );
    Ok(())
}
