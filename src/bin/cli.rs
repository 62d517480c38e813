use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use colored::*;
use modelhub::{config, hub, Collection, HubClient, Reconciler, Record};
use tokio::time::sleep;

#[derive(Parser)]
#[command(name = "modelhub")]
#[command(
    about = "Real-time record synchronization hub with CRUD broadcast over WebSocket",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize hub configuration in a directory
    Init {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },

    /// Start the hub server
    Serve {
        /// Port override; the configured port is used when omitted
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Follow a hub's broadcasts and mirror them into a local collection
    Listen {
        /// Hub endpoint, e.g. ws://localhost:3000/ws
        url: String,
    },

    /// Create a record, e.g. '{"name":"x"}'
    Create { url: String, data: String },

    /// Update a record, e.g. '{"id":1,"name":"y"}'
    Update { url: String, data: String },

    /// Delete a record by id, e.g. '{"id":1}'
    Destroy { url: String, data: String },

    /// Look up a record by id, e.g. '{"id":1}'
    Find { url: String, data: String },

    /// Fetch the full server-side snapshot
    FindAll { url: String },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modelhub=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => {
            let cfg = config::init(&path).await?;
            println!("{} Configuration written", "✓".green());
            println!(
                "  {} {}",
                "Node: ".bright_black(),
                cfg.node_id.to_string().bright_yellow()
            );
            println!("  {} {}", "Port: ".bright_black(), cfg.port);
        }

        Commands::Serve { port, path } => {
            let cfg = config::load(&path).await?;
            let port = port.unwrap_or(cfg.port);
            println!(
                "{}",
                format!("🌐 Starting hub on port {}...", port).cyan().bold()
            );
            hub::start(port, cfg.broadcast).await?;
        }

        Commands::Listen { url } => {
            let reconciler = Reconciler::default();
            let items = Arc::new(Collection::new());
            reconciler.attach(items.clone());

            let client = HubClient::connect(&url, reconciler).await?;
            println!(
                "{} Listening as {}",
                "↔".bright_blue(),
                client
                    .connection_id()
                    .map(|id| id.to_string())
                    .unwrap_or_default()
                    .bright_yellow()
            );

            // Seed from the current snapshot, then mirror broadcasts.
            for record in client.find_all().await? {
                items.upsert(&record);
            }

            let mut last: Vec<Record> = Vec::new();
            loop {
                if client.is_closed() {
                    return Err(anyhow!("hub connection lost"));
                }
                let now = items.records();
                if now != last {
                    println!(
                        "{} {} record(s)",
                        "→".bright_blue(),
                        now.len().to_string().bright_white().bold()
                    );
                    for record in &now {
                        println!("  {}", serde_json::to_string(record.fields())?);
                    }
                    last = now;
                }
                sleep(Duration::from_millis(500)).await;
            }
        }

        Commands::Create { url, data } => {
            let created = connect(&url).await?.create(&parse_record(&data)?).await?;
            println!(
                "{} {}",
                "✓".green(),
                serde_json::to_string(created.fields())?
            );
        }

        Commands::Update { url, data } => {
            let updated = connect(&url).await?.update(&parse_record(&data)?).await?;
            println!(
                "{} {}",
                "✓".green(),
                serde_json::to_string(updated.fields())?
            );
        }

        Commands::Destroy { url, data } => {
            match connect(&url).await?.destroy(&parse_record(&data)?).await? {
                Some(deleted) => println!(
                    "{} Deleted {}",
                    "✓".green(),
                    serde_json::to_string(deleted.fields())?
                ),
                None => println!("{}", "Nothing to delete".yellow()),
            }
        }

        Commands::Find { url, data } => {
            match connect(&url).await?.find(&parse_record(&data)?).await? {
                Some(found) => println!("{}", serde_json::to_string(found.fields())?),
                None => println!("{}", "Not found".yellow()),
            }
        }

        Commands::FindAll { url } => {
            let records = connect(&url).await?.find_all().await?;
            println!(
                "{} {} record(s)",
                "✓".green(),
                records.len().to_string().bright_white().bold()
            );
            for record in &records {
                println!("  {}", serde_json::to_string(record.fields())?);
            }
        }
    }

    Ok(())
}

async fn connect(url: &str) -> Result<HubClient> {
    Ok(HubClient::connect(url, Reconciler::default()).await?)
}

fn parse_record(data: &str) -> Result<Record> {
    serde_json::from_str(data).map_err(|err| anyhow!("invalid record payload: {err}"))
}
