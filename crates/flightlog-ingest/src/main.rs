//! Flightlog Ingest - flight-status ingestion tool

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use flightlog_common::logging::{init_logging, LogConfig, LogLevel};
use flightlog_ingest::api::LufthansaClient;
use flightlog_ingest::collection::{DocumentCollection, MemoryCollection};
use flightlog_ingest::config::FlightlogConfig;
use flightlog_ingest::postgres::PgDocumentCollection;
use flightlog_ingest::{db, files, flights, provisioning, warehouse, IngestOptions};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "flightlog-ingest")]
#[command(author, version, about = "Flight-status ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch departures from the airline API and save the raw batch
    Fetch {
        /// Departure airport IATA code
        #[arg(short, long)]
        airport: Option<String>,

        /// Start of the departure window (YYYY-MM-DDTHH:MM, airport local time)
        #[arg(long, value_parser = parse_datetime)]
        from: Option<NaiveDateTime>,
    },

    /// Load raw departure files into the document collection
    Load {
        /// Directory holding dep_flights_*.json files
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Target collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Already-present records tolerated before a file is skipped
        #[arg(short, long)]
        threshold: Option<usize>,

        /// Probe every record of every file
        #[arg(short, long)]
        force: bool,

        /// Load into an in-memory collection instead of the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Flatten stored flights and upload new rows to the warehouse table
    Structure {
        /// Target table
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Create the configured database users
    Provision,

    /// Fetch, load the fetched batch, then structure
    Run {
        /// Departure airport IATA code
        #[arg(short, long)]
        airport: Option<String>,
    },
}

fn parse_datetime(value: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("flightlog-ingest".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    let config = FlightlogConfig::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Fetch { airport, from } => {
            let airport = airport.unwrap_or_else(|| config.api.airport_iata.clone());
            fetch(&config, &airport, from).await?;
        },
        Command::Load {
            dir,
            collection,
            threshold,
            force,
            dry_run,
        } => {
            let dir = dir.unwrap_or_else(|| config.ingestion.raw_dir.clone());
            let name = collection.unwrap_or_else(|| config.storage.collection.clone());
            let mut options = config.ingestion.options();
            if let Some(threshold) = threshold {
                options.existence_threshold = threshold;
            }
            options.force_full_scan |= force;

            if dry_run {
                let memory = MemoryCollection::new(name);
                load(&dir, &memory, options).await?;
                info!(documents = memory.len().await, "Dry run finished");
            } else {
                let pool = connect(&config).await?;
                let collection = PgDocumentCollection::ensure(&pool, &name).await?;
                load(&dir, &collection, options).await?;
            }
        },
        Command::Structure { table } => {
            let table = table.unwrap_or_else(|| config.storage.flights_table.clone());
            let pool = connect(&config).await?;
            structure(&pool, &config.storage.collection, &table).await?;
        },
        Command::Provision => {
            if config.provisioning.users.is_empty() {
                warn!("No users configured; set FLIGHTLOG_PROVISION_USERS");
                return Ok(());
            }
            config.provisioning.validate()?;
            let pool = connect(&config).await?;
            let database = provisioning::current_database(&pool).await?;
            let outcomes = provisioning::create_users(
                &pool,
                &database,
                &config.provisioning.users,
                config.provisioning.role,
            )
            .await;
            for (username, outcome) in outcomes {
                info!(%username, %outcome, "Provisioning result");
            }
        },
        Command::Run { airport } => {
            let airport = airport.unwrap_or_else(|| config.api.airport_iata.clone());
            let path = fetch(&config, &airport, None).await?;

            let pool = connect(&config).await?;
            let collection = PgDocumentCollection::ensure(&pool, &config.storage.collection).await?;
            let report =
                files::ingest_flight_file(&path, &collection, config.ingestion.options()).await?;
            info!(
                inserted = report.inserted,
                fully_processed = report.is_fully_processed(),
                "Fetched batch loaded"
            );

            structure(&pool, &config.storage.collection, &config.storage.flights_table).await?;
        },
    }

    info!("Done");
    Ok(())
}

async fn connect(config: &FlightlogConfig) -> Result<PgPool> {
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    db::health_check(&pool).await?;
    Ok(pool)
}

async fn fetch(config: &FlightlogConfig, airport: &str, from: Option<NaiveDateTime>) -> Result<PathBuf> {
    let client = LufthansaClient::new(config.api.clone())?;
    let from = from.unwrap_or_else(|| Local::now().naive_local());

    let batch = client.fetch_departing_flights(airport, from).await?;
    let path = files::save_raw_batch(&config.ingestion.raw_dir, airport, &batch, Utc::now())?;

    Ok(path)
}

async fn load<C: DocumentCollection>(dir: &Path, collection: &C, options: IngestOptions) -> Result<()> {
    let reports = files::ingest_flight_files(dir, collection, options)
        .await
        .with_context(|| format!("Failed to load flight files from {}", dir.display()))?;

    for file in &reports {
        info!(
            path = %file.path.display(),
            inserted = file.report.inserted,
            already_present = file.report.already_present,
            fully_processed = file.report.is_fully_processed(),
            "File loaded"
        );
    }

    Ok(())
}

async fn structure(pool: &PgPool, collection: &str, table: &str) -> Result<()> {
    let collection = PgDocumentCollection::ensure(pool, collection).await?;
    let resources = collection.all_documents().await?;

    let batch = flights::structure_flights(&resources);
    info!(records = resources.len(), flights = batch.len(), "Flights structured");

    let outcome = warehouse::upload_rows(pool, table, &batch).await?;
    info!(table = %table, inserted = outcome.inserted(), "Warehouse upload finished");

    Ok(())
}
