//! mabot-ai - Meeting Analysis Bot
//!
//! One invocation is one scheduled tick: discover new meeting recordings,
//! transcribe and analyze them, persist the results and move each file to its
//! terminal folder. The ledger subcommand is a manual triage aid.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mabot_ai::adapters::{GeminiClient, LocalDrive, WarehouseClient};
use mabot_ai::db::ledger::SqliteLedger;
use mabot_ai::db::results::{LocalWarehouse, SqliteResultsSheet};
use mabot_ai::services::dashboard_export::export_dashboard;
use mabot_ai::types::{Ledger, WarehouseSink};
use mabot_ai::{Collaborators, RunCoordinator};
use mabot_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use mabot_common::time::format_ledger_timestamp;
use mabot_common::AppConfig;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mabot-ai
#[derive(Parser, Debug)]
#[command(name = "mabot-ai")]
#[command(about = "Meeting recording analysis bot")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process new recordings once and exit
    Run {
        /// Write the dashboard JSON here after the run
        #[arg(long)]
        export_dashboard: Option<PathBuf>,
    },
    /// Inspect or clear a ledger entry
    Ledger {
        /// Print the entry for this file id
        #[arg(long, required_unless_present = "clear", conflicts_with = "clear")]
        file_id: Option<String>,

        /// Delete the entry for this file id so it is processed again
        #[arg(long)]
        clear: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR)?;
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mabot-ai v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());
    info!("Database: {}", config.storage.database_path.display());

    let pool = mabot_ai::db::init_database_pool(&config.storage.database_path)
        .await
        .context("Failed to open database")?;

    match args.command {
        Command::Run { export_dashboard: dashboard_path } => {
            let config = Arc::new(config);
            let collaborators = build_collaborators(&config, pool.clone())?;
            let coordinator = RunCoordinator::new(config.clone(), collaborators);

            let summary = coordinator.run_once().await?;
            if summary.stopped_on_quota {
                info!("Run stopped early on quota; {} file(s) left for the next run", summary.deferred);
            }

            if let Some(path) = dashboard_path {
                export_dashboard(&pool, &config.dashboard.strip_columns, &path).await?;
            }
        }
        Command::Ledger { file_id, clear } => {
            let ledger = SqliteLedger::new(pool);
            if let Some(id) = clear {
                if ledger.clear(&id).await? {
                    println!("Cleared ledger entry for {}", id);
                } else {
                    println!("No ledger entry for {}", id);
                }
            } else if let Some(id) = file_id {
                match ledger.entry(&id).await? {
                    Some(entry) => {
                        println!("file_id:   {}", entry.file_id);
                        println!("file_name: {}", entry.file_name);
                        println!("status:    {}", entry.status);
                        println!("attempts:  {}", entry.attempt_count);
                        println!("recorded:  {}", format_ledger_timestamp(&entry.recorded_at));
                        if let Some(origin) = &entry.origin {
                            println!("origin:    {}", origin);
                        }
                        if let Some(error) = &entry.error {
                            println!("error:     {}", error);
                        }
                    }
                    None => println!("No ledger entry for {}", id),
                }
            }
        }
    }

    Ok(())
}

/// Wire the concrete adapters for one run
fn build_collaborators(config: &AppConfig, pool: SqlitePool) -> Result<Collaborators> {
    let api_key = config
        .llm
        .resolve_api_key()
        .context("No model API key: set GEMINI_API_KEY or llm.api_key")?;
    let prompt = config.llm.load_prompt()?;
    let gemini = Arc::new(GeminiClient::new(&config.llm, api_key, prompt)?);

    let drive = Arc::new(LocalDrive::new(config.drive.clone()));

    let warehouse: Arc<dyn WarehouseSink> = match &config.warehouse {
        Some(warehouse) => Arc::new(WarehouseClient::new(warehouse)?),
        None => {
            info!("No [warehouse] configured, writing warehouse rows to the local database");
            Arc::new(LocalWarehouse::new(pool.clone()))
        }
    };

    Ok(Collaborators {
        discovery: drive.clone(),
        store: drive,
        transcriber: gemini.clone(),
        analyzer: gemini,
        spreadsheet: Arc::new(SqliteResultsSheet::new(pool.clone())),
        warehouse,
        ledger: Arc::new(SqliteLedger::new(pool)) as Arc<dyn Ledger>,
    })
}
