use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tendex_core::{RunReport, RunStatus};
use tendex_pipeline::{build_adapters, build_scheduler, Orchestrator, PipelineConfig, SourceRegistry};
use tendex_storage::{
    EmbeddingClient, EmbeddingConfig, MemoryTenderStore, PgTenderStore, TenderStore,
};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const EXIT_SUCCESS: u8 = 0;
const EXIT_PARTIAL: u8 = 1;
const EXIT_FAILED: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "tendex")]
#[command(about = "Government tender extraction pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one extraction cycle and print the run report.
    Run {
        /// Target date (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Extract and process without touching the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply database migrations.
    Migrate,
    /// Serve the operational JSON endpoints.
    Serve,
    /// Run the cron-driven daily scheduler until interrupted.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    match cli.command {
        Commands::Run { date, dry_run } => {
            let target_date = date.unwrap_or_else(|| Utc::now().date_naive());
            let report = run_once(&config, target_date, dry_run).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::from(exit_code_for(report.status)))
        }
        Commands::Migrate => {
            let store = PgTenderStore::connect(&config.database_url)
                .await
                .context("connecting to database")?;
            store.migrate().await.context("applying migrations")?;
            info!("migrations applied");
            Ok(ExitCode::from(EXIT_SUCCESS))
        }
        Commands::Serve => {
            let store = connect_store(&config).await;
            let state = Arc::new(tendex_web::AppState::new(store));
            tendex_web::serve(state).await?;
            Ok(ExitCode::from(EXIT_SUCCESS))
        }
        Commands::Schedule => {
            let orchestrator = Arc::new(build_orchestrator(&config, false).await?);
            let mut scheduler = build_scheduler(orchestrator).await?;
            scheduler.start().await.context("starting scheduler")?;
            info!(cron = %config.cron, "scheduler running; press ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            scheduler.shutdown().await.context("stopping scheduler")?;
            Ok(ExitCode::from(EXIT_SUCCESS))
        }
    }
}

fn exit_code_for(status: RunStatus) -> u8 {
    match status {
        RunStatus::Success => EXIT_SUCCESS,
        RunStatus::Partial => EXIT_PARTIAL,
        RunStatus::Failed => EXIT_FAILED,
    }
}

async fn run_once(
    config: &PipelineConfig,
    target_date: NaiveDate,
    dry_run: bool,
) -> Result<RunReport> {
    let orchestrator = build_orchestrator(config, dry_run).await?;
    orchestrator.run_daily(target_date, dry_run).await
}

async fn build_orchestrator(config: &PipelineConfig, dry_run: bool) -> Result<Orchestrator> {
    let registry = SourceRegistry::load(&config.workspace_root)
        .await
        .context("loading source registry")?;
    let adapters = build_adapters(config, &registry)?;
    anyhow::ensure!(!adapters.is_empty(), "no enabled sources in sources.yaml");

    let store: Arc<dyn TenderStore> = if dry_run {
        Arc::new(MemoryTenderStore::new())
    } else {
        let store = PgTenderStore::connect(&config.database_url)
            .await
            .context("connecting to database")?;
        store.migrate().await.context("applying migrations")?;
        Arc::new(store)
    };

    let mut orchestrator = Orchestrator::new(config.clone(), store, adapters);
    if !dry_run {
        match EmbeddingConfig::from_env() {
            Ok(embed_config) => {
                orchestrator = orchestrator.with_embeddings(EmbeddingClient::new(embed_config)?);
            }
            Err(err) => info!(reason = %err, "embeddings disabled"),
        }
    }
    Ok(orchestrator)
}

async fn connect_store(config: &PipelineConfig) -> Option<Arc<dyn TenderStore>> {
    match PgTenderStore::connect(&config.database_url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            warn!(error = %err, "serving without database statistics");
            None
        }
    }
}
