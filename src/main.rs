use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use teamarr::{
    config::Config, database::Database, orchestrator::Orchestrator,
    providers::SportsDataService,
};

#[derive(Parser)]
#[command(name = "teamarr")]
#[command(about = "Sports-oriented EPG generator for Dispatcharr")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full EPG generation cycle (default)
    Run,
    /// Detect drift, orphans, and duplicates against Dispatcharr
    Reconcile {
        /// Apply auto-fixes regardless of the settings gate
        #[arg(long)]
        fix: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("teamarr={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Teamarr v{}", env!("CARGO_PKG_VERSION"));

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let service = SportsDataService::with_defaults();
    let orchestrator = Orchestrator::new(config, database, service);

    // Ctrl-C cancels cooperatively: in-flight calls finish or time out
    // and the partial fragment for the current group is discarded
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received - cancelling run");
            cancel.cancel();
        }
    });

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let result = orchestrator.run().await?;
            info!(
                "Run {} {}: {} team programmes, {} event programmes, {} channels created, {} errors",
                result.generation,
                if result.cancelled {
                    "cancelled"
                } else if result.success {
                    "succeeded"
                } else {
                    "completed with failures"
                },
                result.team_stats.programmes,
                result.event_stats.programmes,
                result.lifecycle_stats.channels_created,
                result.errors.len(),
            );
            for error in &result.errors {
                tracing::warn!("  {}", error);
            }
        }
        Command::Reconcile { fix } => {
            let result = orchestrator.reconcile(fix.then_some(true)).await?;
            info!(
                "Reconciliation: {} issue(s) found, {} fixed, {} skipped",
                result.issues_found.len(),
                result.issues_fixed,
                result.issues_skipped,
            );
            for issue in &result.issues_found {
                info!(
                    "  [{}] {:?} -> {}",
                    issue.kind.as_str(),
                    issue.channel_name,
                    issue.suggested_action
                );
            }
        }
    }

    Ok(())
}
