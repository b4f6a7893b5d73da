use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leaderboard::api::state::AppState;
use leaderboard::config::AppConfig;
use leaderboard::storage::{ScoreStore, SqliteStore};

#[derive(Parser)]
#[command(name = "leaderboard")]
#[command(about = "Score leaderboard backend")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./leaderboard.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create the scores table and indexes, then exit
    InitDb,

    /// Print the ranked leaderboard
    Top {
        /// Restrict to one class
        #[arg(long)]
        class_name: Option<String>,

        /// Number of rows (clamped like the HTTP endpoint)
        #[arg(long)]
        limit: Option<String>,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    init_tracing(
        cli.log_level.as_deref().unwrap_or(&config.log_level),
        cli.json_logs,
    );
    tracing::info!("Starting leaderboard v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(
        SqliteStore::open(&config.database.url, config.database.busy_timeout_ms)
            .context("Failed to open score database")?,
    );
    store.ensure_schema().await?;
    tracing::info!("Using {} score store", store.name());

    match cli.command {
        Commands::Serve { host, port } => {
            if config.admin_token().is_none() {
                tracing::warn!("No admin token configured; admin API is disabled");
            }
            let state = AppState::new(store, &config);
            let app = leaderboard::api::build_router(state, &config.server.cors_origin);

            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr = format!("{}:{}", host, port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("Listening on http://{}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::InitDb => {
            tracing::info!("Schema ready at {}", config.database.url);
        }
        Commands::Top { class_name, limit } => {
            let state = AppState::new(store, &config);
            let rows = state
                .ranking
                .top_scores(class_name.as_deref(), limit.as_deref())
                .await?;

            println!(
                "{:>4}  {:<24} {:<12} {:>8} {:>5} {:>6}",
                "#", "Name", "Class", "Points", "Acc%", "Streak"
            );
            for (i, row) in rows.iter().enumerate() {
                println!(
                    "{:>4}  {:<24} {:<12} {:>8} {:>5} {:>6}",
                    i + 1,
                    row.name,
                    row.class_name,
                    row.points,
                    row.accuracy,
                    row.best_streak
                );
            }
        }
    }

    Ok(())
}
