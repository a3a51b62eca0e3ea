//! passport-leaderboard daemon
//!
//! Runs the reconciliation writer and the read API over one shared store.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passport_leaderboard::{
    api::{create_router, AppState},
    config::{Config, StoreBackend},
    ledger::{LedgerClient, RpcLedgerClient},
    reconcile::{spawn_reconcile_task, Reconciler},
    reference::ReferenceData,
    store::{MemoryStore, SharedStore, SqliteStore},
};

#[derive(Parser)]
#[command(name = "passport-leaderboard")]
#[command(about = "CO2 passport leaderboards reconciled from a Plasma ledger")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "LEADERBOARD_CONFIG", default_value = "leaderboard.toml")]
    config: PathBuf,

    /// Ledger JSON-RPC URL (overrides config file)
    #[arg(long, env = "LEADERBOARD_RPC_URL")]
    rpc_url: Option<String>,

    /// API listen address (overrides config file)
    #[arg(long, env = "LEADERBOARD_LISTEN")]
    listen: Option<SocketAddr>,

    /// Store backend (overrides config file)
    #[arg(long, env = "LEADERBOARD_STORE", value_enum)]
    store: Option<StoreBackend>,

    /// SQLite database path (overrides config file)
    #[arg(long, env = "LEADERBOARD_STORE_PATH")]
    store_path: Option<PathBuf>,

    /// Seconds between reconciliation cycles (overrides config file)
    #[arg(long, env = "LEADERBOARD_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Serve the API only, without running reconciliation
    #[arg(long, env = "LEADERBOARD_READ_ONLY", default_value = "false")]
    read_only: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("passport_leaderboard={},info", cli.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting passport-leaderboard");
    info!("Config file: {}", cli.config.display());

    let mut config = Config::load(&cli.config)?;

    // Apply CLI overrides
    if let Some(rpc_url) = cli.rpc_url {
        config.ledger.rpc_url = rpc_url;
    }
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }
    if let Some(backend) = cli.store {
        config.store.backend = backend;
    }
    if let Some(path) = cli.store_path {
        config.store.path = path;
    }
    if let Some(interval) = cli.interval_secs {
        config.reconcile.interval_secs = interval;
    }
    if cli.read_only {
        config.reconcile.enabled = false;
    }

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Ledger: {}", config.ledger.rpc_url);
    info!("Store: {:?} ({})", config.store.backend, config.store.path.display());
    info!("Reconcile: {} every {}s", config.reconcile.enabled, config.reconcile.interval_secs);

    let reference = Arc::new(ReferenceData::load(
        &config.reference.countries_path,
        &config.reference.players_path,
    )?);

    let store: SharedStore = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.store.path)?),
    };

    if config.reconcile.enabled {
        let ledger: Arc<dyn LedgerClient> =
            Arc::new(RpcLedgerClient::new(config.ledger.rpc_config())?);
        let reconciler = Arc::new(Reconciler::new(ledger, store.clone(), reference.clone()));
        spawn_reconcile_task(reconciler, config.reconcile.interval());
    } else {
        info!("Reconciliation disabled, serving reads only");
    }

    if config.api.enabled {
        let app = create_router(AppState::new(store, reference));
        info!("API listening on http://{}", config.api.listen);
        let listener = tokio::net::TcpListener::bind(config.api.listen).await?;
        axum::serve(listener, app).await?;
    } else {
        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
    }

    Ok(())
}
