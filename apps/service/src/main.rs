mod config;
mod engine;
mod monitoring;
mod notify;
mod pool;
mod retention;
mod store;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::engine::Engine;
use crate::pool::LibsqlManager;
use crate::store::models::Target;
use crate::store::{LibsqlStore, ResultSink, TargetRegistry};

#[derive(Parser)]
#[command(name = "vigil-service", version, about = "HTTP uptime and certificate monitor")]
struct Cli {
    /// Path to the configuration file (defaults to
    /// $XDG_CONFIG_HOME/vigil/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_config(cli.config.as_deref())?;
    tracing::debug!("{config}");

    let database = libsql::Builder::new_local(&config.database.path).build().await?;
    let pool: crate::pool::LibsqlPool =
        deadpool::managed::Pool::builder(LibsqlManager::new(database)).build()?;
    {
        let conn = pool.get().await?;
        store::initialize_database(&conn).await?;
    }

    let store = Arc::new(LibsqlStore::new_from_pool(pool));
    let registry: Arc<dyn TargetRegistry> = store.clone();
    let sink: Arc<dyn ResultSink> = store;

    // Register a starter target on first run so a fresh install has
    // something to monitor.
    let targets = registry.list_targets().await?;
    if targets.is_empty() {
        let seed = Target::new("Example".to_string(), "https://www.example.com".to_string());
        registry.save_target(&seed).await?;
        tracing::info!("registered starter target {}", seed.name);
    } else {
        tracing::info!("monitoring {} targets", targets.len());
    }

    let engine = Engine::start(&config, registry, sink)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    engine.shutdown().await;

    Ok(())
}
