use anyhow::Result;
use roster_core::{Attendance, EuclideanMatcher};
use roster_store::SqliteStore;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod notify;

use config::Config;
use dbus_interface::{RosterService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    tracing::info!(
        db = %config.db_path.display(),
        dim = config.descriptor_dim,
        threshold = config.match_threshold,
        cooldown_secs = config.cooldown_secs,
        day_start = %config.day_start,
        day_end = %config.day_end,
        model = %config.extractor_model,
        "rosterd starting"
    );

    let store = SqliteStore::open(&config.db_path)?;
    let service = Attendance::new(
        store,
        EuclideanMatcher::new(config.match_threshold),
        config.ledger()?,
        config.descriptor_dim,
    );
    let engine = engine::spawn_engine(service, notify::LogNotifier)?;

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, RosterService::new(engine, &config))?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, system = config.system_bus, "rosterd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rosterd shutting down");

    Ok(())
}
