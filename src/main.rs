use address_tx_cache::{
    api,
    cache::{AddressCache, CacheSettings, Repeater, RepeaterSettings},
    config::Config,
    db,
    state::AppState,
    upstream,
};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting address-tx-cache");

    let config = Config::from_env();
    info!("Configuration loaded, lookup mode {}", config.lookup_mode);

    let db_pool = db::connection::establish_connection(&config.database_url).await?;
    info!("Database connection established");

    let source = upstream::connect(&config)?;
    let cache = AddressCache::new(db_pool.clone(), source, CacheSettings::from_config(&config));

    let shutdown = CancellationToken::new();

    let repeater = Arc::new(Repeater::new(cache.clone(), RepeaterSettings::from_config(&config)));
    let repeater_handle = repeater.start(shutdown.clone());

    let app_state = Arc::new(AppState { db_pool, cache });

    let app = api::create_router(app_state);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    repeater_handle.await?;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
